//! Windowed request counting keyed by an arbitrary identifier.
//!
//! Each identifier owns one window: the first check opens it with
//! `count = 1`, later checks increment until `max_requests`, and the window
//! is replaced once `reset_at` passes. Per-key atomicity comes from the
//! DashMap entry lock, so parallel checks on one identifier never lose an
//! increment.

use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

use crate::config::LimitRule;
use crate::observability::metrics;

#[derive(Debug, Clone, Copy)]
struct RateWindow {
    count: u32,
    reset_at: Instant,
}

/// Process-wide window store.
#[derive(Debug, Default)]
pub struct RateLimiter {
    windows: DashMap<String, RateWindow>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one request against `identifier`. Returns false once the window
    /// already holds `max_requests`; a denied call does not mutate the window.
    pub fn check(&self, identifier: &str, max_requests: u32, window: Duration) -> bool {
        let now = Instant::now();

        // Fast path: look up by &str so repeat keys do not allocate.
        if let Some(mut entry) = self.windows.get_mut(identifier) {
            let w = entry.value_mut();
            if now >= w.reset_at {
                *w = RateWindow {
                    count: 1,
                    reset_at: now + window,
                };
                return true;
            }
            if w.count < max_requests {
                w.count += 1;
                return true;
            }
            return false;
        }

        let mut allowed = true;
        self.windows
            .entry(identifier.to_string())
            .and_modify(|w| {
                // Another task opened the window between the lookup and here.
                if now >= w.reset_at {
                    *w = RateWindow {
                        count: 1,
                        reset_at: now + window,
                    };
                } else if w.count < max_requests {
                    w.count += 1;
                } else {
                    allowed = false;
                }
            })
            .or_insert(RateWindow {
                count: 1,
                reset_at: now + window,
            });
        allowed
    }

    /// `check` with a configured rule.
    pub fn check_rule(&self, identifier: &str, rule: &LimitRule) -> bool {
        self.check(identifier, rule.max_requests, Duration::from_secs(rule.window_secs))
    }

    /// Drop the window for `identifier`, e.g. after a successful login.
    pub fn clear(&self, identifier: &str) -> bool {
        self.windows.remove(identifier).is_some()
    }

    /// Remove every expired window. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.windows.len();
        self.windows.retain(|_, w| now < w.reset_at);
        let removed = before.saturating_sub(self.windows.len());
        metrics::record_rate_windows(self.windows.len());
        removed
    }

    /// Number of windows currently held, expired or not.
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const MINUTE: Duration = Duration::from_secs(60);

    #[tokio::test(start_paused = true)]
    async fn test_login_scenario() {
        let limiter = RateLimiter::new();
        let key = "login:1.2.3.4";

        for call in 1..=5 {
            assert!(limiter.check(key, 5, MINUTE), "call {} should pass", call);
        }
        assert!(!limiter.check(key, 5, MINUTE), "call 6 should be denied");

        assert!(limiter.clear(key));
        assert!(limiter.check(key, 5, MINUTE), "call 7 should pass after clear");
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_resets_after_expiry() {
        let limiter = RateLimiter::new();
        for _ in 0..3 {
            assert!(limiter.check("k", 3, MINUTE));
        }
        assert!(!limiter.check("k", 3, MINUTE));

        tokio::time::advance(MINUTE - Duration::from_millis(1)).await;
        assert!(!limiter.check("k", 3, MINUTE));

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(limiter.check("k", 3, MINUTE));
        assert!(limiter.check("k", 3, MINUTE));
    }

    #[tokio::test(start_paused = true)]
    async fn test_identifiers_are_independent() {
        let limiter = RateLimiter::new();
        assert!(limiter.check("a", 1, MINUTE));
        assert!(!limiter.check("a", 1, MINUTE));
        assert!(limiter.check("b", 1, MINUTE));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_removes_only_expired_windows() {
        let limiter = RateLimiter::new();
        limiter.check("short", 5, Duration::from_secs(10));
        limiter.check("long", 5, Duration::from_secs(600));

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(limiter.sweep(), 1);
        assert_eq!(limiter.len(), 1);
        assert!(!limiter.clear("short"));
        assert!(limiter.clear("long"));
    }

    #[test]
    fn test_parallel_checks_do_not_lose_updates() {
        let limiter = Arc::new(RateLimiter::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = limiter.clone();
                std::thread::spawn(move || {
                    (0..50).filter(|_| limiter.check("shared", 100, MINUTE)).count()
                })
            })
            .collect();

        let allowed: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(allowed, 100);
    }
}
