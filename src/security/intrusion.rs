//! Suspicious-activity tracking and address blocking.
//!
//! # State per address
//! ```text
//! clean → flagged(count, window_start) → blocked → clean (amnesty)
//! ```
//!
//! A violation inside an open window increments the count; once the count
//! exceeds the threshold the address joins the blocked set. Release depends
//! on `AmnestyMode`: either a shared sweep clears every block and record, or
//! each block lapses `block_ttl` after its own escalation.

use std::time::Duration;

use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;
use tokio::time::Instant;

use crate::config::{AmnestyMode, IntrusionConfig};
use crate::observability::metrics;

#[derive(Debug, Clone, Copy)]
struct ActivityRecord {
    count: u32,
    window_start: Instant,
}

/// What a single `track` call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackOutcome {
    /// Violation counted; the address is not blocked.
    Flagged { count: u32 },
    /// This violation pushed the address over the threshold.
    Escalated { count: u32 },
    /// The address was already blocked; the count still advances.
    AlreadyBlocked { count: u32 },
}

/// Process-wide violation counters and blocked set.
#[derive(Debug)]
pub struct SuspiciousActivityTracker {
    records: DashMap<String, ActivityRecord>,
    blocked: DashMap<String, Instant>,
    threshold: u32,
    window: Duration,
    amnesty: AmnestyMode,
    block_ttl: Duration,
}

impl SuspiciousActivityTracker {
    pub fn new(config: &IntrusionConfig) -> Self {
        Self {
            records: DashMap::new(),
            blocked: DashMap::new(),
            threshold: config.threshold,
            window: Duration::from_secs(config.window_secs),
            amnesty: config.amnesty,
            block_ttl: Duration::from_secs(config.block_ttl_secs),
        }
    }

    /// Record one violation from `address`.
    pub fn track(&self, address: &str) -> TrackOutcome {
        let now = Instant::now();
        let mut entry = self
            .records
            .entry(address.to_string())
            .or_insert(ActivityRecord {
                count: 0,
                window_start: now,
            });

        let record = entry.value_mut();
        if record.count == 0 || now.duration_since(record.window_start) > self.window {
            *record = ActivityRecord {
                count: 1,
                window_start: now,
            };
        } else {
            record.count += 1;
        }
        let count = record.count;

        if count <= self.threshold {
            return TrackOutcome::Flagged { count };
        }

        // The record entry is still held, so promotion is atomic per address.
        // A lapsed per-entry block counts as a fresh escalation.
        let newly_blocked = match self.blocked.entry(address.to_string()) {
            MapEntry::Vacant(slot) => {
                slot.insert(now);
                true
            }
            MapEntry::Occupied(mut slot) => {
                if self.lapsed(*slot.get(), now) {
                    slot.insert(now);
                    true
                } else {
                    false
                }
            }
        };
        drop(entry);

        if newly_blocked {
            tracing::warn!(client = %address, violations = count, "[SECURITY] IP blocked");
            metrics::record_blocked_addresses(self.blocked.len());
            TrackOutcome::Escalated { count }
        } else {
            TrackOutcome::AlreadyBlocked { count }
        }
    }

    /// Is `address` currently denied all access?
    pub fn is_blocked(&self, address: &str) -> bool {
        let now = Instant::now();
        self.blocked
            .get(address)
            .is_some_and(|since| !self.lapsed(*since, now))
    }

    /// Whether a block placed at `since` has run out. Shared-clock blocks
    /// only end at the sweep.
    fn lapsed(&self, since: Instant, now: Instant) -> bool {
        self.amnesty == AmnestyMode::PerEntry && now.duration_since(since) >= self.block_ttl
    }

    /// Periodic release of blocked addresses. Returns how many were released.
    pub fn amnesty(&self) -> usize {
        let released = match self.amnesty {
            AmnestyMode::SharedClock => self.clear(),
            AmnestyMode::PerEntry => {
                let now = Instant::now();
                let before = self.blocked.len();
                self.blocked
                    .retain(|_, since| now.duration_since(*since) < self.block_ttl);
                let window = self.window;
                self.records
                    .retain(|_, r| now.duration_since(r.window_start) <= window);
                before.saturating_sub(self.blocked.len())
            }
        };
        metrics::record_blocked_addresses(self.blocked.len());
        released
    }

    /// Forget every block and record immediately.
    pub fn clear(&self) -> usize {
        let released = self.blocked.len();
        self.blocked.clear();
        self.records.clear();
        metrics::record_blocked_addresses(0);
        released
    }

    /// Blocked addresses, sorted.
    pub fn blocked_addresses(&self) -> Vec<String> {
        let mut addrs: Vec<String> = self.blocked.iter().map(|r| r.key().clone()).collect();
        addrs.sort();
        addrs
    }

    pub fn blocked_count(&self) -> usize {
        self.blocked.len()
    }

    pub fn tracked_count(&self) -> usize {
        self.records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker(amnesty: AmnestyMode) -> SuspiciousActivityTracker {
        SuspiciousActivityTracker::new(&IntrusionConfig {
            amnesty,
            ..IntrusionConfig::default()
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_sixth_violation_blocks() {
        let t = tracker(AmnestyMode::SharedClock);
        for i in 1..=5 {
            assert_eq!(t.track("1.2.3.4"), TrackOutcome::Flagged { count: i });
            assert!(!t.is_blocked("1.2.3.4"));
        }
        assert_eq!(t.track("1.2.3.4"), TrackOutcome::Escalated { count: 6 });
        assert!(t.is_blocked("1.2.3.4"));
        assert_eq!(t.track("1.2.3.4"), TrackOutcome::AlreadyBlocked { count: 7 });
        assert!(!t.is_blocked("5.6.7.8"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_restarts_after_five_minutes() {
        let t = tracker(AmnestyMode::SharedClock);
        for _ in 0..5 {
            t.track("a");
        }
        tokio::time::advance(Duration::from_secs(301)).await;
        assert_eq!(t.track("a"), TrackOutcome::Flagged { count: 1 });
        assert!(!t.is_blocked("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_boundary_is_inclusive() {
        let t = tracker(AmnestyMode::SharedClock);
        for _ in 0..5 {
            t.track("a");
        }
        tokio::time::advance(Duration::from_secs(300)).await;
        assert_eq!(t.track("a"), TrackOutcome::Escalated { count: 6 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_shared_clock_amnesty_releases_everything() {
        let t = tracker(AmnestyMode::SharedClock);
        for _ in 0..6 {
            t.track("a");
        }
        t.track("b");

        assert_eq!(t.amnesty(), 1);
        assert!(!t.is_blocked("a"));
        assert_eq!(t.tracked_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_per_entry_blocks_expire_independently() {
        let t = tracker(AmnestyMode::PerEntry);
        for _ in 0..6 {
            t.track("early");
        }
        tokio::time::advance(Duration::from_secs(1000)).await;
        for _ in 0..6 {
            t.track("late");
        }

        tokio::time::advance(Duration::from_secs(800)).await;
        assert!(!t.is_blocked("early"));
        assert!(t.is_blocked("late"));

        assert_eq!(t.amnesty(), 1);
        assert_eq!(t.blocked_addresses(), vec!["late".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reoffending_after_lapsed_block_escalates_again() {
        let t = tracker(AmnestyMode::PerEntry);
        for _ in 0..5 {
            t.track("1.2.3.4");
        }
        assert_eq!(t.track("1.2.3.4"), TrackOutcome::Escalated { count: 6 });

        // Past the block TTL, before any amnesty sweep removes the entry.
        tokio::time::advance(Duration::from_secs(1801)).await;
        assert!(!t.is_blocked("1.2.3.4"));

        for i in 1..=5 {
            assert_eq!(t.track("1.2.3.4"), TrackOutcome::Flagged { count: i });
        }
        assert_eq!(t.track("1.2.3.4"), TrackOutcome::Escalated { count: 6 });
        assert!(t.is_blocked("1.2.3.4"));
        assert_eq!(t.track("1.2.3.4"), TrackOutcome::AlreadyBlocked { count: 7 });
    }

    #[test]
    fn test_parallel_tracking_escalates_exactly_once() {
        use std::sync::Arc;

        let t = Arc::new(tracker(AmnestyMode::SharedClock));
        let handles: Vec<_> = (0..12)
            .map(|_| {
                let t = t.clone();
                std::thread::spawn(move || t.track("9.9.9.9"))
            })
            .collect();
        let escalations = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|o| matches!(o, TrackOutcome::Escalated { .. }))
            .count();

        assert_eq!(escalations, 1);
        assert!(t.is_blocked("9.9.9.9"));
    }
}
