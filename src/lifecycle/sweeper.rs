//! Periodic cleanup of the in-memory stores.
//!
//! One task, two tickers: expired rate windows and OTP records go on the
//! short interval, amnesty runs on the long one. Ticks that fall behind are
//! delayed, not burst.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::security::intrusion::SuspiciousActivityTracker;
use crate::security::otp::OtpService;
use crate::security::rate_limit::RateLimiter;

pub struct Sweeper {
    pub limiter: Arc<RateLimiter>,
    pub tracker: Arc<SuspiciousActivityTracker>,
    pub otp: Arc<OtpService>,
    pub sweep_interval: Duration,
    pub amnesty_interval: Duration,
}

impl Sweeper {
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let now = Instant::now();
        let mut sweep = interval_at(now + self.sweep_interval, self.sweep_interval);
        let mut amnesty = interval_at(now + self.amnesty_interval, self.amnesty_interval);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
        amnesty.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            sweep_secs = self.sweep_interval.as_secs(),
            amnesty_secs = self.amnesty_interval.as_secs(),
            "Sweeper started"
        );

        loop {
            tokio::select! {
                _ = sweep.tick() => {
                    let windows = self.limiter.sweep();
                    let codes = self.otp.sweep();
                    tracing::debug!(windows, codes, "Swept expired entries");
                }
                _ = amnesty.tick() => {
                    let released = self.tracker.amnesty();
                    if released > 0 {
                        tracing::info!(released, "Amnesty released blocked addresses");
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Sweeper stopped");
                    break;
                }
            }
        }
    }
}
