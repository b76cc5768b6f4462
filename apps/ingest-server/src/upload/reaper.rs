//! Background sweep of abandoned upload sessions

use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::session::SessionManager;

/// Floor for the sweep period; a zero period would panic in `tokio::time::interval`
const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Periodically reaps sessions untouched for longer than `max_age_hours`
pub struct Reaper {
    manager: SessionManager,
    max_age_hours: i64,
    interval: Duration,
}

impl Reaper {
    pub fn new(manager: SessionManager, max_age_hours: i64, interval: Duration) -> Self {
        let interval = if interval.is_zero() {
            tracing::warn!("Reaper interval of zero raised to {}s", MIN_INTERVAL.as_secs());
            MIN_INTERVAL
        } else {
            interval
        };
        Self {
            manager,
            max_age_hours,
            interval,
        }
    }

    /// Run one sweep, logging instead of failing
    pub async fn sweep(&self) -> usize {
        match self.manager.reap(self.max_age_hours).await {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!(error = %e, "Upload session sweep failed");
                0
            }
        }
    }

    /// Start the sweep loop; it exits when `shutdown` flips to true
    pub fn start(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            tracing::info!(
                max_age_hours = self.max_age_hours,
                interval_secs = self.interval.as_secs(),
                "Upload reaper started"
            );

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        self.sweep().await;
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }

            tracing::info!("Upload reaper stopped");
        })
    }
}
