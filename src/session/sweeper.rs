/// Background TTL sweep of idle sessions
///
/// Ticks on a tokio interval and removes sessions idle longer than `max_age`.
/// Stops at the next await point once its cancellation token fires.

use crate::session::store::SessionStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

const MIN_INTERVAL: Duration = Duration::from_millis(1);

pub struct SessionSweeper {
    store: Arc<dyn SessionStore>,
    interval: Duration,
    max_age: Duration,
}

impl SessionSweeper {
    /// A zero `interval` is raised to one millisecond
    pub fn new(store: Arc<dyn SessionStore>, interval: Duration, max_age: Duration) -> Self {
        Self {
            store,
            interval: interval.max(MIN_INTERVAL),
            max_age,
        }
    }

    /// Run the sweep loop on its own task
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }

    pub async fn run(self, cancel: CancellationToken) {
        tracing::info!(
            "🧹 Starting session sweeper (every {:?}, max age {:?})",
            self.interval,
            self.max_age
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.sweep_once().await;
                }
            }
        }

        tracing::info!("⏹️ Session sweeper stopped");
    }

    /// One cleanup pass; errors are logged, never fatal
    pub async fn sweep_once(&self) -> usize {
        match self.store.cleanup_expired(self.max_age).await {
            Ok(removed) => {
                tracing::debug!("🧹 Sweep removed {} sessions", removed);
                removed
            }
            Err(error) => {
                tracing::error!("❌ Session sweep failed: {}", error);
                0
            }
        }
    }
}

impl std::fmt::Debug for SessionSweeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionSweeper")
            .field("interval", &self.interval)
            .field("max_age", &self.max_age)
            .finish_non_exhaustive()
    }
}
