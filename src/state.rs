//! Shared application state for Axum handlers and the admission layers.
//!
//! - **Configuration**: Runtime configuration access
//! - **Session Verifier**: Shared-secret token verification (immutable)
//! - **Rate Store**: The counter store injected into the rate limiter
//! - **Store Health**: Connectivity flag refreshed by a background ping
//!
//! # Structured Concurrency
//!
//! Background tasks are managed using `tokio_util::task::TaskTracker` and
//! `CancellationToken`. Call `shutdown()` to stop them before exit.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, trace, warn};

use crate::config::Config;
use crate::metrics;
use crate::rate_store::RateStore;
use crate::session::SessionVerifier;

/// Shared application state.
///
/// Cloned per request; everything inside is `Arc`-shared or cheap to clone.
///
/// # Lifecycle
///
/// Creating the state spawns the store health task, so it must happen inside
/// a tokio runtime:
///
/// ```rust,ignore
/// let state = AppState::new(config, store);
/// // ... serve ...
/// state.shutdown().await;
/// ```
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<Config>,
    /// Verifies session tokens for the gate and the session endpoint
    pub sessions: SessionVerifier,
    /// Counter store backing the rate limiter
    pub rate_store: Arc<dyn RateStore>,
    /// Timestamp when the application started
    pub started_at: Instant,
    /// Last known store connectivity
    store_up: Arc<AtomicBool>,
    /// Tracks spawned background tasks for graceful shutdown
    task_tracker: TaskTracker,
    /// Cancellation token for signaling background tasks to stop
    cancellation_token: CancellationToken,
}

impl AppState {
    /// Create application state around an already-connected rate store.
    ///
    /// Spawns a background task that pings the store every
    /// `config.store_health_check_interval`.
    pub fn new(config: Config, rate_store: Arc<dyn RateStore>) -> Self {
        let sessions =
            SessionVerifier::new(&config.session_secret, config.session_cookie_names.clone());

        let state = Self {
            config: Arc::new(config),
            sessions,
            rate_store,
            started_at: Instant::now(),
            store_up: Arc::new(AtomicBool::new(true)),
            task_tracker: TaskTracker::new(),
            cancellation_token: CancellationToken::new(),
        };

        metrics::set_store_up(true);
        state.spawn_store_health_task();

        state
    }

    /// Whether the last store ping succeeded.
    pub fn store_connected(&self) -> bool {
        self.store_up.load(Ordering::Relaxed)
    }

    /// Whether `shutdown()` has been called.
    pub fn is_shutting_down(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }

    /// Ping the store once and publish the result.
    pub async fn check_store(&self) -> bool {
        ping_store(self.rate_store.as_ref(), &self.store_up).await
    }

    /// Spawn the background store health task.
    ///
    /// Only the fields the task needs are cloned, not the whole state.
    fn spawn_store_health_task(&self) {
        let store = self.rate_store.clone();
        let store_up = self.store_up.clone();
        let period = self.config.store_health_check_interval;
        let cancel = self.cancellation_token.clone();

        self.task_tracker.spawn(async move {
            let mut ticker = interval(period.max(Duration::from_secs(1)));
            ticker.tick().await; // Skip first immediate tick

            loop {
                tokio::select! {
                    biased;

                    _ = cancel.cancelled() => {
                        debug!("Store health task received cancellation signal");
                        break;
                    }
                    _ = ticker.tick() => {
                        ping_store(store.as_ref(), &store_up).await;
                    }
                }
            }

            debug!("Store health task shutting down");
        });
    }

    /// Gracefully shutdown all background tasks.
    ///
    /// 1. Signals all tasks to stop via cancellation token
    /// 2. Closes the task tracker (prevents new tasks)
    /// 3. Waits for all tasks to complete
    pub async fn shutdown(&self) {
        info!("Initiating graceful shutdown of background tasks");

        self.cancellation_token.cancel();
        self.task_tracker.close();
        self.task_tracker.wait().await;

        info!("All background tasks have completed");
    }

    /// Get the application uptime in seconds.
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

async fn ping_store(store: &dyn RateStore, store_up: &AtomicBool) -> bool {
    let up = match store.ping().await {
        Ok(()) => {
            trace!(backend = store.backend(), "Health check: rate store OK");
            true
        }
        Err(e) => {
            warn!(backend = store.backend(), error = %e, "Health check: rate store is down");
            false
        }
    };

    let was_up = store_up.swap(up, Ordering::Relaxed);
    if was_up != up && up {
        info!(backend = store.backend(), "Rate store connection restored");
    }
    metrics::set_store_up(up);
    up
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::rate_store::{MemoryRateStore, StoreError, StoreResult};
    use async_trait::async_trait;

    struct DownStore;

    #[async_trait]
    impl RateStore for DownStore {
        async fn incr(&self, _key: &str) -> StoreResult<i64> {
            Err(StoreError::Connection("down".into()))
        }
        async fn expire(&self, _key: &str, _seconds: u64) -> StoreResult<bool> {
            Err(StoreError::Connection("down".into()))
        }
        async fn ping(&self) -> StoreResult<()> {
            Err(StoreError::Connection("down".into()))
        }
        fn backend(&self) -> &'static str {
            "down"
        }
    }

    #[tokio::test]
    async fn test_check_store_updates_flag() {
        let state = AppState::new(Config::default(), Arc::new(DownStore));
        assert!(state.store_connected());

        assert!(!state.check_store().await);
        assert!(!state.store_connected());

        state.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_ping_marks_store_down() {
        let config = Config {
            store_health_check_interval: Duration::from_secs(5),
            ..Config::default()
        };
        let state = AppState::new(config, Arc::new(DownStore));

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(!state.store_connected());

        state.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_flags_state() {
        let state = AppState::new(Config::default(), Arc::new(MemoryRateStore::new()));
        assert!(!state.is_shutting_down());
        assert!(state.check_store().await);

        state.shutdown().await;
        assert!(state.is_shutting_down());
    }
}
