//! Periodic eviction of expired seen-cache entries.
//!
//! The sweep task is supervised: if it ever stops, it is logged and started
//! again. A node whose cache is never swept grows without bound.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, warn};

use crate::cache::MessageCache;

/// Background sweeper for one node's [`MessageCache`].
#[derive(Debug, Clone)]
pub struct CleanupScheduler {
    cache: Arc<MessageCache>,
    interval: Duration,
    expiry: Duration,
}

impl CleanupScheduler {
    /// Sweep `cache` every `interval`, evicting ids older than `expiry`.
    pub fn new(cache: Arc<MessageCache>, interval: Duration, expiry: Duration) -> Self {
        Self {
            cache,
            interval,
            expiry,
        }
    }

    /// Run one sweep now. Returns the number of evicted ids.
    pub fn sweep_once(&self) -> usize {
        let removed = self.cache.sweep(Instant::now().into_std(), self.expiry);
        if removed > 0 {
            debug!(removed, remaining = self.cache.len(), "Swept expired message ids");
        }
        removed
    }

    /// Start the supervised sweep task. Aborting the returned handle stops it.
    pub fn spawn(self) -> JoinHandle<()> {
        supervise(move || self.clone().sweep_forever(), RESTART_BACKOFF)
    }

    async fn sweep_forever(self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            self.sweep_once();
        }
    }
}

/// Pause before a stopped worker is started again.
const RESTART_BACKOFF: Duration = Duration::from_secs(1);

/// Keep one worker from `make_worker` running, restarting it `backoff`
/// after it exits or panics.
fn supervise<F, Fut>(make_worker: F, backoff: Duration) -> JoinHandle<()>
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            let worker = AbortOnDrop(tokio::spawn(make_worker()));
            match worker.wait().await {
                Ok(()) => warn!("Cleanup task exited, restarting"),
                Err(e) => error!(error = %e, "Cleanup task failed, restarting"),
            }
            tokio::time::sleep(backoff).await;
        }
    })
}

/// Aborts the inner task when the supervisor itself is aborted.
struct AbortOnDrop(JoinHandle<()>);

impl AbortOnDrop {
    async fn wait(mut self) -> Result<(), tokio::task::JoinError> {
        (&mut self.0).await
    }
}

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}
