use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

/// Something that tracks when its peer was last seen alive.
pub trait Liveness: Send + Sync {
    fn update_time(&self);
}

/// Periodically marks the client's peer as alive.
///
/// The replay transport drops every write, so keep-alive requests never get an
/// answer. This stands in for those answers by refreshing the client's
/// bookkeeping directly.
pub struct HeartbeatInjector {
    handle: JoinHandle<()>,
}

impl HeartbeatInjector {
    /// First beat lands one `interval` after the call. Must be called from within a tokio runtime.
    pub fn spawn(target: Arc<dyn Liveness>, interval: Duration) -> Self {
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            let mut beats = 0u64;
            loop {
                ticker.tick().await;
                beats += 1;
                debug!("Heartbeat #{}", beats);
                target.update_time();
            }
        });

        Self { handle }
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}
