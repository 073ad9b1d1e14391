use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;

use crate::heartbeat::Liveness;

/// Tracks when the console last showed signs of life.
#[derive(Debug)]
pub struct KeepAlive {
    last_seen: Mutex<Instant>,
}

impl KeepAlive {
    pub fn new() -> Self {
        Self {
            last_seen: Mutex::new(Instant::now()),
        }
    }

    pub fn update_time(&self) {
        *self.last_seen.lock() = Instant::now();
    }

    pub fn elapsed(&self) -> Duration {
        self.last_seen.lock().elapsed()
    }

    pub fn is_alive(&self, timeout: Duration) -> bool {
        self.elapsed() <= timeout
    }
}

impl Default for KeepAlive {
    fn default() -> Self {
        Self::new()
    }
}

impl Liveness for KeepAlive {
    fn update_time(&self) {
        KeepAlive::update_time(self);
    }
}
