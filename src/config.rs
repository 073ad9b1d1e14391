use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::UsageError;
use crate::filter::TargetAddress;

/// Delay before each delivery into the transport.
pub const DEFAULT_PACING: Duration = Duration::from_millis(20);
/// Simulated handshake latency of the replay transport.
pub const DEFAULT_CONNECT_DELAY: Duration = Duration::from_millis(500);
/// Time given to the client to finish connecting before traversal starts.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(1800);
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(2000);
/// StudioLive consoles speak on TCP 53000.
pub const DEFAULT_BPF_FILTER: &str = "ip and tcp and port 53000";

/// Settings for one replay session.
#[derive(Debug, Clone)]
pub struct ReplayConfig {
    pub file: PathBuf,
    pub target: TargetAddress,
    pub pacing: Duration,
    pub connect_delay: Duration,
    pub settle_delay: Duration,
    pub heartbeat_interval: Duration,
    pub bpf_filter: String,
}

impl ReplayConfig {
    pub fn new(file: impl Into<PathBuf>, target: TargetAddress) -> Self {
        Self {
            file: file.into(),
            target,
            pacing: DEFAULT_PACING,
            connect_delay: DEFAULT_CONNECT_DELAY,
            settle_delay: DEFAULT_SETTLE_DELAY,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            bpf_filter: DEFAULT_BPF_FILTER.to_string(),
        }
    }

    /// Validate the two positional arguments, in the order a user would be told about them.
    pub fn from_args(file: Option<&Path>, target: Option<&str>) -> Result<Self, UsageError> {
        let file = file.ok_or(UsageError::MissingFile)?;
        if !file.exists() {
            return Err(UsageError::FileNotFound(file.to_path_buf()));
        }

        let target = target.ok_or(UsageError::MissingTarget)?;
        let target = target
            .parse::<TargetAddress>()
            .map_err(|_| UsageError::InvalidTarget(target.to_string()))?;

        Ok(Self::new(file, target))
    }

    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = delay;
        self
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }
}
