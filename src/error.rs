use std::path::PathBuf;
use thiserror::Error;

/// Problems with the command invocation. All of them abort before replay starts.
#[derive(Debug, Error)]
pub enum UsageError {
    #[error("Please provide a file path")]
    MissingFile,
    #[error("File {} does not exist", .0.display())]
    FileNotFound(PathBuf),
    #[error("Please provide a console IP")]
    MissingTarget,
    #[error("Invalid console IP {0:?}: expected dotted-decimal IPv4 address")]
    InvalidTarget(String),
}

/// Completion result handed to write callbacks.
///
/// The replay transport never produces one of these; the type exists so the
/// write path has the same shape as a real connection's.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport is not connected")]
    NotConnected,
}

/// The delivery worker is gone; nothing more can reach the client.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("delivery worker stopped after {delivered} payloads")]
    WorkerStopped { delivered: u64 },
}

/// Errors raised while decoding a StudioLive packet.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("packet body too short for {code}: {len} bytes")]
    Truncated { code: String, len: usize },
    #[error("declared length {0} is smaller than the message code")]
    BadLength(u16),
}
