//! Offline replay of recorded StudioLive console traffic into a live client.
//!
//! Frames from a capture file are decoded ([`packet`]), filtered down to what
//! the console sent ([`filter`]), paced one at a time ([`scheduler`]) into a
//! simulated connection ([`transport`]) that the client ([`client`]) reads
//! from as if it were a real socket. [`heartbeat`] keeps the client from
//! declaring the silent connection dead.

pub mod capture;
pub mod client;
pub mod config;
pub mod error;
pub mod filter;
pub mod heartbeat;
pub mod packet;
pub mod scheduler;
pub mod session;
pub mod transport;

pub use config::ReplayConfig;
pub use session::{ReplaySession, ReplayStats};
