use anyhow::{Context, Result};
use pcap::{Capture, Error as PcapError, Offline};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::packet::CapturedFrame;

/// Anything that hands out captured frames in capture order.
pub trait FrameSource {
    /// `Ok(None)` once the source is exhausted.
    fn next_frame(&mut self) -> Result<Option<CapturedFrame>>;
}

/// In-memory source, used when frames are already at hand.
impl FrameSource for VecDeque<CapturedFrame> {
    fn next_frame(&mut self) -> Result<Option<CapturedFrame>> {
        Ok(self.pop_front())
    }
}

/// Offline libpcap reader for a recorded console session.
pub struct CaptureReader {
    capture: Capture<Offline>,
    sequence: u64,
    file_path: PathBuf,
}

impl CaptureReader {
    pub fn open(file_path: &Path, filter: &str) -> Result<Self> {
        debug!("Opening capture file with libpcap: {}", file_path.display());

        let mut capture = Capture::from_file(file_path)
            .with_context(|| format!("Failed to open capture file: {}", file_path.display()))?;

        if !filter.is_empty() {
            capture
                .filter(filter, true)
                .with_context(|| format!("Invalid capture filter: {}", filter))?;
        }

        debug!("Capture file opened with filter '{}'", filter);

        Ok(Self {
            capture,
            sequence: 0,
            file_path: file_path.to_path_buf(),
        })
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    /// Number of records handed out so far.
    pub fn frames_read(&self) -> u64 {
        self.sequence
    }
}

impl FrameSource for CaptureReader {
    fn next_frame(&mut self) -> Result<Option<CapturedFrame>> {
        loop {
            let packet = match self.capture.next_packet() {
                Ok(packet) => packet,
                Err(PcapError::NoMorePackets) => return Ok(None),
                Err(e) => {
                    warn!("Error reading record #{}: {}", self.sequence + 1, e);
                    continue;
                }
            };

            self.sequence += 1;

            let timestamp = packet.header.ts.tv_sec as f64
                + packet.header.ts.tv_usec as f64 / 1_000_000.0;

            return Ok(Some(CapturedFrame::new(packet.data.to_vec(), timestamp)));
        }
    }
}
