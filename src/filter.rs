use std::fmt;
use std::net::{AddrParseError, Ipv4Addr};
use std::str::FromStr;

/// Address of the console whose traffic is replayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetAddress([u8; 4]);

impl TargetAddress {
    pub fn new(octets: [u8; 4]) -> Self {
        Self(octets)
    }

    pub fn octets(&self) -> [u8; 4] {
        self.0
    }
}

impl FromStr for TargetAddress {
    type Err = AddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ip: Ipv4Addr = s.trim().parse()?;
        Ok(Self(ip.octets()))
    }
}

impl fmt::Display for TargetAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Ipv4Addr::from(self.0))
    }
}

/// Where a packet sits relative to the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Sent by the console; the only traffic that gets replayed.
    FromTarget,
    /// Sent to the console by the client that was recorded. The live client writes its own.
    ToTarget,
    Unrelated,
}

/// Exact byte-for-byte comparison, source checked first.
pub fn classify(source: [u8; 4], destination: [u8; 4], target: TargetAddress) -> Direction {
    if source == target.0 {
        Direction::FromTarget
    } else if destination == target.0 {
        Direction::ToTarget
    } else {
        Direction::Unrelated
    }
}
