use pnet::packet::Packet;
use pnet::packet::ethernet::{EtherType, EtherTypes, EthernetPacket};
use pnet::packet::ip::{IpNextHeaderProtocol, IpNextHeaderProtocols};
use pnet::packet::ipv4::Ipv4Packet;
use pnet::packet::tcp::TcpPacket;
use tracing::debug;

/// One raw frame as it came out of the capture file.
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    pub data: Vec<u8>,     // Link-layer bytes, starting at the Ethernet header
    pub timestamp: f64,    // Seconds since epoch
}

impl CapturedFrame {
    pub fn new(data: Vec<u8>, timestamp: f64) -> Self {
        Self { data, timestamp }
    }
}

/// Ethernet/IPv4/TCP view of a captured frame.
#[derive(Debug, Clone)]
pub struct DecodedPacket {
    pub ethertype: EtherType,
    pub source: [u8; 4],
    pub destination: [u8; 4],
    pub protocol: IpNextHeaderProtocol,
    pub source_port: u16,
    pub destination_port: u16,
    pub payload: Vec<u8>,
    pub timestamp: f64,
}

impl DecodedPacket {
    /// ACK-only and other control segments carry nothing to replay.
    pub fn has_payload(&self) -> bool {
        !self.payload.is_empty()
    }
}

/// Decode a frame as Ethernet → IPv4 → TCP.
///
/// Returns `None` for any other stack or for truncated headers. Captures are
/// full of unrelated traffic, so this is a filter and not an error.
pub fn decode_frame(frame: &CapturedFrame) -> Option<DecodedPacket> {
    let ethernet = match EthernetPacket::new(&frame.data) {
        Some(eth) => eth,
        None => {
            debug!("Failed to parse Ethernet packet");
            return None;
        }
    };

    let ethertype = ethernet.get_ethertype();
    if ethertype != EtherTypes::Ipv4 {
        return None;
    }

    let ipv4 = match Ipv4Packet::new(ethernet.payload()) {
        Some(ip) => ip,
        None => {
            debug!("Failed to parse IPv4 packet");
            return None;
        }
    };

    let protocol = ipv4.get_next_level_protocol();
    if protocol != IpNextHeaderProtocols::Tcp {
        return None;
    }

    // pnet bounds the IPv4 payload by total length, so Ethernet padding is excluded.
    let tcp = match TcpPacket::new(ipv4.payload()) {
        Some(tcp) => tcp,
        None => {
            debug!("Failed to parse TCP segment");
            return None;
        }
    };

    // A data offset below 5 words or past the segment end means the header is garbage.
    let header_len = tcp.get_data_offset() as usize * 4;
    if header_len < TcpPacket::minimum_packet_size() || header_len > ipv4.payload().len() {
        debug!("Invalid TCP data offset {}", tcp.get_data_offset());
        return None;
    }

    Some(DecodedPacket {
        ethertype,
        source: ipv4.get_source().octets(),
        destination: ipv4.get_destination().octets(),
        protocol,
        source_port: tcp.get_source(),
        destination_port: tcp.get_destination(),
        payload: tcp.payload().to_vec(),
        timestamp: frame.timestamp,
    })
}
