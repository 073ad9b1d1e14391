//! StudioLive "UC" framing.
//!
//! Every packet is `55 43 00 01`, a little-endian `u16` counting the bytes
//! that follow it, a two-letter ASCII message code, then the body. Most
//! bodies open with four routing bytes that this client does not interpret.

use serde::Serialize;

use crate::error::DecodeError;

pub const MAGIC: [u8; 4] = [0x55, 0x43, 0x00, 0x01];
pub const HEADER_LEN: usize = MAGIC.len() + 2;
const CODE_LEN: usize = 2;
const ROUTING_LEN: usize = 4;
/// Routing bytes the console expects on client-originated packets.
pub const CLIENT_ROUTING: [u8; 4] = [0x68, 0x00, 0x65, 0x00];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageCode {
    KeepAlive,
    Hello,
    Json,
    ParamValue,
    FaderPosition,
    ZlibState,
    Other([u8; 2]),
}

impl MessageCode {
    pub fn from_bytes(code: [u8; 2]) -> Self {
        match &code {
            b"KA" => MessageCode::KeepAlive,
            b"UM" => MessageCode::Hello,
            b"JM" => MessageCode::Json,
            b"PV" => MessageCode::ParamValue,
            b"MS" => MessageCode::FaderPosition,
            b"ZB" => MessageCode::ZlibState,
            _ => MessageCode::Other(code),
        }
    }

    pub fn as_bytes(&self) -> [u8; 2] {
        match self {
            MessageCode::KeepAlive => *b"KA",
            MessageCode::Hello => *b"UM",
            MessageCode::Json => *b"JM",
            MessageCode::ParamValue => *b"PV",
            MessageCode::FaderPosition => *b"MS",
            MessageCode::ZlibState => *b"ZB",
            MessageCode::Other(code) => *code,
        }
    }

    pub fn name(&self) -> String {
        String::from_utf8_lossy(&self.as_bytes()).into_owned()
    }
}

/// A framed packet before its body is interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPacket {
    pub code: MessageCode,
    pub body: Vec<u8>,
}

/// Fader levels for a block of channels, as reported by the console.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FaderPositions {
    pub channels: usize,
    pub levels: Vec<u16>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamValue {
    pub name: String,
    pub value: Option<f32>,
}

/// A decoded packet as handed to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    KeepAlive,
    FaderPosition(FaderPositions),
    ParamValue(ParamValue),
    Other(RawPacket),
}

pub fn encode(code: MessageCode, body: &[u8]) -> Vec<u8> {
    let mut packet = Vec::with_capacity(HEADER_LEN + CODE_LEN + body.len());
    packet.extend_from_slice(&MAGIC);
    packet.extend_from_slice(&((CODE_LEN + body.len()) as u16).to_le_bytes());
    packet.extend_from_slice(&code.as_bytes());
    packet.extend_from_slice(body);
    packet
}

/// Reassembles packets from an arbitrarily chunked byte stream.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    buf: Vec<u8>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Next complete packet, or `None` if more bytes are needed.
    ///
    /// Garbage before a magic marker is discarded. A header with an impossible
    /// length yields an error and is skipped so decoding can continue.
    pub fn next_packet(&mut self) -> Option<Result<RawPacket, DecodeError>> {
        self.resync();

        if self.buf.len() < HEADER_LEN {
            return None;
        }

        let len = u16::from_le_bytes([self.buf[4], self.buf[5]]);
        if (len as usize) < CODE_LEN {
            self.buf.drain(..HEADER_LEN);
            return Some(Err(DecodeError::BadLength(len)));
        }

        let end = HEADER_LEN + len as usize;
        if self.buf.len() < end {
            return None;
        }

        let frame: Vec<u8> = self.buf.drain(..end).collect();
        let code = MessageCode::from_bytes([frame[HEADER_LEN], frame[HEADER_LEN + 1]]);
        Some(Ok(RawPacket {
            code,
            body: frame[HEADER_LEN + CODE_LEN..].to_vec(),
        }))
    }

    fn resync(&mut self) {
        if self.buf.starts_with(&MAGIC) {
            return;
        }
        match self.buf.windows(MAGIC.len()).position(|w| w == MAGIC) {
            Some(start) => {
                self.buf.drain(..start);
            }
            None => {
                // Keep a tail that may be the start of a split marker.
                let keep = self.buf.len().min(MAGIC.len() - 1);
                let cut = self.buf.len() - keep;
                self.buf.drain(..cut);
            }
        }
    }
}

pub fn decode_event(packet: &RawPacket) -> Result<ClientEvent, DecodeError> {
    match packet.code {
        MessageCode::KeepAlive => Ok(ClientEvent::KeepAlive),
        MessageCode::FaderPosition => {
            decode_fader_positions(&packet.body).map(ClientEvent::FaderPosition)
        }
        MessageCode::ParamValue => decode_param_value(&packet.body).map(ClientEvent::ParamValue),
        _ => Ok(ClientEvent::Other(packet.clone())),
    }
}

fn truncated(code: MessageCode, body: &[u8]) -> DecodeError {
    DecodeError::Truncated {
        code: code.name(),
        len: body.len(),
    }
}

fn decode_fader_positions(body: &[u8]) -> Result<FaderPositions, DecodeError> {
    let count_at = ROUTING_LEN;
    if body.len() < count_at + 2 {
        return Err(truncated(MessageCode::FaderPosition, body));
    }

    let channels = u16::from_le_bytes([body[count_at], body[count_at + 1]]) as usize;
    let levels_at = count_at + 2;
    if body.len() < levels_at + channels * 2 {
        return Err(truncated(MessageCode::FaderPosition, body));
    }

    let levels = body[levels_at..levels_at + channels * 2]
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();

    Ok(FaderPositions { channels, levels })
}

fn decode_param_value(body: &[u8]) -> Result<ParamValue, DecodeError> {
    if body.len() < ROUTING_LEN {
        return Err(truncated(MessageCode::ParamValue, body));
    }

    let rest = &body[ROUTING_LEN..];
    let name_end = rest.iter().position(|&b| b == 0).unwrap_or(rest.len());
    let name = String::from_utf8_lossy(&rest[..name_end]).into_owned();

    // Value is the trailing f32, after the terminator and alignment padding.
    let tail = rest.get(name_end + 1..).unwrap_or(&[]);
    let value = if tail.len() >= 4 {
        let bytes = &tail[tail.len() - 4..];
        Some(f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    } else {
        None
    };

    Ok(ParamValue { name, value })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fader_body(levels: &[u16]) -> Vec<u8> {
        let mut body = vec![0x6b, 0x00, 0x65, 0x00];
        body.extend_from_slice(&(levels.len() as u16).to_le_bytes());
        for level in levels {
            body.extend_from_slice(&level.to_le_bytes());
        }
        body
    }

    #[test]
    fn test_encode_layout() {
        let packet = encode(MessageCode::KeepAlive, &CLIENT_ROUTING);
        assert_eq!(
            packet,
            vec![0x55, 0x43, 0x00, 0x01, 0x06, 0x00, b'K', b'A', 0x68, 0x00, 0x65, 0x00]
        );
    }

    #[test]
    fn test_reassembles_split_packets() {
        let packet = encode(MessageCode::FaderPosition, &fader_body(&[100, 200]));
        let mut frames = FrameBuffer::new();

        frames.push(&packet[..3]);
        assert!(frames.next_packet().is_none());
        frames.push(&packet[3..9]);
        assert!(frames.next_packet().is_none());
        frames.push(&packet[9..]);

        let raw = frames.next_packet().unwrap().unwrap();
        assert_eq!(raw.code, MessageCode::FaderPosition);
        assert!(frames.next_packet().is_none());
        assert_eq!(frames.buffered(), 0);
    }

    #[test]
    fn test_several_packets_in_one_chunk() {
        let mut chunk = encode(MessageCode::KeepAlive, &[]);
        chunk.extend(encode(MessageCode::ParamValue, b"\0\0\0\0line/ch1/mute\0\0\0\0\0\x80\x3f"));
        let mut frames = FrameBuffer::new();
        frames.push(&chunk);

        assert_eq!(frames.next_packet().unwrap().unwrap().code, MessageCode::KeepAlive);
        assert_eq!(frames.next_packet().unwrap().unwrap().code, MessageCode::ParamValue);
        assert!(frames.next_packet().is_none());
    }

    #[test]
    fn test_resyncs_after_garbage() {
        let mut frames = FrameBuffer::new();
        frames.push(b"noise\x55\x43");
        assert!(frames.next_packet().is_none());
        assert_eq!(frames.buffered(), 3);

        let packet = encode(MessageCode::KeepAlive, &[]);
        frames.push(&packet[..2]);
        frames.push(&packet);
        let raw = frames.next_packet().unwrap().unwrap();
        assert_eq!(raw.code, MessageCode::KeepAlive);
    }

    #[test]
    fn test_bad_length_skipped() {
        let mut frames = FrameBuffer::new();
        frames.push(&[0x55, 0x43, 0x00, 0x01, 0x01, 0x00]);
        frames.push(&encode(MessageCode::KeepAlive, &[]));

        assert_eq!(frames.next_packet().unwrap(), Err(DecodeError::BadLength(1)));
        assert_eq!(frames.next_packet().unwrap().unwrap().code, MessageCode::KeepAlive);
    }

    #[test]
    fn test_decode_fader_positions() {
        let raw = RawPacket {
            code: MessageCode::FaderPosition,
            body: fader_body(&[0, 32768, 65535]),
        };
        let event = decode_event(&raw).unwrap();
        assert_eq!(
            event,
            ClientEvent::FaderPosition(FaderPositions {
                channels: 3,
                levels: vec![0, 32768, 65535],
            })
        );
    }

    #[test]
    fn test_truncated_fader_positions() {
        let mut body = fader_body(&[1, 2, 3]);
        body.truncate(body.len() - 1);
        let raw = RawPacket { code: MessageCode::FaderPosition, body };
        assert!(matches!(decode_event(&raw), Err(DecodeError::Truncated { .. })));
    }

    #[test]
    fn test_decode_param_value() {
        let raw = RawPacket {
            code: MessageCode::ParamValue,
            body: b"\x6b\x00\x65\x00line/ch1/mute\0\0\0\0\0\x80\x3f".to_vec(),
        };
        match decode_event(&raw).unwrap() {
            ClientEvent::ParamValue(pv) => {
                assert_eq!(pv.name, "line/ch1/mute");
                assert_eq!(pv.value, Some(1.0));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_unknown_code_passed_through() {
        let raw = RawPacket {
            code: MessageCode::from_bytes(*b"QQ"),
            body: vec![1, 2],
        };
        assert_eq!(MessageCode::from_bytes(*b"QQ"), MessageCode::Other(*b"QQ"));
        assert_eq!(decode_event(&raw).unwrap(), ClientEvent::Other(raw.clone()));
    }
}
