//! Frame codec for the push channel.
//!
//! Wire format (a subset of RFC 6455 framing):
//! ```text
//! [fin|opcode:1][mask|len7:1][ext_len:0|2|8][mask_key:0|4][payload:N]
//! ```
//!
//! - `len7 < 126`: the length is inline.
//! - `len7 == 126`: a big-endian `u16` length follows.
//! - `len7 == 127`: a big-endian `u64` length follows.
//!
//! Frames written by the server are never masked.  Frames read from clients
//! may be masked; the decoder XORs the payload with the 4-byte key.

use thiserror::Error;

/// First byte of an outbound text frame (FIN + opcode 0x1).
pub const TEXT_FRAME: u8 = 0x81;
/// First byte of a close frame (FIN + opcode 0x8).
pub const CLOSE_FRAME: u8 = 0x88;
/// First byte of a ping frame (FIN + opcode 0x9).
pub const PING_FRAME: u8 = 0x89;
/// First byte of a pong frame (FIN + opcode 0xA).
pub const PONG_FRAME: u8 = 0x8A;

/// Largest inbound payload the decoder accepts by default.
pub const MAX_INBOUND_PAYLOAD: usize = 64 * 1024;

const OPCODE_MASK: u8 = 0x0F;
const MASK_BIT: u8 = 0x80;
const LEN7_MASK: u8 = 0x7F;
const LEN16_MARKER: u8 = 126;
const LEN64_MARKER: u8 = 127;

/// Errors produced while decoding an inbound frame.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// The opcode is neither a data opcode (0x0–0x2) nor a supported control
    /// opcode (0x8–0xA).
    #[error("reserved opcode: 0x{0:X}")]
    ReservedOpcode(u8),

    /// The declared payload length exceeds the decoder's limit.
    #[error("frame payload of {declared} bytes exceeds limit of {limit}")]
    Oversized { declared: u64, limit: usize },
}

/// Result of decoding the front of an inbound byte buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlFrame {
    Ping,
    Pong,
    Close,
    /// A continuation, text, or binary frame.  The payload is unmasked.
    Data(Vec<u8>),
    /// The buffer does not yet hold a complete frame.
    Incomplete,
}

// ── Encoding ──────────────────────────────────────────────────────────────────

/// Wraps `payload` in an unmasked text frame.
///
/// # Examples
///
/// ```rust
/// use touch_core::protocol::frame::encode_text;
///
/// let frame = encode_text(br#"{"type":"connected"}"#);
/// assert_eq!(frame[0], 0x81);
/// assert_eq!(frame[1] as usize, frame.len() - 2);
/// ```
pub fn encode_text(payload: &[u8]) -> Vec<u8> {
    encode_frame(TEXT_FRAME, payload)
}

pub fn encode_ping() -> Vec<u8> {
    encode_frame(PING_FRAME, &[])
}

pub fn encode_pong() -> Vec<u8> {
    encode_frame(PONG_FRAME, &[])
}

pub fn encode_close() -> Vec<u8> {
    encode_frame(CLOSE_FRAME, &[])
}

fn encode_frame(first_byte: u8, payload: &[u8]) -> Vec<u8> {
    let len = payload.len();
    let mut buf = Vec::with_capacity(len + 10);
    buf.push(first_byte);

    if len < LEN16_MARKER as usize {
        buf.push(len as u8);
    } else if let Ok(short) = u16::try_from(len) {
        buf.push(LEN16_MARKER);
        buf.extend_from_slice(&short.to_be_bytes());
    } else {
        buf.push(LEN64_MARKER);
        buf.extend_from_slice(&(len as u64).to_be_bytes());
    }

    buf.extend_from_slice(payload);
    buf
}

// ── Decoding ──────────────────────────────────────────────────────────────────

/// Decodes one frame from the front of `bytes` with the default payload limit.
///
/// Returns the frame and the number of bytes it occupied.  When the buffer
/// holds only part of a frame the result is `(ControlFrame::Incomplete, 0)`
/// and the caller should read more bytes and try again.
///
/// # Errors
///
/// Returns [`FrameError`] for reserved opcodes and oversized payloads.  Both
/// are unrecoverable for the connection since the stream can no longer be
/// resynchronized.
pub fn decode_control(bytes: &[u8]) -> Result<(ControlFrame, usize), FrameError> {
    decode_control_limited(bytes, MAX_INBOUND_PAYLOAD)
}

/// Like [`decode_control`] with an explicit payload limit.
pub fn decode_control_limited(
    bytes: &[u8],
    limit: usize,
) -> Result<(ControlFrame, usize), FrameError> {
    if bytes.len() < 2 {
        return Ok((ControlFrame::Incomplete, 0));
    }

    let opcode = bytes[0] & OPCODE_MASK;
    if !matches!(opcode, 0x0..=0x2 | 0x8..=0xA) {
        return Err(FrameError::ReservedOpcode(opcode));
    }

    let masked = bytes[1] & MASK_BIT != 0;
    let (declared, mut offset) = match bytes[1] & LEN7_MASK {
        LEN16_MARKER => {
            let Some(ext) = bytes.get(2..4) else {
                return Ok((ControlFrame::Incomplete, 0));
            };
            (u64::from(u16::from_be_bytes([ext[0], ext[1]])), 4)
        }
        LEN64_MARKER => {
            let Some(ext) = bytes.get(2..10) else {
                return Ok((ControlFrame::Incomplete, 0));
            };
            let mut raw = [0u8; 8];
            raw.copy_from_slice(ext);
            (u64::from_be_bytes(raw), 10)
        }
        inline => (u64::from(inline), 2),
    };

    if declared > limit as u64 {
        return Err(FrameError::Oversized { declared, limit });
    }
    // Bounded by `limit`, so the conversion cannot truncate.
    let len = declared as usize;

    let mask_key = if masked {
        let Some(key) = bytes.get(offset..offset + 4) else {
            return Ok((ControlFrame::Incomplete, 0));
        };
        offset += 4;
        Some([key[0], key[1], key[2], key[3]])
    } else {
        None
    };

    let Some(end) = offset.checked_add(len) else {
        return Err(FrameError::Oversized {
            declared,
            limit: usize::MAX - offset,
        });
    };
    let Some(raw_payload) = bytes.get(offset..end) else {
        return Ok((ControlFrame::Incomplete, 0));
    };

    let frame = match opcode {
        0x8 => ControlFrame::Close,
        0x9 => ControlFrame::Ping,
        0xA => ControlFrame::Pong,
        _ => {
            let mut payload = raw_payload.to_vec();
            if let Some(key) = mask_key {
                for (i, byte) in payload.iter_mut().enumerate() {
                    *byte ^= key[i % 4];
                }
            }
            ControlFrame::Data(payload)
        }
    };

    Ok((frame, end))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
