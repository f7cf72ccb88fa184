//! Wire Format
//!
//! Binary encoding/decoding of the SAL message frame.

use alloc::vec::Vec;

use crate::MAX_MESSAGE_SIZE;

/// Size of the fixed frame header in bytes.
pub const HEADER_SIZE: usize = 16;

/// Errors that can occur while decoding wire data.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    /// Buffer is too short to hold the fixed fields.
    #[error("message too short: need {needed} bytes, got {got}")]
    TooShort { needed: usize, got: usize },

    /// Header length field does not match the bytes that follow.
    #[error("length mismatch: header says {declared} bytes, {actual} present")]
    LengthMismatch { declared: usize, actual: usize },

    /// Payload exceeds the maximum transport unit.
    #[error("payload too large: {0} bytes")]
    PayloadTooLarge(usize),

    /// Authentication Message kind is not 1, 2 or 3.
    #[error("unknown authentication message kind: {0}")]
    UnknownAuthKind(u32),
}

/// Fixed header preceding every payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameHeader {
    /// Sending process
    pub sender: u32,
    /// Destination process or reserved channel
    pub destination: u32,
    /// Message type tag
    pub tag: u32,
    /// Payload length in bytes
    pub length: u32,
}

/// Encode a frame (header followed by payload).
///
/// The length field is taken from the payload, so it always matches.
pub fn encode_frame(
    sender: u32,
    destination: u32,
    tag: u32,
    payload: &[u8],
) -> Result<Vec<u8>, WireError> {
    if payload.len() > MAX_MESSAGE_SIZE {
        return Err(WireError::PayloadTooLarge(payload.len()));
    }

    let mut bytes = Vec::with_capacity(HEADER_SIZE + payload.len());
    bytes.extend_from_slice(&sender.to_le_bytes());
    bytes.extend_from_slice(&destination.to_le_bytes());
    bytes.extend_from_slice(&tag.to_le_bytes());
    bytes.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    bytes.extend_from_slice(payload);
    Ok(bytes)
}

/// Decode a frame, returning the header and a borrowed payload.
pub fn decode_frame(data: &[u8]) -> Result<(FrameHeader, &[u8]), WireError> {
    if data.len() < HEADER_SIZE {
        return Err(WireError::TooShort {
            needed: HEADER_SIZE,
            got: data.len(),
        });
    }

    let header = FrameHeader {
        sender: read_u32(data, 0),
        destination: read_u32(data, 4),
        tag: read_u32(data, 8),
        length: read_u32(data, 12),
    };

    let declared = header.length as usize;
    if declared > MAX_MESSAGE_SIZE {
        return Err(WireError::PayloadTooLarge(declared));
    }

    let payload = &data[HEADER_SIZE..];
    if payload.len() != declared {
        return Err(WireError::LengthMismatch {
            declared,
            actual: payload.len(),
        });
    }

    Ok((header, payload))
}

/// Read a little-endian u32 at `offset`. Caller checks bounds.
pub(crate) fn read_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

/// Read a little-endian f32 at `offset`. Caller checks bounds.
pub(crate) fn read_f32(data: &[u8], offset: usize) -> f32 {
    f32::from_bits(read_u32(data, offset))
}

/// Check that a fixed-size record occupies exactly `size` bytes.
pub(crate) fn require_exact(data: &[u8], size: usize) -> Result<(), WireError> {
    if data.len() < size {
        return Err(WireError::TooShort {
            needed: size,
            got: data.len(),
        });
    }
    if data.len() > size {
        return Err(WireError::LengthMismatch {
            declared: size,
            actual: data.len(),
        });
    }
    Ok(())
}
