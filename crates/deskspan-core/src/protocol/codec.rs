//! Length-delimited binary codec for DeskSpan protocol records.
//!
//! Wire format:
//! ```text
//! [payload_len: u32 BE][bincode payload: N bytes]
//! ```
//! The length prefix lets a reader that drains a socket in bursts know where
//! one record ends and the next begins.  Encryption, when enabled, is applied
//! to the whole frame (prefix included) by the transport layer; the codec
//! itself only sees plaintext.

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

use crate::protocol::messages::{ClientMessage, ServerMessage};

/// Size of the length prefix in bytes.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Upper bound on a single frame's payload.  Anything larger is treated as a
/// corrupted or hostile stream rather than buffered indefinitely.
pub const MAX_PAYLOAD_SIZE: usize = 1024 * 1024;

/// Errors that can occur while encoding or decoding a frame.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The byte slice is shorter than a complete frame.
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// The declared payload length exceeds [`MAX_PAYLOAD_SIZE`].
    #[error("frame too large: declared {declared} bytes, limit is {limit}")]
    FrameTooLarge { declared: usize, limit: usize },

    /// The payload bytes did not deserialize into the expected record type.
    #[error("malformed payload: {0}")]
    MalformedPayload(#[from] bincode::Error),
}

/// Encodes a server → client record into a framed byte vector.
///
/// # Errors
///
/// Returns [`ProtocolError::MalformedPayload`] if serialization fails.
pub fn encode_server(msg: &ServerMessage) -> Result<Vec<u8>, ProtocolError> {
    encode(msg)
}

/// Encodes a client → server record into a framed byte vector.
///
/// # Errors
///
/// Returns [`ProtocolError::MalformedPayload`] if serialization fails.
pub fn encode_client(msg: &ClientMessage) -> Result<Vec<u8>, ProtocolError> {
    encode(msg)
}

/// Decodes one server → client record from the beginning of `bytes`.
///
/// Returns the record and the number of bytes consumed so the caller can
/// advance its read cursor.
///
/// # Errors
///
/// Returns [`ProtocolError`] when the frame is incomplete or malformed.
pub fn decode_server(bytes: &[u8]) -> Result<(ServerMessage, usize), ProtocolError> {
    decode(bytes)
}

/// Decodes one client → server record from the beginning of `bytes`.
///
/// # Errors
///
/// Returns [`ProtocolError`] when the frame is incomplete or malformed.
pub fn decode_client(bytes: &[u8]) -> Result<(ClientMessage, usize), ProtocolError> {
    decode(bytes)
}

fn encode<T: Serialize>(msg: &T) -> Result<Vec<u8>, ProtocolError> {
    let payload = bincode::serialize(msg)?;
    let mut buf = Vec::with_capacity(LENGTH_PREFIX_SIZE + payload.len());
    buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    buf.extend_from_slice(&payload);
    Ok(buf)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<(T, usize), ProtocolError> {
    if bytes.len() < LENGTH_PREFIX_SIZE {
        return Err(ProtocolError::InsufficientData {
            needed: LENGTH_PREFIX_SIZE,
            available: bytes.len(),
        });
    }

    let payload_len = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
    if payload_len > MAX_PAYLOAD_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            declared: payload_len,
            limit: MAX_PAYLOAD_SIZE,
        });
    }

    let total = LENGTH_PREFIX_SIZE + payload_len;
    if bytes.len() < total {
        return Err(ProtocolError::InsufficientData {
            needed: total,
            available: bytes.len(),
        });
    }

    let msg = bincode::deserialize(&bytes[LENGTH_PREFIX_SIZE..total])?;
    Ok((msg, total))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
