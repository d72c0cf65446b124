//! Wire codec for the model-serving protocol.
//!
//! Every message on the transport is preceded by a 4-byte little-endian
//! length prefix. The payload is a flat binary layout: a fixed 16-byte
//! integer header followed by variable-length sections whose lengths come
//! from preceding count fields or NUL termination. All decoding goes
//! through a checked cursor so a hostile length field yields a
//! [`WireError::Malformed`] instead of an out-of-bounds read.

mod cursor;
mod request;
mod response;

pub use cursor::Cursor;
pub use request::{
    decode_request, encode_request, InferRequest, RegisterRequest, Request, WireTensor,
    HEADER_LEN, MAX_MESSAGE_SIZE, TAG_HEX_LEN,
};
pub use response::Response;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WireError {
    #[error("malformed request: {0}")]
    Malformed(String),

    #[error("message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error("unknown command: {0}")]
    UnknownCommand(i32),
}

/// Frame a payload with the 4-byte length prefix used on the transport.
pub fn frame(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + payload.len());
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(payload);
    out
}
