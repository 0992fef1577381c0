//! MAPI block header encoding/decoding
//!
//! Every block starts with a 2-byte little-endian header:
//!
//! ```text
//! +--------+--------+
//! | length << 1 | last |
//! +--------+--------+
//!   bit 0      : 1 if this is the final block of the message
//!   bits 1..15 : payload length in bytes
//! ```

use crate::constants::{BLOCK_HEADER_SIZE, LAST_BLOCK_FLAG, MAX_BLOCK_PAYLOAD};
use crate::error::{Error, Result};

/// MAPI block header (2 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    /// Payload length in bytes
    pub length: u16,
    /// Whether this block terminates the logical message
    pub last: bool,
}

impl BlockHeader {
    /// Create a new block header
    pub fn new(length: u16, last: bool) -> Self {
        Self { length, last }
    }

    /// Parse a block header from raw bytes
    ///
    /// A header announcing more than [`MAX_BLOCK_PAYLOAD`] bytes is malformed.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < BLOCK_HEADER_SIZE {
            return Err(Error::MalformedFrame(format!(
                "header needs {} bytes, got {}",
                BLOCK_HEADER_SIZE,
                data.len()
            )));
        }

        let raw = u16::from_le_bytes([data[0], data[1]]);
        let length = raw >> 1;
        if length as usize > MAX_BLOCK_PAYLOAD {
            return Err(Error::MalformedFrame(format!(
                "block length {} exceeds maximum {}",
                length, MAX_BLOCK_PAYLOAD
            )));
        }

        Ok(Self {
            length,
            last: raw & LAST_BLOCK_FLAG != 0,
        })
    }

    /// Encode the header to its 2-byte wire form
    pub fn encode(&self) -> [u8; BLOCK_HEADER_SIZE] {
        let raw = (self.length << 1) | if self.last { LAST_BLOCK_FLAG } else { 0 };
        raw.to_le_bytes()
    }

    /// Payload length as usize
    pub fn payload_length(&self) -> usize {
        self.length as usize
    }
}
