//! MAPI block framing
//!
//! A logical MAPI message is sent as one or more blocks. This module splits
//! outgoing messages into blocks and reassembles incoming blocks into a
//! [`Frame`].

mod header;

pub use header::BlockHeader;

use bytes::{BufMut, Bytes, BytesMut};

use crate::constants::{BLOCK_HEADER_SIZE, MAX_BLOCK_PAYLOAD};
use crate::error::{Error, Result};

/// One complete logical message received from the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Concatenated payload of all blocks
    pub payload: Bytes,
    /// Number of blocks the message arrived in
    pub blocks: usize,
}

impl Frame {
    /// Create a frame from an already-assembled payload
    pub fn new(payload: Bytes, blocks: usize) -> Self {
        Self { payload, blocks }
    }

    /// Payload interpreted as UTF-8 text
    pub fn text(&self) -> Result<&str> {
        std::str::from_utf8(&self.payload)
            .map_err(|e| Error::decode(format!("response is not valid UTF-8: {}", e)))
    }

    /// Whether the message is empty (the server prompt)
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Payload size in bytes
    pub fn len(&self) -> usize {
        self.payload.len()
    }
}

/// Reassembles blocks into a frame
#[derive(Debug)]
pub struct FrameAssembler {
    payload: BytesMut,
    blocks: usize,
    max_size: usize,
}

impl Default for FrameAssembler {
    fn default() -> Self {
        Self::with_limit(usize::MAX)
    }
}

impl FrameAssembler {
    /// Create an empty assembler
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an assembler that rejects messages larger than `max_size` bytes
    pub fn with_limit(max_size: usize) -> Self {
        Self {
            payload: BytesMut::new(),
            blocks: 0,
            max_size,
        }
    }

    /// Append one block; returns the frame once the terminal block arrives
    pub fn push(&mut self, header: BlockHeader, data: &[u8]) -> Result<Option<Frame>> {
        if data.len() != header.payload_length() {
            return Err(Error::MalformedFrame(format!(
                "block announced {} bytes but carried {}",
                header.length,
                data.len()
            )));
        }
        if self.payload.len().saturating_add(data.len()) > self.max_size {
            return Err(Error::MalformedFrame(format!(
                "message exceeds {} bytes",
                self.max_size
            )));
        }

        self.payload.extend_from_slice(data);
        self.blocks += 1;

        if header.last {
            let payload = std::mem::take(&mut self.payload).freeze();
            let blocks = std::mem::replace(&mut self.blocks, 0);
            Ok(Some(Frame::new(payload, blocks)))
        } else {
            Ok(None)
        }
    }

    /// Number of blocks buffered for the message in progress
    pub fn pending_blocks(&self) -> usize {
        self.blocks
    }
}

/// Split a message into wire blocks
///
/// An empty message is encoded as a single empty terminal block.
pub fn encode_message(message: &[u8]) -> Bytes {
    let block_count = message.len().div_ceil(MAX_BLOCK_PAYLOAD).max(1);
    let mut out = BytesMut::with_capacity(message.len() + block_count * BLOCK_HEADER_SIZE);

    if message.is_empty() {
        out.put_slice(&BlockHeader::new(0, true).encode());
        return out.freeze();
    }

    let mut chunks = message.chunks(MAX_BLOCK_PAYLOAD).peekable();
    while let Some(chunk) = chunks.next() {
        let last = chunks.peek().is_none();
        out.put_slice(&BlockHeader::new(chunk.len() as u16, last).encode());
        out.put_slice(chunk);
    }

    out.freeze()
}

/// Decode a complete buffer of blocks into one frame
///
/// Used for already-buffered data such as captured traffic; live traffic
/// goes through the transport.
pub fn decode_message(data: &[u8]) -> Result<Frame> {
    let mut assembler = FrameAssembler::new();
    let mut pos = 0;

    while pos < data.len() {
        let header = BlockHeader::parse(&data[pos..])?;
        pos += BLOCK_HEADER_SIZE;
        let end = pos + header.payload_length();
        if end > data.len() {
            return Err(Error::MalformedFrame(format!(
                "block truncated: need {} bytes, have {}",
                header.length,
                data.len() - pos
            )));
        }
        if let Some(frame) = assembler.push(header, &data[pos..end])? {
            return Ok(frame);
        }
        pos = end;
    }

    Err(Error::MalformedFrame(
        "message ended without a terminal block".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_small_message() {
        let encoded = encode_message(b"sSELECT 1;\n");
        assert_eq!(encoded.len(), 2 + 11);
        let header = BlockHeader::parse(&encoded).unwrap();
        assert_eq!(header.length, 11);
        assert!(header.last);
        assert_eq!(&encoded[2..], b"sSELECT 1;\n");
    }

    #[test]
    fn test_encode_empty_message() {
        assert_eq!(&encode_message(b"")[..], &[0x01, 0x00]);
    }

    #[test]
    fn test_encode_splits_at_block_limit() {
        let message = vec![b'a'; MAX_BLOCK_PAYLOAD * 2 + 10];
        let encoded = encode_message(&message);
        assert_eq!(encoded.len(), message.len() + 3 * BLOCK_HEADER_SIZE);

        let first = BlockHeader::parse(&encoded).unwrap();
        assert_eq!(first.payload_length(), MAX_BLOCK_PAYLOAD);
        assert!(!first.last);

        let frame = decode_message(&encoded).unwrap();
        assert_eq!(frame.blocks, 3);
        assert_eq!(frame.payload.len(), message.len());
    }

    #[test]
    fn test_exact_multiple_has_no_trailing_empty_block() {
        let message = vec![b'x'; MAX_BLOCK_PAYLOAD];
        let encoded = encode_message(&message);
        let frame = decode_message(&encoded).unwrap();
        assert_eq!(frame.blocks, 1);
    }

    #[test]
    fn test_decode_truncated() {
        let mut encoded = encode_message(b"hello").to_vec();
        encoded.truncate(4);
        assert!(matches!(
            decode_message(&encoded),
            Err(Error::MalformedFrame(_))
        ));
    }

    #[test]
    fn test_assembler_enforces_limit() {
        let mut assembler = FrameAssembler::with_limit(10);
        assert!(assembler
            .push(BlockHeader::new(6, false), b"abcdef")
            .unwrap()
            .is_none());
        let err = assembler
            .push(BlockHeader::new(6, false), b"ghijkl")
            .unwrap_err();
        assert!(matches!(err, Error::MalformedFrame(_)));

        let mut assembler = FrameAssembler::with_limit(10);
        let frame = assembler
            .push(BlockHeader::new(10, true), b"0123456789")
            .unwrap()
            .unwrap();
        assert_eq!(frame.len(), 10);
    }

    #[test]
    fn test_decode_missing_terminal_block() {
        let mut data = BlockHeader::new(3, false).encode().to_vec();
        data.extend_from_slice(b"abc");
        assert!(decode_message(&data).is_err());
    }

    #[test]
    fn test_assembler_resets_between_frames() {
        let mut assembler = FrameAssembler::new();
        assert!(assembler
            .push(BlockHeader::new(2, false), b"ab")
            .unwrap()
            .is_none());
        assert_eq!(assembler.pending_blocks(), 1);
        let frame = assembler
            .push(BlockHeader::new(1, true), b"c")
            .unwrap()
            .unwrap();
        assert_eq!(&frame.payload[..], b"abc");
        assert_eq!(assembler.pending_blocks(), 0);

        let frame = assembler
            .push(BlockHeader::new(0, true), b"")
            .unwrap()
            .unwrap();
        assert!(frame.is_empty());
    }
}
