//! Integration tests for the block framing

use bytes::Bytes;
use monetdb_rs::constants::{BLOCK_HEADER_SIZE, MAX_BLOCK_PAYLOAD};
use monetdb_rs::packet::{decode_message, encode_message, BlockHeader, FrameAssembler};
use monetdb_rs::Error;

#[test]
fn test_block_header_bit_layout() {
    let header = BlockHeader::new(11, true);
    assert_eq!(header.encode(), [0x17, 0x00]);

    let header = BlockHeader::new(MAX_BLOCK_PAYLOAD as u16, false);
    assert_eq!(header.encode(), [0xfc, 0x3f]);

    let parsed = BlockHeader::parse(&[0xfd, 0x3f]).unwrap();
    assert_eq!(parsed.length as usize, MAX_BLOCK_PAYLOAD);
    assert!(parsed.last);
}

#[test]
fn test_oversized_block_is_malformed() {
    // 8191 << 1
    let err = BlockHeader::parse(&[0xfe, 0x3f]).unwrap_err();
    assert!(matches!(err, Error::MalformedFrame(_)));
}

#[test]
fn test_short_header_is_malformed() {
    assert!(matches!(
        BlockHeader::parse(&[0x01]),
        Err(Error::MalformedFrame(_))
    ));
}

#[test]
fn test_empty_message_is_one_terminal_block() {
    let encoded = encode_message(b"");
    assert_eq!(&encoded[..], &[0x01, 0x00]);

    let frame = decode_message(&encoded).unwrap();
    assert!(frame.is_empty());
    assert_eq!(frame.blocks, 1);
}

#[test]
fn test_message_at_block_boundary() {
    let message = vec![b'x'; MAX_BLOCK_PAYLOAD];
    let encoded = encode_message(&message);

    // exactly one full block, no trailing empty block
    assert_eq!(encoded.len(), BLOCK_HEADER_SIZE + MAX_BLOCK_PAYLOAD);
    let header = BlockHeader::parse(&encoded).unwrap();
    assert!(header.last);
}

#[test]
fn test_large_message_spans_blocks() {
    let message: Vec<u8> = (0..20_000u32).map(|i| b'a' + (i % 26) as u8).collect();
    let encoded = encode_message(&message);
    assert_eq!(encoded.len(), message.len() + 3 * BLOCK_HEADER_SIZE);

    let first = BlockHeader::parse(&encoded).unwrap();
    assert_eq!(first.payload_length(), MAX_BLOCK_PAYLOAD);
    assert!(!first.last);

    let frame = decode_message(&encoded).unwrap();
    assert_eq!(frame.blocks, 3);
    assert_eq!(&frame.payload[..], &message[..]);
}

#[test]
fn test_assembler_joins_blocks() {
    let mut assembler = FrameAssembler::new();

    assert!(assembler
        .push(BlockHeader::new(6, false), b"&2 1 -")
        .unwrap()
        .is_none());
    assert_eq!(assembler.pending_blocks(), 1);

    let frame = assembler
        .push(BlockHeader::new(2, true), b"1\n")
        .unwrap()
        .unwrap();
    assert_eq!(frame.text().unwrap(), "&2 1 -1\n");
    assert_eq!(frame.blocks, 2);
    assert_eq!(assembler.pending_blocks(), 0);
}

#[test]
fn test_assembler_rejects_length_mismatch() {
    let mut assembler = FrameAssembler::new();
    let err = assembler
        .push(BlockHeader::new(10, true), b"short")
        .unwrap_err();
    assert!(matches!(err, Error::MalformedFrame(_)));
}

#[test]
fn test_truncated_message() {
    let encoded = encode_message(b"sSELECT 1\n;");
    let err = decode_message(&encoded[..encoded.len() - 3]).unwrap_err();
    assert!(matches!(err, Error::MalformedFrame(_)));

    // a non-terminal block and nothing after it
    let partial = Bytes::from_static(&[0x04, 0x00, b'a', b'b']);
    assert!(matches!(
        decode_message(&partial),
        Err(Error::MalformedFrame(_))
    ));
}
