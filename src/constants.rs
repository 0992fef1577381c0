//! MAPI protocol constants
//!
//! This module contains the constants used in the MonetDB MAPI protocol,
//! version 9, as spoken by `mserver5` and the `monetdbd` (merovingian) proxy.

// =============================================================================
// Block framing
// =============================================================================

/// Size of a block header in bytes (little-endian u16)
pub const BLOCK_HEADER_SIZE: usize = 2;

/// Largest payload a single block may carry
///
/// The header stores `length << 1 | last` in 16 bits and the server caps
/// blocks at 8 KiB including the header.
pub const MAX_BLOCK_PAYLOAD: usize = 8190;

/// Bit in the block header marking the final block of a message
pub const LAST_BLOCK_FLAG: u16 = 0x0001;

/// Default cap on the size of one reassembled message
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 256 * 1024 * 1024;

// =============================================================================
// Handshake
// =============================================================================

/// Default MonetDB port
pub const DEFAULT_PORT: u16 = 50000;

/// The only protocol version this driver speaks
pub const PROTOCOL_VERSION: &str = "9";

/// Default query language
pub const DEFAULT_LANGUAGE: &str = "sql";

/// Number of redirects followed during a single connect
pub const MAX_REDIRECTS: usize = 1;

/// Prefix of a redirect target in a handshake reply
pub const REDIRECT_SCHEME: &str = "mapi:";

/// Endianness markers sent in the challenge and the response
#[allow(missing_docs)]
pub mod endian {
    pub const BIG: &str = "BIG";
    pub const LITTLE: &str = "LIT";
}

// =============================================================================
// Reply line prefixes
// =============================================================================

/// First byte of each reply line
#[allow(missing_docs)]
pub mod line {
    pub const INFO: u8 = b'#';
    pub const ERROR: u8 = b'!';
    pub const QUERY: u8 = b'&';
    pub const HEADER: u8 = b'%';
    pub const TUPLE: u8 = b'[';
    pub const VALUE: u8 = b'=';
    pub const REDIRECT: u8 = b'^';
}

/// Digit following `&` in a query reply
#[allow(missing_docs)]
pub mod query_reply {
    pub const TABLE: u8 = b'1';
    pub const UPDATE: u8 = b'2';
    pub const SCHEMA: u8 = b'3';
    pub const TRANSACTION: u8 = b'4';
    pub const PREPARE: u8 = b'5';
    pub const BLOCK: u8 = b'6';
}

/// Header line names (the part after `#`)
#[allow(missing_docs)]
pub mod header {
    pub const TABLE_NAME: &str = "table_name";
    pub const NAME: &str = "name";
    pub const TYPE: &str = "type";
    pub const LENGTH: &str = "length";
    pub const TYPESIZES: &str = "typesizes";
}

// =============================================================================
// Commands
// =============================================================================

/// Prefix byte for a SQL query
pub const QUERY_PREFIX: u8 = b's';

/// Prefix byte for a control command
pub const CONTROL_PREFIX: u8 = b'X';

/// Default number of rows returned with the first reply
pub const DEFAULT_REPLY_SIZE: u32 = 100;

/// Control command names
#[allow(missing_docs)]
pub mod control {
    pub const REPLY_SIZE: &str = "reply_size";
    pub const AUTO_COMMIT: &str = "auto_commit";
    pub const SIZE_HEADER: &str = "sizeheader";
    pub const EXPORT: &str = "export";
    pub const CLOSE: &str = "close";
}

/// Literal used by the server for SQL NULL in tuple lines
pub const NULL_LITERAL: &str = "NULL";
