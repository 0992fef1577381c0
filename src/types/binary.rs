//! BLOB values
//!
//! The server sends BLOB values as unquoted uppercase hex.

use crate::error::{Error, Result};

/// Decode a hex BLOB literal
pub fn decode_blob(text: &str) -> Result<Vec<u8>> {
    hex::decode(text).map_err(|e| Error::DataConversion {
        value: format!("{} ({})", text, e),
        type_name: "blob".to_string(),
    })
}

/// Encode bytes as a BLOB literal body
pub fn encode_blob(data: &[u8]) -> String {
    hex::encode_upper(data)
}
