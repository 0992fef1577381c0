//! Read buffer for decoding MAPI replies
//!
//! MAPI replies are newline-separated text lines. `ReadBuffer` walks a
//! frame payload line by line without copying.

use bytes::Bytes;

use crate::error::{Error, Result};

/// A cursor over the lines of a reply payload
#[derive(Debug)]
pub struct ReadBuffer {
    /// The underlying byte data
    data: Bytes,
    /// Current read position
    pos: usize,
}

impl ReadBuffer {
    /// Create a new ReadBuffer from bytes
    pub fn new(data: Bytes) -> Self {
        Self { data, pos: 0 }
    }

    /// Create a new ReadBuffer from a byte slice
    pub fn from_slice(data: &[u8]) -> Self {
        Self {
            data: Bytes::copy_from_slice(data),
            pos: 0,
        }
    }

    /// Get the current position in the buffer
    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Get the number of bytes remaining to be read
    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    /// Check if all lines have been consumed
    #[inline]
    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }

    /// Peek at the first byte of the next line
    pub fn peek_u8(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    /// Read the next line without its trailing `\n`
    ///
    /// A final line without a terminating newline is returned as-is.
    /// Returns `Ok(None)` once the buffer is exhausted.
    pub fn read_line(&mut self) -> Result<Option<&str>> {
        if self.is_exhausted() {
            return Ok(None);
        }

        let rest = &self.data[self.pos..];
        let (line, consumed) = match rest.iter().position(|&b| b == b'\n') {
            Some(end) => (&rest[..end], end + 1),
            None => (rest, rest.len()),
        };
        let start = self.pos;
        self.pos += consumed;

        std::str::from_utf8(line).map(Some).map_err(|e| {
            Error::decode(format!("invalid UTF-8 in line at offset {}: {}", start, e))
        })
    }

    /// Read the next line, failing if none is left
    pub fn expect_line(&mut self, what: &str) -> Result<&str> {
        self.read_line()?
            .ok_or_else(|| Error::decode(format!("reply ended before {}", what)))
    }

    /// Skip lines while they start with `prefix`
    pub fn skip_lines_with(&mut self, prefix: u8) -> Result<usize> {
        let mut skipped = 0;
        while self.peek_u8() == Some(prefix) {
            self.read_line()?;
            skipped += 1;
        }
        Ok(skipped)
    }

    /// Get a slice of the remaining data
    pub fn remaining_slice(&self) -> &[u8] {
        &self.data[self.pos..]
    }
}
