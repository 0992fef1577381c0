//! Buffer abstractions for MAPI protocol decoding
//!
//! This module provides the line cursor used to walk textual MAPI replies.

mod read;

pub use read::ReadBuffer;
