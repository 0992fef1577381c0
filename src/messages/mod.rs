//! MAPI protocol messages
//!
//! This module contains the handshake messages and reply classification for
//! the MAPI text protocol.

mod auth;
mod challenge;
mod redirect;
mod response;

pub use auth::{classify_failure, AuthMessage, AuthReply};
pub use challenge::Challenge;
pub use redirect::RedirectTarget;
pub use response::{parse_error_line, server_error, ResponseKind};
