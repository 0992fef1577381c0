//! Error types for the MonetDB driver
//!
//! This module defines all error types that can occur during MonetDB
//! operations, from low-level framing errors to server-reported SQL errors.
//! Every variant belongs to one [`ErrorKind`], which tells the caller how the
//! connection is affected.

use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::session::SessionState;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Broad category of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Network-level failure; the caller may reconnect
    Transport,
    /// A connect, handshake or receive deadline expired
    Timeout,
    /// Credentials or negotiation failure; not retryable with the same credentials
    Auth,
    /// Operation invalid for the current session state
    State,
    /// The server rejected the command; the connection remains usable
    Exec,
    /// Malformed or unrecognized response from the server
    Decode,
    /// Invalid client configuration
    Config,
}

/// Main error type for the MonetDB driver
#[derive(Error, Debug)]
#[allow(missing_docs)]
pub enum Error {
    // =========================================================================
    // Transport Errors
    // =========================================================================
    /// Underlying I/O error (refused, reset, broken pipe)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Connection closed by the peer
    #[error("connection closed unexpectedly")]
    ConnectionClosed,

    /// Block header declared an impossible length
    #[error("malformed frame header: {0}")]
    MalformedFrame(String),

    /// TLS setup or handshake failure
    #[error("TLS error: {0}")]
    Tls(String),

    // =========================================================================
    // Timeout Errors
    // =========================================================================
    /// A deadline expired while waiting on the server
    #[error("{operation} timed out after {duration:?}")]
    Timeout {
        operation: &'static str,
        duration: Duration,
    },

    // =========================================================================
    // Authentication Errors
    // =========================================================================
    /// Server rejected the username or password
    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    /// Requested database does not exist on the server
    #[error("no such database '{database}': {message}")]
    NoSuchDatabase { database: String, message: String },

    /// No hash algorithm supported by both sides
    #[error("no common hash algorithm (server offers: {server})")]
    NoCommonHashAlgorithm { server: String },

    /// Server speaks a protocol version we do not implement
    #[error("unsupported MAPI protocol version: {0}")]
    UnsupportedProtocol(String),

    /// Server challenge could not be parsed
    #[error("invalid server challenge: {0}")]
    InvalidChallenge(String),

    /// Server redirected more often than allowed
    #[error("too many redirects (last target: {0})")]
    TooManyRedirects(String),

    /// Any other handshake rejection
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    // =========================================================================
    // State Errors
    // =========================================================================
    /// Another command is in flight on this connection
    #[error("connection is busy with another command")]
    Busy,

    /// Operation not allowed in the current session state
    #[error("cannot {operation} while connection is {state:?}")]
    InvalidState {
        state: SessionState,
        operation: &'static str,
    },

    /// A result set was used after another command ran on its connection
    #[error("result set {query_id} is no longer valid on this connection")]
    ResultSetInvalidated { query_id: i64 },

    // =========================================================================
    // Execution Errors
    // =========================================================================
    /// Server rejected the command
    #[error("server error{}: {message}", code.as_ref().map(|c| format!(" [{}]", c)).unwrap_or_default())]
    Server {
        code: Option<String>,
        message: String,
    },

    /// The command succeeded but did not produce what the caller asked for
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    // =========================================================================
    // Decode Errors
    // =========================================================================
    /// Server sent a column type this driver does not know
    #[error("unknown wire type: {0}")]
    UnknownType(String),

    /// Malformed response payload
    #[error("decode error: {0}")]
    Decode(String),

    /// A value could not be converted to its column type
    #[error("cannot convert {value:?} to {type_name}")]
    DataConversion { value: String, type_name: String },

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid connection URL or option
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Create a server error from an error line payload
    pub fn server(code: Option<String>, message: impl Into<String>) -> Self {
        Error::Server {
            code,
            message: message.into(),
        }
    }

    /// Create a decode error
    pub fn decode(message: impl Into<String>) -> Self {
        Error::Decode(message.into())
    }

    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Io(_) | Error::ConnectionClosed | Error::MalformedFrame(_) | Error::Tls(_) => {
                ErrorKind::Transport
            }
            Error::Timeout { .. } => ErrorKind::Timeout,
            Error::InvalidCredentials(_)
            | Error::NoSuchDatabase { .. }
            | Error::NoCommonHashAlgorithm { .. }
            | Error::UnsupportedProtocol(_)
            | Error::InvalidChallenge(_)
            | Error::TooManyRedirects(_)
            | Error::AuthenticationFailed(_) => ErrorKind::Auth,
            Error::Busy | Error::InvalidState { .. } | Error::ResultSetInvalidated { .. } => {
                ErrorKind::State
            }
            Error::Server { .. } | Error::UnexpectedResponse(_) => ErrorKind::Exec,
            Error::UnknownType(_) | Error::Decode(_) | Error::DataConversion { .. } => {
                ErrorKind::Decode
            }
            Error::InvalidConfig(_) => ErrorKind::Config,
        }
    }

    /// Whether this error leaves the connection unusable
    ///
    /// Transport, timeout and decode errors desynchronize the stream and
    /// force the session into `Failed`.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Transport | ErrorKind::Timeout | ErrorKind::Decode | ErrorKind::Auth
        )
    }

    /// Check if this is a connection-related error
    pub fn is_connection_error(&self) -> bool {
        matches!(self.kind(), ErrorKind::Transport | ErrorKind::Timeout)
    }

    /// Check if the server reported that the database does not exist
    pub fn is_no_such_database(&self) -> bool {
        matches!(self, Error::NoSuchDatabase { .. })
    }

    /// Check if this error is recoverable by reconnecting
    pub fn is_recoverable(&self) -> bool {
        self.is_connection_error()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_error_display() {
        let err = Error::server(Some("42000".to_string()), "syntax error, unexpected IDENT");
        assert_eq!(
            err.to_string(),
            "server error [42000]: syntax error, unexpected IDENT"
        );

        let err = Error::server(None, "boom");
        assert_eq!(err.to_string(), "server error: boom");
    }

    #[test]
    fn test_kinds() {
        assert_eq!(Error::ConnectionClosed.kind(), ErrorKind::Transport);
        assert_eq!(
            Error::Timeout {
                operation: "receive",
                duration: Duration::from_secs(1)
            }
            .kind(),
            ErrorKind::Timeout
        );
        assert_eq!(Error::Busy.kind(), ErrorKind::State);
        assert_eq!(Error::UnknownType("geometry".into()).kind(), ErrorKind::Decode);
        assert_eq!(Error::server(None, "x").kind(), ErrorKind::Exec);
        assert_eq!(
            Error::InvalidCredentials("nope".into()).kind(),
            ErrorKind::Auth
        );
    }

    #[test]
    fn test_fatality() {
        assert!(Error::ConnectionClosed.is_fatal());
        assert!(Error::decode("bad").is_fatal());
        assert!(!Error::server(None, "x").is_fatal());
        assert!(!Error::Busy.is_fatal());
    }

    #[test]
    fn test_is_no_such_database() {
        let err = Error::NoSuchDatabase {
            database: "demo".into(),
            message: "no such database 'demo', please create it first".into(),
        };
        assert!(err.is_no_such_database());
        assert!(!Error::ConnectionClosed.is_no_such_database());
    }

    #[test]
    fn test_is_connection_error() {
        assert!(Error::ConnectionClosed.is_connection_error());
        assert!(Error::Io(io::Error::from(io::ErrorKind::ConnectionReset)).is_connection_error());
        assert!(!Error::Busy.is_connection_error());
    }
}
