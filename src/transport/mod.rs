//! Transport layer for MonetDB connections
//!
//! Owns the byte stream to the server (TCP or TLS) and turns it into whole
//! MAPI messages using the block framing in [`crate::packet`].

mod tcp;
pub mod tls;

pub use tcp::{connect, BlockTransport, Liveness, MapiStream, TcpTransport};
pub use tls::{connect_tls, TlsConfig};

use std::time::Duration;

use crate::error::Result;
use crate::packet::Frame;

/// Trait for transport implementations
#[async_trait::async_trait]
pub trait Transport: Send {
    /// Send one logical message, split into blocks
    async fn send(&mut self, message: &[u8]) -> Result<()>;

    /// Receive one logical message, joining continuation blocks
    async fn receive(&mut self) -> Result<Frame>;

    /// Check if the transport is connected
    fn is_connected(&self) -> bool;

    /// Non-blocking check that the peer has not hung up
    fn is_alive(&self) -> bool;

    /// Set the deadline applied to each `receive`
    fn set_receive_timeout(&mut self, timeout: Option<Duration>);

    /// Close the connection
    async fn close(&mut self) -> Result<()>;
}
