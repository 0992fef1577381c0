//! Block transport over TCP or TLS
//!
//! [`BlockTransport`] works over any async byte stream; [`TcpTransport`] is
//! the concrete type used by connections.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Wake, Waker};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::client::TlsStream;

use crate::constants::{BLOCK_HEADER_SIZE, DEFAULT_MAX_MESSAGE_SIZE};
use crate::error::{Error, Result};
use crate::packet::{encode_message, BlockHeader, Frame, FrameAssembler};

use super::tls::{connect_tls, TlsConfig};
use super::Transport;

/// Non-blocking peer liveness check for a stream
pub trait Liveness {
    /// Return false once the peer has closed or reset the stream
    fn peer_alive(&self) -> bool {
        true
    }
}

impl Liveness for tokio::io::DuplexStream {}

struct NoopWake;

impl Wake for NoopWake {
    fn wake(self: Arc<Self>) {}
}

/// Peek at the socket without registering for wakeups
fn tcp_peer_alive(stream: &TcpStream) -> bool {
    let waker = Waker::from(Arc::new(NoopWake));
    let mut cx = Context::from_waker(&waker);
    let mut byte = [0u8; 1];
    let mut buf = ReadBuf::new(&mut byte);

    match stream.poll_peek(&mut cx, &mut buf) {
        Poll::Pending => true,
        Poll::Ready(Ok(0)) => false,
        Poll::Ready(Ok(_)) => true,
        Poll::Ready(Err(_)) => false,
    }
}

/// Stream type that can be either plain TCP or TLS-encrypted
pub enum MapiStream {
    /// Plain TCP connection
    Plain(TcpStream),
    /// TLS-encrypted connection
    Tls(Box<TlsStream<TcpStream>>),
}

impl MapiStream {
    fn tcp(&self) -> &TcpStream {
        match self {
            MapiStream::Plain(stream) => stream,
            MapiStream::Tls(stream) => stream.get_ref().0,
        }
    }
}

impl Liveness for MapiStream {
    fn peer_alive(&self) -> bool {
        tcp_peer_alive(self.tcp())
    }
}

impl AsyncRead for MapiStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            MapiStream::Plain(stream) => Pin::new(stream).poll_read(cx, buf),
            MapiStream::Tls(stream) => Pin::new(stream.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for MapiStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            MapiStream::Plain(stream) => Pin::new(stream).poll_write(cx, buf),
            MapiStream::Tls(stream) => Pin::new(stream.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            MapiStream::Plain(stream) => Pin::new(stream).poll_flush(cx),
            MapiStream::Tls(stream) => Pin::new(stream.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            MapiStream::Plain(stream) => Pin::new(stream).poll_shutdown(cx),
            MapiStream::Tls(stream) => Pin::new(stream.as_mut()).poll_shutdown(cx),
        }
    }
}

/// Transport used by [`crate::Connection`]
pub type TcpTransport = BlockTransport<MapiStream>;

/// Open a TCP (optionally TLS) transport to `host:port`
pub async fn connect(
    host: &str,
    port: u16,
    connect_timeout: Duration,
    tls: Option<&TlsConfig>,
) -> Result<TcpTransport> {
    let addr = format!("{}:{}", host, port);
    tracing::debug!(addr = %addr, tls = tls.is_some(), "opening transport");

    let tcp = timeout(connect_timeout, TcpStream::connect(&addr))
        .await
        .map_err(|_| Error::Timeout {
            operation: "connect",
            duration: connect_timeout,
        })?
        .map_err(Error::Io)?;

    tcp.set_nodelay(true).map_err(Error::Io)?;

    let stream = match tls {
        Some(tls_config) => {
            let tls_stream = timeout(connect_timeout, connect_tls(tcp, host, tls_config))
                .await
                .map_err(|_| Error::Timeout {
                    operation: "TLS handshake",
                    duration: connect_timeout,
                })??;
            MapiStream::Tls(Box::new(tls_stream))
        }
        None => MapiStream::Plain(tcp),
    };

    Ok(BlockTransport::new(stream))
}

/// MAPI block transport over any async byte stream
pub struct BlockTransport<S> {
    /// The underlying stream; `None` once closed
    stream: Option<S>,
    /// Deadline for assembling one message
    receive_timeout: Option<Duration>,
    /// Largest message accepted from the peer
    max_message_size: usize,
}

impl<S> BlockTransport<S>
where
    S: AsyncRead + AsyncWrite + Liveness + Unpin + Send,
{
    /// Wrap an established stream
    pub fn new(stream: S) -> Self {
        Self {
            stream: Some(stream),
            receive_timeout: None,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }

    /// Set the largest message accepted from the peer
    pub fn with_max_message_size(mut self, bytes: usize) -> Self {
        self.max_message_size = bytes;
        self
    }

    /// Set the receive timeout
    pub fn with_receive_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.receive_timeout = timeout;
        self
    }

    /// Get mutable access to the underlying stream
    fn stream_mut(&mut self) -> Result<&mut S> {
        self.stream.as_mut().ok_or(Error::ConnectionClosed)
    }

    /// Read blocks until the terminal block completes a message
    async fn read_frame(&mut self) -> Result<Frame> {
        let max_message_size = self.max_message_size;
        let stream = self.stream_mut()?;
        let mut assembler = FrameAssembler::with_limit(max_message_size);
        let mut header_buf = [0u8; BLOCK_HEADER_SIZE];
        let mut block = Vec::new();

        loop {
            stream
                .read_exact(&mut header_buf)
                .await
                .map_err(map_read_error)?;
            let header = BlockHeader::parse(&header_buf)?;

            block.resize(header.payload_length(), 0);
            stream.read_exact(&mut block).await.map_err(map_read_error)?;

            if let Some(frame) = assembler.push(header, &block)? {
                tracing::trace!(bytes = frame.len(), blocks = frame.blocks, "received message");
                return Ok(frame);
            }
        }
    }
}

fn map_read_error(e: std::io::Error) -> Error {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        Error::ConnectionClosed
    } else {
        Error::Io(e)
    }
}

#[async_trait::async_trait]
impl<S> Transport for BlockTransport<S>
where
    S: AsyncRead + AsyncWrite + Liveness + Unpin + Send,
{
    async fn send(&mut self, message: &[u8]) -> Result<()> {
        let encoded = encode_message(message);
        let stream = self.stream_mut()?;

        let result = async {
            stream.write_all(&encoded).await?;
            stream.flush().await
        }
        .await;

        if let Err(e) = result {
            self.stream = None;
            return Err(Error::Io(e));
        }

        tracing::trace!(bytes = message.len(), "sent message");
        Ok(())
    }

    async fn receive(&mut self) -> Result<Frame> {
        let result = match self.receive_timeout {
            Some(duration) => match timeout(duration, self.read_frame()).await {
                Ok(result) => result,
                Err(_) => Err(Error::Timeout {
                    operation: "receive",
                    duration,
                }),
            },
            None => self.read_frame().await,
        };

        if let Err(e) = &result {
            // the stream position is unknown after any failure mid-message
            tracing::debug!(error = %e, "receive failed, dropping stream");
            self.stream = None;
        }
        result
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn is_alive(&self) -> bool {
        self.stream.as_ref().map(Liveness::peer_alive).unwrap_or(false)
    }

    fn set_receive_timeout(&mut self, timeout: Option<Duration>) {
        self.receive_timeout = timeout;
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            stream.shutdown().await.map_err(Error::Io)?;
        }
        Ok(())
    }
}
