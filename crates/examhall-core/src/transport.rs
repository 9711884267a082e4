//! Transport abstraction and framed stream helpers.
//!
//! The coordinator and participant runtimes only see [`Listener`] and
//! [`Connector`], so the same code runs over Tokio TCP in production and over
//! Turmoil's simulated TCP in the harness. Both yield a single bidirectional
//! byte stream per connection; callers split it with `tokio::io::split`.

use std::{io, net::SocketAddr};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use examhall_proto::{Envelope, FrameCodec, ProtocolError};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Byte stream carrying one session.
pub trait SessionStream: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

impl<T> SessionStream for T where T: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

/// Accepts inbound connections.
#[async_trait]
pub trait Listener: Send + Sync + 'static {
    /// Stream type of accepted connections.
    type Stream: SessionStream;

    /// Wait for the next connection.
    async fn accept(&self) -> io::Result<(Self::Stream, SocketAddr)>;

    /// Address the listener is bound to.
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

/// Opens outbound connections.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Stream type of established connections.
    type Stream: SessionStream;

    /// Connect to `address` (`host:port`).
    async fn connect(&self, address: &str) -> io::Result<Self::Stream>;
}

/// Errors on a framed stream.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Socket failure
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// Framing or encoding failure
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Peer closed the stream in the middle of a frame
    #[error("connection closed mid-frame ({buffered} bytes buffered)")]
    TruncatedFrame {
        /// Bytes of the partial frame
        buffered: usize,
    },
}

impl TransportError {
    /// Whether the connection must be torn down.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Io(_) | Self::TruncatedFrame { .. } => true,
            Self::Protocol(e) => e.is_fatal(),
        }
    }
}

/// Reads length-prefixed frames from a byte stream.
///
/// [`FrameReader::next_frame`] is cancel safe: bytes read before the future
/// is dropped stay buffered, so it can sit inside `select!` or `timeout`.
#[derive(Debug)]
pub struct FrameReader<R> {
    inner: R,
    buf: BytesMut,
    codec: FrameCodec,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Wrap `inner`, enforcing `codec`'s size bound.
    pub fn new(inner: R, codec: FrameCodec) -> Self {
        Self { inner, buf: BytesMut::with_capacity(4096), codec }
    }

    /// Next complete frame body, or `None` on a clean end of stream.
    pub async fn next_frame(&mut self) -> Result<Option<Bytes>, TransportError> {
        loop {
            if let Some(frame) = self.codec.decode(&mut self.buf)? {
                return Ok(Some(frame));
            }
            if self.inner.read_buf(&mut self.buf).await? == 0 {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                return Err(TransportError::TruncatedFrame { buffered: self.buf.len() });
            }
        }
    }
}

/// Encode `envelope` as one frame and flush it.
pub async fn write_envelope<W: AsyncWrite + Unpin>(
    writer: &mut W,
    codec: &FrameCodec,
    envelope: &Envelope,
) -> Result<(), TransportError> {
    let frame = codec.encode_to_vec(envelope)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}
