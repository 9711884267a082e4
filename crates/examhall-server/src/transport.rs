//! Tokio TCP listener.

use std::{io, net::SocketAddr};

use async_trait::async_trait;
use examhall_core::Listener;
use tokio::net::{TcpListener, TcpStream};

/// Production listener on a Tokio TCP socket.
#[derive(Debug)]
pub struct TcpTransport {
    listener: TcpListener,
}

impl TcpTransport {
    /// Bind to `address` (e.g. `"0.0.0.0:8888"`).
    pub async fn bind(address: &str) -> io::Result<Self> {
        let listener = TcpListener::bind(address).await?;
        Ok(Self { listener })
    }
}

#[async_trait]
impl Listener for TcpTransport {
    type Stream = TcpStream;

    async fn accept(&self) -> io::Result<(Self::Stream, SocketAddr)> {
        let (stream, addr) = self.listener.accept().await?;
        // Small frames; don't wait to coalesce.
        stream.set_nodelay(true)?;
        Ok((stream, addr))
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}
