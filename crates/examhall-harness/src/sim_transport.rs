//! Turmoil-based transport implementations.

use std::{io, net::SocketAddr};

use async_trait::async_trait;
use examhall_core::{Connector, Listener};
use turmoil::net::{TcpListener, TcpStream};

/// Coordinator listener on Turmoil's simulated TCP.
pub struct SimListener {
    listener: TcpListener,
}

impl SimListener {
    /// Bind to `address` (e.g. `"0.0.0.0:8888"`) on the current host.
    pub async fn bind(address: &str) -> io::Result<Self> {
        let listener = TcpListener::bind(address).await?;
        Ok(Self { listener })
    }
}

#[async_trait]
impl Listener for SimListener {
    type Stream = TcpStream;

    async fn accept(&self) -> io::Result<(Self::Stream, SocketAddr)> {
        self.listener.accept().await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

/// Participant connector on Turmoil's simulated TCP.
///
/// Addresses use Turmoil host names, e.g. `"server:8888"`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimConnector;

#[async_trait]
impl Connector for SimConnector {
    type Stream = TcpStream;

    async fn connect(&self, address: &str) -> io::Result<Self::Stream> {
        TcpStream::connect(address).await
    }
}
