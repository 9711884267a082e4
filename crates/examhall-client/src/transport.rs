//! Tokio TCP connector.

use std::io;

use async_trait::async_trait;
use examhall_core::Connector;
use tokio::net::TcpStream;

/// Production connector opening Tokio TCP streams.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    type Stream = TcpStream;

    async fn connect(&self, address: &str) -> io::Result<Self::Stream> {
        let stream = TcpStream::connect(address).await?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }
}
