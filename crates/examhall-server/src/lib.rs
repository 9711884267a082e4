//! Examhall coordinator runtime.
//!
//! Runs the session protocol on Tokio: one accept loop, one reader task and
//! one writer task per connection, and a cancellable countdown per exam. The
//! domain logic lives in `examhall-core`; this crate wires it to sockets and
//! timers.
//!
//! ## Architecture
//!
//! ```text
//! examhall-server
//!   ├─ TcpTransport   (Tokio TCP listener)
//!   ├─ Server         (accept loop, generic over Listener)
//!   ├─ connection     (reader task, writer task, ChannelSink)
//!   ├─ Coordinator    (registry + lifecycle + aggregator, countdown)
//!   └─ console        (operator commands)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod connection;
pub mod console;
mod coordinator;
mod error;
mod transport;

pub use connection::{ChannelSink, CloseReason, ConnectionConfig, Outbound, handle_connection};
pub use coordinator::{Coordinator, CoordinatorError, CoordinatorStatus};
pub use error::ServerError;
pub use examhall_core::SystemEnv;
use examhall_core::{Environment, Listener, MemoryStorage, Storage, TimeoutConfig};
use examhall_proto::{DEFAULT_MAX_FRAME_SIZE, FrameCodec};
pub use transport::TcpTransport;

/// Server configuration for the production runtime.
#[derive(Debug, Clone)]
pub struct ServerRuntimeConfig {
    /// Address to bind to (e.g., "0.0.0.0:8888")
    pub bind_address: String,
    /// Idle windows; the coordinator enforces `read_idle`
    pub timeouts: TimeoutConfig,
    /// Largest accepted envelope in bytes
    pub max_frame_size: usize,
    /// Malformed frames tolerated per connection; `None` tolerates any number
    pub max_protocol_faults: Option<u32>,
}

impl ServerRuntimeConfig {
    /// Defaults with the given bind address.
    pub fn new(bind_address: impl Into<String>) -> Self {
        Self {
            bind_address: bind_address.into(),
            timeouts: TimeoutConfig::default(),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            max_protocol_faults: None,
        }
    }

    fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            timeouts: self.timeouts,
            codec: FrameCodec::new(self.max_frame_size),
            max_protocol_faults: self.max_protocol_faults,
        }
    }
}

/// Coordinator server.
///
/// Generic over the listener so the same accept loop runs on Tokio TCP and
/// in simulation.
pub struct Server<L, E, S> {
    listener: L,
    coordinator: Coordinator<E, S>,
    config: ServerRuntimeConfig,
}

impl<S: Storage> Server<TcpTransport, SystemEnv, S> {
    /// Bind a production server on `config.bind_address`.
    ///
    /// # Errors
    ///
    /// Returns error if the timeouts are inconsistent or binding fails.
    pub async fn bind(config: ServerRuntimeConfig, storage: S) -> Result<Self, ServerError> {
        config.timeouts.validate()?;
        let listener = TcpTransport::bind(&config.bind_address).await?;
        Ok(Self { listener, coordinator: Coordinator::new(SystemEnv::new(), storage), config })
    }
}

impl Server<TcpTransport, SystemEnv, MemoryStorage> {
    /// Bind a production server with in-memory storage.
    pub async fn bind_in_memory(config: ServerRuntimeConfig) -> Result<Self, ServerError> {
        Self::bind(config, MemoryStorage::new()).await
    }
}

impl<L: Listener, E: Environment, S: Storage> Server<L, E, S> {
    /// Assemble a server from parts.
    pub fn new(listener: L, coordinator: Coordinator<E, S>, config: ServerRuntimeConfig) -> Self {
        Self { listener, coordinator, config }
    }

    /// Handle for operator actions; clones share state with the server.
    pub fn coordinator(&self) -> &Coordinator<E, S> {
        &self.coordinator
    }

    /// Get the local address the server is bound to.
    pub fn local_addr(&self) -> Result<std::net::SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until the task is cancelled.
    ///
    /// Accept failures are logged and do not stop the loop.
    pub async fn run(self) -> Result<(), ServerError> {
        tracing::info!("Server listening on {}", self.listener.local_addr()?);
        let connection_config = self.config.connection_config();

        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    let coordinator = self.coordinator.clone();
                    tokio::spawn(async move {
                        handle_connection(coordinator, stream, peer, connection_config).await;
                    });
                },
                Err(e) => {
                    tracing::error!("Accept error: {}", e);
                },
            }
        }
    }
}
