//! Per-connection tasks.
//!
//! Each accepted connection gets a reader (this task) and a writer task. The
//! registry and coordinator never touch the socket: they push [`Outbound`]
//! items onto the writer's queue through a [`ChannelSink`], and the writer
//! drains the queue in order. A `Close` item makes the writer shut the stream
//! down after everything queued before it.
//!
//! ## Write-then-close
//!
//! A rejected login is queued as `[LoginResponse, Close]`, so the response is
//! fully written and flushed before the writer shuts the stream down. Flushing
//! only hands the bytes to the kernel; there is no application-level
//! acknowledgement. If the peer has unread data in flight when the socket
//! closes, some TCP stacks answer with a reset and the peer may lose the
//! rejection. Participants treat a connection that closes before any login
//! response like any other drop.

use std::net::SocketAddr;

use examhall_core::{
    Admission, ConnectionId, DeliveryError, Environment, FrameReader, SessionSink, SessionStream,
    Storage, SubmitOutcome, TimeoutConfig, TransportError, write_envelope,
};
use examhall_proto::{Envelope, FrameCodec, Payload};
use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    sync::mpsc,
};

use crate::coordinator::Coordinator;

/// Item on a session's outbound queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Write this envelope
    Envelope(Envelope),
    /// Shut the connection down after earlier items
    Close,
}

/// [`SessionSink`] backed by the writer task's queue.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Outbound>,
}

impl ChannelSink {
    /// Wrap the sending side of a writer queue.
    pub fn new(tx: mpsc::UnboundedSender<Outbound>) -> Self {
        Self { tx }
    }
}

impl SessionSink for ChannelSink {
    fn deliver(&self, envelope: &Envelope) -> Result<(), DeliveryError> {
        self.tx.send(Outbound::Envelope(envelope.clone())).map_err(|_| DeliveryError)
    }

    fn close(&self) {
        // Writer already gone means the socket is already closing.
        let _ = self.tx.send(Outbound::Close);
    }
}

/// Per-connection limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Idle windows; only `read_idle` applies on the coordinator
    pub timeouts: TimeoutConfig,
    /// Frame codec with the size bound
    pub codec: FrameCodec,
    /// Close after this many malformed frames; `None` never closes
    pub max_protocol_faults: Option<u32>,
}

/// Why a connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Peer closed the stream
    PeerClosed,
    /// No inbound data within the read-idle window
    ReadIdle,
    /// Login rejected
    Rejected,
    /// Unrecoverable framing or socket error
    Transport,
    /// Too many malformed frames
    TooManyFaults,
}

/// Drive one accepted connection until it closes.
///
/// The session is unregistered on every exit path.
pub async fn handle_connection<E, S, T>(
    coordinator: Coordinator<E, S>,
    stream: T,
    peer: SocketAddr,
    config: ConnectionConfig,
) -> CloseReason
where
    E: Environment,
    S: Storage,
    T: SessionStream,
{
    let env = coordinator.env().clone();
    let conn_id: ConnectionId = coordinator.next_connection_id();
    tracing::debug!(conn_id, %peer, "connection accepted, waiting for login");

    let (read_half, write_half) = tokio::io::split(stream);
    let (tx, rx) = mpsc::unbounded_channel();
    let sink = ChannelSink::new(tx);
    let writer = tokio::spawn(write_loop(write_half, rx, config.codec, conn_id));

    let mut reader = FrameReader::new(read_half, config.codec);
    let mut faults = 0u32;

    let reason = loop {
        let frame = tokio::select! {
            frame = reader.next_frame() => frame,
            () = env.sleep(config.timeouts.read_idle) => {
                tracing::info!(conn_id, %peer, idle_secs = config.timeouts.read_idle.as_secs(), "read idle, closing connection");
                break CloseReason::ReadIdle;
            }
        };

        let bytes = match frame {
            Ok(Some(bytes)) => bytes,
            Ok(None) => break CloseReason::PeerClosed,
            Err(e) => {
                if e.is_fatal() {
                    tracing::warn!(conn_id, %peer, error = %e, "closing connection");
                } else {
                    tracing::debug!(conn_id, %peer, error = %e, "connection error");
                }
                break CloseReason::Transport;
            },
        };

        let envelope = match Envelope::from_bytes(&bytes) {
            Ok(envelope) => envelope,
            Err(e) => {
                faults += 1;
                tracing::warn!(conn_id, %peer, faults, error = %e, "dropping malformed frame");
                if config.max_protocol_faults.is_some_and(|max| faults > max) {
                    break CloseReason::TooManyFaults;
                }
                continue;
            },
        };

        match envelope.into_payload() {
            Payload::LoginRequest(identity) => {
                let admission =
                    coordinator.login(conn_id, sink.clone(), identity, &peer.ip().to_string());
                if let Admission::Rejected { .. } = admission {
                    break CloseReason::Rejected;
                }
            },
            Payload::Heartbeat => tracing::trace!(conn_id, "heartbeat"),
            Payload::AnswerSubmit(answers) => match coordinator.submit(conn_id, answers) {
                Ok(SubmitOutcome::Stored { count, .. }) => {
                    tracing::debug!(conn_id, count, "submission accepted");
                },
                Ok(SubmitOutcome::Ignored) => {},
                Err(e) => tracing::error!(conn_id, error = %e, "submission lost"),
            },
            other => tracing::debug!(conn_id, kind = %other.kind(), "unhandled message kind"),
        }
    };

    coordinator.disconnect(conn_id);
    sink.close();
    drop(sink);
    if let Err(e) = writer.await {
        tracing::debug!(conn_id, error = %e, "writer task failed");
    }
    tracing::debug!(conn_id, ?reason, "connection closed");
    reason
}

async fn write_loop<W>(
    mut writer: W,
    mut rx: mpsc::UnboundedReceiver<Outbound>,
    codec: FrameCodec,
    conn_id: ConnectionId,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(item) = rx.recv().await {
        match item {
            Outbound::Envelope(envelope) => {
                if let Err(e) = write_envelope(&mut writer, &codec, &envelope).await {
                    tracing::debug!(conn_id, kind = %envelope.kind(), error = %e, "write failed");
                    // Encoding failures write nothing; the stream stays aligned.
                    if matches!(e, TransportError::Io(_)) {
                        break;
                    }
                }
            },
            Outbound::Close => break,
        }
    }
    // Closing the queue makes later deliveries fail fast.
    rx.close();
    let _ = writer.shutdown().await;
}
