//! Session registry.
//!
//! Maps live connections to logged-in participants and is the single source
//! of truth for who is online. All methods take `&self`; synchronization is
//! internal, and no lock is held across anything slower than pushing an
//! envelope onto a session's outbound queue.
//!
//! ## Admission
//!
//! [`SessionRegistry::register`] checks identity uniqueness and inserts in one
//! critical section, so two concurrent logins with the same external id
//! cannot both succeed. The registry itself delivers the login response. On
//! rejection it also closes the session, after queueing the response, so the
//! caller never has to remember to tear down a rejected connection.

use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
};

use examhall_proto::{Envelope, LoginResponse, ParticipantIdentity, Payload};
use thiserror::Error;

use crate::events::{CoordinatorEvent, EventBus};

/// Identifier assigned to each accepted connection.
pub type ConnectionId = u64;

/// Response message for a successful login.
pub const LOGIN_ACCEPTED: &str = "Login successful. Welcome!";
/// Rejection message for an identity missing required fields.
pub const INVALID_IDENTITY: &str = "Invalid student data provided.";
/// Rejection message for a duplicate external id.
pub const DUPLICATE_IDENTITY: &str = "This student ID is already logged in.";
/// Rejection message for a second login on an admitted connection.
pub const ALREADY_LOGGED_IN: &str = "This connection is already logged in.";

/// The outbound side of a live connection could not take the envelope.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("session outbound queue closed")]
pub struct DeliveryError;

/// Outbound half of a session, as seen by the registry.
///
/// Implementations must not block: `deliver` queues the envelope for a writer
/// task and returns. `close` asks the writer to shut the connection once
/// everything queued before it has been written.
pub trait SessionSink: Send + Sync {
    /// Queue an envelope for this session.
    fn deliver(&self, envelope: &Envelope) -> Result<(), DeliveryError>;

    /// Close the connection after the queued envelopes.
    fn close(&self);
}

/// Outcome of a login attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Session registered
    Accepted(ParticipantIdentity),
    /// Session refused and closed
    Rejected {
        /// Reason sent to the participant
        reason: String,
    },
}

impl Admission {
    /// Whether the login succeeded.
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }
}

/// Delivery statistics of one broadcast.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Sessions that accepted the envelope
    pub delivered: usize,
    /// Sessions whose outbound queue was closed
    pub failed: Vec<ConnectionId>,
}

struct Session<S> {
    identity: ParticipantIdentity,
    sink: S,
}

/// Thread-safe connection-to-participant map.
pub struct SessionRegistry<S> {
    sessions: Mutex<HashMap<ConnectionId, Session<S>>>,
    events: EventBus,
}

impl<S: SessionSink> SessionRegistry<S> {
    /// Create an empty registry publishing to `events`.
    pub fn new(events: EventBus) -> Self {
        Self { sessions: Mutex::new(HashMap::new()), events }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ConnectionId, Session<S>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Admit `identity` on connection `conn`.
    ///
    /// The identity's address is replaced with `peer_addr` and it is marked
    /// online. The login response is queued on `sink` before the session
    /// becomes visible to broadcasts, so it is always the first envelope the
    /// participant receives.
    pub fn register(
        &self,
        conn: ConnectionId,
        sink: S,
        mut identity: ParticipantIdentity,
        peer_addr: &str,
        timestamp: i64,
    ) -> Admission {
        let admission = {
            let mut sessions = self.lock();

            let rejection = if identity.missing_field().is_some() {
                Some(INVALID_IDENTITY)
            } else if sessions.contains_key(&conn) {
                Some(ALREADY_LOGGED_IN)
            } else if sessions.values().any(|s| s.identity.external_id == identity.external_id) {
                Some(DUPLICATE_IDENTITY)
            } else {
                None
            };

            if let Some(reason) = rejection {
                drop(sessions);
                tracing::info!(conn_id = conn, participant = %identity.external_id, reason, "login rejected");
                let response = Payload::LoginResponse(LoginResponse::rejected(reason));
                if sink.deliver(&Envelope::new(response, timestamp)).is_err() {
                    tracing::debug!(conn_id = conn, "rejection not queued, connection already gone");
                }
                sink.close();
                return Admission::Rejected { reason: reason.to_string() };
            }

            identity.address = peer_addr.to_string();
            identity.online = true;

            let response = Payload::LoginResponse(LoginResponse::accepted(LOGIN_ACCEPTED));
            if sink.deliver(&Envelope::new(response, timestamp)).is_err() {
                tracing::debug!(conn_id = conn, "connection closed during login");
            }
            sessions.insert(conn, Session { identity: identity.clone(), sink });
            Admission::Accepted(identity)
        };

        if let Admission::Accepted(identity) = &admission {
            tracing::info!(conn_id = conn, participant = %identity.external_id, addr = %identity.address, "participant logged in");
        }
        self.notify_online();
        admission
    }

    /// Remove the session bound to `conn`.
    ///
    /// Returns the removed identity with `online` cleared, or `None` if the
    /// connection was never admitted or is already gone.
    pub fn unregister(&self, conn: ConnectionId) -> Option<ParticipantIdentity> {
        let removed = self.lock().remove(&conn)?;
        let mut identity = removed.identity;
        identity.online = false;

        tracing::info!(conn_id = conn, participant = %identity.external_id, "participant disconnected");
        self.notify_online();
        Some(identity)
    }

    /// Identity bound to `conn`, if admitted.
    pub fn participant(&self, conn: ConnectionId) -> Option<ParticipantIdentity> {
        self.lock().get(&conn).map(|s| s.identity.clone())
    }

    /// Queue `envelope` on every admitted session.
    ///
    /// Best effort: a closed session is recorded in the report and skipped.
    /// Unauthenticated connections are not in the registry and receive
    /// nothing.
    pub fn broadcast(&self, envelope: &Envelope) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        for (conn, session) in self.lock().iter() {
            match session.sink.deliver(envelope) {
                Ok(()) => report.delivered += 1,
                Err(DeliveryError) => {
                    tracing::debug!(conn_id = *conn, kind = %envelope.kind(), "broadcast skipped closed session");
                    report.failed.push(*conn);
                },
            }
        }
        report
    }

    /// Queue `envelope` for the session of `external_id`.
    ///
    /// Returns false if that participant is not online or its queue is closed.
    pub fn send_to_participant(&self, external_id: &str, envelope: &Envelope) -> bool {
        self.lock()
            .values()
            .find(|s| s.identity.external_id == external_id)
            .is_some_and(|s| s.sink.deliver(envelope).is_ok())
    }

    /// Queue `envelope` for connection `conn`.
    pub fn send_to(&self, conn: ConnectionId, envelope: &Envelope) -> bool {
        self.lock().get(&conn).is_some_and(|s| s.sink.deliver(envelope).is_ok())
    }

    /// Point-in-time copy of every online participant, ordered by id.
    pub fn list_online(&self) -> Vec<ParticipantIdentity> {
        let mut online: Vec<_> = self.lock().values().map(|s| s.identity.clone()).collect();
        online.sort_by(|a, b| a.external_id.cmp(&b.external_id));
        online
    }

    /// Number of admitted sessions.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no session is admitted.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn notify_online(&self) {
        let online = self.list_online();
        self.events.emit(CoordinatorEvent::OnlineParticipantsChanged { online });
    }
}
