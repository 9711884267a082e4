//! Reconnecting participant controller.
//!
//! Owns the participant's single outbound connection. A background
//! supervisor task connects, runs the session, and on a drop asks the
//! [`ReconnectMachine`] what to do next: back off and retry, give up, or
//! stop. The machine is the only place retry bookkeeping lives; the
//! supervisor just does the sleeping and the I/O.
//!
//! Shutdown is a `watch` flag observed by the supervisor at every await
//! point (connect, session, backoff), so no attempt can start after
//! [`ReconnectingClient::shutdown`] returns.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use examhall_core::{Connector, Environment, ReconnectDecision, ReconnectMachine, ReconnectState};
use examhall_proto::{Answer, Payload};
use tokio::{
    sync::{broadcast, mpsc, watch},
    task::JoinHandle,
};

use crate::{
    ClientConfig,
    error::ClientError,
    events::ParticipantEvent,
    session::{SessionEnd, run_session, shutdown_requested},
};

const EVENT_CAPACITY: usize = 64;

struct Inner<C, E> {
    connector: C,
    env: E,
    config: ClientConfig,
    machine: Mutex<ReconnectMachine>,
    outbound: Mutex<Option<mpsc::UnboundedSender<Payload>>>,
    rejection: Mutex<Option<String>>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
    events: broadcast::Sender<ParticipantEvent>,
    shutdown: watch::Sender<bool>,
}

/// Participant connection with automatic reconnection.
///
/// Cheap to clone; clones control the same connection.
pub struct ReconnectingClient<C, E> {
    inner: Arc<Inner<C, E>>,
}

impl<C, E> Clone for ReconnectingClient<C, E> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<C: Connector, E: Environment> ReconnectingClient<C, E> {
    /// Create an idle client. Nothing happens until [`Self::connect`].
    pub fn new(connector: C, env: E, config: ClientConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (shutdown, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                connector,
                env,
                machine: Mutex::new(ReconnectMachine::new(config.reconnect)),
                config,
                outbound: Mutex::new(None),
                rejection: Mutex::new(None),
                supervisor: Mutex::new(None),
                events,
                shutdown,
            }),
        }
    }

    /// Participant notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<ParticipantEvent> {
        self.inner.events.subscribe()
    }

    /// Controller state.
    pub fn state(&self) -> ReconnectState {
        lock(&self.inner.machine).state()
    }

    /// Start connecting in the background.
    ///
    /// Single-flight: returns false without doing anything while an attempt
    /// is in flight, a session is up or a retry is pending, and after a
    /// rejection or shutdown. After giving up, calling it again starts over.
    pub fn connect(&self) -> bool {
        let mut supervisor = lock(&self.inner.supervisor);
        if !lock(&self.inner.machine).connect() {
            return false;
        }
        let client = self.clone();
        *supervisor = Some(tokio::spawn(async move { client.supervise().await }));
        true
    }

    /// Queue `payload` on the live session.
    pub fn send(&self, payload: Payload) -> Result<(), ClientError> {
        {
            let machine = lock(&self.inner.machine);
            match machine.state() {
                ReconnectState::Shutdown => return Err(ClientError::Shutdown),
                ReconnectState::Disabled => {
                    let reason = lock(&self.inner.rejection).clone().unwrap_or_default();
                    return Err(ClientError::Rejected { reason });
                },
                ReconnectState::GaveUp => {
                    return Err(ClientError::GaveUp { attempts: machine.policy().max_attempts });
                },
                _ => {},
            }
        }

        match lock(&self.inner.outbound).as_ref() {
            Some(tx) => tx.send(payload).map_err(|_| ClientError::NotConnected),
            None => Err(ClientError::NotConnected),
        }
    }

    /// Submit the full answer sheet. A later submission replaces this one.
    pub fn submit_answers(&self, answers: Vec<Answer>) -> Result<(), ClientError> {
        tracing::info!(answers = answers.len(), "submitting answers");
        self.send(Payload::AnswerSubmit(answers))
    }

    /// Stop for good: close the live session and cancel pending retries.
    ///
    /// Idempotent. Returns once the background task has finished, so no
    /// connection attempt happens afterwards.
    pub async fn shutdown(&self) {
        let first = lock(&self.inner.machine).shutdown();
        self.inner.shutdown.send_replace(true);
        if !first {
            return;
        }

        let handle = lock(&self.inner.supervisor).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::debug!(error = %e, "supervisor task failed");
            }
        }
        tracing::info!("client shut down");
    }

    fn emit(&self, event: ParticipantEvent) {
        let _ = self.inner.events.send(event);
    }

    async fn supervise(self) {
        let inner = &self.inner;
        let mut shutdown = inner.shutdown.subscribe();
        let address = inner.config.server_address.as_str();

        loop {
            let attempt = tokio::select! {
                biased;
                () = shutdown_requested(&mut shutdown) => break,
                result = inner.connector.connect(address) => result,
            };

            match attempt {
                Ok(stream) => {
                    lock(&inner.machine).connected();
                    tracing::info!(address, "connected to coordinator");
                    self.emit(ParticipantEvent::Connected);

                    let (tx, mut rx) = mpsc::unbounded_channel();
                    *lock(&inner.outbound) = Some(tx);
                    let end = run_session(
                        stream,
                        &inner.env,
                        &inner.config,
                        &mut rx,
                        &inner.events,
                        &mut shutdown,
                    )
                    .await;
                    *lock(&inner.outbound) = None;

                    match end {
                        SessionEnd::Shutdown => break,
                        SessionEnd::Rejected(reason) => {
                            tracing::warn!(%reason, "reconnection disabled");
                            *lock(&inner.rejection) = Some(reason);
                            lock(&inner.machine).disable();
                        },
                        SessionEnd::Dropped => {},
                    }
                    self.emit(ParticipantEvent::Disconnected);
                },
                Err(e) => tracing::info!(address, error = %e, "connection attempt failed"),
            }

            let decision = lock(&inner.machine).connection_lost();
            match decision {
                ReconnectDecision::Retry { attempt, delay } => {
                    tracing::info!(
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "reconnecting"
                    );
                    self.emit(ParticipantEvent::Reconnecting { attempt, delay });
                    tokio::select! {
                        biased;
                        () = shutdown_requested(&mut shutdown) => break,
                        () = inner.env.sleep(delay) => {},
                    }
                    if !lock(&inner.machine).backoff_elapsed() {
                        break;
                    }
                },
                ReconnectDecision::GiveUp => {
                    let attempts = lock(&inner.machine).retries();
                    tracing::warn!(attempts, "giving up on the coordinator");
                    self.emit(ParticipantEvent::GaveUp { attempts });
                    break;
                },
                ReconnectDecision::Stop => break,
            }
        }
        tracing::debug!("supervisor stopped");
    }
}
