//! One participant session over an established stream.
//!
//! Sends the login request, then multiplexes three things on a single task:
//! inbound frames, outbound payloads queued by the controller, and the
//! write-idle heartbeat. The heartbeat deadline moves only when something is
//! written, so a chatty coordinator does not suppress heartbeats.

use examhall_core::{Environment, FrameReader, SessionStream, write_envelope};
use examhall_proto::{Envelope, FrameCodec, Payload};
use tokio::{
    io::AsyncWriteExt,
    sync::{broadcast, mpsc, watch},
};

use crate::{ClientConfig, events::ParticipantEvent};

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SessionEnd {
    /// Stream closed or failed
    Dropped,
    /// Login refused with this reason
    Rejected(String),
    /// Owner asked to stop
    Shutdown,
}

pub(crate) async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    // A dropped sender also counts as shutdown.
    let _ = rx.wait_for(|stopped| *stopped).await;
}

pub(crate) async fn run_session<E, T>(
    stream: T,
    env: &E,
    config: &ClientConfig,
    outbound: &mut mpsc::UnboundedReceiver<Payload>,
    events: &broadcast::Sender<ParticipantEvent>,
    shutdown: &mut watch::Receiver<bool>,
) -> SessionEnd
where
    E: Environment,
    T: SessionStream,
{
    let codec = FrameCodec::new(config.max_frame_size);
    let (read_half, mut writer) = tokio::io::split(stream);
    let mut reader = FrameReader::new(read_half, codec);

    let login =
        Envelope::new(Payload::LoginRequest(config.identity.clone()), env.wall_clock_millis());
    if let Err(e) = write_envelope(&mut writer, &codec, &login).await {
        tracing::debug!(error = %e, "login request not sent");
        return SessionEnd::Dropped;
    }
    let mut last_write = env.now();

    let end = loop {
        let idle_left = config
            .timeouts
            .write_idle
            .saturating_sub(env.now().saturating_duration_since(last_write));

        tokio::select! {
            biased;

            () = shutdown_requested(shutdown) => break SessionEnd::Shutdown,

            frame = reader.next_frame() => match frame {
                Ok(Some(bytes)) => match Envelope::from_bytes(&bytes) {
                    Ok(envelope) => {
                        if let Some(end) = handle_inbound(envelope.into_payload(), events) {
                            break end;
                        }
                    },
                    Err(e) => tracing::warn!(error = %e, "dropping malformed frame"),
                },
                Ok(None) => {
                    tracing::info!("coordinator closed the connection");
                    break SessionEnd::Dropped;
                },
                Err(e) => {
                    tracing::info!(error = %e, "connection lost");
                    break SessionEnd::Dropped;
                },
            },

            Some(payload) = outbound.recv() => {
                let kind = payload.kind();
                let envelope = Envelope::new(payload, env.wall_clock_millis());
                match write_envelope(&mut writer, &codec, &envelope).await {
                    Ok(()) => {
                        tracing::debug!(%kind, "sent");
                        last_write = env.now();
                    },
                    Err(e) if e.is_fatal() => {
                        tracing::info!(%kind, error = %e, "write failed");
                        break SessionEnd::Dropped;
                    },
                    Err(e) => tracing::warn!(%kind, error = %e, "payload not sent"),
                }
            },

            () = env.sleep(idle_left) => {
                let heartbeat = Envelope::new(Payload::Heartbeat, env.wall_clock_millis());
                if let Err(e) = write_envelope(&mut writer, &codec, &heartbeat).await {
                    tracing::info!(error = %e, "heartbeat failed");
                    break SessionEnd::Dropped;
                }
                tracing::trace!("heartbeat sent");
                last_write = env.now();
            },
        }
    };

    let _ = writer.shutdown().await;
    end
}

fn handle_inbound(
    payload: Payload,
    events: &broadcast::Sender<ParticipantEvent>,
) -> Option<SessionEnd> {
    let event = match payload {
        Payload::LoginResponse(response) if response.success => {
            tracing::info!(message = %response.message, "logged in");
            ParticipantEvent::LoggedIn { message: response.message }
        },
        Payload::LoginResponse(response) => {
            tracing::warn!(reason = %response.message, "login rejected");
            let _ = events.send(ParticipantEvent::LoginRejected { reason: response.message.clone() });
            return Some(SessionEnd::Rejected(response.message));
        },
        Payload::WaitingNotice(message) => ParticipantEvent::Waiting(message),
        Payload::ExamStart(exam) => {
            tracing::info!(exam_id = %exam.exam_id, questions = exam.questions.len(), "exam started");
            ParticipantEvent::ExamStarted(exam)
        },
        Payload::ExamEnd => ParticipantEvent::ExamEnded,
        Payload::ResultPublish(report) => ParticipantEvent::Result(report),
        Payload::Heartbeat => return None,
        other => {
            tracing::debug!(kind = %other.kind(), "unexpected message from coordinator");
            return None;
        },
    };
    let _ = events.send(event);
    None
}
