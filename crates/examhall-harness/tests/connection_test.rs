//! Session liveness, admission and reconnection over the simulated network.

use std::time::Duration;

use examhall_client::{ClientConfig, ClientError, ParticipantEvent, ReconnectingClient};
use examhall_core::{Connector, FrameReader, MemoryStorage, ReconnectPolicy, ReconnectState};
use examhall_harness::{SimConnector, SimEnv, SimListener};
use examhall_proto::{Envelope, FrameCodec, ParticipantIdentity, Payload};
use examhall_server::{Coordinator, Server, ServerError, ServerRuntimeConfig};
use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    sync::broadcast,
    task::JoinHandle,
    time::Instant,
};

type BoxErr = Box<dyn std::error::Error>;

async fn start_coordinator()
-> Result<(Coordinator<SimEnv, MemoryStorage>, JoinHandle<Result<(), ServerError>>), BoxErr> {
    let listener = SimListener::bind("0.0.0.0:8888").await?;
    let coordinator = Coordinator::new(SimEnv::new(), MemoryStorage::new());
    let server =
        Server::new(listener, coordinator.clone(), ServerRuntimeConfig::new("0.0.0.0:8888"));
    Ok((coordinator, tokio::spawn(server.run())))
}

fn participant(id: &str, max_attempts: u32) -> ReconnectingClient<SimConnector, SimEnv> {
    let config = ClientConfig {
        reconnect: ReconnectPolicy { max_attempts, ..ReconnectPolicy::default() },
        ..ClientConfig::new("server:8888", ParticipantIdentity::new(id, format!("Student {id}")))
    };
    ReconnectingClient::new(SimConnector, SimEnv::new(), config)
}

async fn next_event(rx: &mut broadcast::Receiver<ParticipantEvent>) -> Result<ParticipantEvent, BoxErr> {
    Ok(tokio::time::timeout(Duration::from_secs(600), rx.recv()).await??)
}

/// Write `body` as one length-prefixed frame.
async fn write_raw<W: AsyncWrite + Unpin>(writer: &mut W, body: &[u8]) -> Result<(), BoxErr> {
    let len = u32::try_from(body.len())?;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(body).await?;
    writer.flush().await?;
    Ok(())
}

#[test]
fn duplicate_login_keeps_first_session() {
    let mut sim = turmoil::Builder::new().simulation_duration(Duration::from_secs(300)).build();

    sim.host("server", || async {
        let (coordinator, server) = start_coordinator().await?;

        tokio::time::sleep(Duration::from_secs(30)).await;
        let online = coordinator.online();
        assert_eq!(online.len(), 1);
        assert_eq!(online[0].external_id, "S1");

        server.await??;
        Ok(())
    });

    sim.client("first", async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        let client = participant("S1", 10);
        let mut events = client.subscribe();
        client.connect();
        assert_eq!(next_event(&mut events).await?, ParticipantEvent::Connected);
        assert!(matches!(next_event(&mut events).await?, ParticipantEvent::LoggedIn { .. }));

        // Heartbeats keep the session past the 30s read-idle window.
        tokio::time::sleep(Duration::from_secs(90)).await;
        assert_eq!(client.state(), ReconnectState::Connected);
        assert!(matches!(events.try_recv(), Ok(ParticipantEvent::Waiting(_))));
        assert!(events.try_recv().is_err(), "no drop while heartbeating");

        client.shutdown().await;
        Ok(())
    });

    sim.client("impostor", async {
        tokio::time::sleep(Duration::from_secs(5)).await;
        let client = participant("S1", 10);
        let mut events = client.subscribe();
        client.connect();

        assert_eq!(next_event(&mut events).await?, ParticipantEvent::Connected);
        assert_eq!(
            next_event(&mut events).await?,
            ParticipantEvent::LoginRejected {
                reason: "This student ID is already logged in.".to_string()
            }
        );
        assert_eq!(next_event(&mut events).await?, ParticipantEvent::Disconnected);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(client.state(), ReconnectState::Disabled);
        assert!(events.try_recv().is_err(), "no reconnection after rejection");
        assert!(matches!(client.submit_answers(vec![]), Err(ClientError::Rejected { .. })));
        Ok(())
    });

    sim.run().expect("simulation failed");
}

#[test]
fn silent_peer_is_dropped_after_read_idle() {
    let mut sim = turmoil::Builder::new().simulation_duration(Duration::from_secs(120)).build();

    sim.host("server", || async {
        let (coordinator, server) = start_coordinator().await?;

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(coordinator.online().len(), 1);
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert!(coordinator.online().is_empty(), "idle session unregistered");

        server.await??;
        Ok(())
    });

    sim.client("mute", async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        let stream = SimConnector.connect("server:8888").await?;
        let (read, mut write) = tokio::io::split(stream);
        let mut reader = FrameReader::new(read, FrameCodec::default());

        let login = Envelope::new(Payload::LoginRequest(ParticipantIdentity::new("S9", "Mute")), 0);
        write_raw(&mut write, &login.to_bytes()?).await?;
        let logged_in = Instant::now();

        let mut kinds = Vec::new();
        while let Some(frame) = reader.next_frame().await? {
            kinds.push(Envelope::from_bytes(&frame)?.kind());
        }
        let silent_for = logged_in.elapsed();

        assert_eq!(kinds.len(), 2, "login response and waiting notice only: {kinds:?}");
        assert!(silent_for >= Duration::from_secs(30), "{silent_for:?}");
        assert!(silent_for < Duration::from_secs(31), "{silent_for:?}");
        Ok(())
    });

    sim.run().expect("simulation failed");
}

#[test]
fn malformed_frames_do_not_end_the_session() {
    let mut sim = turmoil::Builder::new().simulation_duration(Duration::from_secs(60)).build();

    sim.host("server", || async {
        let (_coordinator, server) = start_coordinator().await?;
        server.await??;
        Ok(())
    });

    sim.client("noisy", async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        let stream = SimConnector.connect("server:8888").await?;
        let (read, mut write) = tokio::io::split(stream);
        let mut reader = FrameReader::new(read, FrameCodec::default());

        write_raw(&mut write, b"not json at all").await?;
        write_raw(&mut write, br#"{"type":"NO_SUCH_KIND","timestamp":1,"body":null}"#).await?;

        let login = Envelope::new(Payload::LoginRequest(ParticipantIdentity::new("S3", "Noisy")), 0);
        write_raw(&mut write, &login.to_bytes()?).await?;

        let frame = reader.next_frame().await?.ok_or("closed before login response")?;
        match Envelope::from_bytes(&frame)?.into_payload() {
            Payload::LoginResponse(response) => assert!(response.success, "{response:?}"),
            other => panic!("expected login response, got {other:?}"),
        }
        Ok(())
    });

    sim.run().expect("simulation failed");
}

#[test]
fn participant_retries_until_coordinator_listens() {
    let mut sim = turmoil::Builder::new().simulation_duration(Duration::from_secs(60)).build();

    sim.host("server", || async {
        tokio::time::sleep(Duration::from_millis(2500)).await;
        let (_coordinator, server) = start_coordinator().await?;
        server.await??;
        Ok(())
    });

    sim.client("student", async {
        let client = participant("S1", 10);
        let mut events = client.subscribe();
        let start = Instant::now();
        client.connect();

        assert_eq!(
            next_event(&mut events).await?,
            ParticipantEvent::Reconnecting { attempt: 0, delay: Duration::from_secs(1) }
        );
        assert_eq!(
            next_event(&mut events).await?,
            ParticipantEvent::Reconnecting { attempt: 1, delay: Duration::from_secs(2) }
        );
        assert_eq!(next_event(&mut events).await?, ParticipantEvent::Connected);
        assert!(matches!(next_event(&mut events).await?, ParticipantEvent::LoggedIn { .. }));
        assert!(start.elapsed() >= Duration::from_secs(3));

        client.shutdown().await;
        Ok(())
    });

    sim.run().expect("simulation failed");
}

#[test]
fn participant_gives_up_without_coordinator() {
    let mut sim = turmoil::Builder::new().simulation_duration(Duration::from_secs(120)).build();

    // Host exists but never listens.
    sim.host("server", || async {
        std::future::pending::<()>().await;
        Ok(())
    });

    sim.client("student", async {
        let client = participant("S1", 3);
        let mut events = client.subscribe();
        let start = Instant::now();
        client.connect();

        let mut delays = Vec::new();
        loop {
            match next_event(&mut events).await? {
                ParticipantEvent::Reconnecting { delay, .. } => delays.push(delay.as_secs()),
                ParticipantEvent::GaveUp { attempts } => {
                    assert_eq!(attempts, 3);
                    break;
                },
                other => panic!("unexpected {other:?}"),
            }
        }
        assert_eq!(delays, vec![1, 2, 4]);
        assert!(start.elapsed() >= Duration::from_secs(7));
        assert_eq!(client.state(), ReconnectState::GaveUp);

        // Asking again starts a fresh round.
        assert!(client.connect());
        assert_eq!(
            next_event(&mut events).await?,
            ParticipantEvent::Reconnecting { attempt: 0, delay: Duration::from_secs(1) }
        );
        client.shutdown().await;
        Ok(())
    });

    sim.run().expect("simulation failed");
}
