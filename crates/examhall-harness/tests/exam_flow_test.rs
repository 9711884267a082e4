//! End-to-end exam flow over the simulated network.
//!
//! The real coordinator (`examhall-server`) and participant
//! (`examhall-client`) runtimes talk over Turmoil TCP. One-minute exams keep
//! the virtual timeline short.

use std::time::Duration;

use examhall_client::{ClientConfig, ParticipantEvent, ReconnectingClient};
use examhall_core::{CoordinatorEvent, Environment, ExamState, MemoryStorage};
use examhall_harness::{SIM_EPOCH_MILLIS, SimConnector, SimEnv, SimListener, fixtures};
use examhall_proto::{ParticipantIdentity, PublishedExam, ScoreReport};
use examhall_server::{Coordinator, Server, ServerError, ServerRuntimeConfig};
use tokio::{sync::broadcast, task::JoinHandle};

type BoxErr = Box<dyn std::error::Error>;

async fn start_coordinator()
-> Result<(Coordinator<SimEnv, MemoryStorage>, JoinHandle<Result<(), ServerError>>), BoxErr> {
    let listener = SimListener::bind("0.0.0.0:8888").await?;
    let coordinator = Coordinator::new(SimEnv::new(), MemoryStorage::new());
    let server =
        Server::new(listener, coordinator.clone(), ServerRuntimeConfig::new("0.0.0.0:8888"));
    Ok((coordinator, tokio::spawn(server.run())))
}

fn participant(id: &str, name: &str) -> ReconnectingClient<SimConnector, SimEnv> {
    let config = ClientConfig::new("server:8888", ParticipantIdentity::new(id, name));
    ReconnectingClient::new(SimConnector, SimEnv::new(), config)
}

/// Skip events until `pick` accepts one.
async fn next_matching<T>(
    rx: &mut broadcast::Receiver<ParticipantEvent>,
    mut pick: impl FnMut(ParticipantEvent) -> Option<T>,
) -> Result<T, BoxErr> {
    loop {
        let event = tokio::time::timeout(Duration::from_secs(600), rx.recv()).await??;
        if let Some(found) = pick(event) {
            return Ok(found);
        }
    }
}

async fn exam_started(rx: &mut broadcast::Receiver<ParticipantEvent>) -> Result<PublishedExam, BoxErr> {
    next_matching(rx, |e| match e {
        ParticipantEvent::ExamStarted(exam) => Some(exam),
        _ => None,
    })
    .await
}

async fn result(rx: &mut broadcast::Receiver<ParticipantEvent>) -> Result<ScoreReport, BoxErr> {
    next_matching(rx, |e| match e {
        ParticipantEvent::Result(report) => Some(report),
        _ => None,
    })
    .await
}

/// Coordinator starts quiz1 at t=2s (one minute); alice is online from the
/// start and resubmits, bob joins late. Both get graded results.
fn exam_scenario(sim: &mut turmoil::Sim<'_>) {
    sim.host("server", || async {
        let (coordinator, server) = start_coordinator().await?;
        let mut events = coordinator.subscribe();

        tokio::time::sleep(Duration::from_secs(2)).await;
        let published = coordinator.start_exam(fixtures::quiz("quiz1", 1))?;
        assert_eq!(published.questions.len(), 2);

        tokio::time::sleep(Duration::from_secs(70)).await;
        assert_eq!(coordinator.status().state, ExamState::Finished);
        assert_eq!(coordinator.submission_count(), 2);

        let mut finished = 0;
        while let Ok(event) = events.try_recv() {
            if matches!(event, CoordinatorEvent::ExamStateChanged { state: ExamState::Finished, .. })
            {
                finished += 1;
            }
        }
        assert_eq!(finished, 1, "exam finishes exactly once");

        let summary = coordinator.grade()?;
        assert_eq!(summary.participants_graded(), 2);
        assert_eq!(summary.reports["S1"].total_score, 15);
        assert_eq!(summary.reports["S2"].total_score, 5);

        server.await??;
        Ok(())
    });

    sim.client("alice", async {
        let client = participant("S1", "Alice");
        let mut events = client.subscribe();
        client.connect();

        next_matching(&mut events, |e| matches!(e, ParticipantEvent::Waiting(_)).then_some(()))
            .await?;
        let exam = exam_started(&mut events).await?;
        assert_eq!(exam.exam_id, "quiz1");
        assert_eq!(exam.questions.len(), 2);

        client.submit_answers(fixtures::partial_answers())?;
        tokio::time::sleep(Duration::from_secs(5)).await;
        client.submit_answers(fixtures::perfect_answers())?;

        next_matching(&mut events, |e| (e == ParticipantEvent::ExamEnded).then_some(())).await?;
        let report = result(&mut events).await?;
        assert_eq!((report.total_score, report.max_score), (15, 15));

        client.shutdown().await;
        Ok(())
    });

    sim.client("bob", async {
        let env = SimEnv::new();
        tokio::time::sleep(Duration::from_secs(10)).await;

        let client = participant("S2", "Bob");
        let mut events = client.subscribe();
        client.connect();

        // Late join: the running exam arrives right after login, with the
        // original start time.
        let exam = exam_started(&mut events).await?;
        assert!((exam.start_time - SIM_EPOCH_MILLIS - 2_000).abs() < 500, "{}", exam.start_time);
        let remaining = exam.remaining_millis(env.wall_clock_millis());
        assert!((50_000..=53_000).contains(&remaining), "{remaining}");

        client.submit_answers(fixtures::partial_answers())?;
        next_matching(&mut events, |e| (e == ParticipantEvent::ExamEnded).then_some(())).await?;
        let report = result(&mut events).await?;
        assert_eq!((report.total_score, report.max_score), (5, 15));

        client.shutdown().await;
        Ok(())
    });
}

#[test]
fn exam_runs_end_to_end() {
    let mut sim = turmoil::Builder::new().simulation_duration(Duration::from_secs(300)).build();
    exam_scenario(&mut sim);
    sim.run().expect("simulation failed");
}

#[test]
fn exam_runs_end_to_end_with_latency() {
    let mut sim = turmoil::Builder::new()
        .simulation_duration(Duration::from_secs(300))
        .min_message_latency(Duration::from_millis(100))
        .max_message_latency(Duration::from_millis(100))
        .rng_seed(42)
        .build();
    exam_scenario(&mut sim);
    sim.run().expect("simulation failed");
}

#[test]
fn exam_end_before_timer_broadcasts_once() {
    let mut sim = turmoil::Builder::new().simulation_duration(Duration::from_secs(300)).build();

    sim.host("server", || async {
        let (coordinator, server) = start_coordinator().await?;
        tokio::time::sleep(Duration::from_secs(2)).await;
        coordinator.start_exam(fixtures::quiz("quiz1", 1))?;

        tokio::time::sleep(Duration::from_secs(5)).await;
        coordinator.end_exam()?;
        assert!(coordinator.end_exam().is_err());

        server.await??;
        Ok(())
    });

    sim.client("alice", async {
        let client = participant("S1", "Alice");
        let mut events = client.subscribe();
        client.connect();

        exam_started(&mut events).await?;
        next_matching(&mut events, |e| (e == ParticipantEvent::ExamEnded).then_some(())).await?;

        // The cancelled countdown must not end the exam a second time.
        tokio::time::sleep(Duration::from_secs(90)).await;
        while let Ok(event) = events.try_recv() {
            assert_ne!(event, ParticipantEvent::ExamEnded);
        }

        client.shutdown().await;
        Ok(())
    });

    sim.run().expect("simulation failed");
}
