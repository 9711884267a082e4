//! Property-based tests over whole exam simulations.
//!
//! Random answer sheets and network latency; every participant must receive
//! the score local grading gives its sheet, and a fixed seed must reproduce
//! the same run.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use examhall_client::{ClientConfig, ParticipantEvent, ReconnectingClient};
use examhall_core::{MemoryStorage, grade_submission};
use examhall_harness::{SimConnector, SimEnv, SimListener, fixtures};
use examhall_proto::{Answer, ParticipantIdentity, ScoreReport};
use examhall_server::{Coordinator, Server, ServerRuntimeConfig};
use proptest::prelude::*;

/// What one run of the scenario produced.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Outcome {
    submissions: usize,
    reports: Vec<(String, ScoreReport)>,
}

fn sheet() -> impl Strategy<Value = Vec<Answer>> {
    (
        prop::sample::select(vec!["A", "B", "b", "C", ""]),
        prop::sample::select(vec!["ABD", "dba", "AB", "ABCD", ""]),
    )
        .prop_map(|(q1, q2)| vec![Answer::new("q1", q1), Answer::new("q2", q2)])
}

fn run_exam(sheets: &[Vec<Answer>], latency_ms: u64, seed: u64) -> Outcome {
    let mut sim = turmoil::Builder::new()
        .simulation_duration(Duration::from_secs(300))
        .min_message_latency(Duration::from_millis(latency_ms))
        .max_message_latency(Duration::from_millis(latency_ms))
        .rng_seed(seed)
        .build();

    let outcome = Arc::new(Mutex::new(Outcome { submissions: 0, reports: Vec::new() }));
    let participants = sheets.len();

    let server_outcome = Arc::clone(&outcome);
    sim.host("server", move || {
        let outcome = Arc::clone(&server_outcome);
        async move {
            let listener = SimListener::bind("0.0.0.0:8888").await?;
            let coordinator = Coordinator::new(SimEnv::with_seed(seed), MemoryStorage::new());
            let server = Server::new(
                listener,
                coordinator.clone(),
                ServerRuntimeConfig::new("0.0.0.0:8888"),
            );
            tokio::spawn(server.run());

            // Wait for everyone, then run a one-minute exam.
            while coordinator.online().len() < participants {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
            coordinator.start_exam(fixtures::quiz("quiz1", 1))?;
            tokio::time::sleep(Duration::from_secs(65)).await;

            outcome.lock().unwrap().submissions = coordinator.submission_count();
            coordinator.grade()?;
            Ok(())
        }
    });

    for (index, sheet) in sheets.iter().enumerate() {
        let id = format!("S{index}");
        let sheet = sheet.clone();
        let outcome = Arc::clone(&outcome);

        sim.client(format!("student{index}"), async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            let config =
                ClientConfig::new("server:8888", ParticipantIdentity::new(&id, format!("Student {id}")));
            let client = ReconnectingClient::new(SimConnector, SimEnv::with_seed(seed), config);
            let mut events = client.subscribe();
            client.connect();

            loop {
                match tokio::time::timeout(Duration::from_secs(240), events.recv()).await?? {
                    ParticipantEvent::ExamStarted(_) => client.submit_answers(sheet.clone())?,
                    ParticipantEvent::Result(report) => {
                        outcome.lock().unwrap().reports.push((id.clone(), report));
                        break;
                    },
                    _ => {},
                }
            }

            client.shutdown().await;
            Ok(())
        });
    }

    sim.run().expect("simulation failed");

    let mut outcome = outcome.lock().unwrap().clone();
    outcome.reports.sort_by(|a, b| a.0.cmp(&b.0));
    outcome
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    #[test]
    fn prop_every_participant_gets_local_grade(
        sheets in prop::collection::vec(sheet(), 1..4),
        latency_ms in 0u64..200,
        seed in any::<u64>(),
    ) {
        let quiz = fixtures::quiz("quiz1", 1);
        let outcome = run_exam(&sheets, latency_ms, seed);

        prop_assert_eq!(outcome.submissions, sheets.len());
        prop_assert_eq!(outcome.reports.len(), sheets.len());
        for (id, report) in &outcome.reports {
            let index: usize = id[1..].parse().unwrap();
            prop_assert_eq!(report, &grade_submission(&quiz, &sheets[index]));
        }
    }

    #[test]
    fn prop_same_seed_same_outcome(
        sheets in prop::collection::vec(sheet(), 1..3),
        latency_ms in 0u64..200,
        seed in any::<u64>(),
    ) {
        let first = run_exam(&sheets, latency_ms, seed);
        let second = run_exam(&sheets, latency_ms, seed);
        prop_assert_eq!(first, second);
    }
}
