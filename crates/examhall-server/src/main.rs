//! Examhall coordinator binary.
//!
//! # Usage
//!
//! ```bash
//! # Listen on port 8888 with two exams available
//! examhall-server --port 8888 --exam quiz1.json --exam final.json
//! ```
//!
//! Operator commands are read from stdin; type `help` for the list.

use std::{path::PathBuf, time::Duration};

use clap::Parser;
use examhall_core::{CoordinatorEvent, Environment, MemoryStorage, Storage, TimeoutConfig};
use examhall_server::{
    Coordinator, Server, ServerRuntimeConfig,
    console::{self, OperatorCommand},
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Examhall exam coordinator
#[derive(Parser, Debug)]
#[command(name = "examhall-server")]
#[command(about = "Classroom exam coordinator")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long)]
    port: u16,

    /// Interface to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Exam definition file (JSON); may be repeated
    #[arg(short, long = "exam", value_name = "FILE")]
    exams: Vec<PathBuf>,

    /// Seconds without inbound data before a participant is dropped
    #[arg(long, default_value = "30")]
    read_idle_secs: u64,

    /// Close a connection after this many malformed frames (default: never)
    #[arg(long)]
    max_protocol_faults: Option<u32>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let storage = MemoryStorage::new();
    for path in &args.exams {
        let exam = console::load_exam_file(path)?;
        tracing::info!(exam_id = %exam.exam_id, questions = exam.questions.len(), "exam loaded");
        storage.save_exam(&exam)?;
    }

    let config = ServerRuntimeConfig {
        timeouts: TimeoutConfig {
            read_idle: Duration::from_secs(args.read_idle_secs),
            ..TimeoutConfig::default()
        },
        max_protocol_faults: args.max_protocol_faults,
        ..ServerRuntimeConfig::new(format!("{}:{}", args.host, args.port))
    };

    tracing::info!("Examhall coordinator starting");
    let server = Server::bind(config, storage).await?;
    let coordinator = server.coordinator().clone();

    tokio::spawn(log_events(coordinator.clone()));
    let server_task = tokio::spawn(server.run());

    operator_console(&coordinator).await?;

    server_task.abort();
    tracing::info!("Examhall coordinator stopped");
    Ok(())
}

/// Log observer events, standing in for a dashboard.
async fn log_events<E: Environment, S: Storage>(coordinator: Coordinator<E, S>) {
    let mut rx = coordinator.subscribe();
    loop {
        match rx.recv().await {
            Ok(CoordinatorEvent::OnlineParticipantsChanged { online }) => {
                tracing::info!(online = online.len(), "online participants changed");
            },
            Ok(CoordinatorEvent::SubmissionCountChanged { exam_id, count }) => {
                tracing::info!(exam_id = exam_id.as_deref().unwrap_or("-"), count, "submissions");
            },
            Ok(CoordinatorEvent::ExamStateChanged { exam_id, state }) => {
                tracing::info!(exam_id = %exam_id, %state, "exam state");
            },
            Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "event log lagged");
            },
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn operator_console<E: Environment, S: Storage>(
    coordinator: &Coordinator<E, S>,
) -> std::io::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    stdout.write_all(format!("{}\n", console::HELP).as_bytes()).await?;

    while let Some(line) = lines.next_line().await? {
        let output = match OperatorCommand::parse(&line) {
            Ok(None) => continue,
            Ok(Some(OperatorCommand::Quit)) => break,
            Ok(Some(command)) => console::execute(coordinator, &command),
            Err(usage) => usage,
        };
        stdout.write_all(format!("{output}\n").as_bytes()).await?;
        stdout.flush().await?;
    }
    Ok(())
}
