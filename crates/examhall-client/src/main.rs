//! Examhall participant binary.
//!
//! # Usage
//!
//! ```bash
//! examhall-client --server 192.168.1.10:8888 --id S1 --name "Ann Lee"
//! ```
//!
//! Commands are read from stdin; type `help` for the list.

use std::{
    path::PathBuf,
    sync::{Arc, PoisonError},
    time::Duration,
};

use clap::Parser;
use examhall_client::{
    AUTO_SUBMIT_LEAD, AnswerCache, ClientConfig, ParticipantEvent, ReconnectingClient, SharedSheet,
    TcpConnector,
    console::{self, ParticipantCommand},
    submit_at_deadline,
};
use examhall_core::{Environment, ReconnectPolicy, SystemEnv, TimeoutConfig};
use examhall_proto::ParticipantIdentity;
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    sync::broadcast::error::RecvError,
    task::JoinHandle,
};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Examhall participant
#[derive(Parser, Debug)]
#[command(name = "examhall-client")]
#[command(about = "Classroom exam participant")]
#[command(version)]
struct Args {
    /// Coordinator address (host:port)
    #[arg(short, long, default_value = "127.0.0.1:8888")]
    server: String,

    /// Student id
    #[arg(long)]
    id: String,

    /// Display name
    #[arg(long)]
    name: String,

    /// Seconds without outbound data before a heartbeat is sent
    #[arg(long, default_value = "10")]
    write_idle_secs: u64,

    /// Reconnection attempts before giving up
    #[arg(long, default_value = "10")]
    max_retries: u32,

    /// Directory for cached answers (default: ~/.examhall/cache)
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// What the event loop and the console both need.
#[derive(Clone)]
struct Desk {
    client: ReconnectingClient<TcpConnector, SystemEnv>,
    sheet: SharedSheet,
    env: SystemEnv,
    cache: Option<AnswerCache>,
    participant: String,
}

impl Desk {
    fn save_answers(&self) {
        let Some(cache) = &self.cache else {
            return;
        };
        let sheet = self.sheet.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(exam) = sheet.exam() {
            if let Err(e) = cache.save(exam, &self.participant, sheet.recorded()) {
                tracing::warn!(error = %e, "could not cache answers");
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let config = ClientConfig {
        timeouts: TimeoutConfig {
            write_idle: Duration::from_secs(args.write_idle_secs),
            ..TimeoutConfig::default()
        },
        reconnect: ReconnectPolicy { max_attempts: args.max_retries, ..ReconnectPolicy::default() },
        ..ClientConfig::new(args.server, ParticipantIdentity::new(args.id, args.name))
    };
    config.validate()?;

    let participant = config.identity.external_id.clone();
    let env = SystemEnv::new();
    let client = ReconnectingClient::new(TcpConnector, env.clone(), config);
    let desk = Desk {
        client: client.clone(),
        sheet: Arc::default(),
        env,
        cache: args.cache_dir.or_else(AnswerCache::default_dir).map(AnswerCache::new),
        participant,
    };

    tokio::spawn(show_events(client.subscribe(), desk.clone()));
    client.connect();

    let result = participant_console(&desk).await;
    client.shutdown().await;
    result?;
    Ok(())
}

async fn say(line: &str) {
    let mut stdout = tokio::io::stdout();
    let _ = stdout.write_all(format!("{line}\n").as_bytes()).await;
    let _ = stdout.flush().await;
}

async fn show_events(mut rx: tokio::sync::broadcast::Receiver<ParticipantEvent>, desk: Desk) {
    let mut deadline: Option<JoinHandle<()>> = None;
    loop {
        let line = match rx.recv().await {
            Ok(ParticipantEvent::LoggedIn { message }) => message,
            Ok(ParticipantEvent::LoginRejected { reason }) => format!("login rejected: {reason}"),
            Ok(ParticipantEvent::Waiting(message)) => message,
            Ok(ParticipantEvent::ExamStarted(exam)) => {
                let rendered = {
                    let mut sheet = desk.sheet.lock().unwrap_or_else(PoisonError::into_inner);
                    sheet.start(exam.clone());
                    if let Some(cache) = &desk.cache {
                        match cache.load(&exam, &desk.participant) {
                            Ok(cached) => {
                                let restored = sheet.restore(cached);
                                if restored > 0 {
                                    tracing::info!(exam_id = %exam.exam_id, restored, "answers restored from cache");
                                }
                            },
                            Err(e) => tracing::warn!(error = %e, "could not read cached answers"),
                        }
                    }
                    sheet.render(desk.env.wall_clock_millis())
                };
                if let Some(previous) = deadline.replace(tokio::spawn(auto_submit(desk.clone(), exam))) {
                    previous.abort();
                }
                rendered
            },
            Ok(ParticipantEvent::ExamEnded) => {
                if let Some(task) = deadline.take() {
                    task.abort();
                }
                "exam over, submissions closed".to_string()
            },
            Ok(ParticipantEvent::Result(report)) => {
                if let Some(cache) = &desk.cache {
                    if let Err(e) = cache.clear(&report.exam_id, &desk.participant) {
                        tracing::warn!(error = %e, "could not clear cached answers");
                    }
                }
                format!("result for {}: {}/{}", report.exam_id, report.total_score, report.max_score)
            },
            Ok(ParticipantEvent::GaveUp { attempts }) => {
                format!("could not reach the coordinator after {attempts} attempts")
            },
            // Connection churn is already in the log.
            Ok(_) => continue,
            Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => break,
        };
        say(&line).await;
    }
}

async fn auto_submit(desk: Desk, exam: examhall_proto::PublishedExam) {
    let line = match submit_at_deadline(desk.client, desk.sheet, exam, desk.env, AUTO_SUBMIT_LEAD).await {
        Ok(Some(count)) => format!("time is up, submitted {count} answers"),
        Ok(None) => return,
        Err(e) => format!("time is up, answers not submitted: {e}"),
    };
    say(&line).await;
}

async fn participant_console(desk: &Desk) -> std::io::Result<()> {
    say(console::HELP).await;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let output = match ParticipantCommand::parse(&line) {
            Ok(None) => continue,
            Ok(Some(ParticipantCommand::Quit)) => break,
            Ok(Some(ParticipantCommand::Help)) => console::HELP.to_string(),
            Ok(Some(ParticipantCommand::Answer { question_id, text })) => {
                let recorded =
                    desk.sheet.lock().unwrap_or_else(PoisonError::into_inner).record(&question_id, &text);
                match recorded {
                    Ok(()) => {
                        desk.save_answers();
                        format!("{question_id}: {text}")
                    },
                    Err(e) => e,
                }
            },
            Ok(Some(ParticipantCommand::Show)) => desk
                .sheet
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .render(desk.env.wall_clock_millis()),
            Ok(Some(ParticipantCommand::Submit)) => {
                let answers = desk.sheet.lock().unwrap_or_else(PoisonError::into_inner).answers();
                let count = answers.len();
                match desk.client.submit_answers(answers) {
                    Ok(()) => format!("submitted {count} answers"),
                    Err(e) => format!("not submitted: {e}"),
                }
            },
            Err(usage) => usage,
        };
        say(&output).await;
    }
    Ok(())
}
