//! Examhall session core.
//!
//! Runtime-agnostic building blocks shared by the coordinator and the
//! participant. Nothing in this crate opens a socket or spawns a task; the
//! runtimes in `examhall-server` and `examhall-client` drive these types.
//!
//! ## Architecture
//!
//! ```text
//! examhall-core
//!   ├─ Environment          (clock + RNG seam; SystemEnv for production)
//!   ├─ SessionRegistry      (connection -> participant, admission, broadcast)
//!   ├─ ExamLifecycle        (WAITING -> IN_PROGRESS -> FINISHED, action-based)
//!   ├─ SubmissionAggregator (persist-then-record answer batches)
//!   ├─ Storage              (persistence collaborator: memory, chaotic)
//!   ├─ EventBus             (non-blocking observer notifications)
//!   ├─ ReconnectMachine     (participant backoff bookkeeping)
//!   ├─ grading              (post-exam scoring)
//!   └─ transport            (Listener/Connector seams, framed I/O)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod env;
pub mod events;
pub mod exam;
pub mod grading;
pub mod lifecycle;
pub mod reconnect;
pub mod registry;
pub mod storage;
pub mod submissions;
mod system_env;
pub mod transport;

pub use config::{ConfigError, TimeoutConfig};
pub use env::Environment;
pub use events::{CoordinatorEvent, EventBus};
pub use exam::{ExamContent, Question};
pub use grading::{GradingSummary, grade_exam, grade_submission, score_answer};
pub use lifecycle::{EndTrigger, ExamLifecycle, ExamState, LifecycleAction, LifecycleError};
pub use reconnect::{ReconnectDecision, ReconnectMachine, ReconnectPolicy, ReconnectState};
pub use registry::{
    Admission, BroadcastReport, ConnectionId, DeliveryError, SessionRegistry, SessionSink,
};
pub use storage::{ChaoticStorage, MemoryStorage, Storage, StorageError};
pub use submissions::{SubmissionAggregator, SubmissionError, SubmitOutcome};
pub use system_env::SystemEnv;
pub use transport::{
    Connector, FrameReader, Listener, SessionStream, TransportError, write_envelope,
};
