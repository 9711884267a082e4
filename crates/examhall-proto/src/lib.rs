//! Examhall wire protocol.
//!
//! Every message exchanged between the coordinator and a participant is an
//! [`Envelope`]: a closed [`MessageKind`], a construction timestamp and a
//! kind-specific body. On the wire each envelope travels as one frame:
//!
//! ```text
//! ┌──────────────────────┬──────────────────────────────────────┐
//! │ length: u32 (BE)     │ envelope: JSON text, `length` bytes  │
//! └──────────────────────┴──────────────────────────────────────┘
//! ```
//!
//! Decoding is two-phase. [`FrameCodec`] cuts the byte stream into frames,
//! [`RawEnvelope`] parses the frame into `{kind, timestamp, body}` with the
//! body left untyped, and [`Payload::decode`] resolves the body into a typed
//! variant once `kind` is known.
//!
//! The JSON field names match the original classroom clients (`type`,
//! `timestamp`, `body`, camelCase body fields), so mixed deployments
//! interoperate.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod codec;
pub mod envelope;
pub mod errors;
pub mod kind;
pub mod payloads;

pub use codec::{DEFAULT_MAX_FRAME_SIZE, FrameCodec, LENGTH_PREFIX_SIZE};
pub use envelope::{Envelope, RawEnvelope};
pub use errors::{ProtocolError, Result};
pub use kind::MessageKind;
pub use payloads::{
    Payload,
    answer::{Answer, ScoreReport},
    exam::{PublishedExam, PublishedQuestion, QuestionType},
    session::{LoginResponse, ParticipantIdentity},
};
