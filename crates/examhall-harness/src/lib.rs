//! Deterministic simulation harness for examhall.
//!
//! Turmoil-backed implementations of the `Environment`, `Listener` and
//! `Connector` seams, so the real coordinator and participant runtimes run
//! against virtual time and a simulated network. Given the same seed, a test
//! produces the same execution every time; a ten-minute exam finishes in
//! milliseconds of real time.
//!
//! # Example
//!
//! ```rust,ignore
//! use examhall_harness::{SimConnector, SimEnv, SimListener};
//!
//! let mut sim = turmoil::Builder::new().build();
//!
//! sim.host("server", || async {
//!     let listener = SimListener::bind("0.0.0.0:8888").await?;
//!     // Coordinator over `listener` and `SimEnv::new()`...
//!     Ok(())
//! });
//!
//! sim.client("student", async {
//!     // ReconnectingClient over `SimConnector` and `SimEnv::new()`...
//!     Ok(())
//! });
//!
//! sim.run().unwrap();
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
mod sim_env;
mod sim_transport;

pub use sim_env::{SIM_EPOCH_MILLIS, SimEnv};
pub use sim_transport::{SimConnector, SimListener};
