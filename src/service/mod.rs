//! Replay service: the experience and variables tables behind TCP.
//!
//! ```text
//!  agent process ─┐                       ┌─ ExperienceStore
//!  agent process ─┼─ ReplayClient ══TCP══ ReplayServer
//!  learner       ─┘                       └─ VariableChannel
//! ```
//!
//! The server hosts two tables, [`EXPERIENCE_TABLE`] and [`VARIABLES_TABLE`];
//! requests naming any other table are answered with an error.
//!
//! [`EXPERIENCE_TABLE`]: crate::core::tables::EXPERIENCE_TABLE
//! [`VARIABLES_TABLE`]: crate::core::tables::VARIABLES_TABLE

pub mod client;
pub mod protocol;
pub mod server;


pub use client::{ReplayClient, RetryPolicy};
pub use protocol::{read_frame, write_frame, Request, Response, MAX_FRAME_LEN};
pub use server::{ReplayServer, ServerHandle};
