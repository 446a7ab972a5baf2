//! Poll loop.
//!
//! [`PollWorker`] repeatedly discovers new uploads and drives each one
//! through download, extraction, rendering, publishing, notification and
//! commit. Every cycle produces a [`CycleReport`]; the sleep between cycles
//! goes through a [`Clock`].

mod clock;
mod poll;
mod report;

pub use clock::{Clock, TokioClock};
pub use poll::PollWorker;
pub use report::{CycleReport, JobFailure};
