//! Job controller.
//!
//! Owns the session's engine instance and drives one job at a time through
//! `Idle -> Validating -> Compressing -> {Succeeded | Failed | Cancelling -> Cancelled}`.
//! Every terminal outcome returns the controller to `Idle` and reloads a
//! fresh engine instance before the next video is accepted.

mod ledger;
mod runner;
mod types;

pub use ledger::HandledFileLedger;
pub use runner::JobController;
pub use types::{
    Admission, CompressionStats, ControllerError, ControllerSnapshot, Job, JobOutcome, JobStatus,
    StatusMessage,
};
