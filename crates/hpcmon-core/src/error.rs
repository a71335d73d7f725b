//! Error taxonomy shared by all scheduler backends.

use thiserror::Error;

/// Errors a [`Scheduler`](crate::Scheduler) surfaces to its caller.
///
/// Transient failures on the polling hot path (malformed output, a hung
/// or missing binary during a status probe) are deliberately *not* here:
/// backends recover from those locally by returning empty results or
/// `JobStatus::Unknown`.
#[derive(Error, Debug)]
pub enum SchedulerError {
    /// Submission command failed or its output carried no job id.
    #[error("job submission failed: {0}")]
    Submission(String),

    /// Queried id unknown to both the live listing and accounting.
    #[error("job {0} not found")]
    JobNotFound(String),

    /// The backend has no accounting subsystem; callers should check
    /// `has_accounting()` first.
    #[error("accounting is not available on the {scheduler} scheduler")]
    AccountingNotAvailable { scheduler: &'static str },

    /// A required subprocess call failed outright.
    #[error("scheduler command failed: {0}")]
    Command(String),
}
