//! Scheduler-agnostic core types for hpcmon.
//!
//! This crate defines the normalized job model (`JobStatus`, `JobInfo`),
//! the submission types, the error taxonomy, and the `Scheduler` trait
//! every backend implements.

pub mod error;
pub mod job_info;
pub mod job_spec;
pub mod scheduler;
pub mod status;

pub use error::SchedulerError;
pub use job_info::JobInfo;
pub use job_spec::{ArrayJobResult, ArrayJobSpec, JobResult, JobSpec, OutputStream};
pub use scheduler::{HistoryQuery, JobFilter, Scheduler};
pub use status::JobStatus;
