//! PBS Professional / Torque backend.
//!
//! Live and finished jobs both come from `qstat -f -F json` (with `-x`
//! for finished ones), so there is a single grammar to parse.

pub mod parser;
pub mod scheduler;

pub use parser::{job_from_json, parse_qstat_json, parse_qsub_output, state_to_status};
pub use scheduler::PbsScheduler;
