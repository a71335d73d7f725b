//! Slurm backend.
//!
//! Active jobs come from pipe-delimited `squeue` output, history from
//! `sacct --parsable2`.

pub mod parser;
pub mod scheduler;

pub use parser::{parse_sacct_line, parse_sbatch_output, parse_squeue_line, state_to_status};
pub use scheduler::SlurmScheduler;
