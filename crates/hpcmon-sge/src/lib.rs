//! Sun Grid Engine backend.
//!
//! Three independent grammars feed one normalized shape: the
//! `qstat -xml` job listing, the fixed-width plain-text fallback, and
//! `qacct` key/value accounting blocks.

pub mod parser;
pub mod scheduler;
pub mod types;

pub use parser::{
    parse_qacct_blocks, parse_qacct_record, parse_qstat_plain, parse_qstat_xml,
    parse_qsub_output, state_to_status,
};
pub use scheduler::SgeScheduler;
pub use types::SgeJob;
