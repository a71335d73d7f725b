//! Shared parsing and process-execution utilities for scheduler output.
//!
//! Every backend crate goes through [`command::run_command`] to invoke
//! its scheduler CLI and uses the helpers here to normalize the loose
//! text those CLIs produce.

pub mod command;
pub mod time;

pub use command::{run_command, run_command_allow_failure, CommandError, DEFAULT_TIMEOUT};
pub use time::{
    format_hms_duration, parse_epoch_seconds, parse_hms_duration, parse_iso_timestamp,
};

/// Filter helper for optional string fields.
/// Returns None if the string is empty or a placeholder value.
pub fn non_empty_string(s: &str) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty()
        || trimmed == "-"
        || trimmed == "N/A"
        || trimmed == "Unknown"
        || trimmed == "None"
    {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Split a pipe-delimited line and validate field count.
pub fn split_delimited(line: &str, min_fields: usize) -> Result<Vec<&str>, String> {
    let fields: Vec<&str> = line.split('|').collect();
    if fields.len() < min_fields {
        return Err(format!(
            "Expected {} fields, got {}: {}",
            min_fields,
            fields.len(),
            line
        ));
    }
    Ok(fields)
}
