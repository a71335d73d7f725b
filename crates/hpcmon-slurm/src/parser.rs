//! Slurm output parsing.

use hpcmon_core::{JobInfo, JobStatus};
use hpcmon_parsers::{non_empty_string, parse_iso_timestamp, split_delimited};

/// squeue output format (pipe-delimited, --noheader):
/// %A job id, %j name, %u user, %T state, %P partition, %V submit,
/// %S start, %N nodelist, %C cpus, %m memory, %K array task id,
/// %E dependency
pub const SQUEUE_FORMAT: &str = "%A|%j|%u|%T|%P|%V|%S|%N|%C|%m|%K|%E";

/// sacct --parsable2 field list, matched by [`parse_sacct_line`].
pub const SACCT_FORMAT: &str =
    "JobIDRaw,JobName,User,State,Partition,Submit,Start,End,NodeList,AllocCPUS,ReqMem,ExitCode";

/// Convert a Slurm state string to the normalized status.
///
/// sacct states can carry suffixes ("CANCELLED by 1234"); only the
/// first token counts. Suspended and requeue-ish states map to
/// `Pending`, matching the SGE backend's treatment of held jobs.
/// Unmapped states are `Unknown`, never an error.
pub fn state_to_status(state: &str) -> JobStatus {
    let base = state.split_whitespace().next().unwrap_or(state);
    match base.to_uppercase().as_str() {
        "PENDING" | "PD" | "CONFIGURING" | "REQUEUED" | "RESIZING" => JobStatus::Pending,
        "SUSPENDED" | "S" => JobStatus::Pending,
        "RUNNING" | "R" | "COMPLETING" | "CG" => JobStatus::Running,
        "COMPLETED" | "CD" => JobStatus::Completed,
        "FAILED" | "F" | "NODE_FAIL" | "NF" | "OUT_OF_MEMORY" | "OOM" | "BOOT_FAIL" => {
            JobStatus::Failed
        }
        "CANCELLED" | "CA" | "PREEMPTED" | "PR" => JobStatus::Cancelled,
        "TIMEOUT" | "TO" => JobStatus::Timeout,
        _ => JobStatus::Unknown,
    }
}

/// Parse exit code from the Slurm `exit:signal` format.
fn parse_exit_code(s: &str) -> Option<i32> {
    s.split(':').next().and_then(|v| v.parse().ok())
}

/// Parse a single line of squeue output in [`SQUEUE_FORMAT`].
///
/// Short lines are skipped (None), not errors: a single garbled row
/// must not poison the listing.
pub fn parse_squeue_line(line: &str) -> Option<JobInfo> {
    let fields = split_delimited(line, 12).ok()?;

    let status = state_to_status(fields[3]);
    let mut info = JobInfo::new(fields[0], fields[1], fields[2], status);
    info.queue = non_empty_string(fields[4]);
    info.submit_time = parse_iso_timestamp(fields[5]);
    info.start_time = parse_iso_timestamp(fields[6]);
    info.node = non_empty_string(fields[7]);
    info.cpu = fields[8].parse().ok();
    info.memory = non_empty_string(fields[9]);
    info.array_task_id = non_empty_string(fields[10]);
    // Dependency expressions look like "afterok:100,afterany:101";
    // keep the job ids only.
    info.dependencies = non_empty_string(fields[11]).map(|deps| {
        deps.split(',')
            .filter_map(|dep| dep.rsplit(':').next())
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect()
    });

    if status == JobStatus::Running
        && let Some(start) = info.start_time
    {
        info.runtime = chrono::Utc::now().signed_duration_since(start).to_std().ok();
    }

    Some(info)
}

/// Parse a single line of sacct --parsable2 output in [`SACCT_FORMAT`].
pub fn parse_sacct_line(line: &str) -> Option<JobInfo> {
    let fields = split_delimited(line, 12).ok()?;

    let status = state_to_status(fields[3]);
    let mut info = JobInfo::new(fields[0], fields[1], fields[2], status);
    info.queue = non_empty_string(fields[4]);
    info.submit_time = parse_iso_timestamp(fields[5]);
    info.start_time = parse_iso_timestamp(fields[6]);
    info.end_time = parse_iso_timestamp(fields[7]);
    info.node = non_empty_string(fields[8]);
    info.cpu = fields[9].parse().ok();
    info.memory = non_empty_string(fields[10]);
    if status.is_complete() {
        info.exit_code = parse_exit_code(fields[11]);
    }

    if let (Some(start), Some(end)) = (info.start_time, info.end_time) {
        info.runtime = end.signed_duration_since(start).to_std().ok();
    }

    Some(info)
}

/// Extract the job id from sbatch output.
///
/// `--parsable` prints `12345` (optionally `12345;cluster`); older
/// invocations print `Submitted batch job 12345`. No match yields
/// `None`.
pub fn parse_sbatch_output(output: &str) -> Option<String> {
    for line in output.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.chars().next().is_some_and(|c| c.is_ascii_digit()) {
            return line.split(';').next().map(str::to_string);
        }
        if line.to_lowercase().starts_with("submitted batch job") {
            return line.split_whitespace().nth(3).map(str::to_string);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn squeue_line_parses_all_fields() {
        let line = "12345|align|alice|RUNNING|short|2024-01-15T10:00:00|2024-01-15T10:05:00|node01|4|16G|N/A|";
        let info = parse_squeue_line(line).unwrap();
        assert_eq!(info.job_id, "12345");
        assert_eq!(info.name, "align");
        assert_eq!(info.user, "alice");
        assert_eq!(info.status, JobStatus::Running);
        assert_eq!(info.queue.as_deref(), Some("short"));
        assert_eq!(info.node.as_deref(), Some("node01"));
        assert_eq!(info.cpu, Some(4));
        assert_eq!(info.memory.as_deref(), Some("16G"));
        assert_eq!(info.array_task_id, None);
        assert_eq!(info.dependencies, None);
        assert!(info.runtime.is_some());
    }

    #[test]
    fn squeue_dependency_field_splits() {
        let line =
            "2|x|a|PENDING|short|2024-01-15T10:00:00|N/A||1|4G|7|afterok:100,afterok:101";
        let info = parse_squeue_line(line).unwrap();
        assert_eq!(info.array_task_id.as_deref(), Some("7"));
        let deps = info.dependencies.unwrap();
        assert!(deps.contains(&"100".to_string()));
        assert!(deps.contains(&"101".to_string()));
    }

    #[test]
    fn short_squeue_line_is_skipped() {
        assert!(parse_squeue_line("12345|align|RUNNING").is_none());
    }

    #[test]
    fn sacct_line_carries_exit_code_and_runtime() {
        let line = "12345|align|alice|FAILED|short|2024-01-15T10:00:00|2024-01-15T10:05:00|2024-01-15T10:35:00|node01|4|16Gn|1:0";
        let info = parse_sacct_line(line).unwrap();
        assert_eq!(info.status, JobStatus::Failed);
        assert_eq!(info.exit_code, Some(1));
        assert_eq!(info.runtime, Some(std::time::Duration::from_secs(1800)));
        assert!(info.end_time.is_some());
    }

    #[test]
    fn state_mapping_covers_sacct_suffixes() {
        assert_eq!(state_to_status("RUNNING"), JobStatus::Running);
        assert_eq!(state_to_status("PD"), JobStatus::Pending);
        assert_eq!(state_to_status("CANCELLED by 1234"), JobStatus::Cancelled);
        assert_eq!(state_to_status("TIMEOUT"), JobStatus::Timeout);
        assert_eq!(state_to_status("OUT_OF_MEMORY"), JobStatus::Failed);
        assert_eq!(state_to_status("SUSPENDED"), JobStatus::Pending);
        assert_eq!(state_to_status("whatever"), JobStatus::Unknown);
    }

    #[test]
    fn sbatch_output_forms() {
        assert_eq!(parse_sbatch_output("12345\n"), Some("12345".to_string()));
        assert_eq!(
            parse_sbatch_output("12345;cluster2"),
            Some("12345".to_string())
        );
        assert_eq!(
            parse_sbatch_output("Submitted batch job 67890"),
            Some("67890".to_string())
        );
        assert_eq!(parse_sbatch_output("sbatch: error: no such partition"), None);
    }
}
