//! PBS qstat JSON parsing.

use camino::Utf8PathBuf;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use hpcmon_core::{JobInfo, JobStatus};
use hpcmon_parsers::parse_hms_duration;
use serde_json::Value;

/// Convert a PBS job_state code to the normalized status.
///
/// `F` alone reads as completed; [`job_from_json`] downgrades it to
/// `Failed` when `Exit_status` is nonzero. Held/waiting/suspended
/// states map to `Pending` like the other backends. Unmapped codes
/// are `Unknown`, never an error.
pub fn state_to_status(state: &str) -> JobStatus {
    match state {
        "Q" | "H" | "W" | "T" => JobStatus::Pending,
        "S" => JobStatus::Pending,
        "R" | "E" | "B" => JobStatus::Running,
        "F" | "X" => JobStatus::Completed,
        _ => JobStatus::Unknown,
    }
}

/// PBS timestamps look like `Thu Aug 19 13:05:17 2021`.
fn parse_pbs_datetime(s: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s.trim(), "%a %b %d %H:%M:%S %Y")
        .ok()
        .and_then(|dt| Utc.from_local_datetime(&dt).single())
}

fn json_str<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}

/// Strip the `host:` prefix PBS puts on Output_Path/Error_Path.
fn parse_output_path(raw: &str) -> Option<Utf8PathBuf> {
    let path = raw.split_once(':').map_or(raw, |(_, path)| path);
    if path.is_empty() {
        None
    } else {
        Some(Utf8PathBuf::from(path))
    }
}

/// Normalize one entry of the qstat JSON `Jobs` map.
pub fn job_from_json(job_id: &str, job: &Value) -> JobInfo {
    let state = json_str(job, "job_state").unwrap_or_default();
    let exit_code = job.get("Exit_status").and_then(Value::as_i64).map(|v| v as i32);

    let mut status = state_to_status(state);
    if status == JobStatus::Completed && exit_code.is_some_and(|code| code != 0) {
        status = JobStatus::Failed;
    }

    // Job_Owner is "user@submit-host"
    let user = json_str(job, "Job_Owner")
        .map(|owner| owner.split('@').next().unwrap_or(owner))
        .unwrap_or_default();

    let mut info = JobInfo::new(
        job_id,
        json_str(job, "Job_Name").unwrap_or_default(),
        user,
        status,
    );
    info.queue = json_str(job, "queue").map(str::to_string);
    info.submit_time = json_str(job, "qtime").and_then(parse_pbs_datetime);
    info.start_time = json_str(job, "stime").and_then(parse_pbs_datetime);
    if status.is_complete() {
        // mtime is the last state change, i.e. completion for F jobs
        info.end_time = json_str(job, "mtime").and_then(parse_pbs_datetime);
        info.exit_code = exit_code;
    }

    let resources = &job["Resource_List"];
    info.cpu = resources
        .get("ncpus")
        .and_then(|v| v.as_u64().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
        .map(|v| v as u32);
    info.memory = json_str(resources, "mem").map(str::to_string);
    info.gpu = resources
        .get("ngpus")
        .and_then(|v| v.as_u64().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
        .map(|v| v as u32);

    info.runtime = json_str(&job["resources_used"], "walltime").and_then(parse_hms_duration);

    // exec_host is "node1/0*4+node2/0*4"; keep the first node name
    info.node = json_str(job, "exec_host")
        .and_then(|hosts| hosts.split(&['/', '+'][..]).next())
        .filter(|node| !node.is_empty())
        .map(str::to_string);

    info.stdout_path = json_str(job, "Output_Path").and_then(parse_output_path);
    info.stderr_path = json_str(job, "Error_Path").and_then(parse_output_path);
    info.array_task_id = json_str(job, "array_index").map(str::to_string);

    info
}

/// Parse full `qstat -f -F json` output into normalized records.
///
/// Malformed JSON or a missing `Jobs` map yields an empty listing
/// rather than an error.
pub fn parse_qstat_json(output: &str) -> Vec<JobInfo> {
    let data: Value = match serde_json::from_str(output) {
        Ok(data) => data,
        Err(e) => {
            tracing::warn!("malformed qstat JSON: {e}");
            return Vec::new();
        }
    };

    let Some(jobs) = data.get("Jobs").and_then(Value::as_object) else {
        return Vec::new();
    };

    jobs.iter()
        .map(|(job_id, job)| job_from_json(job_id, job))
        .collect()
}

/// Extract the job id from qsub output: the first non-empty line,
/// e.g. `3983.pbs-server-01`.
pub fn parse_qsub_output(output: &str) -> Option<String> {
    output
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && line.chars().next().is_some_and(|c| c.is_ascii_digit()))
        .map(str::to_string)
}
