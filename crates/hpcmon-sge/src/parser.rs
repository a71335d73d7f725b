//! SGE output parsing.

use crate::types::SgeJob;
use hpcmon_core::JobStatus;
use hpcmon_parsers::parse_epoch_seconds;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

/// Parse `qstat -xml` output into raw job records.
///
/// The document carries two listing sections, `queue_info` (running
/// jobs) and `job_info` (pending jobs), each holding repeated
/// `job_list` elements. A malformed document yields an empty listing
/// rather than an error: partial scheduler output must not take down
/// the poll loop.
pub fn parse_qstat_xml(xml: &str) -> Vec<SgeJob> {
    let doc = match roxmltree::Document::parse(xml) {
        Ok(doc) => doc,
        Err(e) => {
            tracing::warn!("malformed qstat XML: {e}");
            return Vec::new();
        }
    };

    doc.descendants()
        .filter(|node| node.has_tag_name("job_list"))
        .filter_map(parse_job_element)
        .collect()
}

fn child_text<'a>(node: roxmltree::Node<'a, '_>, tag: &str) -> Option<&'a str> {
    node.children()
        .find(|child| child.has_tag_name(tag))
        .and_then(|child| child.text())
        .map(str::trim)
        .filter(|text| !text.is_empty())
}

/// Parse a single `job_list` element.
///
/// The job id is mandatory; records without one are dropped. Every
/// other element (`JB_name`, `JB_owner`, `state`, `queue_name`,
/// `hard_req_queue`, `slots`, `JB_submission_time`, `JAT_start_time`,
/// `tasks`) is independently optional.
fn parse_job_element(elem: roxmltree::Node<'_, '_>) -> Option<SgeJob> {
    let job_id = child_text(elem, "JB_job_number")?.to_string();

    // Running jobs report queue_name as "queue@host"; keep the queue
    // segment only. Pending jobs may carry a requested queue instead.
    let queue = child_text(elem, "queue_name")
        .and_then(|full| full.split('@').next())
        .filter(|queue| !queue.is_empty())
        .or_else(|| child_text(elem, "hard_req_queue"))
        .map(str::to_string);

    Some(SgeJob {
        job_id,
        name: child_text(elem, "JB_name").map(str::to_string),
        user: child_text(elem, "JB_owner").map(str::to_string),
        state: child_text(elem, "state").map(str::to_string),
        queue,
        slots: child_text(elem, "slots").and_then(|s| s.parse().ok()),
        submit_time: child_text(elem, "JB_submission_time").and_then(parse_epoch_seconds),
        start_time: child_text(elem, "JAT_start_time").and_then(parse_epoch_seconds),
        array_task_id: child_text(elem, "tasks").map(str::to_string),
    })
}

/// Parse plain `qstat` output (fallback for installations whose qstat
/// lacks `-xml`).
///
/// Header rows end at the first separator line of dashes; everything
/// before it is discarded. Data lines are whitespace-tokenized
/// positionally (id, priority, name, user, state, then optionally the
/// queue at token 7 and slots at token 8); lines with fewer than 5
/// tokens are skipped.
pub fn parse_qstat_plain(output: &str) -> Vec<SgeJob> {
    let mut jobs = Vec::new();
    let mut data_started = false;

    for line in output.lines() {
        if line.starts_with('-') {
            data_started = true;
            continue;
        }
        if !data_started {
            continue;
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 5 {
            continue;
        }

        jobs.push(SgeJob {
            job_id: parts[0].to_string(),
            name: Some(parts[2].to_string()),
            user: Some(parts[3].to_string()),
            state: Some(parts[4].to_string()),
            queue: parts.get(7).map(|s| s.to_string()),
            slots: parts.get(8).and_then(|s| s.parse().ok()),
            submit_time: None,
            start_time: None,
            array_task_id: None,
        });
    }

    jobs
}

/// Parse one qacct accounting block into a key/value mapping.
///
/// Lines of `=` characters are record markers and are skipped; each
/// remaining line splits on the first whitespace run into key and
/// (trimmed) value. Duplicate keys overwrite earlier ones.
pub fn parse_qacct_record(output: &str) -> HashMap<String, String> {
    let mut record = HashMap::new();

    for line in output.lines() {
        if line.starts_with('=') {
            continue;
        }
        if let Some((key, value)) = line.trim().split_once(char::is_whitespace) {
            record.insert(key.to_string(), value.trim().to_string());
        }
    }

    record
}

/// Split multi-job qacct output on `=` marker lines, one record per job.
pub fn parse_qacct_blocks(output: &str) -> Vec<HashMap<String, String>> {
    let mut blocks = Vec::new();
    let mut current = String::new();

    for line in output.lines() {
        if line.starts_with('=') {
            if !current.trim().is_empty() {
                blocks.push(parse_qacct_record(&current));
                current.clear();
            }
            continue;
        }
        current.push_str(line);
        current.push('\n');
    }
    if !current.trim().is_empty() {
        blocks.push(parse_qacct_record(&current));
    }

    blocks.retain(|record| !record.is_empty());
    blocks
}

/// Convert an SGE state code to the normalized status.
///
/// Matching is case-insensitive. Suspended states (`s`, `ts`, `ss`,
/// and the queue-suspended uppercase forms) map to `Pending`: the
/// original vocabulary has no suspended status, and "held, not
/// progressing" reads closest to queued. Anything unrecognized is
/// `Unknown`, never an error.
pub fn state_to_status(state: &str) -> JobStatus {
    match state.to_lowercase().as_str() {
        "r" | "t" | "rr" | "rt" => JobStatus::Running,
        "qw" | "hqw" => JobStatus::Pending,
        "eqw" => JobStatus::Failed,
        "dr" | "dt" => JobStatus::Cancelled,
        "s" | "ts" | "ss" => JobStatus::Pending,
        _ => JobStatus::Unknown,
    }
}

static QSUB_JOB_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"Your job (\d+)").unwrap());
static QSUB_ARRAY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"Your job-array (\d+)").unwrap());

/// Extract the job id from qsub output.
///
/// Matches `Your job 12345 ("name") has been submitted` and the
/// job-array variant. No match yields `None`; the caller decides
/// whether a missing id is fatal.
pub fn parse_qsub_output(output: &str) -> Option<String> {
    if let Some(caps) = QSUB_JOB_RE.captures(output) {
        return Some(caps[1].to_string());
    }
    if let Some(caps) = QSUB_ARRAY_RE.captures(output) {
        return Some(caps[1].to_string());
    }
    None
}
