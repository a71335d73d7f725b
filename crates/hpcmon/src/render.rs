//! Plain-text and JSON output.

use hpcmon_core::JobInfo;
use std::fmt::Write;

const HEADERS: [&str; 8] = [
    "JOBID", "NAME", "USER", "STATE", "QUEUE", "RUNTIME", "RESOURCES", "EXIT",
];

fn row(job: &JobInfo) -> [String; 8] {
    [
        job.job_id.clone(),
        job.name.clone(),
        job.user.clone(),
        job.status.label().to_string(),
        job.queue.clone().unwrap_or_else(|| "—".to_string()),
        job.runtime_display(),
        job.resources_display(),
        job.exit_code
            .map(|code| code.to_string())
            .unwrap_or_else(|| "—".to_string()),
    ]
}

/// Render jobs as an aligned table, one line per job.
pub fn render_table(jobs: &[JobInfo]) -> String {
    let rows: Vec<[String; 8]> = jobs.iter().map(row).collect();

    let mut widths: [usize; 8] = HEADERS.map(str::len);
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    for (i, header) in HEADERS.iter().enumerate() {
        if i > 0 {
            out.push_str("  ");
        }
        write!(out, "{header:<width$}", width = widths[i]).unwrap();
    }
    out.push('\n');

    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            if i > 0 {
                out.push_str("  ");
            }
            write!(out, "{cell:<width$}", width = widths[i]).unwrap();
        }
        out.push('\n');
    }
    out
}

pub fn render_json(jobs: &[JobInfo]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(jobs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hpcmon_core::JobStatus;

    fn jobs() -> Vec<JobInfo> {
        let mut a = JobInfo::new("101", "align", "alice", JobStatus::Running);
        a.queue = Some("all.q".to_string());
        a.cpu = Some(4);
        let mut b = JobInfo::new("102", "sort-with-a-long-name", "bob", JobStatus::Pending);
        b.queue = Some("gpu.q".to_string());
        vec![a, b]
    }

    #[test]
    fn table_aligns_columns() {
        let table = render_table(&jobs());
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("JOBID"));
        // NAME column is padded to the widest cell, so USER starts at the
        // same offset on every line.
        let offset = lines[0].find("USER").unwrap();
        assert_eq!(&lines[1][offset..offset + 5], "alice");
        assert_eq!(&lines[2][offset..offset + 3], "bob");
    }

    #[test]
    fn json_output_is_an_array() {
        let json = render_json(&jobs()).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.as_array().unwrap().len(), 2);
        assert_eq!(parsed[0]["job_id"], "101");
        assert_eq!(parsed[0]["status"], "RUNNING");
    }
}
