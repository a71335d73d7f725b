//! The canonical, scheduler-agnostic job record.

use crate::status::JobStatus;
use camino::Utf8PathBuf;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Unified job information produced by every backend.
///
/// All fields except `job_id`, `name`, `user` and `status` are optional:
/// schedulers differ widely in what their listings expose, and a field a
/// backend cannot supply stays `None` instead of being defaulted to
/// something that looks like real data.
///
/// `JobInfo` is a plain value. It is rebuilt from scratch on every poll
/// and replaced wholesale; consumers that need change detection diff by
/// `job_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobInfo {
    /// Scheduler-native identifier, treated as opaque
    pub job_id: String,
    pub name: String,
    pub user: String,
    pub status: JobStatus,

    /// Queue/partition name
    pub queue: Option<String>,

    pub submit_time: Option<DateTime<Utc>>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub runtime: Option<Duration>,

    /// Allocated or requested core count
    pub cpu: Option<u32>,
    /// Memory as the scheduler reported it, e.g. "16G"
    pub memory: Option<String>,
    pub gpu: Option<u32>,

    /// Only present once the job is in the complete partition
    pub exit_code: Option<i32>,

    pub stdout_path: Option<Utf8PathBuf>,
    pub stderr_path: Option<Utf8PathBuf>,

    pub node: Option<String>,
    pub dependencies: Option<Vec<String>>,
    pub array_task_id: Option<String>,
}

impl JobInfo {
    /// Minimal record; every optional field starts out empty.
    pub fn new(
        job_id: impl Into<String>,
        name: impl Into<String>,
        user: impl Into<String>,
        status: JobStatus,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            name: name.into(),
            user: user.into(),
            status,
            queue: None,
            submit_time: None,
            start_time: None,
            end_time: None,
            runtime: None,
            cpu: None,
            memory: None,
            gpu: None,
            exit_code: None,
            stdout_path: None,
            stderr_path: None,
            node: None,
            dependencies: None,
            array_task_id: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    pub fn is_complete(&self) -> bool {
        self.status.is_complete()
    }

    /// Runtime formatted for display, e.g. "45s", "12m", "2h 15m", "3d 4h".
    pub fn runtime_display(&self) -> String {
        let Some(runtime) = self.runtime else {
            return "—".to_string();
        };

        let total_seconds = runtime.as_secs();
        if total_seconds < 60 {
            return format!("{total_seconds}s");
        }

        let minutes = total_seconds / 60;
        if minutes < 60 {
            return format!("{minutes}m");
        }

        let hours = minutes / 60;
        if hours < 24 {
            return format!("{}h {}m", hours, minutes % 60);
        }

        format!("{}d {}h", hours / 24, hours % 24)
    }

    /// Resources formatted for display, e.g. "4/16G/1GPU".
    pub fn resources_display(&self) -> String {
        let mut parts = Vec::new();
        if let Some(cpu) = self.cpu {
            parts.push(cpu.to_string());
        }
        if let Some(ref memory) = self.memory {
            parts.push(memory.clone());
        }
        if let Some(gpu) = self.gpu {
            parts.push(format!("{gpu}GPU"));
        }

        if parts.is_empty() {
            "—".to_string()
        } else {
            parts.join("/")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(status: JobStatus) -> JobInfo {
        JobInfo::new("101", "align", "alice", status)
    }

    #[test]
    fn active_complete_delegate_to_status() {
        assert!(job(JobStatus::Running).is_active());
        assert!(!job(JobStatus::Running).is_complete());
        assert!(job(JobStatus::Timeout).is_complete());
    }

    #[test]
    fn runtime_display_buckets() {
        let mut j = job(JobStatus::Running);
        assert_eq!(j.runtime_display(), "—");

        j.runtime = Some(Duration::from_secs(45));
        assert_eq!(j.runtime_display(), "45s");

        j.runtime = Some(Duration::from_secs(12 * 60));
        assert_eq!(j.runtime_display(), "12m");

        j.runtime = Some(Duration::from_secs(2 * 3600 + 15 * 60));
        assert_eq!(j.runtime_display(), "2h 15m");

        j.runtime = Some(Duration::from_secs(3 * 86400 + 4 * 3600));
        assert_eq!(j.runtime_display(), "3d 4h");
    }

    #[test]
    fn resources_display_joins_present_fields() {
        let mut j = job(JobStatus::Running);
        assert_eq!(j.resources_display(), "—");

        j.cpu = Some(4);
        j.memory = Some("16G".to_string());
        assert_eq!(j.resources_display(), "4/16G");

        j.gpu = Some(1);
        assert_eq!(j.resources_display(), "4/16G/1GPU");
    }
}
