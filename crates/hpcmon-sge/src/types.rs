//! Raw SGE parse records.

use crate::parser::state_to_status;
use chrono::{DateTime, Utc};
use hpcmon_core::JobInfo;

/// One job as it appears in a qstat listing, before normalization.
///
/// Only the job id is mandatory; every other field is independently
/// optional because SGE omits elements freely (pending jobs have no
/// start time, plain listings carry no timestamps at all). This shape
/// never leaves the crate: it is converted to [`JobInfo`] before the
/// adapter returns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SgeJob {
    pub job_id: String,
    pub name: Option<String>,
    pub user: Option<String>,
    pub state: Option<String>,
    pub queue: Option<String>,
    pub slots: Option<u32>,
    pub submit_time: Option<DateTime<Utc>>,
    /// Running jobs only
    pub start_time: Option<DateTime<Utc>>,
    pub array_task_id: Option<String>,
}

impl SgeJob {
    /// Normalize into the canonical record.
    pub fn into_job_info(self) -> JobInfo {
        let status = self
            .state
            .as_deref()
            .map(state_to_status)
            .unwrap_or(hpcmon_core::JobStatus::Unknown);

        let mut info = JobInfo::new(
            self.job_id,
            self.name.unwrap_or_default(),
            self.user.unwrap_or_default(),
            status,
        );
        info.queue = self.queue;
        info.cpu = self.slots;
        info.submit_time = self.submit_time;
        info.start_time = self.start_time;
        info.array_task_id = self.array_task_id;

        // Elapsed time so far for jobs that have started
        if status == hpcmon_core::JobStatus::Running
            && let Some(start) = info.start_time
        {
            let elapsed = Utc::now().signed_duration_since(start);
            info.runtime = elapsed.to_std().ok();
        }

        info
    }
}
