//! The uniform scheduler contract.

use crate::error::SchedulerError;
use crate::job_info::JobInfo;
use crate::job_spec::{ArrayJobResult, ArrayJobSpec, JobResult, JobSpec, OutputStream};
use crate::status::JobStatus;
use camino::Utf8PathBuf;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::future::Future;

/// Filter applied to active-job listings.
///
/// Backends always query the full listing and filter client-side;
/// scheduler-native query syntax varies too much to push these down.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobFilter {
    /// Restrict to one username. `None` = all users.
    pub user: Option<String>,
    /// Restrict to a status set. `None` = the active partition.
    pub statuses: Option<HashSet<JobStatus>>,
    /// Restrict to one queue. `None` = all queues.
    pub queue: Option<String>,
}

impl JobFilter {
    pub fn matches(&self, job: &JobInfo) -> bool {
        if let Some(ref user) = self.user
            && job.user != *user
        {
            return false;
        }
        match self.statuses {
            Some(ref statuses) => {
                if !statuses.contains(&job.status) {
                    return false;
                }
            }
            None => {
                if !job.status.is_active() {
                    return false;
                }
            }
        }
        if let Some(ref queue) = self.queue
            && job.queue.as_deref() != Some(queue.as_str())
        {
            return false;
        }
        true
    }

    /// Apply the filter to a freshly parsed listing.
    pub fn apply(&self, jobs: Vec<JobInfo>) -> Vec<JobInfo> {
        jobs.into_iter().filter(|job| self.matches(job)).collect()
    }
}

/// Query against scheduler accounting.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryQuery {
    pub user: Option<String>,
    /// Inclusive lower bound on completion time
    pub since: Option<DateTime<Utc>>,
    /// Inclusive upper bound on completion time
    pub until: Option<DateTime<Utc>>,
    pub exit_code: Option<i32>,
    pub queue: Option<String>,
    /// Result cap, most-recent-first
    pub limit: usize,
}

impl Default for HistoryQuery {
    fn default() -> Self {
        Self {
            user: None,
            since: None,
            until: None,
            exit_code: None,
            queue: None,
            limit: 100,
        }
    }
}

impl HistoryQuery {
    pub fn matches(&self, job: &JobInfo) -> bool {
        if let Some(ref user) = self.user
            && job.user != *user
        {
            return false;
        }
        if let Some(since) = self.since
            && !job.end_time.is_some_and(|end| end >= since)
        {
            return false;
        }
        if let Some(until) = self.until
            && !job.end_time.is_some_and(|end| end <= until)
        {
            return false;
        }
        if let Some(exit_code) = self.exit_code
            && job.exit_code != Some(exit_code)
        {
            return false;
        }
        if let Some(ref queue) = self.queue
            && job.queue.as_deref() != Some(queue.as_str())
        {
            return false;
        }
        true
    }

    /// Filter, order most-recent-first by end time, and cap at `limit`.
    pub fn apply(&self, jobs: Vec<JobInfo>) -> Vec<JobInfo> {
        let mut jobs: Vec<JobInfo> = jobs.into_iter().filter(|job| self.matches(job)).collect();
        jobs.sort_by(|a, b| b.end_time.cmp(&a.end_time));
        jobs.truncate(self.limit);
        jobs
    }
}

/// The contract every scheduler backend implements.
///
/// Methods return `impl Future + Send` so implementations can be plain
/// `async fn`s while callers stay generic over the backend.
pub trait Scheduler: Send + Sync + 'static {
    /// Short backend name, e.g. "sge".
    fn name(&self) -> &'static str;

    /// Submit a job. With `interactive` the call blocks until the job
    /// finishes and the result carries its exit code; otherwise it
    /// returns as soon as the scheduler accepts the job.
    fn submit(
        &self,
        spec: &JobSpec,
        interactive: bool,
    ) -> impl Future<Output = Result<JobResult, SchedulerError>> + Send;

    /// Submit an array job. Task ids derive from the base id.
    fn submit_array(
        &self,
        spec: &ArrayJobSpec,
    ) -> impl Future<Output = Result<ArrayJobResult, SchedulerError>> + Send;

    /// Cancel a job. Idempotent: cancelling a terminal or unknown job
    /// returns `false` instead of failing.
    fn cancel(&self, job_id: &str) -> impl Future<Output = bool> + Send;

    /// Current status. Total: unknown or unreachable jobs resolve to
    /// `JobStatus::Unknown`, never an error.
    fn get_status(&self, job_id: &str) -> impl Future<Output = JobStatus> + Send;

    /// Exit code, absent while the job is still active.
    fn get_exit_code(&self, job_id: &str) -> impl Future<Output = Option<i32>> + Send;

    /// Path of the job's stdout or stderr file, if the backend can
    /// determine one.
    fn get_output_path(
        &self,
        job_id: &str,
        stream: OutputStream,
    ) -> impl Future<Output = Option<Utf8PathBuf>> + Send;

    /// Render the native submission script. Pure, no I/O.
    fn generate_script(&self, spec: &JobSpec) -> String;

    /// Build the native submission argument list. Pure, no I/O.
    fn build_submit_command(&self, spec: &JobSpec) -> Vec<String>;

    /// One full live-listing query, parsed then filtered client-side.
    fn list_active_jobs(
        &self,
        filter: &JobFilter,
    ) -> impl Future<Output = Result<Vec<JobInfo>, SchedulerError>> + Send;

    /// Accounting query. Fails with `AccountingNotAvailable` on backends
    /// without an accounting subsystem, before any subprocess call.
    fn list_completed_jobs(
        &self,
        query: &HistoryQuery,
    ) -> impl Future<Output = Result<Vec<JobInfo>, SchedulerError>> + Send;

    /// Capability probe; pure, no I/O.
    fn has_accounting(&self) -> bool;

    /// Full details for one job, from the live listing first and
    /// accounting second. `JobNotFound` if neither knows the id.
    fn get_job_details(
        &self,
        job_id: &str,
    ) -> impl Future<Output = Result<JobInfo, SchedulerError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn job(id: &str, user: &str, status: JobStatus, queue: Option<&str>) -> JobInfo {
        let mut j = JobInfo::new(id, "job", user, status);
        j.queue = queue.map(str::to_string);
        j
    }

    #[test]
    fn default_filter_keeps_only_active_jobs() {
        let filter = JobFilter::default();
        let jobs = vec![
            job("1", "alice", JobStatus::Running, None),
            job("2", "alice", JobStatus::Completed, None),
            job("3", "bob", JobStatus::Unknown, None),
        ];
        let kept = filter.apply(jobs);
        let ids: Vec<&str> = kept.iter().map(|j| j.job_id.as_str()).collect();
        assert_eq!(ids, vec!["1", "3"]);
    }

    #[test]
    fn user_and_queue_filters_apply() {
        let filter = JobFilter {
            user: Some("alice".to_string()),
            statuses: None,
            queue: Some("all.q".to_string()),
        };
        assert!(filter.matches(&job("1", "alice", JobStatus::Pending, Some("all.q"))));
        assert!(!filter.matches(&job("2", "bob", JobStatus::Pending, Some("all.q"))));
        assert!(!filter.matches(&job("3", "alice", JobStatus::Pending, Some("gpu.q"))));
        assert!(!filter.matches(&job("4", "alice", JobStatus::Pending, None)));
    }

    #[test]
    fn explicit_status_set_overrides_active_default() {
        let filter = JobFilter {
            user: None,
            statuses: Some([JobStatus::Failed].into_iter().collect()),
            queue: None,
        };
        assert!(filter.matches(&job("1", "a", JobStatus::Failed, None)));
        assert!(!filter.matches(&job("2", "a", JobStatus::Running, None)));
    }

    #[test]
    fn history_query_bounds_are_inclusive() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap();
        let query = HistoryQuery {
            since: Some(t0),
            until: Some(t0),
            ..Default::default()
        };

        let mut inside = job("1", "a", JobStatus::Completed, None);
        inside.end_time = Some(t0);
        assert!(query.matches(&inside));

        let mut outside = inside.clone();
        outside.end_time = Some(t0 + chrono::Duration::seconds(1));
        assert!(!query.matches(&outside));

        // No end time at all cannot satisfy a time bound
        let missing = job("2", "a", JobStatus::Completed, None);
        assert!(!query.matches(&missing));
    }

    #[test]
    fn history_query_orders_recent_first_and_caps() {
        let base = Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap();
        let jobs: Vec<JobInfo> = (0..5)
            .map(|i| {
                let mut j = job(&i.to_string(), "a", JobStatus::Completed, None);
                j.end_time = Some(base + chrono::Duration::minutes(i));
                j
            })
            .collect();

        let query = HistoryQuery {
            limit: 2,
            ..Default::default()
        };
        let kept = query.apply(jobs);
        let ids: Vec<&str> = kept.iter().map(|j| j.job_id.as_str()).collect();
        assert_eq!(ids, vec!["4", "3"]);
    }
}
