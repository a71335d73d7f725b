//! Local fallback backend.
//!
//! Runs jobs as plain local processes and tracks them in an in-process
//! registry. There is no accounting subsystem: `has_accounting` is
//! `false` and `list_completed_jobs` fails without touching any
//! subprocess.

use camino::Utf8PathBuf;
use chrono::{DateTime, Utc};
use hpcmon_core::{
    ArrayJobResult, ArrayJobSpec, HistoryQuery, JobFilter, JobInfo, JobResult, JobSpec, JobStatus,
    OutputStream, Scheduler, SchedulerError,
};
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::process::{Child, Command};

struct LocalJob {
    name: String,
    user: String,
    status: JobStatus,
    submit_time: DateTime<Utc>,
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
    exit_code: Option<i32>,
    stdout_path: Option<Utf8PathBuf>,
    stderr_path: Option<Utf8PathBuf>,
    /// Present while the process is alive
    child: Option<Child>,
}

impl LocalJob {
    /// Reap the child if it has exited and record the outcome.
    fn poll(&mut self) {
        let Some(child) = self.child.as_mut() else {
            return;
        };
        match child.try_wait() {
            Ok(Some(exit)) => {
                self.child = None;
                self.end_time = Some(Utc::now());
                self.exit_code = exit.code();
                // Only overwrite Running; a cancel already set its status.
                if self.status == JobStatus::Running {
                    self.status = if exit.success() {
                        JobStatus::Completed
                    } else {
                        JobStatus::Failed
                    };
                }
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!("failed to poll local job: {e}");
            }
        }
    }

    fn to_job_info(&self, job_id: &str) -> JobInfo {
        let mut info = JobInfo::new(job_id, self.name.clone(), self.user.clone(), self.status);
        info.submit_time = Some(self.submit_time);
        info.start_time = self.start_time;
        info.end_time = self.end_time;
        info.exit_code = self.exit_code;
        info.stdout_path = self.stdout_path.clone();
        info.stderr_path = self.stderr_path.clone();
        info.node = Some("localhost".to_string());
        if let Some(start) = self.start_time {
            let end = self.end_time.unwrap_or_else(Utc::now);
            info.runtime = end.signed_duration_since(start).to_std().ok();
        }
        info
    }
}

/// Fallback backend used when no real scheduler is detected.
pub struct LocalScheduler {
    jobs: Mutex<HashMap<String, LocalJob>>,
    next_id: AtomicU64,
    user: String,
}

impl LocalScheduler {
    pub fn new() -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            user: std::env::var("USER").unwrap_or_else(|_| "unknown".to_string()),
        }
    }

    fn allocate_id(&self) -> String {
        self.next_id.fetch_add(1, Ordering::Relaxed).to_string()
    }

    fn output_file(
        spec_path: Option<&Utf8PathBuf>,
        workdir: Option<&Utf8PathBuf>,
        name: &str,
        marker: char,
        job_id: &str,
    ) -> Utf8PathBuf {
        match spec_path {
            Some(path) => path.clone(),
            None => {
                let file = format!("{name}.{marker}{job_id}");
                match workdir {
                    Some(dir) => dir.join(file),
                    None => Utf8PathBuf::from(file),
                }
            }
        }
    }

    fn spawn_job(
        &self,
        spec: &JobSpec,
        job_id: &str,
        extra_env: Option<(&str, String)>,
    ) -> Result<LocalJob, SchedulerError> {
        let stdout_path =
            Self::output_file(spec.stdout_path.as_ref(), spec.workdir.as_ref(), &spec.name, 'o', job_id);
        let stderr_path =
            Self::output_file(spec.stderr_path.as_ref(), spec.workdir.as_ref(), &spec.name, 'e', job_id);

        let stdout_file = std::fs::File::create(stdout_path.as_std_path())
            .map_err(|e| SchedulerError::Submission(format!("cannot create {stdout_path}: {e}")))?;
        let stderr_file = std::fs::File::create(stderr_path.as_std_path())
            .map_err(|e| SchedulerError::Submission(format!("cannot create {stderr_path}: {e}")))?;

        let mut cmd = Command::new(&spec.command);
        cmd.args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout_file))
            .stderr(Stdio::from(stderr_file));
        if let Some(ref workdir) = spec.workdir {
            cmd.current_dir(workdir.as_std_path());
        }
        if let Some((key, value)) = extra_env {
            cmd.env(key, value);
        }

        let child = cmd
            .spawn()
            .map_err(|e| SchedulerError::Submission(format!("cannot spawn {}: {e}", spec.command)))?;

        let now = Utc::now();
        Ok(LocalJob {
            name: spec.name.clone(),
            user: self.user.clone(),
            status: JobStatus::Running,
            submit_time: now,
            start_time: Some(now),
            end_time: None,
            exit_code: None,
            stdout_path: Some(stdout_path),
            stderr_path: Some(stderr_path),
            child: Some(child),
        })
    }

    fn with_polled_jobs<T>(&self, f: impl FnOnce(&mut HashMap<String, LocalJob>) -> T) -> T {
        let mut jobs = self.jobs.lock().expect("local job registry poisoned");
        for job in jobs.values_mut() {
            job.poll();
        }
        f(&mut jobs)
    }
}

impl Default for LocalScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for LocalScheduler {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn submit(&self, spec: &JobSpec, interactive: bool) -> Result<JobResult, SchedulerError> {
        let job_id = self.allocate_id();
        let mut job = self.spawn_job(spec, &job_id, None)?;

        if interactive {
            let mut child = job.child.take().expect("child present after spawn");
            let exit = child
                .wait()
                .await
                .map_err(|e| SchedulerError::Submission(e.to_string()))?;
            job.end_time = Some(Utc::now());
            job.exit_code = exit.code();
            job.status = if exit.success() {
                JobStatus::Completed
            } else {
                JobStatus::Failed
            };
            let result = JobResult {
                job_id: job_id.clone(),
                status: job.status,
                exit_code: job.exit_code,
            };
            self.jobs.lock().expect("local job registry poisoned").insert(job_id, job);
            return Ok(result);
        }

        self.jobs
            .lock()
            .expect("local job registry poisoned")
            .insert(job_id.clone(), job);
        Ok(JobResult {
            job_id,
            status: JobStatus::Running,
            exit_code: None,
        })
    }

    async fn submit_array(&self, spec: &ArrayJobSpec) -> Result<ArrayJobResult, SchedulerError> {
        let base_id = self.allocate_id();

        for index in (spec.start..=spec.end).step_by(spec.step.max(1) as usize) {
            let task_id = format!("{base_id}.{index}");
            let job = self.spawn_job(
                &spec.job,
                &task_id,
                Some(("HPCMON_TASK_ID", index.to_string())),
            )?;
            self.jobs
                .lock()
                .expect("local job registry poisoned")
                .insert(task_id, job);
        }

        Ok(ArrayJobResult {
            base_id,
            start: spec.start,
            end: spec.end,
            step: spec.step,
        })
    }

    async fn cancel(&self, job_id: &str) -> bool {
        self.with_polled_jobs(|jobs| {
            let Some(job) = jobs.get_mut(job_id) else {
                return false;
            };
            // Terminal even if the killed child has not been reaped yet
            if !job.status.is_active() {
                return false;
            }
            let Some(child) = job.child.as_mut() else {
                return false;
            };
            if child.start_kill().is_ok() {
                job.status = JobStatus::Cancelled;
                true
            } else {
                false
            }
        })
    }

    async fn get_status(&self, job_id: &str) -> JobStatus {
        self.with_polled_jobs(|jobs| {
            jobs.get(job_id)
                .map(|job| job.status)
                .unwrap_or(JobStatus::Unknown)
        })
    }

    async fn get_exit_code(&self, job_id: &str) -> Option<i32> {
        self.with_polled_jobs(|jobs| jobs.get(job_id).and_then(|job| job.exit_code))
    }

    async fn get_output_path(&self, job_id: &str, stream: OutputStream) -> Option<Utf8PathBuf> {
        self.with_polled_jobs(|jobs| {
            let job = jobs.get(job_id)?;
            match stream {
                OutputStream::Stdout => job.stdout_path.clone(),
                OutputStream::Stderr => job.stderr_path.clone(),
            }
        })
    }

    fn generate_script(&self, spec: &JobSpec) -> String {
        format!("#!/bin/sh\n\n{}\n", spec.command_line())
    }

    fn build_submit_command(&self, spec: &JobSpec) -> Vec<String> {
        vec!["sh".to_string(), "-c".to_string(), spec.command_line()]
    }

    async fn list_active_jobs(&self, filter: &JobFilter) -> Result<Vec<JobInfo>, SchedulerError> {
        let jobs = self.with_polled_jobs(|jobs| {
            let mut list: Vec<JobInfo> = jobs
                .iter()
                .map(|(job_id, job)| job.to_job_info(job_id))
                .collect();
            list.sort_by(|a, b| a.job_id.cmp(&b.job_id));
            list
        });
        Ok(filter.apply(jobs))
    }

    async fn list_completed_jobs(
        &self,
        _query: &HistoryQuery,
    ) -> Result<Vec<JobInfo>, SchedulerError> {
        Err(SchedulerError::AccountingNotAvailable { scheduler: "local" })
    }

    fn has_accounting(&self) -> bool {
        false
    }

    async fn get_job_details(&self, job_id: &str) -> Result<JobInfo, SchedulerError> {
        self.with_polled_jobs(|jobs| {
            jobs.get(job_id)
                .map(|job| job.to_job_info(job_id))
                .ok_or_else(|| SchedulerError::JobNotFound(job_id.to_string()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sleep_spec(name: &str, secs: &str) -> JobSpec {
        let mut spec = JobSpec::new(name, "sleep");
        spec.args = vec![secs.to_string()];
        spec.workdir = Some(Utf8PathBuf::from(
            std::env::temp_dir().to_str().expect("utf8 temp dir"),
        ));
        spec
    }

    #[tokio::test]
    async fn interactive_submit_reports_exit_code() {
        let scheduler = LocalScheduler::new();
        let result = scheduler
            .submit(&sleep_spec("quick", "0"), true)
            .await
            .unwrap();
        assert_eq!(result.status, JobStatus::Completed);
        assert_eq!(result.exit_code, Some(0));
        assert_eq!(
            scheduler.get_exit_code(&result.job_id).await,
            Some(0)
        );
    }

    #[tokio::test]
    async fn cancel_is_idempotent() {
        let scheduler = LocalScheduler::new();
        let result = scheduler
            .submit(&sleep_spec("long", "30"), false)
            .await
            .unwrap();
        assert!(scheduler.cancel(&result.job_id).await);
        // A second cancel reports false even before the killed child
        // has been reaped
        assert!(!scheduler.cancel(&result.job_id).await);
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert!(!scheduler.cancel(&result.job_id).await);
        assert!(!scheduler.cancel("no-such-job").await);
    }

    #[tokio::test]
    async fn unknown_job_resolves_to_unknown_status() {
        let scheduler = LocalScheduler::new();
        assert_eq!(scheduler.get_status("42").await, JobStatus::Unknown);
    }

    #[tokio::test]
    async fn completed_listing_is_a_capability_error() {
        let scheduler = LocalScheduler::new();
        assert!(!scheduler.has_accounting());
        let err = scheduler
            .list_completed_jobs(&HistoryQuery::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SchedulerError::AccountingNotAvailable { scheduler: "local" }
        ));
    }

    #[tokio::test]
    async fn active_listing_includes_running_jobs() {
        let scheduler = LocalScheduler::new();
        let result = scheduler
            .submit(&sleep_spec("listed", "30"), false)
            .await
            .unwrap();
        let jobs = scheduler
            .list_active_jobs(&JobFilter::default())
            .await
            .unwrap();
        assert!(jobs.iter().any(|job| job.job_id == result.job_id));
        scheduler.cancel(&result.job_id).await;
    }

    #[tokio::test]
    async fn array_submission_spawns_one_task_per_index() {
        let mut spec = sleep_spec("array", "0");
        spec.name = "array".to_string();
        let array = ArrayJobSpec::new(spec, 1, 3);

        let scheduler = LocalScheduler::new();
        let result = scheduler.submit_array(&array).await.unwrap();
        let ids = result.task_ids();
        assert_eq!(ids.len(), 3);
        for id in &ids {
            // Known to the registry, whatever state it reached by now
            assert!(scheduler.get_job_details(id).await.is_ok());
        }
    }
}
