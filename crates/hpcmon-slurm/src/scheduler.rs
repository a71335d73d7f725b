//! Slurm scheduler adapter.

use crate::parser::{
    parse_sacct_line, parse_sbatch_output, parse_squeue_line, state_to_status, SACCT_FORMAT,
    SQUEUE_FORMAT,
};
use camino::Utf8PathBuf;
use chrono::{DateTime, Utc};
use hpcmon_core::{
    ArrayJobResult, ArrayJobSpec, HistoryQuery, JobFilter, JobInfo, JobResult, JobSpec, JobStatus,
    OutputStream, Scheduler, SchedulerError,
};
use hpcmon_parsers::{format_hms_duration, run_command};
use std::fmt::Write;
use tokio::process::Command;

/// Adapter for Slurm clusters.
pub struct SlurmScheduler {
    /// Whether sacct is usable; probed once so `has_accounting` stays pure.
    accounting: bool,
}

impl SlurmScheduler {
    pub fn new() -> Self {
        Self {
            accounting: which::which("sacct").is_ok(),
        }
    }

    async fn fetch_active(&self) -> Result<Vec<JobInfo>, SchedulerError> {
        let mut cmd = Command::new("squeue");
        cmd.args(["--noheader", "-o", SQUEUE_FORMAT]);
        let stdout = run_command(&mut cmd, "squeue")
            .await
            .map_err(|e| SchedulerError::Command(e.to_string()))?;

        Ok(stdout
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| {
                let parsed = parse_squeue_line(line);
                if parsed.is_none() {
                    tracing::warn!("skipping unparsable squeue line: {line}");
                }
                parsed
            })
            .collect())
    }

    async fn fetch_sacct_job(&self, job_id: &str) -> Option<JobInfo> {
        let mut cmd = Command::new("sacct");
        cmd.args([
            "-j",
            job_id,
            "-X",
            "--parsable2",
            "--noheader",
            "--format",
            SACCT_FORMAT,
        ]);
        let stdout = run_command(&mut cmd, "sacct").await.ok()?;
        stdout
            .lines()
            .find(|line| !line.trim().is_empty())
            .and_then(parse_sacct_line)
    }
}

impl Default for SlurmScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for SlurmScheduler {
    fn name(&self) -> &'static str {
        "slurm"
    }

    async fn submit(&self, spec: &JobSpec, interactive: bool) -> Result<JobResult, SchedulerError> {
        let mut args = self.build_submit_command(spec);
        if interactive {
            args.splice(1..1, ["--wait".to_string()]);
        }

        let mut cmd = Command::new(&args[0]);
        cmd.args(&args[1..]);

        if interactive {
            // --wait makes sbatch exit with the job's own exit code.
            let output = cmd
                .output()
                .await
                .map_err(|e| SchedulerError::Submission(e.to_string()))?;
            let stdout = String::from_utf8_lossy(&output.stdout);
            let job_id = parse_sbatch_output(&stdout)
                .ok_or_else(|| SchedulerError::Submission(format!("no job id in: {stdout}")))?;
            let exit_code = output.status.code();
            let status = if exit_code == Some(0) {
                JobStatus::Completed
            } else {
                JobStatus::Failed
            };
            return Ok(JobResult {
                job_id,
                status,
                exit_code,
            });
        }

        let stdout = run_command(&mut cmd, "sbatch")
            .await
            .map_err(|e| SchedulerError::Submission(e.to_string()))?;
        let job_id = parse_sbatch_output(&stdout)
            .ok_or_else(|| SchedulerError::Submission(format!("no job id in: {stdout}")))?;
        Ok(JobResult {
            job_id,
            status: JobStatus::Pending,
            exit_code: None,
        })
    }

    async fn submit_array(&self, spec: &ArrayJobSpec) -> Result<ArrayJobResult, SchedulerError> {
        let mut args = self.build_submit_command(&spec.job);
        args.splice(1..1, ["-a".to_string(), spec.range_expr()]);

        let mut cmd = Command::new(&args[0]);
        cmd.args(&args[1..]);
        let stdout = run_command(&mut cmd, "sbatch")
            .await
            .map_err(|e| SchedulerError::Submission(e.to_string()))?;
        let base_id = parse_sbatch_output(&stdout)
            .ok_or_else(|| SchedulerError::Submission(format!("no job id in: {stdout}")))?;

        Ok(ArrayJobResult {
            base_id,
            start: spec.start,
            end: spec.end,
            step: spec.step,
        })
    }

    async fn cancel(&self, job_id: &str) -> bool {
        let mut cmd = Command::new("scancel");
        cmd.arg(job_id);
        run_command(&mut cmd, "scancel").await.is_ok()
    }

    async fn get_status(&self, job_id: &str) -> JobStatus {
        // Live listing first; squeue -j on a finished job errors out.
        let mut cmd = Command::new("squeue");
        cmd.args(["-j", job_id, "--noheader", "-o", "%T"]);
        if let Ok(stdout) = run_command(&mut cmd, "squeue").await
            && let Some(state) = stdout.lines().next().map(str::trim)
            && !state.is_empty()
        {
            return state_to_status(state);
        }

        if self.accounting
            && let Some(info) = self.fetch_sacct_job(job_id).await
        {
            return info.status;
        }

        JobStatus::Unknown
    }

    async fn get_exit_code(&self, job_id: &str) -> Option<i32> {
        if !self.accounting {
            return None;
        }
        let info = self.fetch_sacct_job(job_id).await?;
        if info.is_complete() { info.exit_code } else { None }
    }

    async fn get_output_path(&self, job_id: &str, _stream: OutputStream) -> Option<Utf8PathBuf> {
        // Slurm's default merges stderr into stdout in slurm-<id>.out.
        self.get_job_details(job_id).await.ok()?;
        Some(Utf8PathBuf::from(format!("slurm-{job_id}.out")))
    }

    fn generate_script(&self, spec: &JobSpec) -> String {
        let mut script = String::from("#!/bin/bash\n");
        writeln!(script, "#SBATCH -J {}", spec.name).unwrap();
        if let Some(ref queue) = spec.queue {
            writeln!(script, "#SBATCH -p {queue}").unwrap();
        }
        if let Some(cpus) = spec.cpus {
            writeln!(script, "#SBATCH -c {cpus}").unwrap();
        }
        if let Some(ref memory) = spec.memory {
            writeln!(script, "#SBATCH --mem={memory}").unwrap();
        }
        if let Some(walltime) = spec.walltime {
            writeln!(script, "#SBATCH -t {}", format_hms_duration(walltime)).unwrap();
        }
        if let Some(ref stdout) = spec.stdout_path {
            writeln!(script, "#SBATCH -o {stdout}").unwrap();
        }
        if let Some(ref stderr) = spec.stderr_path {
            writeln!(script, "#SBATCH -e {stderr}").unwrap();
        }
        script.push('\n');
        script.push_str(&spec.command_line());
        script.push('\n');
        script
    }

    fn build_submit_command(&self, spec: &JobSpec) -> Vec<String> {
        let mut args = vec![
            "sbatch".to_string(),
            "--parsable".to_string(),
            "-J".to_string(),
            spec.name.clone(),
        ];
        if let Some(ref queue) = spec.queue {
            args.extend(["-p".to_string(), queue.clone()]);
        }
        if let Some(cpus) = spec.cpus {
            args.extend(["-c".to_string(), cpus.to_string()]);
        }
        if let Some(ref memory) = spec.memory {
            args.push(format!("--mem={memory}"));
        }
        if let Some(walltime) = spec.walltime {
            args.extend(["-t".to_string(), format_hms_duration(walltime)]);
        }
        if let Some(ref workdir) = spec.workdir {
            args.extend(["-D".to_string(), workdir.to_string()]);
        }
        if let Some(ref stdout) = spec.stdout_path {
            args.extend(["-o".to_string(), stdout.to_string()]);
        }
        if let Some(ref stderr) = spec.stderr_path {
            args.extend(["-e".to_string(), stderr.to_string()]);
        }
        args.push("--wrap".to_string());
        args.push(spec.command_line());
        args
    }

    async fn list_active_jobs(&self, filter: &JobFilter) -> Result<Vec<JobInfo>, SchedulerError> {
        let jobs = self.fetch_active().await?;
        Ok(filter.apply(jobs))
    }

    async fn list_completed_jobs(
        &self,
        query: &HistoryQuery,
    ) -> Result<Vec<JobInfo>, SchedulerError> {
        if !self.accounting {
            return Err(SchedulerError::AccountingNotAvailable { scheduler: "slurm" });
        }

        let mut cmd = Command::new("sacct");
        cmd.args(["-X", "--parsable2", "--noheader", "--format", SACCT_FORMAT]);
        cmd.args(["--starttime", &sacct_starttime(query.since)]);
        if let Some(ref user) = query.user {
            cmd.args(["-u", user]);
        } else {
            cmd.arg("--allusers");
        }

        let stdout = run_command(&mut cmd, "sacct")
            .await
            .map_err(|e| SchedulerError::Command(e.to_string()))?;

        let jobs: Vec<JobInfo> = stdout
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| {
                let parsed = parse_sacct_line(line);
                if parsed.is_none() {
                    tracing::warn!("skipping unparsable sacct line: {line}");
                }
                parsed
            })
            .filter(|job| job.is_complete())
            .collect();
        Ok(query.apply(jobs))
    }

    fn has_accounting(&self) -> bool {
        self.accounting
    }

    async fn get_job_details(&self, job_id: &str) -> Result<JobInfo, SchedulerError> {
        if let Ok(jobs) = self.fetch_active().await
            && let Some(job) = jobs.into_iter().find(|j| j.job_id == job_id)
        {
            return Ok(job);
        }

        if self.accounting
            && let Some(info) = self.fetch_sacct_job(job_id).await
        {
            return Ok(info);
        }

        Err(SchedulerError::JobNotFound(job_id.to_string()))
    }
}

/// Server-side pre-filter for the accounting query. Without a
/// --starttime sacct only reports jobs since local midnight, so an
/// unbounded query gets the epoch; the inclusive bounds are still
/// applied client-side on end_time like every other filter.
fn sacct_starttime(since: Option<DateTime<Utc>>) -> String {
    match since {
        Some(since) => since.format("%Y-%m-%dT%H:%M:%S").to_string(),
        None => "1970-01-01T00:00:00".to_string(),
    }
}
