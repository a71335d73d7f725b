//! PBS scheduler adapter.

use crate::parser::{parse_qstat_json, parse_qsub_output};
use camino::Utf8PathBuf;
use hpcmon_core::{
    ArrayJobResult, ArrayJobSpec, HistoryQuery, JobFilter, JobInfo, JobResult, JobSpec, JobStatus,
    OutputStream, Scheduler, SchedulerError,
};
use hpcmon_parsers::{format_hms_duration, run_command};
use std::fmt::Write;
use tokio::process::Command;

/// Adapter for PBS Professional (and Torque-compatible) clusters.
pub struct PbsScheduler;

impl PbsScheduler {
    pub fn new() -> Self {
        Self
    }

    async fn fetch(&self, finished: bool) -> Result<Vec<JobInfo>, SchedulerError> {
        let mut cmd = Command::new("qstat");
        cmd.args(["-f", "-F", "json"]);
        if finished {
            // -x includes finished jobs kept in PBS job history
            cmd.arg("-x");
        }
        let stdout = run_command(&mut cmd, "qstat")
            .await
            .map_err(|e| SchedulerError::Command(e.to_string()))?;
        Ok(parse_qstat_json(&stdout))
    }

    async fn lookup(&self, job_id: &str) -> Option<JobInfo> {
        for finished in [false, true] {
            if let Ok(jobs) = self.fetch(finished).await
                && let Some(job) = jobs.into_iter().find(|j| j.job_id == job_id)
            {
                return Some(job);
            }
        }
        None
    }
}

impl Default for PbsScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for PbsScheduler {
    fn name(&self) -> &'static str {
        "pbs"
    }

    async fn submit(&self, spec: &JobSpec, interactive: bool) -> Result<JobResult, SchedulerError> {
        let mut args = self.build_submit_command(spec);
        if interactive {
            args.splice(1..1, ["-W".to_string(), "block=true".to_string()]);
        }

        let mut cmd = Command::new(&args[0]);
        cmd.args(&args[1..]);

        if interactive {
            // block=true makes qsub wait and exit with the job's exit code.
            let output = cmd
                .output()
                .await
                .map_err(|e| SchedulerError::Submission(e.to_string()))?;
            let stdout = String::from_utf8_lossy(&output.stdout);
            let job_id = parse_qsub_output(&stdout)
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

        let stdout = run_command(&mut cmd, "qsub")
            .await
            .map_err(|e| SchedulerError::Submission(e.to_string()))?;
        let job_id = parse_qsub_output(&stdout)
            .ok_or_else(|| SchedulerError::Submission(format!("no job id in: {stdout}")))?;
        Ok(JobResult {
            job_id,
            status: JobStatus::Pending,
            exit_code: None,
        })
    }

    async fn submit_array(&self, spec: &ArrayJobSpec) -> Result<ArrayJobResult, SchedulerError> {
        let mut args = self.build_submit_command(&spec.job);
        args.splice(1..1, ["-J".to_string(), spec.range_expr()]);

        let mut cmd = Command::new(&args[0]);
        cmd.args(&args[1..]);
        let stdout = run_command(&mut cmd, "qsub")
            .await
            .map_err(|e| SchedulerError::Submission(e.to_string()))?;
        let base_id = parse_qsub_output(&stdout)
            .ok_or_else(|| SchedulerError::Submission(format!("no job id in: {stdout}")))?;

        Ok(ArrayJobResult {
            base_id,
            start: spec.start,
            end: spec.end,
            step: spec.step,
        })
    }

    async fn cancel(&self, job_id: &str) -> bool {
        let mut cmd = Command::new("qdel");
        cmd.arg(job_id);
        run_command(&mut cmd, "qdel").await.is_ok()
    }

    async fn get_status(&self, job_id: &str) -> JobStatus {
        match self.lookup(job_id).await {
            Some(job) => job.status,
            None => JobStatus::Unknown,
        }
    }

    async fn get_exit_code(&self, job_id: &str) -> Option<i32> {
        let job = self.lookup(job_id).await?;
        if job.is_complete() { job.exit_code } else { None }
    }

    async fn get_output_path(&self, job_id: &str, stream: OutputStream) -> Option<Utf8PathBuf> {
        let job = self.lookup(job_id).await?;
        match stream {
            OutputStream::Stdout => job.stdout_path,
            OutputStream::Stderr => job.stderr_path,
        }
    }

    fn generate_script(&self, spec: &JobSpec) -> String {
        let mut script = String::from("#!/bin/bash\n");
        writeln!(script, "#PBS -N {}", spec.name).unwrap();
        if let Some(ref queue) = spec.queue {
            writeln!(script, "#PBS -q {queue}").unwrap();
        }
        let mut select = String::from("select=1");
        if let Some(cpus) = spec.cpus {
            write!(select, ":ncpus={cpus}").unwrap();
        }
        if let Some(ref memory) = spec.memory {
            write!(select, ":mem={memory}").unwrap();
        }
        writeln!(script, "#PBS -l {select}").unwrap();
        if let Some(walltime) = spec.walltime {
            writeln!(script, "#PBS -l walltime={}", format_hms_duration(walltime)).unwrap();
        }
        if let Some(ref stdout) = spec.stdout_path {
            writeln!(script, "#PBS -o {stdout}").unwrap();
        }
        if let Some(ref stderr) = spec.stderr_path {
            writeln!(script, "#PBS -e {stderr}").unwrap();
        }
        script.push('\n');
        script.push_str(&spec.command_line());
        script.push('\n');
        script
    }

    fn build_submit_command(&self, spec: &JobSpec) -> Vec<String> {
        let mut args = vec!["qsub".to_string(), "-N".to_string(), spec.name.clone()];
        if let Some(ref queue) = spec.queue {
            args.extend(["-q".to_string(), queue.clone()]);
        }
        let mut select = String::from("select=1");
        if let Some(cpus) = spec.cpus {
            write!(select, ":ncpus={cpus}").unwrap();
        }
        if let Some(ref memory) = spec.memory {
            write!(select, ":mem={memory}").unwrap();
        }
        args.extend(["-l".to_string(), select]);
        if let Some(walltime) = spec.walltime {
            args.extend([
                "-l".to_string(),
                format!("walltime={}", format_hms_duration(walltime)),
            ]);
        }
        if let Some(ref stdout) = spec.stdout_path {
            args.extend(["-o".to_string(), stdout.to_string()]);
        }
        if let Some(ref stderr) = spec.stderr_path {
            args.extend(["-e".to_string(), stderr.to_string()]);
        }
        // Direct-command form: everything after -- runs as the job.
        args.push("--".to_string());
        args.push(spec.command.clone());
        args.extend(spec.args.iter().cloned());
        args
    }

    async fn list_active_jobs(&self, filter: &JobFilter) -> Result<Vec<JobInfo>, SchedulerError> {
        let jobs = self.fetch(false).await?;
        Ok(filter.apply(jobs))
    }

    async fn list_completed_jobs(
        &self,
        query: &HistoryQuery,
    ) -> Result<Vec<JobInfo>, SchedulerError> {
        let jobs = self.fetch(true).await?;
        let jobs: Vec<JobInfo> = jobs.into_iter().filter(JobInfo::is_complete).collect();
        Ok(query.apply(jobs))
    }

    fn has_accounting(&self) -> bool {
        // PBS job history (qstat -x) serves as accounting.
        true
    }

    async fn get_job_details(&self, job_id: &str) -> Result<JobInfo, SchedulerError> {
        self.lookup(job_id)
            .await
            .ok_or_else(|| SchedulerError::JobNotFound(job_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn spec() -> JobSpec {
        let mut spec = JobSpec::new("align", "bwa");
        spec.args = vec!["mem".to_string()];
        spec.queue = Some("workq".to_string());
        spec.cpus = Some(8);
        spec.memory = Some("32gb".to_string());
        spec.walltime = Some(Duration::from_secs(7200));
        spec
    }

    #[test]
    fn submit_command_bundles_select_statement() {
        let scheduler = PbsScheduler::new();
        let args = scheduler.build_submit_command(&spec());
        assert_eq!(args[0], "qsub");
        let joined = args.join(" ");
        assert!(joined.contains("-N align"));
        assert!(joined.contains("-q workq"));
        assert!(joined.contains("-l select=1:ncpus=8:mem=32gb"));
        assert!(joined.contains("-l walltime=02:00:00"));
        assert!(joined.ends_with("-- bwa mem"));
    }

    #[test]
    fn script_uses_pbs_directives() {
        let scheduler = PbsScheduler::new();
        let script = scheduler.generate_script(&spec());
        assert!(script.contains("#PBS -N align\n"));
        assert!(script.contains("#PBS -l select=1:ncpus=8:mem=32gb\n"));
        assert!(script.contains("#PBS -l walltime=02:00:00\n"));
    }
}
