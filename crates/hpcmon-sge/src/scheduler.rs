//! SGE scheduler adapter.

use crate::parser::{
    parse_qacct_blocks, parse_qacct_record, parse_qstat_plain, parse_qstat_xml, parse_qsub_output,
};
use crate::types::SgeJob;
use camino::Utf8PathBuf;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use hpcmon_core::{
    ArrayJobResult, ArrayJobSpec, HistoryQuery, JobFilter, JobInfo, JobResult, JobSpec, JobStatus,
    OutputStream, Scheduler, SchedulerError,
};
use hpcmon_parsers::{format_hms_duration, run_command, run_command_allow_failure, DEFAULT_TIMEOUT};
use std::collections::HashMap;
use std::fmt::Write;
use tokio::process::Command;

/// Adapter for Sun/Univa Grid Engine clusters.
pub struct SgeScheduler {
    /// Whether qacct is on PATH; probed once at construction so
    /// `has_accounting` stays pure.
    accounting: bool,
}

impl SgeScheduler {
    pub fn new() -> Self {
        Self {
            accounting: which::which("qacct").is_ok(),
        }
    }

    async fn fetch_active(&self) -> Result<Vec<SgeJob>, SchedulerError> {
        let mut cmd = Command::new("qstat");
        cmd.args(["-u", "*", "-xml"]);
        let output = run_command(&mut cmd, "qstat")
            .await
            .map_err(|e| SchedulerError::Command(e.to_string()))?;

        let jobs = parse_qstat_xml(&output);
        if jobs.is_empty() && !output.trim().is_empty() && !output.trim_start().starts_with('<') {
            // This qstat does not speak XML; fall back to the plain listing.
            return Ok(parse_qstat_plain(&output));
        }
        Ok(jobs)
    }

    async fn fetch_qacct(&self, job_id: &str) -> Option<HashMap<String, String>> {
        let mut cmd = Command::new("qacct");
        cmd.args(["-j", job_id]);
        // qacct exits non-zero when the job is unknown; that is a lookup
        // miss, not a failure.
        let output = run_command_allow_failure(&mut cmd, "qacct", DEFAULT_TIMEOUT)
            .await
            .ok()?;
        let record = parse_qacct_record(&output);
        if record.contains_key("jobnumber") {
            Some(record)
        } else {
            None
        }
    }
}

impl Default for SgeScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for SgeScheduler {
    fn name(&self) -> &'static str {
        "sge"
    }

    async fn submit(&self, spec: &JobSpec, interactive: bool) -> Result<JobResult, SchedulerError> {
        let mut args = self.build_submit_command(spec);
        if interactive {
            // -sync y blocks until the job finishes and propagates its
            // exit code through qsub.
            args.splice(1..1, ["-sync".to_string(), "y".to_string()]);
        }

        let mut cmd = Command::new(&args[0]);
        cmd.args(&args[1..]);

        if interactive {
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
        args.splice(1..1, ["-t".to_string(), spec.range_expr()]);

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
        match self.fetch_active().await {
            Ok(jobs) => {
                if let Some(job) = jobs.into_iter().find(|j| j.job_id == job_id) {
                    return job.into_job_info().status;
                }
            }
            Err(e) => {
                // Keep going: a finished job is absent from qstat anyway.
                tracing::warn!("qstat failed while resolving status of {job_id}: {e}");
            }
        }

        if self.accounting
            && let Some(record) = self.fetch_qacct(job_id).await
        {
            return qacct_to_job_info(&record).status;
        }

        JobStatus::Unknown
    }

    async fn get_exit_code(&self, job_id: &str) -> Option<i32> {
        if !self.accounting {
            return None;
        }
        let record = self.fetch_qacct(job_id).await?;
        record.get("exit_status")?.parse().ok()
    }

    async fn get_output_path(&self, job_id: &str, stream: OutputStream) -> Option<Utf8PathBuf> {
        // SGE's default layout: <name>.o<id> / <name>.e<id> in the
        // submission directory.
        let details = self.get_job_details(job_id).await.ok()?;
        let marker = match stream {
            OutputStream::Stdout => 'o',
            OutputStream::Stderr => 'e',
        };
        if details.name.is_empty() {
            return None;
        }
        Some(Utf8PathBuf::from(format!(
            "{}.{}{}",
            details.name, marker, job_id
        )))
    }

    fn generate_script(&self, spec: &JobSpec) -> String {
        let mut script = String::from("#!/bin/bash\n");
        writeln!(script, "#$ -N {}", spec.name).unwrap();
        writeln!(script, "#$ -cwd").unwrap();
        if let Some(ref queue) = spec.queue {
            writeln!(script, "#$ -q {queue}").unwrap();
        }
        if let Some(cpus) = spec.cpus {
            writeln!(script, "#$ -pe smp {cpus}").unwrap();
        }
        if let Some(ref memory) = spec.memory {
            writeln!(script, "#$ -l h_vmem={memory}").unwrap();
        }
        if let Some(walltime) = spec.walltime {
            writeln!(script, "#$ -l h_rt={}", format_hms_duration(walltime)).unwrap();
        }
        if let Some(ref stdout) = spec.stdout_path {
            writeln!(script, "#$ -o {stdout}").unwrap();
        }
        if let Some(ref stderr) = spec.stderr_path {
            writeln!(script, "#$ -e {stderr}").unwrap();
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
        if let Some(cpus) = spec.cpus {
            args.extend(["-pe".to_string(), "smp".to_string(), cpus.to_string()]);
        }
        if let Some(ref memory) = spec.memory {
            args.extend(["-l".to_string(), format!("h_vmem={memory}")]);
        }
        if let Some(walltime) = spec.walltime {
            args.extend([
                "-l".to_string(),
                format!("h_rt={}", format_hms_duration(walltime)),
            ]);
        }
        if let Some(ref workdir) = spec.workdir {
            args.extend(["-wd".to_string(), workdir.to_string()]);
        } else {
            args.push("-cwd".to_string());
        }
        if let Some(ref stdout) = spec.stdout_path {
            args.extend(["-o".to_string(), stdout.to_string()]);
        }
        if let Some(ref stderr) = spec.stderr_path {
            args.extend(["-e".to_string(), stderr.to_string()]);
        }
        // Binary submission: run the command line directly, no script file.
        args.extend(["-b".to_string(), "y".to_string()]);
        args.push(spec.command.clone());
        args.extend(spec.args.iter().cloned());
        args
    }

    async fn list_active_jobs(&self, filter: &JobFilter) -> Result<Vec<JobInfo>, SchedulerError> {
        let jobs = self.fetch_active().await?;
        let jobs: Vec<JobInfo> = jobs.into_iter().map(SgeJob::into_job_info).collect();
        Ok(filter.apply(jobs))
    }

    async fn list_completed_jobs(
        &self,
        query: &HistoryQuery,
    ) -> Result<Vec<JobInfo>, SchedulerError> {
        if !self.accounting {
            return Err(SchedulerError::AccountingNotAvailable { scheduler: "sge" });
        }

        let mut cmd = Command::new("qacct");
        cmd.args(["-j", "*"]);
        if let Some(ref user) = query.user {
            cmd.args(["-o", user]);
        }
        let output = run_command_allow_failure(&mut cmd, "qacct", DEFAULT_TIMEOUT)
            .await
            .map_err(|e| SchedulerError::Command(e.to_string()))?;

        let jobs: Vec<JobInfo> = parse_qacct_blocks(&output)
            .iter()
            .filter(|record| record.contains_key("jobnumber"))
            .map(qacct_to_job_info)
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
            return Ok(job.into_job_info());
        }

        if self.accounting
            && let Some(record) = self.fetch_qacct(job_id).await
        {
            return Ok(qacct_to_job_info(&record));
        }

        Err(SchedulerError::JobNotFound(job_id.to_string()))
    }
}

/// qacct timestamps look like `Mon Jan 15 10:00:00 2024`.
fn parse_qacct_time(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    NaiveDateTime::parse_from_str(s, "%a %b %d %H:%M:%S %Y")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%a %b %e %H:%M:%S %Y"))
        .ok()
        .and_then(|dt| Utc.from_local_datetime(&dt).single())
}

/// Normalize one qacct accounting record.
fn qacct_to_job_info(record: &HashMap<String, String>) -> JobInfo {
    let get = |key: &str| record.get(key).map(String::as_str);

    let exit_status: Option<i32> = get("exit_status").and_then(|v| v.parse().ok());
    let failed = get("failed").is_some_and(|v| !v.starts_with('0'));
    let status = if failed || exit_status.is_some_and(|code| code != 0) {
        JobStatus::Failed
    } else {
        JobStatus::Completed
    };

    let mut info = JobInfo::new(
        get("jobnumber").unwrap_or_default(),
        get("jobname").unwrap_or_default(),
        get("owner").unwrap_or_default(),
        status,
    );
    info.queue = get("qname").map(str::to_string);
    info.node = get("hostname").map(str::to_string);
    info.submit_time = get("qsub_time").and_then(parse_qacct_time);
    info.start_time = get("start_time").and_then(parse_qacct_time);
    info.end_time = get("end_time").and_then(parse_qacct_time);
    info.runtime = get("ru_wallclock")
        .and_then(|v| v.split('.').next())
        .and_then(|v| v.parse().ok())
        .map(std::time::Duration::from_secs);
    info.cpu = get("slots").and_then(|v| v.parse().ok());
    info.exit_code = exit_status;
    info.array_task_id = get("taskid")
        .filter(|v| *v != "undefined")
        .map(str::to_string);
    info
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn spec() -> JobSpec {
        let mut spec = JobSpec::new("align", "bwa");
        spec.args = vec!["mem".to_string(), "ref.fa".to_string()];
        spec.queue = Some("all.q".to_string());
        spec.cpus = Some(4);
        spec.memory = Some("16G".to_string());
        spec.walltime = Some(Duration::from_secs(3600));
        spec
    }

    #[test]
    fn submit_command_carries_native_flags() {
        let scheduler = SgeScheduler::new();
        let args = scheduler.build_submit_command(&spec());
        assert_eq!(args[0], "qsub");
        let joined = args.join(" ");
        assert!(joined.contains("-N align"));
        assert!(joined.contains("-q all.q"));
        assert!(joined.contains("-pe smp 4"));
        assert!(joined.contains("-l h_vmem=16G"));
        assert!(joined.contains("-l h_rt=01:00:00"));
        assert!(joined.contains("-b y"));
        assert!(joined.ends_with("bwa mem ref.fa"));
    }

    #[test]
    fn script_uses_sge_directives() {
        let scheduler = SgeScheduler::new();
        let script = scheduler.generate_script(&spec());
        assert!(script.starts_with("#!/bin/bash\n"));
        assert!(script.contains("#$ -N align\n"));
        assert!(script.contains("#$ -l h_rt=01:00:00\n"));
        assert!(script.trim_end().ends_with("bwa mem ref.fa"));
    }

    #[test]
    fn qacct_record_normalizes_to_job_info() {
        let output = "\
==============================================================
qname        all.q
hostname     node1
owner        alice
jobname      align
jobnumber    12345
taskid       undefined
qsub_time    Mon Jan 15 09:58:00 2024
start_time   Mon Jan 15 10:00:00 2024
end_time     Mon Jan 15 11:00:00 2024
ru_wallclock 3600
slots        4
failed       0
exit_status  1";
        let record = parse_qacct_record(output);
        let info = qacct_to_job_info(&record);
        assert_eq!(info.job_id, "12345");
        assert_eq!(info.status, JobStatus::Failed);
        assert_eq!(info.exit_code, Some(1));
        assert_eq!(info.queue.as_deref(), Some("all.q"));
        assert_eq!(info.node.as_deref(), Some("node1"));
        assert_eq!(info.runtime, Some(Duration::from_secs(3600)));
        assert_eq!(info.array_task_id, None);
        assert!(info.end_time.unwrap() > info.start_time.unwrap());
    }
}
