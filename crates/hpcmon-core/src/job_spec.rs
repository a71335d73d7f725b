//! Job submission types.

use crate::status::JobStatus;
use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Which output stream of a job to resolve a path for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// A single job to submit.
///
/// `name` and `command` are required; everything else is a request the
/// backend translates into its native flags where it can.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    pub name: String,
    pub command: String,
    pub args: Vec<String>,

    pub queue: Option<String>,
    pub cpus: Option<u32>,
    /// Memory request as the scheduler expects it, e.g. "16G"
    pub memory: Option<String>,
    pub walltime: Option<Duration>,

    pub workdir: Option<Utf8PathBuf>,
    pub stdout_path: Option<Utf8PathBuf>,
    pub stderr_path: Option<Utf8PathBuf>,
}

impl JobSpec {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            args: Vec::new(),
            queue: None,
            cpus: None,
            memory: None,
            walltime: None,
            workdir: None,
            stdout_path: None,
            stderr_path: None,
        }
    }

    /// The command plus its arguments as one shell line.
    pub fn command_line(&self) -> String {
        if self.args.is_empty() {
            self.command.clone()
        } else {
            format!("{} {}", self.command, self.args.join(" "))
        }
    }
}

/// An array job: one submission expanding into indexed tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayJobSpec {
    pub job: JobSpec,
    pub start: u32,
    pub end: u32,
    pub step: u32,
}

impl ArrayJobSpec {
    pub fn new(job: JobSpec, start: u32, end: u32) -> Self {
        Self {
            job,
            start,
            end,
            step: 1,
        }
    }

    /// Native range expression shared by qsub/sbatch, e.g. "1-10:2".
    pub fn range_expr(&self) -> String {
        format!("{}-{}:{}", self.start, self.end, self.step)
    }
}

/// Outcome of a successful submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    pub job_id: String,
    pub status: JobStatus,
    /// Set only when the submission was interactive (blocking)
    pub exit_code: Option<i32>,
}

/// Outcome of a successful array submission.
///
/// Individual task ids are not reported by the scheduler at submit time;
/// they are derived as `"{base_id}.{index}"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayJobResult {
    pub base_id: String,
    pub start: u32,
    pub end: u32,
    pub step: u32,
}

impl ArrayJobResult {
    pub fn task_ids(&self) -> Vec<String> {
        (self.start..=self.end)
            .step_by(self.step.max(1) as usize)
            .map(|index| format!("{}.{}", self.base_id, index))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_line_joins_args() {
        let mut spec = JobSpec::new("align", "bwa");
        assert_eq!(spec.command_line(), "bwa");
        spec.args = vec!["mem".to_string(), "ref.fa".to_string()];
        assert_eq!(spec.command_line(), "bwa mem ref.fa");
    }

    #[test]
    fn array_task_ids_follow_range() {
        let result = ArrayJobResult {
            base_id: "9000".to_string(),
            start: 1,
            end: 7,
            step: 3,
        };
        assert_eq!(result.task_ids(), vec!["9000.1", "9000.4", "9000.7"]);
    }

    #[test]
    fn range_expr_formats_like_qsub() {
        let array = ArrayJobSpec::new(JobSpec::new("x", "true"), 1, 10);
        assert_eq!(array.range_expr(), "1-10:1");
    }
}
