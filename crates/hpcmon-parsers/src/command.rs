//! Command execution for scheduler queries.
//!
//! Every call carries a bounded timeout: a hung scheduler CLI must not
//! hang the polling loop. Timeouts surface as their own error variant so
//! callers on the hot path can treat them like any other transient
//! failure.

use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

/// Upper bound on any single scheduler CLI call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Error type for command execution.
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Failed to execute {command}: {error}")]
    Execution { command: String, error: String },
    #[error("Command {command} failed: {stderr}")]
    Failed { command: String, stderr: String },
    #[error("Command {command} timed out after {timeout:?}")]
    TimedOut { command: String, timeout: Duration },
}

async fn capture(
    cmd: &mut Command,
    name: &str,
    timeout: Duration,
) -> Result<std::process::Output, CommandError> {
    // kill_on_drop so a timed-out child does not linger past the poll
    cmd.kill_on_drop(true);
    match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(e)) => Err(CommandError::Execution {
            command: name.to_string(),
            error: e.to_string(),
        }),
        Err(_) => Err(CommandError::TimedOut {
            command: name.to_string(),
            timeout,
        }),
    }
}

/// Execute a command and return stdout as a string.
///
/// Non-zero exit becomes `CommandError::Failed` with the captured stderr.
pub async fn run_command(cmd: &mut Command, name: &str) -> Result<String, CommandError> {
    run_command_with_timeout(cmd, name, DEFAULT_TIMEOUT).await
}

/// Like [`run_command`] with an explicit timeout.
pub async fn run_command_with_timeout(
    cmd: &mut Command,
    name: &str,
    timeout: Duration,
) -> Result<String, CommandError> {
    let output = capture(cmd, name, timeout).await?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(CommandError::Failed {
            command: name.to_string(),
            stderr: stderr.to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Execute a command and return combined stdout+stderr, treating non-zero
/// exit as OK.
///
/// Some scheduler CLIs (qacct with no matching jobs, qstat -help) exit
/// non-zero or print to stderr while still producing usable output.
pub async fn run_command_allow_failure(
    cmd: &mut Command,
    name: &str,
    timeout: Duration,
) -> Result<String, CommandError> {
    let output = capture(cmd, name, timeout).await?;

    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_command_success() {
        let mut cmd = Command::new("echo");
        cmd.arg("hello");
        let result = run_command(&mut cmd, "echo").await.unwrap();
        assert_eq!(result.trim(), "hello");
    }

    #[tokio::test]
    async fn test_run_command_not_found() {
        let mut cmd = Command::new("nonexistent_command_12345");
        let result = run_command(&mut cmd, "nonexistent").await;
        assert!(matches!(result, Err(CommandError::Execution { .. })));
    }

    #[tokio::test]
    async fn test_run_command_times_out() {
        let mut cmd = Command::new("sleep");
        cmd.arg("5");
        let result =
            run_command_with_timeout(&mut cmd, "sleep", Duration::from_millis(50)).await;
        assert!(matches!(result, Err(CommandError::TimedOut { .. })));
    }

    #[tokio::test]
    async fn test_allow_failure_captures_stderr() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo out; echo err >&2; exit 1"]);
        let text = run_command_allow_failure(&mut cmd, "sh", DEFAULT_TIMEOUT)
            .await
            .unwrap();
        assert!(text.contains("out"));
        assert!(text.contains("err"));
    }
}
