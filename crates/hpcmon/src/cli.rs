//! CLI argument parsing for hpcmon.

use crate::detect::SchedulerKind;
use clap::Parser;
use hpcmon_core::JobFilter;

#[derive(Parser, Debug)]
#[command(name = "hpcmon")]
#[command(about = "Monitor batch jobs on SGE, Slurm and PBS clusters")]
pub struct Args {
    /// Scheduler backend; skips auto-detection
    #[arg(long, value_enum)]
    pub scheduler: Option<SchedulerKind>,

    /// Poll interval in seconds
    #[arg(long, default_value = "10")]
    pub interval: u64,

    /// Whose jobs to show: "me", "all", or a username
    #[arg(long, default_value = "me")]
    pub user: String,

    /// Restrict to one queue/partition
    #[arg(long)]
    pub queue: Option<String>,

    /// List completed jobs from accounting and exit
    #[arg(long)]
    pub completed: bool,

    /// Show completed jobs from last N hours
    #[arg(long, default_value = "24")]
    pub since_hours: u64,

    /// Print JSON instead of a table
    #[arg(long)]
    pub json: bool,

    /// Refresh once and exit
    #[arg(long)]
    pub once: bool,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    /// Resolve `--user` to a concrete username filter.
    pub fn user_filter(&self) -> Option<String> {
        match self.user.as_str() {
            "all" => None,
            "me" => std::env::var("USER").ok(),
            other => Some(other.to_string()),
        }
    }

    pub fn job_filter(&self) -> JobFilter {
        JobFilter {
            user: self.user_filter(),
            statuses: None,
            queue: self.queue.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_poll_my_active_jobs() {
        let args = Args::try_parse_from(["hpcmon"]).unwrap();
        assert_eq!(args.interval, 10);
        assert_eq!(args.user, "me");
        assert!(!args.completed);
        assert!(!args.once);
        assert!(args.scheduler.is_none());
    }

    #[test]
    fn explicit_backend_and_history_flags_parse() {
        let args = Args::try_parse_from([
            "hpcmon",
            "--scheduler",
            "sge",
            "--completed",
            "--since-hours",
            "48",
            "--user",
            "all",
            "--json",
        ])
        .unwrap();
        assert_eq!(args.scheduler, Some(SchedulerKind::Sge));
        assert!(args.completed);
        assert_eq!(args.since_hours, 48);
        assert!(args.json);
        assert_eq!(args.user_filter(), None);
    }

    #[test]
    fn explicit_username_becomes_the_filter() {
        let args = Args::try_parse_from(["hpcmon", "--user", "alice"]).unwrap();
        assert_eq!(args.user_filter(), Some("alice".to_string()));
        assert_eq!(args.job_filter().user, Some("alice".to_string()));
    }
}
