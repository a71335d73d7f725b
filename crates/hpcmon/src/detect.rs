//! Scheduler auto-detection.
//!
//! Probes are ordered by specificity: SGE and PBS both install `qsub`,
//! so SGE is confirmed by `SGE_ROOT` or the `qstat -help` banner, and
//! PBS by `PBS_CONF_FILE`. Slurm sits between them because its binary
//! names are unambiguous. When nothing matches, jobs run locally.

use clap::ValueEnum;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// How long to wait for the `qstat -help` banner before assuming this
/// is not an SGE cluster.
const SGE_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SchedulerKind {
    Sge,
    Slurm,
    Pbs,
    Local,
}

impl SchedulerKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "sge" => Some(Self::Sge),
            "slurm" => Some(Self::Slurm),
            "pbs" | "torque" => Some(Self::Pbs),
            "local" => Some(Self::Local),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sge => "sge",
            Self::Slurm => "slurm",
            Self::Pbs => "pbs",
            Self::Local => "local",
        }
    }
}

impl fmt::Display for SchedulerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SchedulerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| format!("unknown scheduler: {s}"))
    }
}

fn on_path(binary: &str) -> bool {
    which::which(binary).is_ok()
}

/// Check whether `qstat -help` identifies a Grid Engine install.
/// Any failure (missing binary, nonzero exit, hang past the timeout)
/// means "not SGE", never an error.
async fn qstat_reports_grid_engine() -> bool {
    let probe = tokio::process::Command::new("qstat").arg("-help").output();
    match tokio::time::timeout(SGE_PROBE_TIMEOUT, probe).await {
        Ok(Ok(output)) => {
            let text = format!(
                "{}{}",
                String::from_utf8_lossy(&output.stdout),
                String::from_utf8_lossy(&output.stderr)
            );
            text.contains("SGE") || text.contains("Grid Engine")
        }
        _ => false,
    }
}

/// Detect the scheduler for this host, honoring the `HPCMON_SCHEDULER`
/// environment override.
pub async fn detect() -> SchedulerKind {
    let override_name = std::env::var("HPCMON_SCHEDULER").ok();
    detect_with_override(override_name.as_deref()).await
}

async fn detect_with_override(override_name: Option<&str>) -> SchedulerKind {
    if let Some(name) = override_name {
        match SchedulerKind::from_name(name) {
            Some(kind) => {
                tracing::info!("scheduler forced to {kind} by HPCMON_SCHEDULER");
                return kind;
            }
            None => {
                tracing::warn!("unrecognized HPCMON_SCHEDULER value {name:?}, probing instead");
            }
        }
    }

    if on_path("qsub")
        && (std::env::var_os("SGE_ROOT").is_some() || qstat_reports_grid_engine().await)
    {
        return SchedulerKind::Sge;
    }
    if on_path("sbatch") && on_path("squeue") {
        return SchedulerKind::Slurm;
    }
    if on_path("qsub") && std::env::var_os("PBS_CONF_FILE").is_some() {
        return SchedulerKind::Pbs;
    }
    SchedulerKind::Local
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for kind in [
            SchedulerKind::Sge,
            SchedulerKind::Slurm,
            SchedulerKind::Pbs,
            SchedulerKind::Local,
        ] {
            assert_eq!(kind.as_str().parse::<SchedulerKind>(), Ok(kind));
        }
    }

    #[test]
    fn torque_is_an_alias_for_pbs() {
        assert_eq!(SchedulerKind::from_name("torque"), Some(SchedulerKind::Pbs));
        assert_eq!(SchedulerKind::from_name("TORQUE"), Some(SchedulerKind::Pbs));
    }

    #[test]
    fn unknown_names_are_rejected() {
        assert_eq!(SchedulerKind::from_name("lsf"), None);
        assert!("windows".parse::<SchedulerKind>().is_err());
    }

    #[tokio::test]
    async fn recognized_override_short_circuits_probing() {
        assert_eq!(
            detect_with_override(Some("slurm")).await,
            SchedulerKind::Slurm
        );
        assert_eq!(detect_with_override(Some("PBS")).await, SchedulerKind::Pbs);
    }
}
