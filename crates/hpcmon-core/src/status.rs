//! The normalized job status lattice.

use serde::{Deserialize, Serialize};

/// Normalized job status, shared by every scheduler backend.
///
/// Each backend owns its raw-state mapping into this enum; raw codes
/// without a mapping become `Unknown` rather than an error so that a
/// polling loop never dies on an unexpected scheduler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobStatus {
    /// Queued, held, or otherwise waiting to start
    Pending,
    /// Currently executing
    Running,
    /// Finished with exit code 0
    Completed,
    /// Finished with a nonzero exit code or scheduler-reported error
    Failed,
    /// Removed by user or administrator
    Cancelled,
    /// Killed for exceeding its time limit
    Timeout,
    /// State not recognized or backend unreachable
    Unknown,
}

impl JobStatus {
    /// True for jobs that have not reached a terminal state.
    ///
    /// `Unknown` counts as active: a job we cannot classify is still
    /// worth watching.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Pending | Self::Running | Self::Unknown)
    }

    /// True for jobs in a terminal state. Exact complement of
    /// [`is_active`](Self::is_active).
    pub fn is_complete(self) -> bool {
        !self.is_active()
    }

    /// The active partition, used as the default status filter.
    pub fn active_statuses() -> [JobStatus; 3] {
        [Self::Pending, Self::Running, Self::Unknown]
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Pending => "○",
            Self::Running => "●",
            Self::Completed => "✓",
            Self::Failed => "✗",
            Self::Cancelled => "⊘",
            Self::Timeout => "⏱",
            Self::Unknown => "?",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
            Self::Timeout => "TIMEOUT",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [JobStatus; 7] = [
        JobStatus::Pending,
        JobStatus::Running,
        JobStatus::Completed,
        JobStatus::Failed,
        JobStatus::Cancelled,
        JobStatus::Timeout,
        JobStatus::Unknown,
    ];

    #[test]
    fn partitions_are_disjoint_and_total() {
        for status in ALL {
            assert_ne!(
                status.is_active(),
                status.is_complete(),
                "{status} must be in exactly one partition"
            );
        }
    }

    #[test]
    fn active_partition_members() {
        assert!(JobStatus::Pending.is_active());
        assert!(JobStatus::Running.is_active());
        assert!(JobStatus::Unknown.is_active());
        assert!(JobStatus::Completed.is_complete());
        assert!(JobStatus::Failed.is_complete());
        assert!(JobStatus::Cancelled.is_complete());
        assert!(JobStatus::Timeout.is_complete());
    }
}
