/// Job status definitions for the crawl lifecycle
///
/// This module defines the states a crawl job moves through and the
/// transitions allowed between them.
use serde::{Deserialize, Serialize};
use std::fmt;

/// Represents the current lifecycle state of a crawl job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    // ===== Active States =====
    /// Job has been created but its task has not started crawling
    Pending,

    /// Job is processing its frontier
    Running,

    /// Job is suspended between two URLs and keeps its frontier
    Paused,

    // ===== Terminal States =====
    /// Job was stopped by a command
    Stopped,

    /// Frontier was exhausted while running
    Completed,

    /// An unrecoverable error escaped the crawl loop
    Failed,
}

impl JobStatus {
    /// Returns true if no further transition is possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped | Self::Completed | Self::Failed)
    }

    /// Returns true if the lifecycle allows moving from `self` to `next`
    ///
    /// ```text
    /// pending -> running <-> paused
    /// pending | running | paused -> stopped
    /// running -> completed | failed
    /// paused -> failed
    /// ```
    ///
    /// `paused -> failed` covers a job-fatal error surfacing from the URL
    /// that was in flight when the pause was requested.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Running, Self::Paused)
                | (Self::Paused, Self::Running)
                | (Self::Pending, Self::Stopped)
                | (Self::Running, Self::Stopped)
                | (Self::Paused, Self::Stopped)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Failed)
                | (Self::Paused, Self::Failed)
        )
    }

    /// Converts the status to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Stopped => "stopped",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Parses a status from its database string representation
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "paused" => Some(Self::Paused),
            "stopped" => Some(Self::Stopped),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_STATES: [JobStatus; 6] = [
        JobStatus::Pending,
        JobStatus::Running,
        JobStatus::Paused,
        JobStatus::Stopped,
        JobStatus::Completed,
        JobStatus::Failed,
    ];

    #[test]
    fn test_is_terminal() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(!JobStatus::Paused.is_terminal());

        assert!(JobStatus::Stopped.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }

    #[test]
    fn test_allowed_transitions() {
        use JobStatus::*;

        assert!(Pending.can_transition_to(Running));
        assert!(Running.can_transition_to(Paused));
        assert!(Paused.can_transition_to(Running));
        assert!(Running.can_transition_to(Completed));
        assert!(Running.can_transition_to(Failed));
        assert!(Paused.can_transition_to(Failed));
        for from in [Pending, Running, Paused] {
            assert!(from.can_transition_to(Stopped), "{} -> stopped", from);
        }
    }

    #[test]
    fn test_rejected_transitions() {
        use JobStatus::*;

        assert!(!Pending.can_transition_to(Paused));
        assert!(!Paused.can_transition_to(Paused));
        assert!(!Paused.can_transition_to(Completed));
        assert!(!Pending.can_transition_to(Completed));

        // Nothing leaves a terminal state
        for from in [Stopped, Completed, Failed] {
            for to in ALL_STATES {
                assert!(!from.can_transition_to(to), "{} -> {}", from, to);
            }
        }
    }

    #[test]
    fn test_roundtrip_db_string() {
        for state in ALL_STATES {
            let parsed = JobStatus::from_db_string(state.to_db_string());
            assert_eq!(Some(state), parsed, "Failed roundtrip for {:?}", state);
        }
        assert_eq!(JobStatus::from_db_string("invalid"), None);
    }

    #[test]
    fn test_serde_matches_db_string() {
        let json = serde_json::to_string(&JobStatus::Paused).unwrap();
        assert_eq!(json, "\"paused\"");
    }
}
