/// Job status definitions and the legal transition table
///
/// Every status change of a crawl job goes through a conditional update in
/// the job store; this module decides which of those updates are legal.
use std::fmt;

/// Represents the current status of a crawl job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobStatus {
    // ===== Active States =====
    /// Job has been created and is waiting for a worker
    Queued,

    /// A worker claimed the job and is crawling the page
    Running,

    // ===== Terminal States =====
    /// Page was crawled and its result persisted
    Completed,

    /// Crawl or persistence failed; the job carries an error message
    Failed,

    /// Job was stopped by the user while queued or running
    Stopped,
}

impl JobStatus {
    /// Returns true if no further transition is possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Stopped)
    }

    /// Returns true if the job may still change state
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Queued | Self::Running)
    }

    /// Statuses reachable from this one in a single step
    pub fn allowed_targets(&self) -> &'static [JobStatus] {
        match self {
            Self::Queued => &[Self::Running, Self::Failed, Self::Stopped],
            Self::Running => &[Self::Completed, Self::Failed, Self::Stopped],
            Self::Completed | Self::Failed | Self::Stopped => &[],
        }
    }

    /// Returns true if a job in this status may move to `next`
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        self.allowed_targets().contains(&next)
    }

    /// Converts the status to a database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
        }
    }

    /// Parses a status from a database string representation
    ///
    /// Returns None if the string doesn't match any known status.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(Self::Queued),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "stopped" => Some(Self::Stopped),
            _ => None,
        }
    }

    /// Returns all possible job statuses
    pub fn all_states() -> Vec<Self> {
        vec![
            Self::Queued,
            Self::Running,
            Self::Completed,
            Self::Failed,
            Self::Stopped,
        ]
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
