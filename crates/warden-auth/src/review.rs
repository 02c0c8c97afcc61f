//! Review and commit status inputs to merge evaluation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use warden_types::unix_now;

use crate::actor::Actor;

/// State of a review entry on a pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewState {
    /// Review approves the changes.
    Approved,
    /// Review requests changes before merging.
    ChangesRequested,
    /// Review is just a comment without approval/rejection.
    Commented,
    /// A review was requested from the reviewer and is not done yet.
    Requested,
    /// Review was dismissed.
    Dismissed,
}

impl fmt::Display for ReviewState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReviewState::Approved => write!(f, "approved"),
            ReviewState::ChangesRequested => write!(f, "changes_requested"),
            ReviewState::Commented => write!(f, "commented"),
            ReviewState::Requested => write!(f, "requested"),
            ReviewState::Dismissed => write!(f, "dismissed"),
        }
    }
}

impl FromStr for ReviewState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "approved" | "approve" => Ok(ReviewState::Approved),
            "changes_requested" | "reject" => Ok(ReviewState::ChangesRequested),
            "commented" | "comment" => Ok(ReviewState::Commented),
            "requested" | "request" => Ok(ReviewState::Requested),
            "dismissed" => Ok(ReviewState::Dismissed),
            other => Err(format!("unknown review state '{other}'")),
        }
    }
}

/// A review entry on a pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    /// Reviewer.
    pub reviewer: Actor,
    /// Review state.
    pub state: ReviewState,
    /// Reviewer is a designated official reviewer of the target branch.
    #[serde(default)]
    pub official: bool,
    /// Commit SHA that was reviewed.
    #[serde(default)]
    pub commit_id: String,
}

impl Review {
    /// Creates a review entry.
    pub fn new(reviewer: Actor, state: ReviewState, commit_id: impl Into<String>) -> Self {
        Self {
            reviewer,
            state,
            official: false,
            commit_id: commit_id.into(),
        }
    }

    /// Marks the reviewer as official.
    pub fn official(mut self) -> Self {
        self.official = true;
        self
    }

    /// Returns true if this review approves the PR.
    pub fn is_approved(&self) -> bool {
        self.state == ReviewState::Approved
    }

    /// Returns true if this review requests changes.
    pub fn requests_changes(&self) -> bool {
        self.state == ReviewState::ChangesRequested
    }

    /// Returns true if the entry decides the reviewer's standing.
    ///
    /// Comments never change whether a reviewer approved or rejected.
    pub fn is_decisive(&self) -> bool {
        self.state != ReviewState::Commented
    }

    /// Returns true if the review was made on a commit other than `head`.
    pub fn is_stale(&self, head: &str) -> bool {
        self.commit_id != head
    }
}

/// State reported by an external check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusState {
    /// Check is still running.
    Pending,
    /// Check passed.
    Success,
    /// Check could not run.
    Error,
    /// Check failed.
    Failure,
    /// Check passed with warnings.
    Warning,
}

impl StatusState {
    /// Only success satisfies a required check.
    pub fn is_success(&self) -> bool {
        *self == StatusState::Success
    }
}

impl fmt::Display for StatusState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusState::Pending => write!(f, "pending"),
            StatusState::Success => write!(f, "success"),
            StatusState::Error => write!(f, "error"),
            StatusState::Failure => write!(f, "failure"),
            StatusState::Warning => write!(f, "warning"),
        }
    }
}

/// A status reported for a commit by an external check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitStatus {
    /// Check name, e.g. `ci/build`.
    pub context: String,
    /// Reported state.
    pub state: StatusState,
    /// When the status was reported (Unix timestamp).
    #[serde(default = "unix_now")]
    pub created_at: u64,
}

impl CommitStatus {
    /// A status reported now.
    pub fn new(context: impl Into<String>, state: StatusState) -> Self {
        Self {
            context: context.into(),
            state,
            created_at: unix_now(),
        }
    }
}
