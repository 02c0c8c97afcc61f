//! Repository collaboration records.

use serde::{Deserialize, Serialize};
use warden_types::{unix_now, AccessMode, RepoId, UserId};

/// Direct access grant of a user on a repository.
///
/// Collaborations are independent of organization membership. There is
/// at most one record per (repository, user) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collaboration {
    /// Repository the grant applies to.
    pub repo_id: RepoId,
    /// Collaborating user.
    pub user_id: UserId,
    /// Access mode granted.
    pub mode: AccessMode,
    /// When the collaborator was added (Unix timestamp).
    pub created_at: u64,
    /// When the mode was last updated (Unix timestamp).
    pub updated_at: u64,
}

impl Collaboration {
    /// Default mode of a new collaboration.
    pub const DEFAULT_MODE: AccessMode = AccessMode::Write;

    /// Create a new collaboration.
    pub fn new(repo_id: RepoId, user_id: UserId, mode: AccessMode) -> Self {
        let now = unix_now();
        Self {
            repo_id,
            user_id,
            mode,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check if this collaboration grants at least the required mode.
    pub fn has_mode(&self, required: AccessMode) -> bool {
        self.mode.has(required)
    }

    /// Update the access mode.
    pub fn set_mode(&mut self, mode: AccessMode) {
        self.mode = mode;
        self.updated_at = unix_now();
    }
}
