//! The identity performing a branch-scoped action.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use warden_types::{TeamId, UserId};

/// Who is pushing, merging or reviewing.
///
/// Team membership is resolved by the caller before evaluation so the
/// evaluator never touches storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// Acting user. For deploy keys, the key's owner.
    pub user_id: UserId,
    /// Teams the user belongs to.
    #[serde(default)]
    pub teams: BTreeSet<TeamId>,
    /// True when the push authenticates with a deploy key.
    #[serde(default)]
    pub deploy_key: bool,
}

impl Actor {
    /// A user acting on their own behalf.
    pub fn user(user_id: UserId) -> Self {
        Self {
            user_id,
            teams: BTreeSet::new(),
            deploy_key: false,
        }
    }

    /// A push authenticated by a deploy key owned by `user_id`.
    pub fn via_deploy_key(user_id: UserId) -> Self {
        Self {
            deploy_key: true,
            ..Self::user(user_id)
        }
    }

    /// Sets the team memberships.
    pub fn with_teams(mut self, teams: impl IntoIterator<Item = TeamId>) -> Self {
        self.teams = teams.into_iter().collect();
        self
    }

    /// Returns true if the actor is the ghost user.
    pub fn is_ghost(&self) -> bool {
        self.user_id.is_ghost()
    }
}
