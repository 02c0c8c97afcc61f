//! Storage and git contracts consumed by the authorization core.
//!
//! Every call may block on I/O and may fail with [`AuthError::NotFound`]
//! or [`AuthError::Storage`]. The resolver and the lifecycle operations
//! propagate those failures untouched.
//!
//! [`AuthError::NotFound`]: crate::AuthError::NotFound
//! [`AuthError::Storage`]: crate::AuthError::Storage

use warden_types::{AccessMode, OrgId, RepoId, RepoUnit, User, UserId};

use crate::{
    collaborator::Collaboration, error::Result, protected_branch::ProtectedBranchRule,
    team::Team,
};

/// Read access to identities, collaborations, teams and units.
pub trait AccessReader {
    /// Looks up a user by ID.
    fn user(&self, id: UserId) -> Result<Option<User>>;

    /// Looks up a user by login name.
    fn user_by_name(&self, name: &str) -> Result<Option<User>>;

    /// Direct collaboration of `user` on `repo`, if any.
    fn collaboration(&self, repo: RepoId, user: UserId) -> Result<Option<Collaboration>>;

    /// Returns true if `user` holds the owner role in `org`.
    fn is_organization_owner(&self, org: OrgId, user: UserId) -> Result<bool>;

    /// Teams of `org` that have access to `repo` with at least `min_mode` on some unit.
    fn teams_with_access(&self, org: OrgId, repo: RepoId, min_mode: AccessMode)
        -> Result<Vec<Team>>;

    /// Looks up a team of `org` by name.
    fn team_by_name(&self, org: OrgId, name: &str) -> Result<Option<Team>>;

    /// Units enabled on `repo`.
    fn repo_units(&self, repo: RepoId) -> Result<Vec<RepoUnit>>;

    /// Coarse access level recorded for `user` on `repo`.
    ///
    /// Reads the access level table, not the resolver: site admin and
    /// public visibility are not reflected, and unit maps collapse to
    /// their highest mode.
    fn access_level(&self, repo: RepoId, user: UserId) -> Result<AccessMode>;

    /// Users holding at least read access on `repo` in the access level table.
    fn repo_readers(&self, repo: RepoId) -> Result<Vec<UserId>>;
}

/// Persistence of protected branch rules and branch metadata.
pub trait BranchRuleStore {
    /// Rule protecting `branch` of `repo`, if any.
    fn protected_branch(&self, repo: RepoId, branch: &str) -> Result<Option<ProtectedBranchRule>>;

    /// Every rule of `repo`, ordered by branch name.
    fn protected_branches(&self, repo: RepoId) -> Result<Vec<ProtectedBranchRule>>;

    /// Inserts or replaces the rule for `(rule.repo_id, rule.branch_name)` in one write.
    ///
    /// The stored rule keeps the ID of the rule it replaces; a new rule
    /// receives a fresh ID.
    fn upsert_protected_branch(&self, rule: ProtectedBranchRule) -> Result<ProtectedBranchRule>;

    /// Deletes rule `id` of `repo`.
    fn delete_protected_branch(&self, repo: RepoId, id: u64) -> Result<()>;

    /// Distinct status contexts reported on `repo` at or after `since` (Unix timestamp).
    fn recent_status_contexts(&self, repo: RepoId, since: u64) -> Result<Vec<String>>;

    /// Persists a new default branch for `repo`.
    fn update_default_branch(&self, repo: RepoId, branch: &str) -> Result<()>;
}

/// Git plumbing used as a pass/fail oracle.
pub trait GitOracle {
    /// Returns true if `branch` exists in `repo`.
    fn branch_exists(&self, repo: RepoId, branch: &str) -> Result<bool>;

    /// Points the repository HEAD at `branch`.
    fn set_default_branch(&self, repo: RepoId, branch: &str) -> Result<()>;
}
