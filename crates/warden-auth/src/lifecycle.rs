//! Protected branch rule lifecycle: protect, unprotect and related settings.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;
use validator::Validate;
use warden_types::{unix_now, AccessMode, Repository, TeamId, User, UserId};

use crate::{
    backend::{AccessReader, BranchRuleStore, GitOracle},
    config::AuthConfig,
    error::{AuthError, Result},
    protected_branch::{FilePatterns, ProtectedBranchRule, Whitelist},
    team::Team,
};

/// Who may push to a protected branch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PushMode {
    /// Nobody may push.
    #[default]
    Disabled,
    /// Everyone with write access to the code may push.
    All,
    /// Only the push whitelist may push.
    Whitelist,
}

/// Settings submitted to protect a branch.
///
/// Whitelist members are given by user and team name; they are resolved
/// against the repository when the rule is written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ProtectBranchRequest {
    pub push_mode: PushMode,
    pub push_whitelist_users: Vec<String>,
    pub push_whitelist_teams: Vec<String>,
    pub whitelist_deploy_keys: bool,
    pub enable_merge_whitelist: bool,
    pub merge_whitelist_users: Vec<String>,
    pub merge_whitelist_teams: Vec<String>,
    pub enable_status_check: bool,
    pub status_check_contexts: Vec<String>,
    #[validate(range(min = 0, message = "required approvals must not be negative"))]
    pub required_approvals: i64,
    pub enable_approvals_whitelist: bool,
    pub approvals_whitelist_users: Vec<String>,
    pub approvals_whitelist_teams: Vec<String>,
    pub block_on_rejected_reviews: bool,
    pub block_on_official_review_requests: bool,
    pub dismiss_stale_approvals: bool,
    pub require_signed_commits: bool,
    pub block_on_outdated_branch: bool,
    /// `;`-separated globs.
    pub protected_file_patterns: String,
    /// `;`-separated globs.
    pub unprotected_file_patterns: String,
}

/// Users and teams that can be offered as whitelist members.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WhitelistCandidates {
    /// Users with read access to the repository.
    pub users: Vec<User>,
    /// Teams with read access to the repository.
    pub teams: Vec<Team>,
}

/// Rule lifecycle operations over a store and a git oracle.
pub struct ProtectedBranchService<'a, S: ?Sized, G: ?Sized> {
    store: &'a S,
    git: &'a G,
    config: &'a AuthConfig,
}

impl<'a, S, G> ProtectedBranchService<'a, S, G>
where
    S: AccessReader + BranchRuleStore + ?Sized,
    G: GitOracle + ?Sized,
{
    /// Create a service.
    pub fn new(store: &'a S, git: &'a G, config: &'a AuthConfig) -> Self {
        Self { store, git, config }
    }

    /// Creates or replaces the rule protecting `branch`.
    ///
    /// The branch must exist. Unknown user and team names, the ghost user
    /// and teams without read access are dropped from the whitelists.
    /// Whitelists of disabled modes and the contexts of disabled status
    /// checks are cleared. The rule is written in one store operation.
    pub fn protect(
        &self,
        repo: &Repository,
        branch: &str,
        request: &ProtectBranchRequest,
    ) -> Result<ProtectedBranchRule> {
        request.validate()?;
        let required_approvals = u32::try_from(request.required_approvals).map_err(|_| {
            AuthError::InvalidArgument(format!(
                "required approvals out of range: {}",
                request.required_approvals
            ))
        })?;

        if !self.git.branch_exists(repo.id, branch)? {
            return Err(AuthError::NotFound(format!("branch '{}'", branch)));
        }

        let mut rule = ProtectedBranchRule::new(repo.id, branch);
        rule.protected_file_patterns = FilePatterns::parse(&request.protected_file_patterns)?;
        rule.unprotected_file_patterns = FilePatterns::parse(&request.unprotected_file_patterns)?;

        match request.push_mode {
            PushMode::Disabled => {}
            PushMode::All => rule.can_push = true,
            PushMode::Whitelist => {
                rule.can_push = true;
                rule.push_whitelist = self.whitelist(
                    repo,
                    &request.push_whitelist_users,
                    &request.push_whitelist_teams,
                )?;
                rule.whitelist_deploy_keys = request.whitelist_deploy_keys;
            }
        }

        if request.enable_merge_whitelist {
            rule.merge_whitelist = self.whitelist(
                repo,
                &request.merge_whitelist_users,
                &request.merge_whitelist_teams,
            )?;
        }

        if request.enable_status_check {
            rule.enable_status_check = true;
            rule.status_check_contexts = dedup_contexts(&request.status_check_contexts);
        }

        rule.required_approvals = required_approvals;
        if request.enable_approvals_whitelist {
            rule.approvals_whitelist = self.whitelist(
                repo,
                &request.approvals_whitelist_users,
                &request.approvals_whitelist_teams,
            )?;
        }

        rule.block_on_rejected_reviews = request.block_on_rejected_reviews;
        rule.block_on_official_review_requests = request.block_on_official_review_requests;
        rule.dismiss_stale_approvals = request.dismiss_stale_approvals;
        rule.require_signed_commits = request.require_signed_commits;
        rule.block_on_outdated_branch = request.block_on_outdated_branch;

        let rule = self.store.upsert_protected_branch(rule)?;
        tracing::info!(
            repo = %repo.id,
            branch = %branch,
            rule_id = rule.id,
            push_mode = ?request.push_mode,
            required_approvals = rule.required_approvals,
            "Protected branch"
        );

        Ok(rule)
    }

    /// Removes the rule protecting `branch`. Returns false if there was none.
    pub fn unprotect(&self, repo: &Repository, branch: &str) -> Result<bool> {
        match self.store.protected_branch(repo.id, branch)? {
            Some(rule) => {
                self.delete(repo, rule.id)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Deletes rule `rule_id` of `repo`.
    pub fn delete(&self, repo: &Repository, rule_id: u64) -> Result<()> {
        self.store.delete_protected_branch(repo.id, rule_id)?;
        tracing::info!(repo = %repo.id, rule_id, "Deleted protected branch rule");
        Ok(())
    }

    /// Rule protecting `branch`, if any.
    pub fn rule(&self, repo: &Repository, branch: &str) -> Result<Option<ProtectedBranchRule>> {
        self.store.protected_branch(repo.id, branch)
    }

    /// Every rule of `repo`, ordered by branch name.
    pub fn list(&self, repo: &Repository) -> Result<Vec<ProtectedBranchRule>> {
        self.store.protected_branches(repo.id)
    }

    /// Branches among `branches` that no rule protects, in input order.
    pub fn unprotected_branches(
        &self,
        repo: &Repository,
        branches: &[String],
    ) -> Result<Vec<String>> {
        let protected: BTreeSet<String> = self
            .list(repo)?
            .into_iter()
            .map(|rule| rule.branch_name)
            .collect();
        Ok(branches
            .iter()
            .filter(|branch| !protected.contains(*branch))
            .cloned()
            .collect())
    }

    /// Distinct status contexts reported within the trailing `window`.
    pub fn find_recent_status_contexts(
        &self,
        repo: &Repository,
        window: Duration,
    ) -> Result<Vec<String>> {
        let since = unix_now().saturating_sub(window.as_secs());
        self.store.recent_status_contexts(repo.id, since)
    }

    /// Recent contexts within the configured window.
    pub fn recent_status_contexts(&self, repo: &Repository) -> Result<Vec<String>> {
        self.find_recent_status_contexts(repo, self.config.status_context_window())
    }

    /// Recent contexts followed by the contexts `branch` already requires.
    pub fn suggested_status_contexts(
        &self,
        repo: &Repository,
        branch: &str,
    ) -> Result<Vec<String>> {
        let mut contexts = self.recent_status_contexts(repo)?;
        if let Some(rule) = self.rule(repo, branch)? {
            for context in rule.status_check_contexts {
                if !contexts.contains(&context) {
                    contexts.push(context);
                }
            }
        }
        Ok(contexts)
    }

    /// Users and teams that may be put on a whitelist of `repo`.
    pub fn whitelist_candidates(&self, repo: &Repository) -> Result<WhitelistCandidates> {
        let mut users = Vec::new();
        for id in self.store.repo_readers(repo.id)? {
            if let Some(user) = self.store.user(id)? {
                if !user.is_ghost() {
                    users.push(user);
                }
            }
        }

        let teams = match repo.owner.organization() {
            Some(org) => self.store.teams_with_access(org, repo.id, AccessMode::Read)?,
            None => Vec::new(),
        };

        Ok(WhitelistCandidates { users, teams })
    }

    /// Points the default branch of `repo` at `branch`.
    ///
    /// Returns false when `branch` already is the default.
    pub fn set_default_branch(&self, repo: &mut Repository, branch: &str) -> Result<bool> {
        if !self.git.branch_exists(repo.id, branch)? {
            return Err(AuthError::NotFound(format!("branch '{}'", branch)));
        }
        if repo.default_branch == branch {
            return Ok(false);
        }

        self.git.set_default_branch(repo.id, branch)?;
        self.store.update_default_branch(repo.id, branch)?;
        tracing::info!(
            repo = %repo.id,
            from = %repo.default_branch,
            to = %branch,
            "Changed default branch"
        );
        repo.default_branch = branch.to_string();

        Ok(true)
    }

    fn whitelist(
        &self,
        repo: &Repository,
        users: &[String],
        teams: &[String],
    ) -> Result<Whitelist> {
        Ok(Whitelist::enabled(
            self.resolve_users(users)?,
            self.resolve_teams(repo, teams)?,
        ))
    }

    fn resolve_users(&self, names: &[String]) -> Result<BTreeSet<UserId>> {
        let mut ids = BTreeSet::new();
        for name in names.iter().map(|n| n.trim()).filter(|n| !n.is_empty()) {
            match self.store.user_by_name(name)? {
                Some(user) if !user.is_ghost() => {
                    ids.insert(user.id);
                }
                _ => tracing::warn!(user = %name, "Dropping unknown user from whitelist"),
            }
        }
        Ok(ids)
    }

    fn resolve_teams(&self, repo: &Repository, names: &[String]) -> Result<BTreeSet<TeamId>> {
        let mut ids = BTreeSet::new();
        let names: Vec<&str> = names.iter().map(|n| n.trim()).filter(|n| !n.is_empty()).collect();
        if names.is_empty() {
            return Ok(ids);
        }

        let Some(org) = repo.owner.organization() else {
            tracing::warn!(
                repo = %repo.id,
                "Dropping teams from whitelist of a user-owned repository"
            );
            return Ok(ids);
        };

        let readable: BTreeSet<TeamId> = self
            .store
            .teams_with_access(org, repo.id, AccessMode::Read)?
            .into_iter()
            .map(|team| team.id)
            .collect();

        for name in names {
            match self.store.team_by_name(org, name)? {
                Some(team) if readable.contains(&team.id) => {
                    ids.insert(team.id);
                }
                Some(_) => tracing::warn!(
                    team = %name,
                    "Dropping team without read access from whitelist"
                ),
                None => tracing::warn!(team = %name, "Dropping unknown team from whitelist"),
            }
        }
        Ok(ids)
    }
}

/// Trimmed, non-empty contexts in first-seen order.
fn dedup_contexts(contexts: &[String]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    contexts
        .iter()
        .map(|context| context.trim())
        .filter(|context| !context.is_empty() && seen.insert(*context))
        .map(str::to_string)
        .collect()
}
