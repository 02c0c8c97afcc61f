//! In-memory authorization store.

use crate::{
    backend::{AccessReader, BranchRuleStore},
    collaborator::Collaboration,
    error::{AuthError, Result},
    organization::{OrgMember, OrgRole, Organization},
    protected_branch::ProtectedBranchRule,
    review::CommitStatus,
    team::Team,
};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use warden_types::{
    unix_now, AccessMode, OrgId, RepoId, RepoOwner, RepoUnit, Repository, TeamId, UnitType, User,
    UserId, Visibility,
};

/// Thread-safe in-memory store for authorization data.
///
/// Every mutation of collaborations, teams or organization roles
/// recalculates the access level table of the affected repositories.
#[derive(Debug, Default)]
pub struct AuthStore {
    /// Next available ID for new entities.
    next_id: AtomicU64,

    /// Users by ID.
    users: RwLock<HashMap<UserId, User>>,

    /// User name to ID mapping.
    user_name_index: RwLock<HashMap<String, UserId>>,

    /// Organizations by ID.
    organizations: RwLock<HashMap<OrgId, Organization>>,

    /// Organization name to ID mapping.
    org_name_index: RwLock<HashMap<String, OrgId>>,

    /// Teams by ID.
    teams: RwLock<HashMap<TeamId, Team>>,

    /// Repositories by ID.
    repositories: RwLock<HashMap<RepoId, Repository>>,

    /// Enabled units per repository.
    repo_units: RwLock<HashMap<RepoId, Vec<RepoUnit>>>,

    /// Collaborations by (repo, user) pair.
    collaborations: RwLock<HashMap<(RepoId, UserId), Collaboration>>,

    /// Coarse access levels by (repo, user) pair.
    accesses: RwLock<HashMap<(RepoId, UserId), AccessMode>>,

    /// Protected branch rules by (repo, branch) pair.
    branch_rules: RwLock<HashMap<(RepoId, String), ProtectedBranchRule>>,

    /// Commit statuses by (repo, commit) pair, oldest first.
    commit_statuses: RwLock<HashMap<(RepoId, String), Vec<CommitStatus>>>,
}

impl AuthStore {
    /// Create a new empty auth store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate a new unique ID.
    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn next_key(&self) -> i64 {
        i64::try_from(self.next_id()).unwrap_or(i64::MAX)
    }

    // ==================== Users ====================

    /// Create a new user.
    pub fn create_user(&self, name: impl Into<String>, is_admin: bool) -> Result<User> {
        let name = name.into();
        let mut index = self.user_name_index.write();
        if index.contains_key(&name) {
            return Err(AuthError::AlreadyExists(format!("user '{}'", name)));
        }

        let mut user = User::new(self.next_key(), name.clone());
        user.is_admin = is_admin;
        index.insert(name, user.id);
        self.users.write().insert(user.id, user.clone());

        Ok(user)
    }

    /// Get a user by ID.
    pub fn get_user(&self, id: UserId) -> Option<User> {
        self.users.read().get(&id).cloned()
    }

    /// Get a user by name.
    pub fn get_user_by_name(&self, name: &str) -> Option<User> {
        let id = self.user_name_index.read().get(name).copied()?;
        self.get_user(id)
    }

    // ==================== Organizations ====================

    /// Create a new organization owned by `founder`.
    pub fn create_organization(
        &self,
        name: impl Into<String>,
        founder: UserId,
    ) -> Result<Organization> {
        let name = name.into();
        if self.get_user(founder).is_none() {
            return Err(AuthError::NotFound(format!("user {}", founder)));
        }

        let mut index = self.org_name_index.write();
        if index.contains_key(&name) {
            return Err(AuthError::AlreadyExists(format!("organization '{}'", name)));
        }

        let org = Organization::new(OrgId(self.next_key()), name.clone(), founder);
        index.insert(name, org.id);
        self.organizations.write().insert(org.id, org.clone());

        Ok(org)
    }

    /// Get an organization by ID.
    pub fn get_organization(&self, id: OrgId) -> Option<Organization> {
        self.organizations.read().get(&id).cloned()
    }

    /// Get an organization by name.
    pub fn get_organization_by_name(&self, name: &str) -> Option<Organization> {
        let id = self.org_name_index.read().get(name).copied()?;
        self.get_organization(id)
    }

    /// Add a member to an organization.
    pub fn add_org_member(&self, org_id: OrgId, user: UserId, role: OrgRole) -> Result<()> {
        {
            let mut orgs = self.organizations.write();
            let org = orgs
                .get_mut(&org_id)
                .ok_or_else(|| AuthError::NotFound(format!("organization {}", org_id)))?;

            if !org.add_member(OrgMember::new(user, role)) {
                return Err(AuthError::AlreadyExists(format!("member {} of organization", user)));
            }
        }
        self.recalculate_org_accesses(org_id)
    }

    /// Remove a member from an organization, along with their team memberships.
    pub fn remove_org_member(&self, org_id: OrgId, user: UserId) -> Result<()> {
        {
            let mut orgs = self.organizations.write();
            let org = orgs
                .get_mut(&org_id)
                .ok_or_else(|| AuthError::NotFound(format!("organization {}", org_id)))?;

            if !org.remove_member(user)? {
                return Err(AuthError::NotFound(format!("member {} of organization", user)));
            }
        }
        for team in self.teams.write().values_mut().filter(|t| t.org_id == org_id) {
            team.remove_member(user);
        }
        self.recalculate_org_accesses(org_id)
    }

    /// Update a member's role in an organization.
    pub fn update_org_member_role(&self, org_id: OrgId, user: UserId, role: OrgRole) -> Result<()> {
        {
            let mut orgs = self.organizations.write();
            let org = orgs
                .get_mut(&org_id)
                .ok_or_else(|| AuthError::NotFound(format!("organization {}", org_id)))?;

            if !org.update_member_role(user, role)? {
                return Err(AuthError::NotFound(format!("member {} of organization", user)));
            }
        }
        self.recalculate_org_accesses(org_id)
    }

    // ==================== Teams ====================

    /// Create a new team covering every unit at `access_mode`.
    pub fn create_team(
        &self,
        org_id: OrgId,
        name: impl Into<String>,
        access_mode: AccessMode,
    ) -> Result<Team> {
        let name = name.into();
        let mut orgs = self.organizations.write();
        let org = orgs
            .get_mut(&org_id)
            .ok_or_else(|| AuthError::NotFound(format!("organization {}", org_id)))?;

        let mut teams = self.teams.write();
        if teams.values().any(|t| t.org_id == org_id && t.name == name) {
            return Err(AuthError::AlreadyExists(format!("team '{}' in organization", name)));
        }

        let team = Team::new(TeamId(self.next_key()), org_id, name, access_mode);
        org.teams.insert(team.id);
        teams.insert(team.id, team.clone());

        Ok(team)
    }

    /// Get a team by ID.
    pub fn get_team(&self, id: TeamId) -> Option<Team> {
        self.teams.read().get(&id).cloned()
    }

    /// List teams in an organization, ordered by ID.
    pub fn list_teams(&self, org_id: OrgId) -> Vec<Team> {
        let mut teams: Vec<Team> = self
            .teams
            .read()
            .values()
            .filter(|t| t.org_id == org_id)
            .cloned()
            .collect();
        teams.sort_by_key(|t| t.id);
        teams
    }

    /// Change the access mode and unit map of a team.
    pub fn update_team_access(
        &self,
        team_id: TeamId,
        access_mode: AccessMode,
        units: Option<BTreeMap<UnitType, AccessMode>>,
    ) -> Result<Team> {
        let team = self.modify_team(team_id, |team| {
            team.access_mode = access_mode;
            team.set_units(units);
            true
        })?;
        self.recalculate_repos(team.repos.iter().copied())?;
        Ok(team)
    }

    /// Delete a team.
    pub fn delete_team(&self, id: TeamId) -> Result<()> {
        let team = self
            .teams
            .write()
            .remove(&id)
            .ok_or_else(|| AuthError::NotFound(format!("team {}", id)))?;

        if let Some(org) = self.organizations.write().get_mut(&team.org_id) {
            org.teams.remove(&id);
        }

        self.recalculate_repos(team.repos.iter().copied())
    }

    /// Add a member to a team. The user must belong to the organization.
    pub fn add_team_member(&self, team_id: TeamId, user: UserId) -> Result<()> {
        let org_id = self
            .get_team(team_id)
            .map(|t| t.org_id)
            .ok_or_else(|| AuthError::NotFound(format!("team {}", team_id)))?;
        let is_member = self
            .get_organization(org_id)
            .map(|org| org.is_member(user))
            .unwrap_or(false);
        if !is_member {
            return Err(AuthError::InvalidArgument(format!(
                "user {} is not a member of organization {}",
                user, org_id
            )));
        }

        let team = self.modify_team(team_id, |team| team.add_member(user))?;
        self.recalculate_repos(team.repos.iter().copied())
    }

    /// Remove a member from a team.
    pub fn remove_team_member(&self, team_id: TeamId, user: UserId) -> Result<()> {
        let team = self.modify_team(team_id, |team| team.remove_member(user))?;
        self.recalculate_repos(team.repos.iter().copied())
    }

    /// Give a team access to a repository owned by its organization.
    pub fn add_team_repo(&self, team_id: TeamId, repo_id: RepoId) -> Result<()> {
        let repo = self
            .get_repository(repo_id)
            .ok_or_else(|| AuthError::NotFound(format!("repository {}", repo_id)))?;
        let org_id = self
            .get_team(team_id)
            .map(|t| t.org_id)
            .ok_or_else(|| AuthError::NotFound(format!("team {}", team_id)))?;
        if repo.owner.organization() != Some(org_id) {
            return Err(AuthError::InvalidArgument(format!(
                "repository {} is not owned by organization {}",
                repo_id, org_id
            )));
        }

        self.modify_team(team_id, |team| team.add_repo(repo_id))?;
        self.recalculate_accesses(repo_id)
    }

    /// Revoke a team's access to a repository.
    pub fn remove_team_repo(&self, team_id: TeamId, repo_id: RepoId) -> Result<()> {
        let mut removed = false;
        self.modify_team(team_id, |team| {
            removed = team.remove_repo(repo_id);
            removed
        })?;
        if !removed {
            return Err(AuthError::NotFound(format!("repository {} in team", repo_id)));
        }
        self.recalculate_accesses(repo_id)
    }

    fn modify_team(&self, team_id: TeamId, update: impl FnOnce(&mut Team) -> bool) -> Result<Team> {
        let mut teams = self.teams.write();
        let team = teams
            .get_mut(&team_id)
            .ok_or_else(|| AuthError::NotFound(format!("team {}", team_id)))?;
        if update(team) {
            team.updated_at = unix_now();
        }
        Ok(team.clone())
    }

    // ==================== Repositories ====================

    /// Create a repository with `units` enabled.
    pub fn create_repository(
        &self,
        owner: RepoOwner,
        name: impl Into<String>,
        visibility: Visibility,
        units: &[UnitType],
    ) -> Result<Repository> {
        let name = name.into();
        let owner_exists = match owner {
            RepoOwner::User(user) => self.get_user(user).is_some(),
            RepoOwner::Organization(org) => self.get_organization(org).is_some(),
        };
        if !owner_exists {
            return Err(AuthError::NotFound(format!("owner of repository '{}'", name)));
        }

        let repo = {
            let mut repos = self.repositories.write();
            if repos.values().any(|r| r.owner == owner && r.name == name) {
                return Err(AuthError::AlreadyExists(format!("repository '{}'", name)));
            }

            let repo = Repository::new(self.next_key(), name, owner).with_visibility(visibility);
            repos.insert(repo.id, repo.clone());
            repo
        };

        self.set_repo_units(repo.id, units)?;
        self.recalculate_accesses(repo.id)?;

        Ok(repo)
    }

    /// Get a repository by ID.
    ///
    /// The returned value has an empty unit cache.
    pub fn get_repository(&self, id: RepoId) -> Option<Repository> {
        self.repositories.read().get(&id).cloned()
    }

    /// Find a repository by owner and name.
    pub fn find_repository(&self, owner: RepoOwner, name: &str) -> Option<Repository> {
        self.repositories
            .read()
            .values()
            .find(|r| r.owner == owner && r.name == name)
            .cloned()
    }

    /// Replace the units enabled on a repository.
    pub fn set_repo_units(&self, repo_id: RepoId, units: &[UnitType]) -> Result<()> {
        if self.get_repository(repo_id).is_none() {
            return Err(AuthError::NotFound(format!("repository {}", repo_id)));
        }
        let units: BTreeSet<UnitType> = units.iter().copied().collect();
        let units = units
            .into_iter()
            .map(|unit| RepoUnit::new(repo_id, unit))
            .collect();
        self.repo_units.write().insert(repo_id, units);
        Ok(())
    }

    /// Change the visibility of a repository.
    pub fn set_visibility(&self, repo_id: RepoId, visibility: Visibility) -> Result<()> {
        let mut repos = self.repositories.write();
        let repo = repos
            .get_mut(&repo_id)
            .ok_or_else(|| AuthError::NotFound(format!("repository {}", repo_id)))?;
        repo.visibility = visibility;
        Ok(())
    }

    // ==================== Collaborators ====================

    /// Add a collaborator with the default mode.
    pub fn add_collaborator(&self, repo_id: RepoId, user: UserId) -> Result<Collaboration> {
        if self.get_repository(repo_id).is_none() {
            return Err(AuthError::NotFound(format!("repository {}", repo_id)));
        }
        if self.get_user(user).map_or(true, |u| u.is_ghost()) {
            return Err(AuthError::NotFound(format!("user {}", user)));
        }

        let collab = {
            let mut collabs = self.collaborations.write();
            if collabs.contains_key(&(repo_id, user)) {
                return Err(AuthError::AlreadyExists(format!(
                    "collaborator {} on repository {}",
                    user, repo_id
                )));
            }
            let collab = Collaboration::new(repo_id, user, Collaboration::DEFAULT_MODE);
            collabs.insert((repo_id, user), collab.clone());
            collab
        };

        self.recalculate_accesses(repo_id)?;
        Ok(collab)
    }

    /// Change the mode of an existing collaboration.
    pub fn change_collaboration_mode(
        &self,
        repo_id: RepoId,
        user: UserId,
        mode: AccessMode,
    ) -> Result<Collaboration> {
        let collab = {
            let mut collabs = self.collaborations.write();
            let collab = collabs.get_mut(&(repo_id, user)).ok_or_else(|| {
                AuthError::NotFound(format!("collaborator {} on repository {}", user, repo_id))
            })?;
            collab.set_mode(mode);
            collab.clone()
        };

        self.recalculate_accesses(repo_id)?;
        Ok(collab)
    }

    /// Remove a collaborator.
    pub fn remove_collaborator(&self, repo_id: RepoId, user: UserId) -> Result<()> {
        if self.collaborations.write().remove(&(repo_id, user)).is_none() {
            return Err(AuthError::NotFound(format!(
                "collaborator {} on repository {}",
                user, repo_id
            )));
        }
        self.recalculate_accesses(repo_id)
    }

    /// List collaborators of a repository, ordered by user ID.
    pub fn list_collaborators(&self, repo_id: RepoId) -> Vec<Collaboration> {
        let mut collabs: Vec<Collaboration> = self
            .collaborations
            .read()
            .values()
            .filter(|c| c.repo_id == repo_id)
            .cloned()
            .collect();
        collabs.sort_by_key(|c| c.user_id);
        collabs
    }

    // ==================== Access Levels ====================

    /// Rebuilds the access level table of a repository from ownership,
    /// organization owners, team grants and collaborations.
    pub fn recalculate_accesses(&self, repo_id: RepoId) -> Result<()> {
        let repo = self
            .get_repository(repo_id)
            .ok_or_else(|| AuthError::NotFound(format!("repository {}", repo_id)))?;

        let mut levels: HashMap<UserId, AccessMode> = HashMap::new();
        match repo.owner {
            RepoOwner::User(owner) => raise(&mut levels, owner, AccessMode::Owner),
            RepoOwner::Organization(org_id) => {
                if let Some(org) = self.organizations.read().get(&org_id) {
                    for member in org.members.iter().filter(|m| m.role == OrgRole::Owner) {
                        raise(&mut levels, member.user, AccessMode::Owner);
                    }
                }
                for team in self
                    .teams
                    .read()
                    .values()
                    .filter(|t| t.org_id == org_id && t.has_repo(repo_id))
                {
                    let mode = team.max_unit_access_mode();
                    for member in &team.members {
                        raise(&mut levels, *member, mode);
                    }
                }
            }
        }
        for collab in self.collaborations.read().values().filter(|c| c.repo_id == repo_id) {
            raise(&mut levels, collab.user_id, collab.mode);
        }

        let mut accesses = self.accesses.write();
        accesses.retain(|(repo, _), _| *repo != repo_id);
        for (user, mode) in levels {
            if mode >= AccessMode::Read {
                accesses.insert((repo_id, user), mode);
            }
        }

        tracing::debug!(repo = %repo_id, "Recalculated access levels");
        Ok(())
    }

    fn recalculate_org_accesses(&self, org_id: OrgId) -> Result<()> {
        let repos: Vec<RepoId> = self
            .repositories
            .read()
            .values()
            .filter(|r| r.owner.organization() == Some(org_id))
            .map(|r| r.id)
            .collect();
        self.recalculate_repos(repos)
    }

    fn recalculate_repos(&self, repos: impl IntoIterator<Item = RepoId>) -> Result<()> {
        for repo in repos {
            self.recalculate_accesses(repo)?;
        }
        Ok(())
    }

    // ==================== Commit Statuses ====================

    /// Record a status reported for a commit.
    pub fn record_commit_status(
        &self,
        repo_id: RepoId,
        commit: impl Into<String>,
        status: CommitStatus,
    ) -> Result<()> {
        if self.get_repository(repo_id).is_none() {
            return Err(AuthError::NotFound(format!("repository {}", repo_id)));
        }
        self.commit_statuses
            .write()
            .entry((repo_id, commit.into()))
            .or_default()
            .push(status);
        Ok(())
    }

    /// Statuses reported for a commit, oldest first.
    pub fn commit_statuses(&self, repo_id: RepoId, commit: &str) -> Vec<CommitStatus> {
        self.commit_statuses
            .read()
            .get(&(repo_id, commit.to_string()))
            .cloned()
            .unwrap_or_default()
    }
}

fn raise(levels: &mut HashMap<UserId, AccessMode>, user: UserId, mode: AccessMode) {
    let level = levels.entry(user).or_default();
    *level = (*level).max(mode);
}

impl AccessReader for AuthStore {
    fn user(&self, id: UserId) -> Result<Option<User>> {
        Ok(self.get_user(id))
    }

    fn user_by_name(&self, name: &str) -> Result<Option<User>> {
        Ok(self.get_user_by_name(name))
    }

    fn collaboration(&self, repo: RepoId, user: UserId) -> Result<Option<Collaboration>> {
        Ok(self.collaborations.read().get(&(repo, user)).cloned())
    }

    fn is_organization_owner(&self, org: OrgId, user: UserId) -> Result<bool> {
        Ok(self
            .organizations
            .read()
            .get(&org)
            .map(|o| o.is_owner(user))
            .unwrap_or(false))
    }

    fn teams_with_access(
        &self,
        org: OrgId,
        repo: RepoId,
        min_mode: AccessMode,
    ) -> Result<Vec<Team>> {
        let mut teams: Vec<Team> = self
            .teams
            .read()
            .values()
            .filter(|t| t.org_id == org && t.has_repo(repo) && t.grants_at_least(min_mode))
            .cloned()
            .collect();
        teams.sort_by_key(|t| t.id);
        Ok(teams)
    }

    fn team_by_name(&self, org: OrgId, name: &str) -> Result<Option<Team>> {
        Ok(self
            .teams
            .read()
            .values()
            .find(|t| t.org_id == org && t.name == name)
            .cloned())
    }

    fn repo_units(&self, repo: RepoId) -> Result<Vec<RepoUnit>> {
        self.repo_units
            .read()
            .get(&repo)
            .cloned()
            .ok_or_else(|| AuthError::NotFound(format!("units of repository {}", repo)))
    }

    fn access_level(&self, repo: RepoId, user: UserId) -> Result<AccessMode> {
        Ok(self
            .accesses
            .read()
            .get(&(repo, user))
            .copied()
            .unwrap_or_default())
    }

    fn repo_readers(&self, repo: RepoId) -> Result<Vec<UserId>> {
        let mut readers: Vec<UserId> = self
            .accesses
            .read()
            .iter()
            .filter(|((r, _), mode)| *r == repo && **mode >= AccessMode::Read)
            .map(|((_, user), _)| *user)
            .collect();
        readers.sort();
        Ok(readers)
    }
}

impl BranchRuleStore for AuthStore {
    fn protected_branch(&self, repo: RepoId, branch: &str) -> Result<Option<ProtectedBranchRule>> {
        Ok(self
            .branch_rules
            .read()
            .get(&(repo, branch.to_string()))
            .cloned())
    }

    fn protected_branches(&self, repo: RepoId) -> Result<Vec<ProtectedBranchRule>> {
        let mut rules: Vec<ProtectedBranchRule> = self
            .branch_rules
            .read()
            .values()
            .filter(|r| r.repo_id == repo)
            .cloned()
            .collect();
        rules.sort_by(|a, b| a.branch_name.cmp(&b.branch_name));
        Ok(rules)
    }

    fn upsert_protected_branch(
        &self,
        mut rule: ProtectedBranchRule,
    ) -> Result<ProtectedBranchRule> {
        if self.get_repository(rule.repo_id).is_none() {
            return Err(AuthError::NotFound(format!("repository {}", rule.repo_id)));
        }

        let mut rules = self.branch_rules.write();
        let key = (rule.repo_id, rule.branch_name.clone());
        match rules.get(&key) {
            Some(existing) => {
                rule.id = existing.id;
                rule.created_at = existing.created_at;
            }
            None => rule.id = self.next_id(),
        }
        rule.updated_at = unix_now();
        rules.insert(key, rule.clone());

        Ok(rule)
    }

    fn delete_protected_branch(&self, repo: RepoId, id: u64) -> Result<()> {
        let mut rules = self.branch_rules.write();
        let key = rules
            .iter()
            .find(|(_, rule)| rule.repo_id == repo && rule.id == id)
            .map(|(key, _)| key.clone())
            .ok_or_else(|| AuthError::NotFound(format!("protected branch rule {}", id)))?;
        rules.remove(&key);
        Ok(())
    }

    fn recent_status_contexts(&self, repo: RepoId, since: u64) -> Result<Vec<String>> {
        let contexts: BTreeSet<String> = self
            .commit_statuses
            .read()
            .iter()
            .filter(|((r, _), _)| *r == repo)
            .flat_map(|(_, statuses)| statuses.iter())
            .filter(|status| status.created_at >= since)
            .map(|status| status.context.clone())
            .collect();
        Ok(contexts.into_iter().collect())
    }

    fn update_default_branch(&self, repo: RepoId, branch: &str) -> Result<()> {
        let mut repos = self.repositories.write();
        let repository = repos
            .get_mut(&repo)
            .ok_or_else(|| AuthError::NotFound(format!("repository {}", repo)))?;
        repository.default_branch = branch.to_string();
        Ok(())
    }
}
