//! YAML site fixtures loaded into the in-memory store.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use warden_auth::{
    AuthConfig, AuthStore, CommitStatus, InMemoryRefs, OrgRole, ProtectBranchRequest,
    ProtectedBranchService,
};
use warden_types::{AccessMode, RepoOwner, Repository, UnitType, User, Visibility};

use crate::commands::{CliError, Result};

/// A whole site: users, organizations and repositories.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Fixture {
    pub users: Vec<UserSpec>,
    pub organizations: Vec<OrgSpec>,
    pub repositories: Vec<RepoSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserSpec {
    pub name: String,
    #[serde(default)]
    pub admin: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrgSpec {
    pub name: String,
    pub owner: String,
    #[serde(default)]
    pub members: BTreeMap<String, OrgRole>,
    #[serde(default)]
    pub teams: Vec<TeamSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TeamSpec {
    pub name: String,
    pub mode: AccessMode,
    /// Per-unit modes; absent means every unit at `mode`.
    #[serde(default)]
    pub units: Option<BTreeMap<UnitType, AccessMode>>,
    #[serde(default)]
    pub members: Vec<String>,
    /// Repository names within the organization.
    #[serde(default)]
    pub repos: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RepoSpec {
    /// User or organization name.
    pub owner: String,
    pub name: String,
    #[serde(default)]
    pub visibility: Visibility,
    /// Enabled units; absent means the site defaults.
    #[serde(default)]
    pub units: Option<Vec<UnitType>>,
    #[serde(default)]
    pub branches: Vec<String>,
    #[serde(default)]
    pub default_branch: Option<String>,
    /// Collaborator name to mode.
    #[serde(default)]
    pub collaborators: BTreeMap<String, AccessMode>,
    /// Branch name to protection settings.
    #[serde(default)]
    pub protected_branches: BTreeMap<String, ProtectBranchRequest>,
    #[serde(default)]
    pub statuses: Vec<StatusSpec>,
}

#[derive(Debug, Deserialize)]
pub struct StatusSpec {
    pub commit: String,
    #[serde(flatten)]
    pub status: CommitStatus,
}

/// The store and branch references built from a fixture.
pub struct Site {
    pub store: AuthStore,
    pub refs: InMemoryRefs,
}

impl Fixture {
    /// Reads a fixture from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&text)?)
    }

    /// Populates a fresh store. Protection settings go through the rule
    /// lifecycle, so they are validated like any other update.
    pub fn build(&self, config: &AuthConfig) -> Result<Site> {
        let site = Site {
            store: AuthStore::new(),
            refs: InMemoryRefs::new(),
        };

        for user in &self.users {
            site.store.create_user(&user.name, user.admin)?;
        }

        for spec in &self.organizations {
            let owner = site.user(&spec.owner)?;
            let org = site.store.create_organization(&spec.name, owner.id)?;
            for (name, role) in &spec.members {
                let user = site.user(name)?;
                if user.id == owner.id {
                    continue;
                }
                site.store.add_org_member(org.id, user.id, *role)?;
            }
        }

        for spec in &self.repositories {
            let owner = site.owner(&spec.owner)?;
            let units = spec
                .units
                .clone()
                .unwrap_or_else(|| UnitType::DEFAULTS.to_vec());
            let repo = site
                .store
                .create_repository(owner, &spec.name, spec.visibility, &units)?;

            for branch in &spec.branches {
                site.refs.create_branch(repo.id, branch.clone());
            }
            for (name, mode) in &spec.collaborators {
                let user = site.user(name)?;
                site.store.add_collaborator(repo.id, user.id)?;
                site.store.change_collaboration_mode(repo.id, user.id, *mode)?;
            }
            for status in &spec.statuses {
                site.store
                    .record_commit_status(repo.id, status.commit.clone(), status.status.clone())?;
            }
        }

        for spec in &self.organizations {
            let org = site.owner(&spec.name)?;
            for team_spec in &spec.teams {
                let org_id = org.organization().ok_or_else(|| CliError::Unknown {
                    kind: "organization",
                    name: spec.name.clone(),
                })?;
                let team = site
                    .store
                    .create_team(org_id, &team_spec.name, team_spec.mode)?;
                if team_spec.units.is_some() {
                    site.store
                        .update_team_access(team.id, team_spec.mode, team_spec.units.clone())?;
                }
                for name in &team_spec.members {
                    site.store.add_team_member(team.id, site.user(name)?.id)?;
                }
                for name in &team_spec.repos {
                    let repo = site.repository(&format!("{}/{}", spec.name, name))?;
                    site.store.add_team_repo(team.id, repo.id)?;
                }
            }
        }

        let service = ProtectedBranchService::new(&site.store, &site.refs, config);
        for spec in &self.repositories {
            let mut repo = site.repository(&format!("{}/{}", spec.owner, spec.name))?;
            if let Some(branch) = &spec.default_branch {
                service.set_default_branch(&mut repo, branch)?;
            }
            for (branch, request) in &spec.protected_branches {
                service.protect(&repo, branch, request)?;
            }
        }

        tracing::debug!(
            users = self.users.len(),
            organizations = self.organizations.len(),
            repositories = self.repositories.len(),
            "Loaded fixture"
        );

        Ok(site)
    }
}

impl Site {
    /// Looks up a user by name.
    pub fn user(&self, name: &str) -> Result<User> {
        self.store
            .get_user_by_name(name)
            .ok_or_else(|| CliError::Unknown {
                kind: "user",
                name: name.to_string(),
            })
    }

    /// Resolves an owner name to a user or an organization.
    pub fn owner(&self, name: &str) -> Result<RepoOwner> {
        if let Some(org) = self.store.get_organization_by_name(name) {
            return Ok(RepoOwner::Organization(org.id));
        }
        self.user(name).map(|user| RepoOwner::User(user.id))
    }

    /// Looks up a repository by its `owner/name` path.
    pub fn repository(&self, path: &str) -> Result<Repository> {
        let unknown = || CliError::Unknown {
            kind: "repository",
            name: path.to_string(),
        };
        let (owner, name) = path.split_once('/').ok_or_else(unknown)?;
        let owner = self.owner(owner).map_err(|_| unknown())?;
        self.store.find_repository(owner, name).ok_or_else(unknown)
    }
}
