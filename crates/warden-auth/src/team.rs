//! Teams: group-based, unit-scoped repository access.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use warden_types::{unix_now, AccessMode, OrgId, RepoId, TeamId, UnitType, UserId};

/// A team within an organization.
///
/// A team grants its members access to a set of repositories, either to
/// every unit at the team's access mode or to an explicit per-unit map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Team {
    /// Unique team ID.
    pub id: TeamId,
    /// Organization this team belongs to.
    pub org_id: OrgId,
    /// Team name, unique within the organization.
    pub name: String,
    /// Access mode of the team.
    pub access_mode: AccessMode,
    /// Per-unit modes. `None` means every unit at `access_mode`.
    #[serde(default)]
    pub units: Option<BTreeMap<UnitType, AccessMode>>,
    /// Team members.
    #[serde(default)]
    pub members: BTreeSet<UserId>,
    /// Repositories this team has access to.
    #[serde(default)]
    pub repos: BTreeSet<RepoId>,
    /// When the team was created (Unix timestamp).
    pub created_at: u64,
    /// When the team was last updated (Unix timestamp).
    pub updated_at: u64,
}

impl Team {
    /// Create a team covering every unit at `access_mode`.
    pub fn new(
        id: TeamId,
        org_id: OrgId,
        name: impl Into<String>,
        access_mode: AccessMode,
    ) -> Self {
        let now = unix_now();
        Self {
            id,
            org_id,
            name: name.into(),
            access_mode,
            units: None,
            members: BTreeSet::new(),
            repos: BTreeSet::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Restrict the team to explicit per-unit modes.
    pub fn with_units(mut self, units: impl IntoIterator<Item = (UnitType, AccessMode)>) -> Self {
        self.set_units(Some(units.into_iter().collect()));
        self
    }

    /// Replace the per-unit map. `None` restores "all units" access.
    pub fn set_units(&mut self, units: Option<BTreeMap<UnitType, AccessMode>>) {
        self.units = units;
        self.updated_at = unix_now();
    }

    /// Returns true if the team covers every unit.
    pub fn includes_all_units(&self) -> bool {
        self.units.is_none() || self.access_mode >= AccessMode::Admin
    }

    /// Mode this team grants on `unit`.
    ///
    /// Admin-or-higher teams cover every unit at their own mode.
    pub fn unit_access_mode(&self, unit: UnitType) -> AccessMode {
        if self.access_mode >= AccessMode::Admin {
            return self.access_mode;
        }
        match &self.units {
            None => self.access_mode,
            Some(units) => units.get(&unit).copied().unwrap_or(AccessMode::None),
        }
    }

    /// Highest mode this team grants on any unit.
    pub fn max_unit_access_mode(&self) -> AccessMode {
        UnitType::ALL
            .into_iter()
            .map(|unit| self.unit_access_mode(unit))
            .max()
            .unwrap_or_default()
    }

    /// Returns true if the team grants at least `mode` on some unit.
    ///
    /// A unit-scoped team may carry an overall mode of `none` and still
    /// grant access through its unit map.
    pub fn grants_at_least(&self, mode: AccessMode) -> bool {
        self.max_unit_access_mode() >= mode
    }

    /// Check if a user is a member of this team.
    pub fn is_member(&self, user: UserId) -> bool {
        self.members.contains(&user)
    }

    /// Add a member to the team.
    pub fn add_member(&mut self, user: UserId) -> bool {
        let added = self.members.insert(user);
        if added {
            self.updated_at = unix_now();
        }
        added
    }

    /// Remove a member from the team.
    pub fn remove_member(&mut self, user: UserId) -> bool {
        let removed = self.members.remove(&user);
        if removed {
            self.updated_at = unix_now();
        }
        removed
    }

    /// Check if the team has access to a repository.
    pub fn has_repo(&self, repo: RepoId) -> bool {
        self.repos.contains(&repo)
    }

    /// Add a repository to the team.
    pub fn add_repo(&mut self, repo: RepoId) -> bool {
        let added = self.repos.insert(repo);
        if added {
            self.updated_at = unix_now();
        }
        added
    }

    /// Remove a repository from the team.
    pub fn remove_repo(&mut self, repo: RepoId) -> bool {
        let removed = self.repos.remove(&repo);
        if removed {
            self.updated_at = unix_now();
        }
        removed
    }
}
