//! Repository types for Warden.

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{OrgId, RepoUnit, UnitType, UserId};

/// Unique identifier of a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RepoId(pub i64);

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Visibility of a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    /// Public repository.
    #[default]
    Public,
    /// Private repository.
    Private,
}

/// Owner of a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "id")]
pub enum RepoOwner {
    /// Owned by an individual user.
    User(UserId),
    /// Owned by an organization.
    Organization(OrgId),
}

impl RepoOwner {
    /// Returns the organization ID if the owner is an organization.
    pub fn organization(&self) -> Option<OrgId> {
        match self {
            RepoOwner::Organization(id) => Some(*id),
            RepoOwner::User(_) => None,
        }
    }

    /// Returns true if the repository is owned directly by `user`.
    pub fn is_user(&self, user: UserId) -> bool {
        matches!(self, RepoOwner::User(id) if *id == user)
    }
}

/// A repository.
///
/// The enabled-unit list is loaded at most once per value and cached on
/// it. Repository values are meant to live for a single request, so the
/// cache never outlives the resolution that filled it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repository {
    /// Unique identifier.
    pub id: RepoId,
    /// Repository name.
    pub name: String,
    /// Owner of the repository.
    pub owner: RepoOwner,
    /// Repository visibility.
    #[serde(default)]
    pub visibility: Visibility,
    /// Default branch name.
    #[serde(default = "default_branch")]
    pub default_branch: String,
    #[serde(skip)]
    units: OnceCell<Vec<RepoUnit>>,
}

fn default_branch() -> String {
    "main".to_string()
}

impl Repository {
    /// Creates a new public repository.
    pub fn new(id: i64, name: impl Into<String>, owner: RepoOwner) -> Self {
        Self {
            id: RepoId(id),
            name: name.into(),
            owner,
            visibility: Visibility::Public,
            default_branch: default_branch(),
            units: OnceCell::new(),
        }
    }

    /// Sets the visibility.
    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    /// Returns true if the repository is private.
    pub fn is_private(&self) -> bool {
        self.visibility == Visibility::Private
    }

    /// Returns the units, loading them with `load` on first access.
    ///
    /// A failed load leaves the cache empty so the next call retries.
    pub fn load_units<E>(
        &self,
        load: impl FnOnce() -> Result<Vec<RepoUnit>, E>,
    ) -> Result<&[RepoUnit], E> {
        self.units.get_or_try_init(load).map(Vec::as_slice)
    }

    /// Returns the cached units, if they were loaded.
    pub fn cached_units(&self) -> Option<&[RepoUnit]> {
        self.units.get().map(Vec::as_slice)
    }

    /// Returns true if `unit` is in the cached unit list.
    pub fn has_unit(&self, unit: UnitType) -> bool {
        self.cached_units()
            .map(|units| units.iter().any(|u| u.unit_type == unit))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_repository_creation() {
        let repo = Repository::new(1, "api", RepoOwner::User(UserId(2)));
        assert_eq!(repo.name, "api");
        assert_eq!(repo.default_branch, "main");
        assert!(!repo.is_private());
        assert!(repo.owner.is_user(UserId(2)));
        assert_eq!(repo.owner.organization(), None);
    }

    #[test]
    fn test_units_load_once() {
        let repo = Repository::new(1, "api", RepoOwner::Organization(OrgId(3)));
        let calls = Cell::new(0);
        let load = || {
            calls.set(calls.get() + 1);
            Ok::<_, ()>(vec![RepoUnit::new(RepoId(1), UnitType::Code)])
        };

        assert!(repo.cached_units().is_none());
        assert_eq!(repo.load_units(load).unwrap().len(), 1);
        assert_eq!(repo.load_units(load).unwrap().len(), 1);
        assert_eq!(calls.get(), 1);
        assert!(repo.has_unit(UnitType::Code));
        assert!(!repo.has_unit(UnitType::Wiki));
    }

    #[test]
    fn test_units_load_failure_retries() {
        let repo = Repository::new(1, "api", RepoOwner::User(UserId(2)));
        assert!(repo.load_units(|| Err("storage down")).is_err());
        assert!(repo.cached_units().is_none());
        let units = repo
            .load_units(|| Ok::<_, &str>(vec![RepoUnit::new(RepoId(1), UnitType::Issues)]))
            .unwrap();
        assert_eq!(units[0].unit_type, UnitType::Issues);
    }

    #[test]
    fn test_repository_serde() {
        let json = r#"{"id":7,"name":"web","owner":{"kind":"organization","id":3},"visibility":"private"}"#;
        let repo: Repository = serde_json::from_str(json).unwrap();
        assert_eq!(repo.id, RepoId(7));
        assert_eq!(repo.owner.organization(), Some(OrgId(3)));
        assert!(repo.is_private());
        assert_eq!(repo.default_branch, "main");
    }
}
