//! Repository units: the independently permissioned sub-features of a repository.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::RepoId;

/// A repository sub-feature that can be enabled and permissioned on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitType {
    /// Source code, branches and tags.
    Code,
    /// Issue tracker.
    Issues,
    /// Pull requests.
    PullRequests,
    /// Releases.
    Releases,
    /// Built-in wiki.
    Wiki,
    /// Link to an external wiki.
    ExternalWiki,
    /// Link to an external issue tracker.
    ExternalTracker,
    /// Project boards.
    Projects,
    /// Package registry.
    Packages,
}

impl UnitType {
    /// Every unit type.
    pub const ALL: [UnitType; 9] = [
        UnitType::Code,
        UnitType::Issues,
        UnitType::PullRequests,
        UnitType::Releases,
        UnitType::Wiki,
        UnitType::ExternalWiki,
        UnitType::ExternalTracker,
        UnitType::Projects,
        UnitType::Packages,
    ];

    /// Units enabled on a freshly created repository.
    pub const DEFAULTS: [UnitType; 7] = [
        UnitType::Code,
        UnitType::Issues,
        UnitType::PullRequests,
        UnitType::Releases,
        UnitType::Wiki,
        UnitType::Projects,
        UnitType::Packages,
    ];

    /// Units that can never be disabled site-wide.
    pub const REQUIRED: [UnitType; 2] = [UnitType::Code, UnitType::Releases];

    /// Stable key of the unit, e.g. `repo.code`.
    pub fn key(&self) -> &'static str {
        match self {
            UnitType::Code => "repo.code",
            UnitType::Issues => "repo.issues",
            UnitType::PullRequests => "repo.pulls",
            UnitType::Releases => "repo.releases",
            UnitType::Wiki => "repo.wiki",
            UnitType::ExternalWiki => "repo.ext_wiki",
            UnitType::ExternalTracker => "repo.ext_issues",
            UnitType::Projects => "repo.projects",
            UnitType::Packages => "repo.packages",
        }
    }

    /// Returns true if the unit cannot be disabled site-wide.
    pub fn is_required(&self) -> bool {
        Self::REQUIRED.contains(self)
    }
}

impl fmt::Display for UnitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for UnitType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_lowercase();
        let name = name.strip_prefix("repo.").unwrap_or(&name);
        match name {
            "code" => Ok(UnitType::Code),
            "issues" => Ok(UnitType::Issues),
            "pulls" | "pull_requests" => Ok(UnitType::PullRequests),
            "releases" => Ok(UnitType::Releases),
            "wiki" => Ok(UnitType::Wiki),
            "ext_wiki" | "external_wiki" => Ok(UnitType::ExternalWiki),
            "ext_issues" | "external_tracker" => Ok(UnitType::ExternalTracker),
            "projects" => Ok(UnitType::Projects),
            "packages" => Ok(UnitType::Packages),
            other => Err(format!("unknown unit '{other}'")),
        }
    }
}

/// A unit enabled on a specific repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoUnit {
    /// Repository the unit belongs to.
    pub repo_id: RepoId,
    /// Unit type.
    pub unit_type: UnitType,
    /// When the unit was enabled (Unix timestamp).
    pub created_at: u64,
}

impl RepoUnit {
    /// Enables `unit_type` on `repo_id` now.
    pub fn new(repo_id: RepoId, unit_type: UnitType) -> Self {
        Self {
            repo_id,
            unit_type,
            created_at: crate::unix_now(),
        }
    }
}
