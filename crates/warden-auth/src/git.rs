//! In-memory branch references.

use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use warden_types::RepoId;

use crate::{
    backend::GitOracle,
    error::{AuthError, Result},
};

#[derive(Debug, Default)]
struct RepoRefs {
    branches: BTreeSet<String>,
    head: Option<String>,
}

/// Branch names and HEAD of each repository, kept in memory.
#[derive(Debug, Default)]
pub struct InMemoryRefs {
    repos: RwLock<HashMap<RepoId, RepoRefs>>,
}

impl InMemoryRefs {
    /// Create an empty reference set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a branch. Returns false if it already existed.
    pub fn create_branch(&self, repo: RepoId, branch: impl Into<String>) -> bool {
        self.repos
            .write()
            .entry(repo)
            .or_default()
            .branches
            .insert(branch.into())
    }

    /// Delete a branch. Returns false if it did not exist.
    pub fn delete_branch(&self, repo: RepoId, branch: &str) -> bool {
        self.repos
            .write()
            .get_mut(&repo)
            .map(|refs| refs.branches.remove(branch))
            .unwrap_or(false)
    }

    /// Branch names of a repository, sorted.
    pub fn branches(&self, repo: RepoId) -> Vec<String> {
        self.repos
            .read()
            .get(&repo)
            .map(|refs| refs.branches.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Branch HEAD points at, if set.
    pub fn head(&self, repo: RepoId) -> Option<String> {
        self.repos.read().get(&repo).and_then(|refs| refs.head.clone())
    }
}

impl GitOracle for InMemoryRefs {
    fn branch_exists(&self, repo: RepoId, branch: &str) -> Result<bool> {
        Ok(self
            .repos
            .read()
            .get(&repo)
            .map(|refs| refs.branches.contains(branch))
            .unwrap_or(false))
    }

    fn set_default_branch(&self, repo: RepoId, branch: &str) -> Result<()> {
        let mut repos = self.repos.write();
        let refs = repos
            .get_mut(&repo)
            .filter(|refs| refs.branches.contains(branch))
            .ok_or_else(|| {
                AuthError::NotFound(format!("branch '{}' in repository {}", branch, repo))
            })?;
        refs.head = Some(branch.to_string());
        Ok(())
    }
}
