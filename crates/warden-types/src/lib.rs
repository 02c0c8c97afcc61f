//! Common types used throughout `warden`.
//!
//! This crate provides the identity, repository and access-level types
//! shared by the permission resolver and the branch protection engine.

mod access;
mod identity;
mod repository;
mod unit;

pub use access::AccessMode;
pub use identity::{OrgId, TeamId, User, UserId, GHOST_USER_ID, GHOST_USER_NAME};
pub use repository::{RepoId, RepoOwner, Repository, Visibility};
pub use unit::{RepoUnit, UnitType};

/// Returns the current unix timestamp in seconds.
pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
