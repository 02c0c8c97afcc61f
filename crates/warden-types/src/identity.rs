//! User, team and organization identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of the ghost user that stands in for deleted accounts.
pub const GHOST_USER_ID: UserId = UserId(-1);

/// Display name of the ghost user.
pub const GHOST_USER_NAME: &str = "Ghost";

/// Unique identifier of a user account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl UserId {
    /// Returns true for the ghost sentinel.
    pub fn is_ghost(&self) -> bool {
        *self == GHOST_USER_ID
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier of a team.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TeamId(pub i64);

impl fmt::Display for TeamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier of an organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrgId(pub i64);

impl fmt::Display for OrgId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A user account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Unique user ID.
    pub id: UserId,
    /// Login name.
    pub name: String,
    /// Site administrator flag.
    #[serde(default)]
    pub is_admin: bool,
}

impl User {
    /// Creates a regular user.
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id: UserId(id),
            name: name.into(),
            is_admin: false,
        }
    }

    /// Creates a site administrator.
    pub fn admin(id: i64, name: impl Into<String>) -> Self {
        Self {
            is_admin: true,
            ..Self::new(id, name)
        }
    }

    /// The ghost user standing in for a deleted account.
    pub fn ghost() -> Self {
        Self {
            id: GHOST_USER_ID,
            name: GHOST_USER_NAME.to_string(),
            is_admin: false,
        }
    }

    /// Returns true if this is the ghost user.
    pub fn is_ghost(&self) -> bool {
        self.id.is_ghost()
    }

    /// Site admin flag. The ghost user is never an admin.
    pub fn is_site_admin(&self) -> bool {
        self.is_admin && !self.is_ghost()
    }
}
