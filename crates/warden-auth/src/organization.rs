//! Organizations and membership roles.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use warden_types::{unix_now, OrgId, TeamId, UserId};

use crate::error::{AuthError, Result};

/// Role within an organization.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum OrgRole {
    /// Regular member, access comes from teams.
    #[default]
    Member,
    /// Can manage teams.
    Admin,
    /// Full control of the organization and every repository it owns.
    Owner,
}

impl OrgRole {
    /// Check if this role has at least the required role level.
    pub fn has(&self, required: OrgRole) -> bool {
        *self >= required
    }
}

impl fmt::Display for OrgRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrgRole::Member => write!(f, "member"),
            OrgRole::Admin => write!(f, "admin"),
            OrgRole::Owner => write!(f, "owner"),
        }
    }
}

/// A member of an organization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrgMember {
    /// Member user ID.
    pub user: UserId,
    /// Role within the organization.
    pub role: OrgRole,
    /// When the member was added (Unix timestamp).
    pub added_at: u64,
}

impl OrgMember {
    /// Create a new organization member.
    pub fn new(user: UserId, role: OrgRole) -> Self {
        Self {
            user,
            role,
            added_at: unix_now(),
        }
    }
}

/// An organization owning repositories and teams.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organization {
    /// Unique organization ID.
    pub id: OrgId,
    /// Unique organization name.
    pub name: String,
    /// Organization members.
    pub members: Vec<OrgMember>,
    /// Teams belonging to this organization.
    pub teams: BTreeSet<TeamId>,
    /// When the organization was created (Unix timestamp).
    pub created_at: u64,
    /// When the organization was last updated (Unix timestamp).
    pub updated_at: u64,
}

impl Organization {
    /// Create a new organization with `founder` as its first owner.
    pub fn new(id: OrgId, name: impl Into<String>, founder: UserId) -> Self {
        let now = unix_now();
        Self {
            id,
            name: name.into(),
            members: vec![OrgMember::new(founder, OrgRole::Owner)],
            teams: BTreeSet::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Get a member by user ID.
    pub fn get_member(&self, user: UserId) -> Option<&OrgMember> {
        self.members.iter().find(|m| m.user == user)
    }

    /// Check if a user is a member.
    pub fn is_member(&self, user: UserId) -> bool {
        self.get_member(user).is_some()
    }

    /// Check if a user has at least the specified role.
    pub fn has_role(&self, user: UserId, required: OrgRole) -> bool {
        self.get_member(user)
            .map(|m| m.role.has(required))
            .unwrap_or(false)
    }

    /// Check if a user is an owner.
    pub fn is_owner(&self, user: UserId) -> bool {
        self.has_role(user, OrgRole::Owner)
    }

    /// Add a member. Returns false if the user is already a member.
    pub fn add_member(&mut self, member: OrgMember) -> bool {
        if self.is_member(member.user) {
            return false;
        }
        self.members.push(member);
        self.updated_at = unix_now();
        true
    }

    /// Remove a member. Fails if this would remove the last owner.
    pub fn remove_member(&mut self, user: UserId) -> Result<bool> {
        if self.get_member(user).map(|m| m.role) == Some(OrgRole::Owner) && self.owner_count() <= 1
        {
            return Err(AuthError::LastOwner);
        }

        let before = self.members.len();
        self.members.retain(|m| m.user != user);
        let removed = self.members.len() < before;
        if removed {
            self.updated_at = unix_now();
        }
        Ok(removed)
    }

    /// Update a member's role. Fails if this would demote the last owner.
    pub fn update_member_role(&mut self, user: UserId, new_role: OrgRole) -> Result<bool> {
        if let Some(member) = self.get_member(user) {
            if member.role == OrgRole::Owner
                && new_role != OrgRole::Owner
                && self.owner_count() <= 1
            {
                return Err(AuthError::LastOwner);
            }
        }

        match self.members.iter_mut().find(|m| m.user == user) {
            Some(member) => {
                member.role = new_role;
                self.updated_at = unix_now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Count the number of owners.
    pub fn owner_count(&self) -> usize {
        self.members
            .iter()
            .filter(|m| m.role == OrgRole::Owner)
            .count()
    }
}
