//! Access modes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Access level a user holds on a repository or on one of its units.
///
/// Modes are ordered: `None < Read < Write < Admin < Owner`. Every
/// comparison in the resolver and the branch protection engine relies
/// on this ordering.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum AccessMode {
    /// No access at all.
    #[default]
    None,
    /// Can read contents (clone, pull, browse).
    Read,
    /// Can read and write (push commits, edit issues).
    Write,
    /// Can manage settings and collaborators.
    Admin,
    /// Full control, including deletion and transfer.
    Owner,
}

impl AccessMode {
    /// Every mode, lowest first.
    pub const ALL: [AccessMode; 5] = [
        AccessMode::None,
        AccessMode::Read,
        AccessMode::Write,
        AccessMode::Admin,
        AccessMode::Owner,
    ];

    /// Check if this mode grants at least the required level.
    pub fn has(&self, required: AccessMode) -> bool {
        *self >= required
    }

    /// Returns the lowercase name of the mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessMode::None => "none",
            AccessMode::Read => "read",
            AccessMode::Write => "write",
            AccessMode::Admin => "admin",
            AccessMode::Owner => "owner",
        }
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(AccessMode::None),
            "read" => Ok(AccessMode::Read),
            "write" | "push" => Ok(AccessMode::Write),
            "admin" => Ok(AccessMode::Admin),
            "owner" => Ok(AccessMode::Owner),
            other => Err(format!("unknown access mode '{other}'")),
        }
    }
}
