//! Resolved repository permissions.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use warden_types::{AccessMode, UnitType};

/// Where the resolved access came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessSource {
    /// No identity, or the ghost user.
    Anonymous,
    /// Site administrator override.
    SiteAdmin,
    /// Repository owner or organization owner.
    Owner,
    /// Collaboration, teams and public visibility combined.
    Granted,
}

impl fmt::Display for AccessSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessSource::Anonymous => write!(f, "anonymous"),
            AccessSource::SiteAdmin => write!(f, "site_admin"),
            AccessSource::Owner => write!(f, "owner"),
            AccessSource::Granted => write!(f, "granted"),
        }
    }
}

/// Effective access of one user on one repository.
///
/// A coarse mode plus an optional per-unit map that is only present when
/// some unit differs from the coarse mode. Lookups consult the map first
/// and fall back to the coarse mode. Units that are not enabled on the
/// repository always resolve to [`AccessMode::None`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Permission {
    access_mode: AccessMode,
    units: BTreeSet<UnitType>,
    units_mode: Option<BTreeMap<UnitType, AccessMode>>,
    source: AccessSource,
}

impl Permission {
    /// Uniform `access_mode` on every unit in `units`.
    pub fn new(
        access_mode: AccessMode,
        units: impl IntoIterator<Item = UnitType>,
        source: AccessSource,
    ) -> Self {
        Self {
            access_mode,
            units: units.into_iter().collect(),
            units_mode: None,
            source,
        }
    }

    /// Owner-level access to every unit in `units`.
    pub fn owner(units: impl IntoIterator<Item = UnitType>, source: AccessSource) -> Self {
        Self::new(AccessMode::Owner, units, source)
    }

    /// Builds a permission from per-unit modes.
    ///
    /// The per-unit map is dropped when every enabled unit already
    /// resolves to `access_mode`.
    pub fn from_unit_modes(
        access_mode: AccessMode,
        units: impl IntoIterator<Item = UnitType>,
        modes: BTreeMap<UnitType, AccessMode>,
        source: AccessSource,
    ) -> Self {
        let units: BTreeSet<UnitType> = units.into_iter().collect();
        let uniform = units
            .iter()
            .all(|unit| modes.get(unit).copied().unwrap_or(access_mode) == access_mode);
        let units_mode = if uniform {
            None
        } else {
            Some(
                modes
                    .into_iter()
                    .filter(|(unit, _)| units.contains(unit))
                    .collect(),
            )
        };

        Self {
            access_mode,
            units,
            units_mode,
            source,
        }
    }

    /// Coarse access mode.
    pub fn access_mode(&self) -> AccessMode {
        self.access_mode
    }

    /// How the access was established.
    pub fn source(&self) -> AccessSource {
        self.source
    }

    /// Units enabled on the repository.
    pub fn units(&self) -> impl Iterator<Item = UnitType> + '_ {
        self.units.iter().copied()
    }

    /// Per-unit overrides, when finer-grained than the coarse mode.
    pub fn unit_modes(&self) -> Option<&BTreeMap<UnitType, AccessMode>> {
        self.units_mode.as_ref()
    }

    /// Returns true if `unit` is enabled on the repository.
    pub fn has_unit(&self, unit: UnitType) -> bool {
        self.units.contains(&unit)
    }

    /// Returns true for owner-level access.
    pub fn is_owner(&self) -> bool {
        self.access_mode >= AccessMode::Owner
    }

    /// Returns true for admin-level access or higher.
    pub fn is_admin(&self) -> bool {
        self.access_mode >= AccessMode::Admin
    }

    /// Returns true if at least one unit is readable.
    pub fn has_access(&self) -> bool {
        self.units.iter().any(|unit| self.can_read(*unit))
    }

    /// Effective mode on `unit`.
    pub fn unit_access_mode(&self, unit: UnitType) -> AccessMode {
        if !self.has_unit(unit) {
            return AccessMode::None;
        }
        match &self.units_mode {
            Some(modes) => modes.get(&unit).copied().unwrap_or(self.access_mode),
            None => self.access_mode,
        }
    }

    /// Returns true if `unit` is accessible with at least `mode`.
    pub fn can_access(&self, mode: AccessMode, unit: UnitType) -> bool {
        mode > AccessMode::None && self.unit_access_mode(unit) >= mode
    }

    /// Returns true if any of `units` is accessible with at least `mode`.
    pub fn can_access_any(&self, mode: AccessMode, units: &[UnitType]) -> bool {
        units.iter().any(|unit| self.can_access(mode, *unit))
    }

    /// Returns true if `unit` is readable.
    pub fn can_read(&self, unit: UnitType) -> bool {
        self.can_access(AccessMode::Read, unit)
    }

    /// Returns true if any of `units` is readable.
    pub fn can_read_any(&self, units: &[UnitType]) -> bool {
        self.can_access_any(AccessMode::Read, units)
    }

    /// Returns true if `unit` is writable.
    pub fn can_write(&self, unit: UnitType) -> bool {
        self.can_access(AccessMode::Write, unit)
    }

    /// Read check on pull requests or issues.
    pub fn can_read_issues_or_pulls(&self, is_pull: bool) -> bool {
        if is_pull {
            self.can_read(UnitType::PullRequests)
        } else {
            self.can_read(UnitType::Issues)
        }
    }

    /// Write check on pull requests or issues.
    pub fn can_write_issues_or_pulls(&self, is_pull: bool) -> bool {
        if is_pull {
            self.can_write(UnitType::PullRequests)
        } else {
            self.can_write(UnitType::Issues)
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.access_mode, self.source)?;
        if let Some(modes) = &self.units_mode {
            for (unit, mode) in modes {
                write!(f, " {unit}={mode}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const UNITS: [UnitType; 3] = [UnitType::Code, UnitType::Issues, UnitType::Wiki];

    #[test]
    fn test_uniform_permission() {
        let perm = Permission::new(AccessMode::Write, UNITS, AccessSource::Granted);
        assert!(perm.unit_modes().is_none());
        for unit in UNITS {
            assert!(perm.can_read(unit));
            assert!(perm.can_write(unit));
        }
        assert!(!perm.is_admin());
    }

    #[test]
    fn test_disabled_unit_denies() {
        let perm = Permission::owner(UNITS, AccessSource::SiteAdmin);
        assert!(perm.can_write(UnitType::Code));
        assert!(!perm.can_read(UnitType::Packages));
        assert!(!perm.can_write(UnitType::Packages));
        assert_eq!(perm.unit_access_mode(UnitType::Packages), AccessMode::None);
    }

    #[test]
    fn test_unit_map_only_when_needed() {
        let modes = UNITS.iter().map(|u| (*u, AccessMode::Read)).collect();
        let perm = Permission::from_unit_modes(
            AccessMode::Read,
            UNITS,
            modes,
            AccessSource::Granted,
        );
        assert!(perm.unit_modes().is_none());

        let modes = BTreeMap::from([
            (UnitType::Code, AccessMode::Read),
            (UnitType::Issues, AccessMode::Write),
            (UnitType::Wiki, AccessMode::None),
            (UnitType::Packages, AccessMode::Owner),
        ]);
        let perm = Permission::from_unit_modes(
            AccessMode::Read,
            UNITS,
            modes,
            AccessSource::Granted,
        );
        let map = perm.unit_modes().unwrap();
        assert!(!map.contains_key(&UnitType::Packages));
        assert!(perm.can_write(UnitType::Issues));
        assert!(perm.can_read(UnitType::Code));
        assert!(!perm.can_write(UnitType::Code));
        assert!(!perm.can_read(UnitType::Wiki));
    }

    #[test]
    fn test_issue_and_pull_helpers() {
        let modes = BTreeMap::from([
            (UnitType::Issues, AccessMode::Write),
            (UnitType::PullRequests, AccessMode::Read),
        ]);
        let perm = Permission::from_unit_modes(
            AccessMode::None,
            [UnitType::Issues, UnitType::PullRequests],
            modes,
            AccessSource::Granted,
        );
        assert!(perm.can_write_issues_or_pulls(false));
        assert!(!perm.can_write_issues_or_pulls(true));
        assert!(perm.can_read_issues_or_pulls(true));
        assert!(perm.has_access());
    }

    #[test]
    fn test_no_access() {
        let perm = Permission::new(AccessMode::None, UNITS, AccessSource::Anonymous);
        assert!(!perm.has_access());
        assert!(!perm.can_read_any(&UNITS));
        assert!(!perm.can_access(AccessMode::None, UnitType::Code));
    }
}
