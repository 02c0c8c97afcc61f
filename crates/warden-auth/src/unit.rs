//! Unit registry: which repository units are available and enabled.

use std::collections::BTreeSet;
use warden_types::{Repository, UnitType};

use crate::{backend::AccessReader, config::AuthConfig, error::Result};

/// Site-wide view of repository units.
#[derive(Debug, Clone, Default)]
pub struct UnitRegistry {
    disabled: BTreeSet<UnitType>,
}

impl UnitRegistry {
    /// A registry with `disabled` units turned off site-wide.
    ///
    /// Required units cannot be disabled and are ignored with a warning.
    pub fn new(disabled: impl IntoIterator<Item = UnitType>) -> Self {
        let mut set = BTreeSet::new();
        for unit in disabled {
            if unit.is_required() {
                tracing::warn!(unit = %unit, "Ignoring attempt to disable a required unit");
                continue;
            }
            set.insert(unit);
        }
        Self { disabled: set }
    }

    /// A registry built from the configured disabled units.
    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(config.disabled_units.iter().copied())
    }

    /// Returns true if `unit` is disabled for every repository.
    pub fn is_globally_disabled(&self, unit: UnitType) -> bool {
        self.disabled.contains(&unit)
    }

    /// Units available site-wide.
    pub fn all_units(&self) -> Vec<UnitType> {
        UnitType::ALL
            .into_iter()
            .filter(|unit| !self.is_globally_disabled(*unit))
            .collect()
    }

    /// Units enabled on a new repository.
    pub fn default_units(&self) -> Vec<UnitType> {
        UnitType::DEFAULTS
            .into_iter()
            .filter(|unit| !self.is_globally_disabled(*unit))
            .collect()
    }

    /// Units enabled on `repo`, loading and caching its unit list on first use.
    pub fn enabled_units<S: AccessReader + ?Sized>(
        &self,
        store: &S,
        repo: &Repository,
    ) -> Result<BTreeSet<UnitType>> {
        let units = repo.load_units(|| store.repo_units(repo.id))?;
        Ok(units
            .iter()
            .map(|unit| unit.unit_type)
            .filter(|unit| !self.is_globally_disabled(*unit))
            .collect())
    }
}
