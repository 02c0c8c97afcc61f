//! Permission resolution.

use std::collections::{BTreeMap, BTreeSet};
use warden_types::{AccessMode, RepoOwner, Repository, UnitType, User};

use crate::{
    actor::Actor,
    backend::AccessReader,
    error::Result,
    permission::{AccessSource, Permission},
    unit::UnitRegistry,
};

/// Resolves the effective [`Permission`] of a user on a repository.
///
/// Precedence: site admin, then ownership, then the maximum of the
/// collaboration and team grants, then the public read floor.
pub struct PermissionResolver<'a, S: AccessReader + ?Sized> {
    store: &'a S,
    units: &'a UnitRegistry,
}

impl<'a, S: AccessReader + ?Sized> PermissionResolver<'a, S> {
    /// Create a resolver reading from `store`.
    pub fn new(store: &'a S, units: &'a UnitRegistry) -> Self {
        Self { store, units }
    }

    /// Resolves the permission of `user` on `repo`. `None` is an anonymous caller.
    ///
    /// The only side effect is filling the unit cache of `repo`.
    pub fn resolve(&self, repo: &Repository, user: Option<&User>) -> Result<Permission> {
        let units = self.units.enabled_units(self.store, repo)?;

        let user = match user {
            Some(user) if !user.is_ghost() => user,
            _ => return Ok(Self::anonymous(repo, units)),
        };

        if user.is_site_admin() {
            tracing::debug!(repo = %repo.id, user = %user.id, "Site admin override");
            return Ok(Permission::owner(units, AccessSource::SiteAdmin));
        }

        let is_owner = match repo.owner {
            RepoOwner::User(owner) => owner == user.id,
            RepoOwner::Organization(org) => self.store.is_organization_owner(org, user.id)?,
        };
        if is_owner {
            tracing::debug!(repo = %repo.id, user = %user.id, "Owner access");
            return Ok(Permission::owner(units, AccessSource::Owner));
        }

        let mut access_mode = self
            .store
            .collaboration(repo.id, user.id)?
            .map(|collab| collab.mode)
            .unwrap_or_default();
        let mut modes: BTreeMap<UnitType, AccessMode> =
            units.iter().map(|unit| (*unit, access_mode)).collect();

        if let Some(org) = repo.owner.organization() {
            let teams = self.store.teams_with_access(org, repo.id, AccessMode::Read)?;
            for team in teams.iter().filter(|team| team.is_member(user.id)) {
                if team.includes_all_units() {
                    access_mode = access_mode.max(team.access_mode);
                }
                for (unit, mode) in modes.iter_mut() {
                    *mode = (*mode).max(team.unit_access_mode(*unit));
                }
            }
        }

        if !repo.is_private() {
            access_mode = access_mode.max(AccessMode::Read);
            for mode in modes.values_mut() {
                *mode = (*mode).max(AccessMode::Read);
            }
        }

        let permission =
            Permission::from_unit_modes(access_mode, units, modes, AccessSource::Granted);
        tracing::debug!(
            repo = %repo.id,
            user = %user.id,
            permission = %permission,
            "Resolved permission"
        );
        Ok(permission)
    }

    /// Builds the [`Actor`] of `user` for branch evaluation on `repo`.
    ///
    /// Team memberships are those of teams with read access to the
    /// repository, which are the only teams a whitelist can hold.
    pub fn actor(&self, repo: &Repository, user: &User) -> Result<Actor> {
        let mut teams = BTreeSet::new();
        if let Some(org) = repo.owner.organization() {
            if !user.is_ghost() {
                teams = self
                    .store
                    .teams_with_access(org, repo.id, AccessMode::Read)?
                    .into_iter()
                    .filter(|team| team.is_member(user.id))
                    .map(|team| team.id)
                    .collect();
            }
        }
        Ok(Actor::user(user.id).with_teams(teams))
    }

    fn anonymous(repo: &Repository, units: BTreeSet<UnitType>) -> Permission {
        let mode = if repo.is_private() {
            AccessMode::None
        } else {
            AccessMode::Read
        };
        Permission::new(mode, units, AccessSource::Anonymous)
    }
}
