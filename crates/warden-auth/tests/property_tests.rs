//! Property-based tests for permission resolution and branch evaluation.

use proptest::prelude::*;
use std::collections::BTreeMap;
use warden_auth::{
    AccessSource, Actor, AuthStore, BranchAction, BranchProtectionEvaluator, OrgRole, Permission,
    PermissionResolver, ProtectedBranchRule, UnitRegistry, Whitelist,
};
use warden_types::{AccessMode, RepoId, RepoOwner, TeamId, UnitType, User, UserId, Visibility};

fn mode_strategy() -> impl Strategy<Value = AccessMode> {
    prop::sample::select(AccessMode::ALL.to_vec())
}

fn unit_strategy() -> impl Strategy<Value = UnitType> {
    prop::sample::select(UnitType::ALL.to_vec())
}

fn units_strategy() -> impl Strategy<Value = Vec<UnitType>> {
    prop::collection::vec(unit_strategy(), 0..9)
}

fn unit_modes_strategy() -> impl Strategy<Value = BTreeMap<UnitType, AccessMode>> {
    prop::collection::btree_map(unit_strategy(), mode_strategy(), 0..9)
}

/// A team grant: coarse mode plus an optional unit map.
fn team_strategy() -> impl Strategy<Value = (AccessMode, Option<BTreeMap<UnitType, AccessMode>>)> {
    (mode_strategy(), prop::option::of(unit_modes_strategy()))
}

proptest! {
    /// Property: write access on a unit always implies read access
    #[test]
    fn prop_write_implies_read(
        coarse in mode_strategy(),
        units in units_strategy(),
        modes in unit_modes_strategy(),
    ) {
        let perm = Permission::from_unit_modes(coarse, units, modes, AccessSource::Granted);
        for unit in UnitType::ALL {
            if perm.can_write(unit) {
                prop_assert!(perm.can_read(unit));
            }
        }
    }

    /// Property: admin and owner read and write every enabled unit
    #[test]
    fn prop_admin_covers_enabled_units(
        mode in prop::sample::select(vec![AccessMode::Admin, AccessMode::Owner]),
        units in units_strategy(),
    ) {
        let perm = Permission::new(mode, units.clone(), AccessSource::Granted);
        for unit in UnitType::ALL {
            let enabled = units.contains(&unit);
            prop_assert_eq!(perm.can_read(unit), enabled);
            prop_assert_eq!(perm.can_write(unit), enabled);
        }
    }

    /// Property: resolved team access is the per-unit maximum of the grants
    #[test]
    fn prop_team_access_is_unit_maximum(
        teams in prop::collection::vec(team_strategy(), 1..4),
        collab in prop::option::of(mode_strategy()),
        private in any::<bool>(),
    ) {
        let store = AuthStore::new();
        let owner = store.create_user("owner", false).unwrap();
        let user = store.create_user("user", false).unwrap();
        let org = store.create_organization("org", owner.id).unwrap();
        store.add_org_member(org.id, user.id, OrgRole::Member).unwrap();
        let visibility = if private { Visibility::Private } else { Visibility::Public };
        let repo = store
            .create_repository(
                RepoOwner::Organization(org.id),
                "repo",
                visibility,
                &UnitType::DEFAULTS,
            )
            .unwrap();

        let mut grants = Vec::new();
        for (i, (mode, units)) in teams.into_iter().enumerate() {
            let team = store.create_team(org.id, format!("team-{i}"), mode).unwrap();
            let team = store.update_team_access(team.id, mode, units).unwrap();
            store.add_team_member(team.id, user.id).unwrap();
            store.add_team_repo(team.id, repo.id).unwrap();
            grants.push(team);
        }
        if let Some(mode) = collab {
            store.add_collaborator(repo.id, user.id).unwrap();
            store.change_collaboration_mode(repo.id, user.id, mode).unwrap();
        }

        let registry = UnitRegistry::default();
        let perm = PermissionResolver::new(&store, &registry)
            .resolve(&repo, Some(&user))
            .unwrap();

        for unit in UnitType::DEFAULTS {
            let mut expected = collab.unwrap_or_default();
            for team in &grants {
                expected = expected.max(team.unit_access_mode(unit));
            }
            if !private {
                expected = expected.max(AccessMode::Read);
            }
            prop_assert_eq!(perm.unit_access_mode(unit), expected);
        }
    }

    /// Property: a rule with pushing disabled denies every push, whoever asks
    #[test]
    fn prop_push_disabled_denies_everyone(
        mode in mode_strategy(),
        user in -1i64..50,
        deploy_key in any::<bool>(),
        whitelisted in any::<bool>(),
    ) {
        let mut rule = ProtectedBranchRule::new(RepoId(1), "main");
        if whitelisted {
            rule.push_whitelist = Whitelist::enabled([UserId(user)], [TeamId(1)]);
            rule.whitelist_deploy_keys = true;
        }
        let perm = Permission::new(mode, UnitType::ALL, AccessSource::Granted);
        let actor = Actor {
            user_id: UserId(user),
            teams: [TeamId(1)].into_iter().collect(),
            deploy_key,
        };

        let evaluator = BranchProtectionEvaluator::new(&perm, Some(&rule));
        for action in [
            BranchAction::Push { changed_files: Vec::new() },
            BranchAction::ForcePush { changed_files: Vec::new() },
            BranchAction::Delete,
        ] {
            prop_assert!(!evaluator.evaluate(&actor, &action).is_allowed());
        }
    }

    /// Property: without a rule, pushing follows write access to the code
    #[test]
    fn prop_unprotected_push_follows_code_write(
        coarse in mode_strategy(),
        units in units_strategy(),
        modes in unit_modes_strategy(),
    ) {
        let perm = Permission::from_unit_modes(coarse, units, modes, AccessSource::Granted);
        let decision = BranchProtectionEvaluator::new(&perm, None)
            .evaluate(&Actor::user(UserId(7)), &BranchAction::Push { changed_files: Vec::new() });
        prop_assert_eq!(decision.is_allowed(), perm.can_write(UnitType::Code));
    }

    /// Property: the ghost user is never granted more than public read
    #[test]
    fn prop_ghost_never_elevated(private in any::<bool>(), admin in any::<bool>()) {
        let store = AuthStore::new();
        let owner = store.create_user("owner", false).unwrap();
        let visibility = if private { Visibility::Private } else { Visibility::Public };
        let repo = store
            .create_repository(RepoOwner::User(owner.id), "repo", visibility, &UnitType::DEFAULTS)
            .unwrap();
        let mut ghost = User::ghost();
        ghost.is_admin = admin;

        let registry = UnitRegistry::default();
        let perm = PermissionResolver::new(&store, &registry)
            .resolve(&repo, Some(&ghost))
            .unwrap();
        for unit in UnitType::ALL {
            prop_assert!(!perm.can_write(unit));
            prop_assert_eq!(perm.can_read(unit), !private && UnitType::DEFAULTS.contains(&unit));
        }
    }
}
