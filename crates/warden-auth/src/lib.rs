//! Authorization core for Warden.
//!
//! This crate provides:
//! - **Permissions**: per-unit access of a user on a repository, resolved
//!   from ownership, collaborations, organization teams and visibility
//! - **Organizations and teams**: group-based, unit-scoped access
//! - **Collaborators**: direct repository access grants
//! - **Branch protection**: rules and an evaluator for push, force-push,
//!   delete and merge
//! - **Rule lifecycle**: protecting and unprotecting branches
//!
//! # Example
//!
//! ```
//! use warden_auth::{
//!     Actor, AuthConfig, AuthStore, BranchAction, BranchProtectionEvaluator,
//!     BranchRuleStore, InMemoryRefs, PermissionResolver, ProtectBranchRequest,
//!     ProtectedBranchService, PushMode, UnitRegistry,
//! };
//! use warden_types::{RepoOwner, UnitType, Visibility};
//!
//! let store = AuthStore::new();
//! let alice = store.create_user("alice", false).unwrap();
//! let bob = store.create_user("bob", false).unwrap();
//! let repo = store
//!     .create_repository(RepoOwner::User(alice.id), "api", Visibility::Private, &UnitType::DEFAULTS)
//!     .unwrap();
//! store.add_collaborator(repo.id, bob.id).unwrap();
//!
//! // Bob collaborates with the default write mode
//! let units = UnitRegistry::default();
//! let resolver = PermissionResolver::new(&store, &units);
//! let perm = resolver.resolve(&repo, Some(&bob)).unwrap();
//! assert!(perm.can_write(UnitType::Code));
//!
//! // Protect main so that only alice may push
//! let refs = InMemoryRefs::new();
//! refs.create_branch(repo.id, "main");
//! let config = AuthConfig::default();
//! let service = ProtectedBranchService::new(&store, &refs, &config);
//! let request = ProtectBranchRequest {
//!     push_mode: PushMode::Whitelist,
//!     push_whitelist_users: vec!["alice".into()],
//!     ..Default::default()
//! };
//! service.protect(&repo, "main", &request).unwrap();
//!
//! let rule = store.protected_branch(repo.id, "main").unwrap();
//! let evaluator = BranchProtectionEvaluator::new(&perm, rule.as_ref());
//! let push = BranchAction::Push { changed_files: vec![] };
//! assert!(!evaluator.evaluate(&Actor::user(bob.id), &push).is_allowed());
//! ```

mod actor;
mod backend;
mod collaborator;
mod config;
mod error;
mod evaluator;
mod git;
mod lifecycle;
mod organization;
mod permission;
mod protected_branch;
mod resolver;
mod review;
mod store;
mod team;
mod unit;

pub use actor::Actor;
pub use backend::{AccessReader, BranchRuleStore, GitOracle};
pub use collaborator::Collaboration;
pub use config::{AuthConfig, DEFAULT_STATUS_CONTEXT_WINDOW_SECS, ENV_PREFIX};
pub use error::{AuthError, Result};
pub use evaluator::{
    AllowPath, BranchAction, BranchProtectionEvaluator, Decision, DenyReason, MergeRequest,
};
pub use git::InMemoryRefs;
pub use lifecycle::{ProtectBranchRequest, ProtectedBranchService, PushMode, WhitelistCandidates};
pub use organization::{OrgMember, OrgRole, Organization};
pub use permission::{AccessSource, Permission};
pub use protected_branch::{
    FilePatterns, ProtectedBranchRule, Whitelist, WhitelistMatch, FILE_PATTERN_SEPARATOR,
};
pub use resolver::PermissionResolver;
pub use review::{CommitStatus, Review, ReviewState, StatusState};
pub use store::AuthStore;
pub use team::Team;
pub use unit::UnitRegistry;
