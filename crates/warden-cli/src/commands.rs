//! CLI command implementations.

use serde::Serialize;
use std::path::Path;
use thiserror::Error;
use warden_auth::{
    AccessReader, Actor, AuthConfig, AuthError, AuthStore, BranchAction,
    BranchProtectionEvaluator, BranchRuleStore, InMemoryRefs, MergeRequest, Permission,
    PermissionResolver, ProtectedBranchRule, ProtectedBranchService, Review, ReviewState,
    UnitRegistry,
};
use warden_types::{AccessMode, Repository, UnitType, User};

use crate::fixture::{Fixture, Site};

/// CLI errors.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid fixture: {0}")]
    Fixture(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Unknown {kind} '{name}'")]
    Unknown { kind: &'static str, name: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

pub type Result<T> = std::result::Result<T, CliError>;

/// Everything a command needs: the loaded site and the auth settings.
pub struct Context {
    pub site: Site,
    pub config: AuthConfig,
    pub units: UnitRegistry,
    pub json: bool,
}

impl Context {
    /// Loads the configuration and builds the site from `fixture`.
    pub fn load(fixture: &Path, config: Option<&Path>, json: bool) -> Result<Self> {
        let config = AuthConfig::load(config)?;
        let units = UnitRegistry::from_config(&config);
        let site = Fixture::load(fixture)?.build(&config)?;
        Ok(Self {
            site,
            config,
            units,
            json,
        })
    }

    fn resolver(&self) -> PermissionResolver<'_, AuthStore> {
        PermissionResolver::new(&self.site.store, &self.units)
    }

    fn service(&self) -> ProtectedBranchService<'_, AuthStore, InMemoryRefs> {
        ProtectedBranchService::new(&self.site.store, &self.site.refs, &self.config)
    }

    fn user(&self, name: Option<&str>) -> Result<Option<User>> {
        name.map(|name| self.site.user(name)).transpose()
    }

    fn print<T: Serialize>(&self, value: &T, text: impl FnOnce() -> String) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            println!("{}", text());
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct UnitReport {
    unit: UnitType,
    mode: AccessMode,
    read: bool,
    write: bool,
}

#[derive(Serialize)]
struct PermissionReport<'a> {
    repository: &'a str,
    user: Option<&'a str>,
    /// Level recorded in the access table, absent for anonymous callers.
    stored_access: Option<AccessMode>,
    permission: &'a Permission,
    units: Vec<UnitReport>,
}

/// Show the permission of a user (or an anonymous caller) on a repository.
pub fn permission(ctx: &Context, repo: &str, user: Option<&str>) -> Result<()> {
    let repository = ctx.site.repository(repo)?;
    let account = ctx.user(user)?;
    let perm = ctx.resolver().resolve(&repository, account.as_ref())?;
    let stored_access = account
        .as_ref()
        .map(|account| ctx.site.store.access_level(repository.id, account.id))
        .transpose()?;

    let report = PermissionReport {
        repository: repo,
        user,
        stored_access,
        units: perm
            .units()
            .map(|unit| UnitReport {
                unit,
                mode: perm.unit_access_mode(unit),
                read: perm.can_read(unit),
                write: perm.can_write(unit),
            })
            .collect(),
        permission: &perm,
    };

    ctx.print(&report, || {
        let mut out = format!("{} as {}: {}", repo, user.unwrap_or("anonymous"), perm);
        if let Some(stored) = report.stored_access {
            out.push_str(&format!(" (access table: {stored})"));
        }
        for unit in &report.units {
            out.push_str(&format!(
                "\n  {:<16} {:<6} read={} write={}",
                unit.unit.key(),
                unit.mode,
                unit.read,
                unit.write
            ));
        }
        out
    })
}

/// Options of a push check.
#[derive(Debug, Default)]
pub struct PushOptions {
    pub deploy_key: bool,
    pub force: bool,
    pub delete: bool,
    pub files: Vec<String>,
}

/// Decide whether a push (or force-push, or deletion) to a branch is allowed.
pub fn check_push(
    ctx: &Context,
    repo: &str,
    branch: &str,
    user: &str,
    opts: PushOptions,
) -> Result<bool> {
    if opts.force && opts.delete {
        return Err(CliError::InvalidArgument(
            "--force and --delete are mutually exclusive".to_string(),
        ));
    }

    let action = if opts.delete {
        BranchAction::Delete
    } else if opts.force {
        BranchAction::ForcePush {
            changed_files: opts.files,
        }
    } else {
        BranchAction::Push {
            changed_files: opts.files,
        }
    };

    let repository = ctx.site.repository(repo)?;
    let account = ctx.site.user(user)?;
    let mut actor = ctx.resolver().actor(&repository, &account)?;
    actor.deploy_key = opts.deploy_key;

    evaluate(ctx, &repository, branch, &account, &actor, &action)
}

/// Options of a merge check.
#[derive(Debug, Default)]
pub struct MergeOptions {
    pub head: String,
    /// Reviews as `user=state` or `user=state@commit`, oldest first.
    pub reviews: Vec<String>,
    pub behind: bool,
    pub unsigned: bool,
    pub files: Vec<String>,
}

/// Decide whether a pull request may be merged into a branch.
pub fn check_merge(
    ctx: &Context,
    repo: &str,
    branch: &str,
    user: &str,
    opts: MergeOptions,
) -> Result<bool> {
    let repository = ctx.site.repository(repo)?;
    let account = ctx.site.user(user)?;
    let actor = ctx.resolver().actor(&repository, &account)?;
    let rule = ctx.site.store.protected_branch(repository.id, branch)?;

    let mut reviews = Vec::with_capacity(opts.reviews.len());
    for spec in &opts.reviews {
        let (name, state, commit) = parse_review(spec, &opts.head)?;
        let reviewer = ctx.site.user(name)?;
        let reviewer_actor = ctx.resolver().actor(&repository, &reviewer)?;
        let mut review = Review::new(reviewer_actor, state, commit);
        if let Some(rule) = &rule {
            let perm = ctx.resolver().resolve(&repository, Some(&reviewer))?;
            review.official = rule.is_user_official_reviewer(&review.reviewer, &perm);
        }
        reviews.push(review);
    }

    let request = MergeRequest {
        statuses: ctx.site.store.commit_statuses(repository.id, &opts.head),
        head_commit_id: opts.head,
        reviews,
        head_behind_base: opts.behind,
        head_signature_verified: !opts.unsigned,
        changed_files: opts.files,
    };

    evaluate(ctx, &repository, branch, &account, &actor, &BranchAction::Merge(request))
}

fn evaluate(
    ctx: &Context,
    repository: &Repository,
    branch: &str,
    account: &User,
    actor: &Actor,
    action: &BranchAction,
) -> Result<bool> {
    let perm = ctx.resolver().resolve(repository, Some(account))?;
    let rule = ctx.site.store.protected_branch(repository.id, branch)?;
    let decision = BranchProtectionEvaluator::new(&perm, rule.as_ref()).evaluate(actor, action);

    ctx.print(&decision, || {
        format!("{} {} on {}: {}", account.name, action.name(), branch, decision)
    })?;
    Ok(decision.is_allowed())
}

fn parse_review<'a>(spec: &'a str, head: &'a str) -> Result<(&'a str, ReviewState, &'a str)> {
    let invalid = || {
        CliError::InvalidArgument(format!("review '{spec}', expected user=state[@commit]"))
    };
    let (name, rest) = spec.split_once('=').ok_or_else(invalid)?;
    let (state, commit) = rest.split_once('@').unwrap_or((rest, head));
    let state = state.parse().map_err(CliError::InvalidArgument)?;
    if name.is_empty() {
        return Err(invalid());
    }
    Ok((name, state, commit))
}

/// Suggest required status check contexts for a branch.
pub fn contexts(ctx: &Context, repo: &str, branch: &str) -> Result<()> {
    let repository = ctx.site.repository(repo)?;
    let contexts = ctx.service().suggested_status_contexts(&repository, branch)?;
    ctx.print(&contexts, || {
        if contexts.is_empty() {
            "No recent status contexts".to_string()
        } else {
            contexts.join("\n")
        }
    })
}

#[derive(Serialize)]
struct RulesReport {
    protected: Vec<ProtectedBranchRule>,
    unprotected: Vec<String>,
}

/// List protected and unprotected branches of a repository.
pub fn rules(ctx: &Context, repo: &str) -> Result<()> {
    let repository = ctx.site.repository(repo)?;
    let service = ctx.service();
    let branches = ctx.site.refs.branches(repository.id);
    let report = RulesReport {
        protected: service.list(&repository)?,
        unprotected: service.unprotected_branches(&repository, &branches)?,
    };

    ctx.print(&report, || {
        let mut out = String::from("Protected branches:");
        for rule in &report.protected {
            out.push_str(&format!(
                "\n  {} (push: {}, approvals: {}, status checks: {})",
                rule.branch_name,
                if !rule.can_push {
                    "disabled"
                } else if rule.push_whitelist.enabled {
                    "whitelist"
                } else {
                    "all"
                },
                rule.required_approvals,
                rule.status_check_contexts.join(", ")
            ));
        }
        out.push_str("\nUnprotected branches:");
        for branch in &report.unprotected {
            out.push_str(&format!("\n  {branch}"));
        }
        out
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SITE: &str = r#"
users:
  - name: alice
  - name: bob
  - name: carol
  - name: dave
organizations:
  - name: acme
    owner: alice
    members:
      bob: member
      carol: member
      dave: member
    teams:
      - name: devs
        mode: write
        members: [bob, carol, dave]
        repos: [api]
repositories:
  - owner: acme
    name: api
    visibility: private
    branches: [main, dev]
    protected_branches:
      main:
        push_mode: whitelist
        push_whitelist_users: [alice]
        required_approvals: 2
        enable_status_check: true
        status_check_contexts: [ci/build]
    statuses:
      - commit: head1
        context: ci/build
        state: success
"#;

    fn context() -> (tempfile::TempDir, Context) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("site.yaml");
        std::fs::write(&path, SITE).unwrap();
        let missing = dir.path().join("auth.yaml");
        let ctx = Context::load(&path, Some(&missing), false).unwrap();
        (dir, ctx)
    }

    #[test]
    fn test_parse_review() {
        assert_eq!(
            parse_review("bob=approved", "h").unwrap(),
            ("bob", ReviewState::Approved, "h")
        );
        assert_eq!(
            parse_review("bob=reject@old", "h").unwrap(),
            ("bob", ReviewState::ChangesRequested, "old")
        );
        assert!(parse_review("bob", "h").is_err());
        assert!(parse_review("=approved", "h").is_err());
        assert!(parse_review("bob=lgtm", "h").is_err());
    }

    #[test]
    fn test_check_push() {
        let (_dir, ctx) = context();
        assert!(check_push(&ctx, "acme/api", "main", "alice", PushOptions::default()).unwrap());
        assert!(!check_push(&ctx, "acme/api", "main", "bob", PushOptions::default()).unwrap());
        assert!(check_push(&ctx, "acme/api", "dev", "bob", PushOptions::default()).unwrap());

        let opts = PushOptions {
            force: true,
            delete: true,
            ..PushOptions::default()
        };
        assert!(matches!(
            check_push(&ctx, "acme/api", "dev", "bob", opts),
            Err(CliError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_check_merge() {
        let (_dir, ctx) = context();
        let opts = |reviews: &[&str]| MergeOptions {
            head: "head1".into(),
            reviews: reviews.iter().map(|r| r.to_string()).collect(),
            ..MergeOptions::default()
        };

        assert!(!check_merge(&ctx, "acme/api", "main", "bob", opts(&["carol=approved"])).unwrap());
        assert!(check_merge(
            &ctx,
            "acme/api",
            "main",
            "alice",
            opts(&["carol=approved", "dave=approved"])
        )
        .unwrap());
        assert!(!check_merge(
            &ctx,
            "acme/api",
            "main",
            "alice",
            opts(&["carol=approved", "dave=reject"])
        )
        .unwrap());

        let mut unreported = opts(&["carol=approved", "dave=approved"]);
        unreported.head = "head2".into();
        assert!(!check_merge(&ctx, "acme/api", "main", "alice", unreported).unwrap());
    }

    #[test]
    fn test_unknown_repository() {
        let (_dir, ctx) = context();
        assert!(matches!(
            permission(&ctx, "acme/web", Some("bob")),
            Err(CliError::Unknown { kind: "repository", .. })
        ));
        assert!(permission(&ctx, "acme/api", None).is_ok());
        assert!(permission(&ctx, "acme/api", Some("bob")).is_ok());
        assert!(contexts(&ctx, "acme/api", "main").is_ok());
        assert!(rules(&ctx, "acme/api").is_ok());
    }
}
