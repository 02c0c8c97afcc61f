//! Protected branch rules.

use glob::{MatchOptions, Pattern};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use warden_types::{unix_now, RepoId, TeamId, UnitType, UserId};

use crate::{
    actor::Actor,
    error::{AuthError, Result},
    permission::Permission,
};

/// Separator of file patterns at the configuration boundary.
pub const FILE_PATTERN_SEPARATOR: char = ';';

const FILE_MATCH: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// How an actor matched a whitelist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "by", content = "team")]
pub enum WhitelistMatch {
    /// The user is listed directly.
    User,
    /// The user belongs to a listed team.
    Team(TeamId),
}

/// An allow-list of users and teams.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Whitelist {
    /// Whether the whitelist is enforced.
    pub enabled: bool,
    /// Whitelisted users.
    #[serde(default)]
    pub user_ids: BTreeSet<UserId>,
    /// Whitelisted teams.
    #[serde(default)]
    pub team_ids: BTreeSet<TeamId>,
}

impl Whitelist {
    /// A disabled, empty whitelist.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// An enabled whitelist with the given members.
    pub fn enabled(
        users: impl IntoIterator<Item = UserId>,
        teams: impl IntoIterator<Item = TeamId>,
    ) -> Self {
        Self {
            enabled: true,
            user_ids: users.into_iter().collect(),
            team_ids: teams.into_iter().collect(),
        }
    }

    /// Matches `actor` against the members. The ghost user never matches.
    ///
    /// Membership is checked regardless of `enabled`; callers decide
    /// whether the whitelist applies.
    pub fn find(&self, actor: &Actor) -> Option<WhitelistMatch> {
        if actor.is_ghost() {
            return None;
        }
        if self.user_ids.contains(&actor.user_id) {
            return Some(WhitelistMatch::User);
        }
        self.team_ids
            .intersection(&actor.teams)
            .next()
            .map(|team| WhitelistMatch::Team(*team))
    }

    /// Returns true if `actor` is a member.
    pub fn contains(&self, actor: &Actor) -> bool {
        self.find(actor).is_some()
    }
}

/// Glob patterns over repository-relative, `/`-separated paths.
///
/// Matching is case-sensitive and `*` never crosses a `/`; use `**` to
/// span directories.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FilePatterns(Vec<Pattern>);

impl FilePatterns {
    /// Parses a `;`-separated pattern list. Blank entries are ignored.
    pub fn parse(spec: &str) -> Result<Self> {
        spec.split(FILE_PATTERN_SEPARATOR)
            .map(str::trim)
            .filter(|expr| !expr.is_empty())
            .map(|expr| {
                Pattern::new(expr).map_err(|e| {
                    AuthError::InvalidArgument(format!("file pattern '{expr}': {e}"))
                })
            })
            .collect::<Result<Vec<_>>>()
            .map(Self)
    }

    /// Returns true if no pattern is configured.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The individual pattern strings.
    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(Pattern::as_str)
    }

    /// Returns true if any pattern matches `path`.
    pub fn matches(&self, path: &str) -> bool {
        let path = path.trim_start_matches('/');
        self.0.iter().any(|p| p.matches_with(path, FILE_MATCH))
    }
}

impl fmt::Display for FilePatterns {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, pattern) in self.patterns().enumerate() {
            if i > 0 {
                write!(f, "{FILE_PATTERN_SEPARATOR}")?;
            }
            f.write_str(pattern)?;
        }
        Ok(())
    }
}

impl TryFrom<String> for FilePatterns {
    type Error = AuthError;

    fn try_from(spec: String) -> Result<Self> {
        Self::parse(&spec)
    }
}

impl From<FilePatterns> for String {
    fn from(patterns: FilePatterns) -> Self {
        patterns.to_string()
    }
}

/// Protection policy for one branch of one repository.
///
/// A branch without a rule is unprotected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectedBranchRule {
    /// Unique rule ID, assigned by the store.
    pub id: u64,
    /// Repository the rule belongs to.
    pub repo_id: RepoId,
    /// Protected branch name.
    pub branch_name: String,
    /// Whether pushing is allowed at all.
    pub can_push: bool,
    /// Who may push when enabled.
    pub push_whitelist: Whitelist,
    /// Whether deploy keys may push when the push whitelist is enabled.
    pub whitelist_deploy_keys: bool,
    /// Who may merge when enabled.
    pub merge_whitelist: Whitelist,
    /// Whether required status checks are enforced.
    pub enable_status_check: bool,
    /// Checks that must report success before merging, in configuration order.
    pub status_check_contexts: Vec<String>,
    /// Minimum number of approving reviews.
    pub required_approvals: u32,
    /// Whose approvals count when enabled.
    pub approvals_whitelist: Whitelist,
    /// Block merging while a reviewer requests changes.
    pub block_on_rejected_reviews: bool,
    /// Block merging while official review requests are pending.
    pub block_on_official_review_requests: bool,
    /// Ignore approvals given on a commit other than the head.
    pub dismiss_stale_approvals: bool,
    /// Require a verified signature on the head commit.
    pub require_signed_commits: bool,
    /// Block merging while the head branch is behind the base.
    pub block_on_outdated_branch: bool,
    /// Paths no push may touch.
    pub protected_file_patterns: FilePatterns,
    /// Paths exempt from the protected patterns.
    pub unprotected_file_patterns: FilePatterns,
    /// When the rule was created (Unix timestamp).
    pub created_at: u64,
    /// When the rule was last updated (Unix timestamp).
    pub updated_at: u64,
}

impl ProtectedBranchRule {
    /// A rule with default settings: pushing disabled, every whitelist
    /// disabled, no required approvals or checks.
    pub fn new(repo_id: RepoId, branch_name: impl Into<String>) -> Self {
        let now = unix_now();
        Self {
            id: 0,
            repo_id,
            branch_name: branch_name.into(),
            can_push: false,
            push_whitelist: Whitelist::disabled(),
            whitelist_deploy_keys: false,
            merge_whitelist: Whitelist::disabled(),
            enable_status_check: false,
            status_check_contexts: Vec::new(),
            required_approvals: 0,
            approvals_whitelist: Whitelist::disabled(),
            block_on_rejected_reviews: false,
            block_on_official_review_requests: false,
            dismiss_stale_approvals: false,
            require_signed_commits: false,
            block_on_outdated_branch: false,
            protected_file_patterns: FilePatterns::default(),
            unprotected_file_patterns: FilePatterns::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns true if this rule was persisted.
    pub fn is_persisted(&self) -> bool {
        self.id != 0
    }

    /// Returns true if `actor` passes the push gate of this rule.
    pub fn can_user_push(&self, actor: &Actor, perm: &Permission) -> bool {
        if !self.can_push {
            return false;
        }
        if !self.push_whitelist.enabled {
            return perm.can_write(UnitType::Code);
        }
        if actor.deploy_key {
            return self.whitelist_deploy_keys && !actor.is_ghost();
        }
        self.push_whitelist.contains(actor)
    }

    /// Returns true if `actor` passes the merge gate of this rule.
    ///
    /// Without a merge whitelist the push whitelist applies, and without
    /// either, write access to the code.
    pub fn is_user_merge_whitelisted(&self, actor: &Actor, perm: &Permission) -> bool {
        if self.merge_whitelist.enabled {
            return self.merge_whitelist.contains(actor);
        }
        if self.push_whitelist.enabled {
            return self.push_whitelist.contains(actor);
        }
        perm.can_write(UnitType::Code)
    }

    /// Returns true if approvals of `actor` count toward the required approvals.
    ///
    /// Without an approvals whitelist every reviewer with write access to
    /// the code is an official reviewer.
    pub fn is_user_official_reviewer(&self, actor: &Actor, perm: &Permission) -> bool {
        if actor.is_ghost() {
            return false;
        }
        if !self.approvals_whitelist.enabled {
            return perm.can_write(UnitType::Code);
        }
        self.approvals_whitelist.contains(actor)
    }

    /// Returns true if approvals of `actor` are eligible under the approvals whitelist.
    pub fn is_eligible_approver(&self, actor: &Actor) -> bool {
        if !self.approvals_whitelist.enabled {
            return !actor.is_ghost();
        }
        self.approvals_whitelist.contains(actor)
    }

    /// Returns true if required status checks apply.
    pub fn requires_status_checks(&self) -> bool {
        self.enable_status_check && !self.status_check_contexts.is_empty()
    }

    /// Returns true if `context` must succeed before merging.
    pub fn is_status_context_required(&self, context: &str) -> bool {
        self.enable_status_check && self.status_check_contexts.iter().any(|c| c == context)
    }

    /// Returns true if `path` matches a protected file pattern.
    pub fn is_protected_file(&self, path: &str) -> bool {
        self.protected_file_patterns.matches(path)
    }

    /// Returns true if `path` matches an unprotected file pattern.
    pub fn is_unprotected_file(&self, path: &str) -> bool {
        self.unprotected_file_patterns.matches(path)
    }

    /// Paths among `changed` that are protected and not exempted.
    pub fn blocked_files<'a>(&self, changed: impl IntoIterator<Item = &'a str>) -> Vec<String> {
        if self.protected_file_patterns.is_empty() {
            return Vec::new();
        }
        changed
            .into_iter()
            .filter(|path| self.is_protected_file(path) && !self.is_unprotected_file(path))
            .map(str::to_string)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permission::AccessSource;
    use warden_types::AccessMode;

    fn writer() -> Permission {
        Permission::new(AccessMode::Write, UnitType::ALL, AccessSource::Granted)
    }

    fn reader() -> Permission {
        Permission::new(AccessMode::Read, UnitType::ALL, AccessSource::Granted)
    }

    #[test]
    fn test_default_rule() {
        let rule = ProtectedBranchRule::new(RepoId(1), "main");
        assert!(!rule.is_persisted());
        assert!(!rule.can_push);
        assert!(!rule.push_whitelist.enabled);
        assert_eq!(rule.required_approvals, 0);
        assert!(!rule.requires_status_checks());
        assert!(!rule.can_user_push(&Actor::user(UserId(1)), &writer()));
    }

    #[test]
    fn test_whitelist_membership() {
        let list = Whitelist::enabled([UserId(2), UserId(-1)], [TeamId(7)]);
        assert_eq!(list.find(&Actor::user(UserId(2))), Some(WhitelistMatch::User));
        assert_eq!(
            list.find(&Actor::user(UserId(3)).with_teams([TeamId(5), TeamId(7)])),
            Some(WhitelistMatch::Team(TeamId(7)))
        );
        assert_eq!(list.find(&Actor::user(UserId(3))), None);
        assert_eq!(list.find(&Actor::user(UserId(-1)).with_teams([TeamId(7)])), None);
    }

    #[test]
    fn test_can_user_push() {
        let mut rule = ProtectedBranchRule::new(RepoId(1), "main");
        rule.can_push = true;
        assert!(rule.can_user_push(&Actor::user(UserId(1)), &writer()));
        assert!(!rule.can_user_push(&Actor::user(UserId(1)), &reader()));

        rule.push_whitelist = Whitelist::enabled([UserId(2)], []);
        assert!(!rule.can_user_push(&Actor::user(UserId(1)), &writer()));
        assert!(rule.can_user_push(&Actor::user(UserId(2)), &reader()));

        assert!(!rule.can_user_push(&Actor::via_deploy_key(UserId(2)), &writer()));
        rule.whitelist_deploy_keys = true;
        assert!(rule.can_user_push(&Actor::via_deploy_key(UserId(9)), &reader()));
    }

    #[test]
    fn test_official_reviewer() {
        let mut rule = ProtectedBranchRule::new(RepoId(1), "main");
        assert!(rule.is_user_official_reviewer(&Actor::user(UserId(1)), &writer()));
        assert!(!rule.is_user_official_reviewer(&Actor::user(UserId(1)), &reader()));

        rule.approvals_whitelist = Whitelist::enabled([], [TeamId(3)]);
        assert!(!rule.is_user_official_reviewer(&Actor::user(UserId(1)), &writer()));
        assert!(rule.is_user_official_reviewer(
            &Actor::user(UserId(1)).with_teams([TeamId(3)]),
            &reader()
        ));
    }

    #[test]
    fn test_file_patterns_parse() {
        let patterns = FilePatterns::parse(" .github/** ; *.lock;; ").unwrap();
        assert_eq!(patterns.patterns().collect::<Vec<_>>(), vec![".github/**", "*.lock"]);
        assert_eq!(patterns.to_string(), ".github/**;*.lock");
        assert!(FilePatterns::parse("").unwrap().is_empty());
        assert!(matches!(
            FilePatterns::parse("src/[a"),
            Err(AuthError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_file_patterns_match() {
        let patterns = FilePatterns::parse("*.lock;docs/**;config/*.yaml").unwrap();
        assert!(patterns.matches("Cargo.lock"));
        assert!(!patterns.matches("sub/Cargo.lock"));
        assert!(patterns.matches("docs/a/b.md"));
        assert!(patterns.matches("config/app.yaml"));
        assert!(!patterns.matches("config/nested/app.yaml"));
        assert!(!patterns.matches("Config/app.yaml"));
        assert!(!patterns.matches("cargo.LOCK"));
    }

    #[test]
    fn test_blocked_files() {
        let mut rule = ProtectedBranchRule::new(RepoId(1), "main");
        assert!(rule.blocked_files(["anything"]).is_empty());

        rule.protected_file_patterns = FilePatterns::parse("deploy/**").unwrap();
        rule.unprotected_file_patterns = FilePatterns::parse("deploy/README.md").unwrap();
        let blocked = rule.blocked_files(["deploy/prod.yaml", "deploy/README.md", "src/lib.rs"]);
        assert_eq!(blocked, vec!["deploy/prod.yaml".to_string()]);
    }

    #[test]
    fn test_rule_serde_round_trip() {
        let mut rule = ProtectedBranchRule::new(RepoId(4), "release");
        rule.protected_file_patterns = FilePatterns::parse("*.toml;ci/**").unwrap();
        rule.push_whitelist = Whitelist::enabled([UserId(3)], [TeamId(2)]);

        let json = serde_json::to_value(&rule).unwrap();
        assert_eq!(json["protected_file_patterns"], "*.toml;ci/**");
        let back: ProtectedBranchRule = serde_json::from_value(json).unwrap();
        assert_eq!(back, rule);
    }
}
