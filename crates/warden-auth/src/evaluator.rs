//! Branch protection evaluation.
//!
//! The evaluator is a pure function of its inputs: a resolved
//! [`Permission`], the rule protecting the target branch (if any), the
//! [`Actor`] and the proposed [`BranchAction`]. It never touches storage
//! and never fails; every denial carries the reasons behind it.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use warden_types::{TeamId, UnitType, UserId};

use crate::{
    actor::Actor,
    permission::Permission,
    protected_branch::{ProtectedBranchRule, WhitelistMatch},
    review::{CommitStatus, Review, ReviewState},
};

/// State of a pull request at merge time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeRequest {
    /// Current head commit of the pull request.
    pub head_commit_id: String,
    /// Review entries, oldest first.
    pub reviews: Vec<Review>,
    /// Statuses reported on the head commit, oldest first.
    pub statuses: Vec<CommitStatus>,
    /// The head branch is behind the merge target.
    pub head_behind_base: bool,
    /// The head commit carries a verified signature.
    pub head_signature_verified: bool,
    /// Repository-relative paths changed by the pull request.
    pub changed_files: Vec<String>,
}

/// A proposed change to a branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "action")]
pub enum BranchAction {
    /// Fast-forward push.
    Push {
        /// Paths changed by the pushed commits.
        #[serde(default)]
        changed_files: Vec<String>,
    },
    /// Non-fast-forward push.
    ForcePush {
        /// Paths changed by the pushed commits.
        #[serde(default)]
        changed_files: Vec<String>,
    },
    /// Branch deletion.
    Delete,
    /// Pull request merge.
    Merge(MergeRequest),
}

impl BranchAction {
    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            BranchAction::Push { .. } => "push",
            BranchAction::ForcePush { .. } => "force_push",
            BranchAction::Delete => "delete",
            BranchAction::Merge(_) => "merge",
        }
    }
}

/// Which path allowed an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "path", content = "team")]
pub enum AllowPath {
    /// No rule protects the branch and the actor can write code.
    Unprotected,
    /// The rule defers to write access on the code.
    CodeWrite,
    /// The actor is on the push whitelist.
    PushWhitelistUser,
    /// The actor belongs to a team on the push whitelist.
    PushWhitelistTeam(TeamId),
    /// Deploy keys are whitelisted.
    DeployKey,
    /// The actor is on the merge whitelist.
    MergeWhitelistUser,
    /// The actor belongs to a team on the merge whitelist.
    MergeWhitelistTeam(TeamId),
}

/// Why an action was denied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum DenyReason {
    /// The actor cannot write to the code unit.
    NoWriteAccess,
    /// The rule disables pushing.
    PushDisabled,
    /// The actor is not on the applicable whitelist.
    NotWhitelisted,
    /// The change touches protected files.
    ProtectedFiles {
        /// Offending paths.
        files: Vec<String>,
    },
    /// Not enough approvals.
    InsufficientApprovals {
        /// Counted approvals.
        granted: u32,
        /// Required approvals.
        required: u32,
    },
    /// Reviewers request changes.
    RejectedReviews {
        /// Reviewers whose latest review requests changes.
        reviewers: Vec<UserId>,
    },
    /// Official review requests are still open.
    OfficialReviewsPending {
        /// Official reviewers who have not reviewed yet.
        reviewers: Vec<UserId>,
    },
    /// Required checks did not report success.
    StatusChecksFailed {
        /// Required contexts that are missing or not successful.
        contexts: Vec<String>,
    },
    /// The head commit signature does not verify.
    UnsignedCommit,
    /// The head branch is behind the base.
    OutdatedBranch,
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenyReason::NoWriteAccess => write!(f, "no write access to code"),
            DenyReason::PushDisabled => write!(f, "pushing is disabled on this branch"),
            DenyReason::NotWhitelisted => write!(f, "not whitelisted"),
            DenyReason::ProtectedFiles { files } => {
                write!(f, "protected files changed: {}", files.join(", "))
            }
            DenyReason::InsufficientApprovals { granted, required } => {
                write!(f, "insufficient approvals ({granted} of {required})")
            }
            DenyReason::RejectedReviews { reviewers } => {
                write!(f, "changes requested by {} reviewer(s)", reviewers.len())
            }
            DenyReason::OfficialReviewsPending { reviewers } => {
                write!(f, "{} official review request(s) pending", reviewers.len())
            }
            DenyReason::StatusChecksFailed { contexts } => {
                write!(f, "required status checks not successful: {}", contexts.join(", "))
            }
            DenyReason::UnsignedCommit => write!(f, "head commit is not signed"),
            DenyReason::OutdatedBranch => write!(f, "head branch is behind the base branch"),
        }
    }
}

/// Outcome of an evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "decision")]
pub enum Decision {
    /// The action may proceed.
    Allowed {
        /// Which path allowed it.
        via: AllowPath,
    },
    /// The action is refused.
    Denied {
        /// Every failing condition, in evaluation order.
        reasons: Vec<DenyReason>,
    },
}

impl Decision {
    fn deny(reason: DenyReason) -> Self {
        Decision::Denied {
            reasons: vec![reason],
        }
    }

    /// Returns true if the action may proceed.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed { .. })
    }

    /// Path that allowed the action.
    pub fn allow_path(&self) -> Option<AllowPath> {
        match self {
            Decision::Allowed { via } => Some(*via),
            Decision::Denied { .. } => None,
        }
    }

    /// Reasons of a denial; empty when allowed.
    pub fn reasons(&self) -> &[DenyReason] {
        match self {
            Decision::Allowed { .. } => &[],
            Decision::Denied { reasons } => reasons,
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Allowed { via } => write!(f, "allowed ({via:?})"),
            Decision::Denied { reasons } => {
                write!(f, "denied")?;
                for (i, reason) in reasons.iter().enumerate() {
                    write!(f, "{} {reason}", if i == 0 { ":" } else { ";" })?;
                }
                Ok(())
            }
        }
    }
}

/// Evaluates branch-scoped actions for one permission and one rule.
#[derive(Debug, Clone, Copy)]
pub struct BranchProtectionEvaluator<'a> {
    permission: &'a Permission,
    rule: Option<&'a ProtectedBranchRule>,
}

impl<'a> BranchProtectionEvaluator<'a> {
    /// An evaluator for `rule`; `None` means the branch is unprotected.
    pub fn new(permission: &'a Permission, rule: Option<&'a ProtectedBranchRule>) -> Self {
        Self { permission, rule }
    }

    /// Decides whether `actor` may perform `action`.
    pub fn evaluate(&self, actor: &Actor, action: &BranchAction) -> Decision {
        let decision = match action {
            BranchAction::Push { changed_files } | BranchAction::ForcePush { changed_files } => {
                self.evaluate_push(actor, changed_files)
            }
            BranchAction::Delete => self.evaluate_push(actor, &[]),
            BranchAction::Merge(request) => self.evaluate_merge(actor, request),
        };

        tracing::debug!(
            user = %actor.user_id,
            action = action.name(),
            protected = self.rule.is_some(),
            allowed = decision.is_allowed(),
            "Evaluated branch action"
        );

        decision
    }

    /// Push, force-push and delete share one gate.
    pub fn evaluate_push(&self, actor: &Actor, changed_files: &[String]) -> Decision {
        let Some(rule) = self.rule else {
            return self.code_write(AllowPath::Unprotected);
        };

        let via = match self.push_gate(rule, actor) {
            Ok(via) => via,
            Err(reason) => return Decision::deny(reason),
        };

        let blocked = rule.blocked_files(changed_files.iter().map(String::as_str));
        if !blocked.is_empty() {
            return Decision::deny(DenyReason::ProtectedFiles { files: blocked });
        }

        Decision::Allowed { via }
    }

    /// Whitelist gate first, then every merge condition.
    pub fn evaluate_merge(&self, actor: &Actor, request: &MergeRequest) -> Decision {
        let Some(rule) = self.rule else {
            return self.code_write(AllowPath::Unprotected);
        };

        let via = match self.merge_gate(rule, actor) {
            Ok(via) => via,
            Err(reason) => return Decision::deny(reason),
        };

        let mut reasons = Vec::new();
        let standings = latest_standings(&request.reviews);

        let granted = standings
            .values()
            .filter(|review| review.state == ReviewState::Approved)
            .filter(|review| rule.is_eligible_approver(&review.reviewer))
            .filter(|review| {
                !(rule.dismiss_stale_approvals && review.is_stale(&request.head_commit_id))
            })
            .count();
        let granted = u32::try_from(granted).unwrap_or(u32::MAX);
        if granted < rule.required_approvals {
            reasons.push(DenyReason::InsufficientApprovals {
                granted,
                required: rule.required_approvals,
            });
        }

        if rule.block_on_rejected_reviews {
            let reviewers = reviewers_in_state(&standings, ReviewState::ChangesRequested, false);
            if !reviewers.is_empty() {
                reasons.push(DenyReason::RejectedReviews { reviewers });
            }
        }

        if rule.block_on_official_review_requests {
            let reviewers = reviewers_in_state(&standings, ReviewState::Requested, true);
            if !reviewers.is_empty() {
                reasons.push(DenyReason::OfficialReviewsPending { reviewers });
            }
        }

        if rule.requires_status_checks() {
            let contexts = failing_contexts(rule, &request.statuses);
            if !contexts.is_empty() {
                reasons.push(DenyReason::StatusChecksFailed { contexts });
            }
        }

        if rule.require_signed_commits && !request.head_signature_verified {
            reasons.push(DenyReason::UnsignedCommit);
        }

        if rule.block_on_outdated_branch && request.head_behind_base {
            reasons.push(DenyReason::OutdatedBranch);
        }

        let blocked = rule.blocked_files(request.changed_files.iter().map(String::as_str));
        if !blocked.is_empty() {
            reasons.push(DenyReason::ProtectedFiles { files: blocked });
        }

        if reasons.is_empty() {
            Decision::Allowed { via }
        } else {
            Decision::Denied { reasons }
        }
    }

    fn code_write(&self, via: AllowPath) -> Decision {
        if self.permission.can_write(UnitType::Code) {
            Decision::Allowed { via }
        } else {
            Decision::deny(DenyReason::NoWriteAccess)
        }
    }

    fn push_gate(
        &self,
        rule: &ProtectedBranchRule,
        actor: &Actor,
    ) -> Result<AllowPath, DenyReason> {
        if !rule.can_push {
            return Err(DenyReason::PushDisabled);
        }
        self.push_whitelist_gate(rule, actor)
    }

    fn push_whitelist_gate(
        &self,
        rule: &ProtectedBranchRule,
        actor: &Actor,
    ) -> Result<AllowPath, DenyReason> {
        if !rule.push_whitelist.enabled {
            return if self.permission.can_write(UnitType::Code) {
                Ok(AllowPath::CodeWrite)
            } else {
                Err(DenyReason::NoWriteAccess)
            };
        }
        if actor.deploy_key {
            return if rule.whitelist_deploy_keys && !actor.is_ghost() {
                Ok(AllowPath::DeployKey)
            } else {
                Err(DenyReason::NotWhitelisted)
            };
        }
        match rule.push_whitelist.find(actor) {
            Some(WhitelistMatch::User) => Ok(AllowPath::PushWhitelistUser),
            Some(WhitelistMatch::Team(team)) => Ok(AllowPath::PushWhitelistTeam(team)),
            None => Err(DenyReason::NotWhitelisted),
        }
    }

    /// The merge whitelist when enabled, otherwise the push whitelist step.
    ///
    /// The push-disabled lockdown does not apply to merges: a branch that
    /// only accepts pull requests must stay mergeable.
    fn merge_gate(
        &self,
        rule: &ProtectedBranchRule,
        actor: &Actor,
    ) -> Result<AllowPath, DenyReason> {
        if !rule.merge_whitelist.enabled {
            return self.push_whitelist_gate(rule, actor);
        }
        match rule.merge_whitelist.find(actor) {
            Some(WhitelistMatch::User) => Ok(AllowPath::MergeWhitelistUser),
            Some(WhitelistMatch::Team(team)) => Ok(AllowPath::MergeWhitelistTeam(team)),
            None => Err(DenyReason::NotWhitelisted),
        }
    }
}

/// Latest decisive review of each reviewer. Dismissed reviews cancel the
/// reviewer's standing.
fn latest_standings(reviews: &[Review]) -> HashMap<UserId, &Review> {
    let mut standings = HashMap::new();
    for review in reviews.iter().filter(|r| r.is_decisive()) {
        if review.state == ReviewState::Dismissed {
            standings.remove(&review.reviewer.user_id);
        } else {
            standings.insert(review.reviewer.user_id, review);
        }
    }
    standings
}

fn reviewers_in_state(
    standings: &HashMap<UserId, &Review>,
    state: ReviewState,
    official_only: bool,
) -> Vec<UserId> {
    let reviewers: BTreeSet<UserId> = standings
        .iter()
        .filter(|(_, review)| review.state == state && (review.official || !official_only))
        .map(|(user, _)| *user)
        .collect();
    reviewers.into_iter().collect()
}

/// Required contexts whose latest reported state is not success.
fn failing_contexts(rule: &ProtectedBranchRule, statuses: &[CommitStatus]) -> Vec<String> {
    let mut latest: HashMap<&str, &CommitStatus> = HashMap::new();
    for status in statuses {
        latest.insert(status.context.as_str(), status);
    }
    rule.status_check_contexts
        .iter()
        .filter(|context| {
            !latest
                .get(context.as_str())
                .map(|status| status.state.is_success())
                .unwrap_or(false)
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permission::AccessSource;
    use crate::protected_branch::{FilePatterns, Whitelist};
    use crate::review::StatusState;
    use warden_types::{AccessMode, RepoId};

    const HEAD: &str = "c0ffee";

    fn perm(mode: AccessMode) -> Permission {
        Permission::new(mode, UnitType::DEFAULTS, AccessSource::Granted)
    }

    fn push() -> BranchAction {
        BranchAction::Push {
            changed_files: Vec::new(),
        }
    }

    fn rule() -> ProtectedBranchRule {
        let mut rule = ProtectedBranchRule::new(RepoId(1), "main");
        rule.id = 1;
        rule.can_push = true;
        rule
    }

    fn approve(user: i64, commit: &str) -> Review {
        Review::new(Actor::user(UserId(user)), ReviewState::Approved, commit)
    }

    fn merge_request(reviews: Vec<Review>) -> MergeRequest {
        MergeRequest {
            head_commit_id: HEAD.to_string(),
            reviews,
            head_signature_verified: true,
            ..MergeRequest::default()
        }
    }

    #[test]
    fn test_unprotected_push_follows_code_write() {
        let actor = Actor::user(UserId(2));
        let writer = perm(AccessMode::Write);
        let reader = perm(AccessMode::Read);

        let decision = BranchProtectionEvaluator::new(&writer, None).evaluate(&actor, &push());
        assert_eq!(decision.allow_path(), Some(AllowPath::Unprotected));

        let decision = BranchProtectionEvaluator::new(&reader, None).evaluate(&actor, &push());
        assert_eq!(decision.reasons(), &[DenyReason::NoWriteAccess]);
    }

    #[test]
    fn test_push_disabled_locks_out_owner() {
        let owner = Permission::owner(UnitType::DEFAULTS, AccessSource::Owner);
        let mut rule = rule();
        rule.can_push = false;
        let evaluator = BranchProtectionEvaluator::new(&owner, Some(&rule));

        for action in [
            push(),
            BranchAction::ForcePush {
                changed_files: Vec::new(),
            },
            BranchAction::Delete,
        ] {
            let decision = evaluator.evaluate(&Actor::user(UserId(1)), &action);
            assert_eq!(decision.reasons(), &[DenyReason::PushDisabled]);
        }
    }

    #[test]
    fn test_push_enabled_without_whitelist() {
        let rule = rule();
        let writer = perm(AccessMode::Write);
        let reader = perm(AccessMode::Read);
        let actor = Actor::user(UserId(3));

        let decision =
            BranchProtectionEvaluator::new(&writer, Some(&rule)).evaluate(&actor, &push());
        assert_eq!(decision.allow_path(), Some(AllowPath::CodeWrite));

        let decision =
            BranchProtectionEvaluator::new(&reader, Some(&rule)).evaluate(&actor, &push());
        assert!(!decision.is_allowed());
    }

    #[test]
    fn test_whitelist_overrides_write_access() {
        let mut rule = rule();
        rule.push_whitelist = Whitelist::enabled([UserId(5)], [TeamId(9)]);
        let reader = perm(AccessMode::Read);
        let writer = perm(AccessMode::Write);

        let decision = BranchProtectionEvaluator::new(&reader, Some(&rule))
            .evaluate(&Actor::user(UserId(5)), &push());
        assert_eq!(decision.allow_path(), Some(AllowPath::PushWhitelistUser));

        let decision = BranchProtectionEvaluator::new(&reader, Some(&rule))
            .evaluate(&Actor::user(UserId(6)).with_teams([TeamId(9)]), &push());
        assert_eq!(decision.allow_path(), Some(AllowPath::PushWhitelistTeam(TeamId(9))));

        let decision = BranchProtectionEvaluator::new(&writer, Some(&rule))
            .evaluate(&Actor::user(UserId(7)), &push());
        assert_eq!(decision.reasons(), &[DenyReason::NotWhitelisted]);
    }

    #[test]
    fn test_deploy_keys() {
        let mut rule = rule();
        rule.push_whitelist = Whitelist::enabled([UserId(5)], []);
        let writer = perm(AccessMode::Write);
        let evaluator = BranchProtectionEvaluator::new(&writer, Some(&rule));

        let decision = evaluator.evaluate(&Actor::via_deploy_key(UserId(5)), &push());
        assert_eq!(decision.reasons(), &[DenyReason::NotWhitelisted]);

        rule.whitelist_deploy_keys = true;
        let evaluator = BranchProtectionEvaluator::new(&writer, Some(&rule));
        let decision = evaluator.evaluate(&Actor::via_deploy_key(UserId(8)), &push());
        assert_eq!(decision.allow_path(), Some(AllowPath::DeployKey));
    }

    #[test]
    fn test_ghost_never_whitelisted() {
        let mut rule = rule();
        rule.push_whitelist = Whitelist::enabled([UserId(-1)], [TeamId(1)]);
        let owner = Permission::owner(UnitType::DEFAULTS, AccessSource::SiteAdmin);
        let ghost = Actor::user(UserId(-1)).with_teams([TeamId(1)]);

        let decision =
            BranchProtectionEvaluator::new(&owner, Some(&rule)).evaluate(&ghost, &push());
        assert!(!decision.is_allowed());
    }

    #[test]
    fn test_protected_files_deny_even_whitelisted() {
        let mut rule = rule();
        rule.push_whitelist = Whitelist::enabled([UserId(5)], []);
        rule.protected_file_patterns = FilePatterns::parse(".ci/**;*.lock").unwrap();
        rule.unprotected_file_patterns = FilePatterns::parse(".ci/notes.md").unwrap();
        let writer = perm(AccessMode::Write);
        let evaluator = BranchProtectionEvaluator::new(&writer, Some(&rule));
        let actor = Actor::user(UserId(5));

        let action = BranchAction::ForcePush {
            changed_files: vec!["src/main.rs".into(), ".ci/notes.md".into()],
        };
        assert!(evaluator.evaluate(&actor, &action).is_allowed());

        let action = BranchAction::Push {
            changed_files: vec![".ci/build.yaml".into(), "Cargo.lock".into()],
        };
        assert_eq!(
            evaluator.evaluate(&actor, &action).reasons(),
            &[DenyReason::ProtectedFiles {
                files: vec![".ci/build.yaml".into(), "Cargo.lock".into()]
            }]
        );
    }

    #[test]
    fn test_merge_required_approvals() {
        let mut rule = rule();
        rule.required_approvals = 2;
        let writer = perm(AccessMode::Write);
        let evaluator = BranchProtectionEvaluator::new(&writer, Some(&rule));
        let actor = Actor::user(UserId(1));

        let one = merge_request(vec![approve(2, HEAD), approve(2, HEAD)]);
        assert_eq!(
            evaluator.evaluate_merge(&actor, &one).reasons(),
            &[DenyReason::InsufficientApprovals {
                granted: 1,
                required: 2
            }]
        );

        let two = merge_request(vec![approve(2, HEAD), approve(3, HEAD)]);
        assert!(evaluator.evaluate_merge(&actor, &two).is_allowed());
    }

    #[test]
    fn test_stale_approvals_dismissed() {
        let mut rule = rule();
        rule.required_approvals = 1;
        let writer = perm(AccessMode::Write);
        let actor = Actor::user(UserId(1));
        let request = merge_request(vec![approve(2, "old")]);

        let evaluator = BranchProtectionEvaluator::new(&writer, Some(&rule));
        assert!(evaluator.evaluate_merge(&actor, &request).is_allowed());

        rule.dismiss_stale_approvals = true;
        let evaluator = BranchProtectionEvaluator::new(&writer, Some(&rule));
        assert!(!evaluator.evaluate_merge(&actor, &request).is_allowed());
    }

    #[test]
    fn test_approvals_whitelist_restricts_counting() {
        let mut rule = rule();
        rule.required_approvals = 1;
        rule.approvals_whitelist = Whitelist::enabled([], [TeamId(4)]);
        let writer = perm(AccessMode::Write);
        let evaluator = BranchProtectionEvaluator::new(&writer, Some(&rule));
        let actor = Actor::user(UserId(1));

        let outsider = merge_request(vec![approve(2, HEAD)]);
        assert!(!evaluator.evaluate_merge(&actor, &outsider).is_allowed());

        let member = merge_request(vec![Review::new(
            Actor::user(UserId(3)).with_teams([TeamId(4)]),
            ReviewState::Approved,
            HEAD,
        )]);
        assert!(evaluator.evaluate_merge(&actor, &member).is_allowed());
    }

    #[test]
    fn test_rejected_reviews_until_approved() {
        let mut rule = rule();
        rule.block_on_rejected_reviews = true;
        let writer = perm(AccessMode::Write);
        let evaluator = BranchProtectionEvaluator::new(&writer, Some(&rule));
        let actor = Actor::user(UserId(1));
        let reject = Review::new(Actor::user(UserId(2)), ReviewState::ChangesRequested, HEAD);
        let comment = Review::new(Actor::user(UserId(2)), ReviewState::Commented, HEAD);

        let request = merge_request(vec![reject.clone(), comment]);
        assert_eq!(
            evaluator.evaluate_merge(&actor, &request).reasons(),
            &[DenyReason::RejectedReviews {
                reviewers: vec![UserId(2)]
            }]
        );

        let request = merge_request(vec![reject, approve(2, HEAD)]);
        assert!(evaluator.evaluate_merge(&actor, &request).is_allowed());
    }

    #[test]
    fn test_official_review_requests() {
        let mut rule = rule();
        rule.block_on_official_review_requests = true;
        let writer = perm(AccessMode::Write);
        let evaluator = BranchProtectionEvaluator::new(&writer, Some(&rule));
        let actor = Actor::user(UserId(1));
        let request_review = |user: i64, official: bool| {
            let review = Review::new(Actor::user(UserId(user)), ReviewState::Requested, "");
            if official {
                review.official()
            } else {
                review
            }
        };

        let request = merge_request(vec![request_review(2, false)]);
        assert!(evaluator.evaluate_merge(&actor, &request).is_allowed());

        let request = merge_request(vec![request_review(3, true)]);
        assert_eq!(
            evaluator.evaluate_merge(&actor, &request).reasons(),
            &[DenyReason::OfficialReviewsPending {
                reviewers: vec![UserId(3)]
            }]
        );

        let request = merge_request(vec![request_review(3, true), approve(3, HEAD)]);
        assert!(evaluator.evaluate_merge(&actor, &request).is_allowed());
    }

    #[test]
    fn test_status_checks() {
        let mut rule = rule();
        rule.enable_status_check = true;
        rule.status_check_contexts = vec!["ci/build".into(), "ci/test".into()];
        let writer = perm(AccessMode::Write);
        let evaluator = BranchProtectionEvaluator::new(&writer, Some(&rule));
        let actor = Actor::user(UserId(1));

        let mut request = merge_request(Vec::new());
        request.statuses = vec![
            CommitStatus::new("ci/build", StatusState::Failure),
            CommitStatus::new("ci/build", StatusState::Success),
            CommitStatus::new("ci/lint", StatusState::Failure),
        ];
        assert_eq!(
            evaluator.evaluate_merge(&actor, &request).reasons(),
            &[DenyReason::StatusChecksFailed {
                contexts: vec!["ci/test".into()]
            }]
        );

        request
            .statuses
            .push(CommitStatus::new("ci/test", StatusState::Success));
        assert!(evaluator.evaluate_merge(&actor, &request).is_allowed());
    }

    #[test]
    fn test_merge_accumulates_reasons() {
        let mut rule = rule();
        rule.required_approvals = 1;
        rule.require_signed_commits = true;
        rule.block_on_outdated_branch = true;
        let writer = perm(AccessMode::Write);
        let evaluator = BranchProtectionEvaluator::new(&writer, Some(&rule));

        let request = MergeRequest {
            head_commit_id: HEAD.into(),
            head_behind_base: true,
            head_signature_verified: false,
            ..MergeRequest::default()
        };
        let decision = evaluator.evaluate_merge(&Actor::user(UserId(1)), &request);
        assert_eq!(
            decision.reasons(),
            &[
                DenyReason::InsufficientApprovals {
                    granted: 0,
                    required: 1
                },
                DenyReason::UnsignedCommit,
                DenyReason::OutdatedBranch,
            ]
        );
    }

    #[test]
    fn test_merge_whitelist_short_circuits() {
        let mut rule = rule();
        rule.required_approvals = 3;
        rule.merge_whitelist = Whitelist::enabled([UserId(4)], []);
        let owner = Permission::owner(UnitType::DEFAULTS, AccessSource::Owner);
        let evaluator = BranchProtectionEvaluator::new(&owner, Some(&rule));
        let request = merge_request(Vec::new());

        let decision = evaluator.evaluate_merge(&Actor::user(UserId(1)), &request);
        assert_eq!(decision.reasons(), &[DenyReason::NotWhitelisted]);

        let decision = evaluator.evaluate_merge(&Actor::user(UserId(4)), &request);
        assert_eq!(decision.reasons().len(), 1);
    }

    #[test]
    fn test_merge_on_push_disabled_branch() {
        let mut rule = rule();
        rule.can_push = false;
        let writer = perm(AccessMode::Write);
        let evaluator = BranchProtectionEvaluator::new(&writer, Some(&rule));
        let decision =
            evaluator.evaluate_merge(&Actor::user(UserId(1)), &merge_request(Vec::new()));
        assert_eq!(decision.allow_path(), Some(AllowPath::CodeWrite));
    }

    #[test]
    fn test_decision_display() {
        let decision = Decision::Denied {
            reasons: vec![
                DenyReason::InsufficientApprovals {
                    granted: 1,
                    required: 2,
                },
                DenyReason::OutdatedBranch,
            ],
        };
        assert_eq!(
            decision.to_string(),
            "denied: insufficient approvals (1 of 2); head branch is behind the base branch"
        );
    }
}
