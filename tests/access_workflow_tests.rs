use agora_forum::{
    audit::ModerationAudit,
    error::ApiError,
    memory::MemoryRepository,
    models::{ModerationAction, RequestOutcome, RequestStatus, Role, User},
    repository::{Repository, RepositoryState},
    requests::PrivateAccessWorkflow,
};
use std::sync::Arc;

// --- Test Context and Setup ---

struct TestContext {
    repo: RepositoryState,
    workflow: PrivateAccessWorkflow,
    audit: ModerationAudit,
}

impl TestContext {
    fn new() -> Self {
        let repo = Arc::new(MemoryRepository::new()) as RepositoryState;
        let audit = ModerationAudit::new(repo.clone());
        let workflow = PrivateAccessWorkflow::new(repo.clone(), audit.clone());
        TestContext {
            repo,
            workflow,
            audit,
        }
    }
}

async fn seed_user(repo: &RepositoryState, name: &str, role: Role) -> User {
    let user = repo
        .insert_user(name, &format!("{name}@test.com"), "irrelevant-hash")
        .await
        .expect("Failed to seed user");
    repo.set_user_role(user.id, role)
        .await
        .expect("Failed to set role");
    repo.find_user(user.id).await.unwrap().unwrap()
}

const GOOD_JUSTIFICATION: &str =
    "I have been an active member for a while and would like to join the lounge discussions.";

// --- Tests ---

#[tokio::test]
async fn test_justification_length_rule() {
    let ctx = TestContext::new();
    let user = seed_user(&ctx.repo, "alice", Role::Member).await;

    // 40 characters: rejected.
    let short = "x".repeat(40);
    let err = ctx.workflow.submit(&user, &short).await.unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));

    // 60 characters: accepted and pending.
    let long = "x".repeat(60);
    let request = ctx.workflow.submit(&user, &long).await.unwrap();
    assert_eq!(request.status, RequestStatus::Pending);
    assert_eq!(request.user_id, user.id);
}

#[tokio::test]
async fn test_single_pending_request_per_user() {
    let ctx = TestContext::new();
    let user = seed_user(&ctx.repo, "alice", Role::Member).await;

    ctx.workflow.submit(&user, GOOD_JUSTIFICATION).await.unwrap();

    // A second submit while the first is still pending conflicts.
    let err = ctx
        .workflow
        .submit(&user, GOOD_JUSTIFICATION)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Conflict(_)));
}

#[tokio::test]
async fn test_approval_grants_access_and_lands_in_audit() {
    let ctx = TestContext::new();
    let user = seed_user(&ctx.repo, "alice", Role::Member).await;
    let reviewer = seed_user(&ctx.repo, "mod", Role::Moderator).await;

    let request = ctx.workflow.submit(&user, GOOD_JUSTIFICATION).await.unwrap();
    let decided = ctx
        .workflow
        .decide(&reviewer, request.id, RequestOutcome::Approved, None)
        .await
        .unwrap();

    assert_eq!(decided.status, RequestStatus::Approved);
    assert_eq!(decided.reviewed_by, Some(reviewer.id));
    assert!(decided.reviewed_at.is_some());

    // The grant flipped as part of the same decision.
    let user_after = ctx.repo.find_user(user.id).await.unwrap().unwrap();
    assert!(user_after.has_private_access);

    // And the decision is on the trail, newest first.
    let entries = ctx.audit.list_recent(&reviewer, None).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].action, ModerationAction::AccessApproved);
    assert_eq!(entries[0].actor_id, reviewer.id);
    assert_eq!(entries[0].target_user_id, Some(user.id));
}

#[tokio::test]
async fn test_replaying_a_decision_fails_not_found() {
    let ctx = TestContext::new();
    let user = seed_user(&ctx.repo, "alice", Role::Member).await;
    let reviewer = seed_user(&ctx.repo, "mod", Role::Moderator).await;

    let request = ctx.workflow.submit(&user, GOOD_JUSTIFICATION).await.unwrap();
    ctx.workflow
        .decide(&reviewer, request.id, RequestOutcome::Approved, None)
        .await
        .unwrap();

    // The transition is terminal: a replay cannot re-apply it.
    let err = ctx
        .workflow
        .decide(&reviewer, request.id, RequestOutcome::Rejected, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));

    // The request still reads as approved.
    let stored = ctx
        .repo
        .find_access_request(request.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, RequestStatus::Approved);
}

#[tokio::test]
async fn test_resubmission_after_rejection_is_allowed() {
    let ctx = TestContext::new();
    let user = seed_user(&ctx.repo, "alice", Role::Member).await;
    let reviewer = seed_user(&ctx.repo, "mod", Role::Moderator).await;

    let first = ctx.workflow.submit(&user, GOOD_JUSTIFICATION).await.unwrap();
    let rejected = ctx
        .workflow
        .decide(&reviewer, first.id, RequestOutcome::Rejected, Some("too vague"))
        .await
        .unwrap();
    assert_eq!(rejected.status, RequestStatus::Rejected);

    // No grant was given.
    let user_after = ctx.repo.find_user(user.id).await.unwrap().unwrap();
    assert!(!user_after.has_private_access);

    // A fresh request goes back to pending.
    let second = ctx.workflow.submit(&user, GOOD_JUSTIFICATION).await.unwrap();
    assert_eq!(second.status, RequestStatus::Pending);
    assert_ne!(second.id, first.id);
}

#[tokio::test]
async fn test_submit_with_grant_already_held_conflicts() {
    let ctx = TestContext::new();
    let user = seed_user(&ctx.repo, "alice", Role::Member).await;
    ctx.repo.grant_private_access(user.id).await.unwrap();
    let user = ctx.repo.find_user(user.id).await.unwrap().unwrap();

    let err = ctx
        .workflow
        .submit(&user, GOOD_JUSTIFICATION)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Conflict(_)));
}

#[tokio::test]
async fn test_only_moderators_review() {
    let ctx = TestContext::new();
    let user = seed_user(&ctx.repo, "alice", Role::Member).await;
    let peer = seed_user(&ctx.repo, "bob", Role::Member).await;

    let request = ctx.workflow.submit(&user, GOOD_JUSTIFICATION).await.unwrap();

    let err = ctx
        .workflow
        .decide(&peer, request.id, RequestOutcome::Approved, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Forbidden(_)));

    let err = ctx.workflow.list_pending(&peer).await.unwrap_err();
    assert!(matches!(err, ApiError::Forbidden(_)));

    // The queue itself is intact and visible to a moderator.
    let reviewer = seed_user(&ctx.repo, "mod", Role::Moderator).await;
    let pending = ctx.workflow.list_pending(&reviewer).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, request.id);
}

#[tokio::test]
async fn test_audit_trail_is_ordered_newest_first_and_gated() {
    let ctx = TestContext::new();
    let reviewer = seed_user(&ctx.repo, "mod", Role::Moderator).await;
    let outsider = seed_user(&ctx.repo, "bob", Role::Member).await;

    for name in ["u1", "u2", "u3"] {
        let user = seed_user(&ctx.repo, name, Role::Member).await;
        let request = ctx.workflow.submit(&user, GOOD_JUSTIFICATION).await.unwrap();
        ctx.workflow
            .decide(&reviewer, request.id, RequestOutcome::Rejected, None)
            .await
            .unwrap();
    }

    let entries = ctx.audit.list_recent(&reviewer, Some(2)).await.unwrap();
    assert_eq!(entries.len(), 2);
    assert!(entries[0].created_at >= entries[1].created_at);

    let err = ctx.audit.list_recent(&outsider, None).await.unwrap_err();
    assert!(matches!(err, ApiError::Forbidden(_)));
}
