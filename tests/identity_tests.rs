use agora_forum::{
    error::ApiError,
    identity::IdentityStore,
    memory::MemoryRepository,
    models::Role,
    repository::{Repository, RepositoryState},
};
use chrono::{Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

fn setup() -> (RepositoryState, IdentityStore) {
    let repo = Arc::new(MemoryRepository::new()) as RepositoryState;
    let identity = IdentityStore::new(repo.clone());
    (repo, identity)
}

const PASSWORD: &str = "correct horse battery staple";

#[tokio::test]
async fn test_register_creates_a_new_member_with_hashed_credential() {
    let (_repo, identity) = setup();

    let user = identity
        .register("alice", "alice@test.com", PASSWORD, None)
        .await
        .unwrap();

    assert_eq!(user.role, Role::NewMember);
    assert!(!user.banned);
    assert!(!user.has_private_access);
    assert_eq!(user.thread_count, 0);
    assert_eq!(user.post_count, 0);
    // The credential is stored as an opaque hash, never the plaintext.
    assert_ne!(user.password_hash, PASSWORD);
    assert!(user.password_hash.starts_with("$argon2"));

    // And it round-trips through authentication.
    let authed = identity.authenticate("alice@test.com", PASSWORD).await.unwrap();
    assert_eq!(authed.id, user.id);
}

#[tokio::test]
async fn test_register_rejects_duplicates() {
    let (_repo, identity) = setup();
    identity
        .register("alice", "alice@test.com", PASSWORD, None)
        .await
        .unwrap();

    let err = identity
        .register("alice2", "alice@test.com", PASSWORD, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Conflict(_)));

    let err = identity
        .register("alice", "other@test.com", PASSWORD, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Conflict(_)));
}

#[tokio::test]
async fn test_register_input_validation() {
    let (_repo, identity) = setup();

    // Too-short username.
    let err = identity
        .register("ab", "ab@test.com", PASSWORD, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));

    // Forbidden characters.
    let err = identity
        .register("not ok!", "spaced@test.com", PASSWORD, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));

    // Unparseable email.
    let err = identity
        .register("charlie", "not-an-email", PASSWORD, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));

    // Short password.
    let err = identity
        .register("charlie", "charlie@test.com", "short", None)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));
}

#[tokio::test]
async fn test_authenticate_does_not_reveal_which_part_failed() {
    let (_repo, identity) = setup();
    identity
        .register("alice", "alice@test.com", PASSWORD, None)
        .await
        .unwrap();

    let unknown = identity
        .authenticate("nobody@test.com", PASSWORD)
        .await
        .unwrap_err();
    let wrong = identity
        .authenticate("alice@test.com", "wrong password here")
        .await
        .unwrap_err();

    assert!(matches!(unknown, ApiError::Unauthenticated));
    assert!(matches!(wrong, ApiError::Unauthenticated));
}

#[tokio::test]
async fn test_banned_account_cannot_authenticate() {
    let (repo, identity) = setup();
    let user = identity
        .register("alice", "alice@test.com", PASSWORD, None)
        .await
        .unwrap();
    repo.set_user_banned(user.id, "spam").await.unwrap();

    let err = identity
        .authenticate("alice@test.com", PASSWORD)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Forbidden(_)));
}

#[tokio::test]
async fn test_ip_ban_blocks_registration_until_expiry() {
    let (_repo, identity) = setup();
    let moderator_id = Uuid::new_v4();

    identity
        .ban_ip("10.0.0.7", "sockpuppet farm", moderator_id, None)
        .await
        .unwrap();

    let err = identity
        .register("alice", "alice@test.com", PASSWORD, Some("10.0.0.7"))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Forbidden(_)));

    // A different address registers fine.
    identity
        .register("alice", "alice@test.com", PASSWORD, Some("10.0.0.8"))
        .await
        .unwrap();

    // An already-expired ban does not block.
    identity
        .ban_ip(
            "10.0.0.9",
            "old incident",
            moderator_id,
            Some(Utc::now() - Duration::hours(1)),
        )
        .await
        .unwrap();
    identity
        .register("bob", "bob@test.com", PASSWORD, Some("10.0.0.9"))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_ip_ban_requires_an_address() {
    let (_repo, identity) = setup();
    let err = identity
        .ban_ip("   ", "reason", Uuid::new_v4(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));
}

#[tokio::test]
async fn test_role_and_grant_mutations_hit_missing_users() {
    let (_repo, identity) = setup();

    let err = identity
        .set_role(Uuid::new_v4(), Role::Member)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));

    let err = identity
        .set_banned(Uuid::new_v4(), "reason")
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));

    let err = identity
        .grant_private_access(Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));
}
