use agora_forum::session::SessionStore;
use uuid::Uuid;

#[test]
fn test_create_resolve_destroy_roundtrip() {
    let store = SessionStore::new(24);
    let user_id = Uuid::new_v4();

    let (session_id, record) = store.create(user_id);
    assert_eq!(record.user_id, user_id);
    assert!(!record.csrf_token.is_empty());
    assert!(record.expires_at > record.created_at);

    let resolved = store.resolve(&session_id).expect("session should resolve");
    assert_eq!(resolved.user_id, user_id);
    assert_eq!(resolved.csrf_token, record.csrf_token);

    assert!(store.destroy(&session_id));
    assert!(store.resolve(&session_id).is_none());
    // Destroying twice is a no-op.
    assert!(!store.destroy(&session_id));
}

#[test]
fn test_session_ids_and_tokens_are_unique() {
    let store = SessionStore::new(24);
    let user_id = Uuid::new_v4();

    let (id_a, record_a) = store.create(user_id);
    let (id_b, record_b) = store.create(user_id);

    // Two logins for the same user are independent sessions.
    assert_ne!(id_a, id_b);
    assert_ne!(record_a.csrf_token, record_b.csrf_token);
    assert_eq!(store.len(), 2);

    // Destroying one leaves the other intact.
    store.destroy(&id_a);
    assert!(store.resolve(&id_b).is_some());
}

#[test]
fn test_expired_sessions_are_swept_on_resolve() {
    // Zero TTL: the session is born expired.
    let store = SessionStore::new(0);
    let (session_id, _record) = store.create(Uuid::new_v4());

    assert!(store.resolve(&session_id).is_none());
    // The sweep removed it entirely.
    assert!(store.is_empty());
}

#[test]
fn test_rotate_replaces_the_bound_token() {
    let store = SessionStore::new(24);
    let (session_id, record) = store.create(Uuid::new_v4());

    let rotated = store.rotate_csrf(&session_id).expect("session exists");
    assert_ne!(rotated, record.csrf_token);

    // The store now answers with the new token only.
    assert_eq!(store.csrf_token(&session_id), Some(rotated));

    // Rotating a destroyed session yields nothing.
    store.destroy(&session_id);
    assert!(store.rotate_csrf(&session_id).is_none());
    assert!(store.csrf_token(&session_id).is_none());
}
