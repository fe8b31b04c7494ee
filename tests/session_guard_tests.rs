use agora_forum::{
    AppConfig, AppState, create_router,
    memory::MemoryRepository,
    models::Role,
    repository::{Repository, RepositoryState},
};
use std::sync::Arc;
use tokio::net::TcpListener;
use uuid::Uuid;

// --- Test App Bootstrap ---

struct TestApp {
    address: String,
    repo: RepositoryState,
    general_id: Uuid,
}

async fn spawn_app() -> TestApp {
    let repo = Arc::new(MemoryRepository::new()) as RepositoryState;
    let general = repo
        .insert_category("general", "General Discussion", "", false, 1)
        .await
        .expect("Failed to seed category");

    let state = AppState::new(repo.clone(), AppConfig::default());
    let router = create_router(state);

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    TestApp {
        address,
        repo,
        general_id: general.id,
    }
}

/// Registers an account and returns (session token, csrf token, user id).
async fn register(
    client: &reqwest::Client,
    app: &TestApp,
    username: &str,
) -> (String, String, Uuid) {
    let response = client
        .post(format!("{}/auth/register", app.address))
        .json(&serde_json::json!({
            "username": username,
            "email": format!("{username}@test.com"),
            "password": "correct horse battery staple",
        }))
        .send()
        .await
        .expect("register failed");
    assert_eq!(response.status(), 201);
    let body: serde_json::Value = response.json().await.unwrap();
    let token = body["token"].as_str().unwrap().to_string();
    let csrf = body["csrf_token"].as_str().unwrap().to_string();
    let user_id = Uuid::parse_str(body["user"]["id"].as_str().unwrap()).unwrap();
    (token, csrf, user_id)
}

async fn error_kind(response: reqwest::Response) -> String {
    let body: serde_json::Value = response.json().await.unwrap();
    body["error"]["kind"].as_str().unwrap_or_default().to_string()
}

// --- Tests ---

#[tokio::test]
async fn test_health_check() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let response = client
        .get(format!("{}/health", app.address))
        .send()
        .await
        .expect("req fail");
    assert!(response.status().is_success());
}

#[tokio::test]
async fn test_register_and_login_lifecycle() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let (token, csrf, _user_id) = register(&client, &app, "alice").await;
    assert!(!token.is_empty());
    assert!(!csrf.is_empty());

    // Duplicate email conflicts.
    let response = client
        .post(format!("{}/auth/register", app.address))
        .json(&serde_json::json!({
            "username": "alice2",
            "email": "alice@test.com",
            "password": "correct horse battery staple",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 409);
    assert_eq!(error_kind(response).await, "conflict");

    // Correct credentials log in.
    let response = client
        .post(format!("{}/auth/login", app.address))
        .json(&serde_json::json!({
            "email": "alice@test.com",
            "password": "correct horse battery staple",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    // Wrong password does not, and does not say why.
    let response = client
        .post(format!("{}/auth/login", app.address))
        .json(&serde_json::json!({
            "email": "alice@test.com",
            "password": "wrong password entirely",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);
    assert_eq!(error_kind(response).await, "unauthenticated");
}

#[tokio::test]
async fn test_state_changes_require_the_antiforgery_token() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let (token, csrf, user_id) = register(&client, &app, "alice").await;
    app.repo.set_user_role(user_id, Role::Member).await.unwrap();

    let thread_body = serde_json::json!({
        "category_id": app.general_id,
        "title": "CSRF check",
        "body": "token protocol",
    });

    // Valid session, no token: refused before any business logic.
    let response = client
        .post(format!("{}/threads", app.address))
        .bearer_auth(&token)
        .json(&thread_body)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);
    assert_eq!(error_kind(response).await, "forbidden_csrf");

    // Valid session, wrong token: same refusal.
    let response = client
        .post(format!("{}/threads", app.address))
        .bearer_auth(&token)
        .header("x-csrf-token", "not-the-token")
        .json(&thread_body)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);
    assert_eq!(error_kind(response).await, "forbidden_csrf");

    // Nothing was created by the refused attempts.
    let category = app.repo.find_category(app.general_id).await.unwrap().unwrap();
    assert_eq!(category.thread_count, 0);

    // The token is retrievable over a safe read, which needs no token itself.
    let response = client
        .get(format!("{}/auth/csrf", app.address))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let fetched: serde_json::Value = response.json().await.unwrap();
    assert_eq!(fetched["csrf_token"].as_str().unwrap(), csrf);

    // With the matching token the write goes through.
    let response = client
        .post(format!("{}/threads", app.address))
        .bearer_auth(&token)
        .header("x-csrf-token", &csrf)
        .json(&thread_body)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);
}

#[tokio::test]
async fn test_ban_takes_effect_on_the_next_request() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let (token, _csrf, user_id) = register(&client, &app, "alice").await;

    // The session works before the ban.
    let response = client
        .get(format!("{}/auth/csrf", app.address))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    // Ban lands mid-session.
    app.repo.set_user_banned(user_id, "spam").await.unwrap();

    // The very next request is refused Forbidden and the session destroyed.
    let response = client
        .get(format!("{}/auth/csrf", app.address))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);
    assert_eq!(error_kind(response).await, "forbidden");

    // The session id is gone now: the follow-up is plain Unauthenticated.
    let response = client
        .get(format!("{}/auth/csrf", app.address))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);

    // Logging in again is refused too.
    let response = client
        .post(format!("{}/auth/login", app.address))
        .json(&serde_json::json!({
            "email": "alice@test.com",
            "password": "correct horse battery staple",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);
}

#[tokio::test]
async fn test_logout_destroys_the_session() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let (token, _csrf, _user_id) = register(&client, &app, "alice").await;

    let response = client
        .post(format!("{}/auth/logout", app.address))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let response = client
        .get(format!("{}/auth/csrf", app.address))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);
}

#[tokio::test]
async fn test_category_visibility_over_http() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    app.repo
        .insert_category("lounge", "Members Lounge", "", true, 2)
        .await
        .unwrap();

    // Public category, anonymous: fine.
    let response = client
        .get(format!("{}/categories/general", app.address))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    // Private category, anonymous: refused.
    let response = client
        .get(format!("{}/categories/lounge", app.address))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);

    // Unknown slug: not found.
    let response = client
        .get(format!("{}/categories/nowhere", app.address))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);

    // Granted user: visible.
    let (token, _csrf, user_id) = register(&client, &app, "alice").await;
    app.repo.grant_private_access(user_id).await.unwrap();
    let response = client
        .get(format!("{}/categories/lounge", app.address))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_new_member_cannot_start_threads() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let (token, csrf, _user_id) = register(&client, &app, "rookie").await;

    // Fresh accounts are new_member; the write is a role denial, not a
    // token problem.
    let response = client
        .post(format!("{}/threads", app.address))
        .bearer_auth(&token)
        .header("x-csrf-token", &csrf)
        .json(&serde_json::json!({
            "category_id": app.general_id,
            "title": "too soon",
            "body": "not yet",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);
    assert_eq!(error_kind(response).await, "forbidden");
}

#[tokio::test]
async fn test_admin_ban_flow_end_to_end() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let (admin_token, admin_csrf, admin_id) = register(&client, &app, "admin").await;
    app.repo
        .set_user_role(admin_id, Role::Administrator)
        .await
        .unwrap();
    let (victim_token, _victim_csrf, victim_id) = register(&client, &app, "victim").await;

    // Administrator bans the account through the API.
    let response = client
        .post(format!("{}/admin/users/{}/ban", app.address, victim_id))
        .bearer_auth(&admin_token)
        .header("x-csrf-token", &admin_csrf)
        .json(&serde_json::json!({ "reason": "repeated spam" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    // The victim's pre-existing session dies on its next use.
    let response = client
        .get(format!("{}/auth/csrf", app.address))
        .bearer_auth(&victim_token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);

    // The action is on the audit trail.
    let response = client
        .get(format!("{}/admin/audit", app.address))
        .bearer_auth(&admin_token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let entries: serde_json::Value = response.json().await.unwrap();
    let entries = entries.as_array().unwrap();
    assert!(
        entries
            .iter()
            .any(|e| e["action"] == "user_banned"
                && e["target_user_id"].as_str() == Some(&victim_id.to_string()))
    );
}

#[tokio::test]
async fn test_moderation_endpoints_refuse_plain_members() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let (token, csrf, user_id) = register(&client, &app, "alice").await;
    app.repo.set_user_role(user_id, Role::Member).await.unwrap();

    let response = client
        .delete(format!("{}/admin/posts/{}", app.address, Uuid::new_v4()))
        .bearer_auth(&token)
        .header("x-csrf-token", &csrf)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);
    assert_eq!(error_kind(response).await, "forbidden");

    let response = client
        .get(format!("{}/admin/audit", app.address))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);
}

#[tokio::test]
async fn test_role_elevation_rules_over_http() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let (mod_token, mod_csrf, mod_id) = register(&client, &app, "themod").await;
    app.repo.set_user_role(mod_id, Role::Moderator).await.unwrap();
    let (_user_token, _user_csrf, user_id) = register(&client, &app, "alice").await;

    // A moderator may promote a new member to member...
    let response = client
        .put(format!("{}/admin/users/{}/role", app.address, user_id))
        .bearer_auth(&mod_token)
        .header("x-csrf-token", &mod_csrf)
        .json(&serde_json::json!({ "role": "member" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    // ...but handing out moderator takes an administrator.
    let response = client
        .put(format!("{}/admin/users/{}/role", app.address, user_id))
        .bearer_auth(&mod_token)
        .header("x-csrf-token", &mod_csrf)
        .json(&serde_json::json!({ "role": "moderator" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);

    // Account bans too.
    let response = client
        .post(format!("{}/admin/users/{}/ban", app.address, user_id))
        .bearer_auth(&mod_token)
        .header("x-csrf-token", &mod_csrf)
        .json(&serde_json::json!({ "reason": "nope" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);
}
