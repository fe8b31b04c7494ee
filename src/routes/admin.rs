use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{delete, get, post, put},
};

/// Admin Router Module
///
/// Moderation and administration surface, nested under `/admin`. The session
/// guard and anti-forgery middleware run as router layers above this module;
/// the role checks themselves (moderator for content and review operations,
/// administrator for account bans and elevated role grants) live in the
/// handlers, next to the capability predicates.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // DELETE /admin/posts/{id}
        // Moderator removal of a single post, with counter settlement.
        .route("/posts/{id}", delete(handlers::delete_post))
        // DELETE /admin/threads/{id}
        // Cascade removal of a thread and its posts.
        .route("/threads/{id}", delete(handlers::delete_thread))
        // PUT /admin/threads/{id}/flags
        // Pin or lock a thread.
        .route("/threads/{id}/flags", put(handlers::set_thread_flags))
        // GET /admin/access-requests
        // The pending review queue.
        .route("/access-requests", get(handlers::list_access_requests))
        // POST /admin/access-requests/{id}/decision
        // Approve or reject a pending private-access request.
        .route(
            "/access-requests/{id}/decision",
            post(handlers::decide_access_request),
        )
        // PUT /admin/users/{id}/role
        .route("/users/{id}/role", put(handlers::set_user_role))
        // POST /admin/users/{id}/ban
        // Administrator-only account ban; takes effect on the target's next request.
        .route("/users/{id}/ban", post(handlers::ban_user))
        // POST /admin/ip-bans
        .route("/ip-bans", post(handlers::ban_ip))
        // GET /admin/audit
        // The append-only moderation trail, newest first.
        .route("/audit", get(handlers::audit_log))
        // POST /admin/reconcile
        // Out-of-band counter repair.
        .route("/reconcile", post(handlers::reconcile))
}
