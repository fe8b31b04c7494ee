use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Session Lifecycle Routes
///
/// Covered by the session guard but not the anti-forgery gate: fetching the
/// token is a safe read (and is how a client obtains it in the first place),
/// and logout destroys only the caller's own session — not a forgeable gain.
pub fn session_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // POST /auth/logout
        .route("/auth/logout", post(handlers::logout))
        // GET /auth/csrf
        // Returns the session-bound anti-forgery token.
        .route("/auth/csrf", get(handlers::get_csrf))
}

/// Authenticated Forum Routes
///
/// Routes for any logged-in user. The session guard runs as a router layer
/// above this module, and the anti-forgery middleware covers every
/// state-changing method here; a missing or mismatched `x-csrf-token` header
/// is refused before the handler runs.
pub fn forum_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // POST /threads
        // Starts a thread; role >= member, grant required in private categories.
        .route("/threads", post(handlers::create_thread))
        // POST /threads/{id}/posts
        // Replies to an unlocked thread.
        .route("/threads/{id}/posts", post(handlers::create_post))
        // POST /access-requests
        // Applies for the restricted section.
        .route("/access-requests", post(handlers::submit_access_request))
}
