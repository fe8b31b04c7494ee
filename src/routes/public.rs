use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints reachable without a session: registration, login, the liveness
/// probe, and the read surface. Category and thread reads accept an optional
/// session so private-section members see their categories, while anonymous
/// visitors get the public board.
pub fn public_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // GET /health
        .route("/health", get(handlers::health))
        // POST /auth/register
        // Creates the account and opens its first session.
        .route("/auth/register", post(handlers::register))
        // POST /auth/login
        .route("/auth/login", post(handlers::login))
        // GET /categories/{slug}
        // Visibility-gated category lookup.
        .route("/categories/{slug}", get(handlers::get_category))
        // GET /threads/{id}
        // Thread with posts; bumps the view counter.
        .route("/threads/{id}", get(handlers::view_thread))
}
