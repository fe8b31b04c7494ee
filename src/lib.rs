use axum::{
    Router,
    extract::{FromRef, Request, State},
    http::HeaderName,
    middleware::{self, Next},
    response::Response,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Core application services and components.
pub mod audit;
pub mod auth;
pub mod config;
pub mod content;
pub mod error;
pub mod handlers;
pub mod identity;
pub mod memory;
pub mod models;
pub mod policy;
pub mod repository;
pub mod requests;
pub mod session;

// Module for routing segregation (Public, Authenticated, Admin).
pub mod routes;
use routes::{admin, authenticated, public};

use audit::ModerationAudit;
use auth::AuthUser;
use content::ContentStore;
use error::ApiError;
use identity::IdentityStore;
use requests::PrivateAccessWorkflow;
use session::SessionStore;
use std::sync::Arc;

// --- Public Re-exports ---

// Makes core state types easily accessible to the application entry point
// and the integration tests.
pub use config::AppConfig;
pub use error::ApiResult;
pub use repository::{MemoryRepository, PostgresRepository, RepositoryState};
pub use session::SessionState;

/// ApiDoc
///
/// Auto-generates the OpenAPI documentation for the application from every
/// handler decorated with `#[utoipa::path]` and every schema type. Served as
/// JSON at `/api-docs/openapi.json`, browsable at `/swagger-ui`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health, handlers::register, handlers::login, handlers::get_category,
        handlers::view_thread, handlers::logout, handlers::get_csrf, handlers::create_thread,
        handlers::create_post, handlers::submit_access_request, handlers::delete_post,
        handlers::delete_thread, handlers::set_thread_flags, handlers::list_access_requests,
        handlers::decide_access_request,
        handlers::set_user_role, handlers::ban_user, handlers::ban_ip, handlers::audit_log,
        handlers::reconcile
    ),
    components(
        schemas(
            models::Role, models::RequestStatus, models::RequestOutcome, models::ModerationAction,
            models::Category, models::Thread, models::Post, models::ThreadView,
            models::PrivateAccessRequest, models::ModerationLogEntry, models::BannedIp,
            models::UserProfile, models::SessionResponse, models::CsrfTokenResponse,
            models::ReconciliationReport, models::RegisterRequest, models::LoginRequest,
            models::CreateThreadRequest, models::CreatePostRequest, models::AccessRequestPayload,
            models::DecisionRequest, models::SetRoleRequest, models::BanUserRequest,
            models::BanIpRequest, models::ThreadFlagsRequest,
        )
    ),
    tags(
        (name = "agora-forum", description = "Community discussion platform API")
    )
)]
struct ApiDoc;

/// AppState
///
/// The single, thread-safe container holding every application service and
/// the configuration, shared across all incoming requests. Components own
/// nothing ambient: each holds the injected repository handle.
#[derive(Clone)]
pub struct AppState {
    /// Persistence interface shared by every component.
    pub repo: RepositoryState,
    /// Shared session map: opaque id -> {user, csrf token, lifetime}.
    pub sessions: SessionState,
    /// Identity records, credentials, bans, grants.
    pub identity: IdentityStore,
    /// Threads, posts, and the denormalized aggregates.
    pub content: ContentStore,
    /// Private-access request state machine.
    pub access: PrivateAccessWorkflow,
    /// Append-only moderation trail.
    pub audit: ModerationAudit,
    /// The loaded, immutable environment configuration.
    pub config: AppConfig,
}

impl AppState {
    /// Wires every component onto one repository handle. Both backends
    /// (Postgres and in-memory) pass through here identically.
    pub fn new(repo: RepositoryState, config: AppConfig) -> Self {
        let sessions = Arc::new(SessionStore::new(config.session_ttl_hours));
        let audit = ModerationAudit::new(repo.clone());
        AppState {
            identity: IdentityStore::new(repo.clone()),
            content: ContentStore::new(repo.clone()),
            access: PrivateAccessWorkflow::new(repo.clone(), audit.clone()),
            audit,
            sessions,
            repo,
            config,
        }
    }
}

// --- Axum FromRef Extractor Implementations ---

// Let extractors and middleware pull individual components out of the shared
// AppState without seeing the rest of it.

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for SessionState {
    fn from_ref(app_state: &AppState) -> SessionState {
        app_state.sessions.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// auth_middleware
///
/// Enforces authentication for the protected route groups. `AuthUser`
/// implements `FromRequestParts`, so if session resolution fails (no session,
/// expired, user gone, user banned) the extractor rejects the request before
/// the handler runs; handlers then re-extract the same `AuthUser` cheaply.
async fn auth_middleware(_auth_user: AuthUser, request: Request, next: Next) -> Response {
    next.run(request).await
}

/// require_csrf
///
/// Anti-forgery gate for state-changing requests. Safe methods pass through
/// untouched (and are how a client fetches the token). For everything else
/// the session is resolved and the `x-csrf-token` header must equal the
/// session-bound token; absence or mismatch fails `ForbiddenCsrf` before any
/// business logic runs.
async fn require_csrf(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if request.method().is_safe() {
        return Ok(next.run(request).await);
    }

    let session_id =
        auth::bearer_session_id(request.headers()).ok_or(ApiError::Unauthenticated)?;
    let record = state
        .sessions
        .resolve(&session_id)
        .ok_or(ApiError::Unauthenticated)?;

    match request
        .headers()
        .get("x-csrf-token")
        .and_then(|value| value.to_str().ok())
    {
        Some(token) if token == record.csrf_token => Ok(next.run(request).await),
        _ => Err(ApiError::ForbiddenCsrf),
    }
}

/// create_router
///
/// Assembles the application's entire routing structure, applies global and
/// scoped middleware, and registers the application state.
pub fn create_router(state: AppState) -> Router {
    // 1. CORS Configuration
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    // Header name constant for request correlation.
    let x_request_id = HeaderName::from_static("x-request-id");

    // 2. Base Router Assembly
    //
    // Layer order on the protected groups: the session guard runs first,
    // then the anti-forgery gate, then the handler (`route_layer` wraps, so
    // the later-added layer is outermost).
    let base_router = Router::new()
        // Documentation: the auto-generated Swagger UI.
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Public routes: no middleware.
        .merge(public::public_routes())
        // Session lifecycle routes: guard only. Logout and token fetch are
        // exempt from the anti-forgery gate.
        .merge(
            authenticated::session_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                auth_middleware,
            )),
        )
        // Authenticated forum routes: session guard + anti-forgery gate.
        .merge(
            authenticated::forum_routes()
                .route_layer(middleware::from_fn_with_state(state.clone(), require_csrf))
                .route_layer(middleware::from_fn_with_state(
                    state.clone(),
                    auth_middleware,
                )),
        )
        // Admin routes: same guards; role checks live in the handlers.
        .nest(
            "/admin",
            admin::admin_routes()
                .route_layer(middleware::from_fn_with_state(state.clone(), require_csrf))
                .route_layer(middleware::from_fn_with_state(
                    state.clone(),
                    auth_middleware,
                )),
        )
        .with_state(state);

    // 3. Observability and Correlation Layers (outermost)
    base_router
        .layer(
            ServiceBuilder::new()
                // 3a. Request ID generation: a unique UUID per incoming request.
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                // 3b. Request tracing: wrap the request/response lifecycle in a
                // span correlated by the generated request id.
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                // 3c. Request ID propagation back to the client.
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        // 4. CORS layer.
        .layer(cors)
}

/// trace_span_logger
///
/// Customizes the `TraceLayer` span: includes the `x-request-id` header (if
/// present) alongside the HTTP method and URI, so every log line of a single
/// request is correlated by a unique id.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
