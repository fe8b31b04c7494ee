use crate::{
    AppState,
    auth::AuthUser,
    error::{ApiError, ApiResult},
    models::{
        AccessRequestPayload, BanIpRequest, BanUserRequest, BannedIp, Category, CreatePostRequest,
        CreateThreadRequest, CsrfTokenResponse, DecisionRequest, LoginRequest, ModerationAction,
        ModerationLogEntry, Post, PrivateAccessRequest, ReconciliationReport, RegisterRequest,
        Role, SessionResponse, SetRoleRequest, Thread, ThreadFlagsRequest, ThreadView,
        UserProfile,
    },
    policy,
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
};
use chrono::{Duration, Utc};
use serde::Deserialize;
use uuid::Uuid;

// --- Query Structs ---

/// AuditQuery
///
/// Accepted query parameters for GET /admin/audit.
#[derive(Deserialize, utoipa::IntoParams)]
pub struct AuditQuery {
    /// Maximum number of entries to return (default 50, capped at 200).
    pub limit: Option<i64>,
}

/// Client address as reported by the reverse proxy. Only the first hop is
/// trusted for the IP-ban check at registration.
fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

// --- Public Handlers ---

/// health
///
/// [Public Route] Liveness probe.
#[utoipa::path(get, path = "/health", responses((status = 200, description = "OK")))]
pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// register
///
/// [Public Route] Creates an account and opens a session for it. The reply
/// carries the opaque session token and the session-bound anti-forgery token.
#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Registered", body = SessionResponse),
        (status = 409, description = "Duplicate username or email"),
        (status = 422, description = "Invalid input")
    )
)]
pub async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<SessionResponse>)> {
    let ip = client_ip(&headers);
    let user = state
        .identity
        .register(
            &payload.username,
            &payload.email,
            &payload.password,
            ip.as_deref(),
        )
        .await?;

    let (token, record) = state.sessions.create(user.id);
    Ok((
        StatusCode::CREATED,
        Json(SessionResponse {
            token,
            csrf_token: record.csrf_token,
            user: UserProfile::from(&user),
        }),
    ))
}

/// login
///
/// [Public Route] Verifies credentials and opens a fresh session. A banned
/// account is refused here with `Forbidden` even when the password matches.
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = SessionResponse),
        (status = 401, description = "Bad credentials"),
        (status = 403, description = "Account banned")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> ApiResult<Json<SessionResponse>> {
    let user = state
        .identity
        .authenticate(&payload.email, &payload.password)
        .await?;

    let (token, record) = state.sessions.create(user.id);
    Ok(Json(SessionResponse {
        token,
        csrf_token: record.csrf_token,
        user: UserProfile::from(&user),
    }))
}

/// get_category
///
/// [Public Route, optional auth] Category lookup by slug. Private categories
/// are only revealed to users holding the private-access grant.
#[utoipa::path(
    get,
    path = "/categories/{slug}",
    params(("slug" = String, Path, description = "Category slug")),
    responses(
        (status = 200, description = "Found", body = Category),
        (status = 403, description = "Private"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn get_category(
    auth: Option<AuthUser>,
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> ApiResult<Json<Category>> {
    let viewer = auth.as_ref().map(|a| &a.user);
    let category = state.content.get_category(viewer, &slug).await?;
    Ok(Json(category))
}

/// view_thread
///
/// [Public Route, optional auth] Returns a thread with its posts and bumps
/// the monotonic view counter.
#[utoipa::path(
    get,
    path = "/threads/{id}",
    params(("id" = Uuid, Path, description = "Thread ID")),
    responses(
        (status = 200, description = "Found", body = ThreadView),
        (status = 403, description = "Private"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn view_thread(
    auth: Option<AuthUser>,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ThreadView>> {
    let viewer = auth.as_ref().map(|a| &a.user);
    let view = state.content.view_thread(viewer, id).await?;
    Ok(Json(view))
}

// --- Authenticated Handlers ---

/// logout
///
/// [Authenticated Route] Destroys the presented session; the bound
/// anti-forgery token dies with it.
#[utoipa::path(post, path = "/auth/logout", responses((status = 200, description = "Session destroyed")))]
pub async fn logout(
    AuthUser { session_id, .. }: AuthUser,
    State(state): State<AppState>,
) -> StatusCode {
    state.sessions.destroy(&session_id);
    StatusCode::OK
}

/// get_csrf
///
/// [Authenticated Route] Returns the session's current anti-forgery token,
/// which every state-changing request must echo in `x-csrf-token`.
#[utoipa::path(
    get,
    path = "/auth/csrf",
    responses((status = 200, description = "Token", body = CsrfTokenResponse))
)]
pub async fn get_csrf(
    AuthUser { session_id, .. }: AuthUser,
    State(state): State<AppState>,
) -> ApiResult<Json<CsrfTokenResponse>> {
    let csrf_token = state
        .sessions
        .csrf_token(&session_id)
        .ok_or(ApiError::Unauthenticated)?;
    Ok(Json(CsrfTokenResponse { csrf_token }))
}

/// create_thread
///
/// [Authenticated Route, CSRF] Starts a thread. Requires role `member` or
/// above and, for private categories, the access grant.
#[utoipa::path(
    post,
    path = "/threads",
    request_body = CreateThreadRequest,
    responses(
        (status = 201, description = "Created", body = Thread),
        (status = 403, description = "Not allowed"),
        (status = 422, description = "Invalid input")
    )
)]
pub async fn create_thread(
    AuthUser { user, .. }: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateThreadRequest>,
) -> ApiResult<(StatusCode, Json<Thread>)> {
    let thread = state
        .content
        .create_thread(&user, payload.category_id, &payload.title, &payload.body)
        .await?;
    Ok((StatusCode::CREATED, Json(thread)))
}

/// create_post
///
/// [Authenticated Route, CSRF] Replies to a thread. A locked thread refuses
/// every poster.
#[utoipa::path(
    post,
    path = "/threads/{id}/posts",
    params(("id" = Uuid, Path, description = "Thread ID")),
    request_body = CreatePostRequest,
    responses(
        (status = 201, description = "Created", body = Post),
        (status = 403, description = "Not allowed"),
        (status = 404, description = "Thread not found"),
        (status = 423, description = "Thread locked")
    )
)]
pub async fn create_post(
    AuthUser { user, .. }: AuthUser,
    State(state): State<AppState>,
    Path(thread_id): Path<Uuid>,
    Json(payload): Json<CreatePostRequest>,
) -> ApiResult<(StatusCode, Json<Post>)> {
    let post = state
        .content
        .create_post(&user, thread_id, &payload.body, payload.parent_id)
        .await?;
    Ok((StatusCode::CREATED, Json(post)))
}

/// submit_access_request
///
/// [Authenticated Route, CSRF] Applies for the restricted section. One
/// pending request per user; justification must be at least 50 characters.
#[utoipa::path(
    post,
    path = "/access-requests",
    request_body = AccessRequestPayload,
    responses(
        (status = 201, description = "Submitted", body = PrivateAccessRequest),
        (status = 409, description = "Already pending or already granted"),
        (status = 422, description = "Justification too short")
    )
)]
pub async fn submit_access_request(
    AuthUser { user, .. }: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<AccessRequestPayload>,
) -> ApiResult<(StatusCode, Json<PrivateAccessRequest>)> {
    let request = state.access.submit(&user, &payload.justification).await?;
    Ok((StatusCode::CREATED, Json(request)))
}

// --- Admin Handlers ---

/// delete_post
///
/// [Admin Route, CSRF] Moderator removal of a post. Counter decrements and
/// the last-reply recompute happen inside the content store; the action is
/// recorded in the audit trail.
#[utoipa::path(
    delete,
    path = "/admin/posts/{id}",
    params(("id" = Uuid, Path, description = "Post ID")),
    responses(
        (status = 200, description = "Deleted"),
        (status = 403, description = "Not a moderator"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn delete_post(
    AuthUser { user, .. }: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let post = state.content.delete_post(&user, id).await?;
    state
        .audit
        .record(
            &user,
            ModerationAction::PostDeleted,
            Some(post.author_id),
            None,
            Some(&format!("post {} in thread {}", post.id, post.thread_id)),
        )
        .await?;
    Ok(StatusCode::OK)
}

/// delete_thread
///
/// [Admin Route, CSRF] Moderator removal of a whole thread, cascading its
/// posts and recounting the owning category.
#[utoipa::path(
    delete,
    path = "/admin/threads/{id}",
    params(("id" = Uuid, Path, description = "Thread ID")),
    responses(
        (status = 200, description = "Deleted"),
        (status = 403, description = "Not a moderator"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn delete_thread(
    AuthUser { user, .. }: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let thread = state.content.delete_thread(&user, id).await?;
    state
        .audit
        .record(
            &user,
            ModerationAction::ThreadDeleted,
            Some(thread.author_id),
            None,
            Some(&format!("thread {} \"{}\"", thread.id, thread.title)),
        )
        .await?;
    Ok(StatusCode::OK)
}

/// set_thread_flags
///
/// [Admin Route, CSRF] Pins or locks a thread. Locking refuses every new
/// post, moderators included.
#[utoipa::path(
    put,
    path = "/admin/threads/{id}/flags",
    params(("id" = Uuid, Path, description = "Thread ID")),
    request_body = ThreadFlagsRequest,
    responses(
        (status = 200, description = "Updated", body = Thread),
        (status = 403, description = "Not a moderator"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn set_thread_flags(
    AuthUser { user, .. }: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ThreadFlagsRequest>,
) -> ApiResult<Json<Thread>> {
    let thread = state
        .content
        .set_thread_flags(&user, id, payload.pinned, payload.locked)
        .await?;
    Ok(Json(thread))
}

/// list_access_requests
///
/// [Admin Route] The pending review queue, oldest first.
#[utoipa::path(
    get,
    path = "/admin/access-requests",
    responses((status = 200, description = "Pending requests", body = [PrivateAccessRequest]))
)]
pub async fn list_access_requests(
    AuthUser { user, .. }: AuthUser,
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<PrivateAccessRequest>>> {
    let requests = state.access.list_pending(&user).await?;
    Ok(Json(requests))
}

/// decide_access_request
///
/// [Admin Route, CSRF] Approves or rejects a pending request. Approval also
/// grants the requester private access; deciding the same request twice
/// fails `NotFound` rather than double-applying.
#[utoipa::path(
    post,
    path = "/admin/access-requests/{id}/decision",
    params(("id" = Uuid, Path, description = "Request ID")),
    request_body = DecisionRequest,
    responses(
        (status = 200, description = "Decided", body = PrivateAccessRequest),
        (status = 404, description = "Absent or already decided")
    )
)]
pub async fn decide_access_request(
    AuthUser { user, .. }: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<DecisionRequest>,
) -> ApiResult<Json<PrivateAccessRequest>> {
    let request = state
        .access
        .decide(&user, id, payload.outcome, payload.details.as_deref())
        .await?;
    Ok(Json(request))
}

/// set_user_role
///
/// [Admin Route, CSRF] Role assignment through the capability predicate:
/// moderation rights required, and handing out `moderator` or above takes an
/// administrator.
#[utoipa::path(
    put,
    path = "/admin/users/{id}/role",
    params(("id" = Uuid, Path, description = "User ID")),
    request_body = SetRoleRequest,
    responses(
        (status = 200, description = "Updated"),
        (status = 403, description = "Not allowed"),
        (status = 404, description = "No such user")
    )
)]
pub async fn set_user_role(
    AuthUser { user, .. }: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SetRoleRequest>,
) -> ApiResult<StatusCode> {
    if !policy::can_assign_role(&user, payload.role) {
        return Err(ApiError::Forbidden(
            "you may not assign this role".to_string(),
        ));
    }
    state.identity.set_role(id, payload.role).await?;
    state
        .audit
        .record(
            &user,
            ModerationAction::RoleChanged,
            Some(id),
            None,
            Some(&format!("role set to {:?}", payload.role)),
        )
        .await?;
    Ok(StatusCode::OK)
}

/// ban_user
///
/// [Admin Route, CSRF] Administrator-only account ban. The target's existing
/// sessions are not touched here; the session guard destroys them on their
/// next request.
#[utoipa::path(
    post,
    path = "/admin/users/{id}/ban",
    params(("id" = Uuid, Path, description = "User ID")),
    request_body = BanUserRequest,
    responses(
        (status = 200, description = "Banned"),
        (status = 403, description = "Not an administrator"),
        (status = 404, description = "No such user")
    )
)]
pub async fn ban_user(
    AuthUser { user, .. }: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<BanUserRequest>,
) -> ApiResult<StatusCode> {
    if user.role != Role::Administrator {
        return Err(ApiError::Forbidden(
            "administrator role required".to_string(),
        ));
    }
    state.identity.set_banned(id, &payload.reason).await?;
    state
        .audit
        .record(
            &user,
            ModerationAction::UserBanned,
            Some(id),
            Some(&payload.reason),
            None,
        )
        .await?;
    Ok(StatusCode::OK)
}

/// ban_ip
///
/// [Admin Route, CSRF] Address-level ban, independent of account bans.
/// Available to moderators.
#[utoipa::path(
    post,
    path = "/admin/ip-bans",
    request_body = BanIpRequest,
    responses(
        (status = 201, description = "Banned", body = BannedIp),
        (status = 403, description = "Not a moderator"),
        (status = 422, description = "Invalid address")
    )
)]
pub async fn ban_ip(
    AuthUser { user, .. }: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<BanIpRequest>,
) -> ApiResult<(StatusCode, Json<BannedIp>)> {
    if !policy::can_moderate(&user) {
        return Err(ApiError::Forbidden("moderator role required".to_string()));
    }
    let expires_at = payload
        .expires_in_hours
        .map(|hours| Utc::now() + Duration::hours(hours));
    let ban = state
        .identity
        .ban_ip(&payload.address, &payload.reason, user.id, expires_at)
        .await?;
    state
        .audit
        .record(
            &user,
            ModerationAction::IpBanned,
            None,
            Some(&payload.reason),
            Some(&ban.address),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(ban)))
}

/// audit_log
///
/// [Admin Route] The recent moderation trail, creation-time descending.
#[utoipa::path(
    get,
    path = "/admin/audit",
    params(AuditQuery),
    responses((status = 200, description = "Entries", body = [ModerationLogEntry]))
)]
pub async fn audit_log(
    AuthUser { user, .. }: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<AuditQuery>,
) -> ApiResult<Json<Vec<ModerationLogEntry>>> {
    let entries = state.audit.list_recent(&user, query.limit).await?;
    Ok(Json(entries))
}

/// reconcile
///
/// [Admin Route, CSRF] Runs the out-of-band counter repair pass and reports
/// how many rows had drifted.
#[utoipa::path(
    post,
    path = "/admin/reconcile",
    responses((status = 200, description = "Report", body = ReconciliationReport))
)]
pub async fn reconcile(
    AuthUser { user, .. }: AuthUser,
    State(state): State<AppState>,
) -> ApiResult<Json<ReconciliationReport>> {
    let report = state.content.reconcile(&user).await?;
    Ok(Json(report))
}
