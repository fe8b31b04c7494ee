use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

// --- Closed Enumerations ---

/// Role
///
/// The closed role ladder. Variant order is the privilege order, so role
/// comparisons are plain `>=` on the enum (`Ord` follows declaration order).
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    TS,
    ToSchema,
    sqlx::Type,
    Default,
)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "user_role", rename_all = "snake_case")]
#[ts(export)]
pub enum Role {
    /// Freshly registered. May read public content but not write.
    #[default]
    NewMember,
    Member,
    Moderator,
    Administrator,
}

/// RequestStatus
///
/// Lifecycle of a private-access request. `Approved` and `Rejected` are
/// terminal; a user may submit a fresh request after a rejection.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, sqlx::Type, Default,
)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "access_status", rename_all = "snake_case")]
#[ts(export)]
pub enum RequestStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

/// RequestOutcome
///
/// The two decisions a reviewer can take on a pending request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum RequestOutcome {
    #[default]
    Approved,
    Rejected,
}

impl From<RequestOutcome> for RequestStatus {
    fn from(outcome: RequestOutcome) -> Self {
        match outcome {
            RequestOutcome::Approved => RequestStatus::Approved,
            RequestOutcome::Rejected => RequestStatus::Rejected,
        }
    }
}

/// ModerationAction
///
/// The kinds of privileged actions recorded in the append-only audit trail.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, sqlx::Type, Default,
)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "moderation_action", rename_all = "snake_case")]
#[ts(export)]
pub enum ModerationAction {
    #[default]
    UserBanned,
    IpBanned,
    RoleChanged,
    PostDeleted,
    ThreadDeleted,
    AccessApproved,
    AccessRejected,
}

// --- Core Application Records (Mapped to Database) ---

/// User
///
/// Canonical identity record. Internal only — the credential hash must never
/// reach a response body, so the API surface exposes `UserProfile` instead.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, Default)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    /// Opaque argon2 PHC string. Never serialized.
    #[serde(skip_serializing)]
    #[serde(default)]
    pub password_hash: String,
    pub role: Role,
    pub banned: bool,
    pub ban_reason: Option<String>,
    /// Grant flag for the restricted section. Set only through an approved
    /// access request; nothing in scope clears it.
    pub has_private_access: bool,
    // Denormalized aggregates, maintained incrementally on the write path
    // and repairable by reconciliation.
    pub thread_count: i64,
    pub post_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Category
///
/// A top-level section of the board. Private categories are visible and
/// postable only to users holding the private-access grant.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Category {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub description: String,
    pub is_private: bool,
    pub thread_count: i64,
    pub post_count: i64,
    pub sort_order: i32,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

/// Thread
///
/// A discussion thread. `last_reply_at`/`last_reply_by` track the most recent
/// remaining post and are both null while the thread has no replies.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Thread {
    pub id: Uuid,
    pub category_id: Uuid,
    pub author_id: Uuid,
    pub title: String,
    pub body: String,
    pub pinned: bool,
    pub locked: bool,
    pub view_count: i64,
    pub reply_count: i64,
    pub last_reply_at: Option<DateTime<Utc>>,
    pub last_reply_by: Option<Uuid>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

/// Post
///
/// A reply inside a thread. `parent_id` references another post in the same
/// thread when the reply targets a specific post.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Post {
    pub id: Uuid,
    pub thread_id: Uuid,
    pub author_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub body: String,
    pub edited: bool,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

/// PrivateAccessRequest
///
/// A user's application for the restricted section. At most one `pending`
/// request exists per user at any time.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct PrivateAccessRequest {
    pub id: Uuid,
    pub user_id: Uuid,
    pub justification: String,
    pub status: RequestStatus,
    pub reviewed_by: Option<Uuid>,
    pub reviewed_at: Option<DateTime<Utc>>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

/// ModerationLogEntry
///
/// One row of the append-only moderation trail. Entries are never updated,
/// deleted, or reordered; display order is creation-time descending.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct ModerationLogEntry {
    pub id: Uuid,
    pub actor_id: Uuid,
    pub action: ModerationAction,
    pub target_user_id: Option<Uuid>,
    pub reason: Option<String>,
    pub details: Option<String>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

/// BannedIp
///
/// An address-level ban, independent of account bans. `expires_at = None`
/// means permanent.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct BannedIp {
    pub id: Uuid,
    pub address: String,
    pub reason: String,
    pub issued_by: Uuid,
    pub expires_at: Option<DateTime<Utc>>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

// --- Request Payloads (Input Schemas) ---

/// RegisterRequest
///
/// Input payload for POST /auth/register. The password is hashed immediately
/// and only the hash is persisted.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// LoginRequest
///
/// Input payload for POST /auth/login.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// CreateThreadRequest
///
/// Input payload for POST /threads.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateThreadRequest {
    pub category_id: Uuid,
    pub title: String,
    pub body: String,
}

/// CreatePostRequest
///
/// Input payload for POST /threads/{id}/posts.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreatePostRequest {
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<Uuid>,
}

/// AccessRequestPayload
///
/// Input payload for POST /access-requests. The justification must be at
/// least 50 characters.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct AccessRequestPayload {
    pub justification: String,
}

/// DecisionRequest
///
/// Input payload for POST /admin/access-requests/{id}/decision.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct DecisionRequest {
    pub outcome: RequestOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// ThreadFlagsRequest
///
/// Input payload for PUT /admin/threads/{id}/flags.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct ThreadFlagsRequest {
    pub pinned: bool,
    pub locked: bool,
}

/// SetRoleRequest
///
/// Input payload for PUT /admin/users/{id}/role.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct SetRoleRequest {
    pub role: Role,
}

/// BanUserRequest
///
/// Input payload for POST /admin/users/{id}/ban.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct BanUserRequest {
    pub reason: String,
}

/// BanIpRequest
///
/// Input payload for POST /admin/ip-bans.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct BanIpRequest {
    pub address: String,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in_hours: Option<i64>,
}

// --- Output Schemas ---

/// UserProfile
///
/// The public projection of a `User` — everything except the credential hash
/// and ban bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UserProfile {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub role: Role,
    pub has_private_access: bool,
    pub thread_count: i64,
    pub post_count: i64,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        UserProfile {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            role: user.role,
            has_private_access: user.has_private_access,
            thread_count: user.thread_count,
            post_count: user.post_count,
            created_at: user.created_at,
        }
    }
}

/// SessionResponse
///
/// Returned by register and login: the opaque session id (presented back as a
/// bearer token), the bound anti-forgery token, and the user's profile.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct SessionResponse {
    pub token: String,
    pub csrf_token: String,
    pub user: UserProfile,
}

/// CsrfTokenResponse
///
/// Returned by GET /auth/csrf.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CsrfTokenResponse {
    pub csrf_token: String,
}

/// ThreadView
///
/// A thread together with its posts, as returned by GET /threads/{id}.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct ThreadView {
    pub thread: Thread,
    pub posts: Vec<Post>,
}

/// ReconciliationReport
///
/// Result of the out-of-band counter repair pass: how many rows of each kind
/// had drifted and were rewritten.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct ReconciliationReport {
    pub categories_fixed: u64,
    pub threads_fixed: u64,
    pub users_fixed: u64,
}
