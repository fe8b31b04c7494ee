use axum::{
    extract::{FromRef, FromRequestParts, OptionalFromRequestParts},
    http::{HeaderMap, header, request::Parts},
};

use crate::{
    error::ApiError,
    models::User,
    repository::RepositoryState,
    session::SessionState,
};

/// AuthUser
///
/// The resolved identity of an authenticated request: the full user record
/// (the policy functions need role, grant, and ban state) plus the session id
/// the request arrived on, so handlers like logout can act on the session.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user: User,
    pub session_id: String,
}

/// Pulls the opaque session id out of the `Authorization: Bearer ...` header.
pub(crate) fn bearer_session_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_string)
}

/// AuthUser Extractor Implementation
///
/// On every authenticated request: resolve the session, then re-check the
/// user against the store. A session whose user no longer exists is destroyed
/// and rejected `Unauthenticated`; a session whose user has been banned —
/// even if the ban landed mid-session — is destroyed and rejected
/// `Forbidden`. This is what makes a ban take effect on the very next
/// request.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    SessionState: FromRef<S>,
    RepositoryState: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let sessions = SessionState::from_ref(state);
        let repo = RepositoryState::from_ref(state);

        let session_id = bearer_session_id(&parts.headers).ok_or(ApiError::Unauthenticated)?;
        let record = sessions
            .resolve(&session_id)
            .ok_or(ApiError::Unauthenticated)?;

        let user = match repo.find_user(record.user_id).await? {
            Some(user) => user,
            None => {
                sessions.destroy(&session_id);
                return Err(ApiError::Unauthenticated);
            }
        };

        if user.banned {
            sessions.destroy(&session_id);
            return Err(ApiError::Forbidden(match &user.ban_reason {
                Some(reason) => format!("account banned: {reason}"),
                None => "account banned".to_string(),
            }));
        }

        Ok(AuthUser { user, session_id })
    }
}

/// Optional variant for endpoints readable by anonymous visitors. No
/// credentials at all resolve to `None`; a presented-but-invalid session
/// still fails, including the banned-session destruction above.
impl<S> OptionalFromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    SessionState: FromRef<S>,
    RepositoryState: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        if bearer_session_id(&parts.headers).is_none() {
            return Ok(None);
        }
        <AuthUser as FromRequestParts<S>>::from_request_parts(parts, state)
            .await
            .map(Some)
    }
}
