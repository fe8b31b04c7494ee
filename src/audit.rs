use crate::error::{ApiError, ApiResult};
use crate::models::{ModerationAction, ModerationLogEntry, User};
use crate::policy;
use crate::repository::RepositoryState;
use uuid::Uuid;

const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 200;

/// ModerationAudit
///
/// The append-only trail of privileged actions. `record` is the only write;
/// no update or delete operation exists anywhere in the crate, and reads are
/// restricted to moderators.
#[derive(Clone)]
pub struct ModerationAudit {
    repo: RepositoryState,
}

impl ModerationAudit {
    pub fn new(repo: RepositoryState) -> Self {
        Self { repo }
    }

    /// Appends one entry. Callers have already authorized the underlying
    /// action; the actor is recorded as-is.
    pub async fn record(
        &self,
        actor: &User,
        action: ModerationAction,
        target: Option<Uuid>,
        reason: Option<&str>,
        details: Option<&str>,
    ) -> ApiResult<ModerationLogEntry> {
        self.repo
            .append_moderation_entry(actor.id, action, target, reason, details)
            .await
    }

    /// Most recent entries, creation-time descending.
    pub async fn list_recent(
        &self,
        viewer: &User,
        limit: Option<i64>,
    ) -> ApiResult<Vec<ModerationLogEntry>> {
        if !policy::can_moderate(viewer) {
            return Err(ApiError::Forbidden(
                "moderator role required".to_string(),
            ));
        }
        let limit = limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
        self.repo.recent_moderation_entries(limit).await
    }
}
