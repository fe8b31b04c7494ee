use crate::audit::ModerationAudit;
use crate::error::{ApiError, ApiResult};
use crate::models::{
    ModerationAction, PrivateAccessRequest, RequestOutcome, RequestStatus, User,
};
use crate::policy;
use crate::repository::RepositoryState;
use uuid::Uuid;

const MIN_JUSTIFICATION: usize = 50;

/// PrivateAccessWorkflow
///
/// The request/approval state machine for the restricted section:
/// `NoRequest -> Pending -> {Approved, Rejected}`. Approval also flips the
/// requester's grant, and every decision lands in the moderation audit.
/// After a rejection the user may submit again.
#[derive(Clone)]
pub struct PrivateAccessWorkflow {
    repo: RepositoryState,
    audit: ModerationAudit,
}

impl PrivateAccessWorkflow {
    pub fn new(repo: RepositoryState, audit: ModerationAudit) -> Self {
        Self { repo, audit }
    }

    /// Submits a new request. `Conflict` when the user already holds the
    /// grant or already has a pending request; `Validation` when the
    /// justification is shorter than 50 characters.
    pub async fn submit(
        &self,
        user: &User,
        justification: &str,
    ) -> ApiResult<PrivateAccessRequest> {
        if user.has_private_access {
            return Err(ApiError::Conflict(
                "private access already granted".to_string(),
            ));
        }
        if justification.trim().chars().count() < MIN_JUSTIFICATION {
            return Err(ApiError::Validation(format!(
                "justification must be at least {MIN_JUSTIFICATION} characters"
            )));
        }
        if self.repo.find_pending_request_for(user.id).await?.is_some() {
            return Err(ApiError::Conflict(
                "a pending request already exists".to_string(),
            ));
        }
        self.repo
            .insert_access_request(user.id, justification.trim())
            .await
    }

    /// Decides a pending request. The transition is a compare-and-set on
    /// `pending`, so replaying a decision (same id, any outcome) fails
    /// `NotFound` instead of double-applying. On approval the requester's
    /// grant is set as part of the same decision.
    pub async fn decide(
        &self,
        reviewer: &User,
        request_id: Uuid,
        outcome: RequestOutcome,
        details: Option<&str>,
    ) -> ApiResult<PrivateAccessRequest> {
        if !policy::can_moderate(reviewer) {
            return Err(ApiError::Forbidden(
                "moderator role required".to_string(),
            ));
        }

        let request = self
            .repo
            .find_access_request(request_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("access request".to_string()))?;

        let status = RequestStatus::from(outcome);
        if !self
            .repo
            .resolve_access_request(request.id, status, reviewer.id)
            .await?
        {
            // Absent or already decided: the terminal transition happens once.
            return Err(ApiError::NotFound("access request".to_string()));
        }

        if outcome == RequestOutcome::Approved {
            if !self.repo.grant_private_access(request.user_id).await? {
                return Err(ApiError::Internal(
                    "approved request references a missing user".to_string(),
                ));
            }
        }

        let action = match outcome {
            RequestOutcome::Approved => ModerationAction::AccessApproved,
            RequestOutcome::Rejected => ModerationAction::AccessRejected,
        };
        self.audit
            .record(reviewer, action, Some(request.user_id), None, details)
            .await?;

        self.repo
            .find_access_request(request.id)
            .await?
            .ok_or_else(|| ApiError::Internal("decided request vanished".to_string()))
    }

    /// The review queue, oldest first.
    pub async fn list_pending(&self, reviewer: &User) -> ApiResult<Vec<PrivateAccessRequest>> {
        if !policy::can_moderate(reviewer) {
            return Err(ApiError::Forbidden(
                "moderator role required".to_string(),
            ));
        }
        self.repo.list_pending_requests().await
    }
}
