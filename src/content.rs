use crate::error::{ApiError, ApiResult};
use crate::models::{Category, Post, ReconciliationReport, Thread, ThreadView, User};
use crate::policy;
use crate::repository::RepositoryState;
use std::collections::HashMap;
use uuid::Uuid;

const TITLE_MAX: usize = 200;
const BODY_MAX: usize = 20_000;

/// ContentStore
///
/// Creates and removes threads and posts while keeping the denormalized
/// aggregates (per-category, per-user, per-thread counts and the last-reply
/// pointer) in step. Within one logical operation the persistence writes are
/// issued in a fixed sequence — insert, thread, author, category — without
/// cross-call atomicity; `reconcile` is the out-of-band repair pass for any
/// drift a mid-sequence fault leaves behind.
#[derive(Clone)]
pub struct ContentStore {
    repo: RepositoryState,
}

impl ContentStore {
    pub fn new(repo: RepositoryState) -> Self {
        Self { repo }
    }

    /// Creates a thread in a category the author may post to, then bumps the
    /// author's and the category's thread counts.
    pub async fn create_thread(
        &self,
        author: &User,
        category_id: Uuid,
        title: &str,
        body: &str,
    ) -> ApiResult<Thread> {
        validate_text("title", title, TITLE_MAX)?;
        validate_text("body", body, BODY_MAX)?;

        let category = self
            .repo
            .find_category(category_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("category".to_string()))?;

        if !policy::can_post(author, &category, None) {
            return Err(ApiError::Forbidden(
                "you may not start threads in this category".to_string(),
            ));
        }

        let thread = self
            .repo
            .insert_thread(category.id, author.id, title, body)
            .await?;
        self.repo.adjust_user_counters(author.id, 1, 0).await?;
        self.repo.adjust_category_counters(category.id, 1, 0).await?;
        Ok(thread)
    }

    /// Adds a reply to an unlocked thread, updating the thread's reply count
    /// and last-reply pointer, the author's post count, and the owning
    /// category's post count.
    pub async fn create_post(
        &self,
        author: &User,
        thread_id: Uuid,
        body: &str,
        parent_id: Option<Uuid>,
    ) -> ApiResult<Post> {
        validate_text("body", body, BODY_MAX)?;

        let thread = self
            .repo
            .find_thread(thread_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("thread".to_string()))?;
        if thread.locked {
            return Err(ApiError::Locked);
        }

        let category = self
            .repo
            .find_category(thread.category_id)
            .await?
            .ok_or_else(|| ApiError::Internal("thread has no category".to_string()))?;

        if !policy::can_post(author, &category, Some(&thread)) {
            return Err(ApiError::Forbidden(
                "you may not post in this thread".to_string(),
            ));
        }

        if let Some(parent) = parent_id {
            let parent_post = self
                .repo
                .find_post(parent)
                .await?
                .ok_or_else(|| ApiError::NotFound("parent post".to_string()))?;
            if parent_post.thread_id != thread.id {
                return Err(ApiError::Validation(
                    "parent post belongs to a different thread".to_string(),
                ));
            }
        }

        let post = self
            .repo
            .insert_post(thread.id, author.id, parent_id, body)
            .await?;
        self.repo.adjust_thread_replies(thread.id, 1).await?;
        self.repo
            .set_thread_last_reply(thread.id, Some((post.created_at, author.id)))
            .await?;
        self.repo.adjust_user_counters(author.id, 0, 1).await?;
        self.repo
            .adjust_category_counters(category.id, 0, 1)
            .await?;
        Ok(post)
    }

    /// Moderator removal of a single post. Decrements the affected counters
    /// and recomputes the thread's last-reply pointer from the latest
    /// remaining post, so the pointer never goes stale.
    pub async fn delete_post(&self, moderator: &User, post_id: Uuid) -> ApiResult<Post> {
        if !policy::can_moderate(moderator) {
            return Err(ApiError::Forbidden(
                "moderator role required".to_string(),
            ));
        }

        let post = self
            .repo
            .find_post(post_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("post".to_string()))?;
        let thread = self
            .repo
            .find_thread(post.thread_id)
            .await?
            .ok_or_else(|| ApiError::Internal("post has no thread".to_string()))?;

        if !self.repo.delete_post(post.id).await? {
            // Lost a race with another delete.
            return Err(ApiError::NotFound("post".to_string()));
        }

        self.repo.adjust_thread_replies(thread.id, -1).await?;
        let latest = self.repo.latest_post_in_thread(thread.id).await?;
        self.repo
            .set_thread_last_reply(thread.id, latest.map(|p| (p.created_at, p.author_id)))
            .await?;
        self.repo.adjust_user_counters(post.author_id, 0, -1).await?;
        self.repo
            .adjust_category_counters(thread.category_id, 0, -1)
            .await?;
        Ok(post)
    }

    /// Moderator removal of a whole thread. The cascade is too disruptive
    /// for incremental maintenance: affected authors are settled from the
    /// removed posts and the owning category is recounted from scratch.
    pub async fn delete_thread(&self, moderator: &User, thread_id: Uuid) -> ApiResult<Thread> {
        if !policy::can_moderate(moderator) {
            return Err(ApiError::Forbidden(
                "moderator role required".to_string(),
            ));
        }

        let thread = self
            .repo
            .find_thread(thread_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("thread".to_string()))?;

        let removed_posts = self.repo.delete_thread_cascade(thread.id).await?;

        self.repo
            .adjust_user_counters(thread.author_id, -1, 0)
            .await?;
        let mut removed_per_author: HashMap<Uuid, i64> = HashMap::new();
        for post in &removed_posts {
            *removed_per_author.entry(post.author_id).or_default() += 1;
        }
        for (author_id, count) in removed_per_author {
            self.repo.adjust_user_counters(author_id, 0, -count).await?;
        }
        self.repo.recount_category(thread.category_id).await?;
        Ok(thread)
    }

    /// Moderator control over a thread's pinned and locked flags. A locked
    /// thread accepts no further posts from anyone.
    pub async fn set_thread_flags(
        &self,
        moderator: &User,
        thread_id: Uuid,
        pinned: bool,
        locked: bool,
    ) -> ApiResult<Thread> {
        if !policy::can_moderate(moderator) {
            return Err(ApiError::Forbidden(
                "moderator role required".to_string(),
            ));
        }
        if !self.repo.set_thread_flags(thread_id, pinned, locked).await? {
            return Err(ApiError::NotFound("thread".to_string()));
        }
        self.repo
            .find_thread(thread_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("thread".to_string()))
    }

    /// Visibility-gated category lookup by slug.
    pub async fn get_category(&self, viewer: Option<&User>, slug: &str) -> ApiResult<Category> {
        let category = self
            .repo
            .find_category_by_slug(slug)
            .await?
            .ok_or_else(|| ApiError::NotFound("category".to_string()))?;
        if !policy::can_view(viewer, &category) {
            return Err(ApiError::Forbidden(
                "this category is private".to_string(),
            ));
        }
        Ok(category)
    }

    /// Visibility-gated thread read. Bumps the monotonic view counter as a
    /// side effect; no other state changes.
    pub async fn view_thread(
        &self,
        viewer: Option<&User>,
        thread_id: Uuid,
    ) -> ApiResult<ThreadView> {
        let mut thread = self
            .repo
            .find_thread(thread_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("thread".to_string()))?;
        let category = self
            .repo
            .find_category(thread.category_id)
            .await?
            .ok_or_else(|| ApiError::Internal("thread has no category".to_string()))?;
        if !policy::can_view(viewer, &category) {
            return Err(ApiError::Forbidden(
                "this category is private".to_string(),
            ));
        }

        self.repo.increment_thread_views(thread.id).await?;
        thread.view_count += 1;
        let posts = self.repo.list_posts_in_thread(thread.id).await?;
        Ok(ThreadView { thread, posts })
    }

    /// Out-of-band counter repair. Recomputes every denormalized aggregate
    /// from source records; safe to run at any time, idempotent by
    /// construction.
    pub async fn reconcile(&self, moderator: &User) -> ApiResult<ReconciliationReport> {
        if !policy::can_moderate(moderator) {
            return Err(ApiError::Forbidden(
                "moderator role required".to_string(),
            ));
        }
        self.repo.reconcile_counters().await
    }
}

fn validate_text(field: &str, value: &str, max: usize) -> ApiResult<()> {
    if value.trim().is_empty() {
        return Err(ApiError::Validation(format!("{field} must not be empty")));
    }
    if value.chars().count() > max {
        return Err(ApiError::Validation(format!(
            "{field} exceeds {max} characters"
        )));
    }
    Ok(())
}
