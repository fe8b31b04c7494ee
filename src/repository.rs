use crate::error::ApiResult;
use crate::models::{
    BannedIp, Category, ModerationAction, ModerationLogEntry, Post, PrivateAccessRequest,
    ReconciliationReport, RequestStatus, Role, Thread, User,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

/// Repository Trait
///
/// The explicit persistence interface injected into every component. Each
/// method is a single atomic persistence step; logical operations that span
/// several steps (counter maintenance in particular) are sequenced by the
/// service layer and repairable through `reconcile_counters`.
///
/// **Send + Sync + async_trait** make the trait object (`Arc<dyn Repository>`)
/// shareable across axum's task boundaries.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Users ---
    async fn find_user(&self, id: Uuid) -> ApiResult<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> ApiResult<Option<User>>;
    async fn find_user_by_username(&self, username: &str) -> ApiResult<Option<User>>;
    async fn insert_user(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
    ) -> ApiResult<User>;
    async fn set_user_role(&self, id: Uuid, role: Role) -> ApiResult<bool>;
    async fn set_user_banned(&self, id: Uuid, reason: &str) -> ApiResult<bool>;
    /// One-way: nothing in the interface clears the grant.
    async fn grant_private_access(&self, id: Uuid) -> ApiResult<bool>;
    async fn adjust_user_counters(
        &self,
        id: Uuid,
        thread_delta: i64,
        post_delta: i64,
    ) -> ApiResult<()>;

    // --- Categories ---
    async fn insert_category(
        &self,
        slug: &str,
        name: &str,
        description: &str,
        is_private: bool,
        sort_order: i32,
    ) -> ApiResult<Category>;
    async fn find_category(&self, id: Uuid) -> ApiResult<Option<Category>>;
    async fn find_category_by_slug(&self, slug: &str) -> ApiResult<Option<Category>>;
    async fn adjust_category_counters(
        &self,
        id: Uuid,
        thread_delta: i64,
        post_delta: i64,
    ) -> ApiResult<()>;
    /// Full recount of one category's aggregates from its live children.
    async fn recount_category(&self, id: Uuid) -> ApiResult<()>;

    // --- Threads ---
    async fn insert_thread(
        &self,
        category_id: Uuid,
        author_id: Uuid,
        title: &str,
        body: &str,
    ) -> ApiResult<Thread>;
    async fn find_thread(&self, id: Uuid) -> ApiResult<Option<Thread>>;
    async fn adjust_thread_replies(&self, id: Uuid, delta: i64) -> ApiResult<()>;
    async fn set_thread_last_reply(
        &self,
        id: Uuid,
        last: Option<(DateTime<Utc>, Uuid)>,
    ) -> ApiResult<()>;
    /// Monotonic, no other side effects.
    async fn increment_thread_views(&self, id: Uuid) -> ApiResult<()>;
    async fn set_thread_flags(&self, id: Uuid, pinned: bool, locked: bool) -> ApiResult<bool>;
    /// Removes the thread and every post in it, returning the removed posts
    /// so the caller can settle per-author aggregates.
    async fn delete_thread_cascade(&self, id: Uuid) -> ApiResult<Vec<Post>>;
    async fn list_posts_in_thread(&self, thread_id: Uuid) -> ApiResult<Vec<Post>>;
    /// The chronologically latest remaining post, if any.
    async fn latest_post_in_thread(&self, thread_id: Uuid) -> ApiResult<Option<Post>>;

    // --- Posts ---
    async fn insert_post(
        &self,
        thread_id: Uuid,
        author_id: Uuid,
        parent_id: Option<Uuid>,
        body: &str,
    ) -> ApiResult<Post>;
    async fn find_post(&self, id: Uuid) -> ApiResult<Option<Post>>;
    async fn delete_post(&self, id: Uuid) -> ApiResult<bool>;

    // --- Private access requests ---
    async fn find_pending_request_for(
        &self,
        user_id: Uuid,
    ) -> ApiResult<Option<PrivateAccessRequest>>;
    async fn insert_access_request(
        &self,
        user_id: Uuid,
        justification: &str,
    ) -> ApiResult<PrivateAccessRequest>;
    async fn find_access_request(&self, id: Uuid) -> ApiResult<Option<PrivateAccessRequest>>;
    /// Compare-and-set on `status = pending`. Returns false when the request
    /// is absent or already decided, which makes replayed decisions harmless.
    async fn resolve_access_request(
        &self,
        id: Uuid,
        status: RequestStatus,
        reviewer: Uuid,
    ) -> ApiResult<bool>;
    async fn list_pending_requests(&self) -> ApiResult<Vec<PrivateAccessRequest>>;

    // --- Moderation log (append-only; no update or delete exists) ---
    async fn append_moderation_entry(
        &self,
        actor: Uuid,
        action: ModerationAction,
        target: Option<Uuid>,
        reason: Option<&str>,
        details: Option<&str>,
    ) -> ApiResult<ModerationLogEntry>;
    async fn recent_moderation_entries(&self, limit: i64) -> ApiResult<Vec<ModerationLogEntry>>;

    // --- IP bans ---
    async fn insert_ip_ban(
        &self,
        address: &str,
        reason: &str,
        issued_by: Uuid,
        expires_at: Option<DateTime<Utc>>,
    ) -> ApiResult<BannedIp>;
    async fn find_active_ip_ban(&self, address: &str) -> ApiResult<Option<BannedIp>>;

    // --- Reconciliation ---
    /// Out-of-band repair: recomputes every denormalized aggregate (and the
    /// last-reply pointers) from source records and reports how many rows
    /// had drifted.
    async fn reconcile_counters(&self) -> ApiResult<ReconciliationReport>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the
/// application state.
pub type RepositoryState = Arc<dyn Repository>;

/// PostgresRepository
///
/// The concrete implementation backed by PostgreSQL. Queries use the runtime
/// API with bound parameters throughout; multi-row steps (the cascade delete)
/// run inside a transaction.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn find_user(&self, id: Uuid) -> ApiResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> ApiResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_user_by_username(&self, username: &str) -> ApiResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = $1")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn insert_user(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
    ) -> ApiResult<User> {
        // A duplicate slipping past the service-level check trips the unique
        // constraint, which From<sqlx::Error> maps to Conflict.
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, username, email, password_hash, role, banned, has_private_access,
                               thread_count, post_count, created_at, updated_at)
            VALUES ($1, $2, $3, $4, 'new_member', false, false, 0, 0, NOW(), NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(username)
        .bind(email)
        .bind(password_hash)
        .fetch_one(&self.pool)
        .await?;
        Ok(user)
    }

    async fn set_user_role(&self, id: Uuid, role: Role) -> ApiResult<bool> {
        let result =
            sqlx::query("UPDATE users SET role = $2, updated_at = NOW() WHERE id = $1")
                .bind(id)
                .bind(role)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_user_banned(&self, id: Uuid, reason: &str) -> ApiResult<bool> {
        let result = sqlx::query(
            "UPDATE users SET banned = true, ban_reason = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(reason)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn grant_private_access(&self, id: Uuid) -> ApiResult<bool> {
        let result = sqlx::query(
            "UPDATE users SET has_private_access = true, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn adjust_user_counters(
        &self,
        id: Uuid,
        thread_delta: i64,
        post_delta: i64,
    ) -> ApiResult<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET thread_count = GREATEST(thread_count + $2, 0),
                post_count = GREATEST(post_count + $3, 0),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(thread_delta)
        .bind(post_delta)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_category(
        &self,
        slug: &str,
        name: &str,
        description: &str,
        is_private: bool,
        sort_order: i32,
    ) -> ApiResult<Category> {
        let category = sqlx::query_as::<_, Category>(
            r#"
            INSERT INTO categories (id, slug, name, description, is_private, thread_count,
                                    post_count, sort_order, created_at)
            VALUES ($1, $2, $3, $4, $5, 0, 0, $6, NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(slug)
        .bind(name)
        .bind(description)
        .bind(is_private)
        .bind(sort_order)
        .fetch_one(&self.pool)
        .await?;
        Ok(category)
    }

    async fn find_category(&self, id: Uuid) -> ApiResult<Option<Category>> {
        let category = sqlx::query_as::<_, Category>("SELECT * FROM categories WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(category)
    }

    async fn find_category_by_slug(&self, slug: &str) -> ApiResult<Option<Category>> {
        let category = sqlx::query_as::<_, Category>("SELECT * FROM categories WHERE slug = $1")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;
        Ok(category)
    }

    async fn adjust_category_counters(
        &self,
        id: Uuid,
        thread_delta: i64,
        post_delta: i64,
    ) -> ApiResult<()> {
        sqlx::query(
            r#"
            UPDATE categories
            SET thread_count = GREATEST(thread_count + $2, 0),
                post_count = GREATEST(post_count + $3, 0)
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(thread_delta)
        .bind(post_delta)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn recount_category(&self, id: Uuid) -> ApiResult<()> {
        sqlx::query(
            r#"
            UPDATE categories
            SET thread_count = (SELECT COUNT(*) FROM threads t WHERE t.category_id = categories.id),
                post_count = (SELECT COUNT(*)
                              FROM posts p
                              JOIN threads t ON p.thread_id = t.id
                              WHERE t.category_id = categories.id)
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_thread(
        &self,
        category_id: Uuid,
        author_id: Uuid,
        title: &str,
        body: &str,
    ) -> ApiResult<Thread> {
        let thread = sqlx::query_as::<_, Thread>(
            r#"
            INSERT INTO threads (id, category_id, author_id, title, body, pinned, locked,
                                 view_count, reply_count, last_reply_at, last_reply_by,
                                 created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, false, false, 0, 0, NULL, NULL, NOW(), NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(category_id)
        .bind(author_id)
        .bind(title)
        .bind(body)
        .fetch_one(&self.pool)
        .await?;
        Ok(thread)
    }

    async fn find_thread(&self, id: Uuid) -> ApiResult<Option<Thread>> {
        let thread = sqlx::query_as::<_, Thread>("SELECT * FROM threads WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(thread)
    }

    async fn adjust_thread_replies(&self, id: Uuid, delta: i64) -> ApiResult<()> {
        sqlx::query(
            r#"
            UPDATE threads
            SET reply_count = GREATEST(reply_count + $2, 0), updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(delta)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_thread_last_reply(
        &self,
        id: Uuid,
        last: Option<(DateTime<Utc>, Uuid)>,
    ) -> ApiResult<()> {
        let (at, by) = match last {
            Some((at, by)) => (Some(at), Some(by)),
            None => (None, None),
        };
        sqlx::query("UPDATE threads SET last_reply_at = $2, last_reply_by = $3 WHERE id = $1")
            .bind(id)
            .bind(at)
            .bind(by)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn increment_thread_views(&self, id: Uuid) -> ApiResult<()> {
        sqlx::query("UPDATE threads SET view_count = view_count + 1 WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_thread_flags(&self, id: Uuid, pinned: bool, locked: bool) -> ApiResult<bool> {
        let result = sqlx::query(
            "UPDATE threads SET pinned = $2, locked = $3, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(pinned)
        .bind(locked)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_thread_cascade(&self, id: Uuid) -> ApiResult<Vec<Post>> {
        let mut tx = self.pool.begin().await?;

        let posts = sqlx::query_as::<_, Post>(
            "DELETE FROM posts WHERE thread_id = $1 RETURNING *",
        )
        .bind(id)
        .fetch_all(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM threads WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(posts)
    }

    async fn list_posts_in_thread(&self, thread_id: Uuid) -> ApiResult<Vec<Post>> {
        let posts = sqlx::query_as::<_, Post>(
            "SELECT * FROM posts WHERE thread_id = $1 ORDER BY created_at ASC, id ASC",
        )
        .bind(thread_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(posts)
    }

    async fn latest_post_in_thread(&self, thread_id: Uuid) -> ApiResult<Option<Post>> {
        let post = sqlx::query_as::<_, Post>(
            "SELECT * FROM posts WHERE thread_id = $1 ORDER BY created_at DESC, id DESC LIMIT 1",
        )
        .bind(thread_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(post)
    }

    async fn insert_post(
        &self,
        thread_id: Uuid,
        author_id: Uuid,
        parent_id: Option<Uuid>,
        body: &str,
    ) -> ApiResult<Post> {
        let post = sqlx::query_as::<_, Post>(
            r#"
            INSERT INTO posts (id, thread_id, author_id, parent_id, body, edited, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, false, NOW(), NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(thread_id)
        .bind(author_id)
        .bind(parent_id)
        .bind(body)
        .fetch_one(&self.pool)
        .await?;
        Ok(post)
    }

    async fn find_post(&self, id: Uuid) -> ApiResult<Option<Post>> {
        let post = sqlx::query_as::<_, Post>("SELECT * FROM posts WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(post)
    }

    async fn delete_post(&self, id: Uuid) -> ApiResult<bool> {
        let result = sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_pending_request_for(
        &self,
        user_id: Uuid,
    ) -> ApiResult<Option<PrivateAccessRequest>> {
        let request = sqlx::query_as::<_, PrivateAccessRequest>(
            "SELECT * FROM access_requests WHERE user_id = $1 AND status = 'pending'",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(request)
    }

    async fn insert_access_request(
        &self,
        user_id: Uuid,
        justification: &str,
    ) -> ApiResult<PrivateAccessRequest> {
        // The partial unique index on (user_id) WHERE status = 'pending'
        // backstops the service-level check under concurrent submissions.
        let request = sqlx::query_as::<_, PrivateAccessRequest>(
            r#"
            INSERT INTO access_requests (id, user_id, justification, status, created_at)
            VALUES ($1, $2, $3, 'pending', NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(justification)
        .fetch_one(&self.pool)
        .await?;
        Ok(request)
    }

    async fn find_access_request(&self, id: Uuid) -> ApiResult<Option<PrivateAccessRequest>> {
        let request =
            sqlx::query_as::<_, PrivateAccessRequest>("SELECT * FROM access_requests WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(request)
    }

    async fn resolve_access_request(
        &self,
        id: Uuid,
        status: RequestStatus,
        reviewer: Uuid,
    ) -> ApiResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE access_requests
            SET status = $2, reviewed_by = $3, reviewed_at = NOW()
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .bind(status)
        .bind(reviewer)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_pending_requests(&self) -> ApiResult<Vec<PrivateAccessRequest>> {
        let requests = sqlx::query_as::<_, PrivateAccessRequest>(
            "SELECT * FROM access_requests WHERE status = 'pending' ORDER BY created_at ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(requests)
    }

    async fn append_moderation_entry(
        &self,
        actor: Uuid,
        action: ModerationAction,
        target: Option<Uuid>,
        reason: Option<&str>,
        details: Option<&str>,
    ) -> ApiResult<ModerationLogEntry> {
        let entry = sqlx::query_as::<_, ModerationLogEntry>(
            r#"
            INSERT INTO moderation_log (id, actor_id, action, target_user_id, reason, details, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(actor)
        .bind(action)
        .bind(target)
        .bind(reason)
        .bind(details)
        .fetch_one(&self.pool)
        .await?;
        Ok(entry)
    }

    async fn recent_moderation_entries(&self, limit: i64) -> ApiResult<Vec<ModerationLogEntry>> {
        let entries = sqlx::query_as::<_, ModerationLogEntry>(
            "SELECT * FROM moderation_log ORDER BY created_at DESC, id DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }

    async fn insert_ip_ban(
        &self,
        address: &str,
        reason: &str,
        issued_by: Uuid,
        expires_at: Option<DateTime<Utc>>,
    ) -> ApiResult<BannedIp> {
        let ban = sqlx::query_as::<_, BannedIp>(
            r#"
            INSERT INTO banned_ips (id, address, reason, issued_by, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5, NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(address)
        .bind(reason)
        .bind(issued_by)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(ban)
    }

    async fn find_active_ip_ban(&self, address: &str) -> ApiResult<Option<BannedIp>> {
        let ban = sqlx::query_as::<_, BannedIp>(
            r#"
            SELECT * FROM banned_ips
            WHERE address = $1 AND (expires_at IS NULL OR expires_at > NOW())
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(address)
        .fetch_optional(&self.pool)
        .await?;
        Ok(ban)
    }

    async fn reconcile_counters(&self) -> ApiResult<ReconciliationReport> {
        let categories = sqlx::query(
            r#"
            UPDATE categories c
            SET thread_count = agg.tc, post_count = agg.pc
            FROM (
                SELECT c2.id,
                       (SELECT COUNT(*) FROM threads t WHERE t.category_id = c2.id) AS tc,
                       (SELECT COUNT(*)
                        FROM posts p
                        JOIN threads t ON p.thread_id = t.id
                        WHERE t.category_id = c2.id) AS pc
                FROM categories c2
            ) agg
            WHERE agg.id = c.id AND (c.thread_count <> agg.tc OR c.post_count <> agg.pc)
            "#,
        )
        .execute(&self.pool)
        .await?;

        let threads = sqlx::query(
            r#"
            UPDATE threads t
            SET reply_count = agg.rc, last_reply_at = agg.lat, last_reply_by = agg.lby
            FROM (
                SELECT th.id,
                       COUNT(p.id) AS rc,
                       MAX(p.created_at) AS lat,
                       (SELECT p2.author_id FROM posts p2
                        WHERE p2.thread_id = th.id
                        ORDER BY p2.created_at DESC, p2.id DESC
                        LIMIT 1) AS lby
                FROM threads th
                LEFT JOIN posts p ON p.thread_id = th.id
                GROUP BY th.id
            ) agg
            WHERE agg.id = t.id
              AND (t.reply_count <> agg.rc
                   OR t.last_reply_at IS DISTINCT FROM agg.lat
                   OR t.last_reply_by IS DISTINCT FROM agg.lby)
            "#,
        )
        .execute(&self.pool)
        .await?;

        let users = sqlx::query(
            r#"
            UPDATE users u
            SET thread_count = agg.tc, post_count = agg.pc
            FROM (
                SELECT u2.id,
                       (SELECT COUNT(*) FROM threads t WHERE t.author_id = u2.id) AS tc,
                       (SELECT COUNT(*) FROM posts p WHERE p.author_id = u2.id) AS pc
                FROM users u2
            ) agg
            WHERE agg.id = u.id AND (u.thread_count <> agg.tc OR u.post_count <> agg.pc)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(ReconciliationReport {
            categories_fixed: categories.rows_affected(),
            threads_fixed: threads.rows_affected(),
            users_fixed: users.rows_affected(),
        })
    }
}

// Re-exported beside the trait so callers wire either backend the same way.
pub use crate::memory::MemoryRepository;
