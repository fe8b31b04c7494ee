use crate::error::{ApiError, ApiResult};
use crate::models::{
    BannedIp, Category, ModerationAction, ModerationLogEntry, Post, PrivateAccessRequest,
    ReconciliationReport, RequestStatus, Role, Thread, User,
};
use crate::repository::Repository;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

/// MemoryRepository
///
/// An in-memory implementation of `Repository` used by the test suite and for
/// local bring-up without a database. A single `RwLock` guards the whole
/// store, so every trait method is atomic with respect to other callers —
/// the same per-call guarantee the Postgres implementation gives.
#[derive(Default)]
pub struct MemoryRepository {
    inner: RwLock<Store>,
}

#[derive(Default)]
struct Store {
    users: HashMap<Uuid, User>,
    categories: HashMap<Uuid, Category>,
    threads: HashMap<Uuid, Thread>,
    posts: HashMap<Uuid, Post>,
    access_requests: HashMap<Uuid, PrivateAccessRequest>,
    moderation_log: Vec<ModerationLogEntry>,
    banned_ips: Vec<BannedIp>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store {
    fn latest_post_in(&self, thread_id: Uuid) -> Option<&Post> {
        self.posts
            .values()
            .filter(|p| p.thread_id == thread_id)
            .max_by_key(|p| (p.created_at, p.id))
    }

    fn live_counts_for_category(&self, category_id: Uuid) -> (i64, i64) {
        let threads = self
            .threads
            .values()
            .filter(|t| t.category_id == category_id)
            .count() as i64;
        let posts = self
            .posts
            .values()
            .filter(|p| {
                self.threads
                    .get(&p.thread_id)
                    .is_some_and(|t| t.category_id == category_id)
            })
            .count() as i64;
        (threads, posts)
    }

    fn live_counts_for_user(&self, user_id: Uuid) -> (i64, i64) {
        let threads = self
            .threads
            .values()
            .filter(|t| t.author_id == user_id)
            .count() as i64;
        let posts = self
            .posts
            .values()
            .filter(|p| p.author_id == user_id)
            .count() as i64;
        (threads, posts)
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn find_user(&self, id: Uuid) -> ApiResult<Option<User>> {
        let store = self.inner.read().unwrap();
        Ok(store.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> ApiResult<Option<User>> {
        let store = self.inner.read().unwrap();
        Ok(store.users.values().find(|u| u.email == email).cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> ApiResult<Option<User>> {
        let store = self.inner.read().unwrap();
        Ok(store
            .users
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn insert_user(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
    ) -> ApiResult<User> {
        let mut store = self.inner.write().unwrap();
        if store
            .users
            .values()
            .any(|u| u.email == email || u.username == username)
        {
            return Err(ApiError::Conflict("duplicate value".to_string()));
        }
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            username: username.to_string(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            role: Role::NewMember,
            banned: false,
            ban_reason: None,
            has_private_access: false,
            thread_count: 0,
            post_count: 0,
            created_at: now,
            updated_at: now,
        };
        store.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn set_user_role(&self, id: Uuid, role: Role) -> ApiResult<bool> {
        let mut store = self.inner.write().unwrap();
        match store.users.get_mut(&id) {
            Some(user) => {
                user.role = role;
                user.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn set_user_banned(&self, id: Uuid, reason: &str) -> ApiResult<bool> {
        let mut store = self.inner.write().unwrap();
        match store.users.get_mut(&id) {
            Some(user) => {
                user.banned = true;
                user.ban_reason = Some(reason.to_string());
                user.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn grant_private_access(&self, id: Uuid) -> ApiResult<bool> {
        let mut store = self.inner.write().unwrap();
        match store.users.get_mut(&id) {
            Some(user) => {
                user.has_private_access = true;
                user.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn adjust_user_counters(
        &self,
        id: Uuid,
        thread_delta: i64,
        post_delta: i64,
    ) -> ApiResult<()> {
        let mut store = self.inner.write().unwrap();
        if let Some(user) = store.users.get_mut(&id) {
            user.thread_count = (user.thread_count + thread_delta).max(0);
            user.post_count = (user.post_count + post_delta).max(0);
            user.updated_at = Utc::now();
        }
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
        let mut store = self.inner.write().unwrap();
        if store.categories.values().any(|c| c.slug == slug) {
            return Err(ApiError::Conflict("duplicate value".to_string()));
        }
        let category = Category {
            id: Uuid::new_v4(),
            slug: slug.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            is_private,
            thread_count: 0,
            post_count: 0,
            sort_order,
            created_at: Utc::now(),
        };
        store.categories.insert(category.id, category.clone());
        Ok(category)
    }

    async fn find_category(&self, id: Uuid) -> ApiResult<Option<Category>> {
        let store = self.inner.read().unwrap();
        Ok(store.categories.get(&id).cloned())
    }

    async fn find_category_by_slug(&self, slug: &str) -> ApiResult<Option<Category>> {
        let store = self.inner.read().unwrap();
        Ok(store.categories.values().find(|c| c.slug == slug).cloned())
    }

    async fn adjust_category_counters(
        &self,
        id: Uuid,
        thread_delta: i64,
        post_delta: i64,
    ) -> ApiResult<()> {
        let mut store = self.inner.write().unwrap();
        if let Some(category) = store.categories.get_mut(&id) {
            category.thread_count = (category.thread_count + thread_delta).max(0);
            category.post_count = (category.post_count + post_delta).max(0);
        }
        Ok(())
    }

    async fn recount_category(&self, id: Uuid) -> ApiResult<()> {
        let mut store = self.inner.write().unwrap();
        let (threads, posts) = store.live_counts_for_category(id);
        if let Some(category) = store.categories.get_mut(&id) {
            category.thread_count = threads;
            category.post_count = posts;
        }
        Ok(())
    }

    async fn insert_thread(
        &self,
        category_id: Uuid,
        author_id: Uuid,
        title: &str,
        body: &str,
    ) -> ApiResult<Thread> {
        let mut store = self.inner.write().unwrap();
        let now = Utc::now();
        let thread = Thread {
            id: Uuid::new_v4(),
            category_id,
            author_id,
            title: title.to_string(),
            body: body.to_string(),
            pinned: false,
            locked: false,
            view_count: 0,
            reply_count: 0,
            last_reply_at: None,
            last_reply_by: None,
            created_at: now,
            updated_at: now,
        };
        store.threads.insert(thread.id, thread.clone());
        Ok(thread)
    }

    async fn find_thread(&self, id: Uuid) -> ApiResult<Option<Thread>> {
        let store = self.inner.read().unwrap();
        Ok(store.threads.get(&id).cloned())
    }

    async fn adjust_thread_replies(&self, id: Uuid, delta: i64) -> ApiResult<()> {
        let mut store = self.inner.write().unwrap();
        if let Some(thread) = store.threads.get_mut(&id) {
            thread.reply_count = (thread.reply_count + delta).max(0);
            thread.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn set_thread_last_reply(
        &self,
        id: Uuid,
        last: Option<(DateTime<Utc>, Uuid)>,
    ) -> ApiResult<()> {
        let mut store = self.inner.write().unwrap();
        if let Some(thread) = store.threads.get_mut(&id) {
            match last {
                Some((at, by)) => {
                    thread.last_reply_at = Some(at);
                    thread.last_reply_by = Some(by);
                }
                None => {
                    thread.last_reply_at = None;
                    thread.last_reply_by = None;
                }
            }
        }
        Ok(())
    }

    async fn increment_thread_views(&self, id: Uuid) -> ApiResult<()> {
        let mut store = self.inner.write().unwrap();
        if let Some(thread) = store.threads.get_mut(&id) {
            thread.view_count += 1;
        }
        Ok(())
    }

    async fn set_thread_flags(&self, id: Uuid, pinned: bool, locked: bool) -> ApiResult<bool> {
        let mut store = self.inner.write().unwrap();
        match store.threads.get_mut(&id) {
            Some(thread) => {
                thread.pinned = pinned;
                thread.locked = locked;
                thread.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_thread_cascade(&self, id: Uuid) -> ApiResult<Vec<Post>> {
        let mut store = self.inner.write().unwrap();
        let removed_ids: Vec<Uuid> = store
            .posts
            .values()
            .filter(|p| p.thread_id == id)
            .map(|p| p.id)
            .collect();
        let mut removed = Vec::with_capacity(removed_ids.len());
        for post_id in removed_ids {
            if let Some(post) = store.posts.remove(&post_id) {
                removed.push(post);
            }
        }
        store.threads.remove(&id);
        removed.sort_by_key(|p| (p.created_at, p.id));
        Ok(removed)
    }

    async fn list_posts_in_thread(&self, thread_id: Uuid) -> ApiResult<Vec<Post>> {
        let store = self.inner.read().unwrap();
        let mut posts: Vec<Post> = store
            .posts
            .values()
            .filter(|p| p.thread_id == thread_id)
            .cloned()
            .collect();
        posts.sort_by_key(|p| (p.created_at, p.id));
        Ok(posts)
    }

    async fn latest_post_in_thread(&self, thread_id: Uuid) -> ApiResult<Option<Post>> {
        let store = self.inner.read().unwrap();
        Ok(store.latest_post_in(thread_id).cloned())
    }

    async fn insert_post(
        &self,
        thread_id: Uuid,
        author_id: Uuid,
        parent_id: Option<Uuid>,
        body: &str,
    ) -> ApiResult<Post> {
        let mut store = self.inner.write().unwrap();
        let now = Utc::now();
        let post = Post {
            id: Uuid::new_v4(),
            thread_id,
            author_id,
            parent_id,
            body: body.to_string(),
            edited: false,
            created_at: now,
            updated_at: now,
        };
        store.posts.insert(post.id, post.clone());
        Ok(post)
    }

    async fn find_post(&self, id: Uuid) -> ApiResult<Option<Post>> {
        let store = self.inner.read().unwrap();
        Ok(store.posts.get(&id).cloned())
    }

    async fn delete_post(&self, id: Uuid) -> ApiResult<bool> {
        let mut store = self.inner.write().unwrap();
        Ok(store.posts.remove(&id).is_some())
    }

    async fn find_pending_request_for(
        &self,
        user_id: Uuid,
    ) -> ApiResult<Option<PrivateAccessRequest>> {
        let store = self.inner.read().unwrap();
        Ok(store
            .access_requests
            .values()
            .find(|r| r.user_id == user_id && r.status == RequestStatus::Pending)
            .cloned())
    }

    async fn insert_access_request(
        &self,
        user_id: Uuid,
        justification: &str,
    ) -> ApiResult<PrivateAccessRequest> {
        let mut store = self.inner.write().unwrap();
        // Same guarantee as the partial unique index in Postgres.
        if store
            .access_requests
            .values()
            .any(|r| r.user_id == user_id && r.status == RequestStatus::Pending)
        {
            return Err(ApiError::Conflict("duplicate value".to_string()));
        }
        let request = PrivateAccessRequest {
            id: Uuid::new_v4(),
            user_id,
            justification: justification.to_string(),
            status: RequestStatus::Pending,
            reviewed_by: None,
            reviewed_at: None,
            created_at: Utc::now(),
        };
        store.access_requests.insert(request.id, request.clone());
        Ok(request)
    }

    async fn find_access_request(&self, id: Uuid) -> ApiResult<Option<PrivateAccessRequest>> {
        let store = self.inner.read().unwrap();
        Ok(store.access_requests.get(&id).cloned())
    }

    async fn resolve_access_request(
        &self,
        id: Uuid,
        status: RequestStatus,
        reviewer: Uuid,
    ) -> ApiResult<bool> {
        let mut store = self.inner.write().unwrap();
        match store.access_requests.get_mut(&id) {
            Some(request) if request.status == RequestStatus::Pending => {
                request.status = status;
                request.reviewed_by = Some(reviewer);
                request.reviewed_at = Some(Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_pending_requests(&self) -> ApiResult<Vec<PrivateAccessRequest>> {
        let store = self.inner.read().unwrap();
        let mut requests: Vec<PrivateAccessRequest> = store
            .access_requests
            .values()
            .filter(|r| r.status == RequestStatus::Pending)
            .cloned()
            .collect();
        requests.sort_by_key(|r| (r.created_at, r.id));
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
        let mut store = self.inner.write().unwrap();
        let entry = ModerationLogEntry {
            id: Uuid::new_v4(),
            actor_id: actor,
            action,
            target_user_id: target,
            reason: reason.map(str::to_string),
            details: details.map(str::to_string),
            created_at: Utc::now(),
        };
        store.moderation_log.push(entry.clone());
        Ok(entry)
    }

    async fn recent_moderation_entries(&self, limit: i64) -> ApiResult<Vec<ModerationLogEntry>> {
        let store = self.inner.read().unwrap();
        Ok(store
            .moderation_log
            .iter()
            .rev()
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn insert_ip_ban(
        &self,
        address: &str,
        reason: &str,
        issued_by: Uuid,
        expires_at: Option<DateTime<Utc>>,
    ) -> ApiResult<BannedIp> {
        let mut store = self.inner.write().unwrap();
        let ban = BannedIp {
            id: Uuid::new_v4(),
            address: address.to_string(),
            reason: reason.to_string(),
            issued_by,
            expires_at,
            created_at: Utc::now(),
        };
        store.banned_ips.push(ban.clone());
        Ok(ban)
    }

    async fn find_active_ip_ban(&self, address: &str) -> ApiResult<Option<BannedIp>> {
        let store = self.inner.read().unwrap();
        let now = Utc::now();
        Ok(store
            .banned_ips
            .iter()
            .rev()
            .find(|b| b.address == address && b.expires_at.is_none_or(|exp| exp > now))
            .cloned())
    }

    async fn reconcile_counters(&self) -> ApiResult<ReconciliationReport> {
        let mut store = self.inner.write().unwrap();
        let mut report = ReconciliationReport::default();

        let category_counts: Vec<(Uuid, i64, i64)> = store
            .categories
            .keys()
            .map(|&id| {
                let (threads, posts) = store.live_counts_for_category(id);
                (id, threads, posts)
            })
            .collect();
        for (id, threads, posts) in category_counts {
            let category = store.categories.get_mut(&id).unwrap();
            if category.thread_count != threads || category.post_count != posts {
                category.thread_count = threads;
                category.post_count = posts;
                report.categories_fixed += 1;
            }
        }

        let thread_aggs: Vec<(Uuid, i64, Option<(DateTime<Utc>, Uuid)>)> = store
            .threads
            .keys()
            .map(|&id| {
                let replies = store
                    .posts
                    .values()
                    .filter(|p| p.thread_id == id)
                    .count() as i64;
                let last = store.latest_post_in(id).map(|p| (p.created_at, p.author_id));
                (id, replies, last)
            })
            .collect();
        for (id, replies, last) in thread_aggs {
            let thread = store.threads.get_mut(&id).unwrap();
            let (last_at, last_by) = match last {
                Some((at, by)) => (Some(at), Some(by)),
                None => (None, None),
            };
            if thread.reply_count != replies
                || thread.last_reply_at != last_at
                || thread.last_reply_by != last_by
            {
                thread.reply_count = replies;
                thread.last_reply_at = last_at;
                thread.last_reply_by = last_by;
                report.threads_fixed += 1;
            }
        }

        let user_counts: Vec<(Uuid, i64, i64)> = store
            .users
            .keys()
            .map(|&id| {
                let (threads, posts) = store.live_counts_for_user(id);
                (id, threads, posts)
            })
            .collect();
        for (id, threads, posts) in user_counts {
            let user = store.users.get_mut(&id).unwrap();
            if user.thread_count != threads || user.post_count != posts {
                user.thread_count = threads;
                user.post_count = posts;
                report.users_fixed += 1;
            }
        }

        Ok(report)
    }
}
