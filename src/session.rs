use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use rand::RngCore;
use std::sync::Arc;
use uuid::Uuid;

/// SessionRecord
///
/// Everything the server keeps for one login: the owning user, the bound
/// anti-forgery token, and the lifetime window. The token lives inside the
/// record, so destroying the session invalidates the token implicitly.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub user_id: Uuid,
    pub csrf_token: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// SessionStore
///
/// The shared session map, keyed by opaque session id. Session ids and
/// anti-forgery tokens are 32 random bytes, base64 url-safe encoded.
/// Create, resolve, destroy, and rotate are the only lifecycle operations;
/// nothing else mutates session state.
pub struct SessionStore {
    sessions: DashMap<String, SessionRecord>,
    ttl: Duration,
}

/// The concrete type used to share the session store across the application state.
pub type SessionState = Arc<SessionStore>;

fn random_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

impl SessionStore {
    pub fn new(ttl_hours: i64) -> Self {
        Self {
            sessions: DashMap::new(),
            ttl: Duration::hours(ttl_hours),
        }
    }

    /// Creates a session for a freshly authenticated user and mints its
    /// anti-forgery token. Returns the opaque session id plus the record.
    pub fn create(&self, user_id: Uuid) -> (String, SessionRecord) {
        let now = Utc::now();
        let record = SessionRecord {
            user_id,
            csrf_token: random_token(),
            created_at: now,
            expires_at: now + self.ttl,
        };
        let session_id = random_token();
        self.sessions.insert(session_id.clone(), record.clone());
        (session_id, record)
    }

    /// Resolves a session id to its record. Expired sessions are removed on
    /// the spot and resolve to nothing.
    pub fn resolve(&self, session_id: &str) -> Option<SessionRecord> {
        let expired = match self.sessions.get(session_id) {
            Some(record) if record.expires_at > Utc::now() => return Some(record.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.sessions.remove(session_id);
        }
        None
    }

    /// Destroys a session (logout, ban detection, dangling user). The bound
    /// anti-forgery token dies with it.
    pub fn destroy(&self, session_id: &str) -> bool {
        self.sessions.remove(session_id).is_some()
    }

    /// Replaces the session's anti-forgery token, returning the new one.
    pub fn rotate_csrf(&self, session_id: &str) -> Option<String> {
        let mut entry = self.sessions.get_mut(session_id)?;
        let token = random_token();
        entry.csrf_token = token.clone();
        Some(token)
    }

    /// The session's current anti-forgery token.
    pub fn csrf_token(&self, session_id: &str) -> Option<String> {
        self.resolve(session_id).map(|record| record.csrf_token)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
