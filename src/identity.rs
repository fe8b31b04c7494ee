use crate::error::{ApiError, ApiResult};
use crate::models::{BannedIp, Role, User};
use crate::repository::RepositoryState;
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// IdentityStore
///
/// Owns identity records: registration, credential verification, and the
/// moderation-side mutations (role, ban, grant). Passwords are argon2 PHC
/// strings; verification is the library's constant-time comparison.
#[derive(Clone)]
pub struct IdentityStore {
    repo: RepositoryState,
}

impl IdentityStore {
    pub fn new(repo: RepositoryState) -> Self {
        Self { repo }
    }

    /// Registers a new account with role `new_member`. Fails `Validation` on
    /// malformed input, `Forbidden` when the caller's address is banned, and
    /// `Conflict` when the username or email is already taken.
    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
        client_ip: Option<&str>,
    ) -> ApiResult<User> {
        validate_username(username)?;
        validate_email(email)?;
        validate_password(password)?;

        if let Some(ip) = client_ip {
            if let Some(ban) = self.repo.find_active_ip_ban(ip).await? {
                return Err(ApiError::Forbidden(format!(
                    "registration blocked: {}",
                    ban.reason
                )));
            }
        }

        if self.repo.find_user_by_email(email).await?.is_some() {
            return Err(ApiError::Conflict("email already registered".to_string()));
        }
        if self.repo.find_user_by_username(username).await?.is_some() {
            return Err(ApiError::Conflict("username already taken".to_string()));
        }

        let hash = hash_password(password)?;
        self.repo.insert_user(username, email, &hash).await
    }

    /// Verifies a login attempt. Unknown email and bad password are the same
    /// failure kind so the response does not leak which one it was; a banned
    /// account fails `Forbidden` even with correct credentials.
    pub async fn authenticate(&self, email: &str, password: &str) -> ApiResult<User> {
        let user = self
            .repo
            .find_user_by_email(email)
            .await?
            .ok_or(ApiError::Unauthenticated)?;

        if !verify_password(&user.password_hash, password) {
            return Err(ApiError::Unauthenticated);
        }
        if user.banned {
            return Err(ApiError::Forbidden(match &user.ban_reason {
                Some(reason) => format!("account banned: {reason}"),
                None => "account banned".to_string(),
            }));
        }
        Ok(user)
    }

    pub async fn find(&self, id: Uuid) -> ApiResult<Option<User>> {
        self.repo.find_user(id).await
    }

    pub async fn set_role(&self, id: Uuid, role: Role) -> ApiResult<()> {
        if !self.repo.set_user_role(id, role).await? {
            return Err(ApiError::NotFound("user".to_string()));
        }
        Ok(())
    }

    pub async fn set_banned(&self, id: Uuid, reason: &str) -> ApiResult<()> {
        if !self.repo.set_user_banned(id, reason).await? {
            return Err(ApiError::NotFound("user".to_string()));
        }
        Ok(())
    }

    pub async fn grant_private_access(&self, id: Uuid) -> ApiResult<()> {
        if !self.repo.grant_private_access(id).await? {
            return Err(ApiError::NotFound("user".to_string()));
        }
        Ok(())
    }

    pub async fn ban_ip(
        &self,
        address: &str,
        reason: &str,
        issued_by: Uuid,
        expires_at: Option<DateTime<Utc>>,
    ) -> ApiResult<BannedIp> {
        if address.trim().is_empty() {
            return Err(ApiError::Validation("address must not be empty".to_string()));
        }
        self.repo
            .insert_ip_ban(address.trim(), reason, issued_by, expires_at)
            .await
    }
}

fn hash_password(password: &str) -> ApiResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| ApiError::Internal(format!("password hashing failed: {e}")))?;
    Ok(hash.to_string())
}

fn verify_password(stored_hash: &str, password: &str) -> bool {
    let parsed = match PasswordHash::new(stored_hash) {
        Ok(parsed) => parsed,
        Err(_) => return false,
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

fn validate_username(username: &str) -> ApiResult<()> {
    let len = username.chars().count();
    if !(3..=32).contains(&len) {
        return Err(ApiError::Validation(
            "username must be 3-32 characters".to_string(),
        ));
    }
    if !username.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(ApiError::Validation(
            "username may contain only letters, digits, and underscores".to_string(),
        ));
    }
    Ok(())
}

fn validate_email(email: &str) -> ApiResult<()> {
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.')
        }
        None => false,
    };
    if !valid {
        return Err(ApiError::Validation("email address is invalid".to_string()));
    }
    Ok(())
}

fn validate_password(password: &str) -> ApiResult<()> {
    if password.chars().count() < 8 {
        return Err(ApiError::Validation(
            "password must be at least 8 characters".to_string(),
        ));
    }
    Ok(())
}
