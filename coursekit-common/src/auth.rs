//! Session token resolution and role checks
//!
//! A session token is an opaque random string handed to the client at login.
//! Only its SHA-256 digest is persisted; lookups hash the presented token and
//! match on the digest.

use async_trait::async_trait;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::Result;

#[cfg(feature = "sqlx")]
use sqlx::{Row, SqlitePool};

/// Roles allowed to run administrative operations unless configured otherwise
pub const DEFAULT_ADMIN_ROLES: &[&str] = &["admin", "superadmin"];

/// User record resolved from a session token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: Uuid,
    pub email: String,
    pub role: String,
}

impl SessionUser {
    /// True if this user's role is one of `admin_roles` (case-insensitive)
    pub fn has_any_role(&self, admin_roles: &[String]) -> bool {
        admin_roles
            .iter()
            .any(|role| role.eq_ignore_ascii_case(self.role.trim()))
    }
}

/// Resolves session credentials to user records
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Returns `Ok(None)` for unknown or expired tokens
    async fn resolve_session(&self, token: &str) -> Result<Option<SessionUser>>;
}

/// SHA-256 hex digest of a session token
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Generate a new random session token (64 hex characters)
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Extract the token from an `Authorization: Bearer <token>` header value
pub fn bearer_token(header_value: &str) -> Option<&str> {
    let (scheme, token) = header_value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Identity provider backed by the shared `users`/`user_sessions` tables
#[cfg(feature = "sqlx")]
#[derive(Clone)]
pub struct SqliteIdentityProvider {
    pool: SqlitePool,
}

#[cfg(feature = "sqlx")]
impl SqliteIdentityProvider {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[cfg(feature = "sqlx")]
#[async_trait]
impl IdentityProvider for SqliteIdentityProvider {
    async fn resolve_session(&self, token: &str) -> Result<Option<SessionUser>> {
        let row = sqlx::query(
            r#"
            SELECT u.id, u.email, u.role, s.expires_at
            FROM user_sessions s
            JOIN users u ON u.id = s.user_id
            WHERE s.token_hash = ?
            "#,
        )
        .bind(hash_token(token))
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let expires_at: String = row.get("expires_at");
        let expired = chrono::DateTime::parse_from_rfc3339(&expires_at)
            .map(|t| t.with_timezone(&chrono::Utc) <= chrono::Utc::now())
            .unwrap_or(true);
        if expired {
            tracing::debug!("Session token expired");
            return Ok(None);
        }

        let id: String = row.get("id");
        let id = Uuid::parse_str(&id)
            .map_err(|e| crate::Error::Internal(format!("Invalid user id {}: {}", id, e)))?;

        Ok(Some(SessionUser {
            id,
            email: row.get("email"),
            role: row.get("role"),
        }))
    }
}

/// Insert a user and return its id
#[cfg(feature = "sqlx")]
pub async fn create_user(pool: &SqlitePool, email: &str, role: &str) -> Result<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO users (id, email, role) VALUES (?, ?, ?)")
        .bind(id.to_string())
        .bind(email)
        .bind(role)
        .execute(pool)
        .await?;
    Ok(id)
}

/// Issue a session for `user_id` valid for `ttl`; returns the clear token
#[cfg(feature = "sqlx")]
pub async fn issue_session(
    pool: &SqlitePool,
    user_id: Uuid,
    ttl: chrono::Duration,
) -> Result<String> {
    let token = generate_token();
    let now = chrono::Utc::now();

    sqlx::query(
        "INSERT INTO user_sessions (token_hash, user_id, created_at, expires_at) VALUES (?, ?, ?, ?)",
    )
    .bind(hash_token(&token))
    .bind(user_id.to_string())
    .bind(now.to_rfc3339())
    .bind((now + ttl).to_rfc3339())
    .execute(pool)
    .await?;

    Ok(token)
}
