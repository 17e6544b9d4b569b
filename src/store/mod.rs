/// Persistence
///
/// Two stores back the session core: the credential store (users) and the
/// refresh token ledger. Both are traits so the core can run against Postgres
/// in production and against the in-memory implementation in tests.

mod memory;
mod postgres;
#[cfg(test)]
pub(crate) mod testing;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::DatabaseError;

pub use memory::{InMemoryLedger, InMemoryUserStore};
pub use postgres::{PgLedger, PgUserStore};

pub type StoreResult<T> = Result<T, DatabaseError>;

/// A stored user, including the password hash.
///
/// Never serialized; use [`User`] for anything leaving the process.
#[derive(Clone, sqlx::FromRow)]
pub struct UserRecord {
    pub id: i64,
    pub email: String,
    /// `None` for identities provisioned without a password
    pub password_hash: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl std::fmt::Debug for UserRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserRecord")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("has_password", &self.password_hash.is_some())
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Public user fields
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

impl From<UserRecord> for User {
    fn from(record: UserRecord) -> Self {
        Self {
            id: record.id,
            email: record.email,
            created_at: record.created_at,
        }
    }
}

/// One row of the refresh token ledger
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct RefreshTokenRecord {
    pub id: i64,
    pub user_id: i64,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
    pub created_at: DateTime<Utc>,
}

impl RefreshTokenRecord {
    /// A grant is usable iff it is not revoked and not yet expired.
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        !self.revoked && now < self.expires_at
    }
}

/// Hex SHA-256 of a token string, the form in which tokens are stored.
pub fn token_fingerprint(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Credential store
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Looks a user up by already-normalized email.
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<UserRecord>>;

    /// Inserts a password user. A taken email yields
    /// `DatabaseError::UniqueConstraintViolation`.
    async fn create(&self, email: &str, password_hash: &str) -> StoreResult<UserRecord>;
}

/// Refresh token ledger
///
/// Token arguments are the signed token strings; implementations store and
/// compare their [`token_fingerprint`].
#[async_trait]
pub trait RefreshTokenLedger: Send + Sync {
    async fn insert(
        &self,
        user_id: i64,
        token: &str,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<RefreshTokenRecord>;

    /// Returns the row matching token AND user AND not revoked AND not expired.
    /// A miss on any of the four is indistinguishable from the others.
    async fn find_usable(
        &self,
        token: &str,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<RefreshTokenRecord>>;

    /// Flips `revoked` to true. Returns `true` only for the call that
    /// performed the flip, `false` if the row was already revoked or absent.
    async fn revoke(&self, id: i64) -> StoreResult<bool>;

    /// Revokes the non-revoked row holding `token`, if any.
    async fn revoke_by_token(&self, token: &str) -> StoreResult<u64>;

    async fn revoke_all_for_user(&self, user_id: i64) -> StoreResult<u64>;

    /// Deletes rows expired before `now` and rows revoked that were created
    /// before `revoked_before`. Returns the number of rows deleted.
    async fn sweep(&self, now: DateTime<Utc>, revoked_before: DateTime<Utc>) -> StoreResult<u64>;
}
