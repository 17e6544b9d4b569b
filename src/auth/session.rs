/// Session lifecycle
///
/// Issues access/refresh token pairs, rotates refresh tokens and revokes
/// them. Refresh tokens are single-use: a successful rotation revokes the
/// presented token, so replaying it later never finds a usable ledger row
/// even though its signature stays valid until it expires.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::auth::claims::Subject;
use crate::auth::credentials::Credentials;
use crate::auth::jwt::TokenCodec;
use crate::auth::password::PasswordHasher;
use crate::error::{AppError, AuthError};
use crate::store::{RefreshTokenLedger, User, UserRecord, UserStore};

/// A freshly minted credential pair
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Result of a login or registration
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub tokens: TokenPair,
    pub user: User,
}

#[derive(Clone)]
pub struct SessionManager {
    credentials: Credentials,
    ledger: Arc<dyn RefreshTokenLedger>,
    access: TokenCodec,
    refresh: TokenCodec,
}

impl SessionManager {
    pub fn new(
        users: Arc<dyn UserStore>,
        ledger: Arc<dyn RefreshTokenLedger>,
        hasher: PasswordHasher,
        access: TokenCodec,
        refresh: TokenCodec,
    ) -> Self {
        Self {
            credentials: Credentials::new(users, hasher),
            ledger,
            access,
            refresh,
        }
    }

    /// Codec the access guard verifies against.
    pub fn access_codec(&self) -> &TokenCodec {
        &self.access
    }

    /// Registers a new password user and opens a first session.
    ///
    /// # Errors
    /// Returns `AppError::Validation` for a policy violation and
    /// `AuthError::AlreadyRegistered` for a taken email.
    pub async fn register(&self, email: &str, password: &str) -> Result<IssuedSession, AppError> {
        let user = self.credentials.register_credentials(email, password).await?;
        tracing::info!(user_id = user.id, "User registered");

        self.open_session(user).await
    }

    /// Opens a new session for valid credentials. Earlier sessions of the
    /// same user stay usable.
    ///
    /// # Errors
    /// Returns `AuthError::InvalidCredentials` however the credentials fail.
    pub async fn login(&self, email: &str, password: &str) -> Result<IssuedSession, AppError> {
        let user = self.credentials.verify_credentials(email, password).await?;
        tracing::info!(user_id = user.id, "User logged in");

        self.open_session(user).await
    }

    /// Exchanges a usable refresh token for a new pair and revokes it.
    ///
    /// # Arguments
    /// * `presented` - Refresh token sent by the client
    ///
    /// # Errors
    /// Returns `AuthError::InvalidRefreshToken` for any token that cannot be
    /// rotated, including one that lost a concurrent rotation. A store
    /// failure after the revoke surfaces as `AppError::Database` and leaves
    /// the presented token revoked.
    pub async fn rotate(&self, presented: &str) -> Result<TokenPair, AppError> {
        let subject = self.refresh.verify(presented).map_err(|e| {
            tracing::debug!(reason = %e, "Refresh token failed verification");
            AuthError::InvalidRefreshToken
        })?;

        let now = Utc::now();
        let record = match self.ledger.find_usable(presented, subject.id, now).await? {
            Some(record) => record,
            None => {
                tracing::warn!(
                    user_id = subject.id,
                    "Well-signed refresh token has no usable ledger row"
                );
                return Err(AuthError::InvalidRefreshToken.into());
            }
        };

        let tokens = self.mint_pair(&subject, now)?;

        if !self.ledger.revoke(record.id).await? {
            tracing::warn!(
                user_id = subject.id,
                token_id = record.id,
                "Concurrent rotation of the same refresh token; this attempt lost"
            );
            return Err(AuthError::InvalidRefreshToken.into());
        }

        // If this insert fails the user has no usable refresh token left and
        // must log in again; the presented token is already revoked.
        self.persist(&subject, &tokens.refresh_token, now).await?;

        tracing::info!(user_id = subject.id, "Refresh token rotated");
        Ok(tokens)
    }

    /// Revokes one refresh token. Succeeds whether or not it matched a row.
    ///
    /// # Errors
    /// Returns `AppError::Database` only when the ledger fails.
    pub async fn logout(&self, refresh_token: &str) -> Result<(), AppError> {
        let revoked = self.ledger.revoke_by_token(refresh_token).await?;
        tracing::info!(revoked, "Logout");
        Ok(())
    }

    /// Revokes every live refresh token of a user. Access tokens already
    /// handed out stay valid until they expire.
    pub async fn logout_all(&self, user_id: i64) -> Result<u64, AppError> {
        let revoked = self.ledger.revoke_all_for_user(user_id).await?;
        tracing::info!(user_id, revoked, "Logged out of all sessions");
        Ok(revoked)
    }

    async fn open_session(&self, user: UserRecord) -> Result<IssuedSession, AppError> {
        let subject = Subject {
            id: user.id,
            email: user.email.clone(),
        };
        let now = Utc::now();

        let tokens = self.mint_pair(&subject, now)?;
        self.persist(&subject, &tokens.refresh_token, now).await?;

        Ok(IssuedSession {
            tokens,
            user: user.into(),
        })
    }

    fn mint_pair(&self, subject: &Subject, now: DateTime<Utc>) -> Result<TokenPair, AppError> {
        Ok(TokenPair {
            access_token: self.access.mint_at(subject, now)?,
            refresh_token: self.refresh.mint_at(subject, now)?,
        })
    }

    async fn persist(
        &self,
        subject: &Subject,
        refresh_token: &str,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let expires_at = now + self.refresh.ttl();
        self.ledger
            .insert(subject.id, refresh_token, now, expires_at)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::claims::TokenKind;
    use crate::auth::jwt::TokenError;
    use crate::store::testing::FaultyLedger;
    use crate::store::{InMemoryLedger, InMemoryUserStore};
    use actix_web::ResponseError;
    use chrono::Duration;

    struct Harness {
        sessions: SessionManager,
        users: InMemoryUserStore,
        ledger: InMemoryLedger,
    }

    fn harness() -> Harness {
        let ledger = InMemoryLedger::new();
        harness_over(ledger.clone(), Arc::new(ledger))
    }

    /// `ledger` is the in-memory state that `backing` ultimately writes to.
    fn harness_over(ledger: InMemoryLedger, backing: Arc<dyn RefreshTokenLedger>) -> Harness {
        let users = InMemoryUserStore::new();
        let sessions = SessionManager::new(
            Arc::new(users.clone()),
            backing,
            PasswordHasher::new(4),
            TokenCodec::new(
                TokenKind::Access,
                "access-secret-for-tests-only-0123456789",
                Duration::minutes(15),
                "test",
            ),
            TokenCodec::new(
                TokenKind::Refresh,
                "refresh-secret-for-tests-only-0123456789",
                Duration::days(30),
                "test",
            ),
        );
        Harness {
            sessions,
            users,
            ledger,
        }
    }

    #[tokio::test]
    async fn test_register_then_login() {
        let h = harness();
        let registered = h.sessions.register("alice@test.com", "secret1").await.unwrap();
        let logged_in = h.sessions.login("alice@test.com", "secret1").await.unwrap();

        let subject = h
            .sessions
            .access_codec()
            .verify(&logged_in.tokens.access_token)
            .unwrap();

        assert_eq!(subject.id, registered.user.id);
        assert_eq!(subject.email, "alice@test.com");
        assert_eq!(logged_in.user, registered.user);
        assert_eq!(h.ledger.rows_for_user(registered.user.id).len(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_registration() {
        let h = harness();
        h.sessions.register("alice@test.com", "secret1").await.unwrap();

        let err = h
            .sessions
            .register("ALICE@test.com", "another1")
            .await
            .unwrap_err();

        assert!(err.is_auth(AuthError::AlreadyRegistered));
        assert_eq!(h.users.len(), 1);
    }

    #[tokio::test]
    async fn test_login_rejects_password_less_identity() {
        let h = harness();
        h.users.insert_federated("carol@test.com");

        let err = h.sessions.login("carol@test.com", "secret1").await.unwrap_err();

        assert!(err.is_auth(AuthError::InvalidCredentials));
        assert!(h.ledger.is_empty());
    }

    #[tokio::test]
    async fn test_rotation_is_single_use() {
        let h = harness();
        let issued = h.sessions.register("alice@test.com", "secret1").await.unwrap();
        let first = issued.tokens.refresh_token;

        let rotated = h.sessions.rotate(&first).await.unwrap();
        assert_ne!(rotated.refresh_token, first);
        assert!(h.ledger.get_by_token(&first).unwrap().revoked);

        let replay = h.sessions.rotate(&first).await.unwrap_err();
        assert!(replay.is_auth(AuthError::InvalidRefreshToken));

        // the rotated-in token is still good
        assert!(h.sessions.rotate(&rotated.refresh_token).await.is_ok());
    }

    #[tokio::test]
    async fn test_rotation_rejects_access_token_and_garbage() {
        let h = harness();
        let issued = h.sessions.register("alice@test.com", "secret1").await.unwrap();

        for presented in [issued.tokens.access_token.as_str(), "garbage", ""] {
            let err = h.sessions.rotate(presented).await.unwrap_err();
            assert!(err.is_auth(AuthError::InvalidRefreshToken));
        }
    }

    #[tokio::test]
    async fn test_rotation_rejects_well_signed_token_never_issued() {
        let h = harness();
        let issued = h.sessions.register("alice@test.com", "secret1").await.unwrap();
        let subject = Subject {
            id: issued.user.id,
            email: issued.user.email.clone(),
        };
        let unrecorded = h.sessions.refresh.mint(&subject).unwrap();

        let err = h.sessions.rotate(&unrecorded).await.unwrap_err();

        assert!(err.is_auth(AuthError::InvalidRefreshToken));
    }

    #[tokio::test]
    async fn test_rotation_rejects_expired_refresh_token() {
        let h = harness();
        let issued = h.sessions.register("alice@test.com", "secret1").await.unwrap();
        let subject = Subject {
            id: issued.user.id,
            email: issued.user.email.clone(),
        };
        let issued_at = Utc::now() - Duration::days(31);
        let expired = h.sessions.refresh.mint_at(&subject, issued_at).unwrap();
        assert_eq!(h.sessions.refresh.verify(&expired), Err(TokenError::Expired));

        let err = h.sessions.rotate(&expired).await.unwrap_err();

        assert!(err.is_auth(AuthError::InvalidRefreshToken));
    }

    #[tokio::test]
    async fn test_concurrent_rotation_has_one_winner() {
        let h = harness();
        let issued = h.sessions.register("alice@test.com", "secret1").await.unwrap();
        let token = issued.tokens.refresh_token;

        let (a, b) = tokio::join!(h.sessions.rotate(&token), h.sessions.rotate(&token));

        assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1);
        // register row + exactly one rotated-in row
        assert_eq!(h.ledger.rows_for_user(issued.user.id).len(), 2);
    }

    #[tokio::test]
    async fn test_logout_revokes_one_session() {
        let h = harness();
        let first = h.sessions.register("alice@test.com", "secret1").await.unwrap();
        let second = h.sessions.login("alice@test.com", "secret1").await.unwrap();

        h.sessions.logout(&second.tokens.refresh_token).await.unwrap();
        // idempotent; unknown tokens are accepted
        h.sessions.logout(&second.tokens.refresh_token).await.unwrap();
        h.sessions.logout("never-issued").await.unwrap();

        assert!(h
            .sessions
            .rotate(&second.tokens.refresh_token)
            .await
            .unwrap_err()
            .is_auth(AuthError::InvalidRefreshToken));
        assert!(h.sessions.rotate(&first.tokens.refresh_token).await.is_ok());
    }

    #[tokio::test]
    async fn test_logout_all_revokes_every_session() {
        let h = harness();
        let first = h.sessions.register("alice@test.com", "secret1").await.unwrap();
        let second = h.sessions.login("alice@test.com", "secret1").await.unwrap();
        let bob = h.sessions.register("bob@test.com", "secret1").await.unwrap();

        let revoked = h.sessions.logout_all(first.user.id).await.unwrap();

        assert_eq!(revoked, 2);
        for token in [&first.tokens.refresh_token, &second.tokens.refresh_token] {
            assert!(h
                .sessions
                .rotate(token)
                .await
                .unwrap_err()
                .is_auth(AuthError::InvalidRefreshToken));
        }
        assert!(h.sessions.rotate(&bob.tokens.refresh_token).await.is_ok());
    }

    #[tokio::test]
    async fn test_failed_insert_after_revoke_leaves_old_token_revoked() {
        let faulty = FaultyLedger::new(InMemoryLedger::new());
        let h = harness_over(faulty.inner.clone(), Arc::new(faulty.clone()));
        let session = h.sessions.register("alice@test.com", "secret1").await.unwrap();
        let presented = session.tokens.refresh_token;

        faulty.fail_inserts(true);
        let err = h.sessions.rotate(&presented).await.unwrap_err();

        assert!(matches!(err, AppError::Database(_)));
        assert!(err.status_code().is_server_error());
        assert!(h.ledger.get_by_token(&presented).unwrap().revoked);
        assert_eq!(h.ledger.len(), 1);

        faulty.fail_inserts(false);
        assert!(h
            .sessions
            .rotate(&presented)
            .await
            .unwrap_err()
            .is_auth(AuthError::InvalidRefreshToken));
    }
}
