/// Credential verification and registration
///
/// Every way a login can fail collapses to `AuthError::InvalidCredentials`;
/// the actual reason is only logged.

use std::sync::Arc;

use crate::auth::password::PasswordHasher;
use crate::error::{AppError, AuthError, DatabaseError};
use crate::store::{UserRecord, UserStore};
use crate::validators::{is_valid_email, normalize_email, normalize_password, validate_password};

#[derive(Clone)]
pub struct Credentials {
    users: Arc<dyn UserStore>,
    hasher: PasswordHasher,
}

impl Credentials {
    pub fn new(users: Arc<dyn UserStore>, hasher: PasswordHasher) -> Self {
        Self { users, hasher }
    }

    /// Returns the user owning `email` if `password` matches its hash.
    ///
    /// # Arguments
    /// * `email` - Email as typed; normalized before the lookup
    /// * `password` - Plaintext password; surrounding whitespace is ignored
    ///
    /// # Errors
    /// Returns `AuthError::InvalidCredentials` for an unknown email, a
    /// password-less identity or a wrong password. Store and hasher failures
    /// surface as `AppError::Database` / `AppError::Internal`.
    pub async fn verify_credentials(
        &self,
        email: &str,
        password: &str,
    ) -> Result<UserRecord, AppError> {
        let email = normalize_email(email);
        let password = normalize_password(password);

        let user = match self.users.find_by_email(&email).await? {
            Some(user) => user,
            None => {
                tracing::debug!("Login rejected: no user with that email");
                return Err(AuthError::InvalidCredentials.into());
            }
        };

        let hash = match user.password_hash.as_deref() {
            Some(hash) => hash,
            None => {
                tracing::warn!(user_id = user.id, "Password login attempted for password-less identity");
                return Err(AuthError::InvalidCredentials.into());
            }
        };

        if !self.hasher.verify(password, hash).await? {
            tracing::debug!(user_id = user.id, "Login rejected: wrong password");
            return Err(AuthError::InvalidCredentials.into());
        }

        Ok(user)
    }

    /// Creates a password user. Duplicate emails are rejected, never merged.
    ///
    /// # Errors
    /// Returns `AppError::Validation` when the email or password breaks the
    /// policy and `AuthError::AlreadyRegistered` when the email is taken.
    pub async fn register_credentials(
        &self,
        email: &str,
        password: &str,
    ) -> Result<UserRecord, AppError> {
        let email = is_valid_email(email)?;
        let password = validate_password(password)?;

        if self.users.find_by_email(&email).await?.is_some() {
            return Err(AuthError::AlreadyRegistered.into());
        }

        let password_hash = self.hasher.hash(password).await?;

        // The unique index still decides when two registrations race past the
        // lookup above.
        match self.users.create(&email, &password_hash).await {
            Ok(user) => Ok(user),
            Err(DatabaseError::UniqueConstraintViolation(_)) => {
                Err(AuthError::AlreadyRegistered.into())
            }
            Err(e) => Err(e.into()),
        }
    }
}
