/// Password Hashing and Verification
///
/// bcrypt with a configurable work factor. Both hashing and verification
/// are CPU-bound and run on tokio's blocking pool so they never stall the
/// workers serving other requests. bcrypt salts every hash and compares
/// digests in constant time.
///
/// bcrypt only reads the first 72 bytes of its input. Longer passwords are
/// refused when hashing and never match when verifying, so two passwords
/// sharing a 72-byte prefix cannot stand in for each other.

use crate::error::{AppError, ValidationError};
use crate::validators::MAX_PASSWORD_BYTES;

#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    cost: u32,
}

impl PasswordHasher {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }

    /// Hash a password with a fresh random salt.
    ///
    /// # Arguments
    /// * `password` - Plaintext password, already checked against the policy
    ///
    /// # Errors
    /// Returns a validation error for passwords over 72 bytes and
    /// `AppError::Internal` if bcrypt or the blocking task fails.
    pub async fn hash(&self, password: &str) -> Result<String, AppError> {
        if password.len() > MAX_PASSWORD_BYTES {
            return Err(ValidationError::TooManyBytes("password", MAX_PASSWORD_BYTES).into());
        }

        let password = password.to_string();
        let cost = self.cost;

        tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
            .await
            .map_err(|e| AppError::Internal(format!("Password hashing task failed: {}", e)))?
            .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
    }

    /// Verify a password against a stored hash.
    ///
    /// # Arguments
    /// * `password` - Plaintext candidate
    /// * `hash` - Stored bcrypt hash
    ///
    /// # Errors
    /// Returns `AppError::Internal` for an unparseable hash or a failed
    /// blocking task.
    pub async fn verify(&self, password: &str, hash: &str) -> Result<bool, AppError> {
        if password.len() > MAX_PASSWORD_BYTES {
            return Ok(false);
        }

        let password = password.to_string();
        let hash = hash.to_string();

        tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
            .await
            .map_err(|e| AppError::Internal(format!("Password verification task failed: {}", e)))?
            .map_err(|e| AppError::Internal(format!("Password verification failed: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_hasher() -> PasswordHasher {
        PasswordHasher::new(4)
    }

    #[tokio::test]
    async fn test_hash_password() {
        let password = "secret1";
        let hash = fast_hasher().hash(password).await.expect("Failed to hash password");

        assert_ne!(password, hash);
        assert!(hash.starts_with("$2"));
        assert!(hash.contains("$04$"));
    }

    #[tokio::test]
    async fn test_verify_password() {
        let hasher = fast_hasher();
        let hash = hasher.hash("secret1").await.expect("Failed to hash password");

        assert!(hasher.verify("secret1", &hash).await.unwrap());
        assert!(!hasher.verify("secret2", &hash).await.unwrap());
    }

    #[tokio::test]
    async fn test_same_password_different_salts() {
        let hasher = fast_hasher();
        let a = hasher.hash("secret1").await.unwrap();
        let b = hasher.hash("secret1").await.unwrap();

        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_password_differing_after_72_bytes_is_rejected() {
        let hasher = fast_hasher();
        let prefix = "a".repeat(72);
        let hash = hasher.hash(&prefix).await.unwrap();

        assert!(hasher.verify(&prefix, &hash).await.unwrap());
        assert!(!hasher.verify(&format!("{}Y", prefix), &hash).await.unwrap());
        assert!(hasher.hash(&format!("{}X", prefix)).await.is_err());
    }

    #[tokio::test]
    async fn test_garbage_hash_is_an_error() {
        assert!(fast_hasher().verify("secret1", "not-a-bcrypt-hash").await.is_err());
    }
}
