/// Input validators
///
/// Email shape and password policy checks applied before anything reaches
/// the credential store or the hasher.

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::ValidationError;

const MAX_EMAIL_LENGTH: usize = 254; // RFC 5321
pub const MIN_PASSWORD_LENGTH: usize = 6;
pub const MAX_PASSWORD_LENGTH: usize = 100;
/// bcrypt ignores everything past this many bytes.
pub const MAX_PASSWORD_BYTES: usize = 72;

lazy_static! {
    // local@domain.tld, no whitespace, exactly one '@'
    static ref EMAIL_REGEX: Regex = Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap();
}

/// Lowercase and trim an email address.
///
/// Every lookup and every insert goes through this, which is what makes the
/// email column case-insensitive.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Validates an email address and returns its normalized form
pub fn is_valid_email(email: &str) -> Result<String, ValidationError> {
    let normalized = normalize_email(email);

    if normalized.is_empty() {
        return Err(ValidationError::EmptyField("email"));
    }

    if normalized.len() > MAX_EMAIL_LENGTH {
        return Err(ValidationError::TooLong("email", MAX_EMAIL_LENGTH));
    }

    if !EMAIL_REGEX.is_match(&normalized) {
        return Err(ValidationError::InvalidFormat("email"));
    }

    Ok(normalized)
}

/// Password policy: 6 to 100 characters and at most 72 bytes, after
/// trimming surrounding whitespace.
///
/// Returns the trimmed password, which is what gets hashed and later
/// verified.
///
/// # Errors
/// Returns `EmptyField`, `TooShort`, `TooLong` or `TooManyBytes`.
pub fn validate_password(password: &str) -> Result<&str, ValidationError> {
    let password = normalize_password(password);
    let length = password.chars().count();

    if length == 0 {
        return Err(ValidationError::EmptyField("password"));
    }

    if length < MIN_PASSWORD_LENGTH {
        return Err(ValidationError::TooShort("password", MIN_PASSWORD_LENGTH));
    }

    if length > MAX_PASSWORD_LENGTH {
        return Err(ValidationError::TooLong("password", MAX_PASSWORD_LENGTH));
    }

    if password.len() > MAX_PASSWORD_BYTES {
        return Err(ValidationError::TooManyBytes("password", MAX_PASSWORD_BYTES));
    }

    Ok(password)
}

/// Passwords are compared without surrounding whitespace, on registration
/// and on login alike.
pub fn normalize_password(password: &str) -> &str {
    password.trim()
}

/// Rejects empty or whitespace-only required fields
pub fn require_non_empty<'a>(field: &'static str, value: &'a str) -> Result<&'a str, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField(field));
    }
    Ok(trimmed)
}
