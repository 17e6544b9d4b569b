/// JWT Claims structure
///
/// The payload carried by both access and refresh tokens: the subject
/// identity plus the standard registered claims (RFC 7519).

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which of the two token families a token belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenKind::Access => write!(f, "access"),
            TokenKind::Refresh => write!(f, "refresh"),
        }
    }
}

/// The identity a token speaks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject {
    pub id: i64,
    pub email: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (user id)
    pub sub: String,
    /// User email
    pub email: String,
    /// Token family
    pub typ: TokenKind,
    /// Unique token id
    pub jti: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Issuer
    pub iss: String,
}

impl Claims {
    pub fn new(
        kind: TokenKind,
        subject: &Subject,
        issued_at: DateTime<Utc>,
        ttl: Duration,
        issuer: &str,
    ) -> Self {
        Self {
            sub: subject.id.to_string(),
            email: subject.email.clone(),
            typ: kind,
            jti: Uuid::new_v4().to_string(),
            exp: (issued_at + ttl).timestamp(),
            iat: issued_at.timestamp(),
            iss: issuer.to_string(),
        }
    }

    /// Subject identity, or `None` if `sub` is not a user id.
    pub fn subject(&self) -> Option<Subject> {
        let id = self.sub.parse::<i64>().ok()?;
        Some(Subject {
            id,
            email: self.email.clone(),
        })
    }
}
