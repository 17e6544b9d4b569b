/// JWT Token Codec
///
/// Mints and verifies the signed, self-contained tokens. A codec is built
/// from its own secret and TTL; access and refresh tokens use two separate
/// codec instances. The algorithm is pinned to HS256 on both sides, so a
/// token's own `alg` header is never trusted.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};

use crate::auth::claims::{Claims, Subject, TokenKind};
use crate::configuration::JwtSettings;
use crate::error::AppError;

const ALGORITHM: Algorithm = Algorithm::HS256;

/// Why a token failed verification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenError {
    /// Well-signed but past its `exp`
    Expired,
    /// Not a token of this codec: undecodable, wrong algorithm, wrong kind,
    /// wrong issuer or missing claims
    Malformed,
    SignatureInvalid,
}

impl std::fmt::Display for TokenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenError::Expired => write!(f, "token expired"),
            TokenError::Malformed => write!(f, "token malformed"),
            TokenError::SignatureInvalid => write!(f, "token signature invalid"),
        }
    }
}

impl std::error::Error for TokenError {}

#[derive(Clone)]
pub struct TokenCodec {
    kind: TokenKind,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl: Duration,
    issuer: String,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("kind", &self.kind)
            .field("ttl", &self.ttl)
            .field("issuer", &self.issuer)
            .finish_non_exhaustive()
    }
}

impl TokenCodec {
    pub fn new(kind: TokenKind, secret: &str, ttl: Duration, issuer: &str) -> Self {
        let mut validation = Validation::new(ALGORITHM);
        validation.leeway = 0;
        validation.set_issuer(&[issuer]);
        validation.set_required_spec_claims(&["exp", "iat", "iss", "sub"]);

        Self {
            kind,
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            ttl,
            issuer: issuer.to_string(),
        }
    }

    /// Access token codec from configuration
    pub fn access(config: &JwtSettings) -> Self {
        Self::new(
            TokenKind::Access,
            &config.access_secret,
            Duration::seconds(config.access_token_ttl_seconds),
            &config.issuer,
        )
    }

    /// Refresh token codec from configuration
    pub fn refresh(config: &JwtSettings) -> Self {
        Self::new(
            TokenKind::Refresh,
            &config.refresh_secret,
            Duration::seconds(config.refresh_token_ttl_seconds),
            &config.issuer,
        )
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Mints a token issued now.
    ///
    /// # Errors
    /// Returns `AppError::Internal` if signing fails
    pub fn mint(&self, subject: &Subject) -> Result<String, AppError> {
        self.mint_at(subject, Utc::now())
    }

    /// Mints a token as if issued at `issued_at`; it expires at
    /// `issued_at + ttl`.
    ///
    /// # Arguments
    /// * `subject` - User id and email carried in the claims
    /// * `issued_at` - Value of the `iat` claim
    ///
    /// # Errors
    /// Returns `AppError::Internal` if signing fails
    pub fn mint_at(&self, subject: &Subject, issued_at: DateTime<Utc>) -> Result<String, AppError> {
        let claims = Claims::new(self.kind, subject, issued_at, self.ttl, &self.issuer);

        encode(&Header::new(ALGORITHM), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("{} token generation failed: {}", self.kind, e)))
    }

    /// Checks signature, algorithm, issuer, expiry and token kind, and
    /// returns the subject.
    ///
    /// # Errors
    /// - `TokenError::Expired` when the signature is good but `exp` has passed
    /// - `TokenError::SignatureInvalid` when the signature does not match
    /// - `TokenError::Malformed` for anything else, including a token of the
    ///   other kind
    pub fn verify(&self, token: &str) -> Result<Subject, TokenError> {
        let claims = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                ErrorKind::InvalidSignature => TokenError::SignatureInvalid,
                _ => TokenError::Malformed,
            })?;

        if claims.typ != self.kind {
            return Err(TokenError::Malformed);
        }

        claims.subject().ok_or(TokenError::Malformed)
    }
}
