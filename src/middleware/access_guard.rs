/// Access Guard Middleware
///
/// Verifies the bearer access token of every request it wraps and injects
/// the caller's identity into request extensions. Stateless: it consults the
/// access codec only, never the ledger, so a revoked session's access tokens
/// remain valid until their own expiry.

use actix_web::{
    dev::{forward_ready, Payload, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::AUTHORIZATION,
    Error, FromRequest, HttpMessage, HttpRequest,
};
use futures::future::{ready, LocalBoxFuture, Ready};
use serde::Serialize;
use std::rc::Rc;

use crate::auth::{TokenCodec, TokenError};
use crate::error::{AppError, AuthError};

/// Identity attached to requests that passed the guard
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatedUser {
    pub user_id: i64,
    pub user_email: String,
}

/// Checks an `Authorization` header value against the access codec.
pub fn authenticate(
    header: Option<&str>,
    codec: &TokenCodec,
) -> Result<AuthenticatedUser, AuthError> {
    let header = header.ok_or(AuthError::MissingToken)?;

    let token = header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(AuthError::TokenInvalid)?;

    match codec.verify(token) {
        Ok(subject) => Ok(AuthenticatedUser {
            user_id: subject.id,
            user_email: subject.email,
        }),
        Err(TokenError::Expired) => Err(AuthError::TokenExpired),
        Err(TokenError::Malformed) | Err(TokenError::SignatureInvalid) => {
            Err(AuthError::TokenInvalid)
        }
    }
}

/// Guard for protected routes
pub struct AccessGuard {
    codec: TokenCodec,
}

impl AccessGuard {
    pub fn new(codec: TokenCodec) -> Self {
        Self { codec }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AccessGuard
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = AccessGuardService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AccessGuardService {
            service: Rc::new(service),
            codec: self.codec.clone(),
        }))
    }
}

pub struct AccessGuardService<S> {
    service: Rc<S>,
    codec: TokenCodec,
}

impl<S, B> Service<ServiceRequest> for AccessGuardService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let header = req
            .headers()
            .get(AUTHORIZATION)
            .map(|h| h.to_str().unwrap_or_default());

        match authenticate(header, &self.codec) {
            Ok(user) => {
                tracing::debug!(user_id = user.user_id, "Access token accepted");
                req.extensions_mut().insert(user);

                let service = Rc::clone(&self.service);
                Box::pin(async move { service.call(req).await })
            }
            Err(e) => {
                tracing::debug!(reason = %e, path = %req.path(), "Access token rejected");
                Box::pin(async move { Err(AppError::Auth(e).into()) })
            }
        }
    }
}

/// Lets handlers behind the guard take the identity as an argument.
impl FromRequest for AuthenticatedUser {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(
            req.extensions()
                .get::<AuthenticatedUser>()
                .cloned()
                .ok_or(AppError::Auth(AuthError::MissingToken)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Subject, TokenKind};
    use chrono::{Duration, Utc};

    fn codec() -> TokenCodec {
        TokenCodec::new(
            TokenKind::Access,
            "guard-test-access-secret-0123456789abcdef",
            Duration::minutes(15),
            "test",
        )
    }

    fn alice() -> Subject {
        Subject {
            id: 7,
            email: "alice@test.com".to_string(),
        }
    }

    #[test]
    fn test_valid_bearer_token() {
        let codec = codec();
        let token = codec.mint(&alice()).unwrap();
        let header = format!("Bearer {}", token);

        assert_eq!(
            authenticate(Some(&header), &codec),
            Ok(AuthenticatedUser {
                user_id: 7,
                user_email: "alice@test.com".to_string(),
            })
        );
    }

    #[test]
    fn test_missing_header() {
        assert_eq!(authenticate(None, &codec()), Err(AuthError::MissingToken));
    }

    #[test]
    fn test_malformed_headers() {
        let codec = codec();
        let token = codec.mint(&alice()).unwrap();
        let basic = format!("Basic {}", token);
        let glued = format!("Bearer{}", token);

        for header in ["", "Bearer", "Bearer ", "Basic dXNlcjpwYXNz", basic.as_str(), glued.as_str()] {
            assert_eq!(
                authenticate(Some(header), &codec),
                Err(AuthError::TokenInvalid),
                "header: {:?}",
                header
            );
        }
    }

    #[test]
    fn test_expired_token_is_distinguished() {
        let codec = codec();
        let token = codec
            .mint_at(&alice(), Utc::now() - Duration::minutes(20))
            .unwrap();
        let header = format!("Bearer {}", token);

        assert_eq!(authenticate(Some(&header), &codec), Err(AuthError::TokenExpired));
    }

    #[test]
    fn test_refresh_token_is_not_an_access_token() {
        let refresh = TokenCodec::new(
            TokenKind::Refresh,
            "guard-test-refresh-secret-0123456789abcdef",
            Duration::days(30),
            "test",
        );
        let header = format!("Bearer {}", refresh.mint(&alice()).unwrap());

        assert_eq!(authenticate(Some(&header), &codec()), Err(AuthError::TokenInvalid));
    }
}
