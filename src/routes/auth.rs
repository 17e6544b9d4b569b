/// Authentication Routes
///
/// JSON endpoints for registration, login, token rotation and logout. These
/// handlers only translate between HTTP and the [`SessionManager`]; every
/// decision is made there.

use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::auth::{IssuedSession, SessionManager, TokenPair};
use crate::error::AppError;
use crate::middleware::AuthenticatedUser;
use crate::store::User;
use crate::validators::{is_valid_email, require_non_empty};

/// Register / login request
#[derive(Deserialize)]
pub struct CredentialsRequest {
    pub email: String,
    pub password: String,
}

/// Refresh / logout request
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

/// Successful register / login
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub message: &'static str,
    pub access_token: String,
    pub refresh_token: String,
    pub user: User,
}

impl SessionResponse {
    fn new(message: &'static str, session: IssuedSession) -> Self {
        Self {
            message,
            access_token: session.tokens.access_token,
            refresh_token: session.tokens.refresh_token,
            user: session.user,
        }
    }
}

/// Successful rotation
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPairResponse {
    pub message: &'static str,
    pub access_token: String,
    pub refresh_token: String,
}

impl From<TokenPair> for TokenPairResponse {
    fn from(tokens: TokenPair) -> Self {
        Self {
            message: "Token refreshed successfully",
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
        }
    }
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoutAllResponse {
    pub message: &'static str,
    pub user_id: i64,
    pub revoked: u64,
}

/// POST /api/auth/register
///
/// Surrounding whitespace in the password is ignored here and at login.
///
/// # Errors
/// - 400: invalid email, or a password outside 6..=100 characters or over
///   72 bytes
/// - 409: email already registered
pub async fn register(
    form: web::Json<CredentialsRequest>,
    sessions: web::Data<SessionManager>,
) -> Result<HttpResponse, AppError> {
    let session = sessions.register(&form.email, &form.password).await?;

    Ok(HttpResponse::Created().json(SessionResponse::new(
        "User registered successfully",
        session,
    )))
}

/// POST /api/auth/login
///
/// Unknown email and wrong password both answer 401 "Invalid credentials".
pub async fn login(
    form: web::Json<CredentialsRequest>,
    sessions: web::Data<SessionManager>,
) -> Result<HttpResponse, AppError> {
    let email = is_valid_email(&form.email)?;
    let password = require_non_empty("password", &form.password)?;

    let session = sessions.login(&email, password).await?;

    Ok(HttpResponse::Ok().json(SessionResponse::new("Login successful", session)))
}

/// POST /api/auth/refresh
///
/// Rotates the presented refresh token. Replaying an already rotated token
/// answers 401.
pub async fn refresh(
    form: web::Json<RefreshTokenRequest>,
    sessions: web::Data<SessionManager>,
) -> Result<HttpResponse, AppError> {
    let presented = require_non_empty("refreshToken", &form.refresh_token)?;

    let tokens = sessions.rotate(presented).await?;

    Ok(HttpResponse::Ok().json(TokenPairResponse::from(tokens)))
}

/// POST /api/auth/logout
pub async fn logout(
    form: web::Json<RefreshTokenRequest>,
    sessions: web::Data<SessionManager>,
) -> Result<HttpResponse, AppError> {
    let token = require_non_empty("refreshToken", &form.refresh_token)?;

    sessions.logout(token).await?;

    Ok(HttpResponse::Ok().json(MessageResponse {
        message: "Logged out successfully",
    }))
}

/// POST /api/auth/logout-all
///
/// Behind the access guard; revokes every session of the caller.
pub async fn logout_all(
    user: AuthenticatedUser,
    sessions: web::Data<SessionManager>,
) -> Result<HttpResponse, AppError> {
    let revoked = sessions.logout_all(user.user_id).await?;

    Ok(HttpResponse::Ok().json(LogoutAllResponse {
        message: "Logged out from all devices successfully",
        user_id: user.user_id,
        revoked,
    }))
}
