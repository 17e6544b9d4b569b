use actix_web::HttpResponse;

use crate::middleware::AuthenticatedUser;

/// GET /health_check
pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().finish()
}

/// GET /api/me
///
/// Echoes the identity the access guard attached to the request.
pub async fn current_user(user: AuthenticatedUser) -> HttpResponse {
    HttpResponse::Ok().json(user)
}
