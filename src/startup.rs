use actix_web::dev::Server;
use actix_web::{middleware::Logger, web, App, HttpServer};
use std::net::TcpListener;
use std::sync::Arc;

use crate::auth::{PasswordHasher, SessionManager, TokenCodec};
use crate::configuration::Settings;
use crate::error::{AppError, ValidationError};
use crate::middleware::AccessGuard;
use crate::routes::{current_user, health_check, login, logout, logout_all, refresh, register};
use crate::store::{RefreshTokenLedger, UserStore};

/// Wires configuration and stores into a [`SessionManager`].
pub fn build_session_manager(
    settings: &Settings,
    users: Arc<dyn UserStore>,
    ledger: Arc<dyn RefreshTokenLedger>,
) -> SessionManager {
    SessionManager::new(
        users,
        ledger,
        PasswordHasher::new(settings.password.hash_cost),
        TokenCodec::access(&settings.jwt),
        TokenCodec::refresh(&settings.jwt),
    )
}

/// Malformed or incomplete JSON bodies answer 400 with the usual error body.
fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err, _req| {
        AppError::Validation(ValidationError::MalformedBody(err.to_string())).into()
    })
}

pub fn run(listener: TcpListener, sessions: SessionManager) -> Result<Server, std::io::Error> {
    let access_codec = sessions.access_codec().clone();
    let sessions = web::Data::new(sessions);

    let server = HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(sessions.clone())
            .app_data(json_config())
            .route("/health_check", web::get().to(health_check))
            // Public session endpoints
            .service(
                web::scope("/api/auth")
                    .route("/register", web::post().to(register))
                    .route("/login", web::post().to(login))
                    .route("/refresh", web::post().to(refresh))
                    .route("/logout", web::post().to(logout))
                    .service(
                        web::resource("/logout-all")
                            .wrap(AccessGuard::new(access_codec.clone()))
                            .route(web::post().to(logout_all)),
                    ),
            )
            // Protected routes (require a valid access token)
            .service(
                web::scope("/api")
                    .wrap(AccessGuard::new(access_codec.clone()))
                    .route("/me", web::get().to(current_user)),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}
