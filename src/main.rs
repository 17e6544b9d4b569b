use sqlx::postgres::PgPoolOptions;
use std::net::TcpListener;
use std::sync::Arc;
use token_sessions::configuration::{get_configuration, Environment};
use token_sessions::reaper::LedgerReaper;
use token_sessions::startup::{build_session_manager, run};
use token_sessions::store::{PgLedger, PgUserStore, RefreshTokenLedger};
use token_sessions::telemetry::init_telemetry;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    init_telemetry();

    let configuration = get_configuration().map_err(|e| {
        tracing::error!("Failed to read configuration: {}", e);
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "Configuration error")
    })?;

    let findings = configuration.insecure_defaults();
    for finding in &findings {
        tracing::warn!(finding = *finding, "Insecure token secret configuration");
    }
    if configuration.application.environment == Environment::Production && !findings.is_empty() {
        tracing::error!("Refusing to start in production with insecure token secrets");
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "Insecure token secrets",
        ));
    }

    let pool = PgPoolOptions::new()
        .max_connections(configuration.database.max_connections)
        .connect(&configuration.database.connection_string())
        .await
        .map_err(|e| {
            tracing::error!("Failed to create connection pool: {}", e);
            std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "Database connection error",
            )
        })?;

    sqlx::migrate!("./migrations").run(&pool).await.map_err(|e| {
        tracing::error!("Failed to run migrations: {}", e);
        std::io::Error::new(std::io::ErrorKind::Other, "Migration error")
    })?;

    let ledger: Arc<dyn RefreshTokenLedger> = Arc::new(PgLedger::new(pool.clone()));
    let users = Arc::new(PgUserStore::new(pool));
    let sessions = build_session_manager(&configuration, users, Arc::clone(&ledger));

    let reaper = LedgerReaper::from_settings(ledger, &configuration.reaper).start();

    let address = format!(
        "{}:{}",
        configuration.application.host, configuration.application.port
    );
    let listener = TcpListener::bind(&address)?;
    tracing::info!("Server listening on: {}", address);

    let result = run(listener, sessions)?.await;

    reaper.stop().await;
    result
}
