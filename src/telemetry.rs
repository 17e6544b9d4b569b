use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "info";

/// Installs the JSON subscriber on stdout. `RUST_LOG` overrides the
/// default `info` filter. `log` records (actix-web's access log) are
/// bridged into the same subscriber.
pub fn init_telemetry() {
    if let Err(e) = try_init_telemetry(DEFAULT_FILTER) {
        eprintln!("Failed to install tracing subscriber: {}", e);
    }
}

/// Like [`init_telemetry`] but reports a second initialisation as an error
/// instead of ignoring it.
pub fn try_init_telemetry(
    default_filter: &str,
) -> Result<(), tracing_subscriber::util::TryInitError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let formatting_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stdout)
        .json();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(formatting_layer)
        .try_init()
}
