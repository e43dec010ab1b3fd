//! Logging setup.
//!
//! Installs a `tracing-subscriber` fmt layer filtered by `EnvFilter`.

use crate::config::TelemetryConfig;
use crate::domain::GatewayError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the global subscriber.
///
/// Fails instead of panicking when a subscriber is already installed.
pub fn init_tracing(config: &TelemetryConfig) -> Result<(), GatewayError> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| GatewayError::Internal(format!("invalid log filter: {}", e)))?;

    if config.json_logs {
        let json_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_file(true)
            .with_line_number(true);
        tracing_subscriber::registry()
            .with(env_filter)
            .with(json_layer)
            .try_init()
            .map_err(|e| GatewayError::Internal(format!("tracing init: {}", e)))?;
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_ansi(true);
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|e| GatewayError::Internal(format!("tracing init: {}", e)))?;
    }

    tracing::info!(
        level = %config.log_level,
        json = config.json_logs,
        "[ibc-gateway] tracing initialized"
    );
    Ok(())
}
