//! Logging and metrics

mod metrics;

pub use metrics::{
    init_metrics, record_jwks_refresh, record_role_assumption, record_revocation,
    record_session_lookup, record_token_issued, record_upstream_call, record_verification,
    render_metrics,
};

use crate::Result;
use crate::config::TelemetryConfig;

/// Initialize logging and, when enabled, the metrics recorder.
pub fn init_observability(config: &TelemetryConfig, service: &'static str) -> Result<()> {
    init_logging(config);

    if config.metrics {
        init_metrics(service)?;
    }

    Ok(())
}

/// `RUST_LOG` takes precedence over the configured level.
fn init_logging(config: &TelemetryConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::{EnvFilter, Layer};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let fmt_layer = if config.json_logs {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer().with_target(true).boxed()
    };

    // A second initialization (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();
}
