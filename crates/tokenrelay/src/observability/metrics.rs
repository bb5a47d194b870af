//! Prometheus metrics for tokenrelay services

use std::sync::OnceLock;
use std::time::{Duration, Instant};

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::Result;
use crate::error::Error;

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
static START_TIME: OnceLock<Instant> = OnceLock::new();

// Server metrics
const METRIC_UPTIME: &str = "tokenrelay_uptime_seconds";
const METRIC_INFO: &str = "tokenrelay_info";

// Verification metrics
const METRIC_VERIFICATIONS: &str = "tokenrelay_token_verifications_total";
const METRIC_JWKS_REFRESHES: &str = "tokenrelay_jwks_refreshes_total";

// Session metrics
const METRIC_SESSION_LOOKUPS: &str = "tokenrelay_session_lookups_total";

// Identity provider metrics
const METRIC_TOKENS_ISSUED: &str = "tokenrelay_tokens_issued_total";
const METRIC_REVOCATIONS: &str = "tokenrelay_revocations_total";
const METRIC_ROLE_ASSUMPTIONS: &str = "tokenrelay_role_assumptions_total";

// Outbound calls
const METRIC_UPSTREAM_DURATION: &str = "tokenrelay_upstream_duration_seconds";

/// Install the Prometheus recorder. Call once per process.
pub fn init_metrics(service: &'static str) -> Result<()> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| Error::Config(format!("Failed to install metrics recorder: {e}")))?;

    PROMETHEUS_HANDLE.set(handle).ok();
    START_TIME.set(Instant::now()).ok();

    register_metrics(service);
    tracing::info!("Prometheus metrics initialized");
    Ok(())
}

fn register_metrics(service: &'static str) {
    describe_gauge!(METRIC_UPTIME, "Service uptime in seconds");
    describe_gauge!(METRIC_INFO, "Service information (always 1)");

    describe_counter!(METRIC_VERIFICATIONS, "Bearer token verifications by outcome");
    describe_counter!(METRIC_JWKS_REFRESHES, "Key-set fetches by result");
    describe_counter!(METRIC_SESSION_LOOKUPS, "Session resolutions by result");
    describe_counter!(METRIC_TOKENS_ISSUED, "Token bundles issued by grant");
    describe_counter!(METRIC_REVOCATIONS, "Revocation calls by outcome");
    describe_counter!(METRIC_ROLE_ASSUMPTIONS, "Role assumptions by result");
    describe_histogram!(METRIC_UPSTREAM_DURATION, "Outbound call duration in seconds");

    gauge!(
        METRIC_INFO,
        "version" => env!("CARGO_PKG_VERSION"),
        "service" => service,
    )
    .set(1.0);
}

/// Render metrics in Prometheus text format. Empty when no recorder is installed.
#[must_use]
pub fn render_metrics() -> String {
    if let Some(start) = START_TIME.get() {
        gauge!(METRIC_UPTIME).set(start.elapsed().as_secs_f64());
    }

    PROMETHEUS_HANDLE
        .get()
        .map(PrometheusHandle::render)
        .unwrap_or_default()
}

/// Record a verification outcome (`ok` or a failure kind).
pub fn record_verification(outcome: &str) {
    counter!(METRIC_VERIFICATIONS, "outcome" => outcome.to_owned()).increment(1);
}

pub fn record_jwks_refresh(success: bool) {
    let result = if success { "success" } else { "error" };
    counter!(METRIC_JWKS_REFRESHES, "result" => result).increment(1);
}

/// Record a session lookup (`found`, `missing`, `bad_signature`, ...).
pub fn record_session_lookup(result: &str) {
    counter!(METRIC_SESSION_LOOKUPS, "result" => result.to_owned()).increment(1);
}

pub fn record_token_issued(grant: &str) {
    counter!(METRIC_TOKENS_ISSUED, "grant" => grant.to_owned()).increment(1);
}

pub fn record_revocation(outcome: &str) {
    counter!(METRIC_REVOCATIONS, "outcome" => outcome.to_owned()).increment(1);
}

pub fn record_role_assumption(success: bool) {
    let result = if success { "success" } else { "error" };
    counter!(METRIC_ROLE_ASSUMPTIONS, "result" => result).increment(1);
}

/// Record the duration of a call to another service.
pub fn record_upstream_call(target: &str, duration: Duration, success: bool) {
    let status = if success { "success" } else { "error" };
    histogram!(
        METRIC_UPSTREAM_DURATION,
        "target" => target.to_owned(),
        "status" => status,
    )
    .record(duration.as_secs_f64());
}
