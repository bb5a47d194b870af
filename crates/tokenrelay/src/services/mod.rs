//! HTTP services
//!
//! Every service shares the same outer stack: `/health`, `/metrics`,
//! request tracing, a request timeout and CORS.

pub mod edge;
mod error;
pub mod idp;
pub mod orchestrator;
pub mod resource;

use std::future::Future;
use std::net::SocketAddr;

use axum::Router;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, header};
use axum::response::{IntoResponse, Json};
use axum::routing::get;
pub use error::ServiceError;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::ServiceKind;
use crate::constants::{REQUEST_TIMEOUT, STATUS_HEALTHY};
use crate::helpers::bearer_token;
use crate::{Error, Result};

pub(crate) type HandlerResult<T> = std::result::Result<T, ServiceError>;

/// Header carrying the subject from the edge to the orchestrator
pub const USER_SUB_HEADER: &str = "x-user-sub";

/// Health check response
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
}

/// Caller identity returned by `/v1/whoami` and the edge `/me`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub sub: String,
    pub email: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

/// Add the shared routes and layers to a service router.
pub fn with_common_layers(router: Router, kind: ServiceKind) -> Router {
    router
        .route("/health", get(move || health_handler(kind)))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            REQUEST_TIMEOUT,
        ))
        .layer(build_cors_layer())
}

fn build_cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(HeaderValue::from_static("http://localhost:3000"))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static(USER_SUB_HEADER),
        ])
        .allow_credentials(true)
}

async fn health_handler(kind: ServiceKind) -> impl IntoResponse {
    Json(HealthResponse {
        status: STATUS_HEALTHY,
        service: kind.name(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn metrics_handler() -> impl IntoResponse {
    (
        [(
            header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        crate::observability::render_metrics(),
    )
}

/// Bind `addr` and serve until `shutdown` resolves.
pub async fn serve(
    router: Router,
    addr: SocketAddr,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    emit_bind_warning(addr);
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Transport(format!("Failed to bind to {addr}: {e}")))?;
    serve_listener(listener, router, shutdown).await
}

fn emit_bind_warning(addr: SocketAddr) {
    if addr.ip().is_unspecified() {
        tracing::warn!(
            "HTTP server binding to all interfaces ({addr}). \
             This exposes the server to all network interfaces."
        );
    } else if !addr.ip().is_loopback() {
        tracing::warn!(
            "HTTP server binding to non-loopback address ({addr}). \
             Ensure network security policies are in place."
        );
    }
}

/// Serve on an already bound listener (lets callers bind port 0 first).
pub async fn serve_listener(
    listener: TcpListener,
    router: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let addr = listener
        .local_addr()
        .map_err(|e| Error::Transport(format!("Failed to read listener address: {e}")))?;
    tracing::info!("HTTP server listening on {addr}");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| Error::Transport(format!("HTTP server error: {e}")))?;

    tracing::info!("HTTP server shutdown complete");
    Ok(())
}

/// Bearer token of the `Authorization` header, if any.
pub(crate) fn bearer_from_headers(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(bearer_token)
}

/// Outbound HTTP client with a fixed per-request timeout.
pub fn http_client(timeout: std::time::Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .map_err(|e| Error::Transport(format!("Failed to build HTTP client: {e}")))
}
