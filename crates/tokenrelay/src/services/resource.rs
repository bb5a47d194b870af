//! Resource API: verifies the bearer token on every request

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::Json;
use axum::routing::get;
use tokio_util::sync::CancellationToken;

use super::{
    HandlerResult, Profile, ServiceError, bearer_from_headers, http_client, with_common_layers,
};
use crate::Result;
use crate::auth::{JwksCache, JwksRefreshTask, KeyResolver, TokenVerifier, VerifierConfig};
use crate::config::{ResourceSettings, ServiceKind};

pub fn router(verifier: Arc<TokenVerifier>) -> Router {
    let routes = Router::new()
        .route("/v1/whoami", get(whoami_handler))
        .with_state(verifier);

    with_common_layers(routes, ServiceKind::Resource)
}

/// Verifier backed by a key-set cache on the configured `jwks_uri`.
pub fn build(settings: &ResourceSettings) -> Result<(Arc<TokenVerifier>, Arc<JwksCache>)> {
    let client = http_client(settings.fetch_timeout())?;
    let cache = Arc::new(JwksCache::new(
        settings.jwks_url()?,
        settings.cache_ttl(),
        client,
    ));
    let resolver: Arc<dyn KeyResolver> = cache.clone();
    let verifier = TokenVerifier::new(
        VerifierConfig::new(settings.issuer.clone(), settings.audience.clone()),
        resolver,
    );
    Ok((Arc::new(verifier), cache))
}

/// Start the background key-set refresh when an interval is configured.
pub fn spawn_background(
    cache: Arc<JwksCache>,
    settings: &ResourceSettings,
    shutdown: CancellationToken,
) -> Option<tokio::task::JoinHandle<()>> {
    (settings.jwks_refresh_interval_secs > 0).then(|| {
        JwksRefreshTask::new(
            cache,
            Duration::from_secs(settings.jwks_refresh_interval_secs),
        )
        .spawn(shutdown)
    })
}

async fn whoami_handler(
    State(verifier): State<Arc<TokenVerifier>>,
    headers: HeaderMap,
) -> HandlerResult<Json<Profile>> {
    let token = bearer_from_headers(&headers)
        .ok_or_else(|| ServiceError::Authentication("Missing bearer token".into()))?;

    let claims = verifier.verify(token).await?;
    Ok(Json(Profile {
        email: claims.email().map(ToString::to_string),
        roles: claims.roles(),
        sub: claims.sub,
    }))
}
