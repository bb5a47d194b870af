//! Edge service (backend for frontend)
//!
//! Runs the authorization-code login against the identity provider, keeps
//! the resulting tokens in a server-side session and forwards authenticated
//! calls to the orchestrator with the session's access token.
//!
//! The browser only ever holds two cookies: the signed session identifier
//! and, during login, a short-lived signed `state`/`nonce` pair.

mod cookie;
mod oidc;

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{AppendHeaders, IntoResponse, Json, Redirect, Response};
use axum::routing::{get, post};
pub use cookie::{CookiePolicy, read_cookie};
pub use oidc::{CompletedLogin, OidcClient, OidcConfig, ProviderEndpoints, random_token};
use serde::Deserialize;
use serde_json::json;
use subtle::ConstantTimeEq;
use url::Url;

use super::{
    HandlerResult, Profile, ServiceError, USER_SUB_HEADER, http_client, with_common_layers,
};
use crate::config::{EdgeSettings, ServiceKind};
use crate::constants::{OAUTH_STATE_COOKIE_NAME, OAUTH_STATE_MAX_AGE};
use crate::observability;
use crate::session::{SessionError, SessionManager, SessionRecord, SessionSigner, SessionStore, kv};
use crate::{Error, Result};

const LOGIN_STATE_SALT: &str = "tokenrelay.oauth-state";
const DEFAULT_TASK: &str = "whoami";

/// Shared state of the edge handlers
#[derive(Debug)]
pub struct EdgeState {
    oidc: OidcClient,
    sessions: SessionManager,
    login_signer: SessionSigner,
    cookies: CookiePolicy,
    session_cookie: String,
    client: reqwest::Client,
    run_url: Url,
}

impl EdgeState {
    /// Assemble the state; the remaining knobs come from `settings`.
    pub fn from_parts(
        oidc: OidcClient,
        sessions: SessionManager,
        settings: &EdgeSettings,
    ) -> Result<Self> {
        let run_url = Url::parse(&settings.orchestrator_url)
            .and_then(|base| base.join("/run"))
            .map_err(|e| Error::Config(format!("Invalid edge.orchestrator_url: {e}")))?;

        Ok(Self {
            oidc,
            sessions,
            login_signer: SessionSigner::with_salt(settings.session_secret()?, LOGIN_STATE_SALT),
            cookies: CookiePolicy {
                secure: settings.cookie_secure,
            },
            session_cookie: settings.session_cookie_name.clone(),
            client: http_client(Duration::from_secs(settings.upstream_timeout_secs))?,
            run_url,
        })
    }

    /// Session of the request; both the cookie signature and the stored
    /// record must be valid.
    async fn session(&self, headers: &HeaderMap) -> HandlerResult<SessionRecord> {
        let session_id = read_cookie(headers, &self.session_cookie)
            .ok_or_else(|| {
                ServiceError::Authentication("Not authenticated: missing session cookie".into())
            })?;
        Ok(self.sessions.resolve(session_id).await?)
    }

    /// Check the `state` echoed by the provider against the login cookie and
    /// return the nonce bound to it.
    fn check_login_state(
        &self,
        headers: &HeaderMap,
        state: Option<&str>,
    ) -> HandlerResult<String> {
        let cookie = read_cookie(headers, OAUTH_STATE_COOKIE_NAME)
            .ok_or_else(|| ServiceError::Authentication("Missing login state".into()))?;
        let value = self
            .login_signer
            .unsign(cookie, OAUTH_STATE_MAX_AGE)
            .map_err(|e| ServiceError::Authentication(format!("Invalid login state: {e}")))?;
        let (expected, nonce) = value
            .split_once(':')
            .ok_or_else(|| ServiceError::Authentication("Invalid login state".into()))?;

        let provided = state.unwrap_or_default();
        if !bool::from(expected.as_bytes().ct_eq(provided.as_bytes())) {
            return Err(ServiceError::Authentication("State mismatch".into()));
        }
        Ok(nonce.to_string())
    }

    async fn forward_run(&self, record: &SessionRecord, task: &str) -> HandlerResult<Response> {
        let started = Instant::now();
        let outcome = self.send_run(record, task).await;
        observability::record_upstream_call("orchestrator", started.elapsed(), outcome.is_ok());

        let (status, content_type, body) = outcome.map_err(|e| {
            tracing::warn!(error = %e, "Orchestrator call failed");
            ServiceError::Upstream(format!("Orchestrator call failed: {e}"))
        })?;
        let status = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);

        let mut response = (status, body).into_response();
        match content_type {
            Some(value) => {
                response.headers_mut().insert(header::CONTENT_TYPE, value);
            }
            None => {
                response.headers_mut().remove(header::CONTENT_TYPE);
            }
        }
        Ok(response)
    }

    async fn send_run(
        &self,
        record: &SessionRecord,
        task: &str,
    ) -> reqwest::Result<(u16, Option<HeaderValue>, Bytes)> {
        let response = self
            .client
            .post(self.run_url.clone())
            .bearer_auth(&record.access_token)
            .header(USER_SUB_HEADER, &record.sub)
            .json(&json!({ "task": task }))
            .send()
            .await?;
        let status = response.status().as_u16();
        let content_type = response.headers().get(header::CONTENT_TYPE).cloned();
        Ok((status, content_type, response.bytes().await?))
    }
}

/// Connect the session store and assemble the edge.
pub async fn build(settings: &EdgeSettings) -> Result<Arc<EdgeState>> {
    let store = kv::connect(&settings.session_store_url)
        .await
        .map_err(SessionError::from)?;
    tracing::info!(backend = store.backend(), "Session store connected");

    let sessions = SessionManager::with_lifetimes(
        SessionSigner::new(settings.session_secret()?),
        SessionStore::new(store),
        settings.session_max_age(),
        settings.session_ttl(),
    );
    let oidc = OidcClient::new(OidcConfig::from_settings(settings)?)?;
    Ok(Arc::new(EdgeState::from_parts(oidc, sessions, settings)?))
}

pub fn router(state: Arc<EdgeState>) -> Router {
    let routes = Router::new()
        .route("/", get(root_handler))
        .route("/auth/login", get(login_handler))
        .route("/auth/callback", get(callback_handler))
        .route("/me", get(me_handler))
        .route("/run-agent", post(run_agent_handler))
        .with_state(state);

    with_common_layers(routes, ServiceKind::Edge)
}

async fn root_handler() -> impl IntoResponse {
    Json(json!({ "ok": true }))
}

async fn login_handler(State(state): State<Arc<EdgeState>>) -> HandlerResult<Response> {
    let csrf = random_token();
    let nonce = random_token();
    let url = state.oidc.authorization_url(&csrf, &nonce).await?;

    let signed = state.login_signer.sign(&format!("{csrf}:{nonce}"));
    let cookie = state
        .cookies
        .render(OAUTH_STATE_COOKIE_NAME, &signed, Some(OAUTH_STATE_MAX_AGE))?;

    Ok(([(header::SET_COOKIE, cookie)], Redirect::to(url.as_str())).into_response())
}

#[derive(Debug, Deserialize)]
struct CallbackParams {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

async fn callback_handler(
    State(state): State<Arc<EdgeState>>,
    headers: HeaderMap,
    Query(params): Query<CallbackParams>,
) -> HandlerResult<Response> {
    let nonce = state.check_login_state(&headers, params.state.as_deref())?;
    if let Some(error) = params.error {
        return Err(ServiceError::Authentication(format!(
            "Authorization failed: {error}"
        )));
    }
    let code = params
        .code
        .ok_or_else(|| ServiceError::Validation("Missing code".into()))?;

    let login = state.oidc.complete_login(&code, &nonce).await?;
    let record = SessionRecord::from_claims(&login.claims, login.access_token, login.refresh_token);
    let session_id = state.sessions.establish(&record).await?;

    let session_cookie = state
        .cookies
        .render(&state.session_cookie, &session_id, None)?;
    let cleared = state.cookies.clear(OAUTH_STATE_COOKIE_NAME)?;

    Ok((
        AppendHeaders([
            (header::SET_COOKIE, session_cookie),
            (header::SET_COOKIE, cleared),
        ]),
        Redirect::to("/me"),
    )
        .into_response())
}

async fn me_handler(
    State(state): State<Arc<EdgeState>>,
    headers: HeaderMap,
) -> HandlerResult<Json<Profile>> {
    let record = state.session(&headers).await?;
    Ok(Json(Profile {
        sub: record.sub,
        email: record.email,
        roles: record.roles,
    }))
}

#[derive(Debug, Deserialize)]
struct RunAgentRequest {
    #[serde(default)]
    task: Option<String>,
}

async fn run_agent_handler(
    State(state): State<Arc<EdgeState>>,
    headers: HeaderMap,
    Json(request): Json<RunAgentRequest>,
) -> HandlerResult<Response> {
    let record = state.session(&headers).await?;
    let task = request.task.as_deref().unwrap_or(DEFAULT_TASK);
    state.forward_run(&record, task).await
}
