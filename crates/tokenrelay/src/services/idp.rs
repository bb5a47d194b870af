//! Identity provider emulator HTTP surface

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::{Form, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{Html, IntoResponse, Json, Redirect, Response};
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use super::{HandlerResult, ServiceError, bearer_from_headers, with_common_layers};
use crate::config::{IdpSettings, ServiceKind};
use crate::idp::{
    AssumeRoleRequest, AuthorizeForm, AuthorizeParams, IdentityProvider, IdpConfig, IdpError,
    OAuthErrorBody, RegistrySweepTask, RevokeOutcome, SigningKey, TokenRequest, UserDirectory,
};
use crate::{Error, Result};

type AppState = Arc<IdentityProvider>;

/// Body of `POST /auth/login`
#[derive(Debug, Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

/// Query of `/auth/introspect` and `/auth/revoke`
#[derive(Debug, Deserialize)]
struct TokenQuery {
    token: String,
}

#[derive(Debug, Serialize)]
struct MessageResponse {
    message: &'static str,
}

pub fn router(provider: AppState) -> Router {
    let routes = Router::new()
        .route("/.well-known/jwks.json", get(jwks_handler))
        .route("/.well-known/openid-configuration", get(discovery_handler))
        .route("/auth/login", post(login_handler))
        .route("/auth/assume-role", post(assume_role_handler))
        .route("/auth/introspect", post(introspect_handler))
        .route("/auth/revoke", post(revoke_handler))
        .route("/users", get(users_handler))
        .route(
            "/oauth2/authorize",
            get(authorize_form_handler).post(authorize_submit_handler),
        )
        .route("/oauth2/token", post(token_handler))
        .route("/oauth2/userInfo", get(userinfo_handler))
        .with_state(provider);

    with_common_layers(routes, ServiceKind::Idp)
}

/// Build the emulator from settings, loading the signing key from disk when
/// a path is configured.
pub fn build(settings: &IdpSettings) -> Result<AppState> {
    let signing_key = match &settings.signing_key_path {
        Some(path) => {
            let pem = std::fs::read_to_string(path).map_err(|e| {
                Error::Config(format!(
                    "Failed to read signing key {}: {e}",
                    path.display()
                ))
            })?;
            SigningKey::from_pem(settings.key_id.clone(), &pem)?
        }
        None => {
            tracing::info!(kid = %settings.key_id, "Generating ephemeral RSA signing key");
            SigningKey::generate(settings.key_id.clone())?
        }
    };

    let mut config = IdpConfig::new(settings.issuer.clone(), settings.audience.clone())
        .with_client(settings.client_id.clone(), settings.client_secret.clone());
    config.redirect_uris.clone_from(&settings.redirect_uris);
    config.token_lifetime = Duration::from_secs(settings.token_lifetime_secs);

    Ok(Arc::new(IdentityProvider::new(
        config,
        signing_key,
        UserDirectory::with_test_users(),
    )))
}

/// Start the registry sweep unless disabled.
pub fn spawn_background(
    provider: &IdentityProvider,
    settings: &IdpSettings,
    shutdown: CancellationToken,
) -> Option<tokio::task::JoinHandle<()>> {
    (settings.sweep_interval_secs > 0).then(|| {
        RegistrySweepTask::new(
            provider.registry(),
            Duration::from_secs(settings.sweep_interval_secs),
        )
        .spawn(shutdown)
    })
}

async fn jwks_handler(State(provider): State<AppState>) -> impl IntoResponse {
    Json(provider.jwks())
}

async fn discovery_handler(State(provider): State<AppState>) -> impl IntoResponse {
    Json(provider.discovery())
}

async fn login_handler(
    State(provider): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> HandlerResult<impl IntoResponse> {
    let bundle = provider.login(&request.username, &request.password)?;
    tracing::info!(username = %request.username, "Direct login succeeded");
    Ok(Json(bundle))
}

async fn assume_role_handler(
    State(provider): State<AppState>,
    Json(request): Json<AssumeRoleRequest>,
) -> HandlerResult<impl IntoResponse> {
    Ok(Json(provider.assume_role(&request).await?))
}

async fn introspect_handler(
    State(provider): State<AppState>,
    Query(query): Query<TokenQuery>,
) -> impl IntoResponse {
    Json(provider.introspect(&query.token))
}

async fn revoke_handler(
    State(provider): State<AppState>,
    Query(query): Query<TokenQuery>,
) -> HandlerResult<impl IntoResponse> {
    if provider.revoke(&query.token)? == RevokeOutcome::AlreadyRevoked {
        tracing::debug!("Token was already revoked");
    }
    Ok(Json(MessageResponse {
        message: "Token revoked successfully",
    }))
}

async fn users_handler(State(provider): State<AppState>) -> impl IntoResponse {
    Json(json!({ "users": provider.users().listing() }))
}

async fn authorize_form_handler(
    State(provider): State<AppState>,
    Query(params): Query<AuthorizeParams>,
) -> HandlerResult<impl IntoResponse> {
    provider.check_authorize_params(&params)?;
    Ok(Html(login_page(&params, None)))
}

async fn authorize_submit_handler(
    State(provider): State<AppState>,
    Form(form): Form<AuthorizeForm>,
) -> HandlerResult<Response> {
    let (params, username, password) = form.into_parts();
    match provider.authorize(&params, &username, &password) {
        Ok(redirect) => Ok(Redirect::to(redirect.as_str()).into_response()),
        Err(IdpError::InvalidCredentials) => Ok((
            StatusCode::UNAUTHORIZED,
            Html(login_page(&params, Some("Invalid username or password"))),
        )
            .into_response()),
        Err(e) => Err(e.into()),
    }
}

async fn token_handler(
    State(provider): State<AppState>,
    Form(request): Form<TokenRequest>,
) -> Response {
    match provider.exchange_code(&request) {
        Ok(bundle) => (
            [(header::CACHE_CONTROL, "no-store")],
            Json(bundle),
        )
            .into_response(),
        Err(e) => oauth_error_response(e),
    }
}

fn oauth_error_response(err: IdpError) -> Response {
    let Some(code) = err.oauth_code() else {
        return ServiceError::from(err).into_response();
    };
    tracing::info!(error = code, "Token request rejected");

    let status = if matches!(err, IdpError::InvalidClient) {
        StatusCode::UNAUTHORIZED
    } else {
        StatusCode::BAD_REQUEST
    };
    let description = match &err {
        IdpError::InvalidRequest(msg)
        | IdpError::InvalidGrant(msg)
        | IdpError::UnsupportedGrantType(msg) => Some(msg.clone()),
        _ => None,
    };
    (
        status,
        Json(OAuthErrorBody {
            error: code.to_string(),
            error_description: description,
        }),
    )
        .into_response()
}

async fn userinfo_handler(
    State(provider): State<AppState>,
    headers: HeaderMap,
) -> HandlerResult<impl IntoResponse> {
    let token = bearer_from_headers(&headers)
        .ok_or_else(|| ServiceError::Authentication("Missing bearer token".into()))?;
    Ok(Json(provider.userinfo(token).await?))
}

fn login_page(params: &AuthorizeParams, error: Option<&str>) -> String {
    let hidden = [
        ("response_type", Some(params.response_type.as_str())),
        ("client_id", Some(params.client_id.as_str())),
        ("redirect_uri", Some(params.redirect_uri.as_str())),
        ("state", params.state.as_deref()),
        ("scope", params.scope.as_deref()),
        ("nonce", params.nonce.as_deref()),
    ]
    .into_iter()
    .filter_map(|(name, value)| {
        value.map(|v| {
            format!(
                r#"<input type="hidden" name="{name}" value="{}">"#,
                escape_html(v)
            )
        })
    })
    .collect::<Vec<_>>()
    .join("\n      ");

    let error = error
        .map(|msg| format!(r#"<p class="error">{}</p>"#, escape_html(msg)))
        .unwrap_or_default();

    format!(
        r#"<!doctype html>
<html>
  <head><title>Sign in</title></head>
  <body>
    <h1>Sign in</h1>
    {error}
    <form method="post" action="/oauth2/authorize">
      {hidden}
      <label>Username <input name="username" autocomplete="username"></label>
      <label>Password <input name="password" type="password" autocomplete="current-password"></label>
      <button type="submit">Sign in</button>
    </form>
  </body>
</html>
"#
    )
}

fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}
