//! OIDC relying party: discovery, authorization redirect, code exchange

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use openidconnect::IssuerUrl;
use openidconnect::core::CoreProviderMetadata;
use rand::RngCore;
use serde::Deserialize;
use tokio::sync::OnceCell;
use url::Url;

use crate::auth::{Claims, JwksCache, KeyResolver, TokenVerifier, VerifierConfig};
use crate::config::EdgeSettings;
use crate::constants::{EDGE_IDP_TIMEOUT, JWKS_CACHE_TTL, JWKS_FETCH_TIMEOUT};
use crate::idp::OAuthErrorBody;
use crate::services::{HandlerResult, ServiceError, http_client};
use crate::{Error, Result};

/// Relying-party settings of the edge
#[derive(Debug, Clone)]
pub struct OidcConfig {
    pub issuer_url: IssuerUrl,
    pub audience: String,
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: Url,
    pub scopes: String,
    /// Overrides the discovered key-set URL
    pub jwks_uri: Option<Url>,
}

impl OidcConfig {
    pub fn from_settings(settings: &EdgeSettings) -> Result<Self> {
        let issuer_url = IssuerUrl::new(settings.issuer.clone())
            .map_err(|e| Error::Config(format!("Invalid edge.issuer: {e}")))?;
        let redirect_uri = Url::parse(&settings.redirect_uri)
            .map_err(|e| Error::Config(format!("Invalid edge.redirect_uri: {e}")))?;
        let jwks_uri = settings
            .jwks_uri
            .as_deref()
            .map(Url::parse)
            .transpose()
            .map_err(|e| Error::Config(format!("Invalid edge.jwks_uri: {e}")))?;

        Ok(Self {
            issuer_url,
            audience: settings.audience.clone(),
            client_id: settings.client_id.clone(),
            client_secret: settings.client_secret()?.to_string(),
            redirect_uri,
            scopes: settings.scopes.clone(),
            jwks_uri,
        })
    }
}

/// Endpoints of the identity provider
#[derive(Debug, Clone)]
pub struct ProviderEndpoints {
    pub authorization: Url,
    pub token: Url,
    pub jwks: Url,
}

#[derive(Debug)]
struct Provider {
    endpoints: ProviderEndpoints,
    verifier: TokenVerifier,
}

/// Token endpoint response; only the fields the edge keeps
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Tokens of a completed login, with the identity token already verified
#[derive(Debug)]
pub struct CompletedLogin {
    pub claims: Claims,
    pub access_token: String,
    pub refresh_token: Option<String>,
}

/// OIDC client. Discovery runs on first use and is retried after a failure,
/// so the edge can start before the identity provider.
pub struct OidcClient {
    config: OidcConfig,
    http: reqwest::Client,
    provider: OnceCell<Arc<Provider>>,
}

impl std::fmt::Debug for OidcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OidcClient")
            .field("issuer", &self.config.issuer_url)
            .field("client_id", &self.config.client_id)
            .field("discovered", &self.provider.initialized())
            .finish_non_exhaustive()
    }
}

impl OidcClient {
    pub fn new(config: OidcConfig) -> Result<Self> {
        Ok(Self {
            config,
            http: http_client(EDGE_IDP_TIMEOUT)?,
            provider: OnceCell::new(),
        })
    }

    /// Skip discovery and use known endpoints.
    pub fn with_endpoints(config: OidcConfig, endpoints: ProviderEndpoints) -> Result<Self> {
        let provider = Arc::new(Provider {
            verifier: id_token_verifier(&config, &endpoints.jwks)?,
            endpoints,
        });
        Ok(Self {
            config,
            http: http_client(EDGE_IDP_TIMEOUT)?,
            provider: OnceCell::from(provider),
        })
    }

    pub const fn config(&self) -> &OidcConfig {
        &self.config
    }

    /// Authorization endpoint URL carrying `state` and `nonce`.
    pub async fn authorization_url(&self, state: &str, nonce: &str) -> HandlerResult<Url> {
        let provider = self.provider().await?;
        let mut url = provider.endpoints.authorization.clone();
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", self.config.redirect_uri.as_str())
            .append_pair("scope", &self.config.scopes)
            .append_pair("state", state)
            .append_pair("nonce", nonce);
        Ok(url)
    }

    /// Redeem `code` and verify the returned identity token.
    pub async fn complete_login(
        &self,
        code: &str,
        nonce: &str,
    ) -> HandlerResult<CompletedLogin> {
        let provider = self.provider().await?;
        let tokens = self.exchange_code(&provider.endpoints.token, code).await?;

        let id_token = tokens
            .id_token
            .ok_or_else(|| ServiceError::Authentication("Token response has no id_token".into()))?;
        let claims = provider.verifier.verify(&id_token).await?;
        if claims.str_claim("nonce") != Some(nonce) {
            return Err(ServiceError::Authentication("ID token nonce mismatch".into()));
        }

        Ok(CompletedLogin {
            claims,
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
        })
    }

    async fn exchange_code(&self, token_url: &Url, code: &str) -> HandlerResult<TokenResponse> {
        let response = self
            .http
            .post(token_url.clone())
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|e| ServiceError::Upstream(format!("Token endpoint unreachable: {e}")))?;

        let status = response.status();
        if status.is_client_error() {
            let reason = response
                .json::<OAuthErrorBody>()
                .await
                .map_or_else(|_| status.to_string(), |body| body.error);
            return Err(ServiceError::Authentication(format!(
                "Code exchange failed: {reason}"
            )));
        }
        if !status.is_success() {
            return Err(ServiceError::Upstream(format!(
                "Token endpoint returned {status}"
            )));
        }

        response
            .json()
            .await
            .map_err(|e| ServiceError::Upstream(format!("Invalid token response: {e}")))
    }

    async fn provider(&self) -> HandlerResult<&Arc<Provider>> {
        self.provider
            .get_or_try_init(|| self.discover())
            .await
    }

    async fn discover(&self) -> HandlerResult<Arc<Provider>> {
        tracing::info!(issuer = %self.config.issuer_url.as_str(), "Discovering OIDC provider");

        // openidconnect brings its own reqwest; use its client to avoid version conflicts
        let discovery_client = openidconnect::reqwest::Client::builder()
            .timeout(EDGE_IDP_TIMEOUT)
            .redirect(openidconnect::reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| ServiceError::Internal(format!("Failed to create HTTP client: {e}")))?;

        let metadata =
            CoreProviderMetadata::discover_async(self.config.issuer_url.clone(), &discovery_client)
                .await
                .map_err(|e| {
                    tracing::warn!(error = %e, "OIDC discovery failed");
                    ServiceError::Upstream(format!("OIDC discovery failed: {e}"))
                })?;

        let token = metadata.token_endpoint().ok_or_else(|| {
            ServiceError::Upstream("Provider metadata has no token_endpoint".into())
        })?;
        let jwks = match &self.config.jwks_uri {
            Some(uri) => uri.clone(),
            None => parse_endpoint("jwks_uri", metadata.jwks_uri().as_str())?,
        };
        let endpoints = ProviderEndpoints {
            authorization: parse_endpoint(
                "authorization_endpoint",
                metadata.authorization_endpoint().as_str(),
            )?,
            token: parse_endpoint("token_endpoint", token.as_str())?,
            jwks,
        };

        let verifier = id_token_verifier(&self.config, &endpoints.jwks)
            .map_err(|e| ServiceError::Internal(e.to_string()))?;
        tracing::info!(jwks_uri = %endpoints.jwks, "OIDC provider discovered");

        Ok(Arc::new(Provider {
            endpoints,
            verifier,
        }))
    }
}

fn parse_endpoint(name: &str, value: &str) -> HandlerResult<Url> {
    Url::parse(value).map_err(|e| ServiceError::Upstream(format!("Invalid {name} '{value}': {e}")))
}

fn id_token_verifier(config: &OidcConfig, jwks: &Url) -> Result<TokenVerifier> {
    let cache: Arc<dyn KeyResolver> = Arc::new(JwksCache::new(
        jwks.clone(),
        JWKS_CACHE_TTL,
        http_client(JWKS_FETCH_TIMEOUT)?,
    ));
    Ok(TokenVerifier::new(
        VerifierConfig::new(config.issuer_url.as_str(), config.audience.clone()),
        cache,
    ))
}

/// Random URL-safe value for `state` and `nonce`.
pub fn random_token() -> String {
    let mut bytes = [0u8; 24];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
