//! Typed settings for the four services

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::constants::{
    DEFAULT_AUDIENCE, DEFAULT_ISSUER, DEFAULT_KEY_ID, EDGE_UPSTREAM_TIMEOUT, IDP_TOKEN_LIFETIME,
    JWKS_CACHE_TTL, JWKS_FETCH_TIMEOUT, ORCHESTRATOR_UPSTREAM_TIMEOUT, SESSION_COOKIE_NAME,
    SESSION_SIGNATURE_MAX_AGE, SESSION_STORE_TTL,
};
use crate::{Error, Result};

const DEFAULT_HOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);
const DEFAULT_CLIENT_ID: &str = "poc-edge";

/// Which service a process runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceKind {
    Idp,
    Resource,
    Orchestrator,
    Edge,
}

impl ServiceKind {
    /// Name used in logs, health responses and metrics.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Idp => "mock-idp",
            Self::Resource => "resource-api",
            Self::Orchestrator => "orchestrator",
            Self::Edge => "edge",
        }
    }
}

impl std::fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Logging and metrics configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub json_logs: bool,
    /// Install the Prometheus recorder behind `/metrics`
    pub metrics: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IdpSettings {
    pub host: IpAddr,
    pub port: u16,
    pub issuer: String,
    pub audience: String,
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uris: Vec<String>,
    /// PEM private key; a fresh key is generated when unset
    pub signing_key_path: Option<PathBuf>,
    pub key_id: String,
    pub token_lifetime_secs: u64,
    /// Registry sweep interval; `0` disables the sweep
    pub sweep_interval_secs: u64,
}

impl Default for IdpSettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST,
            port: 9000,
            issuer: DEFAULT_ISSUER.to_string(),
            audience: DEFAULT_AUDIENCE.to_string(),
            client_id: DEFAULT_CLIENT_ID.to_string(),
            client_secret: "poc-edge-secret".to_string(),
            redirect_uris: Vec::new(),
            signing_key_path: None,
            key_id: DEFAULT_KEY_ID.to_string(),
            token_lifetime_secs: IDP_TOKEN_LIFETIME.as_secs(),
            sweep_interval_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResourceSettings {
    pub host: IpAddr,
    pub port: u16,
    pub issuer: String,
    pub audience: String,
    /// Defaults to `<issuer>/.well-known/jwks.json`
    pub jwks_uri: Option<String>,
    pub jwks_cache_ttl_secs: u64,
    pub jwks_fetch_timeout_secs: u64,
    /// Background key-set refresh; `0` refreshes lazily only
    pub jwks_refresh_interval_secs: u64,
}

impl Default for ResourceSettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST,
            port: 8082,
            issuer: DEFAULT_ISSUER.to_string(),
            audience: DEFAULT_AUDIENCE.to_string(),
            jwks_uri: None,
            jwks_cache_ttl_secs: JWKS_CACHE_TTL.as_secs(),
            jwks_fetch_timeout_secs: JWKS_FETCH_TIMEOUT.as_secs(),
            jwks_refresh_interval_secs: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OrchestratorSettings {
    pub host: IpAddr,
    pub port: u16,
    pub resource_url: String,
    pub upstream_timeout_secs: u64,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST,
            port: 8081,
            resource_url: "http://localhost:8082".to_string(),
            upstream_timeout_secs: ORCHESTRATOR_UPSTREAM_TIMEOUT.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EdgeSettings {
    pub host: IpAddr,
    pub port: u16,
    pub issuer: String,
    pub audience: String,
    pub client_id: String,
    pub client_secret: Option<String>,
    pub redirect_uri: String,
    pub scopes: String,
    /// Defaults to the discovered `jwks_uri`
    pub jwks_uri: Option<String>,
    pub session_secret: Option<String>,
    pub session_cookie_name: String,
    pub session_store_url: String,
    pub session_ttl_secs: u64,
    pub session_max_age_secs: u64,
    /// Mark cookies `Secure` (enable behind TLS)
    pub cookie_secure: bool,
    pub orchestrator_url: String,
    pub upstream_timeout_secs: u64,
}

impl Default for EdgeSettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST,
            port: 8080,
            issuer: DEFAULT_ISSUER.to_string(),
            audience: DEFAULT_AUDIENCE.to_string(),
            client_id: DEFAULT_CLIENT_ID.to_string(),
            client_secret: None,
            redirect_uri: "http://localhost:8080/auth/callback".to_string(),
            scopes: "openid profile email".to_string(),
            jwks_uri: None,
            session_secret: None,
            session_cookie_name: SESSION_COOKIE_NAME.to_string(),
            session_store_url: "memory://".to_string(),
            session_ttl_secs: SESSION_STORE_TTL.as_secs(),
            session_max_age_secs: SESSION_SIGNATURE_MAX_AGE.as_secs(),
            cookie_secure: false,
            orchestrator_url: "http://localhost:8081".to_string(),
            upstream_timeout_secs: EDGE_UPSTREAM_TIMEOUT.as_secs(),
        }
    }
}

/// All settings. Each process reads the section of the service it runs.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub telemetry: TelemetryConfig,
    pub idp: IdpSettings,
    pub resource: ResourceSettings,
    pub orchestrator: OrchestratorSettings,
    pub edge: EdgeSettings,
}

impl Settings {
    pub const fn listen_addr(&self, kind: ServiceKind) -> SocketAddr {
        let (host, port) = match kind {
            ServiceKind::Idp => (self.idp.host, self.idp.port),
            ServiceKind::Resource => (self.resource.host, self.resource.port),
            ServiceKind::Orchestrator => (self.orchestrator.host, self.orchestrator.port),
            ServiceKind::Edge => (self.edge.host, self.edge.port),
        };
        SocketAddr::new(host, port)
    }

    /// Apply CLI listen overrides to the section of `kind`.
    pub fn set_listen(&mut self, kind: ServiceKind, host: Option<IpAddr>, port: Option<u16>) {
        let (h, p) = match kind {
            ServiceKind::Idp => (&mut self.idp.host, &mut self.idp.port),
            ServiceKind::Resource => (&mut self.resource.host, &mut self.resource.port),
            ServiceKind::Orchestrator => (&mut self.orchestrator.host, &mut self.orchestrator.port),
            ServiceKind::Edge => (&mut self.edge.host, &mut self.edge.port),
        };
        if let Some(host) = host {
            *h = host;
        }
        if let Some(port) = port {
            *p = port;
        }
    }

    /// Check the section of `kind`; any problem is fatal at startup.
    pub fn validate(&self, kind: ServiceKind) -> Result<()> {
        match kind {
            ServiceKind::Idp => {
                parse_url("idp.issuer", &self.idp.issuer)?;
                if self.idp.token_lifetime_secs == 0 {
                    return Err(Error::Config("idp.token_lifetime_secs must be positive".into()));
                }
            }
            ServiceKind::Resource => {
                parse_url("resource.issuer", &self.resource.issuer)?;
                self.resource.jwks_url()?;
                require("resource.audience", &self.resource.audience)?;
            }
            ServiceKind::Orchestrator => {
                parse_url("orchestrator.resource_url", &self.orchestrator.resource_url)?;
            }
            ServiceKind::Edge => self.edge.validate()?,
        }
        Ok(())
    }
}

impl ResourceSettings {
    /// Effective key-set URL.
    pub fn jwks_url(&self) -> Result<Url> {
        match &self.jwks_uri {
            Some(uri) => parse_url("resource.jwks_uri", uri),
            None => parse_url(
                "resource.issuer",
                &format!("{}/.well-known/jwks.json", self.issuer.trim_end_matches('/')),
            ),
        }
    }

    pub const fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.jwks_cache_ttl_secs)
    }

    pub const fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.jwks_fetch_timeout_secs)
    }
}

impl EdgeSettings {
    fn validate(&self) -> Result<()> {
        parse_url("edge.issuer", &self.issuer)?;
        parse_url("edge.redirect_uri", &self.redirect_uri)?;
        parse_url("edge.orchestrator_url", &self.orchestrator_url)?;
        if let Some(uri) = &self.jwks_uri {
            parse_url("edge.jwks_uri", uri)?;
        }
        require("edge.client_id", &self.client_id)?;
        require("edge.session_cookie_name", &self.session_cookie_name)?;
        require_opt("edge.client_secret (OIDC_CLIENT_SECRET)", self.client_secret.as_deref())?;
        require_opt("edge.session_secret (SESSION_SECRET)", self.session_secret.as_deref())?;

        if self.session_ttl_secs > self.session_max_age_secs {
            return Err(Error::Config(format!(
                "edge.session_ttl_secs ({}) must not exceed edge.session_max_age_secs ({})",
                self.session_ttl_secs, self.session_max_age_secs
            )));
        }
        Ok(())
    }

    pub fn session_secret(&self) -> Result<&str> {
        require_opt("edge.session_secret (SESSION_SECRET)", self.session_secret.as_deref())
    }

    pub fn client_secret(&self) -> Result<&str> {
        require_opt("edge.client_secret (OIDC_CLIENT_SECRET)", self.client_secret.as_deref())
    }

    pub const fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub const fn session_max_age(&self) -> Duration {
        Duration::from_secs(self.session_max_age_secs)
    }
}

fn parse_url(name: &str, value: &str) -> Result<Url> {
    Url::parse(value).map_err(|e| Error::Config(format!("Invalid {name} '{value}': {e}")))
}

fn require(name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::Config(format!("{name} must not be empty")));
    }
    Ok(())
}

fn require_opt<'a>(name: &str, value: Option<&'a str>) -> Result<&'a str> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(Error::Config(format!("{name} is required"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge_ready() -> Settings {
        let mut settings = Settings::default();
        settings.edge.client_secret = Some("client-secret".into());
        settings.edge.session_secret = Some("session-secret".into());
        settings
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.idp.port, 9000);
        assert_eq!(settings.edge.session_cookie_name, "poc_session");
        assert_eq!(settings.edge.session_ttl_secs, 8 * 3600);
        assert_eq!(settings.edge.session_max_age_secs, 12 * 3600);
        assert_eq!(settings.resource.jwks_cache_ttl_secs, 300);
        assert_eq!(settings.telemetry.log_level, "info");
        assert!(settings.telemetry.metrics);
    }

    #[test]
    fn test_default_sections_validate() {
        let settings = Settings::default();
        assert!(settings.validate(ServiceKind::Idp).is_ok());
        assert!(settings.validate(ServiceKind::Resource).is_ok());
        assert!(settings.validate(ServiceKind::Orchestrator).is_ok());
    }

    #[test]
    fn test_edge_requires_secrets() {
        let err = Settings::default()
            .validate(ServiceKind::Edge)
            .unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("client_secret"));

        assert!(edge_ready().validate(ServiceKind::Edge).is_ok());
    }

    #[test]
    fn test_edge_blank_secret_rejected() {
        let mut settings = edge_ready();
        settings.edge.session_secret = Some("   ".into());
        let err = settings.validate(ServiceKind::Edge).unwrap_err();
        assert!(err.to_string().contains("SESSION_SECRET"));
    }

    #[test]
    fn test_edge_store_ttl_longer_than_signature_window() {
        let mut settings = edge_ready();
        settings.edge.session_ttl_secs = 13 * 3600;
        let err = settings.validate(ServiceKind::Edge).unwrap_err();
        assert!(err.to_string().contains("session_ttl_secs"));
    }

    #[test]
    fn test_invalid_url_rejected() {
        let mut settings = Settings::default();
        settings.orchestrator.resource_url = "not a url".into();
        assert!(settings.validate(ServiceKind::Orchestrator).is_err());
    }

    #[test]
    fn test_jwks_url_derived_from_issuer() {
        let mut settings = Settings::default();
        settings.resource.issuer = "http://idp:9000/".into();
        assert_eq!(
            settings.resource.jwks_url().unwrap().as_str(),
            "http://idp:9000/.well-known/jwks.json"
        );

        settings.resource.jwks_uri = Some("http://keys.internal/jwks".into());
        assert_eq!(
            settings.resource.jwks_url().unwrap().as_str(),
            "http://keys.internal/jwks"
        );
    }

    #[test]
    fn test_set_listen_only_touches_one_section() {
        let mut settings = Settings::default();
        settings.set_listen(
            ServiceKind::Edge,
            Some(IpAddr::V4(Ipv4Addr::UNSPECIFIED)),
            Some(18080),
        );
        assert_eq!(
            settings.listen_addr(ServiceKind::Edge),
            "0.0.0.0:18080".parse().unwrap()
        );
        assert_eq!(settings.listen_addr(ServiceKind::Idp).port(), 9000);
    }

    #[test]
    fn test_service_names() {
        assert_eq!(ServiceKind::Idp.to_string(), "mock-idp");
        assert_eq!(ServiceKind::Edge.name(), "edge");
    }
}
