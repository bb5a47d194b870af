//! Environment variable overrides

use std::path::PathBuf;

use super::settings::Settings;

/// Environment variable names
mod vars {
    pub const OIDC_ISSUER: &str = "OIDC_ISSUER";
    pub const API_AUDIENCE: &str = "API_AUDIENCE";
    pub const OIDC_CLIENT_ID: &str = "OIDC_CLIENT_ID";
    pub const OIDC_CLIENT_SECRET: &str = "OIDC_CLIENT_SECRET";
    pub const OIDC_REDIRECT_URI: &str = "OIDC_REDIRECT_URI";
    pub const SESSION_SECRET: &str = "SESSION_SECRET";
    pub const SESSION_COOKIE_NAME: &str = "SESSION_COOKIE_NAME";
    pub const SESSION_STORE_URL: &str = "SESSION_STORE_URL";
    pub const ORCHESTRATOR_URL: &str = "ORCHESTRATOR_URL";
    pub const RESOURCE_URL: &str = "RESOURCE_URL";
    pub const JWKS_URI: &str = "JWKS_URI";
    pub const IDP_SIGNING_KEY_PATH: &str = "IDP_SIGNING_KEY_PATH";
    pub const RUST_LOG: &str = "RUST_LOG";
    pub const TOKENRELAY_JSON_LOGS: &str = "TOKENRELAY_JSON_LOGS";
}

/// Override settings from the process environment.
pub fn load_from_env(settings: &mut Settings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply overrides from any variable source. Issuer, audience and client
/// credentials are shared by every service that uses them.
pub fn apply_overrides(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(issuer) = lookup(vars::OIDC_ISSUER) {
        settings.idp.issuer.clone_from(&issuer);
        settings.resource.issuer.clone_from(&issuer);
        settings.edge.issuer = issuer;
    }

    if let Some(audience) = lookup(vars::API_AUDIENCE) {
        settings.idp.audience.clone_from(&audience);
        settings.resource.audience.clone_from(&audience);
        settings.edge.audience = audience;
    }

    if let Some(client_id) = lookup(vars::OIDC_CLIENT_ID) {
        settings.idp.client_id.clone_from(&client_id);
        settings.edge.client_id = client_id;
    }

    if let Some(secret) = lookup(vars::OIDC_CLIENT_SECRET) {
        settings.idp.client_secret.clone_from(&secret);
        settings.edge.client_secret = Some(secret);
    }

    if let Some(uri) = lookup(vars::OIDC_REDIRECT_URI) {
        settings.edge.redirect_uri = uri;
    }

    if let Some(secret) = lookup(vars::SESSION_SECRET) {
        settings.edge.session_secret = Some(secret);
    }

    if let Some(name) = lookup(vars::SESSION_COOKIE_NAME) {
        settings.edge.session_cookie_name = name;
    }

    if let Some(url) = lookup(vars::SESSION_STORE_URL) {
        settings.edge.session_store_url = url;
    }

    if let Some(url) = lookup(vars::ORCHESTRATOR_URL) {
        settings.edge.orchestrator_url = url;
    }

    if let Some(url) = lookup(vars::RESOURCE_URL) {
        settings.orchestrator.resource_url = url;
    }

    if let Some(uri) = lookup(vars::JWKS_URI) {
        settings.resource.jwks_uri = Some(uri.clone());
        settings.edge.jwks_uri = Some(uri);
    }

    if let Some(path) = lookup(vars::IDP_SIGNING_KEY_PATH) {
        settings.idp.signing_key_path = Some(PathBuf::from(path));
    }

    if let Some(level) = lookup(vars::RUST_LOG) {
        settings.telemetry.log_level = level;
    }

    if let Some(val) = lookup(vars::TOKENRELAY_JSON_LOGS) {
        settings.telemetry.json_logs = parse_bool(&val);
    }
}

fn parse_bool(s: &str) -> bool {
    matches!(s.to_lowercase().as_str(), "true" | "1" | "yes" | "on")
}
