//! Emulator configuration

use std::time::Duration;

use crate::constants::{
    ASSUMED_ROLE_LIFETIME, AUTHORIZATION_CODE_LIFETIME, DEFAULT_AUDIENCE, DEFAULT_ISSUER,
    IDP_TOKEN_LIFETIME,
};

/// Registered OAuth client of the emulator; one client is enough for the
/// single edge service.
#[derive(Debug, Clone)]
pub struct IdpConfig {
    pub issuer: String,
    pub audience: String,
    pub client_id: String,
    pub client_secret: String,
    /// Accepted `redirect_uri` values. Empty accepts any absolute URL.
    pub redirect_uris: Vec<String>,
    pub token_lifetime: Duration,
    pub role_lifetime: Duration,
    pub code_lifetime: Duration,
}

impl Default for IdpConfig {
    fn default() -> Self {
        Self {
            issuer: DEFAULT_ISSUER.to_string(),
            audience: DEFAULT_AUDIENCE.to_string(),
            client_id: "poc-edge".to_string(),
            client_secret: "poc-edge-secret".to_string(),
            redirect_uris: Vec::new(),
            token_lifetime: IDP_TOKEN_LIFETIME,
            role_lifetime: ASSUMED_ROLE_LIFETIME,
            code_lifetime: AUTHORIZATION_CODE_LIFETIME,
        }
    }
}

impl IdpConfig {
    pub fn new(issuer: impl Into<String>, audience: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            audience: audience.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_client(
        mut self,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        self.client_id = client_id.into();
        self.client_secret = client_secret.into();
        self
    }

    /// Absolute URL of an emulator path under the issuer.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.issuer.trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = IdpConfig::default();
        assert_eq!(config.issuer, "http://localhost:9000");
        assert_eq!(config.audience, "api://acme-api");
        assert_eq!(config.token_lifetime, Duration::from_secs(3600));
        assert!(config.redirect_uris.is_empty());
    }

    #[test]
    fn test_endpoint_joins_without_double_slash() {
        let config = IdpConfig::new("http://idp:9000/", "aud");
        assert_eq!(
            config.endpoint("/.well-known/jwks.json"),
            "http://idp:9000/.well-known/jwks.json"
        );
    }
}
