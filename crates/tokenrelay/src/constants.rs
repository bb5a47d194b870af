//! Lifetimes, names and defaults shared across services

use std::time::Duration;

/// Lifetime of a cached key set before the next verification refetches it
pub const JWKS_CACHE_TTL: Duration = Duration::from_secs(300);

/// Timeout for a single key-set fetch
pub const JWKS_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Maximum age of a signed session identifier
pub const SESSION_SIGNATURE_MAX_AGE: Duration = Duration::from_secs(12 * 3600);

/// Expiry applied to session records in the key-value store
pub const SESSION_STORE_TTL: Duration = Duration::from_secs(8 * 3600);

/// Prefix of session record keys in the key-value store
pub const SESSION_KEY_PREFIX: &str = "sess:";

/// Default session cookie name
pub const SESSION_COOKIE_NAME: &str = "poc_session";

/// Cookie carrying the signed OAuth `state` between login and callback
pub const OAUTH_STATE_COOKIE_NAME: &str = "poc_oauth_state";

/// Maximum age of the signed OAuth `state` cookie
pub const OAUTH_STATE_MAX_AGE: Duration = Duration::from_secs(600);

/// Lifetime of tokens minted by the identity provider emulator
pub const IDP_TOKEN_LIFETIME: Duration = Duration::from_secs(3600);

/// Lifetime of temporary credentials minted by role assumption
pub const ASSUMED_ROLE_LIFETIME: Duration = Duration::from_secs(3600);

/// Lifetime of a pending authorization code
pub const AUTHORIZATION_CODE_LIFETIME: Duration = Duration::from_secs(300);

/// Timeout for orchestrator -> resource API calls
pub const ORCHESTRATOR_UPSTREAM_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for edge -> orchestrator calls
pub const EDGE_UPSTREAM_TIMEOUT: Duration = Duration::from_secs(20);

/// Timeout for edge -> identity provider calls (discovery, code exchange)
pub const EDGE_IDP_TIMEOUT: Duration = Duration::from_secs(10);

/// Key identifier of the emulator signing key unless configured otherwise
pub const DEFAULT_KEY_ID: &str = "mock-key-id-1";

/// Default issuer of the emulator
pub const DEFAULT_ISSUER: &str = "http://localhost:9000";

/// Default audience of access and identity tokens
pub const DEFAULT_AUDIENCE: &str = "api://acme-api";

/// Health status reported by every service
pub const STATUS_HEALTHY: &str = "healthy";

/// Per-request timeout applied to every HTTP service
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
