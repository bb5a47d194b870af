//! Identity provider emulator state and operations

use std::sync::Arc;

use dashmap::DashMap;
use subtle::ConstantTimeEq;
use url::Url;
use uuid::Uuid;

use super::config::IdpConfig;
use super::error::{IdpError, Result};
use super::keys::SigningKey;
use super::oauth::{
    AuthorizeParams, DiscoveryDocument, PendingCode, TokenBundle, TokenRequest, UserInfo,
};
use super::registry::{Introspection, RevokeOutcome, TokenRegistry};
use super::sts::{self, AssumeRoleRequest, AssumeRoleResponse, SessionTokenClaims};
use super::users::{MockUser, UserDirectory};
use crate::auth::{Claims, JwkSet, TokenVerifier, VerifierConfig};
use crate::helpers::{duration_secs, unix_now};
use crate::observability;

/// Scope granted to every access token
pub const GRANTED_SCOPE: &str = "openid profile email";

const AUTHORIZATION_CODE_GRANT: &str = "authorization_code";

/// Emulated identity provider: issues, introspects and revokes tokens and
/// mints temporary credentials from identity tokens.
///
/// Owns all mutable emulator state; share it behind an `Arc`.
#[derive(Debug)]
pub struct IdentityProvider {
    config: IdpConfig,
    signing_key: SigningKey,
    verifier: TokenVerifier,
    users: UserDirectory,
    registry: Arc<TokenRegistry>,
    codes: DashMap<String, PendingCode>,
}

impl IdentityProvider {
    pub fn new(config: IdpConfig, signing_key: SigningKey, users: UserDirectory) -> Self {
        let verifier = TokenVerifier::new(
            VerifierConfig::new(config.issuer.clone(), config.audience.clone()),
            Arc::new(signing_key.clone()),
        );
        Self {
            config,
            signing_key,
            verifier,
            users,
            registry: Arc::new(TokenRegistry::new()),
            codes: DashMap::new(),
        }
    }

    pub const fn config(&self) -> &IdpConfig {
        &self.config
    }

    pub const fn users(&self) -> &UserDirectory {
        &self.users
    }

    /// Shared handle for [`super::RegistrySweepTask`].
    pub fn registry(&self) -> Arc<TokenRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn jwks(&self) -> JwkSet {
        self.signing_key.jwks()
    }

    pub fn discovery(&self) -> DiscoveryDocument {
        let strings = |items: &[&str]| items.iter().map(ToString::to_string).collect();
        DiscoveryDocument {
            issuer: self.config.issuer.clone(),
            authorization_endpoint: self.config.endpoint("/oauth2/authorize"),
            token_endpoint: self.config.endpoint("/oauth2/token"),
            userinfo_endpoint: self.config.endpoint("/oauth2/userInfo"),
            jwks_uri: self.config.endpoint("/.well-known/jwks.json"),
            response_types_supported: strings(&["code"]),
            subject_types_supported: strings(&["public"]),
            id_token_signing_alg_values_supported: strings(&["RS256"]),
            grant_types_supported: strings(&[AUTHORIZATION_CODE_GRANT]),
            token_endpoint_auth_methods_supported: strings(&["client_secret_post"]),
            scopes_supported: strings(&["openid", "profile", "email"]),
        }
    }

    /// Direct credential login.
    pub fn login(&self, username: &str, password: &str) -> Result<TokenBundle> {
        let user = self.users.authenticate(username, password)?;
        self.issue_tokens(user, None, unix_now(), "password")
    }

    fn issue_tokens(
        &self,
        user: &MockUser,
        nonce: Option<&str>,
        now: i64,
        grant: &'static str,
    ) -> Result<TokenBundle> {
        let exp = now.saturating_add(duration_secs(self.config.token_lifetime));
        let base = Claims::new(
            self.config.issuer.clone(),
            self.config.audience.clone(),
            user.sub.clone(),
            now,
            exp,
        );

        let access = base
            .clone()
            .with_claim("token_use", "access")
            .with_claim("scope", GRANTED_SCOPE)
            .with_claim("username", user.username.clone())
            .with_claim("jti", Uuid::new_v4().to_string());

        let mut id = base
            .with_claim("token_use", "id")
            .with_claim("email", user.email.clone())
            .with_claim("email_verified", user.email_verified)
            .with_claim("jti", Uuid::new_v4().to_string());
        id.extra.extend(user.attribute_claims());
        if let Some(nonce) = nonce {
            id = id.with_claim("nonce", nonce);
        }

        let access_token = self.signing_key.sign(&access)?;
        let id_token = self.signing_key.sign(&id)?;
        self.registry.register(access_token.clone(), access, now);

        observability::record_token_issued(grant);
        tracing::info!(sub = %user.sub, grant, "Issued token bundle");

        Ok(TokenBundle {
            access_token,
            id_token,
            refresh_token: Uuid::new_v4().to_string(),
            token_type: "Bearer".to_string(),
            expires_in: self.config.token_lifetime.as_secs(),
        })
    }

    pub fn introspect(&self, token: &str) -> Introspection {
        self.registry.introspect(token, unix_now())
    }

    pub fn revoke(&self, token: &str) -> Result<RevokeOutcome> {
        self.registry.revoke(token)
    }

    /// Exchange an identity token for synthetic temporary credentials.
    pub async fn assume_role(&self, request: &AssumeRoleRequest) -> Result<AssumeRoleResponse> {
        let outcome = self.assume_role_inner(request).await;
        observability::record_role_assumption(outcome.is_ok());
        outcome
    }

    async fn assume_role_inner(&self, request: &AssumeRoleRequest) -> Result<AssumeRoleResponse> {
        let claims = self.verifier.verify(&request.id_token).await?;
        if claims.token_use() != Some("id") {
            return Err(IdpError::BadRequest("Token must be an ID token".into()));
        }

        let tags = sts::extract_session_tags(&claims);
        let session_name = request
            .session_name
            .clone()
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| sts::default_session_name(&claims.sub));

        let now = unix_now();
        let exp = now.saturating_add(duration_secs(self.config.role_lifetime));
        let session_token = self.signing_key.sign(&SessionTokenClaims {
            sub: claims.sub.clone(),
            role_arn: request.role_arn.clone(),
            session_name: session_name.clone(),
            session_tags: tags.clone(),
            iat: now,
            exp,
        })?;

        tracing::info!(
            sub = %claims.sub,
            role = sts::role_name(&request.role_arn),
            tags = tags.len(),
            "Assumed role"
        );

        Ok(AssumeRoleResponse {
            credentials: sts::TemporaryCredentials {
                access_key_id: sts::random_key_id("ASIA"),
                secret_access_key: sts::random_secret(),
                session_token,
                expiration: sts::iso_expiration(exp),
            },
            assumed_role_user: sts::AssumedRoleUser {
                assumed_role_id: format!("{}:{session_name}", sts::random_key_id("AROA")),
                arn: sts::assumed_role_arn(&request.role_arn, &session_name),
            },
            subject_from_web_identity_token: claims.sub,
            session_tags: sts::tag_list(&tags),
        })
    }

    /// Validate authorize parameters before showing or accepting the login form.
    pub fn check_authorize_params(&self, params: &AuthorizeParams) -> Result<()> {
        if params.response_type != "code" {
            return Err(IdpError::InvalidRequest(format!(
                "unsupported response_type '{}'",
                params.response_type
            )));
        }
        if params.client_id != self.config.client_id {
            return Err(IdpError::InvalidClient);
        }
        Url::parse(&params.redirect_uri)
            .map_err(|_| IdpError::InvalidRequest("redirect_uri must be an absolute URL".into()))?;
        if !self.config.redirect_uris.is_empty()
            && !self.config.redirect_uris.contains(&params.redirect_uri)
        {
            return Err(IdpError::InvalidRequest(
                "redirect_uri is not registered".into(),
            ));
        }
        Ok(())
    }

    /// Authenticate the user and return the redirect carrying a one-time code.
    pub fn authorize(&self, params: &AuthorizeParams, username: &str, password: &str) -> Result<Url> {
        self.check_authorize_params(params)?;
        let user = self.users.authenticate(username, password)?;

        let now = unix_now();
        self.codes.retain(|_, pending| pending.expires_at >= now);

        let code = Uuid::new_v4().simple().to_string();
        self.codes.insert(
            code.clone(),
            PendingCode {
                client_id: params.client_id.clone(),
                redirect_uri: params.redirect_uri.clone(),
                username: user.username.clone(),
                nonce: params.nonce.clone(),
                expires_at: now.saturating_add(duration_secs(self.config.code_lifetime)),
            },
        );

        let mut redirect = Url::parse(&params.redirect_uri)
            .map_err(|_| IdpError::InvalidRequest("redirect_uri must be an absolute URL".into()))?;
        {
            let mut query = redirect.query_pairs_mut();
            query.append_pair("code", &code);
            if let Some(state) = &params.state {
                query.append_pair("state", state);
            }
        }
        Ok(redirect)
    }

    /// Token endpoint: redeem an authorization code.
    pub fn exchange_code(&self, request: &TokenRequest) -> Result<TokenBundle> {
        self.exchange_code_at(request, unix_now())
    }

    fn exchange_code_at(&self, request: &TokenRequest, now: i64) -> Result<TokenBundle> {
        if request.grant_type != AUTHORIZATION_CODE_GRANT {
            return Err(IdpError::UnsupportedGrantType(request.grant_type.clone()));
        }

        let client_id = request.client_id.as_deref().unwrap_or_default();
        let client_secret = request.client_secret.as_deref().unwrap_or_default();
        let secret_ok: bool = client_secret
            .as_bytes()
            .ct_eq(self.config.client_secret.as_bytes())
            .into();
        if client_id != self.config.client_id || !secret_ok {
            return Err(IdpError::InvalidClient);
        }

        let code = request
            .code
            .as_deref()
            .ok_or_else(|| IdpError::InvalidRequest("missing code".into()))?;
        // Removing first makes every code single-use, even when redemption fails.
        let (_, pending) = self
            .codes
            .remove(code)
            .ok_or_else(|| IdpError::InvalidGrant("unknown or already used code".into()))?;

        if pending.expires_at < now {
            return Err(IdpError::InvalidGrant("code expired".into()));
        }
        if pending.client_id != client_id {
            return Err(IdpError::InvalidGrant(
                "code was issued to another client".into(),
            ));
        }
        if request.redirect_uri.as_deref() != Some(pending.redirect_uri.as_str()) {
            return Err(IdpError::InvalidGrant("redirect_uri mismatch".into()));
        }

        let user = self
            .users
            .get(&pending.username)
            .ok_or_else(|| IdpError::InvalidGrant("unknown subject".into()))?;
        self.issue_tokens(user, pending.nonce.as_deref(), now, AUTHORIZATION_CODE_GRANT)
    }

    /// Profile of the subject behind an active access token.
    pub async fn userinfo(&self, access_token: &str) -> Result<UserInfo> {
        let claims = self.verifier.verify(access_token).await?;
        if claims.token_use() != Some("access") {
            return Err(IdpError::Unauthorized(
                "Invalid token: not an access token".into(),
            ));
        }
        if !self.registry.is_active(access_token, unix_now()) {
            return Err(IdpError::Unauthorized("Token is not active".into()));
        }

        let user = claims
            .str_claim("username")
            .and_then(|name| self.users.get(name))
            .ok_or(IdpError::NotFound)?;

        Ok(UserInfo {
            sub: user.sub.clone(),
            username: user.username.clone(),
            email: user.email.clone(),
            email_verified: user.email_verified,
            groups: user.groups.clone(),
        })
    }

    pub fn pending_codes(&self) -> usize {
        self.codes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::idp::registry::TokenState;
    use crate::idp::test_signing_key;

    const REDIRECT: &str = "http://localhost:8080/auth/callback";

    fn provider() -> IdentityProvider {
        IdentityProvider::new(
            IdpConfig::default(),
            test_signing_key().clone(),
            UserDirectory::with_test_users(),
        )
    }

    fn verifier() -> TokenVerifier {
        TokenVerifier::new(
            VerifierConfig::new(crate::DEFAULT_ISSUER, crate::DEFAULT_AUDIENCE),
            Arc::new(test_signing_key().clone()),
        )
    }

    fn authorize_params(state: Option<&str>) -> AuthorizeParams {
        AuthorizeParams {
            response_type: "code".into(),
            client_id: "poc-edge".into(),
            redirect_uri: REDIRECT.into(),
            state: state.map(str::to_string),
            scope: Some("openid".into()),
            nonce: None,
        }
    }

    fn token_request(code: &str) -> TokenRequest {
        TokenRequest {
            grant_type: "authorization_code".into(),
            code: Some(code.into()),
            redirect_uri: Some(REDIRECT.into()),
            client_id: Some("poc-edge".into()),
            client_secret: Some("poc-edge-secret".into()),
        }
    }

    fn code_from(redirect: &Url) -> String {
        redirect
            .query_pairs()
            .find(|(k, _)| k == "code")
            .map(|(_, v)| v.into_owned())
            .unwrap()
    }

    #[tokio::test]
    async fn test_login_issues_verifiable_tokens() {
        let idp = provider();
        let bundle = idp
            .login("testuser@example.com", "TestPassword123!")
            .unwrap();
        assert_eq!(bundle.token_type, "Bearer");
        assert_eq!(bundle.expires_in, 3600);
        assert!(Uuid::parse_str(&bundle.refresh_token).is_ok());

        let access = verifier().verify(&bundle.access_token).await.unwrap();
        let id = verifier().verify(&bundle.id_token).await.unwrap();

        assert_eq!(access.token_use(), Some("access"));
        assert_eq!(access.str_claim("scope"), Some(GRANTED_SCOPE));
        assert!(access.email().is_none());
        assert_eq!(id.token_use(), Some("id"));
        assert_eq!(id.email(), Some("testuser@example.com"));
        assert_eq!(id.str_claim("custom:team"), Some("platform"));
        assert_eq!(id.roles(), vec!["developers", "poc-team"]);
        assert_eq!(access.exp, id.exp);
    }

    #[test]
    fn test_login_rejects_bad_credentials_uniformly() {
        let idp = provider();
        let a = idp.login("testuser@example.com", "wrong").unwrap_err();
        let b = idp.login("nobody@example.com", "wrong").unwrap_err();
        assert!(matches!(a, IdpError::InvalidCredentials));
        assert_eq!(a.to_string(), b.to_string());
    }

    #[test]
    fn test_introspect_and_revoke_lifecycle() {
        let idp = provider();
        let bundle = idp.login("admin@example.com", "AdminPass456!").unwrap();

        let info = idp.introspect(&bundle.access_token);
        assert!(info.active);
        assert_eq!(info.sub.as_deref(), Some("b2c3d4e5-f6a7-8901-bcde-f12345678901"));
        assert_eq!(info.username.as_deref(), Some("admin@example.com"));

        assert_eq!(idp.revoke(&bundle.access_token).unwrap(), RevokeOutcome::Revoked);
        assert_eq!(
            idp.revoke(&bundle.access_token).unwrap(),
            RevokeOutcome::AlreadyRevoked
        );
        assert!(!idp.introspect(&bundle.access_token).active);
        assert_eq!(
            idp.registry().state(&bundle.access_token),
            Some(TokenState::Revoked)
        );
    }

    #[test]
    fn test_identity_token_is_not_registered() {
        let idp = provider();
        let bundle = idp.login("admin@example.com", "AdminPass456!").unwrap();
        assert!(!idp.introspect(&bundle.id_token).active);
        assert!(matches!(idp.revoke(&bundle.id_token), Err(IdpError::NotFound)));
    }

    #[tokio::test]
    async fn test_assume_role_propagates_session_tags() {
        let idp = provider();
        let bundle = idp
            .login("testuser@example.com", "TestPassword123!")
            .unwrap();

        let response = idp
            .assume_role(&AssumeRoleRequest {
                id_token: bundle.id_token,
                role_arn: "arn:aws:iam::123456789012:role/poc-agent".into(),
                session_name: None,
            })
            .await
            .unwrap();

        let tags: std::collections::BTreeMap<_, _> = response
            .session_tags
            .iter()
            .map(|t| (t.key.as_str(), t.value.as_str()))
            .collect();
        assert_eq!(
            tags,
            [
                ("cost_center", "engineering"),
                ("env", "dev"),
                ("project", "poc"),
                ("team", "platform"),
            ]
            .into_iter()
            .collect()
        );
        assert_eq!(
            response.subject_from_web_identity_token,
            "a1b2c3d4-e5f6-7890-abcd-ef1234567890"
        );
        assert_eq!(
            response.assumed_role_user.arn,
            "arn:aws:sts::000000000000:assumed-role/poc-agent/cognito-a1b2c3d4"
        );
        assert!(
            response
                .assumed_role_user
                .assumed_role_id
                .ends_with(":cognito-a1b2c3d4")
        );
        assert!(response.credentials.access_key_id.starts_with("ASIA"));
        assert!(response.credentials.expiration.ends_with('Z'));
    }

    #[tokio::test]
    async fn test_assume_role_session_token_embeds_tags() {
        let idp = provider();
        let bundle = idp.login("admin@example.com", "AdminPass456!").unwrap();
        let response = idp
            .assume_role(&AssumeRoleRequest {
                id_token: bundle.id_token,
                role_arn: "arn:aws:iam::1:role/reader".into(),
                session_name: Some("custom-session".into()),
            })
            .await
            .unwrap();

        let payload = response.credentials.session_token.split('.').nth(1).unwrap();
        let bytes = base64::Engine::decode(
            &base64::engine::general_purpose::URL_SAFE_NO_PAD,
            payload,
        )
        .unwrap();
        let claims: SessionTokenClaims = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(claims.session_name, "custom-session");
        assert_eq!(claims.role_arn, "arn:aws:iam::1:role/reader");
        assert_eq!(claims.session_tags["env"], "prod");
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[tokio::test]
    async fn test_assume_role_rejects_access_token() {
        let idp = provider();
        let bundle = idp.login("admin@example.com", "AdminPass456!").unwrap();
        let result = idp
            .assume_role(&AssumeRoleRequest {
                id_token: bundle.access_token,
                role_arn: "arn:aws:iam::1:role/reader".into(),
                session_name: None,
            })
            .await;
        assert!(matches!(result, Err(IdpError::BadRequest(msg)) if msg == "Token must be an ID token"));
    }

    #[tokio::test]
    async fn test_assume_role_rejects_expired_token() {
        let idp = provider();
        let now = unix_now();
        let expired = test_signing_key()
            .sign(
                &Claims::new(crate::DEFAULT_ISSUER, crate::DEFAULT_AUDIENCE, "u", now - 7200, now - 3600)
                    .with_claim("token_use", "id"),
            )
            .unwrap();
        let result = idp
            .assume_role(&AssumeRoleRequest {
                id_token: expired,
                role_arn: "arn:aws:iam::1:role/reader".into(),
                session_name: None,
            })
            .await;
        assert!(matches!(result, Err(IdpError::Unauthorized(msg)) if msg == "Token has expired"));
    }

    #[tokio::test]
    async fn test_assume_role_rejects_wrong_audience() {
        let idp = provider();
        let now = unix_now();
        let token = test_signing_key()
            .sign(
                &Claims::new(crate::DEFAULT_ISSUER, "api://other", "u", now, now + 60)
                    .with_claim("token_use", "id"),
            )
            .unwrap();
        let result = idp
            .assume_role(&AssumeRoleRequest {
                id_token: token,
                role_arn: "arn:aws:iam::1:role/reader".into(),
                session_name: None,
            })
            .await;
        assert!(matches!(result, Err(IdpError::Unauthorized(msg)) if msg.starts_with("Invalid token")));
    }

    #[tokio::test]
    async fn test_authorization_code_flow() {
        let idp = provider();
        let redirect = idp
            .authorize(
                &authorize_params(Some("xyz")),
                "testuser@example.com",
                "TestPassword123!",
            )
            .unwrap();
        assert!(redirect.as_str().starts_with(REDIRECT));
        assert!(redirect.query_pairs().any(|(k, v)| k == "state" && v == "xyz"));

        let bundle = idp.exchange_code(&token_request(&code_from(&redirect))).unwrap();
        let id = verifier().verify(&bundle.id_token).await.unwrap();
        assert_eq!(id.sub, "a1b2c3d4-e5f6-7890-abcd-ef1234567890");
        assert!(idp.introspect(&bundle.access_token).active);
    }

    #[test]
    fn test_code_is_single_use() {
        let idp = provider();
        let redirect = idp
            .authorize(&authorize_params(None), "admin@example.com", "AdminPass456!")
            .unwrap();
        let request = token_request(&code_from(&redirect));

        assert!(idp.exchange_code(&request).is_ok());
        assert!(matches!(
            idp.exchange_code(&request),
            Err(IdpError::InvalidGrant(_))
        ));
    }

    #[test]
    fn test_expired_code_rejected() {
        let idp = provider();
        let redirect = idp
            .authorize(&authorize_params(None), "admin@example.com", "AdminPass456!")
            .unwrap();
        let later = unix_now() + 301;
        let result = idp.exchange_code_at(&token_request(&code_from(&redirect)), later);
        assert!(matches!(result, Err(IdpError::InvalidGrant(msg)) if msg == "code expired"));
    }

    #[test]
    fn test_code_bound_to_redirect_uri() {
        let idp = provider();
        let redirect = idp
            .authorize(&authorize_params(None), "admin@example.com", "AdminPass456!")
            .unwrap();
        let mut request = token_request(&code_from(&redirect));
        request.redirect_uri = Some("http://evil.example/callback".into());
        assert!(matches!(
            idp.exchange_code(&request),
            Err(IdpError::InvalidGrant(_))
        ));
    }

    #[test]
    fn test_token_endpoint_error_codes() {
        let idp = provider();

        let mut request = token_request("whatever");
        request.grant_type = "password".into();
        assert!(matches!(
            idp.exchange_code(&request),
            Err(IdpError::UnsupportedGrantType(_))
        ));

        let mut request = token_request("whatever");
        request.client_secret = Some("wrong".into());
        assert!(matches!(
            idp.exchange_code(&request),
            Err(IdpError::InvalidClient)
        ));
    }

    #[test]
    fn test_authorize_validation() {
        let idp = provider();

        let mut params = authorize_params(None);
        params.response_type = "token".into();
        assert!(matches!(
            idp.check_authorize_params(&params),
            Err(IdpError::InvalidRequest(_))
        ));

        let mut params = authorize_params(None);
        params.client_id = "someone-else".into();
        assert!(matches!(
            idp.check_authorize_params(&params),
            Err(IdpError::InvalidClient)
        ));

        let result = idp.authorize(&authorize_params(None), "admin@example.com", "nope");
        assert!(matches!(result, Err(IdpError::InvalidCredentials)));
        assert_eq!(idp.pending_codes(), 0);
    }

    #[tokio::test]
    async fn test_userinfo_requires_active_access_token() {
        let idp = provider();
        let bundle = idp
            .login("testuser@example.com", "TestPassword123!")
            .unwrap();

        let info = idp.userinfo(&bundle.access_token).await.unwrap();
        assert_eq!(info.email, "testuser@example.com");
        assert_eq!(info.groups, vec!["developers", "poc-team"]);

        assert!(matches!(
            idp.userinfo(&bundle.id_token).await,
            Err(IdpError::Unauthorized(_))
        ));

        idp.revoke(&bundle.access_token).unwrap();
        assert!(matches!(
            idp.userinfo(&bundle.access_token).await,
            Err(IdpError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_discovery_document() {
        let doc = provider().discovery();
        assert_eq!(doc.issuer, "http://localhost:9000");
        assert_eq!(doc.jwks_uri, "http://localhost:9000/.well-known/jwks.json");
        assert_eq!(doc.userinfo_endpoint, "http://localhost:9000/oauth2/userInfo");
        assert_eq!(doc.grant_types_supported, vec!["authorization_code"]);
        assert_eq!(doc.id_token_signing_alg_values_supported, vec!["RS256"]);
    }
}
