//! Server-side session record

use serde::{Deserialize, Serialize};

use crate::auth::Claims;

/// What the edge keeps about a logged-in browser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

impl SessionRecord {
    /// Build from verified identity-token claims and the issued tokens.
    pub fn from_claims(
        claims: &Claims,
        access_token: impl Into<String>,
        refresh_token: Option<String>,
    ) -> Self {
        Self {
            sub: claims.sub.clone(),
            email: claims.email().map(str::to_string),
            roles: claims.roles(),
            access_token: access_token.into(),
            refresh_token,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_claims_uses_groups_as_roles() {
        let claims = Claims::new("iss", "aud", "user-1", 0, 10)
            .with_claim("email", "user@example.com")
            .with_claim("cognito:groups", vec!["developers"]);
        let record = SessionRecord::from_claims(&claims, "at", Some("rt".into()));

        assert_eq!(record.sub, "user-1");
        assert_eq!(record.email.as_deref(), Some("user@example.com"));
        assert_eq!(record.roles, vec!["developers"]);
        assert_eq!(record.refresh_token.as_deref(), Some("rt"));
    }

    #[test]
    fn test_optional_fields_default_when_absent() {
        let record: SessionRecord =
            serde_json::from_str(r#"{"sub": "u", "access_token": "at"}"#).unwrap();
        assert!(record.email.is_none());
        assert!(record.roles.is_empty());
        assert!(record.refresh_token.is_none());
    }

    #[test]
    fn test_null_refresh_token_accepted() {
        let record: SessionRecord = serde_json::from_str(
            r#"{"sub": "u", "email": "e", "roles": [], "access_token": "at", "refresh_token": null}"#,
        )
        .unwrap();
        assert!(record.refresh_token.is_none());
    }
}
