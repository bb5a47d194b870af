//! Temporary-credential emulation (`AssumeRoleWithWebIdentity` shape)

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::Claims;

/// Session tag name and the identity-token claim it is read from.
pub const SESSION_TAG_CLAIMS: [(&str, &str); 4] = [
    ("team", "custom:team"),
    ("project", "custom:project"),
    ("env", "custom:env"),
    ("cost_center", "custom:cost_center"),
];

const ACCOUNT_ID: &str = "000000000000";

#[derive(Debug, Clone, Deserialize)]
pub struct AssumeRoleRequest {
    pub id_token: String,
    pub role_arn: String,
    #[serde(default)]
    pub session_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AssumeRoleResponse {
    pub credentials: TemporaryCredentials,
    pub assumed_role_user: AssumedRoleUser,
    pub subject_from_web_identity_token: String,
    pub session_tags: Vec<SessionTag>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TemporaryCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    /// ISO-8601 UTC, second precision
    pub expiration: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AssumedRoleUser {
    pub assumed_role_id: String,
    pub arn: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SessionTag {
    pub key: String,
    pub value: String,
}

/// Payload of the signed session token inside the credential bundle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionTokenClaims {
    pub sub: String,
    pub role_arn: String,
    pub session_name: String,
    pub session_tags: BTreeMap<String, String>,
    pub iat: i64,
    pub exp: i64,
}

/// Tags present and non-empty in the identity token.
pub fn extract_session_tags(claims: &Claims) -> BTreeMap<String, String> {
    SESSION_TAG_CLAIMS
        .iter()
        .filter_map(|(tag, claim)| {
            claims
                .str_claim(claim)
                .filter(|v| !v.is_empty())
                .map(|v| ((*tag).to_string(), v.to_string()))
        })
        .collect()
}

pub fn tag_list(tags: &BTreeMap<String, String>) -> Vec<SessionTag> {
    tags.iter()
        .map(|(key, value)| SessionTag {
            key: key.clone(),
            value: value.clone(),
        })
        .collect()
}

/// `cognito-` followed by the first eight characters of the subject.
pub fn default_session_name(sub: &str) -> String {
    let prefix: String = sub.chars().take(8).collect();
    format!("cognito-{prefix}")
}

/// Last path segment of the role ARN.
pub fn role_name(role_arn: &str) -> &str {
    role_arn.rsplit('/').next().unwrap_or(role_arn)
}

pub fn assumed_role_arn(role_arn: &str, session_name: &str) -> String {
    format!(
        "arn:aws:sts::{ACCOUNT_ID}:assumed-role/{}/{session_name}",
        role_name(role_arn)
    )
}

/// `prefix` followed by sixteen random upper-case hex digits.
pub fn random_key_id(prefix: &str) -> String {
    let hex = Uuid::new_v4().simple().to_string().to_uppercase();
    format!("{prefix}{}", &hex[..16])
}

pub fn random_secret() -> String {
    format!("mock/{}", Uuid::new_v4().simple())
}

pub fn iso_expiration(exp: i64) -> String {
    DateTime::<Utc>::from_timestamp(exp, 0)
        .unwrap_or_default()
        .to_rfc3339_opts(SecondsFormat::Secs, true)
}
