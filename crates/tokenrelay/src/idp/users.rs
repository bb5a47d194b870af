//! Static user directory of the emulator

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};
use subtle::ConstantTimeEq;

use super::error::{IdpError, Result};

/// Compared against when the username is unknown, so both failure paths do
/// the same work.
const ABSENT_USER_PASSWORD: &str = "\u{0}absent\u{0}";

/// Test subject known to the emulator
#[derive(Debug, Clone)]
pub struct MockUser {
    pub username: String,
    pub password: String,
    pub sub: String,
    pub email: String,
    pub email_verified: bool,
    /// `custom:*` attributes, keyed by full claim name
    pub attributes: BTreeMap<String, String>,
    pub groups: Vec<String>,
}

impl MockUser {
    /// Extension claims carried by identity tokens and the debug listing.
    pub fn attribute_claims(&self) -> Map<String, Value> {
        let mut claims: Map<String, Value> = self
            .attributes
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        claims.insert("cognito:groups".into(), Value::from(self.groups.clone()));
        claims
    }
}

/// Entry of `GET /users`
#[derive(Debug, Clone, Serialize)]
pub struct UserListing {
    pub username: String,
    pub email: String,
    pub sub: String,
    pub attributes: Map<String, Value>,
}

#[derive(Debug, Clone, Default)]
pub struct UserDirectory {
    users: BTreeMap<String, MockUser>,
}

impl UserDirectory {
    pub fn new(users: impl IntoIterator<Item = MockUser>) -> Self {
        Self {
            users: users
                .into_iter()
                .map(|u| (u.username.clone(), u))
                .collect(),
        }
    }

    /// The two fixed test subjects.
    pub fn with_test_users() -> Self {
        Self::new([
            mock_user(
                "testuser@example.com",
                "TestPassword123!",
                "a1b2c3d4-e5f6-7890-abcd-ef1234567890",
                "dev",
                &["developers", "poc-team"],
            ),
            mock_user(
                "admin@example.com",
                "AdminPass456!",
                "b2c3d4e5-f6a7-8901-bcde-f12345678901",
                "prod",
                &["admins", "developers"],
            ),
        ])
    }

    pub fn get(&self, username: &str) -> Option<&MockUser> {
        self.users.get(username)
    }

    /// Check a credential pair. Unknown user and wrong password fail identically.
    pub fn authenticate(&self, username: &str, password: &str) -> Result<&MockUser> {
        let user = self.users.get(username);
        let expected = user.map_or(ABSENT_USER_PASSWORD, |u| u.password.as_str());
        let matches: bool = expected.as_bytes().ct_eq(password.as_bytes()).into();

        match user {
            Some(user) if matches => Ok(user),
            _ => Err(IdpError::InvalidCredentials),
        }
    }

    pub fn listing(&self) -> Vec<UserListing> {
        self.users
            .values()
            .map(|u| UserListing {
                username: u.username.clone(),
                email: u.email.clone(),
                sub: u.sub.clone(),
                attributes: u.attribute_claims(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

fn mock_user(username: &str, password: &str, sub: &str, env: &str, groups: &[&str]) -> MockUser {
    let attributes = [
        ("custom:team", "platform"),
        ("custom:project", "poc"),
        ("custom:env", env),
        ("custom:cost_center", "engineering"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();

    MockUser {
        username: username.to_string(),
        password: password.to_string(),
        sub: sub.to_string(),
        email: username.to_string(),
        email_verified: true,
        attributes,
        groups: groups.iter().map(ToString::to_string).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authenticate_success() {
        let dir = UserDirectory::with_test_users();
        let user = dir
            .authenticate("testuser@example.com", "TestPassword123!")
            .unwrap();
        assert_eq!(user.sub, "a1b2c3d4-e5f6-7890-abcd-ef1234567890");
    }

    #[test]
    fn test_authenticate_failures_are_uniform() {
        let dir = UserDirectory::with_test_users();
        let wrong_password = dir
            .authenticate("testuser@example.com", "nope")
            .unwrap_err();
        let unknown_user = dir.authenticate("ghost@example.com", "nope").unwrap_err();
        assert_eq!(wrong_password.to_string(), unknown_user.to_string());
        assert!(matches!(wrong_password, IdpError::InvalidCredentials));
        assert!(matches!(unknown_user, IdpError::InvalidCredentials));
    }

    #[test]
    fn test_password_prefix_rejected() {
        let dir = UserDirectory::with_test_users();
        assert!(dir.authenticate("admin@example.com", "AdminPass").is_err());
    }

    #[test]
    fn test_listing_exposes_custom_attributes_and_groups() {
        let dir = UserDirectory::with_test_users();
        let listing = dir.listing();
        assert_eq!(listing.len(), 2);

        let admin = listing
            .iter()
            .find(|u| u.username == "admin@example.com")
            .unwrap();
        assert_eq!(admin.attributes["custom:env"], "prod");
        assert_eq!(
            admin.attributes["cognito:groups"],
            serde_json::json!(["admins", "developers"])
        );
        assert!(!admin.attributes.contains_key("password"));
    }
}
