//! JWT claims types

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Audience can be a single string or array of strings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    /// Exact string comparison against every listed audience.
    pub fn contains(&self, value: &str) -> bool {
        match self {
            Self::One(s) => s == value,
            Self::Many(v) => v.iter().any(|s| s == value),
        }
    }

    pub fn to_vec(&self) -> Vec<String> {
        match self {
            Self::One(s) => vec![s.clone()],
            Self::Many(v) => v.clone(),
        }
    }
}

/// Token payload: required registered claims plus open extension claims.
///
/// Unknown claims (`email`, `roles`, `custom:*`, `cognito:groups`, ...) land in
/// [`Claims::extra`] so that new attributes never break deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub iss: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<OneOrMany>,
    pub sub: String,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Claims {
    #[must_use]
    pub fn new(
        iss: impl Into<String>,
        aud: impl Into<String>,
        sub: impl Into<String>,
        iat: i64,
        exp: i64,
    ) -> Self {
        Self {
            iss: iss.into(),
            aud: Some(OneOrMany::One(aud.into())),
            sub: sub.into(),
            exp,
            iat: Some(iat),
            extra: Map::new(),
        }
    }

    /// Add an extension claim (builder style).
    #[must_use]
    pub fn with_claim(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.extra.insert(name.to_string(), value.into());
        self
    }

    pub fn claim(&self, name: &str) -> Option<&Value> {
        self.extra.get(name)
    }

    /// String-valued extension claim; non-string values are treated as absent.
    pub fn str_claim(&self, name: &str) -> Option<&str> {
        self.extra.get(name).and_then(Value::as_str)
    }

    pub fn email(&self) -> Option<&str> {
        self.str_claim("email")
    }

    /// `token_use` marker (`access` or `id` for tokens minted by the emulator)
    pub fn token_use(&self) -> Option<&str> {
        self.str_claim("token_use")
    }

    /// Roles from the `roles` claim, falling back to `cognito:groups`.
    pub fn roles(&self) -> Vec<String> {
        self.string_list("roles")
            .or_else(|| self.string_list("cognito:groups"))
            .unwrap_or_default()
    }

    fn string_list(&self, name: &str) -> Option<Vec<String>> {
        self.extra.get(name).and_then(Value::as_array).map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(ToString::to_string)
                .collect()
        })
    }
}
