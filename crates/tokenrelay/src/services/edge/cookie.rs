//! Cookie header parsing and `Set-Cookie` rendering

use std::time::Duration;

use axum::http::{HeaderMap, HeaderValue, header};

use crate::services::ServiceError;

/// Attributes shared by every cookie the edge sets.
#[derive(Debug, Clone)]
pub struct CookiePolicy {
    pub secure: bool,
}

impl CookiePolicy {
    /// `HttpOnly; SameSite=Lax; Path=/` cookie. Without `max_age` it lives
    /// for the browser session.
    pub fn render(
        &self,
        name: &str,
        value: &str,
        max_age: Option<Duration>,
    ) -> Result<HeaderValue, ServiceError> {
        let mut cookie = format!("{name}={value}; Path=/; HttpOnly; SameSite=Lax");
        if let Some(max_age) = max_age {
            cookie.push_str(&format!("; Max-Age={}", max_age.as_secs()));
        }
        if self.secure {
            cookie.push_str("; Secure");
        }
        HeaderValue::from_str(&cookie)
            .map_err(|_| ServiceError::Internal(format!("Cookie '{name}' has an invalid value")))
    }

    pub fn clear(&self, name: &str) -> Result<HeaderValue, ServiceError> {
        self.render(name, "", Some(Duration::ZERO))
    }
}

/// Value of the first cookie named `name` across all `Cookie` headers.
pub fn read_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim_matches('"'))
        .filter(|value| !value.is_empty())
}
