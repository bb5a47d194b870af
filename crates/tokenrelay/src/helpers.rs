//! Small shared helpers

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Seconds since the Unix epoch according to the wall clock.
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, duration_secs)
}

/// Whole seconds of a duration as a signed timestamp offset (saturating).
pub fn duration_secs(duration: Duration) -> i64 {
    i64::try_from(duration.as_secs()).unwrap_or(i64::MAX)
}

/// Extract the token from an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header_value: &str) -> Option<&str> {
    header_value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unix_now_is_positive() {
        assert!(unix_now() > 1_600_000_000);
    }

    #[test]
    fn test_duration_secs_saturates() {
        assert_eq!(duration_secs(Duration::from_secs(3600)), 3600);
        assert_eq!(duration_secs(Duration::MAX), i64::MAX);
    }

    #[test]
    fn test_bearer_token_extracts_value() {
        assert_eq!(bearer_token("Bearer abc.def.ghi"), Some("abc.def.ghi"));
    }

    #[test]
    fn test_bearer_token_rejects_other_schemes() {
        assert_eq!(bearer_token("Basic dXNlcjpwYXNz"), None);
        assert_eq!(bearer_token("Bearer "), None);
        assert_eq!(bearer_token("bearer abc"), None);
    }
}
