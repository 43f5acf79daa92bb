//! App access token lifecycle.

use chrono::{DateTime, Duration, Utc};
use common::types::TokenResponse;
use redact::Secret;

/// A client-credentials token and the moment it stops being valid.
#[derive(Debug, Clone)]
pub struct AppAccessToken {
    secret: Secret<String>,
    expires_at: DateTime<Utc>,
}

impl AppAccessToken {
    pub fn new(secret: String, expires_at: DateTime<Utc>) -> Self {
        Self {
            secret: Secret::new(secret),
            expires_at,
        }
    }

    /// Expiry saturates at the latest representable instant when `expires_in`
    /// is out of range.
    pub fn from_response(response: TokenResponse, issued_at: DateTime<Utc>) -> Self {
        let expires_at = Duration::try_seconds(response.expires_in.max(0))
            .and_then(|lifetime| issued_at.checked_add_signed(lifetime))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self::new(response.access_token, expires_at)
    }

    pub fn expose_secret(&self) -> &str {
        self.secret.expose_secret()
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TokenPolicy {
    /// Refresh once the token is this close to expiry.
    pub refresh_before: Duration,
}

impl Default for TokenPolicy {
    fn default() -> Self {
        Self {
            refresh_before: Duration::seconds(300),
        }
    }
}

impl TokenPolicy {
    pub fn needs_refresh(&self, token: Option<&AppAccessToken>, now: DateTime<Utc>) -> bool {
        match token {
            None => true,
            Some(token) => token
                .expires_at
                .checked_sub_signed(self.refresh_before)
                .map_or(true, |refresh_at| refresh_at <= now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_missing_token_needs_refresh() {
        assert!(TokenPolicy::default().needs_refresh(None, now()));
    }

    #[test]
    fn test_token_inside_refresh_window_is_refreshed() {
        let token = AppAccessToken::new("abc".into(), now() + Duration::seconds(299));
        assert!(TokenPolicy::default().needs_refresh(Some(&token), now()));
    }

    #[test]
    fn test_token_outside_refresh_window_is_kept() {
        let token = AppAccessToken::new("abc".into(), now() + Duration::seconds(301));
        assert!(!TokenPolicy::default().needs_refresh(Some(&token), now()));
    }

    #[test]
    fn test_expired_token_is_refreshed() {
        let token = AppAccessToken::new("abc".into(), now() - Duration::seconds(1));
        assert!(TokenPolicy::default().needs_refresh(Some(&token), now()));
    }

    #[test]
    fn test_custom_window() {
        let policy = TokenPolicy {
            refresh_before: Duration::zero(),
        };
        let token = AppAccessToken::new("abc".into(), now() + Duration::seconds(1));
        assert!(!policy.needs_refresh(Some(&token), now()));
    }

    #[test]
    fn test_out_of_range_lifetime_saturates() {
        let response = TokenResponse {
            access_token: "abc".to_string(),
            expires_in: i64::MAX,
            token_type: "bearer".to_string(),
        };
        let token = AppAccessToken::from_response(response, now());
        assert_eq!(token.expires_at(), DateTime::<Utc>::MAX_UTC);
        assert!(!TokenPolicy::default().needs_refresh(Some(&token), now()));
    }

    #[test]
    fn test_negative_lifetime_expires_immediately() {
        let response = TokenResponse {
            access_token: "abc".to_string(),
            expires_in: -30,
            token_type: "bearer".to_string(),
        };
        let token = AppAccessToken::from_response(response, now());
        assert_eq!(token.expires_at(), now());
        assert!(TokenPolicy::default().needs_refresh(Some(&token), now()));
    }

    #[test]
    fn test_refresh_window_larger_than_timeline_refreshes() {
        let token = AppAccessToken::new("abc".into(), DateTime::<Utc>::MIN_UTC);
        let policy = TokenPolicy {
            refresh_before: Duration::days(1),
        };
        assert!(policy.needs_refresh(Some(&token), now()));
    }

    #[test]
    fn test_from_response_sets_expiry() {
        let response = TokenResponse {
            access_token: "jostpf5q0uzmxmkba9iyug38kjtgh".to_string(),
            expires_in: 5011271,
            token_type: "bearer".to_string(),
        };
        let token = AppAccessToken::from_response(response, now());
        assert_eq!(token.expires_at(), now() + Duration::seconds(5011271));
        assert_eq!(token.expose_secret(), "jostpf5q0uzmxmkba9iyug38kjtgh");
        assert!(!format!("{:?}", token).contains("jostpf5q0uzmxmkba9iyug38kjtgh"));
    }
}
