//! Twitch Helix client.
//!
//! Owns its app access token. Requests retry with exponential backoff on
//! transport errors, HTTP 429 and HTTP 5xx; a 401 drops the token and the
//! request is replayed once with a fresh one.

use std::time::Duration;

use backoff::{backoff::Backoff, ExponentialBackoff};
use chrono::{DateTime, SecondsFormat, Utc};
use common::config::Settings;
use common::types::{HelixClip, HelixGame, HelixPage, HelixStream, HelixUser, TokenResponse};
use redact::Secret;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::token::{AppAccessToken, TokenPolicy};

/// Largest `first` Helix accepts on collection endpoints.
pub const MAX_PAGE_SIZE: usize = 100;
/// Largest number of `id` parameters accepted by `users`.
pub const MAX_IDS_PER_REQUEST: usize = 100;

#[derive(Debug, Error)]
pub enum HelixError {
    #[error("helix request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("helix returned HTTP {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("token request failed with HTTP {status}: {body}")]
    Token { status: StatusCode, body: String },

    #[error("twitch client credentials are not configured")]
    MissingCredentials,
}

/// Optional creation-time window for clip extraction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClipWindow {
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

pub struct HelixClient {
    http: reqwest::Client,
    base_url: String,
    token_url: String,
    client_id: String,
    client_secret: Secret<String>,
    token: Option<AppAccessToken>,
    policy: TokenPolicy,
    max_retry: Duration,
}

impl HelixClient {
    pub fn new(settings: &Settings) -> Result<Self, HelixError> {
        if settings.twitch_client_id.is_empty()
            || settings.twitch_client_secret.expose_secret().is_empty()
        {
            return Err(HelixError::MissingCredentials);
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            base_url: settings.helix_base_url.trim_end_matches('/').to_string(),
            token_url: settings.twitch_token_url.clone(),
            client_id: settings.twitch_client_id.clone(),
            client_secret: settings.twitch_client_secret.clone(),
            token: None,
            policy: TokenPolicy::default(),
            max_retry: Duration::from_secs(settings.helix_max_retry_secs),
        })
    }

    pub fn with_policy(mut self, policy: TokenPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub async fn top_games(&mut self, limit: usize) -> Result<Vec<HelixGame>, HelixError> {
        self.collect("games/top", Vec::new(), limit).await
    }

    /// Live streams, optionally restricted to some categories.
    ///
    /// Category ids are sent in batches of at most 100, and batches are
    /// walked in order until `limit` streams are collected.
    pub async fn streams(
        &mut self,
        limit: usize,
        game_ids: &[String],
    ) -> Result<Vec<HelixStream>, HelixError> {
        if game_ids.is_empty() {
            return self.collect("streams", Vec::new(), limit).await;
        }
        let mut streams = Vec::new();
        for batch in game_ids.chunks(MAX_IDS_PER_REQUEST) {
            if streams.len() >= limit {
                break;
            }
            let query = batch.iter().map(|id| ("game_id", id.clone())).collect();
            let found = self.collect("streams", query, limit - streams.len()).await?;
            streams.extend(found);
        }
        Ok(streams)
    }

    /// Look up accounts by id, batching the request as Helix requires.
    pub async fn users_by_ids(&mut self, ids: &[String]) -> Result<Vec<HelixUser>, HelixError> {
        let mut users = Vec::with_capacity(ids.len());
        for batch in ids.chunks(MAX_IDS_PER_REQUEST) {
            let query: Vec<(&str, String)> = batch.iter().map(|id| ("id", id.clone())).collect();
            let page: HelixPage<HelixUser> = self.get("users", &query).await?;
            users.extend(page.data);
        }
        Ok(users)
    }

    pub async fn clips(
        &mut self,
        game_id: &str,
        limit: usize,
        window: ClipWindow,
    ) -> Result<Vec<HelixClip>, HelixError> {
        let mut query = vec![("game_id", game_id.to_string())];
        if let Some(started_at) = window.started_at {
            query.push((
                "started_at",
                started_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            ));
        }
        if let Some(ended_at) = window.ended_at {
            query.push(("ended_at", ended_at.to_rfc3339_opts(SecondsFormat::Secs, true)));
        }
        self.collect("clips", query, limit).await
    }

    /// Follow `after` cursors until `limit` items are collected or pages run out.
    async fn collect<T: DeserializeOwned>(
        &mut self,
        endpoint: &str,
        query: Vec<(&'static str, String)>,
        limit: usize,
    ) -> Result<Vec<T>, HelixError> {
        let mut items = Vec::new();
        let mut cursor: Option<String> = None;

        while items.len() < limit {
            let mut page_query = query.clone();
            let first = (limit - items.len()).min(MAX_PAGE_SIZE);
            page_query.push(("first", first.to_string()));
            if let Some(after) = &cursor {
                page_query.push(("after", after.clone()));
            }

            let page: HelixPage<T> = self.get(endpoint, &page_query).await?;
            cursor = page.next_cursor().map(str::to_string);
            let fetched = page.data.len();
            items.extend(page.data);
            debug!(endpoint, fetched, total = items.len(), "helix page");

            if fetched == 0 || cursor.is_none() {
                break;
            }
        }

        items.truncate(limit);
        Ok(items)
    }

    async fn get<T: DeserializeOwned>(
        &mut self,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> Result<T, HelixError> {
        let url = format!("{}/{}", self.base_url, endpoint);
        let mut backoff = ExponentialBackoff {
            max_elapsed_time: Some(self.max_retry),
            ..Default::default()
        };
        let mut reauthenticated = false;

        loop {
            let bearer = self.bearer().await?;
            let result = self
                .http
                .get(&url)
                .header("Client-Id", &self.client_id)
                .bearer_auth(bearer)
                .query(query)
                .send()
                .await;

            let err = match result {
                Ok(resp) if resp.status().is_success() => return Ok(resp.json::<T>().await?),
                Ok(resp) if resp.status() == StatusCode::UNAUTHORIZED && !reauthenticated => {
                    warn!(endpoint, "helix rejected the app token, refreshing");
                    self.token = None;
                    reauthenticated = true;
                    continue;
                }
                Ok(resp) => {
                    let status = resp.status();
                    let body = resp.text().await.unwrap_or_default();
                    let err = HelixError::Status { status, body };
                    if !is_retryable(status) {
                        return Err(err);
                    }
                    err
                }
                Err(err) => HelixError::Http(err),
            };

            match backoff.next_backoff() {
                Some(delay) => {
                    warn!(endpoint, error = %err, ?delay, "retrying helix request");
                    tokio::time::sleep(delay).await;
                }
                None => return Err(err),
            }
        }
    }

    async fn bearer(&mut self) -> Result<String, HelixError> {
        let token = match self.token.take() {
            Some(token) if !self.policy.needs_refresh(Some(&token), Utc::now()) => token,
            _ => self.request_token().await?,
        };
        let bearer = token.expose_secret().to_string();
        self.token = Some(token);
        Ok(bearer)
    }

    async fn request_token(&self) -> Result<AppAccessToken, HelixError> {
        let resp = self
            .http
            .post(&self.token_url)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.expose_secret().as_str()),
                ("grant_type", "client_credentials"),
            ])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(HelixError::Token { status, body });
        }

        let token = AppAccessToken::from_response(resp.json::<TokenResponse>().await?, Utc::now());
        info!(expires_at = %token.expires_at(), "obtained app access token");
        Ok(token)
    }
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> Settings {
        Settings {
            database_url: "postgres://localhost/test".to_string(),
            app_env: "test".to_string(),
            api_bind: "127.0.0.1:0".to_string(),
            twitch_client_id: "client".to_string(),
            twitch_client_secret: Secret::new("secret".to_string()),
            helix_base_url: "https://api.twitch.tv/helix/".to_string(),
            twitch_token_url: "https://id.twitch.tv/oauth2/token".to_string(),
            helix_max_retry_secs: 1,
            etl_page_limit: 100,
            report_row_limit: 1000,
        }
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(is_retryable(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable(StatusCode::BAD_GATEWAY));
        assert!(is_retryable(StatusCode::SERVICE_UNAVAILABLE));
        assert!(!is_retryable(StatusCode::BAD_REQUEST));
        assert!(!is_retryable(StatusCode::UNAUTHORIZED));
        assert!(!is_retryable(StatusCode::NOT_FOUND));
    }

    #[test]
    fn test_new_requires_credentials() {
        let mut s = settings();
        s.twitch_client_secret = Secret::new(String::new());
        assert!(matches!(
            HelixClient::new(&s),
            Err(HelixError::MissingCredentials)
        ));

        let mut s = settings();
        s.twitch_client_id = String::new();
        assert!(matches!(
            HelixClient::new(&s),
            Err(HelixError::MissingCredentials)
        ));
    }

    #[test]
    fn test_new_trims_base_url() {
        let client = HelixClient::new(&settings()).unwrap();
        assert_eq!(client.base_url, "https://api.twitch.tv/helix");
        assert!(client.token.is_none());
        assert_eq!(client.max_retry, Duration::from_secs(1));
    }
}
