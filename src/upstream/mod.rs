//! Typed client for the upstream IPTV management service
//!
//! Thin wrapper over the upstream's HTTP/JSON API: bearer-token lifecycle,
//! pagination, bounded timeouts and retry-with-backoff for transient
//! failures. Every failure is classified once here into [`UpstreamError`];
//! nothing above this layer inspects HTTP status codes.

use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use url::Url;

use crate::config::UpstreamConfig;
use crate::errors::UpstreamError;
use crate::models::{Channel, ChannelGroup, M3uAccount, ProxySessions, Stream};
use crate::utils::jitter::generate_jitter_ms;
use crate::utils::obfuscate_credentials;

const BACKOFF_BASE_MS: u64 = 500;

/// Optional server-side filter for stream listing
#[derive(Debug, Clone, Default)]
pub struct StreamFilter {
    pub is_custom: Option<bool>,
    pub m3u_account: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct Page<T> {
    count: u64,
    results: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access: String,
}

pub struct UpstreamClient {
    http: reqwest::Client,
    base_url: Url,
    username: String,
    password: String,
    retry_attempts: u32,
    page_size: u32,
    token: RwLock<Option<String>>,
}

impl UpstreamClient {
    pub fn new(config: &UpstreamConfig) -> Result<Self, UpstreamError> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| UpstreamError::permanent(format!("invalid base URL: {e}")))?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()
            .map_err(|e| UpstreamError::permanent(format!("HTTP client construction: {e}")))?;
        Ok(Self {
            http,
            base_url,
            username: config.username.clone(),
            password: config.password.clone(),
            retry_attempts: config.retry_attempts.max(1),
            page_size: config.page_size.max(1),
            token: RwLock::new(None),
        })
    }

    /// Connectivity test
    pub async fn ping(&self) -> Result<(), UpstreamError> {
        self.request_json::<serde_json::Value>(Method::GET, "api/core/ping/", None)
            .await
            .map(|_| ())
    }

    pub async fn list_m3u_accounts(&self) -> Result<Vec<M3uAccount>, UpstreamError> {
        let mut accounts: Vec<M3uAccount> = self
            .request_json(Method::GET, "api/m3u/accounts/", None)
            .await?;
        // The upstream nests profiles without repeating the account id
        for account in &mut accounts {
            for profile in &mut account.profiles {
                profile.account_id = account.id;
            }
        }
        Ok(accounts)
    }

    /// Ask the upstream to re-ingest one M3U account's playlist
    pub async fn refresh_m3u_account(&self, account_id: i64) -> Result<(), UpstreamError> {
        self.request_json::<serde_json::Value>(
            Method::POST,
            &format!("api/m3u/refresh/{account_id}/"),
            Some(json!({})),
        )
        .await
        .map(|_| ())
    }

    /// List streams, preferring server-side filtering; scans pages otherwise
    pub async fn list_streams(
        &self,
        filter: Option<&StreamFilter>,
    ) -> Result<Vec<Stream>, UpstreamError> {
        let mut collected = Vec::new();
        let mut page = 1u32;
        loop {
            let mut path = format!(
                "api/channels/streams/?page={page}&page_size={}",
                self.page_size
            );
            if let Some(filter) = filter {
                if let Some(is_custom) = filter.is_custom {
                    path.push_str(&format!("&is_custom={is_custom}"));
                }
                if let Some(account) = filter.m3u_account {
                    path.push_str(&format!("&m3u_account={account}"));
                }
            }
            let batch: Page<Stream> = self.request_json(Method::GET, &path, None).await?;
            let total = batch.count;
            let received = batch.results.len();
            collected.extend(batch.results);
            if received == 0 || collected.len() as u64 >= total {
                break;
            }
            page += 1;
        }
        Ok(collected)
    }

    pub async fn list_channels(&self) -> Result<Vec<Channel>, UpstreamError> {
        self.request_json(Method::GET, "api/channels/channels/", None)
            .await
    }

    /// Replace a channel's ordered stream membership
    pub async fn update_channel_streams(
        &self,
        channel_id: i64,
        stream_ids: &[i64],
    ) -> Result<(), UpstreamError> {
        self.request_json::<serde_json::Value>(
            Method::PATCH,
            &format!("api/channels/channels/{channel_id}/"),
            Some(json!({ "streams": stream_ids })),
        )
        .await
        .map(|_| ())
    }

    /// Rename a stream; used to add or strip the dead marker prefix
    pub async fn update_stream_name(
        &self,
        stream_id: i64,
        name: &str,
    ) -> Result<(), UpstreamError> {
        self.request_json::<serde_json::Value>(
            Method::PATCH,
            &format!("api/channels/streams/{stream_id}/"),
            Some(json!({ "name": name })),
        )
        .await
        .map(|_| ())
    }

    pub async fn list_channel_groups(&self) -> Result<Vec<ChannelGroup>, UpstreamError> {
        self.request_json(Method::GET, "api/channels/groups/", None)
            .await
    }

    /// Fetch the live proxy session view; only the structured shape is
    /// accepted
    pub async fn proxy_sessions(&self) -> Result<ProxySessions, UpstreamError> {
        let raw: serde_json::Value = self
            .request_json(Method::GET, "proxy/ts/status", None)
            .await?;
        parse_proxy_sessions(raw)
    }

    async fn authenticate(&self) -> Result<(), UpstreamError> {
        let url = self.endpoint("api/accounts/token/")?;
        let response = self
            .http
            .post(url)
            .json(&json!({ "username": self.username, "password": self.password }))
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(UpstreamError::AuthFailed {
                message: "credentials rejected".to_string(),
            });
        }
        if !response.status().is_success() {
            return Err(classify_status(response.status(), "api/accounts/token/"));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| UpstreamError::permanent(format!("token response: {e}")))?;
        *self.token.write().await = Some(token.access);
        debug!("Upstream token refreshed");
        Ok(())
    }

    /// Issue a request with token injection and transient-failure retry
    async fn request_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<T, UpstreamError> {
        let mut attempt = 0u32;
        loop {
            match self.request_once(method.clone(), path, body.as_ref()).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt + 1 < self.retry_attempts => {
                    let backoff = BACKOFF_BASE_MS * (1 << attempt.min(6))
                        + generate_jitter_ms(BACKOFF_BASE_MS);
                    warn!(
                        "Transient upstream failure on {} (attempt {}/{}), retrying in {}ms: {}",
                        path,
                        attempt + 1,
                        self.retry_attempts,
                        backoff,
                        e
                    );
                    tokio::time::sleep(Duration::from_millis(backoff)).await;
                    attempt += 1;
                }
                Err(e) if e.is_transient() => {
                    return Err(UpstreamError::permanent(format!(
                        "{path}: retries exhausted: {e}"
                    )));
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn request_once<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<T, UpstreamError> {
        if self.token.read().await.is_none() {
            self.authenticate().await?;
        }

        let mut response = self.send(method.clone(), path, body).await?;

        // One transparent token refresh on rejection
        if response.status() == StatusCode::UNAUTHORIZED {
            debug!("Upstream rejected token on {path}, re-authenticating");
            self.authenticate().await?;
            response = self.send(method, path, body).await?;
            if response.status() == StatusCode::UNAUTHORIZED {
                return Err(UpstreamError::permanent(
                    "authentication failed after token refresh",
                ));
            }
        }

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(status, path));
        }

        response
            .json()
            .await
            .map_err(|e| UpstreamError::permanent(format!("{path}: response body: {e}")))
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<reqwest::Response, UpstreamError> {
        let url = self.endpoint(path)?;
        debug!("Upstream {} {}", method, obfuscate_credentials(url.as_str()));
        let mut request = self.http.request(method, url);
        if let Some(token) = self.token.read().await.as_deref() {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        request.send().await.map_err(classify_reqwest_error)
    }

    fn endpoint(&self, path: &str) -> Result<Url, UpstreamError> {
        self.base_url
            .join(path)
            .map_err(|e| UpstreamError::permanent(format!("invalid path {path}: {e}")))
    }
}

/// Interpret the proxy session payload, rejecting legacy shapes
fn parse_proxy_sessions(raw: serde_json::Value) -> Result<ProxySessions, UpstreamError> {
    if !raw.is_object() || raw.get("channels").is_none() {
        return Err(UpstreamError::permanent(
            "proxy session payload is not the structured form",
        ));
    }
    serde_json::from_value(raw)
        .map_err(|e| UpstreamError::permanent(format!("proxy session payload: {e}")))
}

fn classify_status(status: StatusCode, path: &str) -> UpstreamError {
    match status {
        StatusCode::NOT_FOUND => UpstreamError::NotFound {
            url: path.to_string(),
        },
        StatusCode::CONFLICT => UpstreamError::Conflict {
            message: format!("{path}: upstream reported a conflict"),
        },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => UpstreamError::AuthFailed {
            message: format!("{path}: {status}"),
        },
        s if s.is_server_error() => UpstreamError::transient(format!("{path}: {s}")),
        s => UpstreamError::permanent(format!("{path}: {s}")),
    }
}

fn classify_reqwest_error(e: reqwest::Error) -> UpstreamError {
    if e.is_timeout() || e.is_connect() {
        UpstreamError::transient(e.to_string())
    } else {
        UpstreamError::permanent(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn structured_proxy_sessions_parse() {
        let payload = json!({
            "channels": [
                {"channel_id": 3, "state": "active", "m3u_profile_id": 9, "client_count": 2},
                {"channel_id": 4, "state": "buffering", "m3u_profile_id": null, "client_count": 0}
            ],
            "count": 2
        });
        let sessions = parse_proxy_sessions(payload).unwrap();
        assert_eq!(sessions.channels.len(), 2);
        assert_eq!(sessions.channels[0].m3u_profile_id, Some(9));
    }

    #[test]
    fn legacy_proxy_session_shapes_are_rejected() {
        assert!(parse_proxy_sessions(json!([{"channel_id": 1}])).is_err());
        assert!(parse_proxy_sessions(json!({"sessions": []})).is_err());
    }

    #[test]
    fn status_classification() {
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY, "x"),
            UpstreamError::Transient { .. }
        ));
        assert!(matches!(
            classify_status(StatusCode::NOT_FOUND, "x"),
            UpstreamError::NotFound { .. }
        ));
        assert!(matches!(
            classify_status(StatusCode::CONFLICT, "x"),
            UpstreamError::Conflict { .. }
        ));
        assert!(matches!(
            classify_status(StatusCode::UNPROCESSABLE_ENTITY, "x"),
            UpstreamError::Permanent { .. }
        ));
    }
}
