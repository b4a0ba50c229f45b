//! Client for the remote semantic-search endpoint.
//!
//! `request` answers `Ok(None)` when the endpoint is absent or refuses us
//! (401/403/404): the tier is unavailable, which is not an error. Transient
//! failures (5xx, 429, transport errors, timeouts) are retried per
//! [`RetryPolicy`]; anything left over is returned as an error for the caller
//! to degrade on.

pub mod retry;

use std::time::Duration;

use reqwest::StatusCode;
use serde_json::{json, Value};
use url::Url;

use crate::config::RemoteConfig;
use crate::semantic::preprocess::{preview, title_from_path};
use crate::types::RankedResult;
pub use retry::{with_retries, AttemptTimedOut, RetryPolicy};

#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {0}")]
    Status(StatusCode),

    #[error("attempt timed out after {}ms", .0.as_millis())]
    TimedOut(Duration),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
}

impl From<AttemptTimedOut> for RemoteError {
    fn from(value: AttemptTimedOut) -> Self {
        RemoteError::TimedOut(value.0)
    }
}

impl RemoteError {
    pub fn is_retryable(&self) -> bool {
        match self {
            RemoteError::Status(status) => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            RemoteError::Http(e) => !e.is_builder() && !e.is_decode(),
            RemoteError::TimedOut(_) => true,
            RemoteError::InvalidResponse(_) | RemoteError::Url(_) => false,
        }
    }
}

fn is_unavailable(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND
    )
}

pub struct RemoteSearchClient {
    client: reqwest::Client,
    endpoint: Url,
    api_key: Option<String>,
    policy: RetryPolicy,
}

impl RemoteSearchClient {
    pub fn new(config: &RemoteConfig) -> Result<Self, RemoteError> {
        let endpoint = Url::parse(&format!(
            "{}{}",
            config.base_url.trim_end_matches('/'),
            config.path
        ))?;

        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()?;

        Ok(Self {
            client,
            endpoint,
            api_key: config.resolved_api_key(),
            policy: config.retry_policy(),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Ask the remote endpoint for notes matching `query`.
    pub async fn request(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Option<Vec<RankedResult>>, RemoteError> {
        let body = json!({
            "query": query,
            "filter": { "limit": limit },
        });
        let body = &body;

        with_retries(
            self.policy,
            "remote search",
            move |attempt| {
                log::debug!("tier=remote attempt={attempt}/{}", self.policy.attempts);
                self.attempt(body)
            },
            RemoteError::is_retryable,
        )
        .await
    }

    async fn attempt(&self, body: &Value) -> Result<Option<Vec<RankedResult>>, RemoteError> {
        let mut request = self.client.post(self.endpoint.clone()).json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();

        if is_unavailable(status) {
            log::debug!("tier=remote outcome=unavailable status={}", status.as_u16());
            return Ok(None);
        }
        if !status.is_success() {
            return Err(RemoteError::Status(status));
        }

        let text = response.text().await?;
        let value: Value = serde_json::from_str(&text).map_err(|err| {
            log::error!("{err}. tried to parse: {text:?}");
            RemoteError::InvalidResponse(err.to_string())
        })?;

        parse_hits(&value).map(Some)
    }
}

/// Accepts `{"results": [...]}` or a bare array. Items without a usable path
/// are dropped.
pub fn parse_hits(body: &Value) -> Result<Vec<RankedResult>, RemoteError> {
    let items = match body {
        Value::Array(items) => items,
        Value::Object(map) => map
            .get("results")
            .and_then(Value::as_array)
            .ok_or_else(|| RemoteError::InvalidResponse("missing results array".to_string()))?,
        _ => {
            return Err(RemoteError::InvalidResponse(
                "expected an object or array".to_string(),
            ))
        }
    };

    let hits = items
        .iter()
        .filter_map(|item| {
            let path = item
                .get("path")
                .or_else(|| item.get("filename"))
                .and_then(Value::as_str)
                .filter(|p| !p.trim().is_empty())?;

            let score = item.get("score").and_then(Value::as_f64).unwrap_or(0.0) as f32;
            let snippet = item
                .get("preview")
                .or_else(|| item.get("text"))
                .and_then(Value::as_str)
                .and_then(preview);
            let title = item
                .get("title")
                .and_then(Value::as_str)
                .map(str::to_string)
                .or_else(|| title_from_path(path));

            Some(RankedResult {
                path: path.to_string(),
                score,
                title,
                preview: snippet,
            })
        })
        .collect();

    Ok(hits)
}
