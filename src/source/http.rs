//! Shared HTTP transport for source adapters
//!
//! Each request walks an ordered mirror list. Rate limits and server errors
//! are retried on the same mirror with exponential backoff; anything else,
//! timeouts and refused connections included, moves straight on to the next
//! mirror.

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

use super::FetchError;

const USER_AGENT: &str = concat!("termflix/", env!("CARGO_PKG_VERSION"));

/// Longest computed backoff; a server-sent Retry-After is honored as is
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// JSON client with mirror fallback
#[derive(Debug, Clone)]
pub struct MirrorClient {
    client: reqwest::Client,
    mirrors: Vec<String>,
    max_retries: u32,
    retry_delay: Duration,
}

impl MirrorClient {
    pub fn new(mirrors: Vec<String>, timeout: Duration, max_retries: u32) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .user_agent(USER_AGENT)
                .build()
                .unwrap_or_default(),
            mirrors: mirrors
                .into_iter()
                .map(|m| m.trim_end_matches('/').to_string())
                .collect(),
            max_retries,
            retry_delay: Duration::from_secs(1),
        }
    }

    /// Base delay for backoff (doubles per attempt)
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn mirrors(&self) -> &[String] {
        &self.mirrors
    }

    /// GET `path` (including query string) and decode JSON
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, FetchError> {
        let mut last_error = FetchError::AllMirrorsFailed("no mirrors configured".into());

        for mirror in &self.mirrors {
            let url = format!("{}{}", mirror, path);
            match self.get_with_retry(&url).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    debug!(url = %url, error = %e, "Mirror failed");
                    last_error = e;
                }
            }
        }

        Err(match last_error {
            e @ FetchError::AllMirrorsFailed(_) => e,
            e => FetchError::AllMirrorsFailed(e.to_string()),
        })
    }

    async fn get_with_retry<T: DeserializeOwned>(&self, url: &str) -> Result<T, FetchError> {
        let mut retries = 0;

        loop {
            let outcome = self
                .client
                .get(url)
                .header("Accept", "application/json")
                .send()
                .await;

            let response = outcome?;

            match response.status() {
                StatusCode::OK => {
                    let body = response.text().await?;
                    return serde_json::from_str(&body).map_err(|e| {
                        FetchError::InvalidResponse(format!("JSON parse error: {}", e))
                    });
                }
                StatusCode::TOO_MANY_REQUESTS => {
                    if retries >= self.max_retries {
                        return Err(FetchError::RateLimited);
                    }
                    retries += 1;

                    let retry_after = response
                        .headers()
                        .get("Retry-After")
                        .and_then(|v| v.to_str().ok())
                        .and_then(|s| s.parse::<u64>().ok())
                        .map(Duration::from_secs);
                    self.backoff(retries, retry_after).await;
                }
                status if status.is_server_error() => {
                    if retries >= self.max_retries {
                        return Err(FetchError::ServerError(status.as_u16()));
                    }
                    retries += 1;
                    self.backoff(retries, None).await;
                }
                status => return Err(FetchError::ServerError(status.as_u16())),
            }
        }
    }

    async fn backoff(&self, attempt: u32, retry_after: Option<Duration>) {
        let wait = retry_after.unwrap_or_else(|| {
            let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
            self.retry_delay.saturating_mul(factor).min(MAX_BACKOFF)
        });
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
    }
}

/// Numbers that some APIs send as strings ("42") and others as JSON numbers
pub fn lenient_u64(value: &serde_json::Value) -> u64 {
    match value {
        serde_json::Value::Number(n) => n.as_u64().unwrap_or(0),
        serde_json::Value::String(s) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

/// String form of an id that may arrive as a number or a string
pub fn lenient_str(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}
