//! Chat-completions HTTP client.

use std::time::Duration;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use switchboard_types::AgentError;

use crate::retry::RetryConfig;
use crate::wire::{ChatRequest, ChatResponse};

/// Default bound on a single model request.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Client for an OpenAI-compatible `/v1/chat/completions` endpoint.
#[derive(Clone)]
pub struct ChatClient {
    http: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    retry_config: RetryConfig,
}

impl ChatClient {
    /// Create a client for `base_url` (e.g. `http://localhost:11434`).
    pub fn new(base_url: impl Into<String>) -> Result<Self, AgentError> {
        Self::with_timeout(base_url, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Create a client whose requests are each bounded by `timeout`.
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self, AgentError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AgentError::Network(e.to_string()))?;

        Ok(Self {
            http,
            api_key: None,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            retry_config: RetryConfig::default(),
        })
    }

    /// Send `Authorization: Bearer <key>` with every request.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Set the retry configuration for transient errors (429, 5xx, network).
    pub fn with_retry_config(mut self, config: RetryConfig) -> Self {
        self.retry_config = config;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn headers(&self) -> Result<HeaderMap, AgentError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = &self.api_key {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {key}"))
                    .map_err(|_| AgentError::Invocation("Invalid API key format".into()))?,
            );
        }
        Ok(headers)
    }

    /// Send one non-streaming completion request, retrying transient failures.
    pub(crate) async fn complete(&self, request: &ChatRequest<'_>) -> Result<ChatResponse, AgentError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let headers = self.headers()?;
        let body = serde_json::to_string(request)
            .map_err(|e| AgentError::Invocation(format!("Failed to serialize request: {e}")))?;

        let mut attempt = 0;
        loop {
            tracing::debug!(
                "POST {url} (attempt {}/{})",
                attempt + 1,
                self.retry_config.max_attempts
            );

            let (err, retry_after) = match self
                .http
                .post(&url)
                .headers(headers.clone())
                .body(body.clone())
                .send()
                .await
            {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let text = response
                            .text()
                            .await
                            .map_err(|e| AgentError::Network(e.to_string()))?;
                        return serde_json::from_str(&text).map_err(|e| {
                            AgentError::InvalidResponse(format!("Failed to parse completion: {e}"))
                        });
                    }

                    let retry_after = parse_retry_after(response.headers());
                    let body_text = response.text().await.unwrap_or_default();
                    (classify_error(status.as_u16(), &body_text), retry_after)
                }
                Err(e) if e.is_timeout() => (AgentError::Timeout, None),
                Err(e) => (AgentError::Network(e.to_string()), None),
            };

            if !self.retry_config.should_retry(attempt, &err) {
                return Err(err);
            }

            let delay = self.retry_config.delay(attempt, retry_after);
            tracing::warn!(
                "Retryable model error (attempt {}/{}): {err}. Retrying in {}ms...",
                attempt + 1,
                self.retry_config.max_attempts,
                delay.as_millis(),
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

/// `Retry-After` given in (possibly fractional) seconds.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<f64>().ok())
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
}

/// Turn an HTTP error response into an [`AgentError::Http`].
///
/// Accepts both `{"error": {"message": "..."}}` and `{"error": "..."}`
/// bodies; anything else is passed through verbatim.
fn classify_error(status: u16, body: &str) -> AgentError {
    #[derive(serde::Deserialize)]
    struct ErrorBody {
        error: Option<ErrorDetail>,
    }
    #[derive(serde::Deserialize)]
    #[serde(untagged)]
    enum ErrorDetail {
        Structured { message: Option<String> },
        Plain(String),
    }

    let message = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.error)
        .and_then(|e| match e {
            ErrorDetail::Structured { message } => message,
            ErrorDetail::Plain(message) => Some(message),
        })
        .unwrap_or_else(|| body.to_string());

    AgentError::Http { status, message }
}
