// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Anthropic-backed session summarization.
//!
//! Sends the session's observations to the Messages API and parses the
//! structured rollup out of the response. Transient statuses (429, 500,
//! 503, 529) and transport failures (connection refused, timeout) are
//! retried with linear backoff up to the configured attempt ceiling;
//! everything else surfaces as a provider error for the pipeline to
//! defer.

use std::time::Duration;

use async_trait::async_trait;
use engram_config::ProviderConfig;
use engram_core::{EngramError, Observation, Summary, SummaryProvider};
use reqwest::header::{HeaderMap, HeaderValue};
use serde::Deserialize;
use tracing::{debug, warn};

const API_BASE_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 1024;

const SYSTEM_PROMPT: &str = "You summarize a coding session from its captured observations. \
     Respond with a single JSON object with exactly these string fields: \
     request, investigated, learned, completed, next_steps, notes. \
     No prose outside the JSON.";

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct SummaryPayload {
    #[serde(default)]
    request: String,
    #[serde(default)]
    investigated: String,
    #[serde(default)]
    learned: String,
    #[serde(default)]
    completed: String,
    #[serde(default)]
    next_steps: String,
    #[serde(default)]
    notes: String,
}

/// [`SummaryProvider`] backed by the Anthropic Messages API.
#[derive(Debug, Clone)]
pub struct AnthropicSummarizer {
    client: reqwest::Client,
    model: String,
    max_attempts: u32,
    backoff_base: Duration,
    base_url: String,
}

impl AnthropicSummarizer {
    pub fn new(config: &ProviderConfig) -> Result<Self, EngramError> {
        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok())
            .ok_or_else(|| EngramError::Config("anthropic provider requires an API key".into()))?;

        let mut headers = HeaderMap::new();
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(&api_key)
                .map_err(|e| EngramError::Config(format!("invalid API key header value: {e}")))?,
        );
        headers.insert("anthropic-version", HeaderValue::from_static(API_VERSION));
        headers.insert("content-type", HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EngramError::Provider {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            model: config.model.clone(),
            max_attempts: config.max_attempts.max(1),
            backoff_base: Duration::from_millis(config.backoff_base_ms),
            base_url: API_BASE_URL.to_string(),
        })
    }

    /// Overrides the base URL (for testing with wiremock).
    #[cfg(test)]
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }

    fn build_body(&self, observations: &[Observation]) -> serde_json::Value {
        let digest: String = observations
            .iter()
            .map(|o| format!("[{}] {}: {}\n", o.kind.as_str(), o.title, o.narrative))
            .collect();
        serde_json::json!({
            "model": self.model,
            "max_tokens": MAX_TOKENS,
            "system": SYSTEM_PROMPT,
            "messages": [{
                "role": "user",
                "content": format!("Observations from this session:\n\n{digest}")
            }]
        })
    }
}

#[async_trait]
impl SummaryProvider for AnthropicSummarizer {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn summarize(
        &self,
        session_id: &str,
        observations: &[Observation],
    ) -> Result<Summary, EngramError> {
        let body = self.build_body(observations);
        let mut last_error = None;

        for attempt in 1..=self.max_attempts {
            if attempt > 1 {
                let delay = self.backoff_base * (attempt - 1);
                warn!(attempt, ?delay, "retrying summary request after transient error");
                tokio::time::sleep(delay).await;
            }

            // Connection refused and timeouts are the canonical transient
            // failures; they get the same retry schedule as a 503.
            let response = match self.client.post(&self.base_url).json(&body).send().await {
                Ok(response) => response,
                Err(e) => {
                    let err = EngramError::TransientIo {
                        source: Box::new(e),
                    };
                    if attempt < self.max_attempts {
                        warn!(attempt, error = %err, "transport error, will retry");
                        last_error = Some(err);
                        continue;
                    }
                    return Err(err);
                }
            };

            let status = response.status();
            debug!(status = %status, attempt, "summary response received");

            if status.is_success() {
                let text = response.text().await.map_err(|e| EngramError::Provider {
                    message: format!("failed to read response body: {e}"),
                    source: Some(Box::new(e)),
                })?;
                let msg: MessageResponse =
                    serde_json::from_str(&text).map_err(|e| EngramError::Provider {
                        message: format!("failed to parse API response: {e}"),
                        source: Some(Box::new(e)),
                    })?;
                let raw = msg
                    .content
                    .first()
                    .map(|b| b.text.as_str())
                    .unwrap_or_default();
                let payload = parse_summary_json(raw)?;
                return Ok(Summary {
                    id: 0,
                    session_id: session_id.to_string(),
                    request: payload.request,
                    investigated: payload.investigated,
                    learned: payload.learned,
                    completed: payload.completed,
                    next_steps: payload.next_steps,
                    notes: payload.notes,
                    created_at: String::new(),
                    created_epoch: 0,
                });
            }

            let body_text = response.text().await.unwrap_or_default();
            if is_transient_error(status) && attempt < self.max_attempts {
                warn!(status = %status, body = %body_text, "transient error, will retry");
                last_error = Some(EngramError::Provider {
                    message: format!("API returned {status}: {body_text}"),
                    source: None,
                });
                continue;
            }

            return Err(EngramError::Provider {
                message: format!("API returned {status}: {body_text}"),
                source: None,
            });
        }

        Err(last_error.unwrap_or_else(|| EngramError::Provider {
            message: "summary request failed after retries".into(),
            source: None,
        }))
    }
}

/// Returns true for HTTP status codes that indicate transient errors worth retrying.
fn is_transient_error(status: reqwest::StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 500 | 503 | 529)
}

/// Parse the summary JSON out of the model's text, tolerating a
/// markdown code fence around it.
fn parse_summary_json(raw: &str) -> Result<SummaryPayload, EngramError> {
    let trimmed = raw.trim();
    let inner = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|s| s.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed);
    serde_json::from_str(inner).map_err(|e| EngramError::Provider {
        message: format!("summary payload is not valid JSON: {e}"),
        source: Some(Box::new(e)),
    })
}
