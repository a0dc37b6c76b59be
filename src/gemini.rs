//! Shared HTTP client for the Gemini REST API.
//!
//! Both the embedder and the chat model POST JSON to
//! `{api_base}/{resource}:{method}` with the key in the `x-goog-api-key`
//! header. This module owns that call and its retry policy:
//!
//! - HTTP 429 and 5xx: retry with exponential backoff (1s, 2s, 4s, ... capped at 32s)
//! - Other 4xx: fail immediately
//! - Network errors: retry
//!
//! `max_retries` defaults to 0, so each request is attempted once unless
//! configured otherwise.

use std::time::Duration;

use serde_json::Value;

use crate::config::ProviderConfig;
use crate::error::{RagError, Result};

/// Environment variable holding the API key.
pub const API_KEY_ENV: &str = "GOOGLE_API_KEY";

#[derive(Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
    max_retries: u32,
}

impl GeminiClient {
    /// Build a client from config, reading the key from `GOOGLE_API_KEY`.
    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        let api_key = std::env::var(API_KEY_ENV)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                RagError::Provider(format!("{} environment variable not set", API_KEY_ENV))
            })?;
        Self::new(config, api_key)
    }

    pub fn new(config: &ProviderConfig, api_key: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            max_retries: config.max_retries,
        })
    }

    /// POST `body` to `{api_base}/{resource}:{method}` and return the JSON reply.
    pub async fn post(&self, resource: &str, method: &str, body: &Value) -> Result<Value> {
        let url = format!("{}/{}:{}", self.api_base, resource, method);
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tracing::debug!(attempt, ?delay, %url, "retrying provider request");
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .http
                .post(&url)
                .header("x-goog-api-key", &self.api_key)
                .json(body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response.json().await?);
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    let err = RagError::Provider(format!(
                        "{} {}: {}",
                        method,
                        status,
                        error_message(&body_text)
                    ));
                    if status.as_u16() == 429 || status.is_server_error() {
                        tracing::warn!(%status, %url, "provider request failed, retryable");
                        last_err = Some(err);
                        continue;
                    }
                    return Err(err);
                }
                Err(e) => {
                    tracing::warn!(error = %e, %url, "provider request failed");
                    last_err = Some(e.into());
                }
            }
        }

        Err(last_err.unwrap_or_else(|| RagError::Provider("request failed after retries".into())))
    }
}

/// Pull `error.message` out of a Gemini error body, falling back to the raw text.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string())
}

/// Prefix a bare model name with `models/`.
pub fn model_resource(model: &str) -> String {
    if model.starts_with("models/") || model.starts_with("tunedModels/") {
        model.to_string()
    } else {
        format!("models/{}", model)
    }
}
