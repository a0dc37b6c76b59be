//! Chat-completion abstraction and the Gemini implementation.
//!
//! A [`ChatRequest`] is an optional system instruction plus an ordered list
//! of turns; the model's reply is plain text. Query reformulation and answer
//! synthesis both go through [`ChatModel::complete`].

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::ProviderConfig;
use crate::error::{RagError, Result};
use crate::gemini::{model_resource, GeminiClient};
use crate::models::{Role, Turn};

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub system: Option<String>,
    pub messages: Vec<Turn>,
    pub temperature: f32,
}

impl ChatRequest {
    /// A single user message with no system instruction.
    pub fn prompt(text: impl Into<String>, temperature: f32) -> Self {
        Self {
            system: None,
            messages: vec![Turn::human(text)],
            temperature,
        }
    }
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model_name(&self) -> &str;

    async fn complete(&self, request: &ChatRequest) -> Result<String>;
}

/// Chat model backed by Gemini `generateContent`.
pub struct GeminiChat {
    client: GeminiClient,
    model: String,
}

impl GeminiChat {
    pub fn new(client: GeminiClient, config: &ProviderConfig) -> Self {
        Self {
            client,
            model: model_resource(&config.chat_model),
        }
    }
}

#[async_trait]
impl ChatModel for GeminiChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &ChatRequest) -> Result<String> {
        let body = request_body(request);
        let reply = self
            .client
            .post(&self.model, "generateContent", &body)
            .await?;
        parse_reply(&reply)
    }
}

fn request_body(request: &ChatRequest) -> Value {
    let contents: Vec<Value> = request
        .messages
        .iter()
        .map(|turn| {
            let role = match turn.role {
                Role::Human => "user",
                Role::Assistant => "model",
            };
            json!({ "role": role, "parts": [{ "text": turn.content }] })
        })
        .collect();

    let mut body = json!({
        "contents": contents,
        "generationConfig": { "temperature": request.temperature },
    });
    if let Some(system) = &request.system {
        body["systemInstruction"] = json!({ "parts": [{ "text": system }] });
    }
    body
}

/// Concatenate the text parts of the first candidate.
fn parse_reply(json: &Value) -> Result<String> {
    let candidate = json
        .get("candidates")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first());

    let Some(candidate) = candidate else {
        let reason = json
            .pointer("/promptFeedback/blockReason")
            .and_then(|r| r.as_str())
            .unwrap_or("no candidates returned");
        return Err(RagError::Provider(format!("generation blocked: {}", reason)));
    };

    let parts = candidate
        .pointer("/content/parts")
        .and_then(|p| p.as_array())
        .ok_or_else(|| {
            let reason = candidate
                .get("finishReason")
                .and_then(|r| r.as_str())
                .unwrap_or("missing content");
            RagError::Provider(format!("empty generation: {}", reason))
        })?;

    Ok(parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect::<Vec<_>>()
        .concat())
}
