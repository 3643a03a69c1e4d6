//! Minimal client for an OpenAI-compatible chat completions endpoint.
//!
//! Shared by the live classifier and the live synthesizer. Groq serves this
//! API at `https://api.groq.com/openai/v1`.

use std::time::Duration;

use anyhow::Result;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::config::LlmConfig;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("LLM API error {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed LLM response: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system",
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user",
            content: content.into(),
        }
    }
}

/// The assistant's reply and the total tokens billed, when reported.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatCompletion {
    pub content: String,
    pub total_tokens: Option<u32>,
}

pub struct ChatClient {
    endpoint: String,
    api_key: String,
    client: reqwest::Client,
}

impl ChatClient {
    pub fn new(config: &LlmConfig, api_key: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key: api_key.to_string(),
            client,
        })
    }

    pub async fn complete(
        &self,
        model: &str,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: u32,
    ) -> Result<ChatCompletion, LlmError> {
        let body = serde_json::json!({
            "model": model,
            "messages": messages,
            "temperature": temperature,
            "max_tokens": max_tokens,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let json: Value = response.json().await?;
        parse_completion(&json)
    }
}

fn parse_completion(json: &Value) -> Result<ChatCompletion, LlmError> {
    let content = json
        .pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .ok_or_else(|| LlmError::Malformed("missing choices[0].message.content".into()))?;
    let total_tokens = json
        .pointer("/usage/total_tokens")
        .and_then(|t| t.as_u64())
        .map(|t| t.min(u32::MAX as u64) as u32);
    Ok(ChatCompletion {
        content: content.to_string(),
        total_tokens,
    })
}
