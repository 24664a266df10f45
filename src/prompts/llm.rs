//! External remediation-hint client.
//!
//! Talks to an OpenAI-compatible chat-completions endpoint. One request per
//! page batch: system instruction plus the defect batch as user content,
//! expecting a JSON array of strings back, one hint per defect in order.
//! The response is scanned for the first top-level array, so surrounding
//! prose or code fences do not break parsing.

use crate::config;
use anyhow::{Context, Result};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

pub struct LlmClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl LlmClient {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>, model: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_default();
        Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into(),
            model: model.into(),
        }
    }

    /// Build a client from the environment. `None` when no API key is set,
    /// which disables the external tier entirely.
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var(config::LLM_API_KEY_ENV)
            .ok()
            .filter(|k| !k.trim().is_empty())?;
        let base_url = std::env::var(config::LLM_BASE_URL_ENV)
            .ok()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let model = std::env::var(config::LLM_MODEL_ENV)
            .ok()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        Some(Self::new(api_key, base_url, model))
    }

    /// One chat turn; returns exactly `expected` hints or an error.
    pub async fn generate_batch(
        &self,
        system: &str,
        user: &str,
        expected: usize,
    ) -> Result<Vec<String>> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
            "temperature": 0.2,
        });

        let response: Value = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("LLM request failed")?
            .error_for_status()
            .context("LLM returned an error status")?
            .json()
            .await
            .context("LLM response body is not JSON")?;

        let content = response["choices"][0]["message"]["content"]
            .as_str()
            .context("LLM response has no message content")?;
        debug!("LLM returned {} chars for a batch of {expected}", content.len());

        let hints = extract_string_array(content)
            .context("LLM response contains no JSON array of strings")?;
        anyhow::ensure!(
            hints.len() == expected,
            "expected {expected} hints, got {}",
            hints.len()
        );
        Ok(hints)
    }
}

/// Extract the first top-level JSON array of strings from free-form text.
///
/// Models wrap output in fences or prose; scanning for a parseable array
/// prefix is more robust than trusting the whole body.
pub fn extract_string_array(content: &str) -> Option<Vec<String>> {
    for (idx, ch) in content.char_indices() {
        if ch != '[' {
            continue;
        }
        let candidate = &content[idx..];
        let mut stream = serde_json::Deserializer::from_str(candidate).into_iter::<Value>();
        if let Some(Ok(Value::Array(items))) = stream.next() {
            let strings: Option<Vec<String>> = items
                .into_iter()
                .map(|item| match item {
                    Value::String(s) => Some(s),
                    _ => None,
                })
                .collect();
            if let Some(strings) = strings {
                return Some(strings);
            }
        }
    }
    None
}
