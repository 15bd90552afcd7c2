//! Text generation providers.
//!
//! [`ChatGenerator`] talks to any OpenAI-compatible chat completions API
//! (OpenAI, Ollama's `/v1`, LM Studio, vLLM). [`DisabledGenerator`] is used
//! when `generation.provider = "disabled"`; callers fall back to a fixed
//! message whenever generation fails.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub use kbroute_core::generation::Generator;
use kbroute_core::error::GenerationError;

use crate::config::GenerationConfig;

/// A generator that always fails with [`GenerationError::Disabled`].
pub struct DisabledGenerator;

#[async_trait]
impl Generator for DisabledGenerator {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn generate(&self, _prompt: &str) -> Result<String, GenerationError> {
        Err(GenerationError::Disabled)
    }
}

#[derive(Debug, Clone, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

/// Chat completions client for OpenAI-compatible endpoints.
pub struct ChatGenerator {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    temperature: f32,
    max_tokens: u32,
}

impl ChatGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.is_empty());

        Ok(Self {
            client,
            endpoint: chat_endpoint(&config.url),
            model: config.model.clone(),
            api_key,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }
}

/// Resolve the chat completions endpoint from a base URL.
fn chat_endpoint(base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    if base.ends_with("/chat/completions") {
        base.to_string()
    } else if base.ends_with("/v1") {
        format!("{}/chat/completions", base)
    } else {
        format!("{}/v1/chat/completions", base)
    }
}

/// Extract `choices[0].message.content` from a chat completions response.
fn parse_chat_response(json: &serde_json::Value) -> Result<String, GenerationError> {
    json["choices"]
        .get(0)
        .and_then(|c| c["message"]["content"].as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| GenerationError::InvalidResponse("missing choices[0].message.content".into()))
}

#[async_trait]
impl Generator for ChatGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let messages = [Message {
            role: "user",
            content: prompt,
        }];
        let body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        });

        let mut req = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            req = req.header("Authorization", format!("Bearer {}", key));
        }

        debug!(model = %self.model, prompt_chars = prompt.len(), "sending chat completion");
        let resp = req
            .send()
            .await
            .map_err(|e| GenerationError::Request(e.to_string()))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| GenerationError::Request(e.to_string()))?;
        if !status.is_success() {
            return Err(GenerationError::Request(format!("HTTP {}: {}", status, text)));
        }

        let json: serde_json::Value = serde_json::from_str(&text)
            .map_err(|e| GenerationError::InvalidResponse(e.to_string()))?;
        parse_chat_response(&json)
    }
}

/// Create the configured [`Generator`].
pub fn create_generator(config: &GenerationConfig) -> Result<Arc<dyn Generator>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledGenerator)),
        "openai" => Ok(Arc::new(ChatGenerator::new(config)?)),
        other => bail!("Unknown generation provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_endpoint_resolution() {
        assert_eq!(
            chat_endpoint("https://api.openai.com/v1"),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(
            chat_endpoint("http://localhost:11434/"),
            "http://localhost:11434/v1/chat/completions"
        );
        assert_eq!(
            chat_endpoint("http://host/v1/chat/completions"),
            "http://host/v1/chat/completions"
        );
    }

    #[test]
    fn test_parse_chat_response() {
        let ok = serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": "contabilidade"}}]
        });
        assert_eq!(parse_chat_response(&ok).unwrap(), "contabilidade");

        let empty = serde_json::json!({"choices": []});
        assert!(matches!(
            parse_chat_response(&empty),
            Err(GenerationError::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_disabled_generator_fails() {
        let g = create_generator(&GenerationConfig::default()).unwrap();
        assert!(matches!(
            g.generate("hi").await,
            Err(GenerationError::Disabled)
        ));
    }
}
