//! Async HTTP client for hosted LLM APIs
//!
//! Model-agnostic: Anthropic and OpenAI-compatible endpoints (DeepSeek,
//! local servers) are both supported, selected from the URL. The client
//! only turns command output into text; it never chooses actions.

use crate::core::config::LlmConfig;
use crate::core::error::{ReconError, Result};
use crate::llm::engine::LlmEngine;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// System prompt sent with every request
const SYSTEM_PROMPT: &str = "You convert raw penetration-testing tool output into compact JSON. \
Answer with a single line of JSON and nothing else.";

/// Wire format of the configured endpoint
#[derive(Debug, Clone, PartialEq)]
pub enum ApiFormat {
    Anthropic,
    OpenAI,
}

pub struct LlmClient {
    client: Client,
    api_key: String,
    api_url: String,
    model: String,
    api_format: ApiFormat,
    max_tokens: u32,
}

impl LlmClient {
    pub fn new(api_key: String, api_url: String, model: String) -> Self {
        let api_format = Self::detect_api_format(&api_url);
        Self {
            client: Client::new(),
            api_key,
            api_url,
            model,
            api_format,
            max_tokens: 4096,
        }
    }

    fn detect_api_format(url: &str) -> ApiFormat {
        if url.contains("anthropic.com") {
            ApiFormat::Anthropic
        } else {
            ApiFormat::OpenAI
        }
    }

    /// Build from config; the API key comes from the environment variable
    /// the config names
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| ReconError::LlmError(format!("{} not set", config.api_key_env)))?;
        Ok(Self::new(api_key, config.api_url.clone(), config.model.clone()))
    }

    pub fn api_format(&self) -> &ApiFormat {
        &self.api_format
    }

    pub async fn complete(&self, system: &str, user: &str) -> Result<String> {
        match self.api_format {
            ApiFormat::Anthropic => self.complete_anthropic(system, user).await,
            ApiFormat::OpenAI => self.complete_openai(system, user).await,
        }
    }

    async fn complete_anthropic(&self, system: &str, user: &str) -> Result<String> {
        let body = AnthropicRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            system,
            messages: vec![Message { role: "user", content: user }],
        };
        let request = self
            .client
            .post(&self.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&body);

        let reply: AnthropicResponse = send(request).await?;
        reply
            .content
            .into_iter()
            .map(|block| block.text)
            .next()
            .ok_or_else(|| ReconError::LlmError("reply had no content blocks".into()))
    }

    async fn complete_openai(&self, system: &str, user: &str) -> Result<String> {
        let body = OpenAIRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            temperature: 0.0,
            messages: vec![
                Message { role: "system", content: system },
                Message { role: "user", content: user },
            ],
        };
        let request = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&body);

        let reply: OpenAIResponse = send(request).await?;
        reply
            .choices
            .into_iter()
            .map(|choice| choice.message.content)
            .next()
            .ok_or_else(|| ReconError::LlmError("reply had no choices".into()))
    }
}

/// Send a request and decode the JSON reply; non-2xx statuses become errors
async fn send<T: DeserializeOwned>(request: RequestBuilder) -> Result<T> {
    let response = request
        .send()
        .await
        .map_err(|e| ReconError::LlmError(e.to_string()))?;
    let status = response.status();
    if !status.is_success() {
        let detail = response.text().await.unwrap_or_default();
        return Err(ReconError::LlmError(format!("HTTP {}: {}", status, detail)));
    }
    response
        .json()
        .await
        .map_err(|e| ReconError::LlmError(format!("undecodable reply: {}", e)))
}

#[async_trait]
impl LlmEngine for LlmClient {
    async fn run(&self, prompt: &str) -> Result<String> {
        self.complete(SYSTEM_PROMPT, prompt).await
    }
}

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<Message<'a>>,
}

#[derive(Serialize)]
struct OpenAIRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<Message<'a>>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<TextBlock>,
}

#[derive(Deserialize)]
struct TextBlock {
    text: String,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: TextMessage,
}

#[derive(Deserialize)]
struct TextMessage {
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_detection() {
        let anthropic = LlmClient::new(
            "k".into(),
            "https://api.anthropic.com/v1/messages".into(),
            "claude-3-haiku-20240307".into(),
        );
        assert_eq!(anthropic.api_format(), &ApiFormat::Anthropic);

        let local = LlmClient::new(
            "k".into(),
            "http://localhost:8000/v1/chat/completions".into(),
            "llama3".into(),
        );
        assert_eq!(local.api_format(), &ApiFormat::OpenAI);
    }

    #[test]
    fn test_from_config_missing_key() {
        let config = LlmConfig {
            api_key_env: "RECON_AGENT_TEST_UNSET_KEY".into(),
            ..LlmConfig::default()
        };
        assert!(matches!(
            LlmClient::from_config(&config),
            Err(ReconError::LlmError(_))
        ));
    }
}
