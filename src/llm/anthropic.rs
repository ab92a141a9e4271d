//! Anthropic messages API provider.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::http::{build_client, send_json};
use super::parsing::{parse_messages, parse_personas};
use super::{LlmProvider, MessageRequest, PromptTemplates};
use crate::config::LlmConfig;
use crate::error::{FoundryError, Result};
use crate::models::{GeneratedMessage, GeneratedPersona, PersonaConstraints};

const API_VERSION: &str = "2023-06-01";

/// Provider backed by the Anthropic API
pub struct AnthropicProvider {
    api_key: Option<String>,
    messages_url: String,
    model: String,
    temperature: f64,
    max_tokens_persona: u32,
    max_tokens_messages: u32,
    client: Client,
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f64,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

impl MessagesResponse {
    fn text(self) -> String {
        self.content
            .into_iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("")
    }
}

impl AnthropicProvider {
    /// Build from the LLM configuration section
    #[must_use]
    pub fn new(config: &LlmConfig) -> Self {
        Self {
            api_key: config.anthropic_api_key(),
            messages_url: format!("{}/v1/messages", config.anthropic_base_url.trim_end_matches('/')),
            model: config.anthropic_model.clone(),
            temperature: config.temperature,
            max_tokens_persona: config.max_tokens_persona,
            max_tokens_messages: config.max_tokens_messages,
            client: build_client(config.request_timeout_secs),
        }
    }

    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String> {
        let api_key = self.api_key.as_deref().ok_or_else(|| FoundryError::ProviderUnavailable {
            provider: self.name(),
            guidance: "Set ANTHROPIC_API_KEY or llm.anthropic_api_key".to_string(),
        })?;

        let request = MessagesRequest {
            model: &self.model,
            max_tokens,
            temperature: self.temperature,
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
        };
        debug!(model = %self.model, "Sending Anthropic messages request");

        let response: MessagesResponse = send_json(
            "anthropic",
            self.client
                .post(&self.messages_url)
                .header("x-api-key", api_key)
                .header("anthropic-version", API_VERSION)
                .json(&request),
        )
        .await?;

        let text = response.text();
        if text.trim().is_empty() {
            return Err(FoundryError::malformed("empty response from Anthropic", ""));
        }
        Ok(text)
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> String {
        format!("Anthropic ({})", self.model)
    }

    fn requires_api_key(&self) -> bool {
        true
    }

    async fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    async fn generate_personas(
        &self,
        constraints: Option<PersonaConstraints>,
        count: usize,
    ) -> Result<Vec<GeneratedPersona>> {
        let prompt = PromptTemplates::persona_generation(constraints.as_ref(), count);
        let raw = self.complete(&prompt, self.max_tokens_persona).await?;
        parse_personas(&raw)
    }

    async fn generate_messages(&self, request: &MessageRequest) -> Result<Vec<GeneratedMessage>> {
        let prompt = PromptTemplates::message_generation(request);
        let raw = self.complete(&prompt, self.max_tokens_messages).await?;
        parse_messages(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_url_and_name() {
        let config = LlmConfig {
            anthropic_base_url: "https://proxy.internal/".to_string(),
            anthropic_model: "claude-test".to_string(),
            ..LlmConfig::default()
        };
        let provider = AnthropicProvider::new(&config);
        assert_eq!(provider.messages_url, "https://proxy.internal/v1/messages");
        assert_eq!(provider.name(), "Anthropic (claude-test)");
    }

    #[test]
    fn test_response_joins_text_blocks_only() {
        let raw = r#"{"content":[
            {"type":"text","text":"[{\"sender_id\":"},
            {"type":"tool_use","id":"x"},
            {"type":"text","text":"\"a\"}]"}
        ]}"#;
        let response: MessagesResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(response.text(), r#"[{"sender_id":"a"}]"#);
    }

    #[tokio::test]
    async fn test_missing_key_is_unavailable() {
        let config = LlmConfig {
            anthropic_api_key: None,
            ..LlmConfig::default()
        };
        let provider = AnthropicProvider {
            api_key: None,
            ..AnthropicProvider::new(&config)
        };
        assert!(!provider.is_available().await);
        let err = provider.complete("hi", 10).await.unwrap_err();
        assert!(err.is_provider_unavailable());
    }
}
