//! OpenAI chat completions provider.

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

/// Provider backed by the OpenAI API
pub struct OpenAiProvider {
    api_key: Option<String>,
    completions_url: String,
    model: String,
    temperature: f64,
    max_tokens_persona: u32,
    max_tokens_messages: u32,
    client: Client,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f64,
    max_tokens: u32,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

impl OpenAiProvider {
    /// Build from the LLM configuration section
    #[must_use]
    pub fn new(config: &LlmConfig) -> Self {
        Self {
            api_key: config.openai_api_key(),
            completions_url: format!("{}/v1/chat/completions", config.openai_base_url.trim_end_matches('/')),
            model: config.openai_model.clone(),
            temperature: config.temperature,
            max_tokens_persona: config.max_tokens_persona,
            max_tokens_messages: config.max_tokens_messages,
            client: build_client(config.request_timeout_secs),
        }
    }

    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String> {
        let api_key = self.api_key.as_deref().ok_or_else(|| FoundryError::ProviderUnavailable {
            provider: self.name(),
            guidance: "Set OPENAI_API_KEY or llm.openai_api_key".to_string(),
        })?;

        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.temperature,
            max_tokens,
            response_format: ResponseFormat { kind: "json_object" },
        };
        debug!(model = %self.model, "Sending OpenAI chat completion");

        let response: ChatResponse = send_json(
            "openai",
            self.client.post(&self.completions_url).bearer_auth(api_key).json(&request),
        )
        .await?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| FoundryError::malformed("empty response from OpenAI", ""))
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> String {
        format!("OpenAI ({})", self.model)
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
        let mut prompt = PromptTemplates::persona_generation(constraints.as_ref(), count);
        if count > 1 {
            prompt.push_str(&PromptTemplates::object_wrapper("personas"));
        }
        let raw = self.complete(&prompt, self.max_tokens_persona).await?;
        parse_personas(&raw)
    }

    async fn generate_messages(&self, request: &MessageRequest) -> Result<Vec<GeneratedMessage>> {
        let mut prompt = PromptTemplates::message_generation(request);
        prompt.push_str(&PromptTemplates::object_wrapper("messages"));
        let raw = self.complete(&prompt, self.max_tokens_messages).await?;
        parse_messages(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completions_url() {
        let config = LlmConfig {
            openai_base_url: "https://example.test/".to_string(),
            ..LlmConfig::default()
        };
        let provider = OpenAiProvider::new(&config);
        assert_eq!(provider.completions_url, "https://example.test/v1/chat/completions");
        assert!(provider.requires_api_key());
    }

    #[test]
    fn test_request_uses_json_object_mode() {
        let request = ChatRequest {
            model: "gpt-4o-mini",
            messages: vec![],
            temperature: 0.8,
            max_tokens: 10,
            response_format: ResponseFormat { kind: "json_object" },
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains(r#""response_format":{"type":"json_object"}"#));
    }
}
