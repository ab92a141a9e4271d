//! Local provider speaking the Ollama chat API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::http::{build_client, send_json};
use super::parsing::{parse_messages, parse_personas};
use super::{LlmProvider, MessageRequest, PromptTemplates};
use crate::config::LlmConfig;
use crate::error::Result;
use crate::models::{GeneratedMessage, GeneratedPersona, PersonaConstraints};

const AVAILABILITY_TIMEOUT: Duration = Duration::from_secs(2);

/// Provider backed by a local Ollama-compatible runtime
pub struct LocalProvider {
    base_url: String,
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
    stream: bool,
    options: Options,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct Options {
    temperature: f64,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

impl LocalProvider {
    /// Build from the LLM configuration section
    #[must_use]
    pub fn new(config: &LlmConfig) -> Self {
        Self {
            base_url: config.local_base_url.trim_end_matches('/').to_string(),
            model: config.local_model.clone(),
            temperature: config.temperature,
            max_tokens_persona: config.max_tokens_persona,
            max_tokens_messages: config.max_tokens_messages,
            // Local models can be slow on modest hardware
            client: build_client(config.request_timeout_secs.max(300)),
        }
    }

    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            stream: false,
            options: Options {
                temperature: self.temperature,
                num_predict: max_tokens,
            },
        };
        let url = format!("{}/api/chat", self.base_url);
        debug!(model = %self.model, url = %url, "Sending local chat request");

        let response: ChatResponse = send_json("local", self.client.post(&url).json(&request)).await?;
        Ok(response.message.content)
    }
}

#[async_trait]
impl LlmProvider for LocalProvider {
    fn name(&self) -> String {
        format!("Local ({})", self.model)
    }

    fn requires_api_key(&self) -> bool {
        false
    }

    async fn is_available(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url);
        match self.client.get(&url).timeout(AVAILABILITY_TIMEOUT).send().await {
            Ok(response) => response.status().is_success(),
            Err(err) => {
                debug!(error = %err, url = %url, "Local runtime not reachable");
                false
            }
        }
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
