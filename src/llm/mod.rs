//! LLM providers.
//!
//! Every backend implements [`LlmProvider`]. [`ProviderManager`] picks one based
//! on configuration and availability, and the generation orchestrator only ever
//! talks to the trait.

pub mod anthropic;
mod http;
pub mod local;
pub mod manager;
pub mod openai;
pub mod parsing;
pub mod prompts;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{GeneratedMessage, GeneratedPersona, PersonaConstraints, PersonaDescription};

pub use anthropic::AnthropicProvider;
pub use local::LocalProvider;
pub use manager::ProviderManager;
pub use openai::OpenAiProvider;
pub use prompts::PromptTemplates;

/// Known provider backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Ollama-compatible runtime on this machine
    #[default]
    Local,
    /// OpenAI chat completions
    #[serde(rename = "openai")]
    OpenAi,
    /// Anthropic messages API
    Anthropic,
}

impl ProviderKind {
    /// Every kind, in fallback order
    pub const ALL: [Self; 3] = [Self::Local, Self::OpenAi, Self::Anthropic];

    /// Lowercase name used in configuration
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "local" | "ollama" => Ok(Self::Local),
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            other => Err(format!(
                "Unknown provider: {other}. Must be one of: local, openai, anthropic"
            )),
        }
    }
}

/// One batch request for conversation messages
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageRequest {
    /// Participants as the prompt should describe them
    pub personas: Vec<PersonaDescription>,
    /// Most recent messages, oldest first
    pub context: Vec<GeneratedMessage>,
    /// Number of messages wanted
    pub count: usize,
    /// Theme hint, possibly carrying a topic shift
    pub seed: Option<String>,
}

/// A text-generation backend
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Human-readable name including the model
    fn name(&self) -> String;

    /// Whether the backend needs an API key
    fn requires_api_key(&self) -> bool;

    /// Whether the backend can serve requests right now
    async fn is_available(&self) -> bool;

    /// Draft `count` personas
    async fn generate_personas(
        &self,
        constraints: Option<PersonaConstraints>,
        count: usize,
    ) -> Result<Vec<GeneratedPersona>>;

    /// Generate the next batch of messages
    async fn generate_messages(&self, request: &MessageRequest) -> Result<Vec<GeneratedMessage>>;
}
