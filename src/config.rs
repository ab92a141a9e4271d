use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::llm::ProviderKind;
use crate::models::ServiceType;
use crate::schema::SchemaVersion;

/// Prefix for environment overrides, e.g. `IMESSAGE_FOUNDRY__LLM__DEFAULT_PROVIDER`
pub const ENV_PREFIX: &str = "IMESSAGE_FOUNDRY";

/// Application configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub llm: LlmConfig,
    pub generation: GenerationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub output_path: String,
    /// Schema name or macOS version; detected from the host when unset
    pub schema_version: Option<String>,
    pub in_memory: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file_path: Option<String>,
    pub format: String, // "json" or "text"
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub default_provider: ProviderKind,
    pub local_base_url: String,
    pub local_model: String,
    pub openai_base_url: String,
    pub openai_model: String,
    pub openai_api_key: Option<String>,
    pub anthropic_base_url: String,
    pub anthropic_model: String,
    pub anthropic_api_key: Option<String>,
    pub temperature: f64,
    pub max_tokens_persona: u32,
    pub max_tokens_messages: u32,
    pub message_batch_size: usize,
    pub context_window_size: usize,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub message_count: usize,
    pub days: i64,
    pub service: String,
    pub persona_file: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            default_provider: ProviderKind::Local,
            local_base_url: "http://localhost:11434".to_string(),
            local_model: "llama3.2".to_string(),
            openai_base_url: "https://api.openai.com".to_string(),
            openai_model: "gpt-4o-mini".to_string(),
            openai_api_key: None,
            anthropic_base_url: "https://api.anthropic.com".to_string(),
            anthropic_model: "claude-3-haiku-20240307".to_string(),
            anthropic_api_key: None,
            temperature: 0.8,
            max_tokens_persona: 1024,
            max_tokens_messages: 2048,
            message_batch_size: 30,
            context_window_size: 15,
            request_timeout_secs: 120,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                output_path: "./output/chat.db".to_string(),
                schema_version: None,
                in_memory: false,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                file_path: None,
                format: "text".to_string(),
            },
            llm: LlmConfig::default(),
            generation: GenerationConfig {
                message_count: 100,
                days: 30,
                service: "iMessage".to_string(),
                persona_file: "./data/personas.json".to_string(),
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources with precedence
    pub fn load() -> Result<Self> {
        Self::load_with(None)
    }

    /// Like [`AppConfig::load`], with an extra explicit file layered above the defaults
    pub fn load_with(extra_file: Option<&Path>) -> Result<Self> {
        let defaults = Config::try_from(&Self::default()).context("Failed to serialize default configuration")?;

        let mut builder = Config::builder()
            // Start with default values
            .add_source(defaults)
            // Add config files if they exist
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(File::with_name("foundry").required(false));

        if let Some(path) = extra_file {
            builder = builder.add_source(File::from(path).required(true));
        }

        let config = builder
            // Add environment variables with prefix
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to load configuration")?;

        let app_config: Self = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        // Validate configuration
        app_config.validate()?;

        Ok(app_config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.database.output_path.trim().is_empty() {
            return Err(anyhow::anyhow!("database.output_path must not be empty"));
        }

        // Validate logging config
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(anyhow::anyhow!(
                "Invalid log level: {}. Must be one of: {:?}",
                self.logging.level,
                valid_levels
            ));
        }

        let valid_formats = ["text", "json"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(anyhow::anyhow!(
                "Invalid log format: {}. Must be one of: {:?}",
                self.logging.format,
                valid_formats
            ));
        }

        // Validate LLM config
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(anyhow::anyhow!(
                "temperature must be between 0.0 and 2.0, got {}",
                self.llm.temperature
            ));
        }
        if self.llm.message_batch_size == 0 {
            return Err(anyhow::anyhow!("message_batch_size must be greater than 0"));
        }
        if self.llm.max_tokens_messages == 0 || self.llm.max_tokens_persona == 0 {
            return Err(anyhow::anyhow!("max_tokens limits must be greater than 0"));
        }
        if self.llm.request_timeout_secs == 0 {
            return Err(anyhow::anyhow!("request_timeout_secs must be greater than 0"));
        }

        // Validate generation config
        if self.generation.message_count == 0 {
            return Err(anyhow::anyhow!("message_count must be greater than 0"));
        }
        if self.generation.days <= 0 {
            return Err(anyhow::anyhow!("days must be greater than 0"));
        }
        self.service().map_err(|e| anyhow::anyhow!(e))?;

        Ok(())
    }

    /// Messaging service for generated chats
    pub fn service(&self) -> std::result::Result<ServiceType, String> {
        self.generation.service.parse()
    }

    /// Pinned schema version, `None` to detect from the host
    pub fn schema_version(&self) -> Option<SchemaVersion> {
        self.database
            .schema_version
            .as_deref()
            .filter(|v| !v.trim().is_empty())
            .map(SchemaVersion::parse)
    }

    /// Output database path
    pub fn output_path(&self) -> PathBuf {
        PathBuf::from(&self.database.output_path)
    }

    /// Get log level from environment or config
    pub fn get_log_level(&self) -> String {
        std::env::var("RUST_LOG").unwrap_or_else(|_| self.logging.level.clone())
    }
}

impl LlmConfig {
    /// OpenAI key from config or `OPENAI_API_KEY`
    pub fn openai_api_key(&self) -> Option<String> {
        non_empty(self.openai_api_key.clone()).or_else(|| non_empty(std::env::var("OPENAI_API_KEY").ok()))
    }

    /// Anthropic key from config or `ANTHROPIC_API_KEY`
    pub fn anthropic_api_key(&self) -> Option<String> {
        non_empty(self.anthropic_api_key.clone()).or_else(|| non_empty(std::env::var("ANTHROPIC_API_KEY").ok()))
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.llm.message_batch_size, 30);
        assert_eq!(config.llm.context_window_size, 15);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.generation.message_count, 100);
    }

    #[test]
    fn test_config_validation() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_config() {
        let mut config = AppConfig::default();
        config.llm.message_batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.generation.service = "carrier pigeon".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_schema_version_resolution() {
        let mut config = AppConfig::default();
        assert_eq!(config.schema_version(), None);
        config.database.schema_version = Some("14.6".to_string());
        assert_eq!(config.schema_version(), Some(SchemaVersion::Sonoma));
    }
}
