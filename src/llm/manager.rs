//! Provider selection with availability checks and fallback.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::{AnthropicProvider, LlmProvider, LocalProvider, OpenAiProvider, ProviderKind};
use crate::config::LlmConfig;
use crate::error::{FoundryError, Result};

/// Owns one instance of every configured provider and picks a usable one
pub struct ProviderManager {
    default: ProviderKind,
    providers: Vec<(ProviderKind, Arc<dyn LlmProvider>)>,
}

impl ProviderManager {
    /// Build every provider from configuration
    #[must_use]
    pub fn new(config: &LlmConfig) -> Self {
        let providers: Vec<(ProviderKind, Arc<dyn LlmProvider>)> = vec![
            (ProviderKind::Local, Arc::new(LocalProvider::new(config))),
            (ProviderKind::OpenAi, Arc::new(OpenAiProvider::new(config))),
            (ProviderKind::Anthropic, Arc::new(AnthropicProvider::new(config))),
        ];
        Self::with_providers(config.default_provider, providers)
    }

    /// Build from explicit provider instances
    #[must_use]
    pub fn with_providers(default: ProviderKind, providers: Vec<(ProviderKind, Arc<dyn LlmProvider>)>) -> Self {
        Self { default, providers }
    }

    /// Configured default kind
    #[must_use]
    pub const fn default_kind(&self) -> ProviderKind {
        self.default
    }

    fn lookup(&self, kind: ProviderKind) -> Option<&Arc<dyn LlmProvider>> {
        self.providers.iter().find(|(k, _)| *k == kind).map(|(_, provider)| provider)
    }

    /// Pick a provider.
    ///
    /// An explicit preference is honored or fails; otherwise the default is tried
    /// first and the remaining kinds follow in [`ProviderKind::ALL`] order.
    pub async fn get_provider(&self, preferred: Option<ProviderKind>) -> Result<Arc<dyn LlmProvider>> {
        if let Some(kind) = preferred {
            let provider = self.lookup(kind).ok_or_else(|| FoundryError::ProviderUnavailable {
                provider: kind.to_string(),
                guidance: "Provider is not configured".to_string(),
            })?;
            if provider.is_available().await {
                info!(provider = %provider.name(), "Using requested LLM provider");
                return Ok(Arc::clone(provider));
            }
            return Err(FoundryError::ProviderUnavailable {
                provider: provider.name(),
                guidance: Self::guidance(kind).to_string(),
            });
        }

        let order = std::iter::once(self.default).chain(ProviderKind::ALL.into_iter().filter(|k| *k != self.default));
        for kind in order {
            let Some(provider) = self.lookup(kind) else {
                continue;
            };
            if provider.is_available().await {
                if kind != self.default {
                    warn!(default = %self.default, fallback = %kind, "Default provider unavailable, falling back");
                }
                info!(provider = %provider.name(), "Using LLM provider");
                return Ok(Arc::clone(provider));
            }
            debug!(provider = %kind, "Provider not available");
        }

        let guidance = ProviderKind::ALL
            .iter()
            .map(|kind| format!("{kind}: {}", Self::guidance(*kind)))
            .collect::<Vec<_>>()
            .join("; ");
        Err(FoundryError::ProviderUnavailable {
            provider: "any".to_string(),
            guidance,
        })
    }

    /// Availability of every configured provider, in configuration order
    pub async fn list_available(&self) -> Vec<(ProviderKind, String, bool)> {
        let mut out = Vec::with_capacity(self.providers.len());
        for (kind, provider) in &self.providers {
            out.push((*kind, provider.name(), provider.is_available().await));
        }
        out
    }

    /// How to make a provider usable
    #[must_use]
    pub const fn guidance(kind: ProviderKind) -> &'static str {
        match kind {
            ProviderKind::Local => "Start a local runtime with `ollama serve` and pull the configured model",
            ProviderKind::OpenAi => "Set OPENAI_API_KEY or llm.openai_api_key",
            ProviderKind::Anthropic => "Set ANTHROPIC_API_KEY or llm.anthropic_api_key",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmProvider;

    fn mock(name: &'static str, available: bool) -> Arc<dyn LlmProvider> {
        let mut provider = MockLlmProvider::new();
        provider.expect_name().returning(move || name.to_string());
        provider.expect_is_available().returning(move || available);
        Arc::new(provider)
    }

    fn manager(default: ProviderKind, local: bool, openai: bool, anthropic: bool) -> ProviderManager {
        ProviderManager::with_providers(
            default,
            vec![
                (ProviderKind::Local, mock("local", local)),
                (ProviderKind::OpenAi, mock("openai", openai)),
                (ProviderKind::Anthropic, mock("anthropic", anthropic)),
            ],
        )
    }

    #[tokio::test]
    async fn test_default_provider_preferred() {
        let manager = manager(ProviderKind::OpenAi, true, true, true);
        let provider = manager.get_provider(None).await.unwrap();
        assert_eq!(provider.name(), "openai");
    }

    #[tokio::test]
    async fn test_fallback_when_default_unavailable() {
        let manager = manager(ProviderKind::Local, false, false, true);
        let provider = manager.get_provider(None).await.unwrap();
        assert_eq!(provider.name(), "anthropic");
    }

    #[tokio::test]
    async fn test_explicit_preference_does_not_fall_back() {
        let manager = manager(ProviderKind::Local, true, false, true);
        let err = manager.get_provider(Some(ProviderKind::OpenAi)).await.err().unwrap();
        assert!(err.is_provider_unavailable());
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }

    #[tokio::test]
    async fn test_nothing_available_lists_guidance_for_each() {
        let manager = manager(ProviderKind::Local, false, false, false);
        let err = manager.get_provider(None).await.err().unwrap();
        let text = err.to_string();
        assert!(text.contains("ollama serve"));
        assert!(text.contains("OPENAI_API_KEY"));
        assert!(text.contains("ANTHROPIC_API_KEY"));
    }

    #[tokio::test]
    async fn test_list_available() {
        let manager = manager(ProviderKind::Local, true, false, false);
        let listed = manager.list_available().await;
        assert_eq!(listed.len(), 3);
        assert_eq!(listed[0], (ProviderKind::Local, "local".to_string(), true));
        assert!(!listed[2].2);
    }
}
