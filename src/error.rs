//! Error types for the imessage-foundry library.
//!
//! This module provides custom error types using `thiserror` so callers can tell
//! configuration mistakes, invariant violations, provider problems and database
//! failures apart and present each one differently.

use thiserror::Error;

/// Maximum number of characters of a raw LLM response kept for diagnostics.
pub const SNIPPET_LIMIT: usize = 200;

/// Errors that can occur while synthesizing and writing a conversation.
#[derive(Error, Debug)]
pub enum FoundryError {
    /// Bad configuration detected before any side effects
    #[error("Validation error: {0}")]
    Validation(String),

    /// A GUID collided with one already written to this database
    #[error("Duplicate {kind} GUID: {guid}")]
    DuplicateGuid {
        /// Entity kind ("message", "chat", "attachment")
        kind: &'static str,
        /// The colliding GUID
        guid: String,
    },

    /// No usable LLM provider
    #[error("LLM provider not available: {provider}. {guidance}")]
    ProviderUnavailable {
        /// Provider name
        provider: String,
        /// Actionable guidance for the user
        guidance: String,
    },

    /// The LLM returned output that could not be parsed into the expected structure
    #[error("Malformed LLM response: {reason}\nResponse: {snippet}")]
    MalformedResponse {
        /// What went wrong
        reason: String,
        /// Leading fragment of the raw response
        snippet: String,
    },

    /// `finalize()` was called more than once
    #[error("Database already finalized")]
    AlreadyFinalized,

    /// The database writer was used after `close()`
    #[error("Database builder is closed")]
    Closed,

    /// Generation was cancelled between batches
    #[error("Generation cancelled")]
    Cancelled,

    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML serialization/deserialization errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP transport errors talking to a provider
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl FoundryError {
    /// Build a malformed-response error, truncating the raw text for the message.
    pub fn malformed(reason: impl Into<String>, raw: &str) -> Self {
        Self::MalformedResponse {
            reason: reason.into(),
            snippet: snippet(raw),
        }
    }

    /// Build a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// True for errors that must be presented as "provider unavailable".
    #[must_use]
    pub const fn is_provider_unavailable(&self) -> bool {
        matches!(self, Self::ProviderUnavailable { .. })
    }
}

/// Truncate raw LLM output to [`SNIPPET_LIMIT`] characters.
#[must_use]
pub fn snippet(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.chars().count() <= SNIPPET_LIMIT {
        return trimmed.to_string();
    }
    let mut out: String = trimmed.chars().take(SNIPPET_LIMIT).collect();
    out.push_str("...");
    out
}

/// Convenience type alias for Result with `FoundryError`
pub type Result<T> = std::result::Result<T, FoundryError>;

impl From<config::ConfigError> for FoundryError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}
