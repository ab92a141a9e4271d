//! iMessage Foundry - synthetic iMessage conversation datasets
//!
//! A Rust library that turns persona descriptions, a time window and a message
//! budget into realistic timestamped conversations, and writes them into SQLite
//! files matching the iMessage `chat.db` schema.
//!
//! # Features
//!
//! - Session-clustered, circadian-weighted timestamp synthesis
//! - Conversation seeds and mid-conversation topic shifts
//! - Versioned `chat.db` schemas (Sonoma, Sequoia, Tahoe)
//! - Local, OpenAI and Anthropic LLM providers behind one trait
//! - JSON/YAML persona files

/// Configuration management
pub mod config;
/// `chat.db` writer
pub mod db;
/// Fuzzy mapping of free text onto closed enums
pub mod enum_parsing;
/// Error types
pub mod error;
/// Generation orchestrator
pub mod generator;
/// LLM providers and prompts
pub mod llm;
/// Logging setup and utilities
pub mod logging;
/// Metrics collection
pub mod metrics;
/// Data models and structures
pub mod models;
/// Persona file store
pub mod personas;
/// Versioned `chat.db` schema definitions
pub mod schema;
/// Conversation seeds and topic shifts
pub mod seeding;
/// Timestamp synthesis
pub mod timestamps;
/// Apple-epoch time helpers
pub mod utils;
/// Input validation and sanitization
pub mod validation;

// Re-export key components for easier access
pub use db::{BuilderOptions, DatabaseBuilder};
pub use error::{FoundryError, Result};
pub use generator::{ConversationGenerator, GenerationPhase, GenerationProgress, GenerationResult, GeneratorOptions};
pub use llm::{LlmProvider, ProviderKind, ProviderManager};
pub use models::{ChatType, ConversationConfig, GeneratedMessage, Persona, ServiceType, TimestampedMessage};
pub use schema::SchemaVersion;
