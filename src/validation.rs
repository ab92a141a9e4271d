use std::collections::HashMap;
use std::path::Path;

use crate::error::{FoundryError, Result};
use crate::models::{ChatType, ConversationConfig, IdentifierType, Persona};
use crate::timestamps::validate_window;

/// Upper bound on messages in one generated conversation
pub const MAX_MESSAGE_COUNT: usize = 100_000;

fn invalid<T>(message: impl Into<String>) -> Result<T> {
    Err(FoundryError::validation(message))
}

/// Validation utilities for input sanitization and edge case handling
#[derive(Debug, Copy, Clone)]
pub struct InputValidator;

impl InputValidator {
    /// Validate persona display name
    pub fn validate_persona_name(name: &str) -> Result<()> {
        if name.trim().is_empty() {
            return invalid("Persona name cannot be empty");
        }

        if name.chars().count() > 100 {
            return invalid("Persona name too long (max 100 characters)");
        }

        if name.contains('\0') || name.contains('\r') || name.contains('\n') {
            return invalid("Persona name contains invalid characters");
        }

        Ok(())
    }

    /// Validate phone number format
    pub fn validate_phone(phone: &str) -> Result<()> {
        if phone.trim().is_empty() {
            return invalid("Phone number cannot be empty");
        }

        // Remove common formatting characters
        let cleaned = phone
            .chars()
            .filter(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '(' | ')' | ' ' | '.'))
            .collect::<String>();
        if cleaned.len() != phone.len() {
            return invalid(format!("Phone number contains invalid characters: {phone}"));
        }

        let digits_only = cleaned.chars().filter(char::is_ascii_digit).count();
        if !(7..=15).contains(&digits_only) {
            return invalid("Phone number must be between 7 and 15 digits");
        }

        if cleaned.rfind('+').is_some_and(|pos| pos != 0) {
            return invalid("Phone number may only have + as its first character");
        }

        Ok(())
    }

    /// Validate email format
    pub fn validate_email(email: &str) -> Result<()> {
        if email.trim().is_empty() {
            return invalid("Email cannot be empty");
        }

        if email.len() > 254 {
            return invalid("Email too long (max 254 characters)");
        }

        let Some((local_part, domain_part)) = email.split_once('@') else {
            return invalid("Email must contain @ symbol");
        };
        if domain_part.contains('@') {
            return invalid("Email must have exactly one @ symbol");
        }

        if local_part.is_empty() || local_part.len() > 64 {
            return invalid("Email local part invalid");
        }

        if domain_part.is_empty() || !domain_part.contains('.') || domain_part.starts_with('.') {
            return invalid("Email domain invalid");
        }

        Ok(())
    }

    /// Validate a handle identifier according to its type
    pub fn validate_identifier(identifier: &str, identifier_type: IdentifierType) -> Result<()> {
        match identifier_type {
            IdentifierType::Phone => Self::validate_phone(identifier),
            IdentifierType::Email => Self::validate_email(identifier),
        }
    }

    /// Validate a full persona record
    pub fn validate_persona(persona: &Persona) -> Result<()> {
        Self::validate_persona_name(&persona.name)?;
        Self::validate_identifier(&persona.identifier, persona.identifier_type)
    }

    /// Validate output file path
    pub fn validate_file_path(path: &Path) -> Result<()> {
        let path_str = path.to_string_lossy();
        if path_str.trim().is_empty() {
            return invalid("File path cannot be empty");
        }

        if path_str.contains('\0') {
            return invalid("File path contains a NUL byte");
        }

        if path_str.len() > 4096 {
            return invalid("File path too long (max 4096 characters)");
        }

        if path.is_dir() {
            return invalid(format!("File path is a directory: {}", path.display()));
        }

        Ok(())
    }

    /// Validate batch size for LLM requests
    pub fn validate_batch_size(batch_size: usize) -> Result<()> {
        if batch_size == 0 {
            return invalid("Batch size must be greater than 0");
        }

        if batch_size > 500 {
            return invalid("Batch size too large (max 500)");
        }

        Ok(())
    }

    /// Check a conversation request against the personas it names.
    ///
    /// Runs before any provider or database call.
    pub fn validate_conversation<'a>(
        config: &ConversationConfig,
        personas: &'a [Persona],
    ) -> Result<Vec<&'a Persona>> {
        if config.participants.len() < 2 {
            return invalid(format!(
                "Conversation needs at least 2 participants, got {}",
                config.participants.len()
            ));
        }

        if config.message_count_target > MAX_MESSAGE_COUNT {
            return invalid(format!(
                "Message count too large: {} (max {MAX_MESSAGE_COUNT})",
                config.message_count_target
            ));
        }

        let by_id: HashMap<&str, &Persona> = personas.iter().map(|p| (p.id.as_str(), p)).collect();
        let mut resolved = Vec::with_capacity(config.participants.len());
        for id in &config.participants {
            let Some(persona) = by_id.get(id.as_str()) else {
                return invalid(format!("Participant {id} does not match any persona"));
            };
            if resolved.iter().any(|p: &&Persona| p.id == persona.id) {
                return invalid(format!("Participant {id} listed more than once"));
            }
            resolved.push(*persona);
        }

        let mut identifiers: HashMap<String, &str> = HashMap::with_capacity(resolved.len());
        for persona in &resolved {
            let key = persona.identifier.trim().to_lowercase();
            if let Some(other) = identifiers.insert(key, persona.name.as_str()) {
                return invalid(format!(
                    "Participants {other} and {} share the identifier {}",
                    persona.name, persona.identifier
                ));
            }
        }

        let self_count = resolved.iter().filter(|p| p.is_self).count();
        if self_count != 1 {
            return invalid(format!(
                "Exactly one participant must be the self persona, found {self_count}"
            ));
        }

        let expected = ChatType::for_participants(resolved.len());
        if config.chat_type != expected {
            return invalid(format!(
                "Chat type {:?} does not fit {} participants",
                config.chat_type,
                resolved.len()
            ));
        }

        validate_window(config.time_range_start, config.time_range_end, config.message_count_target)?;

        Ok(resolved)
    }

    /// Sanitize text input
    #[must_use]
    pub fn sanitize_text(text: &str) -> String {
        text.chars()
            .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
            .collect::<String>()
            .trim()
            .to_string()
    }
}
