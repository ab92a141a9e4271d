//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use imessage_foundry::error::{FoundryError, Result};
use imessage_foundry::llm::{LlmProvider, MessageRequest};
use imessage_foundry::models::{
    AttachmentHint, ConversationConfig, GeneratedMessage, GeneratedPersona, Persona, PersonaConstraints,
};
use rusqlite::Connection;
use tokio_util::sync::CancellationToken;

/// Deterministic provider that cycles through the requested personas
pub struct ScriptedProvider {
    pub available: bool,
    pub calls: AtomicUsize,
    /// Attach a photo to every n-th message
    pub attachment_every: Option<usize>,
    /// Cancel this token once this many batches were served
    pub cancel_after: Option<(usize, CancellationToken)>,
    /// Return unknown sender ids
    pub anonymous: bool,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            available: true,
            calls: AtomicUsize::new(0),
            attachment_every: None,
            cancel_after: None,
            anonymous: false,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> String {
        "Scripted (test)".to_string()
    }

    fn requires_api_key(&self) -> bool {
        false
    }

    async fn is_available(&self) -> bool {
        self.available
    }

    async fn generate_personas(
        &self,
        _constraints: Option<PersonaConstraints>,
        count: usize,
    ) -> Result<Vec<GeneratedPersona>> {
        Ok((0..count)
            .map(|i| GeneratedPersona {
                name: format!("Person {i}"),
                personality: "Cheerful".to_string(),
                writing_style: "casual".to_string(),
                relationship: "friend".to_string(),
                communication_frequency: "high".to_string(),
                typical_response_time: "instant".to_string(),
                emoji_usage: "heavy".to_string(),
                vocabulary_level: "simple".to_string(),
                topics_of_interest: vec!["music".to_string()],
            })
            .collect())
    }

    async fn generate_messages(&self, request: &MessageRequest) -> Result<Vec<GeneratedMessage>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if request.personas.is_empty() {
            return Err(FoundryError::malformed("no personas in request", ""));
        }

        let offset = request.context.len();
        let messages = (0..request.count)
            .map(|i| {
                let persona = &request.personas[(offset + i) % request.personas.len()];
                let sender = if self.anonymous { "someone" } else { persona.id.as_str() };
                let mut message =
                    GeneratedMessage::new(sender, &format!("batch {call} message {i}"), persona.is_self);
                if self.attachment_every.is_some_and(|n| (i + 1) % n == 0) {
                    message.attachment = Some(AttachmentHint {
                        filename: Some(format!("IMG_{call:02}{i:02}.jpeg")),
                        mime_type: Some("image/jpeg".to_string()),
                        uti: Some("public.jpeg".to_string()),
                        total_bytes: 2048,
                    });
                }
                message
            })
            .collect();

        if let Some((after, token)) = &self.cancel_after {
            if call >= *after {
                token.cancel();
            }
        }
        Ok(messages)
    }
}

/// Self persona plus `others` counterparts
pub fn personas(others: usize) -> Vec<Persona> {
    let mut me = Persona::new("Me", "+15550000000");
    me.is_self = true;
    let mut out = vec![me];
    for i in 0..others {
        let mut p = Persona::new(&format!("Friend {i}"), &format!("+1555000010{i}"));
        p.topics_of_interest = vec!["hiking".to_string(), "cooking".to_string()];
        out.push(p);
    }
    out
}

pub fn window(days: i64) -> (DateTime<Utc>, DateTime<Utc>) {
    let end = Utc::now();
    (end - Duration::days(days), end)
}

pub fn conversation(personas: &[Persona], count: usize, days: i64) -> ConversationConfig {
    let (start, end) = window(days);
    ConversationConfig::new(personas.iter().map(|p| p.id.clone()).collect(), count, start, end)
}

pub fn count_rows(path: &Path, table: &str) -> i64 {
    let conn = Connection::open(path).expect("Failed to open database");
    conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
        .expect("Failed to count rows")
}
