//! Data models for personas, conversation configuration and generated messages
//!
//! This module contains the data structures shared by the timestamp synthesizer,
//! the topic planner, the LLM providers and the generation orchestrator.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enum_parsing::{parse_enum, FuzzyEnum};

/// How often a persona sends messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CommunicationFrequency {
    /// Texts constantly
    High,
    /// Texts daily
    #[default]
    Medium,
    /// Texts occasionally
    Low,
}

/// How quickly a persona typically replies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResponseTime {
    /// Seconds
    Instant,
    /// A few minutes
    #[default]
    Minutes,
    /// Hours
    Hours,
    /// Days
    Days,
}

/// How heavily a persona uses emoji
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmojiUsage {
    /// Never
    None,
    /// Now and then
    #[default]
    Light,
    /// Regularly
    Moderate,
    /// In most messages
    Heavy,
}

/// Vocabulary register of a persona
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VocabularyLevel {
    /// Plain words
    Simple,
    /// Everyday vocabulary
    #[default]
    Moderate,
    /// Elaborate vocabulary
    Sophisticated,
}

/// Kind of contact identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum IdentifierType {
    /// E.164 phone number
    #[default]
    Phone,
    /// Email address
    Email,
}

/// Messaging service a chat runs over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ServiceType {
    /// Apple iMessage
    #[default]
    #[serde(rename = "iMessage", alias = "imessage")]
    IMessage,
    /// Carrier SMS
    #[serde(rename = "SMS", alias = "sms")]
    Sms,
}

impl ServiceType {
    /// Service name as stored in `chat.db`
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::IMessage => "iMessage",
            Self::Sms => "SMS",
        }
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ServiceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "imessage" => Ok(Self::IMessage),
            "sms" => Ok(Self::Sms),
            other => Err(format!("Unknown service: {other}. Must be one of: iMessage, SMS")),
        }
    }
}

/// Chat cardinality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatType {
    /// Exactly two participants
    Direct,
    /// Three or more participants
    Group,
}

impl ChatType {
    /// Infer the chat type from a participant count
    #[must_use]
    pub const fn for_participants(count: usize) -> Self {
        if count == 2 {
            Self::Direct
        } else {
            Self::Group
        }
    }

    /// `chat.style` value stored in the database
    #[must_use]
    pub const fn style(&self) -> i64 {
        match self {
            Self::Direct => 43,
            Self::Group => 45,
        }
    }
}

impl FuzzyEnum for CommunicationFrequency {
    const ALL: &'static [Self] = &[Self::High, Self::Medium, Self::Low];

    fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

impl FuzzyEnum for ResponseTime {
    const ALL: &'static [Self] = &[Self::Instant, Self::Minutes, Self::Hours, Self::Days];

    fn as_str(&self) -> &'static str {
        match self {
            Self::Instant => "instant",
            Self::Minutes => "minutes",
            Self::Hours => "hours",
            Self::Days => "days",
        }
    }
}

impl FuzzyEnum for EmojiUsage {
    const ALL: &'static [Self] = &[Self::None, Self::Light, Self::Moderate, Self::Heavy];

    fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Light => "light",
            Self::Moderate => "moderate",
            Self::Heavy => "heavy",
        }
    }
}

impl FuzzyEnum for VocabularyLevel {
    const ALL: &'static [Self] = &[Self::Simple, Self::Moderate, Self::Sophisticated];

    fn as_str(&self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Moderate => "moderate",
            Self::Sophisticated => "sophisticated",
        }
    }
}

fn default_country() -> Option<String> {
    Some("US".to_string())
}

fn default_writing_style() -> String {
    "casual".to_string()
}

fn default_relationship() -> String {
    "friend".to_string()
}

/// A simulated person taking part in a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Persona {
    /// Stable persona identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Phone number or email used as the handle identifier
    pub identifier: String,
    /// Whether `identifier` is a phone number or an email
    #[serde(default)]
    pub identifier_type: IdentifierType,
    /// Country code recorded on the handle
    #[serde(default = "default_country")]
    pub country_code: Option<String>,
    /// Free-text personality description
    #[serde(default)]
    pub personality: String,
    /// How they write texts
    #[serde(default = "default_writing_style")]
    pub writing_style: String,
    /// Relationship to the database owner
    #[serde(default = "default_relationship")]
    pub relationship: String,
    /// How often they text
    #[serde(default)]
    pub communication_frequency: CommunicationFrequency,
    /// How fast they reply
    #[serde(default)]
    pub typical_response_time: ResponseTime,
    /// How much they use emoji
    #[serde(default)]
    pub emoji_usage: EmojiUsage,
    /// Vocabulary register
    #[serde(default)]
    pub vocabulary_level: VocabularyLevel,
    /// Topics they like to talk about
    #[serde(default)]
    pub topics_of_interest: Vec<String>,
    /// True for the database owner
    #[serde(default)]
    pub is_self: bool,
}

impl Persona {
    /// Create a persona with default behavioral attributes and a fresh id
    #[must_use]
    pub fn new(name: &str, identifier: &str) -> Self {
        let identifier_type = if identifier.contains('@') {
            IdentifierType::Email
        } else {
            IdentifierType::Phone
        };
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            identifier: identifier.to_string(),
            identifier_type,
            country_code: default_country(),
            personality: String::new(),
            writing_style: default_writing_style(),
            relationship: default_relationship(),
            communication_frequency: CommunicationFrequency::default(),
            typical_response_time: ResponseTime::default(),
            emoji_usage: EmojiUsage::default(),
            vocabulary_level: VocabularyLevel::default(),
            topics_of_interest: Vec::new(),
            is_self: false,
        }
    }

    /// Description handed to the LLM prompt
    #[must_use]
    pub fn describe(&self) -> PersonaDescription {
        PersonaDescription {
            id: self.id.clone(),
            name: self.name.clone(),
            personality: if self.personality.is_empty() {
                "Not specified".to_string()
            } else {
                self.personality.clone()
            },
            writing_style: self.writing_style.clone(),
            emoji_usage: self.emoji_usage.as_str().to_string(),
            topics: if self.topics_of_interest.is_empty() {
                "general".to_string()
            } else {
                self.topics_of_interest.join(", ")
            },
            is_self: self.is_self,
        }
    }
}

/// Prompt-facing summary of a persona
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonaDescription {
    /// Persona id the LLM must echo back as `sender_id`
    pub id: String,
    /// Display name
    pub name: String,
    /// Personality text
    pub personality: String,
    /// Writing style
    pub writing_style: String,
    /// Emoji usage class
    pub emoji_usage: String,
    /// Comma-separated topics
    pub topics: String,
    /// True for the database owner
    pub is_self: bool,
}

/// Parameters for one generation run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationConfig {
    /// Participant persona ids
    pub participants: Vec<String>,
    /// Direct or group
    pub chat_type: ChatType,
    /// Number of messages to produce
    pub message_count_target: usize,
    /// Inclusive window start
    pub time_range_start: DateTime<Utc>,
    /// Exclusive window end
    pub time_range_end: DateTime<Utc>,
    /// Free-text conversation theme
    pub seed: Option<String>,
    /// Service for handles, chat and messages
    pub service: ServiceType,
    /// Seed for the timestamp and topic RNGs
    pub random_seed: Option<u64>,
}

impl ConversationConfig {
    /// Build a config whose chat type is inferred from the participant count
    #[must_use]
    pub fn new(
        participants: Vec<String>,
        message_count_target: usize,
        time_range_start: DateTime<Utc>,
        time_range_end: DateTime<Utc>,
    ) -> Self {
        Self {
            chat_type: ChatType::for_participants(participants.len()),
            participants,
            message_count_target,
            time_range_start,
            time_range_end,
            seed: None,
            service: ServiceType::IMessage,
            random_seed: None,
        }
    }

    /// Set the conversation theme
    #[must_use]
    pub fn with_seed(mut self, seed: &str) -> Self {
        self.seed = Some(seed.to_string());
        self
    }

    /// Set the deterministic RNG seed
    #[must_use]
    pub const fn with_random_seed(mut self, seed: u64) -> Self {
        self.random_seed = Some(seed);
        self
    }

    /// Set the messaging service
    #[must_use]
    pub const fn with_service(mut self, service: ServiceType) -> Self {
        self.service = service;
        self
    }
}

/// Attachment metadata an LLM may attach to a generated message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentHint {
    /// File name
    #[serde(default)]
    pub filename: Option<String>,
    /// MIME type
    #[serde(default)]
    pub mime_type: Option<String>,
    /// Uniform Type Identifier
    #[serde(default)]
    pub uti: Option<String>,
    /// Size in bytes
    #[serde(default)]
    pub total_bytes: i64,
}

/// A message produced by an LLM provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedMessage {
    /// Persona id of the sender
    pub sender_id: String,
    /// Message body
    pub text: String,
    /// True when sent by the database owner
    #[serde(default)]
    pub is_from_me: bool,
    /// Optional attachment metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<AttachmentHint>,
}

impl GeneratedMessage {
    /// Plain text message without attachment
    #[must_use]
    pub fn new(sender_id: &str, text: &str, is_from_me: bool) -> Self {
        Self {
            sender_id: sender_id.to_string(),
            text: text.to_string(),
            is_from_me,
            attachment: None,
        }
    }
}

/// A generated message paired with its synthesized Apple-epoch timestamp
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimestampedMessage {
    /// The message
    pub message: GeneratedMessage,
    /// Apple-epoch nanoseconds
    pub timestamp: i64,
}

/// Optional steering for persona generation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersonaConstraints {
    /// Relationship to the user
    pub relationship: Option<String>,
    /// Communication frequency
    pub communication_frequency: Option<CommunicationFrequency>,
    /// Vocabulary level
    pub vocabulary_level: Option<VocabularyLevel>,
    /// Emoji usage
    pub emoji_usage: Option<EmojiUsage>,
    /// Response time
    pub typical_response_time: Option<ResponseTime>,
    /// Inclusive age range
    pub age_range: Option<(u32, u32)>,
    /// Topics of interest
    #[serde(default)]
    pub topics: Vec<String>,
    /// Personality traits
    #[serde(default)]
    pub personality_traits: Vec<String>,
}

/// Persona draft as returned by an LLM, before enum normalization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedPersona {
    /// Full name
    pub name: String,
    /// Personality description
    #[serde(default)]
    pub personality: String,
    /// Writing style
    #[serde(default)]
    pub writing_style: String,
    /// Relationship to the user
    #[serde(default)]
    pub relationship: String,
    /// Raw communication frequency text
    #[serde(default)]
    pub communication_frequency: String,
    /// Raw response time text
    #[serde(default)]
    pub typical_response_time: String,
    /// Raw emoji usage text
    #[serde(default)]
    pub emoji_usage: String,
    /// Raw vocabulary level text
    #[serde(default)]
    pub vocabulary_level: String,
    /// Topics of interest
    #[serde(default)]
    pub topics_of_interest: Vec<String>,
}

impl GeneratedPersona {
    /// Turn the draft into a persona, mapping free-text enum fields with fallbacks
    #[must_use]
    pub fn into_persona(self, identifier: &str, is_self: bool) -> Persona {
        let mut persona = Persona::new(&self.name, identifier);
        persona.personality = self.personality;
        if !self.writing_style.trim().is_empty() {
            persona.writing_style = self.writing_style;
        }
        if !self.relationship.trim().is_empty() {
            persona.relationship = self.relationship;
        }
        persona.communication_frequency =
            parse_enum(&self.communication_frequency, CommunicationFrequency::Medium);
        persona.typical_response_time = parse_enum(&self.typical_response_time, ResponseTime::Minutes);
        persona.emoji_usage = parse_enum(&self.emoji_usage, EmojiUsage::Light);
        persona.vocabulary_level = parse_enum(&self.vocabulary_level, VocabularyLevel::Moderate);
        persona.topics_of_interest = self.topics_of_interest;
        persona.is_self = is_self;
        persona
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_type_inference() {
        assert_eq!(ChatType::for_participants(2), ChatType::Direct);
        assert_eq!(ChatType::for_participants(3), ChatType::Group);
        assert_eq!(ChatType::Direct.style(), 43);
        assert_eq!(ChatType::Group.style(), 45);
    }

    #[test]
    fn test_service_serde_names() {
        let json = serde_json::to_string(&ServiceType::IMessage).unwrap();
        assert_eq!(json, "\"iMessage\"");
        let sms: ServiceType = serde_json::from_str("\"sms\"").unwrap();
        assert_eq!(sms, ServiceType::Sms);
        assert_eq!("SMS".parse::<ServiceType>().unwrap(), ServiceType::Sms);
    }

    #[test]
    fn test_persona_identifier_type_detection() {
        assert_eq!(Persona::new("A", "a@example.com").identifier_type, IdentifierType::Email);
        assert_eq!(Persona::new("B", "+15551234567").identifier_type, IdentifierType::Phone);
    }

    #[test]
    fn test_generated_message_defaults() {
        let msg: GeneratedMessage =
            serde_json::from_str(r#"{"sender_id": "p1", "text": "hey"}"#).unwrap();
        assert!(!msg.is_from_me);
        assert!(msg.attachment.is_none());
    }

    #[test]
    fn test_generated_persona_fuzzy_fields() {
        let draft = GeneratedPersona {
            name: "Sam Rivera".to_string(),
            personality: "Upbeat".to_string(),
            writing_style: String::new(),
            relationship: "coworker".to_string(),
            communication_frequency: "HIGH - texts all day".to_string(),
            typical_response_time: "usually instant".to_string(),
            emoji_usage: "heavy (hearts, stars)".to_string(),
            vocabulary_level: "???".to_string(),
            topics_of_interest: vec!["climbing".to_string()],
        };
        let persona = draft.into_persona("+15550001111", false);
        assert_eq!(persona.communication_frequency, CommunicationFrequency::High);
        assert_eq!(persona.typical_response_time, ResponseTime::Instant);
        assert_eq!(persona.emoji_usage, EmojiUsage::Heavy);
        assert_eq!(persona.vocabulary_level, VocabularyLevel::Moderate);
        assert_eq!(persona.writing_style, "casual");
        assert_eq!(persona.relationship, "coworker");
    }
}
