//! Prompt construction for persona and message generation.

use serde_json::json;

use crate::enum_parsing::FuzzyEnum;
use crate::llm::MessageRequest;
use crate::models::{
    CommunicationFrequency, EmojiUsage, GeneratedMessage, PersonaConstraints, PersonaDescription, ResponseTime,
    VocabularyLevel,
};

fn names<T: FuzzyEnum>() -> Vec<&'static str> {
    T::ALL.iter().map(|member| member.as_str()).collect()
}

/// JSON schema a generated persona must follow
#[must_use]
pub fn persona_json_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "name": {"type": "string", "description": "Full name of the persona"},
            "personality": {"type": "string", "description": "Personality description (2-3 sentences)"},
            "writing_style": {
                "type": "string",
                "description": "How they write texts (formal, casual, uses slang, etc.)"
            },
            "relationship": {"type": "string", "description": "Relationship to the user"},
            "communication_frequency": {"type": "string", "enum": names::<CommunicationFrequency>()},
            "typical_response_time": {"type": "string", "enum": names::<ResponseTime>()},
            "emoji_usage": {"type": "string", "enum": names::<EmojiUsage>()},
            "vocabulary_level": {"type": "string", "enum": names::<VocabularyLevel>()},
            "topics_of_interest": {
                "type": "array",
                "items": {"type": "string"},
                "description": "3-5 topics they often discuss"
            }
        },
        "required": [
            "name", "personality", "writing_style", "relationship", "communication_frequency",
            "typical_response_time", "emoji_usage", "vocabulary_level", "topics_of_interest"
        ]
    })
}

/// Prompt builders shared by every provider
pub struct PromptTemplates;

impl PromptTemplates {
    /// Prompt asking for `count` persona drafts
    #[must_use]
    pub fn persona_generation(constraints: Option<&PersonaConstraints>, count: usize) -> String {
        let constraint_text = constraints.map(Self::format_constraints).unwrap_or_default();
        let schema = serde_json::to_string_pretty(&persona_json_schema()).unwrap_or_default();
        let shape = if count > 1 {
            format!("Return a JSON array of {count} persona objects.")
        } else {
            "Return a single JSON object (not an array).".to_string()
        };

        format!(
            "You are creating realistic persona(s) for a text messaging simulation.

Create {count} unique persona(s) that would be contacts in someone's phone.
Each persona should feel like a real person with distinct texting habits.

{constraint_text}

Each persona MUST have:
- A realistic full name
- A distinct personality that affects their texting behavior
- A specific writing style (formal, casual, uses slang, abbreviations, etc.)
- Defined emoji usage patterns matching their personality
- 3-5 topics they naturally discuss

IMPORTANT: Return ONLY valid JSON with no additional text or explanation.

JSON Schema to follow:
{schema}

{shape}"
        )
    }

    /// Prompt asking for the next batch of a conversation
    #[must_use]
    pub fn message_generation(request: &MessageRequest) -> String {
        let personas_text = Self::format_personas(&request.personas);
        let context_text = if request.context.is_empty() {
            "This is the START of the conversation.".to_string()
        } else {
            Self::format_context(&request.context)
        };
        let seed_text = request
            .seed
            .as_deref()
            .map(|seed| format!("\nConversation theme/topic: {seed}"))
            .unwrap_or_default();
        let count = request.count;

        format!(
            "You are simulating a realistic text message conversation between people.

PARTICIPANTS:
{personas_text}

CONVERSATION CONTEXT:
{context_text}
{seed_text}

Generate the next {count} messages in this conversation.

IMPORTANT GUIDELINES:
- Each message should feel like a genuine text message
- Match each sender's personality, writing style, and emoji usage
- Vary message lengths naturally (some short \"lol ok\", some longer)
- Include natural conversation patterns (questions, responses, topic shifts)
- The \"self\" persona (is_from_me=true) should be one participant
- Alternate between participants naturally, not strictly back-and-forth

IMPORTANT: Return ONLY valid JSON with no additional text.

Return a JSON array of message objects:
[
  {{\"sender_id\": \"<persona_id>\", \"text\": \"<message text>\", \"is_from_me\": <boolean>}},
  ...
]

Generate exactly {count} messages."
        )
    }

    /// Suffix for providers whose JSON mode only allows a top-level object
    #[must_use]
    pub fn object_wrapper(key: &str) -> String {
        format!("\n\nWrap the array in a JSON object under the key \"{key}\": {{\"{key}\": [...]}}")
    }

    fn format_constraints(constraints: &PersonaConstraints) -> String {
        let mut parts = vec!["CONSTRAINTS:".to_string()];

        if let Some(relationship) = &constraints.relationship {
            parts.push(format!("- Relationship to user: {relationship}"));
        }
        if let Some(frequency) = constraints.communication_frequency {
            parts.push(format!("- Communication frequency: {}", frequency.as_str()));
        }
        if let Some(level) = constraints.vocabulary_level {
            parts.push(format!("- Vocabulary level: {}", level.as_str()));
        }
        if let Some(emoji) = constraints.emoji_usage {
            parts.push(format!("- Emoji usage: {}", emoji.as_str()));
        }
        if let Some(response) = constraints.typical_response_time {
            parts.push(format!("- Response time: {}", response.as_str()));
        }
        if let Some((low, high)) = constraints.age_range {
            parts.push(format!("- Age range: {low}-{high}"));
        }
        if !constraints.topics.is_empty() {
            parts.push(format!("- Topics of interest: {}", constraints.topics.join(", ")));
        }
        if !constraints.personality_traits.is_empty() {
            parts.push(format!("- Personality traits: {}", constraints.personality_traits.join(", ")));
        }

        if parts.len() > 1 {
            parts.join("\n")
        } else {
            String::new()
        }
    }

    fn format_personas(personas: &[PersonaDescription]) -> String {
        personas
            .iter()
            .map(|p| {
                let marker = if p.is_self {
                    " (THIS IS YOU - messages from this persona have is_from_me=true)"
                } else {
                    ""
                };
                format!(
                    "- ID: {}{marker}\n  Name: {}\n  Personality: {}\n  Writing style: {}\n  Emoji usage: {}\n  Topics: {}",
                    p.id, p.name, p.personality, p.writing_style, p.emoji_usage, p.topics
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn format_context(context: &[GeneratedMessage]) -> String {
        let mut parts = vec!["Recent messages:".to_string()];
        for msg in context {
            let sender = if msg.is_from_me {
                "You".to_string()
            } else {
                format!("[{}]", msg.sender_id)
            };
            parts.push(format!("  {sender}: {}", msg.text));
        }
        parts.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Persona;

    #[test]
    fn test_message_prompt_marks_self_and_context() {
        let mut me = Persona::new("Me", "+15550000000");
        me.is_self = true;
        let friend = Persona::new("Sam", "+15550000001");
        let request = MessageRequest {
            personas: vec![me.describe(), friend.describe()],
            context: vec![GeneratedMessage::new(&friend.id, "you up?", false)],
            count: 12,
            seed: Some("weekend trip".to_string()),
        };

        let prompt = PromptTemplates::message_generation(&request);
        assert!(prompt.contains("THIS IS YOU"));
        assert!(prompt.contains(&format!("[{}]: you up?", friend.id)));
        assert!(prompt.contains("Conversation theme/topic: weekend trip"));
        assert!(prompt.contains("Generate exactly 12 messages."));
    }

    #[test]
    fn test_empty_context_marks_start() {
        let request = MessageRequest {
            count: 3,
            ..MessageRequest::default()
        };
        assert!(PromptTemplates::message_generation(&request).contains("START of the conversation"));
    }

    #[test]
    fn test_persona_prompt_constraints() {
        let constraints = PersonaConstraints {
            relationship: Some("sister".to_string()),
            emoji_usage: Some(EmojiUsage::Heavy),
            age_range: Some((25, 35)),
            ..PersonaConstraints::default()
        };
        let prompt = PromptTemplates::persona_generation(Some(&constraints), 3);
        assert!(prompt.contains("- Relationship to user: sister"));
        assert!(prompt.contains("- Emoji usage: heavy"));
        assert!(prompt.contains("- Age range: 25-35"));
        assert!(prompt.contains("Return a JSON array of 3 persona objects."));
    }

    #[test]
    fn test_schema_lists_enum_values() {
        let schema = persona_json_schema();
        assert_eq!(schema["properties"]["emoji_usage"]["enum"][3], "heavy");
    }
}
