//! Conversation seeds and topic drift.
//!
//! A free-text seed such as `"planning a weekend trip"` becomes a set of themes
//! plus an opening context for the LLM. While a long conversation is generated,
//! [`should_shift_topic`] occasionally lets it drift onto something one of the
//! participants cares about.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::models::Persona;

/// Maximum number of themes extracted from a seed.
pub const MAX_THEMES: usize = 5;

/// Conversations shorter than this never drift.
pub const MIN_MESSAGES_FOR_SHIFT: usize = 20;

/// Parsed conversation seed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSeed {
    /// Trimmed seed text, if any
    pub raw_seed: Option<String>,
    /// Key words taken from the seed
    pub themes: Vec<String>,
    /// Context the conversation opens with
    pub opening_context: Option<String>,
}

impl ConversationSeed {
    /// True when no seed text was supplied
    #[must_use]
    pub const fn is_unset(&self) -> bool {
        self.raw_seed.is_none()
    }

    /// Render the seed text for a message-generation prompt.
    ///
    /// A topic shift, when present, is appended as a steering hint.
    #[must_use]
    pub fn prompt_hint(&self, shift_topic: Option<&str>) -> Option<String> {
        match (self.opening_context.as_deref(), shift_topic) {
            (Some(context), Some(topic)) => Some(format!(
                "{context}. The conversation naturally drifts toward {topic}."
            )),
            (Some(context), None) => Some(context.to_string()),
            (None, Some(topic)) => Some(format!("The conversation naturally drifts toward {topic}.")),
            (None, None) => None,
        }
    }
}

/// Parse a free-text seed into themes and an opening context.
#[must_use]
pub fn parse_seed(raw: Option<&str>) -> ConversationSeed {
    let Some(text) = raw.map(str::trim).filter(|text| !text.is_empty()) else {
        return ConversationSeed::default();
    };

    let themes = text
        .split_whitespace()
        .filter(|word| word.chars().count() > 3)
        .take(MAX_THEMES)
        .map(str::to_string)
        .collect();

    ConversationSeed {
        raw_seed: Some(text.to_string()),
        themes,
        opening_context: Some(text.to_string()),
    }
}

/// Decide whether the conversation should change topic at `index` of `total`.
///
/// Only the middle of a conversation drifts, and the center of it most often.
pub fn should_shift_topic<R: Rng + ?Sized>(index: usize, total: usize, rng: &mut R) -> bool {
    if total < MIN_MESSAGES_FOR_SHIFT {
        return false;
    }

    let progress = index as f64 / total as f64;
    if progress <= 0.2 || progress > 0.9 {
        return false;
    }

    let probability = if (0.4..=0.6).contains(&progress) { 0.05 } else { 0.02 };
    rng.gen::<f64>() < probability
}

/// Pick a persona interest not already among the current themes.
pub fn pick_shift_topic<R: Rng + ?Sized>(
    personas: &[Persona],
    current_themes: &[String],
    rng: &mut R,
) -> Option<String> {
    let current: Vec<String> = current_themes.iter().map(|t| t.to_lowercase()).collect();

    // Repeats stay in, so an interest shared by several people is drawn more often
    let candidates: Vec<&String> = personas
        .iter()
        .flat_map(|p| p.topics_of_interest.iter())
        .filter(|topic| !current.contains(&topic.to_lowercase()))
        .collect();

    candidates.choose(rng).map(|topic| (*topic).clone())
}
