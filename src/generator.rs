//! Conversation generation orchestrator.
//!
//! Drives one run end to end: validation, provider check, handle and chat
//! registration, batched LLM calls with a rolling context window, sender
//! assignment, timestamp synthesis and the final database write.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::LlmConfig;
use crate::db::{BatchMessage, DatabaseBuilder, NewAttachment};
use crate::error::{FoundryError, Result};
use crate::llm::{LlmProvider, MessageRequest};
use crate::logging::OperationTimer;
use crate::metrics::GenerationMetrics;
use crate::models::{ChatType, ConversationConfig, GeneratedMessage, Persona, PersonaDescription, TimestampedMessage};
use crate::seeding::{parse_seed, pick_shift_topic, should_shift_topic};
use crate::timestamps::{generate_timestamps, rng_from_seed};
use crate::validation::InputValidator;

/// Mixed into the run seed so topic decisions do not mirror timestamp draws
const TOPIC_RNG_SALT: u64 = 0x5eed_70b1c;

/// Synchronous progress sink
pub type ProgressCallback<'a> = &'a mut (dyn FnMut(&GenerationProgress) + Send);

/// Tuning for the batch loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeneratorOptions {
    /// Largest number of messages asked for in one LLM call
    pub batch_size: usize,
    /// How many recent messages each request carries as context
    pub context_window_size: usize,
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        Self {
            batch_size: 30,
            context_window_size: 15,
        }
    }
}

impl From<&LlmConfig> for GeneratorOptions {
    fn from(config: &LlmConfig) -> Self {
        Self {
            batch_size: config.message_batch_size,
            context_window_size: config.context_window_size,
        }
    }
}

/// Stage of a generation run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationPhase {
    /// Validating input and checking the provider
    Initializing,
    /// Requesting message batches
    Generating,
    /// Synthesizing timestamps
    AssigningTimestamps,
    /// Writing rows to the database
    WritingDatabase,
    /// Run finished
    Complete,
    /// Run stopped with an error
    Failed,
}

impl GenerationPhase {
    /// Snake-case phase name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Initializing => "initializing",
            Self::Generating => "generating",
            Self::AssigningTimestamps => "assigning_timestamps",
            Self::WritingDatabase => "writing_database",
            Self::Complete => "complete",
            Self::Failed => "failed",
        }
    }
}

/// Snapshot handed to the progress callback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationProgress {
    /// Current stage
    pub phase: GenerationPhase,
    /// Messages received so far
    pub generated_messages: usize,
    /// Requested message count
    pub total_messages: usize,
    /// Batches completed so far
    pub current_batch: usize,
    /// Expected number of batches
    pub total_batches: usize,
    last_percent: f64,
}

impl GenerationProgress {
    fn new(total_messages: usize, total_batches: usize) -> Self {
        Self {
            phase: GenerationPhase::Initializing,
            generated_messages: 0,
            total_messages,
            current_batch: 0,
            total_batches,
            last_percent: 0.0,
        }
    }

    /// Overall completion in percent.
    ///
    /// Message generation fills the first 80 points. A failed run reports the
    /// last value reached before the failure.
    #[must_use]
    pub fn percent_complete(&self) -> f64 {
        match self.phase {
            GenerationPhase::Initializing => 0.0,
            GenerationPhase::Generating if self.total_messages == 0 => 0.0,
            GenerationPhase::Generating => {
                (self.generated_messages as f64 / self.total_messages as f64).min(1.0) * 80.0
            }
            GenerationPhase::AssigningTimestamps => 85.0,
            GenerationPhase::WritingDatabase => 90.0,
            GenerationPhase::Complete => 100.0,
            GenerationPhase::Failed => self.last_percent,
        }
    }
}

struct ProgressTracker<'a> {
    progress: GenerationProgress,
    callback: Option<ProgressCallback<'a>>,
}

impl<'a> ProgressTracker<'a> {
    fn new(total_messages: usize, batch_size: usize, callback: Option<ProgressCallback<'a>>) -> Self {
        Self {
            progress: GenerationProgress::new(total_messages, total_messages.div_ceil(batch_size.max(1))),
            callback,
        }
    }

    fn enter(&mut self, phase: GenerationPhase) {
        self.progress.phase = phase;
        if phase != GenerationPhase::Failed {
            self.progress.last_percent = self.progress.percent_complete();
        }
        self.notify();
    }

    fn batch_done(&mut self, batch: usize, generated: usize, batch_size: usize) {
        let remaining = self.progress.total_messages.saturating_sub(generated);
        self.progress.current_batch = batch;
        self.progress.generated_messages = generated;
        self.progress.total_batches = self
            .progress
            .total_batches
            .max(batch + remaining.div_ceil(batch_size.max(1)));
        self.enter(GenerationPhase::Generating);
    }

    fn notify(&mut self) {
        if let Some(callback) = self.callback.as_deref_mut() {
            callback(&self.progress);
        }
    }
}

/// Outcome of a run persisted to a database
#[derive(Debug, Clone)]
pub struct GenerationResult {
    /// Messages in conversational order with their timestamps
    pub messages: Vec<TimestampedMessage>,
    /// ROWID of the created chat
    pub chat_id: i64,
    /// Wall-clock duration of the run
    pub generation_time: Duration,
    /// Name of the provider that produced the text
    pub llm_provider_used: String,
    /// Tallies for this run
    pub metrics: GenerationMetrics,
}

/// Maps LLM sender ids onto participants
struct SenderAssigner<'p> {
    participants: &'p [&'p Persona],
    self_persona: &'p Persona,
    counterparts: Vec<&'p Persona>,
    next_counterpart: usize,
}

impl<'p> SenderAssigner<'p> {
    fn new(participants: &'p [&'p Persona]) -> Result<Self> {
        let self_persona = participants
            .iter()
            .copied()
            .find(|p| p.is_self)
            .ok_or_else(|| FoundryError::validation("No self persona among participants"))?;
        let counterparts: Vec<&Persona> = participants.iter().copied().filter(|p| !p.is_self).collect();
        if counterparts.is_empty() {
            return Err(FoundryError::validation("Conversation has no counterpart persona"));
        }
        Ok(Self {
            participants,
            self_persona,
            counterparts,
            next_counterpart: 0,
        })
    }

    fn resolve(&self, sender_id: &str) -> Option<&'p Persona> {
        let sender_id = sender_id.trim();
        self.participants
            .iter()
            .copied()
            .find(|p| p.id == sender_id)
            .or_else(|| self.participants.iter().copied().find(|p| p.name.eq_ignore_ascii_case(sender_id)))
    }

    fn assign(&mut self, mut message: GeneratedMessage) -> GeneratedMessage {
        let persona = match self.resolve(&message.sender_id) {
            Some(persona) => persona,
            None if message.is_from_me => self.self_persona,
            None => {
                let persona = self.counterparts[self.next_counterpart % self.counterparts.len()];
                self.next_counterpart += 1;
                debug!(sender_id = %message.sender_id, assigned = %persona.id, "Unknown sender reassigned");
                persona
            }
        };
        message.sender_id.clone_from(&persona.id);
        message.is_from_me = persona.is_self;
        message.text = InputValidator::sanitize_text(&message.text);
        message
    }
}

/// Drives LLM batches into a timestamped conversation
pub struct ConversationGenerator {
    provider: Arc<dyn LlmProvider>,
    options: GeneratorOptions,
    cancel: CancellationToken,
}

impl ConversationGenerator {
    /// Generator over `provider` with its own cancellation token
    pub fn new(provider: Arc<dyn LlmProvider>, options: GeneratorOptions) -> Self {
        Self {
            provider,
            options,
            cancel: CancellationToken::new(),
        }
    }

    /// Use an externally owned cancellation token
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token that cancels this generator between batches
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Name of the provider in use
    pub fn provider_name(&self) -> String {
        self.provider.name()
    }

    /// Generate a conversation and write it through `writer`.
    ///
    /// The writer is never finalized here; the caller owns its lifecycle.
    pub async fn generate_to_database(
        &self,
        personas: &[Persona],
        config: &ConversationConfig,
        writer: &mut DatabaseBuilder,
        progress: Option<ProgressCallback<'_>>,
    ) -> Result<GenerationResult> {
        let timer = OperationTimer::new("generate_to_database");
        let started = Instant::now();
        let mut tracker = ProgressTracker::new(config.message_count_target, self.options.batch_size, progress);
        tracker.enter(GenerationPhase::Initializing);

        let mut metrics = GenerationMetrics::new();
        match self.run_to_database(personas, config, writer, &mut tracker, &mut metrics).await {
            Ok((messages, chat_id)) => {
                tracker.enter(GenerationPhase::Complete);
                timer.finish();
                let result = GenerationResult {
                    messages,
                    chat_id,
                    generation_time: started.elapsed(),
                    llm_provider_used: self.provider.name(),
                    metrics,
                };
                info!(
                    chat_id,
                    messages = result.messages.len(),
                    batches = result.metrics.batches,
                    elapsed_ms = result.generation_time.as_millis(),
                    provider = %result.llm_provider_used,
                    "Conversation generated"
                );
                Ok(result)
            }
            Err(err) => {
                tracker.enter(GenerationPhase::Failed);
                error!(error = %err, "Conversation generation failed");
                Err(err)
            }
        }
    }

    /// Generate a conversation without touching a database
    pub async fn generate_conversation(
        &self,
        personas: &[Persona],
        config: &ConversationConfig,
        progress: Option<ProgressCallback<'_>>,
    ) -> Result<Vec<TimestampedMessage>> {
        let timer = OperationTimer::new("generate_conversation");
        let mut tracker = ProgressTracker::new(config.message_count_target, self.options.batch_size, progress);
        tracker.enter(GenerationPhase::Initializing);

        let mut metrics = GenerationMetrics::new();
        let outcome = async {
            let participants = self.prepare(personas, config).await?;
            let generated = self.collect_messages(&participants, config, &mut tracker, &mut metrics).await?;
            tracker.enter(GenerationPhase::AssigningTimestamps);
            assign_timestamps(generated, &participants, config)
        }
        .await;

        match outcome {
            Ok(messages) => {
                tracker.enter(GenerationPhase::Complete);
                timer.finish();
                Ok(messages)
            }
            Err(err) => {
                tracker.enter(GenerationPhase::Failed);
                error!(error = %err, "Conversation generation failed");
                Err(err)
            }
        }
    }

    async fn run_to_database(
        &self,
        personas: &[Persona],
        config: &ConversationConfig,
        writer: &mut DatabaseBuilder,
        tracker: &mut ProgressTracker<'_>,
        metrics: &mut GenerationMetrics,
    ) -> Result<(Vec<TimestampedMessage>, i64)> {
        let participants = self.prepare(personas, config).await?;

        let handles = register_handles(&participants, config, writer)?;
        let chat_handles: Vec<i64> = participants.iter().filter_map(|p| handles.get(p.id.as_str()).copied()).collect();
        let direct_identifier = match config.chat_type {
            ChatType::Direct => participants.iter().find(|p| !p.is_self).map(|p| p.identifier.as_str()),
            ChatType::Group => None,
        };
        let chat_id = writer.create_chat(&chat_handles, config.chat_type, config.service, None, direct_identifier)?;
        info!(chat_id, participants = participants.len(), chat_type = ?config.chat_type, "Chat created");

        let generated = self.collect_messages(&participants, config, tracker, metrics).await?;

        tracker.enter(GenerationPhase::AssigningTimestamps);
        let messages = assign_timestamps(generated, &participants, config)?;

        tracker.enter(GenerationPhase::WritingDatabase);
        let write_started = Instant::now();
        let batch: Vec<BatchMessage> = messages
            .iter()
            .map(|tm| BatchMessage {
                handle_id: if tm.message.is_from_me {
                    None
                } else {
                    handles.get(tm.message.sender_id.as_str()).copied()
                },
                text: tm.message.text.clone(),
                is_from_me: tm.message.is_from_me,
                date: tm.timestamp,
            })
            .collect();
        let rowids = writer.add_messages_batch(chat_id, &batch, config.service)?;

        for (rowid, tm) in rowids.iter().zip(&messages) {
            let Some(hint) = &tm.message.attachment else {
                continue;
            };
            writer.add_attachment(
                *rowid,
                NewAttachment {
                    filename: hint.filename.clone(),
                    uti: hint.uti.clone(),
                    mime_type: hint.mime_type.clone(),
                    total_bytes: hint.total_bytes,
                    is_outgoing: tm.message.is_from_me,
                    created_date: Some(tm.timestamp),
                    guid: None,
                },
            )?;
        }
        metrics.record_write(rowids.len(), write_started.elapsed());

        Ok((messages, chat_id))
    }

    /// Validation and the availability check, before any side effect
    async fn prepare<'a>(&self, personas: &'a [Persona], config: &ConversationConfig) -> Result<Vec<&'a Persona>> {
        InputValidator::validate_batch_size(self.options.batch_size)?;
        let participants = InputValidator::validate_conversation(config, personas)?;

        if !self.provider.is_available().await {
            return Err(FoundryError::ProviderUnavailable {
                provider: self.provider.name(),
                guidance: "Run `foundry providers` to see which providers are configured and reachable".to_string(),
            });
        }
        Ok(participants)
    }

    async fn collect_messages(
        &self,
        participants: &[&Persona],
        config: &ConversationConfig,
        tracker: &mut ProgressTracker<'_>,
        metrics: &mut GenerationMetrics,
    ) -> Result<Vec<GeneratedMessage>> {
        let target = config.message_count_target;
        let batch_size = self.options.batch_size;
        let provider_name = self.provider.name();
        let descriptions: Vec<PersonaDescription> = participants.iter().map(|p| p.describe()).collect();
        let roster: Vec<Persona> = participants.iter().map(|p| (*p).clone()).collect();

        let seed = parse_seed(config.seed.as_deref());
        let mut themes = seed.themes.clone();
        let mut rng = rng_from_seed(config.random_seed.map(|s| s ^ TOPIC_RNG_SALT));
        let mut shift_topic: Option<String> = None;
        let mut assigner = SenderAssigner::new(participants)?;

        let mut messages: Vec<GeneratedMessage> = Vec::with_capacity(target);
        let mut batch_index = 0;
        tracker.enter(GenerationPhase::Generating);
        while messages.len() < target {
            if self.cancel.is_cancelled() {
                warn!(generated = messages.len(), target, "Generation cancelled");
                return Err(FoundryError::Cancelled);
            }

            batch_index += 1;
            let remaining = target - messages.len();
            let request = MessageRequest {
                personas: descriptions.clone(),
                context: messages[messages.len().saturating_sub(self.options.context_window_size)..].to_vec(),
                count: batch_size.min(remaining),
                seed: seed.prompt_hint(shift_topic.as_deref()),
            };
            debug!(batch = batch_index, count = request.count, context = request.context.len(), "Requesting batch");

            let batch_started = Instant::now();
            let batch = match self.provider.generate_messages(&request).await {
                Ok(batch) if batch.is_empty() => {
                    metrics.record_provider_failure(&provider_name, "empty");
                    return Err(FoundryError::malformed(
                        format!("provider returned an empty batch (batch {batch_index})"),
                        "[]",
                    ));
                }
                Ok(batch) => batch,
                Err(err) => {
                    metrics.record_provider_failure(&provider_name, failure_kind(&err));
                    return Err(err);
                }
            };
            if batch.len() > remaining {
                debug!(received = batch.len(), kept = remaining, "Truncating surplus messages");
            }
            metrics.record_batch(&provider_name, batch.len(), batch_started.elapsed());

            let before = messages.len();
            messages.extend(batch.into_iter().take(remaining).map(|m| assigner.assign(m)));
            tracker.batch_done(batch_index, messages.len(), batch_size);

            if (before..messages.len()).any(|index| should_shift_topic(index, target, &mut rng)) {
                if let Some(previous) = shift_topic.take() {
                    themes.push(previous);
                }
                shift_topic = pick_shift_topic(&roster, &themes, &mut rng);
                if let Some(topic) = &shift_topic {
                    info!(topic = %topic, at = messages.len(), "Shifting conversation topic");
                }
            }
        }

        Ok(messages)
    }
}

const fn failure_kind(err: &FoundryError) -> &'static str {
    match err {
        FoundryError::MalformedResponse { .. } => "malformed",
        FoundryError::ProviderUnavailable { .. } => "unavailable",
        FoundryError::Http(_) => "http",
        _ => "other",
    }
}

/// Counterparts first, then the self persona
fn register_handles<'a>(
    participants: &[&'a Persona],
    config: &ConversationConfig,
    writer: &mut DatabaseBuilder,
) -> Result<HashMap<&'a str, i64>> {
    let mut handles = HashMap::with_capacity(participants.len());
    let ordered = participants
        .iter()
        .copied()
        .filter(|p| !p.is_self)
        .chain(participants.iter().copied().filter(|p| p.is_self));
    for persona in ordered {
        let rowid = writer.add_handle_from_persona(persona, config.service)?;
        handles.insert(persona.id.as_str(), rowid);
    }
    Ok(handles)
}

fn assign_timestamps(
    messages: Vec<GeneratedMessage>,
    participants: &[&Persona],
    config: &ConversationConfig,
) -> Result<Vec<TimestampedMessage>> {
    let roster: Vec<Persona> = participants.iter().map(|p| (*p).clone()).collect();
    let timestamps = generate_timestamps(
        config.time_range_start,
        config.time_range_end,
        messages.len(),
        &roster,
        config.random_seed,
    )?;
    Ok(messages
        .into_iter()
        .zip(timestamps)
        .map(|(message, timestamp)| TimestampedMessage { message, timestamp })
        .collect())
}
