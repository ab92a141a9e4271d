//! Generation metrics.
//!
//! Everything goes through the `metrics` facade so any installed recorder picks it
//! up. [`GenerationMetrics`] also keeps local tallies for the run summary and tests.

use metrics::{counter, histogram};
use std::time::Duration;

/// Successful LLM batches, by provider
pub const BATCHES_TOTAL: &str = "foundry_llm_batches_total";
/// Messages received from providers
pub const MESSAGES_GENERATED_TOTAL: &str = "foundry_messages_generated_total";
/// Failed provider calls, by provider and kind
pub const PROVIDER_FAILURES_TOTAL: &str = "foundry_provider_failures_total";
/// Seconds per LLM batch
pub const BATCH_DURATION: &str = "foundry_llm_batch_duration_seconds";
/// Seconds per database write pass
pub const DB_WRITE_DURATION: &str = "foundry_db_write_duration_seconds";
/// Messages written to `chat.db`
pub const MESSAGES_WRITTEN_TOTAL: &str = "foundry_messages_written_total";

/// Per-run metric tallies
#[derive(Debug, Default, Clone, PartialEq)]
pub struct GenerationMetrics {
    /// Successful LLM batches
    pub batches: usize,
    /// Messages received, before truncation
    pub messages_generated: usize,
    /// Failed provider calls
    pub provider_failures: usize,
    /// Messages written to the database
    pub messages_written: usize,
    /// Time spent waiting on the provider
    pub llm_time: Duration,
    /// Time spent writing messages
    pub write_time: Duration,
}

impl GenerationMetrics {
    /// Empty tallies
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// One successful LLM batch
    pub fn record_batch(&mut self, provider: &str, received: usize, duration: Duration) {
        self.batches += 1;
        self.messages_generated += received;
        self.llm_time += duration;

        counter!(BATCHES_TOTAL, "provider" => provider.to_string()).increment(1);
        counter!(MESSAGES_GENERATED_TOTAL, "provider" => provider.to_string()).increment(received as u64);
        histogram!(BATCH_DURATION, "provider" => provider.to_string()).record(duration.as_secs_f64());
    }

    /// A failed provider call
    pub fn record_provider_failure(&mut self, provider: &str, kind: &'static str) {
        self.provider_failures += 1;
        counter!(PROVIDER_FAILURES_TOTAL, "provider" => provider.to_string(), "kind" => kind).increment(1);
    }

    /// One database write pass
    pub fn record_write(&mut self, count: usize, duration: Duration) {
        self.messages_written += count;
        self.write_time += duration;

        counter!(MESSAGES_WRITTEN_TOTAL).increment(count as u64);
        histogram!(DB_WRITE_DURATION).record(duration.as_secs_f64());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tallies_accumulate() {
        let mut metrics = GenerationMetrics::new();
        metrics.record_batch("mock", 30, Duration::from_millis(10));
        metrics.record_batch("mock", 20, Duration::from_millis(15));
        metrics.record_provider_failure("mock", "malformed");
        metrics.record_write(50, Duration::from_millis(3));

        assert_eq!(metrics.batches, 2);
        assert_eq!(metrics.messages_generated, 50);
        assert_eq!(metrics.provider_failures, 1);
        assert_eq!(metrics.messages_written, 50);
        assert_eq!(metrics.llm_time, Duration::from_millis(25));
    }
}
