//! Realistic timestamp synthesis for generated conversations.
//!
//! Roughly 70% of messages are grouped into back-and-forth sessions spread across
//! the window; the rest are scattered. Every random instant is biased toward waking
//! hours by rejection sampling against [`CIRCADIAN_WEIGHTS`]. The output is a sorted
//! list of Apple-epoch nanoseconds and is fully reproducible for a given seed.

use chrono::{DateTime, Duration, Timelike, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::error::{FoundryError, Result};
use crate::models::{Persona, ResponseTime};
use crate::utils::datetime_to_apple_ns;

/// Hour bands `[start, end)` and their acceptance probability.
pub const CIRCADIAN_WEIGHTS: [(u32, u32, f64); 9] = [
    (0, 6, 0.05),
    (6, 8, 0.30),
    (8, 9, 0.70),
    (9, 12, 0.90),
    (12, 14, 0.80),
    (14, 18, 0.95),
    (18, 21, 1.00),
    (21, 23, 0.70),
    (23, 24, 0.30),
];

/// Rejection-sampling attempts before falling back to a uniform draw.
pub const MAX_WEIGHTED_ATTEMPTS: usize = 50;

/// Tuning knobs for session planning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimestampConfig {
    /// Share of messages placed inside sessions
    pub session_ratio: f64,
    /// Smallest session
    pub min_session_size: usize,
    /// Largest session
    pub max_session_size: usize,
    /// Lower bound of the in-session gap for ordinary responders
    pub min_session_gap_seconds: i64,
    /// Upper bound of the in-session gap for ordinary responders
    pub max_session_gap_seconds: i64,
}

impl Default for TimestampConfig {
    fn default() -> Self {
        Self {
            session_ratio: 0.70,
            min_session_size: 5,
            max_session_size: 30,
            min_session_gap_seconds: 30,
            max_session_gap_seconds: 300,
        }
    }
}

/// A planned burst of messages. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    /// Offset within the session-message subsequence
    pub start_index: usize,
    /// Number of messages in the burst
    pub size: usize,
}

/// RNG used by every synthesis step: seeded when a seed is given.
#[must_use]
pub fn rng_from_seed(seed: Option<u64>) -> StdRng {
    seed.map_or_else(StdRng::from_entropy, StdRng::seed_from_u64)
}

/// Check that `[start, end)` can hold `count` messages one second apart.
pub fn validate_window(start: DateTime<Utc>, end: DateTime<Utc>, count: usize) -> Result<()> {
    if end <= start {
        return Err(FoundryError::validation("end must be after start"));
    }

    let window_seconds = (end - start).num_milliseconds() as f64 / 1000.0;
    if window_seconds < count as f64 {
        return Err(FoundryError::validation(format!(
            "Time range too short for message count: {count} messages need at least {count} seconds, window is {window_seconds:.0}s"
        )));
    }

    Ok(())
}

/// Generate `count` sorted Apple-epoch timestamps in `[start, end)`.
pub fn generate_timestamps(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    count: usize,
    personas: &[Persona],
    seed: Option<u64>,
) -> Result<Vec<i64>> {
    generate_timestamps_with_config(start, end, count, personas, seed, &TimestampConfig::default())
}

/// [`generate_timestamps`] with explicit session tuning.
pub fn generate_timestamps_with_config(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    count: usize,
    personas: &[Persona],
    seed: Option<u64>,
    config: &TimestampConfig,
) -> Result<Vec<i64>> {
    if count == 0 {
        return Ok(Vec::new());
    }
    validate_window(start, end, count)?;

    let mut rng = rng_from_seed(seed);
    let sessions = plan_sessions(count, config, &mut rng);

    let mut instants = session_instants(start, end, &sessions, personas, config, &mut rng);
    let scattered = count - instants.len();
    instants.extend((0..scattered).map(|_| pick_weighted_time(start, end, &mut rng)));
    instants.sort_unstable();

    debug!(
        count,
        sessions = sessions.len(),
        scattered,
        "Synthesized conversation timestamps"
    );

    Ok(instants.into_iter().map(datetime_to_apple_ns).collect())
}

/// Greedily split the session share of `count` into bursts.
///
/// Messages left over once fewer than `min_session_size` remain are not planned;
/// the caller scatters them.
pub fn plan_sessions<R: Rng + ?Sized>(count: usize, config: &TimestampConfig, rng: &mut R) -> Vec<Session> {
    let min_size = config.min_session_size.max(1);
    let max_size = config.max_session_size.max(min_size);
    let mut remaining = (count as f64 * config.session_ratio) as usize;

    let mut sessions = Vec::new();
    let mut start_index = 0;
    while remaining >= min_size {
        let size = rng.gen_range(min_size..=max_size.min(remaining));
        sessions.push(Session { start_index, size });
        start_index += size;
        remaining -= size;
    }
    sessions
}

fn span_nanos(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    (end - start).num_nanoseconds().unwrap_or(i64::MAX) as f64
}

fn session_instants<R: Rng + ?Sized>(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    sessions: &[Session],
    personas: &[Persona],
    config: &TimestampConfig,
    rng: &mut R,
) -> Vec<DateTime<Utc>> {
    if sessions.is_empty() {
        return Vec::new();
    }

    let slot = span_nanos(start, end) / (sessions.len() + 1) as f64;
    let latest = end - Duration::nanoseconds(1);

    let mut instants = Vec::with_capacity(sessions.iter().map(|s| s.size).sum());
    for (i, session) in sessions.iter().enumerate() {
        let slot_start = start + Duration::nanoseconds((slot * i as f64) as i64);
        let slot_end = start + Duration::nanoseconds((slot * (i + 1) as f64) as i64);
        let mut current = pick_weighted_time(slot_start, slot_end.max(slot_start + Duration::nanoseconds(1)), rng);
        instants.push(current.min(latest));

        for step in 1..session.size {
            let persona = if personas.is_empty() {
                None
            } else {
                Some(&personas[step % personas.len()])
            };
            current += session_delay(persona, config, rng);
            instants.push(current.min(latest));
        }
    }
    instants
}

fn session_delay<R: Rng + ?Sized>(persona: Option<&Persona>, config: &TimestampConfig, rng: &mut R) -> Duration {
    // Slow responders still answer within minutes once a session is underway
    let base = match persona.map(|p| p.typical_response_time) {
        Some(ResponseTime::Instant) => rng.gen_range(5..=45),
        Some(ResponseTime::Days) => rng.gen_range(60..=180),
        _ => rng.gen_range(config.min_session_gap_seconds..=config.max_session_gap_seconds),
    };
    let jitter: f64 = rng.gen_range(0.7..1.3);
    Duration::seconds((base as f64 * jitter) as i64)
}

/// Acceptance probability for an hour of the day.
#[must_use]
pub fn circadian_weight(hour: u32) -> f64 {
    CIRCADIAN_WEIGHTS
        .iter()
        .find(|(from, to, _)| (*from..*to).contains(&hour))
        .map_or(0.5, |(_, _, weight)| *weight)
}

/// Pick an instant in `[start, end)` biased toward waking hours.
pub fn pick_weighted_time<R: Rng + ?Sized>(start: DateTime<Utc>, end: DateTime<Utc>, rng: &mut R) -> DateTime<Utc> {
    let span = span_nanos(start, end);
    for _ in 0..MAX_WEIGHTED_ATTEMPTS {
        let candidate = start + Duration::nanoseconds(rng.gen_range(0.0..span) as i64);
        if rng.gen::<f64>() < circadian_weight(candidate.hour()) {
            return candidate;
        }
    }
    start + Duration::nanoseconds(rng.gen_range(0.0..span) as i64)
}

/// Inclusive base range in seconds for a one-off reply delay.
#[must_use]
pub const fn response_time_range(response_time: ResponseTime) -> (i64, i64) {
    match response_time {
        ResponseTime::Instant => (5, 60),
        ResponseTime::Minutes => (60, 600),
        ResponseTime::Hours => (1800, 14_400),
        ResponseTime::Days => (43_200, 172_800),
    }
}

/// A single human reply delay for live pacing, with ±20% jitter.
pub fn get_response_delay<R: Rng + ?Sized>(persona: &Persona, rng: &mut R) -> Duration {
    let (min, max) = response_time_range(persona.typical_response_time);
    let base = rng.gen_range(min..=max);
    let jitter: f64 = rng.gen_range(0.8..1.2);
    Duration::seconds((base as f64 * jitter) as i64)
}
