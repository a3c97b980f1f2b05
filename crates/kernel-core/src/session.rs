//! The construct session: one record of current state plus the bounded
//! history, perception layer, whisper runtime, and bloom coefficients.
//!
//! [`ConstructSession::step`] is the only mutating entry point. Each call
//! advances the counter exactly once and appends one record to history.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use contracts::{
    payload_from_value, ConstructState, DriftSignal, EmotionSymbol, EmotionalVector, HintField,
    Mode, PerceptionSignals, RitualSilenceGuard, SealSignal, StepPayload, TimestampValue,
    WhisperSignal,
};

use crate::bloom::{bloom_probability, chaos_from_glyph, phase_from_glyph, BLOOM_WAVE_FREQUENCY};
use crate::defaults;
use crate::perception::PerceptionLayer;
use crate::ritual::{normalize_tags, resolve_mode};
use crate::signal::{clamp, clamp01, emotion_symbol, entropy, resonance, round6};
use crate::whisper::{WhisperError, WhisperPatternRegistry, WhisperRuntime};

/// Glyph forced onto the record whenever the construct is in ritual silence.
pub const SILENCE_GLYPH: &str = "GLYPH_RITUAL_SILENCE";

const DEFAULT_HISTORY_LIMIT: i64 = 100;
const DRIFT_HORIZON_SECONDS: f64 = 2.0;

#[derive(Debug)]
pub enum StepError {
    MalformedTimestamp(String),
    Payload(serde_json::Error),
    Registry(WhisperError),
}

impl fmt::Display for StepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedTimestamp(raw) => write!(f, "cannot parse step timestamp '{raw}'"),
            Self::Payload(err) => write!(f, "malformed step payload: {err}"),
            Self::Registry(err) => write!(f, "whisper registry unavailable: {err}"),
        }
    }
}

impl std::error::Error for StepError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Payload(err) => Some(err),
            Self::Registry(err) => Some(err),
            Self::MalformedTimestamp(_) => None,
        }
    }
}

impl From<serde_json::Error> for StepError {
    fn from(err: serde_json::Error) -> Self {
        Self::Payload(err)
    }
}

impl From<WhisperError> for StepError {
    fn from(err: WhisperError) -> Self {
        Self::Registry(err)
    }
}

/// The pattern consumed on the most recent step, with its rate-limit state
/// as of that step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LastSelection {
    pub pattern: contracts::WhisperPattern,
    pub status: crate::whisper::PatternStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConstructSession {
    construct_state: ConstructState,
    history: Vec<ConstructState>,
    /// Values of zero or below disable the history cap.
    history_limit: i64,
    base_glyph: String,
    chaos_sensitivity: f64,
    phase_offset: f64,
    wave_frequency: f64,
    bloom_probability: Option<f64>,
    perception: PerceptionLayer,
    whispers: WhisperRuntime,
    last_selection: Option<LastSelection>,
}

impl ConstructSession {
    /// Bootstrap a session from the bundled demo fixtures.
    pub fn bootstrap() -> Result<Self, StepError> {
        let glyph_id = defaults::demo_glyph()
            .map(|glyph| glyph.id)
            .unwrap_or_else(|| defaults::DEMO_GLYPH_ID.to_string());
        let registry = defaults::demo_registry()?;
        Ok(Self::with_registry(
            registry,
            glyph_id,
            defaults::demo_narrative_hint(),
        ))
    }

    /// Build a session around an explicit registry and anchor glyph.
    pub fn with_registry(
        registry: WhisperPatternRegistry,
        base_glyph: String,
        narrative_hint: Option<String>,
    ) -> Self {
        let now = Utc::now();
        let construct_state = ConstructState {
            resonance: 0.5,
            drift: 0.0,
            entropy: 0.0,
            emotion_vector: EmotionSymbol::Neutral,
            glyph: base_glyph.clone(),
            mode: Mode::Awake,
            timestamp: render_timestamp(now),
            counter: 0,
            ritual_silence_guard: RitualSilenceGuard::default(),
            narrative_hint: narrative_hint
                .map(|hint| hint.trim().to_string())
                .filter(|hint| !hint.is_empty()),
        };
        Self {
            construct_state,
            history: Vec::new(),
            history_limit: DEFAULT_HISTORY_LIMIT,
            chaos_sensitivity: chaos_from_glyph(&base_glyph),
            phase_offset: phase_from_glyph(&base_glyph),
            wave_frequency: BLOOM_WAVE_FREQUENCY,
            base_glyph,
            bloom_probability: None,
            perception: PerceptionLayer::default(),
            whispers: registry.runtime(),
            last_selection: None,
        }
    }

    pub fn state(&self) -> &ConstructState {
        &self.construct_state
    }

    pub fn history(&self) -> &[ConstructState] {
        &self.history
    }

    pub fn history_limit(&self) -> i64 {
        self.history_limit
    }

    pub fn set_history_limit(&mut self, limit: i64) {
        self.history_limit = limit;
    }

    pub fn base_glyph(&self) -> &str {
        &self.base_glyph
    }

    pub fn bloom_probability(&self) -> Option<f64> {
        self.bloom_probability
    }

    pub fn last_selection(&self) -> Option<&LastSelection> {
        self.last_selection.as_ref()
    }

    pub fn perception(&self) -> &PerceptionLayer {
        &self.perception
    }

    pub fn whispers(&self) -> &WhisperRuntime {
        &self.whispers
    }

    /// Record an externally produced seal check. Steps never emit these.
    pub fn ingest_seal(&mut self, signal: SealSignal) {
        self.perception.ingest_seal(signal);
    }

    /// Step from a raw JSON payload, as received from sealed envelopes or
    /// the CLI.
    pub fn step_value(&mut self, value: &serde_json::Value) -> Result<ConstructState, StepError> {
        let payload = payload_from_value(value)?;
        self.step(&payload)
    }

    /// Advance the construct exactly one step.
    pub fn step(&mut self, payload: &StepPayload) -> Result<ConstructState, StepError> {
        let previous_resonance = self.construct_state.resonance;
        let previous_mode = self.construct_state.mode;
        let previous_guard = self.construct_state.ritual_silence_guard.clone();

        let input_text = payload.input.as_deref().unwrap_or("");
        let timestamp_dt = resolve_timestamp(payload.timestamp.as_ref())?;
        let timestamp_iso = render_timestamp(timestamp_dt);

        let step_resonance = resonance(input_text, previous_resonance);
        let mut step_drift = round6(step_resonance - previous_resonance);
        let mut step_entropy = entropy(input_text);

        let tag_list: Vec<String> = payload.tags.clone().unwrap_or_default();
        let normalized_tags = normalize_tags(tag_list.iter());
        let mode = resolve_mode(previous_mode, step_drift, step_entropy, &normalized_tags);

        let glyph = resolve_glyph(&self.base_glyph, mode, payload.glyph.as_deref());
        let drift_sign = if step_drift >= 0.0 { 1.0 } else { -1.0 };

        let epoch = epoch_seconds(timestamp_dt);
        let signals = PerceptionSignals {
            whisper: Some(WhisperSignal {
                timestamp: epoch,
                emotional_vector: EmotionalVector {
                    valence: clamp(step_resonance * 2.0 - 1.0, -1.0, 1.0),
                    arousal: clamp01(step_resonance),
                    tension: Some(step_entropy),
                },
                intensity: clamp01(step_resonance),
                tags: tag_list.clone(),
                narrative_entropy: step_entropy,
            }),
            drift: Some(DriftSignal {
                timestamp: epoch,
                predicted_drift: clamp01(step_drift.abs()),
                predicted_curl: clamp01(step_entropy),
                horizon_seconds: DRIFT_HORIZON_SECONDS,
            }),
            seal: None,
        };
        self.perception.ingest_signals(signals);

        if let Some(latest) = self.perception.latest_drift() {
            step_drift = round6((step_drift.abs() + latest.predicted_drift) / 2.0) * drift_sign;
        }
        if let Some(latest) = self.perception.latest_whisper() {
            step_entropy = round6((step_entropy + latest.narrative_entropy) / 2.0);
        }

        let forecast = self.perception.forecast();
        let predicted_resonance = clamp01((forecast.valence + 1.0) / 2.0);
        let predicted_entropy = forecast.tension;

        let emotion = payload
            .emotion_vector
            .unwrap_or_else(|| emotion_symbol(predicted_resonance, predicted_entropy, mode));

        let counter = self.construct_state.counter + 1;

        let raw_tags: BTreeSet<String> = tag_list.iter().cloned().collect();
        self.last_selection = match self.whispers.select(
            Some(step_drift),
            &raw_tags,
            Some(&glyph),
            Some(counter),
            Some(timestamp_dt),
            true,
        ) {
            Some(pattern) => {
                let status = self.whispers.status(&pattern.id)?.clone();
                Some(LastSelection { pattern, status })
            }
            None => None,
        };

        let guard = next_guard(mode, &previous_guard, counter);

        let narrative_hint = match &payload.narrative_hint {
            HintField::Absent => self.construct_state.narrative_hint.clone(),
            HintField::Cleared => None,
            HintField::Set(value) => {
                let trimmed = value.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_string())
                }
            }
        };

        if mode != previous_mode {
            debug!(%mode, previous = %previous_mode, counter, "construct mode changed");
        }

        self.construct_state = ConstructState {
            resonance: step_resonance,
            drift: step_drift,
            entropy: step_entropy,
            emotion_vector: emotion,
            glyph,
            mode,
            timestamp: timestamp_iso,
            counter,
            ritual_silence_guard: guard,
            narrative_hint,
        };

        self.bloom_probability = Some(round6(bloom_probability(
            step_drift.abs(),
            timestamp_dt,
            self.chaos_sensitivity,
            self.wave_frequency,
            self.phase_offset,
        )));

        self.history.push(self.construct_state.clone());
        if self.history_limit > 0 && self.history.len() > self.history_limit as usize {
            let excess = self.history.len() - self.history_limit as usize;
            self.history.drain(..excess);
        }

        Ok(self.construct_state.clone())
    }
}

fn resolve_glyph(base_glyph: &str, mode: Mode, payload_glyph: Option<&str>) -> String {
    if mode == Mode::RitualSilence {
        return SILENCE_GLYPH.to_string();
    }
    match payload_glyph {
        Some(glyph) if !glyph.is_empty() => glyph.to_string(),
        _ => base_glyph.to_string(),
    }
}

fn next_guard(mode: Mode, previous: &RitualSilenceGuard, counter: u64) -> RitualSilenceGuard {
    if mode != Mode::RitualSilence {
        return RitualSilenceGuard::default();
    }
    if previous.engaged {
        RitualSilenceGuard {
            engaged: true,
            since_counter: previous.since_counter.or(Some(counter)),
            heartbeat: previous.heartbeat + 1,
        }
    } else {
        RitualSilenceGuard {
            engaged: true,
            since_counter: Some(counter),
            heartbeat: 0,
        }
    }
}

fn render_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn epoch_seconds(timestamp: DateTime<Utc>) -> f64 {
    timestamp.timestamp() as f64 + f64::from(timestamp.timestamp_subsec_micros()) / 1e6
}

fn resolve_timestamp(value: Option<&TimestampValue>) -> Result<DateTime<Utc>, StepError> {
    match value {
        None => Ok(Utc::now()),
        Some(TimestampValue::Iso(raw)) => {
            if raw.is_empty() {
                return Ok(Utc::now());
            }
            contracts::parse_iso_timestamp(raw)
                .map(|parsed| parsed.with_timezone(&Utc))
                .map_err(|_| StepError::MalformedTimestamp(raw.clone()))
        }
        Some(TimestampValue::Epoch(epoch)) => {
            if !epoch.is_finite() {
                return Err(StepError::MalformedTimestamp(epoch.to_string()));
            }
            let seconds = epoch.div_euclid(1.0) as i64;
            let nanos = (epoch.rem_euclid(1.0) * 1e9).round().min(999_999_999.0) as u32;
            DateTime::<Utc>::from_timestamp(seconds, nanos)
                .ok_or_else(|| StepError::MalformedTimestamp(epoch.to_string()))
        }
    }
}
