//! v1 cross-boundary contracts for the construct kernel, CLI, and run log.

use std::fmt;

use chrono::{DateTime, FixedOffset};
use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub mod perception;
pub mod whisper;

pub use perception::{
    DriftSignal, EmotionalVector, ForecastVector, PerceptionOptions, PerceptionSignals, SealSignal,
    WhisperSignal,
};
pub use whisper::{
    CooldownSpec, DriftPredicate, GlyphEntry, GlyphRegistryFile, NarrativeHintFile,
    PatternSelectors, WhisperPattern, WhisperRegistryFile,
};

pub const CONSTRUCT_STATE_VERSION: &str = "1.2";
pub const WHISPER_PATTERN_VERSION: &str = "1.3";

/// Maximum trimmed length for a narrative hint, in characters.
pub const NARRATIVE_HINT_MAX_CHARS: usize = 280;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Mode {
    Awake,
    Dream,
    Sleep,
    RitualSilence,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Awake => "AWAKE",
            Self::Dream => "DREAM",
            Self::Sleep => "SLEEP",
            Self::RitualSilence => "RITUAL_SILENCE",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum EmotionSymbol {
    #[serde(rename = "⚪")]
    Neutral,
    #[serde(rename = "🔇")]
    Muted,
    #[serde(rename = "🌑")]
    Void,
    #[serde(rename = "🌀")]
    Chaos,
    #[serde(rename = "🌊")]
    Wave,
    #[serde(rename = "🌿")]
    Growth,
    #[serde(rename = "🔥")]
    Fire,
}

impl EmotionSymbol {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Neutral => "⚪",
            Self::Muted => "🔇",
            Self::Void => "🌑",
            Self::Chaos => "🌀",
            Self::Wave => "🌊",
            Self::Growth => "🌿",
            Self::Fire => "🔥",
        }
    }
}

impl fmt::Display for EmotionSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Guard sub-record tracking the forced-silence state machine.
///
/// `since_counter` is set on the step the guard engages and cleared on
/// disengage; `heartbeat` counts consecutive silent steps after the first.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RitualSilenceGuard {
    pub engaged: bool,
    pub since_counter: Option<u64>,
    pub heartbeat: u64,
}

impl Default for RitualSilenceGuard {
    fn default() -> Self {
        Self {
            engaged: false,
            since_counter: None,
            heartbeat: 0,
        }
    }
}

/// One step's worth of construct state, emitted as a single record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConstructState {
    pub resonance: f64,
    pub drift: f64,
    pub entropy: f64,
    pub emotion_vector: EmotionSymbol,
    pub glyph: String,
    pub mode: Mode,
    pub timestamp: String,
    pub counter: u64,
    pub ritual_silence_guard: RitualSilenceGuard,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub narrative_hint: Option<String>,
}

/// Tri-state payload field: distinguishes "not provided" from "explicitly
/// cleared" from "set to a value".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum HintField {
    #[default]
    Absent,
    Cleared,
    Set(String),
}

impl HintField {
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }
}

impl Serialize for HintField {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Absent | Self::Cleared => serializer.serialize_none(),
            Self::Set(value) => serializer.serialize_str(value),
        }
    }
}

fn hint_field<'de, D: Deserializer<'de>>(deserializer: D) -> Result<HintField, D::Error> {
    // Only called when the key is present, so `null` means "cleared".
    Ok(match Option::<String>::deserialize(deserializer)? {
        None => HintField::Cleared,
        Some(value) => HintField::Set(value),
    })
}

/// Timestamp as supplied by callers: ISO-8601 text or epoch seconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum TimestampValue {
    Epoch(f64),
    Iso(String),
}

/// Input payload consumed by a kernel step. All fields optional; unknown
/// keys are ignored so sealed payloads may carry transport metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StepPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<TimestampValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emotion_vector: Option<EmotionSymbol>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub glyph: Option<String>,
    #[serde(
        default,
        deserialize_with = "hint_field",
        skip_serializing_if = "HintField::is_absent"
    )]
    pub narrative_hint: HintField,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    NotFinite {
        field: &'static str,
    },
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
    EmptyGlyph,
    MalformedTimestamp(String),
    HintLength(usize),
    GuardInconsistent(&'static str),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFinite { field } => write!(f, "field '{field}' is not a finite number"),
            Self::OutOfRange {
                field,
                value,
                min,
                max,
            } => write!(f, "field '{field}' = {value} outside [{min}, {max}]"),
            Self::EmptyGlyph => write!(f, "glyph must be a non-empty string"),
            Self::MalformedTimestamp(raw) => write!(f, "timestamp '{raw}' is not ISO-8601"),
            Self::HintLength(len) => write!(
                f,
                "narrative_hint must be 1..={NARRATIVE_HINT_MAX_CHARS} chars after trimming (got {len})"
            ),
            Self::GuardInconsistent(reason) => {
                write!(f, "ritual_silence_guard inconsistent: {reason}")
            }
        }
    }
}

impl std::error::Error for ValidationError {}

fn check_unit_range(field: &'static str, value: f64) -> Result<(), ValidationError> {
    check_range(field, value, 0.0, 1.0)
}

fn check_range(
    field: &'static str,
    value: f64,
    min: f64,
    max: f64,
) -> Result<(), ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::NotFinite { field });
    }
    if value < min || value > max {
        return Err(ValidationError::OutOfRange {
            field,
            value,
            min,
            max,
        });
    }
    Ok(())
}

/// Parse an ISO-8601 timestamp, accepting a trailing literal `Z`.
pub fn parse_iso_timestamp(raw: &str) -> Result<DateTime<FixedOffset>, ValidationError> {
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| {
            // Naive timestamps are treated as UTC, mirroring the wire format
            // emitted before offsets were mandatory.
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                .map(|naive| naive.and_utc().fixed_offset())
        })
        .map_err(|_| ValidationError::MalformedTimestamp(raw.to_string()))
}

/// Enforce the construct-state record contract: presence, ranges, and the
/// guard invariant. Runs after a step assembles the record.
pub fn validate_construct_state(record: &ConstructState) -> Result<(), ValidationError> {
    check_unit_range("resonance", record.resonance)?;
    check_unit_range("entropy", record.entropy)?;
    check_range("drift", record.drift, -1.0, 1.0)?;

    if record.glyph.trim().is_empty() {
        return Err(ValidationError::EmptyGlyph);
    }
    parse_iso_timestamp(&record.timestamp)?;

    if let Some(hint) = &record.narrative_hint {
        let trimmed = hint.trim();
        let len = trimmed.chars().count();
        if len == 0 || len > NARRATIVE_HINT_MAX_CHARS {
            return Err(ValidationError::HintLength(len));
        }
    }

    let guard = &record.ritual_silence_guard;
    if guard.engaged {
        match guard.since_counter {
            None => return Err(ValidationError::GuardInconsistent("engaged without since_counter")),
            Some(since) if since > record.counter => {
                return Err(ValidationError::GuardInconsistent("since_counter in the future"))
            }
            Some(_) => {}
        }
    } else if guard.since_counter.is_some() || guard.heartbeat != 0 {
        return Err(ValidationError::GuardInconsistent(
            "disengaged guard must carry no since_counter or heartbeat",
        ));
    }

    Ok(())
}

/// Decode a raw JSON value into a payload, rejecting non-mapping shapes.
pub fn payload_from_value(value: &serde_json::Value) -> Result<StepPayload, serde_json::Error> {
    if !value.is_object() {
        return Err(serde_json::Error::custom(
            "step payload must be a JSON object",
        ));
    }
    serde_json::from_value(value.clone())
}
