//! Whisper pattern registry loading and the session runtime that enforces
//! cooldowns and per-session caps.

use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use contracts::{WhisperPattern, WhisperRegistryFile};

#[derive(Debug)]
pub enum WhisperError {
    Io(std::io::Error),
    Parse(serde_json::Error),
    EmptyPatternId,
    DuplicatePatternId(String),
    UnknownPattern(String),
}

impl fmt::Display for WhisperError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "failed to read whisper registry: {err}"),
            Self::Parse(err) => write!(f, "failed to parse whisper registry: {err}"),
            Self::EmptyPatternId => write!(f, "whisper pattern has an empty id"),
            Self::DuplicatePatternId(id) => write!(f, "duplicate whisper pattern id '{id}'"),
            Self::UnknownPattern(id) => write!(f, "unknown whisper pattern '{id}'"),
        }
    }
}

impl std::error::Error for WhisperError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Parse(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for WhisperError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<serde_json::Error> for WhisperError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err)
    }
}

/// Patterns held in stable priority order, highest priority first.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WhisperPatternRegistry {
    patterns: Vec<WhisperPattern>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    metadata: Option<Value>,
}

impl WhisperPatternRegistry {
    pub fn from_patterns(patterns: Vec<WhisperPattern>) -> Result<Self, WhisperError> {
        Self::build(patterns, None)
    }

    pub fn from_value(value: Value) -> Result<Self, WhisperError> {
        let file: WhisperRegistryFile = serde_json::from_value(value)?;
        Self::build(file.patterns, file.metadata)
    }

    pub fn from_file(path: &Path) -> Result<Self, WhisperError> {
        let raw = fs::read_to_string(path)?;
        let file: WhisperRegistryFile = serde_json::from_str(&raw)?;
        Self::build(file.patterns, file.metadata)
    }

    fn build(mut patterns: Vec<WhisperPattern>, metadata: Option<Value>) -> Result<Self, WhisperError> {
        let mut seen = BTreeSet::new();
        for pattern in &patterns {
            if pattern.id.is_empty() {
                return Err(WhisperError::EmptyPatternId);
            }
            if !seen.insert(pattern.id.clone()) {
                return Err(WhisperError::DuplicatePatternId(pattern.id.clone()));
            }
        }
        // Stable sort keeps registry order among equal priorities.
        patterns.sort_by_key(|pattern| Reverse(pattern.priority));
        Ok(Self { patterns, metadata })
    }

    pub fn patterns(&self) -> &[WhisperPattern] {
        &self.patterns
    }

    pub fn metadata(&self) -> Option<&Value> {
        self.metadata.as_ref()
    }

    pub fn runtime(self) -> WhisperRuntime {
        WhisperRuntime::new(self)
    }
}

/// Per-pattern rate-limit bookkeeping for one session.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PatternStatus {
    pub last_counter: Option<u64>,
    pub last_timestamp: Option<DateTime<Utc>>,
    pub session_count: u32,
}

/// Walks the registry in priority order and returns the first pattern whose
/// declarative match holds and whose rate limits are idle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WhisperRuntime {
    registry: WhisperPatternRegistry,
    state: BTreeMap<String, PatternStatus>,
}

impl WhisperRuntime {
    pub fn new(registry: WhisperPatternRegistry) -> Self {
        let state = registry
            .patterns()
            .iter()
            .map(|pattern| (pattern.id.clone(), PatternStatus::default()))
            .collect();
        Self { registry, state }
    }

    pub fn registry(&self) -> &WhisperPatternRegistry {
        &self.registry
    }

    /// Clear all session counters and cooldown anchors.
    pub fn reset(&mut self) {
        for status in self.state.values_mut() {
            *status = PatternStatus::default();
        }
    }

    pub fn status(&self, pattern_id: &str) -> Result<&PatternStatus, WhisperError> {
        self.state
            .get(pattern_id)
            .ok_or_else(|| WhisperError::UnknownPattern(pattern_id.to_string()))
    }

    /// Select the highest-priority matching pattern. With `consume` the
    /// winner's session count increases and its cooldown anchors advance to
    /// the supplied counter and timestamp.
    pub fn select(
        &mut self,
        drift: Option<f64>,
        tags: &BTreeSet<String>,
        glyph_id: Option<&str>,
        counter: Option<u64>,
        timestamp: Option<DateTime<Utc>>,
        consume: bool,
    ) -> Option<WhisperPattern> {
        for pattern in self.registry.patterns.iter() {
            if !pattern.matches(drift, tags, glyph_id) {
                continue;
            }
            let status = self
                .state
                .get(&pattern.id)
                .cloned()
                .unwrap_or_default();
            if pattern
                .max_per_session
                .is_some_and(|cap| status.session_count >= cap)
            {
                continue;
            }
            if let Some(cooldown) = pattern.cooldown.as_ref() {
                if !cooldown.is_idle(status.last_counter, status.last_timestamp, counter, timestamp)
                {
                    continue;
                }
            }
            if consume {
                let entry = self.state.entry(pattern.id.clone()).or_default();
                entry.session_count += 1;
                if counter.is_some() {
                    entry.last_counter = counter;
                }
                if timestamp.is_some() {
                    entry.last_timestamp = timestamp;
                }
            }
            debug!(pattern = %pattern.id, consume, "whisper pattern selected");
            return Some(pattern.clone());
        }
        None
    }
}
