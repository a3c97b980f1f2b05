//! Perception signal payloads exchanged with the perception layer.
//!
//! Field names follow the upstream camelCase wire format.

use serde::{Deserialize, Serialize};

/// Per-channel windowing caps. Zero disables capping for that channel;
/// the seal channel additionally carries a hard cap inside the layer.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PerceptionOptions {
    #[serde(rename = "driftWindow", default)]
    pub drift_window: usize,
    #[serde(rename = "whisperWindow", default)]
    pub whisper_window: usize,
    #[serde(rename = "sealWindow", default)]
    pub seal_window: usize,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct EmotionalVector {
    #[serde(default)]
    pub valence: f64,
    #[serde(default)]
    pub arousal: f64,
    /// Optional on the wire; the forecast falls back to the whisper event's
    /// narrative entropy when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tension: Option<f64>,
}

/// Derived forecast state. Unlike [`EmotionalVector`], every component is
/// always resolved.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct ForecastVector {
    pub valence: f64,
    pub arousal: f64,
    pub tension: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WhisperSignal {
    pub timestamp: f64,
    #[serde(rename = "emotionalVector", default)]
    pub emotional_vector: EmotionalVector,
    #[serde(default)]
    pub intensity: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(rename = "narrativeEntropy", default)]
    pub narrative_entropy: f64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct DriftSignal {
    pub timestamp: f64,
    #[serde(rename = "predictedDrift", default)]
    pub predicted_drift: f64,
    #[serde(rename = "predictedCurl", default)]
    pub predicted_curl: f64,
    #[serde(rename = "horizonSeconds", default)]
    pub horizon_seconds: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SealSignal {
    pub timestamp: f64,
    #[serde(default)]
    pub verified: bool,
}

/// A bundle of optional per-channel signals ingested in one call, applied
/// whisper first, then drift, then seal.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PerceptionSignals {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whisper: Option<WhisperSignal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drift: Option<DriftSignal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seal: Option<SealSignal>,
}
