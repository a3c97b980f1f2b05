//! Unified perception layer: ingests whisper, drift, and seal signals and
//! maintains a forecast vector the stepper blends back into its metrics.

use serde::{Deserialize, Serialize};

use contracts::{
    DriftSignal, ForecastVector, PerceptionOptions, PerceptionSignals, SealSignal, WhisperSignal,
};

/// Seal events are never windowed by options, only hard-capped.
const SEAL_EVENT_CAP: usize = 5;

/// Retained perception events, oldest first.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PerceptionEvents {
    pub whisper: Vec<WhisperSignal>,
    pub drift: Vec<DriftSignal>,
    pub seal: Vec<SealSignal>,
}

/// Immutable view over the layer's current state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PerceptionSnapshot {
    pub options: PerceptionOptions,
    pub events: PerceptionEvents,
    pub latest_drift: Option<DriftSignal>,
    pub latest_whisper: Option<WhisperSignal>,
    pub forecast: ForecastVector,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PerceptionLayer {
    options: PerceptionOptions,
    events: PerceptionEvents,
    latest_drift: Option<DriftSignal>,
    latest_whisper: Option<WhisperSignal>,
    forecast: ForecastVector,
}

impl Default for PerceptionLayer {
    fn default() -> Self {
        Self::new(PerceptionOptions::default())
    }
}

impl PerceptionLayer {
    pub fn new(options: PerceptionOptions) -> Self {
        Self {
            options,
            events: PerceptionEvents::default(),
            latest_drift: None,
            latest_whisper: None,
            forecast: ForecastVector {
                valence: 0.0,
                arousal: 0.0,
                tension: 0.0,
            },
        }
    }

    pub fn options(&self) -> &PerceptionOptions {
        &self.options
    }

    pub fn forecast(&self) -> &ForecastVector {
        &self.forecast
    }

    pub fn latest_drift(&self) -> Option<&DriftSignal> {
        self.latest_drift.as_ref()
    }

    pub fn latest_whisper(&self) -> Option<&WhisperSignal> {
        self.latest_whisper.as_ref()
    }

    /// Record a whisper event and refresh the forecast vector from its
    /// emotional vector. Missing tension falls back to the narrative entropy.
    pub fn ingest_whisper(&mut self, signal: WhisperSignal) {
        self.forecast = ForecastVector {
            valence: signal.emotional_vector.valence,
            arousal: signal.emotional_vector.arousal,
            tension: signal
                .emotional_vector
                .tension
                .unwrap_or(signal.narrative_entropy),
        };
        self.events.whisper.push(signal.clone());
        self.latest_whisper = Some(signal);
        self.trim_windows();
    }

    pub fn ingest_drift(&mut self, signal: DriftSignal) {
        self.events.drift.push(signal.clone());
        self.latest_drift = Some(signal);
        self.trim_windows();
    }

    pub fn ingest_seal(&mut self, signal: SealSignal) {
        self.events.seal.push(signal);
        self.trim_windows();
    }

    /// Ingest a signal bundle in fixed order: whisper, then drift, then seal.
    pub fn ingest_signals(&mut self, signals: PerceptionSignals) {
        if let Some(whisper) = signals.whisper {
            self.ingest_whisper(whisper);
        }
        if let Some(drift) = signals.drift {
            self.ingest_drift(drift);
        }
        if let Some(seal) = signals.seal {
            self.ingest_seal(seal);
        }
    }

    fn trim_windows(&mut self) {
        let window = self.options.drift_window;
        if window > 0 {
            trim_to(&mut self.events.whisper, window);
            trim_to(&mut self.events.drift, window);
        }
        trim_to(&mut self.events.seal, SEAL_EVENT_CAP);
    }

    pub fn snapshot(&self) -> PerceptionSnapshot {
        PerceptionSnapshot {
            options: self.options.clone(),
            events: self.events.clone(),
            latest_drift: self.latest_drift.clone(),
            latest_whisper: self.latest_whisper.clone(),
            forecast: self.forecast.clone(),
        }
    }
}

fn trim_to<T>(events: &mut Vec<T>, limit: usize) {
    if events.len() > limit {
        let excess = events.len() - limit;
        events.drain(..excess);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::EmotionalVector;

    fn whisper(valence: f64, tension: Option<f64>, narrative_entropy: f64) -> WhisperSignal {
        WhisperSignal {
            timestamp: 1_700_000_000.0,
            emotional_vector: EmotionalVector {
                valence,
                arousal: 0.4,
                tension,
            },
            intensity: 0.4,
            tags: vec!["calm".to_string()],
            narrative_entropy,
        }
    }

    fn drift(predicted: f64) -> DriftSignal {
        DriftSignal {
            timestamp: 1_700_000_000.0,
            predicted_drift: predicted,
            predicted_curl: 0.1,
            horizon_seconds: 2.0,
        }
    }

    #[test]
    fn forecast_starts_neutral() {
        let layer = PerceptionLayer::default();
        assert_eq!(layer.forecast().valence, 0.0);
        assert_eq!(layer.forecast().arousal, 0.0);
        assert_eq!(layer.forecast().tension, 0.0);
    }

    #[test]
    fn whisper_updates_forecast_with_tension_fallback() {
        let mut layer = PerceptionLayer::default();
        layer.ingest_whisper(whisper(0.6, None, 0.33));
        assert_eq!(layer.forecast().valence, 0.6);
        assert_eq!(layer.forecast().tension, 0.33);

        layer.ingest_whisper(whisper(-0.2, Some(0.9), 0.1));
        assert_eq!(layer.forecast().valence, -0.2);
        assert_eq!(layer.forecast().tension, 0.9);
    }

    #[test]
    fn drift_window_caps_whisper_and_drift_events() {
        let mut layer = PerceptionLayer::new(PerceptionOptions {
            drift_window: 2,
            whisper_window: 0,
            seal_window: 0,
        });
        for i in 0..5 {
            layer.ingest_whisper(whisper(i as f64 / 10.0, Some(0.2), 0.2));
            layer.ingest_drift(drift(i as f64 / 10.0));
        }
        let snapshot = layer.snapshot();
        assert_eq!(snapshot.events.whisper.len(), 2);
        assert_eq!(snapshot.events.drift.len(), 2);
        // Oldest events are dropped.
        assert_eq!(snapshot.events.drift[0].predicted_drift, 0.3);
        assert_eq!(snapshot.latest_drift.unwrap().predicted_drift, 0.4);
    }

    #[test]
    fn zero_window_keeps_everything_but_seals_stay_capped() {
        let mut layer = PerceptionLayer::default();
        for i in 0..8 {
            layer.ingest_drift(drift(i as f64 / 10.0));
            layer.ingest_seal(SealSignal {
                timestamp: i as f64,
                verified: i % 2 == 0,
            });
        }
        let snapshot = layer.snapshot();
        assert_eq!(snapshot.events.drift.len(), 8);
        assert_eq!(snapshot.events.seal.len(), 5);
        assert_eq!(snapshot.events.seal[0].timestamp, 3.0);
    }

    #[test]
    fn bundle_ingest_applies_whisper_before_drift() {
        let mut layer = PerceptionLayer::default();
        layer.ingest_signals(PerceptionSignals {
            whisper: Some(whisper(0.5, Some(0.4), 0.2)),
            drift: Some(drift(0.25)),
            seal: Some(SealSignal {
                timestamp: 1.0,
                verified: true,
            }),
        });
        let snapshot = layer.snapshot();
        assert_eq!(snapshot.forecast.valence, 0.5);
        assert_eq!(snapshot.latest_drift.unwrap().predicted_drift, 0.25);
        assert_eq!(snapshot.events.seal.len(), 1);
    }
}
