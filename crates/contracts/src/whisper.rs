//! Whisper pattern declarations and the registry/fixture file formats.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Numeric bounds applied to the blended drift signal. All present bounds
/// must hold; a missing drift is compared as 0.0 and the abs-bounds compare
/// against |drift|.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DriftPredicate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gte: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gt: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lte: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lt: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abs_gte: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abs_lte: Option<f64>,
}

impl DriftPredicate {
    pub fn matches(&self, drift: Option<f64>) -> bool {
        let drift = drift.unwrap_or(0.0);
        if self.gte.is_some_and(|bound| drift < bound) {
            return false;
        }
        if self.gt.is_some_and(|bound| drift <= bound) {
            return false;
        }
        if self.lte.is_some_and(|bound| drift > bound) {
            return false;
        }
        if self.lt.is_some_and(|bound| drift >= bound) {
            return false;
        }
        let absolute = drift.abs();
        if self.abs_gte.is_some_and(|bound| absolute < bound) {
            return false;
        }
        if self.abs_lte.is_some_and(|bound| absolute > bound) {
            return false;
        }
        true
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PatternSelectors {
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags_any: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags_all: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags_none: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drift: Option<DriftPredicate>,
}

impl PatternSelectors {
    pub fn matches_tags(&self, tags: &BTreeSet<String>) -> bool {
        if !self.tags_all.is_empty() && !self.tags_all.is_subset(tags) {
            return false;
        }
        if !self.tags_any.is_empty() && self.tags_any.is_disjoint(tags) {
            return false;
        }
        if !self.tags_none.is_empty() && !self.tags_none.is_disjoint(tags) {
            return false;
        }
        true
    }
}

/// Idle requirements between consuming selections of the same pattern.
/// When both counter- and seconds-based cooldowns are present, both must be
/// satisfied; each check is vacuously true while either side is unknown.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CooldownSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counters: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seconds: Option<f64>,
}

impl CooldownSpec {
    pub fn is_idle(
        &self,
        last_counter: Option<u64>,
        last_timestamp: Option<DateTime<Utc>>,
        counter: Option<u64>,
        timestamp: Option<DateTime<Utc>>,
    ) -> bool {
        if let (Some(required), Some(last), Some(current)) = (self.counters, last_counter, counter)
        {
            if current.saturating_sub(last) < required {
                return false;
            }
        }
        if let (Some(required), Some(last), Some(current)) =
            (self.seconds, last_timestamp, timestamp)
        {
            let delta = current.signed_duration_since(last);
            let elapsed = delta
                .num_microseconds()
                .map(|us| us as f64 / 1e6)
                .unwrap_or_else(|| delta.num_seconds() as f64);
            if elapsed < required {
                return false;
            }
        }
        true
    }
}

/// A declarative, rate-limited content-selection rule keyed on drift, tags,
/// and glyph identity. Immutable once loaded from the registry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WhisperPattern {
    pub id: String,
    pub glyph_id: String,
    pub pattern_path: String,
    pub pattern_checksum: String,
    #[serde(rename = "loop")]
    pub loop_playback: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: i64,
    #[serde(default, skip_serializing_if = "PatternSelectors::is_empty")]
    pub selectors: PatternSelectors,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cooldown: Option<CooldownSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_per_session: Option<u32>,
}

impl PatternSelectors {
    pub fn is_empty(&self) -> bool {
        self.tags_any.is_empty()
            && self.tags_all.is_empty()
            && self.tags_none.is_empty()
            && self.drift.is_none()
    }
}

impl WhisperPattern {
    /// Declarative match only; runtime constraints (cooldown, session cap)
    /// are the runtime's concern.
    pub fn matches(&self, drift: Option<f64>, tags: &BTreeSet<String>, glyph_id: Option<&str>) -> bool {
        if glyph_id.is_some_and(|glyph| glyph != self.glyph_id) {
            return false;
        }
        if let Some(predicate) = self.selectors.drift.as_ref() {
            if !predicate.matches(drift) {
                return false;
            }
        }
        self.selectors.matches_tags(tags)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WhisperRegistryFile {
    pub patterns: Vec<WhisperPattern>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GlyphEntry {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GlyphRegistryFile {
    #[serde(default)]
    pub glyphs: Vec<GlyphEntry>,
}

/// Narrative-hint fixture: either a bare string or `{"summary": ...}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum NarrativeHintFile {
    Text(String),
    Summary {
        #[serde(default)]
        summary: Option<String>,
    },
}

impl NarrativeHintFile {
    pub fn summary(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text.as_str()),
            Self::Summary { summary } => summary.as_deref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn tags(values: &[&str]) -> BTreeSet<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn drift_predicate_all_bounds_must_hold() {
        let predicate = DriftPredicate {
            gte: Some(-0.5),
            lt: Some(0.5),
            abs_gte: Some(0.1),
            ..DriftPredicate::default()
        };
        assert!(predicate.matches(Some(0.2)));
        assert!(predicate.matches(Some(-0.3)));
        assert!(!predicate.matches(Some(0.05))); // abs_gte fails
        assert!(!predicate.matches(Some(0.6))); // lt fails
        assert!(!predicate.matches(Some(-0.7))); // gte fails
    }

    #[test]
    fn drift_predicate_treats_missing_drift_as_zero() {
        let predicate = DriftPredicate {
            abs_lte: Some(0.1),
            ..DriftPredicate::default()
        };
        assert!(predicate.matches(None));

        let strict = DriftPredicate {
            abs_gte: Some(0.1),
            ..DriftPredicate::default()
        };
        assert!(!strict.matches(None));
    }

    #[test]
    fn selectors_combine_any_all_none() {
        let selectors = PatternSelectors {
            tags_any: tags(&["drift", "echo"]),
            tags_all: tags(&["demo"]),
            tags_none: tags(&["sealed"]),
            drift: None,
        };
        assert!(selectors.matches_tags(&tags(&["demo", "echo"])));
        assert!(!selectors.matches_tags(&tags(&["demo"]))); // tags_any empty intersection
        assert!(!selectors.matches_tags(&tags(&["echo"]))); // tags_all missing
        assert!(!selectors.matches_tags(&tags(&["demo", "echo", "sealed"])));
    }

    #[test]
    fn cooldown_counter_gate() {
        let cooldown = CooldownSpec {
            counters: Some(2),
            seconds: None,
        };
        assert!(!cooldown.is_idle(Some(10), None, Some(11), None));
        assert!(cooldown.is_idle(Some(10), None, Some(12), None));
        // Vacuously idle while either side is unknown.
        assert!(cooldown.is_idle(None, None, Some(11), None));
        assert!(cooldown.is_idle(Some(10), None, None, None));
    }

    #[test]
    fn cooldown_seconds_gate() {
        let cooldown = CooldownSpec {
            counters: None,
            seconds: Some(5.0),
        };
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert!(!cooldown.is_idle(None, Some(base), None, Some(base + chrono::Duration::seconds(2))));
        assert!(cooldown.is_idle(None, Some(base), None, Some(base + chrono::Duration::seconds(5))));
    }

    #[test]
    fn pattern_requires_glyph_equality_when_specified() {
        let pattern: WhisperPattern = serde_json::from_value(serde_json::json!({
            "id": "p1",
            "glyph_id": "demo_glyph",
            "pattern_path": "patterns/p1.json",
            "pattern_checksum": "sha256:00",
            "loop": false,
        }))
        .unwrap();
        assert!(pattern.matches(None, &BTreeSet::new(), Some("demo_glyph")));
        assert!(!pattern.matches(None, &BTreeSet::new(), Some("other_glyph")));
        assert!(pattern.matches(None, &BTreeSet::new(), None));
    }

    #[test]
    fn registry_file_round_trips_loop_keyword() {
        let raw = serde_json::json!({
            "patterns": [{
                "id": "p1",
                "glyph_id": "demo_glyph",
                "pattern_path": "patterns/p1.json",
                "pattern_checksum": "sha256:00",
                "loop": true,
                "priority": 4,
                "selectors": {"tags_any": ["demo"], "drift": {"abs_lte": 0.4}},
                "cooldown": {"counters": 2, "seconds": 1.5},
                "max_per_session": 3
            }]
        });
        let file: WhisperRegistryFile = serde_json::from_value(raw.clone()).unwrap();
        assert!(file.patterns[0].loop_playback);
        let encoded = serde_json::to_value(&file).unwrap();
        assert_eq!(encoded["patterns"][0]["loop"], serde_json::json!(true));
    }

    #[test]
    fn narrative_hint_file_accepts_both_shapes() {
        let text: NarrativeHintFile = serde_json::from_str("\"a bare hint\"").unwrap();
        assert_eq!(text.summary(), Some("a bare hint"));
        let nested: NarrativeHintFile =
            serde_json::from_value(serde_json::json!({"summary": "nested"})).unwrap();
        assert_eq!(nested.summary(), Some("nested"));
    }
}
