//! Bundled demo fixtures and loaders for on-disk registries.
//!
//! The demo glyph, whisper registry, and narrative hint ship inside the
//! crate so a session can bootstrap without any filesystem access.

use std::collections::BTreeSet;
use std::path::Path;

use contracts::{GlyphEntry, GlyphRegistryFile, NarrativeHintFile};

use crate::whisper::{WhisperError, WhisperPatternRegistry};

const GLYPH_REGISTRY_JSON: &str = include_str!("../fixtures/demo/glyph_registry.json");
const WHISPER_REGISTRY_JSON: &str = include_str!("../fixtures/demo/whisper_patterns.json");
const NARRATIVE_HINT_JSON: &str = include_str!("../fixtures/demo/narrative_hint.json");

pub const DEMO_GLYPH_ID: &str = "demo_glyph";

fn glyph_registry() -> GlyphRegistryFile {
    serde_json::from_str(GLYPH_REGISTRY_JSON).unwrap_or_default()
}

/// The glyph entry every bootstrapped session anchors to.
pub fn demo_glyph() -> Option<GlyphEntry> {
    glyph_registry()
        .glyphs
        .into_iter()
        .find(|glyph| glyph.id == DEMO_GLYPH_ID)
}

/// The bundled whisper registry, already priority sorted.
pub fn demo_registry() -> Result<WhisperPatternRegistry, WhisperError> {
    let value = serde_json::from_str(WHISPER_REGISTRY_JSON)?;
    WhisperPatternRegistry::from_value(value)
}

/// Trimmed bootstrap hint, or None when the fixture summary is blank.
pub fn demo_narrative_hint() -> Option<String> {
    let file: NarrativeHintFile = serde_json::from_str(NARRATIVE_HINT_JSON).ok()?;
    let summary = file.summary()?.trim();
    if summary.is_empty() {
        None
    } else {
        Some(summary.to_string())
    }
}

/// Glyph ids allowed in soft-bloom exports. The silence glyph is always
/// exportable even though no registry lists it.
pub fn allowed_glyphs() -> BTreeSet<String> {
    let mut glyphs: BTreeSet<String> = glyph_registry()
        .glyphs
        .into_iter()
        .map(|glyph| glyph.id)
        .collect();
    glyphs.insert(crate::session::SILENCE_GLYPH.to_string());
    glyphs
}

/// Load a whisper registry from an on-disk JSON file.
pub fn load_registry_from_path(path: &Path) -> Result<WhisperPatternRegistry, WhisperError> {
    WhisperPatternRegistry::from_file(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_glyph_is_present() {
        let glyph = demo_glyph().unwrap();
        assert_eq!(glyph.id, DEMO_GLYPH_ID);
    }

    #[test]
    fn demo_registry_parses_and_sorts() {
        let registry = demo_registry().unwrap();
        assert!(!registry.patterns().is_empty());
        let priorities: Vec<i64> = registry
            .patterns()
            .iter()
            .map(|pattern| pattern.priority)
            .collect();
        let mut sorted = priorities.clone();
        sorted.sort_by(|a, b| b.cmp(a));
        assert_eq!(priorities, sorted);
    }

    #[test]
    fn demo_hint_is_trimmed_and_non_empty() {
        let hint = demo_narrative_hint().unwrap();
        assert!(!hint.is_empty());
        assert_eq!(hint, hint.trim());
    }

    #[test]
    fn allowed_glyphs_include_silence() {
        let glyphs = allowed_glyphs();
        assert!(glyphs.contains(DEMO_GLYPH_ID));
        assert!(glyphs.contains(crate::session::SILENCE_GLYPH));
    }
}
