//! Soft-bloom export: the minimal disclosure surface handed to renderers.
//!
//! Runs one step, then publishes only the glyph, the bloom probability, and
//! optionally the narrative hint, each validated against the export contract.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use contracts::{ConstructState, StepPayload, NARRATIVE_HINT_MAX_CHARS};

use crate::defaults;
use crate::session::{ConstructSession, StepError};
use crate::signal::round6;

#[derive(Debug)]
pub enum ExportError {
    Step(StepError),
    EmptyGlyph,
    GlyphNotExportable(String),
    ProbabilityMissing,
    ProbabilityOutOfRange(f64),
    HintLength(usize),
}

impl fmt::Display for ExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Step(err) => write!(f, "step failed during export: {err}"),
            Self::EmptyGlyph => write!(f, "construct glyph cannot be empty"),
            Self::GlyphNotExportable(glyph) => write!(f, "glyph '{glyph}' is not exportable"),
            Self::ProbabilityMissing => write!(f, "no bloom probability available"),
            Self::ProbabilityOutOfRange(value) => {
                write!(f, "bloom probability {value} outside [0, 1]")
            }
            Self::HintLength(len) => write!(
                f,
                "narrative hint must be 1..={NARRATIVE_HINT_MAX_CHARS} chars after trimming (got {len})"
            ),
        }
    }
}

impl std::error::Error for ExportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Step(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StepError> for ExportError {
    fn from(err: StepError) -> Self {
        Self::Step(err)
    }
}

/// The published record. Everything else in the session stays private.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SoftBloomExport {
    pub glyph: String,
    pub p_bloom: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub narrative_hint: Option<String>,
}

fn validate_glyph(glyph: &str, allowed: &BTreeSet<String>) -> Result<String, ExportError> {
    let glyph_id = glyph.trim();
    if glyph_id.is_empty() {
        return Err(ExportError::EmptyGlyph);
    }
    if !allowed.contains(glyph_id) {
        return Err(ExportError::GlyphNotExportable(glyph_id.to_string()));
    }
    Ok(glyph_id.to_string())
}

fn validate_probability(probability: Option<f64>) -> Result<f64, ExportError> {
    let value = probability.ok_or(ExportError::ProbabilityMissing)?;
    if !(0.0..=1.0).contains(&value) {
        return Err(ExportError::ProbabilityOutOfRange(value));
    }
    Ok(round6(value))
}

fn validate_hint(hint: Option<&str>) -> Result<Option<String>, ExportError> {
    let Some(hint) = hint else {
        return Ok(None);
    };
    let trimmed = hint.trim();
    let len = trimmed.chars().count();
    if len == 0 || len > NARRATIVE_HINT_MAX_CHARS {
        return Err(ExportError::HintLength(len));
    }
    Ok(Some(trimmed.to_string()))
}

/// Step the session with `payload` and build the export record.
///
/// With `include_narrative_hint` unset the hint is withheld even when the
/// construct carries one.
pub fn export_soft_bloom(
    session: &mut ConstructSession,
    payload: &StepPayload,
    include_narrative_hint: bool,
) -> Result<(SoftBloomExport, ConstructState), ExportError> {
    let state = session.step(payload)?;

    let allowed = defaults::allowed_glyphs();
    let glyph = validate_glyph(&state.glyph, &allowed)?;
    let p_bloom = validate_probability(session.bloom_probability())?;
    let hint = if include_narrative_hint {
        validate_hint(state.narrative_hint.as_deref())?
    } else {
        None
    };

    Ok((
        SoftBloomExport {
            glyph,
            p_bloom,
            narrative_hint: hint,
        },
        state,
    ))
}
