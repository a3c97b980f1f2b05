//! Mode resolution and the ritual silence gate.
//!
//! The gate is evaluated on the drift computed for the current step, before
//! any perception re-blend, so the rules here see raw step metrics.

use std::collections::BTreeSet;

use contracts::Mode;

/// Tags that force the construct into ritual silence.
pub const RITUAL_TRIGGER_TAGS: [&str; 3] = ["ritual", "silence", "sealed"];

/// Lowercase every tag so gate checks are case-insensitive.
pub fn normalize_tags<I, S>(tags: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    tags.into_iter()
        .map(|tag| tag.as_ref().to_lowercase())
        .collect()
}

/// An explicit "awake" tag always vetoes the gate; trigger tags or the
/// combined drift/entropy threshold engage it.
pub fn should_enter_ritual_silence(drift: f64, entropy: f64, tags: &BTreeSet<String>) -> bool {
    if tags.contains("awake") {
        return false;
    }
    if RITUAL_TRIGGER_TAGS.iter().any(|tag| tags.contains(*tag)) {
        return true;
    }
    drift.abs() > 0.45 && entropy > 0.6
}

/// Resolve the next mode from step metrics and normalized tags.
///
/// Exiting ritual silence is hysteretic: the construct stays silent until an
/// explicit wake tag, a calm dream request, or metrics settle well below the
/// entry thresholds.
pub fn resolve_mode(previous: Mode, drift: f64, entropy: f64, tags: &BTreeSet<String>) -> Mode {
    if should_enter_ritual_silence(drift, entropy, tags) {
        return Mode::RitualSilence;
    }

    if previous == Mode::RitualSilence {
        if tags.contains("awake") {
            return Mode::Awake;
        }
        if tags.contains("dream") && drift.abs() < 0.4 {
            return Mode::Dream;
        }
        if entropy < 0.5 && drift.abs() < 0.25 {
            return Mode::Awake;
        }
        return Mode::RitualSilence;
    }

    if tags.contains("awake") {
        return Mode::Awake;
    }
    if tags.contains("dream") {
        return Mode::Dream;
    }
    if tags.contains("sleep") {
        return Mode::Sleep;
    }
    if drift.abs() > 0.4 {
        return Mode::Dream;
    }
    if entropy > 0.6 {
        return Mode::Sleep;
    }
    Mode::Awake
}
