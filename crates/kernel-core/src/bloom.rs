//! Glyph-derived coefficients and the bloom probability oscillator.

use chrono::{DateTime, Timelike, Utc};

use crate::signal::clamp01;

/// Default chaos sensitivity for an empty glyph.
pub const BLOOM_ALPHA: f64 = 0.45;
/// Angular frequency applied to the minute-resolution time cursor.
pub const BLOOM_WAVE_FREQUENCY: f64 = 0.85;

fn glyph_value(glyph: &str) -> u64 {
    glyph.chars().map(|ch| u64::from(ch as u32)).sum()
}

/// Deterministic chaos sensitivity in [0.3, 0.7) derived from the glyph id.
pub fn chaos_from_glyph(glyph: &str) -> f64 {
    if glyph.is_empty() {
        return BLOOM_ALPHA;
    }
    let normalised = (glyph_value(glyph) % 1000) as f64 / 1000.0;
    0.3 + 0.4 * normalised
}

/// Deterministic phase offset in radians derived from the glyph id.
pub fn phase_from_glyph(glyph: &str) -> f64 {
    if glyph.is_empty() {
        return 0.0;
    }
    ((glyph_value(glyph) % 360) as f64).to_radians()
}

/// Minutes since UTC midnight, fractional seconds included.
pub fn time_cursor(timestamp: DateTime<Utc>) -> f64 {
    let seconds = f64::from(timestamp.time().num_seconds_from_midnight());
    let nanos = f64::from(timestamp.time().nanosecond());
    (seconds + nanos / 1e9) / 60.0
}

/// Damped cosine oscillator over the time-of-day cursor.
///
/// `drift` enters only through the damping term, so high drift flattens the
/// oscillation toward 0.5 regardless of phase.
pub fn bloom_probability(
    drift: f64,
    timestamp: DateTime<Utc>,
    chaos_sensitivity: f64,
    wave_frequency: f64,
    phase: f64,
) -> f64 {
    let cursor = time_cursor(timestamp);
    let damping = (-chaos_sensitivity * drift * drift).exp();
    let oscillation = (wave_frequency * cursor + phase).cos();
    clamp01(0.5 * (damping * oscillation + 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn empty_glyph_uses_defaults() {
        assert_eq!(chaos_from_glyph(""), BLOOM_ALPHA);
        assert_eq!(phase_from_glyph(""), 0.0);
    }

    #[test]
    fn glyph_coefficients_are_deterministic_and_bounded() {
        for glyph in ["demo_glyph", "GLYPH_RITUAL_SILENCE", "☉anchor"] {
            let chaos = chaos_from_glyph(glyph);
            assert_eq!(chaos, chaos_from_glyph(glyph));
            assert!((0.3..0.7).contains(&chaos), "{glyph} gave {chaos}");
            let phase = phase_from_glyph(glyph);
            assert!((0.0..std::f64::consts::TAU).contains(&phase));
        }
    }

    #[test]
    fn time_cursor_measures_minutes_from_midnight() {
        let noon = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        assert_eq!(time_cursor(noon), 720.0);
        let shortly_after = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 30).unwrap();
        assert_eq!(time_cursor(shortly_after), 0.5);
    }

    #[test]
    fn probability_stays_in_unit_interval() {
        let timestamp = Utc.with_ymd_and_hms(2024, 3, 1, 7, 13, 29).unwrap();
        for drift in [-1.0, -0.4, 0.0, 0.2, 1.0, 5.0] {
            let p = bloom_probability(drift, timestamp, 0.45, BLOOM_WAVE_FREQUENCY, 1.2);
            assert!((0.0..=1.0).contains(&p), "drift {drift} gave {p}");
        }
    }

    #[test]
    fn high_drift_flattens_toward_half() {
        let timestamp = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let calm = bloom_probability(0.0, timestamp, 0.45, BLOOM_WAVE_FREQUENCY, 0.0);
        let stormy = bloom_probability(10.0, timestamp, 0.45, BLOOM_WAVE_FREQUENCY, 0.0);
        assert!((stormy - 0.5).abs() < (calm - 0.5).abs() + 1e-12);
        assert!((stormy - 0.5).abs() < 1e-6);
    }
}
