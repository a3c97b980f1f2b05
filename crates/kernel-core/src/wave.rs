//! Vertical-wave phase helpers: season, zodiac, and lunar cursors with
//! entropy-coupled drift. Phases are wrapped into `[0, 1)`.

use chrono::{DateTime, Datelike, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::signal::clamp01;

const DAY_SECONDS: f64 = 86_400.0;
const LUNAR_CYCLE_DAYS: f64 = 29.530_588;

/// 2024-01-11 11:57 UTC new moon.
fn lunar_reference() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 11, 11, 57, 0).unwrap()
}

/// Wrap a float into the half-open unit interval `[0, 1)`.
pub fn wrap_unit(value: f64) -> f64 {
    ((value % 1.0) + 1.0) % 1.0
}

/// Map entropy in [0, 1] onto a small phase drift scalar, capped at 0.07.
pub fn map_entropy_to_drift(entropy: f64) -> f64 {
    clamp01(entropy) * 0.07
}

/// Fractional day-of-year (0-indexed) for `timestamp`.
pub fn day_of_year(timestamp: DateTime<Utc>) -> f64 {
    let start_of_year = Utc.with_ymd_and_hms(timestamp.year(), 1, 1, 0, 0, 0);
    let start_of_year = match start_of_year.single() {
        Some(value) => value,
        None => return 0.0,
    };
    let delta = timestamp.signed_duration_since(start_of_year);
    delta
        .num_microseconds()
        .map(|us| us as f64 / 1e6)
        .unwrap_or_else(|| delta.num_seconds() as f64)
        / DAY_SECONDS
}

pub fn normalize_season_phase(timestamp: DateTime<Utc>, phase_offset: f64, entropy: f64) -> f64 {
    let base = day_of_year(timestamp) / 365.0;
    wrap_unit(base + phase_offset + map_entropy_to_drift(entropy))
}

/// Zodiac phases track day-of-year like seasons but apply half the drift.
pub fn normalize_zodiac_phase(timestamp: DateTime<Utc>, phase_offset: f64, entropy: f64) -> f64 {
    let base = day_of_year(timestamp) / 365.0;
    wrap_unit(base + phase_offset + 0.5 * map_entropy_to_drift(entropy))
}

/// Lunar phase relative to the reference new moon, with a doubled drift term.
pub fn normalize_lunar_phase(timestamp: DateTime<Utc>, entropy: f64) -> f64 {
    let delta = timestamp.signed_duration_since(lunar_reference());
    let elapsed_days = delta
        .num_microseconds()
        .map(|us| us as f64 / 1e6)
        .unwrap_or_else(|| delta.num_seconds() as f64)
        / DAY_SECONDS;
    let base_phase = wrap_unit(elapsed_days / LUNAR_CYCLE_DAYS);
    wrap_unit(base_phase + 2.0 * map_entropy_to_drift(entropy))
}

/// One sample of the vertical-wave surface handed to downstream renderers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VerticalWaveSample {
    pub season_phase: f64,
    pub zodiac_phase: f64,
    pub lunar_phase: f64,
    pub entropy_phase: f64,
    pub base_amplitude: f64,
    pub user_modulated_amp: f64,
    pub insight_spike: bool,
    pub insight_intensity: f64,
    pub sinth_signature: String,
    pub sinth_tempo: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_timestamps() -> Vec<DateTime<Utc>> {
        vec![
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 6, 15, 13, 45, 12).unwrap(),
            Utc.with_ymd_and_hms(2031, 12, 31, 23, 59, 59).unwrap(),
        ]
    }

    #[test]
    fn wrap_unit_handles_negative_values() {
        assert_eq!(wrap_unit(-0.25), 0.75);
        assert_eq!(wrap_unit(1.5), 0.5);
        assert_eq!(wrap_unit(0.0), 0.0);
    }

    #[test]
    fn entropy_drift_is_clamped() {
        assert_eq!(map_entropy_to_drift(-1.0), 0.0);
        assert_eq!(map_entropy_to_drift(2.0), 0.07);
        assert!((map_entropy_to_drift(0.5) - 0.035).abs() < 1e-12);
    }

    #[test]
    fn phases_stay_in_unit_interval() {
        for timestamp in sample_timestamps() {
            for entropy in [0.0, 0.5, 1.0] {
                for phase in [
                    normalize_season_phase(timestamp, 0.3, entropy),
                    normalize_zodiac_phase(timestamp, -0.8, entropy),
                    normalize_lunar_phase(timestamp, entropy),
                ] {
                    assert!((0.0..1.0).contains(&phase), "got {phase}");
                }
            }
        }
    }

    #[test]
    fn zodiac_drift_is_half_of_season_drift() {
        let timestamp = Utc.with_ymd_and_hms(2024, 4, 2, 6, 0, 0).unwrap();
        let season_delta =
            normalize_season_phase(timestamp, 0.0, 1.0) - normalize_season_phase(timestamp, 0.0, 0.0);
        let zodiac_delta =
            normalize_zodiac_phase(timestamp, 0.0, 1.0) - normalize_zodiac_phase(timestamp, 0.0, 0.0);
        assert!((wrap_unit(season_delta) - 0.07).abs() < 1e-9);
        assert!((wrap_unit(zodiac_delta) - 0.035).abs() < 1e-9);
    }

    #[test]
    fn lunar_phase_is_zero_at_reference() {
        let phase = normalize_lunar_phase(lunar_reference(), 0.0);
        assert!(phase.abs() < 1e-9);
    }
}
