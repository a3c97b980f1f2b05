//! Pure signal math: resonance, entropy, and emotion resolution.

use std::collections::BTreeMap;

use contracts::{EmotionSymbol, Mode};

/// Decay applied to the previous resonance when a step carries no text.
const EMPTY_INPUT_DECAY: f64 = 0.97;

pub fn round6(value: f64) -> f64 {
    (value * 1e6).round() / 1e6
}

pub fn clamp(value: f64, lower: f64, upper: f64) -> f64 {
    value.max(lower).min(upper)
}

pub fn clamp01(value: f64) -> f64 {
    clamp(value, 0.0, 1.0)
}

/// Blend the input text's character statistics with the previous resonance.
///
/// Empty input decays the prior instead of measuring anything. Otherwise the
/// character codes contribute a normalized mean, damped by a coherence term
/// derived from the code-point span (span of zero is floored at one so a
/// single repeated character still yields a defined coherence).
pub fn resonance(text: &str, previous: f64) -> f64 {
    if text.is_empty() {
        return round6(previous * EMPTY_INPUT_DECAY);
    }

    let codes: Vec<f64> = text.chars().map(|ch| ch as u32 as f64).collect();
    let mean = codes.iter().sum::<f64>() / codes.len() as f64;
    let max = codes.iter().cloned().fold(f64::MIN, f64::max);
    let min = codes.iter().cloned().fold(f64::MAX, f64::min);
    let span = if max - min == 0.0 { 1.0 } else { max - min };
    let coherence = span / 255.0;

    let raw = 0.6 * (mean / 255.0) + 0.4 * previous * (1.0 - coherence);
    round6(clamp01(raw))
}

/// Normalized Shannon entropy (base 2) over character frequencies.
/// Zero for empty or single-character input.
pub fn entropy(text: &str) -> f64 {
    let total = text.chars().count();
    if total <= 1 {
        return 0.0;
    }

    let mut counts: BTreeMap<char, usize> = BTreeMap::new();
    for ch in text.chars() {
        *counts.entry(ch).or_default() += 1;
    }

    let total_f = total as f64;
    let raw: f64 = counts
        .values()
        .map(|&count| {
            let p = count as f64 / total_f;
            -p * p.log2()
        })
        .sum();

    let max_entropy = total_f.log2();
    if max_entropy == 0.0 {
        return 0.0;
    }
    round6(clamp01(raw / max_entropy))
}

/// First matching rule wins; ritual silence always mutes.
pub fn emotion_symbol(resonance: f64, entropy: f64, mode: Mode) -> EmotionSymbol {
    if mode == Mode::RitualSilence {
        return EmotionSymbol::Muted;
    }
    if resonance < 0.3 {
        return EmotionSymbol::Void;
    }
    if entropy > 0.7 {
        return EmotionSymbol::Chaos;
    }
    if resonance < 0.55 {
        return EmotionSymbol::Wave;
    }
    if resonance < 0.8 {
        return EmotionSymbol::Growth;
    }
    EmotionSymbol::Fire
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_decays_previous_resonance() {
        assert_eq!(resonance("", 0.5), 0.485);
        assert_eq!(resonance("", 0.0), 0.0);
    }

    #[test]
    fn resonance_stays_in_unit_interval() {
        for text in ["a", "hello sin", "ZZZZZZ", "日本語テキスト", "\u{1}\u{2}"] {
            for previous in [0.0, 0.25, 0.5, 1.0] {
                let value = resonance(text, previous);
                assert!((0.0..=1.0).contains(&value), "{text:?} gave {value}");
            }
        }
    }

    #[test]
    fn uniform_text_floors_span_at_one() {
        // "aaaa": mean 97, span floored to 1 -> coherence tiny, prior mostly kept.
        let value = resonance("aaaa", 0.5);
        let expected = {
            let coherence = 1.0 / 255.0;
            let raw = 0.6 * (97.0 / 255.0) + 0.4 * 0.5 * (1.0 - coherence);
            round6(raw)
        };
        assert_eq!(value, expected);
    }

    #[test]
    fn entropy_degenerate_inputs_are_zero() {
        assert_eq!(entropy(""), 0.0);
        assert_eq!(entropy("x"), 0.0);
        assert_eq!(entropy("aaaa"), 0.0);
    }

    #[test]
    fn entropy_of_all_distinct_characters_is_one() {
        assert_eq!(entropy("abcd"), 1.0);
    }

    #[test]
    fn emotion_rules_apply_in_order() {
        assert_eq!(
            emotion_symbol(0.9, 0.9, Mode::RitualSilence),
            EmotionSymbol::Muted
        );
        assert_eq!(emotion_symbol(0.2, 0.9, Mode::Awake), EmotionSymbol::Void);
        assert_eq!(emotion_symbol(0.6, 0.8, Mode::Awake), EmotionSymbol::Chaos);
        assert_eq!(emotion_symbol(0.4, 0.1, Mode::Awake), EmotionSymbol::Wave);
        assert_eq!(emotion_symbol(0.7, 0.1, Mode::Dream), EmotionSymbol::Growth);
        assert_eq!(emotion_symbol(0.95, 0.1, Mode::Sleep), EmotionSymbol::Fire);
    }

    #[test]
    fn round6_truncates_noise() {
        assert_eq!(round6(0.123456789), 0.123457);
        assert_eq!(round6(1.0000004), 1.0);
    }
}
