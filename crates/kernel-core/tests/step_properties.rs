//! Property coverage for the step loop: range invariants, counter
//! monotonicity, and the guard contract hold for arbitrary inputs.

use proptest::prelude::*;

use contracts::{payload_from_value, validate_construct_state, Mode, StepPayload};
use kernel_core::ConstructSession;
use serde_json::json;

fn arbitrary_payload() -> impl Strategy<Value = StepPayload> {
    let input = proptest::option::of(".{0,64}");
    let tags = proptest::option::of(proptest::collection::vec(
        prop_oneof![
            Just("ritual".to_string()),
            Just("awake".to_string()),
            Just("dream".to_string()),
            Just("sleep".to_string()),
            Just("demo".to_string()),
            "[a-z]{1,8}",
        ],
        0..4,
    ));
    let hint = proptest::option::of("[ a-z]{0,40}");
    (input, tags, hint).prop_map(|(input, tags, hint)| {
        let mut value = json!({});
        if let Some(input) = input {
            value["input"] = json!(input);
        }
        if let Some(tags) = tags {
            value["tags"] = json!(tags);
        }
        if let Some(hint) = hint {
            value["narrative_hint"] = json!(hint);
        }
        payload_from_value(&value).expect("payload must decode")
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn stepped_records_always_validate(payloads in proptest::collection::vec(arbitrary_payload(), 1..20)) {
        let mut session = ConstructSession::bootstrap().unwrap();
        for (index, payload) in payloads.iter().enumerate() {
            let state = session.step(payload).unwrap();

            prop_assert!(validate_construct_state(&state).is_ok(), "invalid record: {state:?}");
            prop_assert!((0.0..=1.0).contains(&state.resonance));
            prop_assert!((0.0..=1.0).contains(&state.entropy));
            prop_assert!((-1.0..=1.0).contains(&state.drift));
            prop_assert_eq!(state.counter, index as u64 + 1);

            if state.mode == Mode::RitualSilence {
                prop_assert_eq!(state.glyph.as_str(), kernel_core::SILENCE_GLYPH);
                prop_assert!(state.ritual_silence_guard.engaged);
            } else {
                prop_assert!(!state.ritual_silence_guard.engaged);
                prop_assert_eq!(state.ritual_silence_guard.heartbeat, 0);
            }

            let bloom = session.bloom_probability().unwrap();
            prop_assert!((0.0..=1.0).contains(&bloom));
        }
    }

    #[test]
    fn history_never_exceeds_the_limit(
        payloads in proptest::collection::vec(arbitrary_payload(), 1..40),
        limit in 1i64..10,
    ) {
        let mut session = ConstructSession::bootstrap().unwrap();
        session.set_history_limit(limit);
        for payload in &payloads {
            session.step(payload).unwrap();
            prop_assert!(session.history().len() <= limit as usize);
        }
        // Newest record is always retained.
        prop_assert_eq!(session.history().last().unwrap(), session.state());
    }

    #[test]
    fn guard_heartbeat_counts_consecutive_silent_steps(extra_steps in 1usize..6) {
        let mut session = ConstructSession::bootstrap().unwrap();
        let silent = payload_from_value(&json!({"input": "hush", "tags": ["ritual"]})).unwrap();

        let first = session.step(&silent).unwrap();
        prop_assert_eq!(first.ritual_silence_guard.since_counter, Some(1));
        prop_assert_eq!(first.ritual_silence_guard.heartbeat, 0);

        let mut last = first;
        for _ in 0..extra_steps {
            last = session.step(&silent).unwrap();
        }
        prop_assert_eq!(last.ritual_silence_guard.since_counter, Some(1));
        prop_assert_eq!(last.ritual_silence_guard.heartbeat, extra_steps as u64);
    }
}
