use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;
use serde_json::{Map, Value};
use std::str::FromStr;

use waypoint_engine::agent::{StepKind, StepProposal};
use waypoint_engine::tools::{normalize_params, LoopDetector};

fn flat_object() -> impl Strategy<Value = Vec<(String, i64)>> {
    prop::collection::btree_map("[a-z]{1,6}", any::<i64>(), 0..8)
        .prop_map(|m| m.into_iter().collect())
}

fn object_from(pairs: &[(String, i64)]) -> Value {
    let mut map = Map::new();
    for (k, v) in pairs {
        map.insert(k.clone(), Value::from(*v));
    }
    Value::Object(map)
}

proptest! {
    // Insertion order never changes the normalized form
    #[test]
    fn test_normalization_is_order_independent(pairs in flat_object()) {
        let forward = object_from(&pairs);
        let mut reversed_pairs = pairs.clone();
        reversed_pairs.reverse();
        let reversed = object_from(&reversed_pairs);

        prop_assert_eq!(normalize_params(&forward), normalize_params(&reversed));
    }

    // Nested objects are normalized too
    #[test]
    fn test_nested_normalization(pairs in flat_object(), key in "[a-z]{1,6}") {
        let mut reversed_pairs = pairs.clone();
        reversed_pairs.reverse();

        let a = serde_json::json!({ key.clone(): object_from(&pairs), "z": 1 });
        let b = serde_json::json!({ "z": 1, key: object_from(&reversed_pairs) });
        prop_assert_eq!(normalize_params(&a), normalize_params(&b));
    }

    // Distinct parameters never count toward each other
    #[test]
    fn test_distinct_params_never_blocked(count in 1usize..40) {
        let detector = LoopDetector::new(
            Duration::milliseconds(5000),
            Duration::milliseconds(60000),
            3,
        );
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        for i in 0..count {
            let verdict = detector.should_block("calculate", &serde_json::json!({ "n": i }), now);
            prop_assert!(!verdict.is_blocked());
        }
    }

    // The threshold call and every later one inside the window is blocked
    #[test]
    fn test_identical_calls_block_at_threshold(threshold in 2usize..6, extra in 0usize..4) {
        let detector = LoopDetector::new(
            Duration::milliseconds(5000),
            Duration::milliseconds(60000),
            threshold,
        );
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let params = serde_json::json!({ "path": "a.txt" });

        for i in 0..(threshold + extra) {
            let now = start + Duration::milliseconds(i as i64 * 10);
            let blocked = detector.should_block("read_file", &params, now).is_blocked();
            prop_assert_eq!(blocked, i + 1 >= threshold);
        }
    }

    // Only the closed set of labels (and aliases) parses
    #[test]
    fn test_step_kind_parsing_is_closed(label in "[A-Za-z_]{0,14}") {
        let known = [
            "NAVIGATE", "INTERACT", "EXTRACT", "OBSERVE", "WAIT", "NAVIGATE_BACK",
            "CALL_TOOL", "TERMINATE", "GOTO", "ACT", "NAVBACK", "CLOSE",
        ];
        let accepted = StepKind::from_str(&label).is_ok();
        prop_assert_eq!(accepted, known.contains(&label.to_ascii_uppercase().as_str()));
    }

    // Arbitrary JSON replies never panic the proposal parser
    #[test]
    fn test_proposal_parser_total(text in ".{0,40}", tool in ".{0,12}") {
        let value = serde_json::json!({ "text": text, "tool": tool, "instruction": text });
        let _ = StepProposal::from_json(&value);
    }
}
