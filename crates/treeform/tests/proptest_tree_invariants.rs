//! Property-based invariant tests for locations, the path accessor and the
//! validation model.
//!
//! Locations (1–3):
//! 1. Parsing a dotted join of non-empty segments yields those segments.
//! 2. `child(k).parent()` is the starting location.
//! 3. A child is within its parent; a parent is not within its child.
//!
//! Path accessor (4–8):
//! 4. After a successful write, reading the location yields the written value.
//! 5. A write never modifies its input model.
//! 6. A successful write leaves other top-level branches equal.
//! 7. A failed write reports an index or indexability error, never a parse error.
//! 8. Failover reads return the first defined value in order, else `""`.
//!
//! Validation model (9–10):
//! 9. The unfiltered error summary lists locations in first-registration order,
//!    skipping cleared ones.
//! 10. Every prefix query result is the subsequence of the unfiltered summary
//!     within that prefix.

use proptest::prelude::*;
use serde_json::{Map, Value};
use treeform::path;
use treeform::validation::ValidationModel;
use treeform::{Location, PathError};

// ── Strategies ────────────────────────────────────────────────────────────

/// Segments drawn from a tiny alphabet so generated locations collide with
/// generated models.
fn segment_strategy() -> impl Strategy<Value = String> {
    prop_oneof!["[a-c]", "[0-2]"]
}

fn location_strategy() -> impl Strategy<Value = Location> {
    prop::collection::vec(segment_strategy(), 1..4)
        .prop_map(|segments| Location::parse(segments.join(".")).unwrap())
}

fn scalar_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        (-100i64..100).prop_map(Value::from),
        "[a-z]{0,4}".prop_map(Value::from),
    ]
}

fn value_strategy() -> impl Strategy<Value = Value> {
    scalar_strategy().prop_recursive(3, 24, 3, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..3).prop_map(Value::Array),
            prop::collection::btree_map(segment_strategy(), inner, 0..3)
                .prop_map(|map| Value::Object(map.into_iter().collect::<Map<_, _>>())),
        ]
    })
}

/// Models are mappings at the top, like real form models.
fn model_strategy() -> impl Strategy<Value = Value> {
    prop::collection::btree_map(segment_strategy(), value_strategy(), 0..4)
        .prop_map(|map| Value::Object(map.into_iter().collect()))
}

// ─── 1. Parse round-trips segments ────────────────────────────────────

proptest! {
    #[test]
    fn location_segments_survive_parsing(
        segments in prop::collection::vec("[a-z0-9_]{1,5}", 1..6),
    ) {
        let location = Location::parse(segments.join(".")).unwrap();
        let parsed: Vec<&str> = location.segments().map(|s| s.key()).collect();
        prop_assert_eq!(parsed, segments.iter().map(String::as_str).collect::<Vec<_>>());
        prop_assert_eq!(location.depth(), segments.len());
    }
}

// ─── 2–3. Child / parent / containment ───────────────────────────────

proptest! {
    #[test]
    fn child_parent_and_containment(
        location in location_strategy(),
        key in segment_strategy(),
    ) {
        let child = location.child(&key).unwrap();
        let parent = child.parent();
        prop_assert_eq!(parent.as_ref(), Some(&location));
        prop_assert!(child.is_within(location.as_str()));
        prop_assert!(location.is_within(location.as_str()));
        prop_assert!(!location.is_within(child.as_str()));
    }
}

// ─── 4–7. Writes ─────────────────────────────────────────────────────

proptest! {
    #[test]
    fn write_then_read_returns_value(
        model in model_strategy(),
        location in location_strategy(),
        value in value_strategy(),
    ) {
        let snapshot = model.clone();
        match path::write(&model, &location, value.clone()) {
            Ok(next) => {
                prop_assert_eq!(path::read(&next, &location), Some(&value));

                let first = location.segments().next().unwrap().key();
                let (Value::Object(before), Value::Object(after)) = (&model, &next) else {
                    unreachable!("models are mappings");
                };
                for (key, branch) in before.iter().filter(|(key, _)| key.as_str() != first) {
                    prop_assert_eq!(after.get(key), Some(branch));
                }
            }
            Err(err) => {
                prop_assert!(
                    matches!(err, PathError::IndexOutOfRange { .. } | PathError::NotIndexable { .. }),
                    "unexpected error {:?}", err
                );
            }
        }
        prop_assert_eq!(model, snapshot);
    }
}

// ─── 8. Failover order ───────────────────────────────────────────────

proptest! {
    #[test]
    fn failover_returns_first_defined(
        model in model_strategy(),
        location in location_strategy(),
        failovers in prop::collection::vec(location_strategy(), 0..3),
    ) {
        let expected = std::iter::once(&location)
            .chain(&failovers)
            .find_map(|candidate| path::read(&model, candidate))
            .cloned()
            .unwrap_or_else(|| Value::String(String::new()));
        let actual = path::read_with_failover(&model, &location, &failovers);
        prop_assert_eq!(actual.into_owned(), expected);
    }
}

// ─── 9–10. Error summary order ───────────────────────────────────────

proptest! {
    #[test]
    fn summary_keeps_first_registration_order(
        sets in prop::collection::vec((location_strategy(), any::<bool>()), 0..12),
        prefix in segment_strategy(),
    ) {
        let validation = ValidationModel::new();
        let mut registered: Vec<String> = Vec::new();
        let mut failing: Vec<String> = Vec::new();

        for (location, fails) in &sets {
            let location = location.as_str();
            let messages = if *fails { vec![format!("{location} is invalid")] } else { Vec::new() };
            validation.set(location, messages);
            if *fails && !registered.iter().any(|r| r == location) {
                registered.push(location.to_owned());
            }
            failing.retain(|f| f != location);
            if *fails {
                failing.push(location.to_owned());
            }
        }

        let expected: Vec<String> = registered
            .into_iter()
            .filter(|location| failing.contains(location))
            .collect();
        let summary: Vec<String> = validation
            .all_errors_for_location(None)
            .into_iter()
            .map(|entry| entry.location)
            .collect();
        prop_assert_eq!(&summary, &expected);

        let within: Vec<String> = validation
            .all_errors_for_location(Some(&prefix))
            .into_iter()
            .map(|entry| entry.location)
            .collect();
        let filtered: Vec<String> = summary
            .into_iter()
            .filter(|location| Location::parse(location.as_str()).unwrap().is_within(&prefix))
            .collect();
        prop_assert_eq!(within, filtered);
    }
}
