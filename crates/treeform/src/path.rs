#![forbid(unsafe_code)]

//! Reading and writing values at a [`Location`] inside a JSON model.
//!
//! Reads borrow from the model. Writes never touch their input: they return a
//! new top-level model and leave the caller's value exactly as it was, which is
//! what lets hosts detect changes by comparing old and new models.
//!
//! # Write rules
//!
//! | Value at segment | Segment | Behavior |
//! |------------------|---------|----------|
//! | mapping | any | descend into / insert key |
//! | missing or `null` | any | create a mapping |
//! | sequence | index `< len` | descend into element |
//! | sequence | index `>= len` | [`PathError::IndexOutOfRange`] |
//! | sequence | non-index | [`PathError::NotIndexable`] |
//! | scalar | any | [`PathError::NotIndexable`] |
//!
//! Sequences are never created or grown by a write.

use std::borrow::Cow;

use serde_json::{Map, Value};

use crate::error::PathError;
use crate::location::{Location, Segment};

/// Read the value at `location`, or `None` when any segment is missing.
#[must_use]
pub fn read<'m>(model: &'m Value, location: &Location) -> Option<&'m Value> {
    location
        .segments()
        .try_fold(model, |node, segment| step(node, segment))
}

fn step<'v>(node: &'v Value, segment: Segment<'_>) -> Option<&'v Value> {
    match node {
        Value::Object(map) => map.get(segment.key()),
        Value::Array(items) => segment.index().and_then(|index| items.get(index)),
        _ => None,
    }
}

/// Read `location`, falling back to each of `failovers` in order.
///
/// Returns the first defined value. When every location is undefined the
/// result is an empty string, the natural blank for a text field.
#[must_use]
pub fn read_with_failover<'m>(
    model: &'m Value,
    location: &Location,
    failovers: &[Location],
) -> Cow<'m, Value> {
    std::iter::once(location)
        .chain(failovers)
        .find_map(|candidate| read(model, candidate))
        .map_or_else(|| Cow::Owned(Value::String(String::new())), Cow::Borrowed)
}

/// Return a copy of `model` with `value` stored at `location`.
///
/// Missing intermediate mappings are created. The input model is never
/// modified, including when the write fails.
pub fn write(model: &Value, location: &Location, value: Value) -> Result<Value, PathError> {
    let mut next = model.clone();
    write_in_place(&mut next, location, value)?;
    Ok(next)
}

fn write_in_place(root: &mut Value, location: &Location, value: Value) -> Result<(), PathError> {
    let segments: Vec<Segment<'_>> = location.segments().collect();
    let (last, parents) = segments.split_last().ok_or(PathError::Empty)?;

    let mut node = root;
    for segment in parents {
        node = slot(node, *segment, location)?;
    }
    *slot(node, *last, location)? = value;
    Ok(())
}

/// Resolve the mutable slot `segment` names inside `node`, creating a mapping
/// entry when needed.
fn slot<'v>(
    node: &'v mut Value,
    segment: Segment<'_>,
    location: &Location,
) -> Result<&'v mut Value, PathError> {
    if node.is_null() {
        *node = Value::Object(Map::new());
    }
    match node {
        Value::Object(map) => Ok(map.entry(segment.key()).or_insert(Value::Null)),
        Value::Array(items) => {
            let len = items.len();
            let index = segment.index().ok_or_else(|| PathError::NotIndexable {
                location: location.to_string(),
                segment: segment.to_string(),
                found: "a sequence",
            })?;
            items
                .get_mut(index)
                .ok_or_else(|| PathError::IndexOutOfRange {
                    location: location.to_string(),
                    index,
                    len,
                })
        }
        other => Err(PathError::NotIndexable {
            location: location.to_string(),
            segment: segment.to_string(),
            found: kind(other),
        }),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a sequence",
        Value::Object(_) => "a mapping",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn loc(raw: &str) -> Location {
        Location::parse(raw).unwrap()
    }

    #[test]
    fn read_walks_mappings_and_sequences() {
        let model = json!({
            "lists": { "emails": [ { "email": "a@x.io" }, { "email": "b@x.io" } ] }
        });
        assert_eq!(read(&model, &loc("lists.emails.1.email")), Some(&json!("b@x.io")));
        assert_eq!(read(&model, &loc("lists.emails.2.email")), None);
        assert_eq!(read(&model, &loc("lists.emails.first")), None);
        assert_eq!(read(&model, &loc("lists.missing.deeper")), None);
    }

    #[test]
    fn read_through_scalar_is_undefined() {
        let model = json!({ "name": "Stewart" });
        assert_eq!(read(&model, &loc("name.first")), None);
    }

    #[test]
    fn numeric_segment_is_a_key_on_mappings() {
        let model = json!({ "codes": { "0": "zero" } });
        assert_eq!(read(&model, &loc("codes.0")), Some(&json!("zero")));
    }

    #[test]
    fn null_is_a_defined_value() {
        let model = json!({ "a": null, "b": "fallback" });
        assert_eq!(
            read_with_failover(&model, &loc("a"), &[loc("b")]).into_owned(),
            Value::Null
        );
    }

    #[test]
    fn failover_picks_first_defined_in_order() {
        let model = json!({
            "second": { "backupLocation": "correct" },
            "third": { "backupLocation": "wrong, I'm the third one" }
        });
        let value = read_with_failover(
            &model,
            &loc("primary.location"),
            &[
                loc("first.backupLocation"),
                loc("second.backupLocation"),
                loc("third.backupLocation"),
            ],
        );
        assert_eq!(value.into_owned(), json!("correct"));
    }

    #[test]
    fn failover_defaults_to_empty_string() {
        let model = json!({});
        let value = read_with_failover(&model, &loc("contact.email"), &[loc("other")]);
        assert_eq!(value.into_owned(), json!(""));
    }

    #[test]
    fn write_creates_intermediate_mappings() {
        let model = json!({});
        let next = write(&model, &loc("contact.email"), json!("s@x.io")).unwrap();
        assert_eq!(next, json!({ "contact": { "email": "s@x.io" } }));
        assert_eq!(model, json!({}));
    }

    #[test]
    fn write_replaces_null_intermediate() {
        let model = json!({ "contact": null });
        let next = write(&model, &loc("contact.email"), json!("x")).unwrap();
        assert_eq!(next, json!({ "contact": { "email": "x" } }));
    }

    #[test]
    fn write_into_sequence_element_keeps_siblings() {
        let model = json!({ "emails": [ { "email": "a" }, { "email": "b" } ] });
        let next = write(&model, &loc("emails.1.email"), json!("c")).unwrap();
        assert_eq!(next, json!({ "emails": [ { "email": "a" }, { "email": "c" } ] }));
        assert_eq!(model["emails"][1]["email"], json!("b"));
    }

    #[test]
    fn write_never_grows_sequences() {
        let model = json!({ "emails": [ "a" ] });
        assert_eq!(
            write(&model, &loc("emails.1"), json!("b")),
            Err(PathError::IndexOutOfRange {
                location: "emails.1".into(),
                index: 1,
                len: 1,
            })
        );
    }

    #[test]
    fn write_rejects_key_on_sequence_and_scalar_descent() {
        let model = json!({ "emails": [], "name": "Stewart" });
        assert!(matches!(
            write(&model, &loc("emails.first"), json!(1)),
            Err(PathError::NotIndexable { found: "a sequence", .. })
        ));
        assert!(matches!(
            write(&model, &loc("name.first"), json!(1)),
            Err(PathError::NotIndexable { found: "a string", .. })
        ));
    }

    #[test]
    fn write_to_failover_target_goes_to_primary() {
        let model = json!({ "second": { "backupLocation": "correct" } });
        let next = write(&model, &loc("primary.location"), json!("updated value")).unwrap();
        assert_eq!(
            next,
            json!({
                "primary": { "location": "updated value" },
                "second": { "backupLocation": "correct" }
            })
        );
    }
}
