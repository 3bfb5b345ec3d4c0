//! Dotted-path lookup inside a JSON value.
//!
//! `events.0.params.value` walks object keys and, when the current value
//! is an array and the segment is all digits, array indices. A present
//! `null`, `false`, `0` or `""` is a hit; only a broken walk is a miss.

use serde_json::Value;

/// Resolve `path` against `context`. `None` means NOT_FOUND.
#[must_use]
pub fn resolve<'a>(path: &str, context: &'a Value) -> Option<&'a Value> {
    path.split('.').try_fold(context, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) if is_index(segment) => {
            segment.parse::<usize>().ok().and_then(|i| items.get(i))
        }
        _ => None,
    })
}

fn is_index(segment: &str) -> bool {
    !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit())
}
