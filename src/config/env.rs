//! `${NAME}` environment-variable interpolation for config documents.
//!
//! Runs on the parsed document (before it is deserialized into
//! [`Config`](super::model::Config)) so substituted values never need
//! JSON/YAML escaping. Only string values are rewritten; keys are left
//! alone. Every unresolved name is collected so startup can report them
//! all at once.

use serde_json::Value;

/// Replace `${NAME}` tokens in every string value of `doc`.
///
/// Returns the sorted, de-duplicated list of names that `lookup` could
/// not resolve. The document is left partially substituted in that case
/// and must not be used.
pub fn interpolate<F>(doc: &mut Value, lookup: &F) -> Result<(), Vec<String>>
where
    F: Fn(&str) -> Option<String>,
{
    let mut missing = Vec::new();
    walk(doc, lookup, &mut missing);

    if missing.is_empty() {
        Ok(())
    } else {
        missing.sort_unstable();
        missing.dedup();
        Err(missing)
    }
}

fn walk<F>(value: &mut Value, lookup: &F, missing: &mut Vec<String>)
where
    F: Fn(&str) -> Option<String>,
{
    match value {
        Value::String(s) => {
            if s.contains("${") {
                *s = substitute(s, lookup, missing);
            }
        }
        Value::Array(items) => {
            for item in items {
                walk(item, lookup, missing);
            }
        }
        Value::Object(map) => {
            for item in map.values_mut() {
                walk(item, lookup, missing);
            }
        }
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
}

fn substitute<F>(input: &str, lookup: &F, missing: &mut Vec<String>) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            // Unterminated: keep the remainder as literal text
            out.push_str(&rest[start..]);
            return out;
        };

        let name = after[..end].trim();
        if is_var_name(name) {
            match lookup(name) {
                Some(v) => out.push_str(&v),
                None => missing.push(name.to_string()),
            }
        } else {
            out.push_str(&rest[start..start + 2 + end + 1]);
        }
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    out
}

fn is_var_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn env(name: &str) -> Option<String> {
        match name {
            "API_KEY" => Some("s3cret".into()),
            "HOST" => Some("collector.example".into()),
            _ => None,
        }
    }

    #[test]
    fn substitutes_nested_strings() {
        let mut doc = json!({
            "routes": [{
                "target_url": "https://${HOST}/mp/collect",
                "auth": {"type": "apikey", "key": "${API_KEY}"},
                "priority": 3
            }]
        });
        interpolate(&mut doc, &env).unwrap();
        assert_eq!(
            doc["routes"][0]["target_url"],
            "https://collector.example/mp/collect"
        );
        assert_eq!(doc["routes"][0]["auth"]["key"], "s3cret");
        assert_eq!(doc["routes"][0]["priority"], 3);
    }

    #[test]
    fn reports_every_missing_name_once() {
        let mut doc = json!({"a": "${NOPE}", "b": ["${ALSO_NOPE}", "${NOPE}"]});
        let missing = interpolate(&mut doc, &env).unwrap_err();
        assert_eq!(missing, vec!["ALSO_NOPE", "NOPE"]);
    }

    #[test]
    fn leaves_non_tokens_alone() {
        let mut doc = json!({"a": "cost: $5", "b": "${not a var}", "c": "open ${HOST"});
        interpolate(&mut doc, &env).unwrap();
        assert_eq!(doc["a"], "cost: $5");
        assert_eq!(doc["b"], "${not a var}");
        assert_eq!(doc["c"], "open ${HOST");
    }

    #[test]
    fn template_tokens_untouched() {
        let mut doc = json!({"a": "{{events.0.name}}"});
        interpolate(&mut doc, &env).unwrap();
        assert_eq!(doc["a"], "{{events.0.name}}");
    }
}
