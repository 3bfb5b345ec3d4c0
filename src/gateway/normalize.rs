//! Inbound payload normalization and shape validation.
//!
//! POST bodies are parsed as JSON. GET requests carry a GA4
//! Measurement Protocol style query string that [`payload_from_query`]
//! turns into the same `{client_id, events: [{name, params}]}` shape.
//! [`validate_payload`] then checks the shape and yields the event name.

use serde_json::{Map, Number, Value};

/// Query keys that become top-level payload fields.
const ID_FIELDS: &[(&str, &str)] = &[
    ("cid", "client_id"),
    ("tid", "measurement_id"),
    ("uid", "user_id"),
];

const EVENT_NAME_KEY: &str = "en";

/// Well-known abbreviations mapped to event param names.
const PARAM_ALIASES: &[(&str, &str)] = &[
    ("dl", "page_location"),
    ("dr", "page_referrer"),
    ("dt", "page_title"),
    ("ul", "language"),
    ("sr", "screen_resolution"),
    ("cu", "currency"),
    ("sid", "session_id"),
    ("sct", "session_number"),
    ("seg", "session_engaged"),
    ("_et", "engagement_time_msec"),
];

/// Params coerced to numbers when they parse as one.
const NUMERIC_PARAMS: &[&str] = &[
    "value",
    "session_number",
    "engagement_time_msec",
    "quantity",
    "price",
    "tax",
    "shipping",
];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PayloadError {
    #[error("request body is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("payload must be a JSON object")]
    NotAnObject,

    #[error("payload must contain a non-empty 'events' array")]
    MissingEvents,

    #[error("events[0].name must be a string")]
    MissingEventName,
}

/// Parse a POST body.
pub fn payload_from_body(body: &[u8]) -> Result<Value, PayloadError> {
    serde_json::from_slice(body).map_err(|e| PayloadError::InvalidJson(e.to_string()))
}

/// Build a GA4-shaped payload from a `/g/collect` query string.
#[must_use]
pub fn payload_from_query(query: &str) -> Value {
    let mut payload = Map::new();
    let mut params = Map::new();
    let mut event_name = None;

    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        let key: &str = &key;
        let value = value.into_owned();

        if key == EVENT_NAME_KEY {
            event_name = Some(value);
        } else if let Some((_, field)) = ID_FIELDS.iter().find(|(k, _)| *k == key) {
            payload.insert((*field).to_string(), Value::String(value));
        } else if let Some(name) = key.strip_prefix("epn.") {
            params.insert(name.to_string(), coerce_number(value));
        } else if let Some(name) = key.strip_prefix("ep.") {
            params.insert(name.to_string(), Value::String(value));
        } else {
            let name = PARAM_ALIASES
                .iter()
                .find(|(k, _)| *k == key)
                .map_or(key, |(_, v)| *v);
            let value = if NUMERIC_PARAMS.contains(&name) {
                coerce_number(value)
            } else {
                Value::String(value)
            };
            params.insert(name.to_string(), value);
        }
    }

    let mut event = Map::new();
    if let Some(name) = event_name {
        event.insert("name".into(), Value::String(name));
    }
    event.insert("params".into(), Value::Object(params));
    payload.insert("events".into(), Value::Array(vec![Value::Object(event)]));

    Value::Object(payload)
}

fn coerce_number(raw: String) -> Value {
    let trimmed = raw.trim();
    if let Ok(i) = trimmed.parse::<i64>() {
        return Value::Number(Number::from(i));
    }
    trimmed
        .parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .and_then(Number::from_f64)
        .map_or(Value::String(raw), Value::Number)
}

/// Check the payload shape and return `events[0].name`.
pub fn validate_payload(payload: &Value) -> Result<&str, PayloadError> {
    let obj = payload.as_object().ok_or(PayloadError::NotAnObject)?;
    let first = obj
        .get("events")
        .and_then(Value::as_array)
        .and_then(|events| events.first())
        .ok_or(PayloadError::MissingEvents)?;
    first
        .get("name")
        .and_then(Value::as_str)
        .ok_or(PayloadError::MissingEventName)
}
