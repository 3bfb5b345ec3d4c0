//! `{{ ... }}` token scanning and expression evaluation.
//!
//! Grammar: `<path> [ '||' <fallback> ]`, split on the first `||`.
//! A fallback is tried as, in order: a quoted string, `null`,
//! `true`/`false`, a signed integer or decimal, and otherwise another
//! path. Chained fallbacks (`a || b || c`) are not supported: everything
//! after the first `||` is one fallback expression.

use serde_json::{Number, Value};

use super::path::resolve;

/// A piece of a template string leaf.
#[derive(Debug, PartialEq)]
pub enum Piece<'a> {
    Text(&'a str),
    Token(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub path: String,
    pub fallback: Option<Fallback>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Fallback {
    Literal(Value),
    Path(String),
}

impl Expr {
    #[must_use]
    pub fn parse(src: &str) -> Self {
        match src.split_once("||") {
            Some((path, fallback)) => Self {
                path: path.trim().to_string(),
                fallback: Some(Fallback::parse(fallback.trim())),
            },
            None => Self {
                path: src.trim().to_string(),
                fallback: None,
            },
        }
    }

    /// Resolve to the string that replaces the token, or `None` if missing.
    #[must_use]
    pub fn evaluate(&self, context: &Value) -> Option<String> {
        if let Some(found) = resolve(&self.path, context) {
            return Some(stringify(found));
        }
        match self.fallback.as_ref()? {
            Fallback::Literal(value) => Some(stringify(value)),
            Fallback::Path(path) => resolve(path, context).map(stringify),
        }
    }
}

impl Fallback {
    fn parse(src: &str) -> Self {
        if let Some(s) = unquote(src) {
            return Self::Literal(Value::String(s.to_string()));
        }
        match src {
            "null" => return Self::Literal(Value::Null),
            "true" => return Self::Literal(Value::Bool(true)),
            "false" => return Self::Literal(Value::Bool(false)),
            _ => {}
        }
        if let Some(n) = parse_number(src) {
            return Self::Literal(Value::Number(n));
        }
        Self::Path(src.to_string())
    }
}

fn unquote(src: &str) -> Option<&str> {
    let bytes = src.as_bytes();
    if bytes.len() < 2 {
        return None;
    }
    let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
    if (first == b'\'' || first == b'"') && first == last {
        Some(&src[1..src.len() - 1])
    } else {
        None
    }
}

fn parse_number(src: &str) -> Option<Number> {
    let unsigned = src.strip_prefix(['-', '+']).unwrap_or(src);
    let (int_part, frac_part) = match unsigned.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (unsigned, None),
    };

    let digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    if !digits(int_part) || frac_part.is_some_and(|f| !digits(f)) {
        return None;
    }

    if frac_part.is_none() {
        if let Ok(i) = src.parse::<i64>() {
            return Some(Number::from(i));
        }
    }
    src.parse::<f64>().ok().and_then(Number::from_f64)
}

/// Canonical string form of a resolved value.
#[must_use]
pub fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => number_to_string(n),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

#[allow(clippy::float_cmp)]
fn number_to_string(n: &Number) -> String {
    if n.is_i64() || n.is_u64() {
        return n.to_string();
    }
    match n.as_f64() {
        Some(f) if f == 0.0 => "0".to_string(),
        Some(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e21 => format!("{f:.0}"),
        Some(f) => f.to_string(),
        None => n.to_string(),
    }
}

/// Split a string leaf into literal text and tokens.
///
/// An opening `{{` with no closing `}}`, or with nothing but whitespace
/// inside, is literal text.
#[must_use]
pub fn scan(input: &str) -> Vec<Piece<'_>> {
    let mut pieces = Vec::new();
    let mut rest = input;

    while let Some(open) = rest.find("{{") {
        let inner_start = open + 2;
        let Some(close) = rest[inner_start..].find("}}") else {
            break;
        };
        let inner = &rest[inner_start..inner_start + close];

        if inner.trim().is_empty() {
            pieces.push(Piece::Text(&rest[..inner_start]));
            rest = &rest[inner_start..];
            continue;
        }

        if open > 0 {
            pieces.push(Piece::Text(&rest[..open]));
        }
        pieces.push(Piece::Token(Expr::parse(inner)));
        rest = &rest[inner_start + close + 2..];
    }

    if !rest.is_empty() {
        pieces.push(Piece::Text(rest));
    }
    pieces
}
