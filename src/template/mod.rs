//! JSON templates resolved against the request context.
//!
//! A template is a JSON document whose string leaves may contain
//! `{{path || fallback}}` tokens ([`expr`]), resolved by dotted-path
//! lookup ([`path`]). [`render`] walks the document; a string leaf with
//! any missing token is dropped from its parent instead of being emitted
//! with holes. Token results are always strings, so a template can never
//! inject structure.
//!
//! [`TemplateStore`] loads documents from the templates directory once
//! and caches them by their relative path.

pub mod expr;
pub mod path;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;
use serde_json::{Map, Value};

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("template '{path}' not found in {}", dir.display())]
    NotFound { path: String, dir: PathBuf },

    #[error("failed to read template '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid template path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("template '{path}' is not valid JSON: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Per-request values exposed to templates under the `meta` key.
#[derive(Debug, Clone, Serialize)]
pub struct RequestMeta {
    pub ip: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    pub timestamp: String,
}

pub struct TemplateStore {
    base_dir: PathBuf,
    cache: RwLock<HashMap<String, Arc<Value>>>,
    bypass_cache: bool,
}

impl TemplateStore {
    #[must_use]
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            cache: RwLock::new(HashMap::new()),
            bypass_cache: false,
        }
    }

    /// Re-read templates from disk on every [`load`](Self::load) or
    /// [`fetch`](Self::fetch).
    #[must_use]
    pub const fn bypass_cache(mut self, bypass: bool) -> Self {
        self.bypass_cache = bypass;
        self
    }

    /// Load every referenced template, failing on the first broken one.
    ///
    /// Runs before the server starts, so it reads synchronously.
    pub fn preload<'a, I>(&self, paths: I) -> Result<usize, TemplateError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut count = 0;
        for path in paths {
            self.load(path)?;
            tracing::debug!(template = %path, "template loaded");
            count += 1;
        }
        Ok(count)
    }

    /// Return the cached document for `path`, reading it on first use.
    ///
    /// Blocking; request handlers go through [`fetch`](Self::fetch).
    pub fn load(&self, path: &str) -> Result<Arc<Value>, TemplateError> {
        if let Some(doc) = self.cached(path) {
            return Ok(doc);
        }
        let full = self.full_path(path)?;
        let content = std::fs::read_to_string(&full).map_err(|e| self.read_error(path, e))?;
        self.parse_and_cache(path, &content)
    }

    /// Async [`load`](Self::load): cache misses are read with `tokio::fs`.
    pub async fn fetch(&self, path: &str) -> Result<Arc<Value>, TemplateError> {
        if let Some(doc) = self.cached(path) {
            return Ok(doc);
        }
        let full = self.full_path(path)?;
        let content = tokio::fs::read_to_string(&full)
            .await
            .map_err(|e| self.read_error(path, e))?;
        tracing::debug!(template = %path, "template reloaded");
        self.parse_and_cache(path, &content)
    }

    /// Drop every cached document.
    pub fn invalidate(&self) {
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fetch `template_path` and render it against `payload` plus `meta`.
    pub async fn process(
        &self,
        template_path: &str,
        payload: &Value,
        meta: &RequestMeta,
    ) -> Result<Value, TemplateError> {
        let doc = self.fetch(template_path).await?;
        let context = build_context(payload, meta);
        Ok(render_document(&doc, &context))
    }

    fn cached(&self, path: &str) -> Option<Arc<Value>> {
        if self.bypass_cache {
            return None;
        }
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .map(Arc::clone)
    }

    fn full_path(&self, path: &str) -> Result<PathBuf, TemplateError> {
        crate::config::validation::validate_template_path(path).map_err(|reason| {
            TemplateError::InvalidPath {
                path: path.to_string(),
                reason,
            }
        })?;
        Ok(self.base_dir.join(path))
    }

    fn read_error(&self, path: &str, e: std::io::Error) -> TemplateError {
        if e.kind() == std::io::ErrorKind::NotFound {
            TemplateError::NotFound {
                path: path.to_string(),
                dir: self.base_dir.clone(),
            }
        } else {
            TemplateError::Read {
                path: path.to_string(),
                source: e,
            }
        }
    }

    fn parse_and_cache(&self, path: &str, content: &str) -> Result<Arc<Value>, TemplateError> {
        let doc: Value = serde_json::from_str(content).map_err(|e| TemplateError::Parse {
            path: path.to_string(),
            source: e,
        })?;
        let doc = Arc::new(doc);

        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.to_string(), Arc::clone(&doc));
        Ok(doc)
    }
}

/// The payload object with `meta` set under the `meta` key.
///
/// A non-object payload contributes nothing but `meta`.
#[must_use]
pub fn build_context(payload: &Value, meta: &RequestMeta) -> Value {
    let mut context = match payload {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    };
    let meta = serde_json::to_value(meta).unwrap_or(Value::Null);
    context.insert("meta".to_string(), meta);
    Value::Object(context)
}

/// Render a whole document. A document that is itself missing becomes `null`.
#[must_use]
pub fn render_document(doc: &Value, context: &Value) -> Value {
    render(doc, context).unwrap_or(Value::Null)
}

/// Render one node. `None` means the node is missing and must be omitted.
#[must_use]
pub fn render(node: &Value, context: &Value) -> Option<Value> {
    match node {
        Value::String(s) => render_str(s, context).map(Value::String),
        Value::Array(items) => Some(Value::Array(
            items.iter().filter_map(|item| render(item, context)).collect(),
        )),
        Value::Object(map) => Some(Value::Object(
            map.iter()
                .filter_map(|(key, value)| render(value, context).map(|v| (key.clone(), v)))
                .collect(),
        )),
        Value::Null | Value::Bool(_) | Value::Number(_) => Some(node.clone()),
    }
}

fn render_str(input: &str, context: &Value) -> Option<String> {
    if !input.contains("{{") {
        return Some(input.to_string());
    }

    let mut out = String::with_capacity(input.len());
    for piece in expr::scan(input) {
        match piece {
            expr::Piece::Text(text) => out.push_str(text),
            expr::Piece::Token(token) => out.push_str(&token.evaluate(context)?),
        }
    }
    Some(out)
}
