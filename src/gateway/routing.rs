//! Event-name routing: wildcard patterns and the priority-ordered route table.
//!
//! [`wildcard_matches`] tests an event name against `*`, exact, or glob
//! patterns such as `purchase.*`. [`RouteTable`] holds the validated
//! routes sorted by priority (stable, absent priority last) plus the
//! optional fallback route, and answers [`RouteTable::find_matches`].

use std::collections::BTreeSet;

use axum::http::{header, HeaderMap, HeaderName, HeaderValue};

use super::auth::AuthStrategy;
use crate::config::model::{Config, RouteConfig};
use crate::config::validation::validate;
use crate::error::{GatewayError, ValidationError};

/// Glob match where `*` stands for any run of characters (including none)
/// and every other character is literal. The whole value must match.
#[must_use]
pub fn wildcard_matches(pattern: &str, value: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    if !pattern.contains('*') {
        return pattern == value;
    }

    let mut parts = pattern.split('*');
    // `split` always yields at least one item
    let first = parts.next().unwrap_or_default();
    let Some(mut rest) = value.strip_prefix(first) else {
        return false;
    };

    let mut parts: Vec<&str> = parts.collect();
    let last = parts.pop().unwrap_or_default();

    for part in parts {
        if part.is_empty() {
            continue;
        }
        match rest.find(part) {
            Some(at) => rest = &rest[at + part.len()..],
            None => return false,
        }
    }

    rest.len() >= last.len() && rest.ends_with(last)
}

/// A validated route, ready for request-time use.
#[derive(Debug, Clone)]
pub struct Route {
    pub name: String,
    pub event_match: String,
    pub target_url: String,
    /// Upper-case method names.
    pub methods: Vec<String>,
    pub template: Option<String>,
    pub auth: AuthStrategy,
    pub priority: Option<i64>,
    pub multi: bool,
    pub fallback: bool,
    /// Outbound headers: `content-type: application/json` merged with the route's own.
    pub headers: HeaderMap,
}

impl Route {
    pub fn from_config(index: usize, cfg: &RouteConfig) -> Result<Self, ValidationError> {
        let route_id = cfg.name.clone().unwrap_or_else(|| format!("routes[{index}]"));
        let invalid = |field: &str, message: String| ValidationError {
            route: route_id.clone(),
            field: field.into(),
            message,
            suggestion: None,
        };

        let auth = cfg
            .auth
            .as_ref()
            .ok_or_else(|| invalid("auth", "an auth strategy is required".into()))?
            .strategy()
            .map_err(|msg| invalid("auth", msg))?;

        Ok(Self {
            name: cfg.display_name().to_string(),
            event_match: cfg.event_match.clone(),
            target_url: cfg.target_url.clone(),
            methods: cfg.methods.iter().map(|m| m.to_uppercase()).collect(),
            template: cfg.template_path().map(String::from),
            auth,
            priority: cfg.priority,
            multi: cfg.multi,
            fallback: cfg.fallback,
            headers: outbound_headers(cfg).map_err(|msg| invalid("headers", msg))?,
        })
    }

    #[must_use]
    pub fn allows_method(&self, method: &str) -> bool {
        self.methods.iter().any(|m| m.eq_ignore_ascii_case(method))
    }

    #[must_use]
    pub fn matches(&self, event_name: &str, method: &str) -> bool {
        self.allows_method(method) && wildcard_matches(&self.event_match, event_name)
    }
}

fn outbound_headers(cfg: &RouteConfig) -> Result<HeaderMap, String> {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    for (name, value) in &cfg.headers {
        let name: HeaderName = name
            .parse()
            .map_err(|_| format!("'{name}' is not a valid header name"))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| format!("value for '{name}' is not a valid header value"))?;
        headers.insert(name, value);
    }
    Ok(headers)
}

#[derive(Debug, Clone)]
pub struct RouteTable {
    routes: Vec<Route>,
    fallback: Option<Route>,
}

impl RouteTable {
    /// Validate `config` and build the table.
    pub fn from_config(config: &Config) -> Result<Self, GatewayError> {
        validate(config).map_err(|errors| GatewayError::ConfigValidation { errors })?;

        let routes = config
            .routes
            .iter()
            .enumerate()
            .map(|(i, r)| Route::from_config(i, r))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| GatewayError::ConfigValidation { errors: vec![e] })?;

        Ok(Self::new(routes))
    }

    /// Build from already-validated routes. The first route flagged
    /// `fallback` becomes the fallback; the rest are sorted by priority.
    #[must_use]
    pub fn new(routes: Vec<Route>) -> Self {
        let mut fallback = None;
        let mut regular = Vec::with_capacity(routes.len());
        for route in routes {
            if route.fallback && fallback.is_none() {
                fallback = Some(route);
            } else {
                regular.push(route);
            }
        }

        // Stable: equal priorities keep declaration order
        regular.sort_by_key(|r| (r.priority.is_none(), r.priority.unwrap_or_default()));

        Self {
            routes: regular,
            fallback,
        }
    }

    /// Routes to execute for `event_name`, in order.
    ///
    /// Scanning continues past matching `multi` routes and stops right
    /// after the first matching route that is not `multi`.
    #[must_use]
    pub fn find_matches(&self, event_name: &str, method: &str) -> Vec<&Route> {
        let mut matched = Vec::new();
        for route in &self.routes {
            if !route.matches(event_name, method) {
                continue;
            }
            matched.push(route);
            if !route.multi {
                break;
            }
        }
        matched
    }

    #[must_use]
    pub const fn fallback(&self) -> Option<&Route> {
        self.fallback.as_ref()
    }

    /// Regular routes in match order.
    #[must_use]
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len() + usize::from(self.fallback.is_some())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Union of every route's methods, fallback included, sorted.
    #[must_use]
    pub fn allowed_methods(&self) -> BTreeSet<&str> {
        self.routes
            .iter()
            .chain(self.fallback.iter())
            .flat_map(|r| r.methods.iter().map(String::as_str))
            .collect()
    }

    #[must_use]
    pub fn allows_method(&self, method: &str) -> bool {
        self.routes
            .iter()
            .chain(self.fallback.iter())
            .any(|r| r.allows_method(method))
    }
}
