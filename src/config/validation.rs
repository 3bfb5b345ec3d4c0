//! Route config validation with detailed error reporting.
//!
//! The [`validate`] function checks a parsed [`Config`] for every problem
//! at once: empty route list, bad patterns and target URLs, unsupported
//! methods, unusable auth descriptors, unsafe template paths, invalid
//! header names and more than one fallback route. Returns a list of
//! [`ValidationError`] values with per-field suggestions.

use std::path::{Component, Path};

use axum::http::{HeaderName, HeaderValue};
use url::Url;

use super::model::{AuthConfig, Config, RouteConfig};
use crate::error::ValidationError;

pub const VALID_METHODS: &[&str] = &["GET", "POST"];

/// Validate a target URL. Returns `Ok(())` or a human-readable error.
pub fn validate_target_url(url: &str) -> Result<(), String> {
    match Url::parse(url) {
        Ok(parsed) => {
            let scheme = parsed.scheme();
            if scheme != "http" && scheme != "https" {
                Err(format!(
                    "unsupported scheme '{scheme}' (expected http or https)"
                ))
            } else {
                Ok(())
            }
        }
        Err(_) => Err(format!("'{url}' is not a valid URL")),
    }
}

/// Validate an HTTP method string. Returns `Ok(())` or a human-readable error.
pub fn validate_method(method: &str) -> Result<(), String> {
    let upper = method.to_uppercase();
    if VALID_METHODS.contains(&upper.as_str()) {
        Ok(())
    } else {
        Err(format!(
            "'{method}' is not accepted (events are collected with GET or POST)"
        ))
    }
}

/// Validate a template reference. Must stay inside the templates directory.
pub fn validate_template_path(path: &str) -> Result<(), String> {
    if path.trim().is_empty() {
        return Err("template path cannot be empty (omit the field for passthrough)".into());
    }
    let p = Path::new(path);
    if p.is_absolute() {
        return Err(format!("'{path}' must be relative to the templates directory"));
    }
    if p.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(format!("'{path}' must not contain '..'"));
    }
    Ok(())
}

pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.routes.is_empty() {
        errors.push(ValidationError {
            route: "(root)".into(),
            field: "routes".into(),
            message: "at least one route must be defined".into(),
            suggestion: None,
        });
        return Err(errors);
    }

    let mut fallbacks = Vec::new();

    for (i, route) in config.routes.iter().enumerate() {
        let route_id = route
            .name
            .clone()
            .unwrap_or_else(|| format!("routes[{i}]"));

        validate_route(&route_id, route, &mut errors);

        if route.fallback {
            fallbacks.push(route_id);
        }
    }

    if fallbacks.len() > 1 {
        errors.push(ValidationError {
            route: "(root)".into(),
            field: "fallback".into(),
            message: format!(
                "{} routes marked as fallback ({}), at most 1 allowed",
                fallbacks.len(),
                fallbacks.join(", ")
            ),
            suggestion: None,
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_route(route_id: &str, route: &RouteConfig, errors: &mut Vec<ValidationError>) {
    let mut push = |field: &str, message: String, suggestion: Option<String>| {
        errors.push(ValidationError {
            route: route_id.to_string(),
            field: field.into(),
            message,
            suggestion,
        });
    };

    if route.event_match.trim().is_empty() {
        push(
            "event_match",
            "pattern cannot be empty".into(),
            Some("use '*' to match every event".into()),
        );
    }

    if let Err(msg) = validate_target_url(&route.target_url) {
        push("target_url", msg, None);
    }

    if route.methods.is_empty() {
        push(
            "methods",
            "at least one method must be listed".into(),
            Some("omit the field to accept POST only".into()),
        );
    }
    for method in &route.methods {
        if let Err(msg) = validate_method(method) {
            push("methods", msg, None);
        }
    }

    match &route.auth {
        None => push(
            "auth",
            "an auth strategy is required".into(),
            Some(format!(
                "set auth.type to one of {}",
                AuthConfig::KNOWN_TYPES.join(", ")
            )),
        ),
        Some(auth) => {
            if let Err(msg) = auth.strategy() {
                let suggestion = match auth.kind.as_deref() {
                    Some(kind) if AuthConfig::KNOWN_TYPES.contains(&kind) => None,
                    _ => Some(format!("use {}", AuthConfig::KNOWN_TYPES.join(", "))),
                };
                push("auth", msg, suggestion);
            }
        }
    }

    match &route.template {
        Some(None) => push(
            "template",
            "template cannot be null".into(),
            Some("omit the field for passthrough".into()),
        ),
        Some(Some(template)) => {
            if let Err(msg) = validate_template_path(template) {
                push("template", msg, None);
            }
        }
        None => {}
    }

    for (name, value) in &route.headers {
        if name.parse::<HeaderName>().is_err() {
            push("headers", format!("'{name}' is not a valid header name"), None);
        } else if HeaderValue::from_str(value).is_err() {
            push(
                "headers",
                format!("value for '{name}' is not a valid header value"),
                None,
            );
        }
    }
}

#[must_use]
pub fn format_validation_report(path: &str, config: &Config) -> String {
    let templates = config.template_paths().len();
    let mut lines = vec![format!(
        "  {} routes, {} templates{}\n",
        config.routes.len(),
        templates,
        if config.has_fallback() {
            ", fallback configured"
        } else {
            ""
        }
    )];

    for route in &config.routes {
        let mode = route
            .template_path()
            .map_or_else(|| "passthrough".to_string(), |t| format!("template {t}"));
        let auth = route
            .auth
            .as_ref()
            .and_then(|a| a.kind.as_deref())
            .unwrap_or("none");
        let priority = route
            .priority
            .map_or_else(|| "none".to_string(), |p| p.to_string());

        let mut flags = Vec::new();
        if route.multi {
            flags.push("multi");
        }
        if route.fallback {
            flags.push("fallback");
        }

        lines.push(format!(
            "  {}  {}  -> {} ({mode})",
            route.display_name(),
            route.event_match,
            route.target_url,
        ));
        lines.push(format!(
            "    methods: {}  auth: {auth}  priority: {priority}{}",
            route.methods.join(", "),
            if flags.is_empty() {
                String::new()
            } else {
                format!("  [{}]", flags.join(", "))
            }
        ));
    }

    format!("{} is valid\n{}", path, lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::config::model::{AuthConfig, Config, RouteConfig};

    fn apikey() -> Option<AuthConfig> {
        Some(AuthConfig {
            kind: Some("apikey".into()),
            key: Some("secret".into()),
            ..AuthConfig::default()
        })
    }

    fn route(name: &str) -> RouteConfig {
        RouteConfig {
            name: Some(name.into()),
            event_match: "purchase".into(),
            target_url: "http://localhost:8080/collect".into(),
            methods: vec!["POST".into()],
            template: None,
            auth: apikey(),
            priority: None,
            multi: false,
            fallback: false,
            headers: BTreeMap::new(),
        }
    }

    fn config(routes: Vec<RouteConfig>) -> Config {
        Config { routes }
    }

    #[test]
    fn valid_config_passes() {
        assert!(validate(&config(vec![route("a")])).is_ok());
    }

    #[test]
    fn empty_routes_fails() {
        let errors = validate(&config(vec![])).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("at least one route"));
    }

    #[test]
    fn two_fallbacks_fail() {
        let mut a = route("a");
        a.fallback = true;
        let mut b = route("b");
        b.fallback = true;
        let errors = validate(&config(vec![a, b])).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| e.field == "fallback" && e.message.contains("a, b")));
    }

    #[test]
    fn missing_auth_fails_with_suggestion() {
        let mut r = route("a");
        r.auth = None;
        let errors = validate(&config(vec![r])).unwrap_err();
        assert_eq!(errors[0].field, "auth");
        assert!(errors[0]
            .suggestion
            .as_deref()
            .unwrap()
            .contains("ip_whitelist"));
    }

    #[test]
    fn unsupported_method_fails() {
        let mut r = route("a");
        r.methods = vec!["post".into(), "PUT".into()];
        let errors = validate(&config(vec![r])).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("'PUT'"));
    }

    #[test]
    fn invalid_url_fails() {
        let mut r = route("a");
        r.target_url = "not a url".into();
        let errors = validate(&config(vec![r])).unwrap_err();
        assert!(errors.iter().any(|e| e.message.contains("not a valid URL")));

        let mut r = route("b");
        r.target_url = "ftp://files.example".into();
        let errors = validate(&config(vec![r])).unwrap_err();
        assert!(errors.iter().any(|e| e.message.contains("unsupported scheme")));
    }

    #[test]
    fn template_escape_fails() {
        let mut r = route("a");
        r.template = Some(Some("../secrets.json".into()));
        let errors = validate(&config(vec![r])).unwrap_err();
        assert!(errors.iter().any(|e| e.field == "template"));

        let mut r = route("b");
        r.template = Some(Some(String::new()));
        assert!(validate(&config(vec![r])).is_err());

        let mut r = route("c");
        r.template = Some(None);
        let errors = validate(&config(vec![r])).unwrap_err();
        assert!(errors.iter().any(|e| e.field == "template" && e.message.contains("null")));
    }

    #[test]
    fn invalid_header_fails() {
        let mut r = route("a");
        r.headers.insert("bad header".into(), "x".into());
        let errors = validate(&config(vec![r])).unwrap_err();
        assert!(errors[0].message.contains("not a valid header name"));
    }

    #[test]
    fn collects_every_error() {
        let mut r = route("a");
        r.event_match = String::new();
        r.target_url = "nope".into();
        r.methods = vec![];
        let errors = validate(&config(vec![r])).unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn unnamed_routes_identified_by_index() {
        let mut r = route("a");
        r.name = None;
        r.event_match = " ".into();
        let errors = validate(&config(vec![route("ok"), r])).unwrap_err();
        assert_eq!(errors[0].route, "routes[1]");
    }

    #[test]
    fn report_lists_routes() {
        let mut r = route("checkout");
        r.template = Some(Some("purchase.json".into()));
        r.multi = true;
        let report = format_validation_report("routes.json", &config(vec![r]));
        assert!(report.starts_with("routes.json is valid"));
        assert!(report.contains("checkout  purchase  -> http://localhost:8080/collect (template purchase.json)"));
        assert!(report.contains("[multi]"));
    }
}
