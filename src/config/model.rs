//! Serde data structures for the route configuration document.
//!
//! Contains [`Config`] (the root `{ "routes": [...] }`), [`RouteConfig`]
//! and [`AuthConfig`]. These are the raw, as-written shapes; the
//! validated runtime form is [`Route`](crate::gateway::routing::Route).
//! All types use `deny_unknown_fields` for strict parsing.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

use crate::gateway::auth::AuthStrategy;

fn default_methods() -> Vec<String> {
    vec!["POST".to_string()]
}

fn is_default_methods(v: &[String]) -> bool {
    v.len() == 1 && v[0].eq_ignore_ascii_case("POST")
}

fn is_false(v: &bool) -> bool {
    !*v
}

/// Wraps any present value, `null` included, so an explicit `null` stays
/// distinguishable from an absent field.
fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub routes: Vec<RouteConfig>,
}

impl Config {
    #[must_use]
    pub fn template_paths(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = self
            .routes
            .iter()
            .filter_map(RouteConfig::template_path)
            .collect();
        paths.sort_unstable();
        paths.dedup();
        paths
    }

    #[must_use]
    pub fn has_fallback(&self) -> bool {
        self.routes.iter().any(|r| r.fallback)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RouteConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    pub event_match: String,

    pub target_url: String,

    #[serde(
        default = "default_methods",
        skip_serializing_if = "is_default_methods"
    )]
    pub methods: Vec<String>,

    /// Relative to the templates directory. Absent means passthrough;
    /// `Some(None)` records an explicit `null`, which validation rejects.
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub template: Option<Option<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,

    #[serde(default, skip_serializing_if = "is_false")]
    pub multi: bool,

    #[serde(default, skip_serializing_if = "is_false")]
    pub fallback: bool,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
}

impl RouteConfig {
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("unnamed")
    }

    #[must_use]
    pub fn template_path(&self) -> Option<&str> {
        self.template.as_ref().and_then(Option::as_deref)
    }
}

/// Auth descriptor as written in the config file.
///
/// Kept flat so that validation can report a missing `type`, an unknown
/// `type`, or fields from two strategies at once, instead of surfacing a
/// single serde error. [`AuthConfig::strategy`] turns it into the tagged
/// [`AuthStrategy`] used at request time.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origins: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_ips: Option<Vec<String>>,
}

impl AuthConfig {
    pub const KNOWN_TYPES: &'static [&'static str] = &["apikey", "whitelist", "ip_whitelist"];

    /// Resolve the descriptor into exactly one strategy.
    pub fn strategy(&self) -> Result<AuthStrategy, String> {
        let Some(kind) = self.kind.as_deref() else {
            return Err("auth.type is required".into());
        };

        let (owned_field, strategy) = match kind {
            "apikey" => {
                let key = self
                    .key
                    .as_deref()
                    .filter(|k| !k.is_empty())
                    .ok_or("type 'apikey' requires a non-empty 'key'")?;
                (
                    "key",
                    AuthStrategy::ApiKey {
                        key: key.to_string(),
                    },
                )
            }
            "whitelist" => {
                let origins = self
                    .origins
                    .clone()
                    .filter(|o| !o.is_empty())
                    .ok_or("type 'whitelist' requires a non-empty 'origins' list")?;
                ("origins", AuthStrategy::Origin { origins })
            }
            "ip_whitelist" => {
                let allowed_ips = self
                    .allowed_ips
                    .clone()
                    .filter(|ips| !ips.is_empty())
                    .ok_or("type 'ip_whitelist' requires a non-empty 'allowed_ips' list")?;
                ("allowed_ips", AuthStrategy::IpAllowList { allowed_ips })
            }
            other => return Err(format!("unknown auth type '{other}'")),
        };

        let conflicting: Vec<&str> = [
            ("key", self.key.is_some()),
            ("origins", self.origins.is_some()),
            ("allowed_ips", self.allowed_ips.is_some()),
        ]
        .into_iter()
        .filter(|(field, set)| *set && *field != owned_field)
        .map(|(field, _)| field)
        .collect();

        if !conflicting.is_empty() {
            return Err(format!(
                "conflicting auth strategies: '{}' not allowed with type '{kind}'",
                conflicting.join("', '")
            ));
        }

        Ok(strategy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_defaults() {
        let route: RouteConfig = serde_json::from_str(
            r#"{"event_match": "purchase", "target_url": "http://a", "auth": {"type": "apikey", "key": "k"}}"#,
        )
        .unwrap();
        assert_eq!(route.methods, vec!["POST"]);
        assert_eq!(route.display_name(), "unnamed");
        assert!(!route.multi);
        assert!(!route.fallback);
        assert!(route.priority.is_none());
        assert!(route.template.is_none());
        assert!(route.headers.is_empty());
    }

    #[test]
    fn null_template_differs_from_absent() {
        let route: RouteConfig = serde_json::from_str(
            r#"{"event_match": "purchase", "target_url": "http://a", "template": null, "auth": {"type": "apikey", "key": "k"}}"#,
        )
        .unwrap();
        assert_eq!(route.template, Some(None));
        assert_eq!(route.template_path(), None);

        let route: RouteConfig = serde_json::from_str(
            r#"{"event_match": "purchase", "target_url": "http://a", "template": "t.json", "auth": {"type": "apikey", "key": "k"}}"#,
        )
        .unwrap();
        assert_eq!(route.template_path(), Some("t.json"));
    }

    #[test]
    fn non_integer_priority_rejected() {
        let result: Result<RouteConfig, _> = serde_json::from_str(
            r#"{"event_match": "a", "target_url": "http://a", "priority": 1.5}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn unknown_fields_rejected() {
        let result: Result<Config, _> = serde_json::from_str(r#"{"routes": [], "extra": 1}"#);
        assert!(result.is_err());
    }

    #[test]
    fn strategy_per_type() {
        let auth = AuthConfig {
            kind: Some("whitelist".into()),
            origins: Some(vec!["https://shop.example".into()]),
            ..AuthConfig::default()
        };
        assert!(matches!(auth.strategy(), Ok(AuthStrategy::Origin { .. })));

        let auth = AuthConfig {
            kind: Some("ip_whitelist".into()),
            allowed_ips: Some(vec!["10.0.0.1".into()]),
            ..AuthConfig::default()
        };
        assert!(matches!(
            auth.strategy(),
            Ok(AuthStrategy::IpAllowList { .. })
        ));
    }

    #[test]
    fn conflicting_strategies_rejected() {
        let auth = AuthConfig {
            kind: Some("apikey".into()),
            key: Some("secret".into()),
            origins: Some(vec!["https://a".into()]),
            ..AuthConfig::default()
        };
        let err = auth.strategy().unwrap_err();
        assert!(err.contains("conflicting auth strategies"));
        assert!(err.contains("'origins'"));
    }

    #[test]
    fn missing_and_unknown_type() {
        assert!(AuthConfig::default()
            .strategy()
            .unwrap_err()
            .contains("required"));

        let auth = AuthConfig {
            kind: Some("token".into()),
            ..AuthConfig::default()
        };
        assert!(auth.strategy().unwrap_err().contains("unknown auth type"));
    }

    #[test]
    fn empty_key_rejected() {
        let auth = AuthConfig {
            kind: Some("apikey".into()),
            key: Some(String::new()),
            ..AuthConfig::default()
        };
        assert!(auth.strategy().is_err());
    }

    #[test]
    fn template_paths_deduplicated() {
        let config: Config = serde_json::from_str(
            r#"{"routes": [
                {"event_match": "a", "target_url": "http://a", "template": "t.json"},
                {"event_match": "b", "target_url": "http://b", "template": "t.json"},
                {"event_match": "c", "target_url": "http://c"}
            ]}"#,
        )
        .unwrap();
        assert_eq!(config.template_paths(), vec!["t.json"]);
    }
}
