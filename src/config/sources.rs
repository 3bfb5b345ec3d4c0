//! Reading the route config document from disk.
//!
//! [`parse_document_str`] turns file contents into a generic JSON tree
//! based on the file extension (JSON always, YAML and TOML behind their
//! features). [`load_file`] runs the full pipeline: read, parse,
//! interpolate `${VAR}` tokens, deserialize, validate, and hash.

use std::path::Path;

use serde_json::Value;
use sha2::{Digest, Sha256};

use super::env::interpolate;
use super::model::Config;
use super::validation::validate;
use super::ConfigVersion;
use crate::error::GatewayError;

/// Parse a config string into a generic document based on file extension.
pub fn parse_document_str(
    ext: &str,
    content: &str,
    path_display: &str,
) -> Result<Value, GatewayError> {
    let parse_err = |source: Box<dyn std::error::Error + Send + Sync>| GatewayError::ConfigParse {
        path: path_display.to_string(),
        source,
    };

    match ext {
        "json" => serde_json::from_str(content).map_err(|e| parse_err(Box::new(e))),

        #[cfg(feature = "yaml")]
        "yaml" | "yml" => serde_yml::from_str(content).map_err(|e| parse_err(Box::new(e))),

        #[cfg(feature = "toml")]
        "toml" => toml::from_str(content).map_err(|e| parse_err(Box::new(e))),

        other => Err(GatewayError::UnsupportedFormat(other.to_string())),
    }
}

/// Interpolate, deserialize and validate an already-parsed document.
pub fn config_from_document<F>(
    mut doc: Value,
    path_display: &str,
    lookup: &F,
) -> Result<Config, GatewayError>
where
    F: Fn(&str) -> Option<String>,
{
    interpolate(&mut doc, lookup).map_err(|vars| GatewayError::UnresolvedEnvVars { vars })?;

    let config: Config = serde_json::from_value(doc).map_err(|e| GatewayError::ConfigParse {
        path: path_display.to_string(),
        source: Box::new(e),
    })?;

    validate(&config).map_err(|errors| GatewayError::ConfigValidation { errors })?;
    Ok(config)
}

/// Compute a lowercase hex-encoded SHA-256 digest.
#[must_use]
pub fn sha256_hex(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

pub async fn load_file<F>(path: &Path, lookup: &F) -> Result<(Config, ConfigVersion), GatewayError>
where
    F: Fn(&str) -> Option<String>,
{
    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            GatewayError::ConfigFileNotFound {
                path: path.to_path_buf(),
            }
        } else {
            GatewayError::Io(e)
        }
    })?;

    let display = path.display().to_string();
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    let doc = parse_document_str(ext, &content, &display)?;
    let config = config_from_document(doc, &display, lookup)?;

    Ok((config, ConfigVersion::Hash(sha256_hex(content.as_bytes()))))
}
