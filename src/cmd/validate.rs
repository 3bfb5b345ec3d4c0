//! `beacon-gateway validate`: check a route config and its templates.
//!
//! Runs the same load pipeline as `run` (parse, `${VAR}` interpolation,
//! validation) and then parses every referenced template, reporting in
//! human-readable text or machine-readable JSON.

use serde_json::json;

use crate::cli::{ValidateArgs, ValidateFormat};
use crate::config::{process_env, sources, validation};
use crate::error::GatewayError;
use crate::template::TemplateStore;

pub async fn execute(args: &ValidateArgs) -> Result<(), GatewayError> {
    let path = &args.config;

    let (config, version) = match sources::load_file(path, &process_env).await {
        Ok(loaded) => loaded,
        Err(GatewayError::ConfigValidation { errors }) => {
            match args.format {
                ValidateFormat::Text => {
                    eprintln!("\u{2717} {} has {} errors\n", path.display(), errors.len());
                    for error in &errors {
                        eprintln!("{error}");
                    }
                }
                ValidateFormat::Json => {
                    let json_errors: Vec<serde_json::Value> = errors
                        .iter()
                        .map(|e| {
                            json!({
                                "route": e.route,
                                "field": e.field,
                                "message": e.message,
                                "suggestion": e.suggestion,
                            })
                        })
                        .collect();
                    println!("{}", json!({ "valid": false, "errors": json_errors }));
                }
            }
            return Err(GatewayError::ConfigValidation { errors });
        }
        Err(e) => return Err(e),
    };

    let store = TemplateStore::new(&args.templates_dir);
    if let Err(e) = store.preload(config.template_paths()) {
        match args.format {
            ValidateFormat::Text => eprintln!("\u{2717} {}: {e}", path.display()),
            ValidateFormat::Json => println!(
                "{}",
                json!({ "valid": false, "errors": [{ "field": "template", "message": e.to_string() }] })
            ),
        }
        return Err(e.into());
    }

    match args.format {
        ValidateFormat::Text => {
            println!(
                "\u{2713} {}",
                validation::format_validation_report(&path.display().to_string(), &config)
            );
        }
        ValidateFormat::Json => {
            println!(
                "{}",
                json!({
                    "valid": true,
                    "version": version.short(),
                    "routes": config.routes.len(),
                    "templates": store.len(),
                    "fallback": config.has_fallback(),
                })
            );
        }
    }

    Ok(())
}
