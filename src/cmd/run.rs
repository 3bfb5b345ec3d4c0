//! `beacon-gateway run`: start the gateway.
//!
//! Loads and validates the route config, preloads every referenced
//! template, then serves until SIGTERM / Ctrl+C. Any config or template
//! problem aborts before the port is bound.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::cli::RunArgs;
use crate::config::{process_env, sources};
use crate::debug::MAX_DEBUG_ENTRIES;
use crate::error::GatewayError;
use crate::gateway::dispatch::DispatchSettings;
use crate::gateway::forward::HyperTransport;
use crate::logging;
use crate::server::{self, GatewayOptions};

pub async fn execute(args: RunArgs) -> Result<(), GatewayError> {
    let log_format = logging::resolve_format(args.pretty, args.json);
    logging::init(logging::effective_level(&args.log_level, args.debug), log_format);

    let result = serve(&args).await;
    if let Err(ref e) = result {
        tracing::error!(error = %e, "beacon-gateway failed");
    }
    result
}

async fn serve(args: &RunArgs) -> Result<(), GatewayError> {
    let (config, version) = sources::load_file(&args.config, &process_env).await?;

    if args.debug_entries > MAX_DEBUG_ENTRIES {
        tracing::warn!(
            requested = args.debug_entries,
            max = MAX_DEBUG_ENTRIES,
            "debug log retention clamped"
        );
    }

    let options = GatewayOptions {
        templates_dir: args.templates_dir.clone(),
        test_mode: args.test_mode,
        debug_entries: args.debug_entries,
        settings: DispatchSettings {
            verbose_errors: args.debug,
            timeout: Duration::from_millis(args.timeout),
        },
    };
    let transport = Arc::new(HyperTransport::new(server::build_http_client()));
    let state = server::assemble(
        &config,
        version,
        args.config.display().to_string(),
        transport,
        &options,
    )?;

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!(
        addr = %addr,
        config = %state.config.source,
        config_version = %state.config.version.short(),
        routes = state.config.routes,
        templates = state.config.templates,
        fallback = state.config.fallback,
        debug = args.debug,
        test_mode = args.test_mode,
        "beacon-gateway started"
    );

    let router = server::build_router(state, args.max_body);
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(server::shutdown_signal())
    .await?;

    tracing::info!("beacon-gateway stopped");
    Ok(())
}
