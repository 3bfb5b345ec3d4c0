//! Subcommand dispatch and execution.
//!
//! The [`dispatch`] function routes the parsed CLI to the appropriate
//! subcommand handler: [`run`], [`validate`], or [`health`]. Each
//! handler lives in its own submodule.

pub mod health;
pub mod run;
pub mod validate;

use crate::cli::{Cli, Commands};
use crate::error::GatewayError;

pub async fn dispatch(cli: Cli) -> Result<(), GatewayError> {
    match cli.command {
        Some(Commands::Run(args)) => run::execute(*args).await,
        Some(Commands::Validate(ref args)) => validate::execute(args).await,
        Some(Commands::Health(args)) => health::execute(args).await,
        None => {
            print_welcome();
            Ok(())
        }
    }
}

fn print_welcome() {
    let version = env!("CARGO_PKG_VERSION");
    println!(
        "\n  beacon-gateway v{version}: analytics event ingestion gateway\n\n  \
         No command provided. To get started:\n\n    \
         beacon-gateway run                        Start with ./config/routes.json\n    \
         beacon-gateway run -c routes.json         Start with a specific route config\n    \
         beacon-gateway validate routes.json       Check a route config and its templates\n    \
         beacon-gateway --help                     See all commands and options\n"
    );
}
