use clap::Parser;

#[tokio::main]
async fn main() {
    let cli = beacon_gateway::cli::Cli::parse();
    if let Err(e) = beacon_gateway::cmd::dispatch(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
