//! wrmon - WS-Management monitoring checks for Windows hosts
//!
//! This is the main entry point for the wrmon CLI.

mod cli;

use clap::Parser;
use cli::{Cli, Commands};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let status = match &cli.command {
        Commands::Cpu(args) => args.execute().await,
        Commands::Memory(args) => args.execute().await,
        Commands::Disk(args) => args.execute().await,
        Commands::Service(args) => args.execute().await,
        Commands::Uptime(args) => args.execute().await,
        Commands::Pagefile(args) => args.execute().await,
        Commands::Wql(args) => args.execute().await,
        Commands::Schema(args) => args.execute().await,
    };

    std::process::exit(status.exit_code());
}

/// Diagnostics go to stderr; stdout is reserved for the plugin output
/// line the monitoring system parses.
fn init_logging(verbosity: u8) {
    let default = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
