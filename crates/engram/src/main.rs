// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Engram - a local memory engine for coding assistants.
//!
//! Binary entry point: loads and validates configuration, then
//! dispatches to the subcommand implementations.

mod prune;
mod serve;
mod status;

use clap::{Parser, Subcommand};

/// Engram - a local memory engine for coding assistants.
#[derive(Parser, Debug)]
#[command(name = "engram", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP server with background workers.
    Serve,
    /// Serve JSON-RPC over stdin/stdout (for assistant integration).
    Rpc,
    /// Run one retention sweep and exit.
    Prune {
        /// Override the configured age threshold in days.
        #[arg(long)]
        days: Option<u32>,
        /// Override the configured observation ceiling.
        #[arg(long)]
        max_observations: Option<u64>,
    },
    /// Query a running server for health and store statistics.
    Status {
        /// Emit machine-readable JSON.
        #[arg(long)]
        json: bool,
    },
}

/// Initializes the tracing subscriber with the given log level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("engram={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match engram_config::load_and_validate() {
        Ok(config) => config,
        Err(errors) => {
            for e in &errors {
                eprintln!("engram: {e}");
            }
            std::process::exit(1);
        }
    };
    init_tracing(&config.server.log_level);

    let result = match cli.command {
        Some(Commands::Serve) => serve::run_serve(&config).await,
        Some(Commands::Rpc) => serve::run_rpc(&config).await,
        Some(Commands::Prune {
            days,
            max_observations,
        }) => prune::run_prune(&config, days, max_observations).await,
        Some(Commands::Status { json }) => status::run_status(&config, json).await,
        None => {
            println!("engram: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("engram: {e}");
        std::process::exit(1);
    }
}
