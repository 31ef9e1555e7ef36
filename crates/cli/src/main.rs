//! Main entry point for the teleconsult CLI
//!
//! Runs consultation scenarios in-process and inspects role resolution.

mod cli;
mod commands;

use clap::Parser;
use cli::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = cli.execute().await {
        eprintln!("❌ Error: {:#}", e);
        std::process::exit(1);
    }
}
