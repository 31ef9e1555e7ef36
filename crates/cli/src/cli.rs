use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use teleconsult_core::ConsultConfig;
use teleconsult_infra_common::{setup_logging, LogFormat, LoggingConfig};

use crate::commands::{self, roles::RolesArgs, simulate::SimulateArgs};

/// Teleconsult session simulator
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info", env = "TELECONSULT_LOG_LEVEL")]
    pub log_level: String,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Session configuration file (TOML)
    #[arg(short, long, global = true, env = "TELECONSULT_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a two-party consultation in-process
    Simulate(SimulateArgs),
    /// Show which side of a pair would send the offer
    Roles(RolesArgs),
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        let format = if self.json_logs { LogFormat::Json } else { LogFormat::Text };
        setup_logging(LoggingConfig::for_level(&self.log_level, "teleconsult")?.format(format))?;

        let config = match &self.config {
            Some(path) => ConsultConfig::load(path)
                .with_context(|| format!("loading configuration from {}", path.display()))?,
            None => ConsultConfig::default(),
        };

        match self.command {
            Commands::Simulate(args) => commands::simulate::execute(args, config).await,
            Commands::Roles(args) => commands::roles::execute(args),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_simulate_with_global_flags() {
        let cli = Cli::try_parse_from([
            "teleconsult",
            "simulate",
            "--scenario",
            "peer-leaves",
            "--log-level",
            "debug",
        ])
        .unwrap();
        assert_eq!(cli.log_level, "debug");
        assert!(matches!(cli.command, Commands::Simulate(_)));
    }
}
