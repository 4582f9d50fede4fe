//! Armada CLI library

pub mod commands;
pub mod error;

pub use error::{Error, Result};

use clap::{Parser, Subcommand, ValueEnum};

/// Armada - multi-cluster provisioning and installation
#[derive(Parser, Debug)]
#[command(name = "armada")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Log line format
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines
    Text,
    /// One JSON object per line
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the workflow selected by the run's switches
    Run(commands::run::RunArgs),
    /// Show the workflow mode and topology a run would use
    Mode(commands::mode::ModeArgs),
    /// Destroy everything recorded for a provision id
    Teardown(commands::teardown::TeardownArgs),
}

impl Commands {
    /// Subcommand name, for error context
    pub fn name(&self) -> &'static str {
        match self {
            Commands::Run(_) => "run",
            Commands::Mode(_) => "mode",
            Commands::Teardown(_) => "teardown",
        }
    }
}

impl Cli {
    /// Run the CLI command
    pub async fn run(self) -> Result<()> {
        match self.command {
            Commands::Run(args) => commands::run::run(args).await,
            Commands::Mode(args) => commands::mode::run(args).await,
            Commands::Teardown(args) => commands::teardown::run(args).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_is_global() {
        let cli = Cli::try_parse_from([
            "armada",
            "mode",
            "-c",
            "readiness.yaml",
            "--log-format",
            "json",
        ])
        .unwrap();
        assert_eq!(cli.log_format, LogFormat::Json);
        assert_eq!(cli.command.name(), "mode");
    }

    #[test]
    fn test_unknown_log_format_is_rejected() {
        assert!(Cli::try_parse_from([
            "armada",
            "--log-format",
            "xml",
            "mode",
            "-c",
            "readiness.yaml"
        ])
        .is_err());
    }
}
