//! Inference Guardian CLI
//!
//! A command-line tool for querying guardian status, driving the brownout
//! control surface, and running the offline correlation analyzer.

mod client;
mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use commands::{analyze, brownout, status};
use std::path::PathBuf;

/// Inference Guardian CLI
#[derive(Parser)]
#[command(name = "guardctl")]
#[command(author, version, about = "CLI for the inference guardian", long_about = None)]
pub struct Cli {
    /// Guardian API endpoint URL (can also be set via GUARDIAN_API_URL env var)
    #[arg(long, env = "GUARDIAN_API_URL", default_value = "http://localhost:8090")]
    pub api_url: String,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show guardian status and the active profile
    Status,

    /// Activate or deactivate a brownout profile
    #[command(subcommand)]
    Brownout(BrownoutCommands),

    /// Override individual profile settings
    #[command(subcommand)]
    Override(OverrideCommands),

    /// Clear lockdown early and force the minimal-capability profile
    EmergencyReset,

    /// Run the offline correlation analyzer over a log directory
    Analyze {
        /// Directory containing guardian NDJSON logs
        #[arg(default_value = "logs")]
        log_dir: PathBuf,
    },
}

#[derive(Subcommand)]
pub enum BrownoutCommands {
    /// Apply a degradation level
    Activate {
        /// Degradation level to apply
        #[arg(value_enum)]
        level: LevelArg,
    },

    /// Restore the primary profile
    Deactivate,
}

#[derive(Subcommand)]
pub enum OverrideCommands {
    /// Switch the served model
    Model {
        /// Model name
        name: String,
    },

    /// Set the context window (1-32)
    ContextWindow {
        /// New value
        value: u32,
    },

    /// Set the retrieval depth (1-20)
    RagTopK {
        /// New value
        value: u32,
    },

    /// Enable or disable heavy tools
    ToolsHeavy {
        /// on or off
        #[arg(value_enum)]
        state: ToggleArg,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LevelArg {
    Light,
    Moderate,
    Heavy,
}

impl LevelArg {
    pub fn as_str(&self) -> &'static str {
        match self {
            LevelArg::Light => "light",
            LevelArg::Moderate => "moderate",
            LevelArg::Heavy => "heavy",
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ToggleArg {
    On,
    Off,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let client = client::GuardianClient::new(&cli.api_url)?;

    match cli.command {
        Commands::Status => status::run(&client, cli.format).await,
        Commands::Brownout(command) => brownout::run_brownout(&client, command, cli.format).await,
        Commands::Override(command) => brownout::run_override(&client, command, cli.format).await,
        Commands::EmergencyReset => brownout::run_emergency_reset(&client).await,
        Commands::Analyze { log_dir } => analyze::run(&log_dir, cli.format),
    }
}
