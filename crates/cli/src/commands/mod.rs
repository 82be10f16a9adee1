//! CLI command definitions and handlers.
//!
//! This module defines all available CLI commands using clap's derive macros.
//! Each subcommand has its own module with implementation details.

pub mod config;
pub mod decode;
pub mod keys;
pub mod simulate;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::utils::{init_logging, load_config, CliResult, OutputFormat};

/// Vigil - leader replacement for a committee-run chain
#[derive(Parser, Debug)]
#[command(name = "vigil")]
#[command(author = "Vigil Contributors")]
#[command(version)]
#[command(about = "View-change simulation and inspection tools", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Global output format for command results
    #[arg(global = true, long, value_enum, default_value = "text")]
    pub output: OutputFormat,

    /// Enable verbose logging
    #[arg(global = true, short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(global = true, short, long)]
    pub quiet: bool,

    /// Path to vigil.toml
    #[arg(global = true, short, long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run an in-process committee through a view change
    Simulate(simulate::SimulateArgs),

    /// Decode a hex-encoded header
    Decode(decode::DecodeArgs),

    /// Key management commands
    #[command(subcommand)]
    Keys(keys::KeysCommands),

    /// Configuration file commands
    #[command(subcommand, name = "config")]
    Config(config::ConfigCommands),

    /// Show version information
    Version,
}

/// Execute the CLI with parsed arguments
pub async fn run_cli(cli: Cli) -> CliResult<()> {
    // `config init` creates the file, so it must not be loaded first.
    let loaded = match &cli.command {
        Commands::Config(_) => None,
        _ => load_config(cli.config.as_deref())?,
    };
    init_logging(cli.verbose, cli.quiet, loaded.as_ref());

    match cli.command {
        Commands::Simulate(args) => simulate::execute(args, loaded.as_ref(), cli.output).await,
        Commands::Decode(args) => decode::execute(args, cli.output),
        Commands::Keys(cmd) => keys::execute(cmd, cli.output),
        Commands::Config(cmd) => config::execute(cmd, cli.output),
        Commands::Version => execute_version(cli.output),
    }
}

/// Execute the version command
fn execute_version(output_format: OutputFormat) -> CliResult<()> {
    let version_info = VersionInfo::new();

    match output_format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&version_info)?);
        }
        OutputFormat::Text => {
            println!("Vigil CLI");
            println!("  Version:     {}", version_info.version);
            println!("  Git Commit:  {}", version_info.git_commit);
            println!("  Target:      {}", version_info.target);
        }
    }

    Ok(())
}

/// Version information structure
#[derive(Debug, serde::Serialize)]
struct VersionInfo {
    version: String,
    git_commit: String,
    target: String,
}

impl VersionInfo {
    fn new() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            git_commit: option_env!("GIT_COMMIT").unwrap_or("unknown").to_string(),
            target: std::env::consts::ARCH.to_string() + "-" + std::env::consts::OS,
        }
    }
}
