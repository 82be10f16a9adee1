//! Configuration file commands.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::utils::{print_success, CliError, CliResult, OutputFormat};
use crate::DEFAULT_CONFIG_FILE;
use vigil_config::{Config, MemberConfig};
use vigil_crypto::BlsPrivateKey;

/// Base port of scaffolded committee members.
pub const BASE_PORT: u16 = 30300;

/// Configuration subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Write a default vigil.toml
    Init(InitArgs),

    /// Load and validate a vigil.toml
    Validate(ValidateArgs),
}

/// Arguments for config init
#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Output path
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    pub out: PathBuf,

    /// Add this many local members with seed-derived keys
    #[arg(long, default_value = "0")]
    pub members: u8,

    /// Signature domain
    #[arg(long)]
    pub chain_id: Option<String>,

    /// Overwrite an existing file
    #[arg(long)]
    pub force: bool,
}

/// Arguments for config validate
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// File to check
    #[arg(default_value = DEFAULT_CONFIG_FILE)]
    pub path: PathBuf,
}

/// Local committee of `count` members, keyed by seeds `[1; 32]`, `[2; 32]`, ...
///
/// The same seeds back `vigil simulate`, so a scaffolded file describes the
/// simulated committee.
pub fn local_members(count: u8) -> CliResult<Vec<MemberConfig>> {
    (0..count)
        .map(|i| {
            let key = BlsPrivateKey::from_seed(&[i + 1; 32])
                .map_err(|e| CliError::KeyError(e.to_string()))?;
            Ok(MemberConfig {
                public_key: key.public_key().to_hex(),
                address: format!("127.0.0.1:{}", BASE_PORT + i as u16),
                weight: 1,
            })
        })
        .collect()
}

/// Execute config commands
pub fn execute(cmd: ConfigCommands, output_format: OutputFormat) -> CliResult<()> {
    match cmd {
        ConfigCommands::Init(args) => execute_init(args, output_format),
        ConfigCommands::Validate(args) => execute_validate(args, output_format),
    }
}

fn execute_init(args: InitArgs, output_format: OutputFormat) -> CliResult<()> {
    if args.out.exists() && !args.force {
        return Err(CliError::InvalidArgument(format!(
            "{} already exists (use --force to overwrite)",
            args.out.display()
        )));
    }

    let mut config = Config::default();
    if let Some(chain_id) = args.chain_id {
        config.view_change.chain_id = chain_id;
    }
    config.committee.members = local_members(args.members)?;
    config.validate()?;
    config.save(&args.out)?;

    match output_format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        OutputFormat::Text => {
            print_success(&format!(
                "Wrote {} with {} committee member(s)",
                args.out.display(),
                config.committee.members.len()
            ));
        }
    }
    Ok(())
}

fn execute_validate(args: ValidateArgs, output_format: OutputFormat) -> CliResult<()> {
    let config = Config::load(&args.path)?;
    let members = config.committee.parsed_members()?;
    let total_weight: u64 = members.iter().map(|m| m.weight).sum();

    match output_format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        OutputFormat::Text => {
            print_success(&format!("{} is valid", args.path.display()));
            println!("  Chain ID:        {}", config.view_change.chain_id);
            println!(
                "  Quorum:          {}/{}",
                config.view_change.quorum_numerator, config.view_change.quorum_denominator
            );
            println!("  Liveness:        {}ms", config.view_change.liveness_timeout_ms);
            println!("  Members:         {}", members.len());
            println!("  Total weight:    {}", total_weight);
        }
    }
    Ok(())
}
