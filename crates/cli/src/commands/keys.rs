//! Key management commands.
//!
//! This module provides commands for committee member keys:
//! - Generate a new BLS key, random or from a seed
//! - Derive the public key of an existing private key

use clap::{Parser, Subcommand};
use serde::Serialize;
use std::fs;
use std::path::PathBuf;

use crate::utils::{decode_hex, print_info, print_success, print_warning, CliError, CliResult, OutputFormat};
use vigil_crypto::BlsPrivateKey;

/// Key management subcommands
#[derive(Subcommand, Debug)]
pub enum KeysCommands {
    /// Generate a new BLS keypair
    Generate(GenerateArgs),

    /// Print the public key of a private key
    Public(PublicArgs),
}

/// Arguments for key generation
#[derive(Parser, Debug)]
pub struct GenerateArgs {
    /// Derive from this hex seed instead of the OS RNG (at least 32 bytes)
    #[arg(long)]
    pub seed: Option<String>,

    /// Write the keypair as JSON to this file
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// Overwrite an existing output file
    #[arg(long)]
    pub force: bool,
}

/// Arguments for public key derivation
#[derive(Parser, Debug)]
pub struct PublicArgs {
    /// Private key as hex
    pub private_key: String,
}

/// A generated keypair.
#[derive(Debug, Clone, Serialize)]
pub struct KeyPairInfo {
    /// Hex public key, as written in `[[committee.members]]`
    pub public_key: String,
    /// Hex private key
    pub private_key: String,
}

/// Build a keypair, from a seed when one is given.
pub fn generate_keypair(seed: Option<&str>) -> CliResult<KeyPairInfo> {
    let key = match seed {
        Some(seed) => {
            let ikm = decode_hex(seed)?;
            BlsPrivateKey::from_seed(&ikm).map_err(|e| CliError::KeyError(e.to_string()))?
        }
        None => BlsPrivateKey::random(),
    };
    Ok(KeyPairInfo {
        public_key: key.public_key().to_hex(),
        private_key: key.to_hex(),
    })
}

/// Execute keys commands
pub fn execute(cmd: KeysCommands, output_format: OutputFormat) -> CliResult<()> {
    match cmd {
        KeysCommands::Generate(args) => execute_generate(args, output_format),
        KeysCommands::Public(args) => execute_public(args, output_format),
    }
}

fn execute_generate(args: GenerateArgs, output_format: OutputFormat) -> CliResult<()> {
    let keypair = generate_keypair(args.seed.as_deref())?;

    if let Some(path) = &args.out {
        if path.exists() && !args.force {
            return Err(CliError::InvalidArgument(format!(
                "{} already exists (use --force to overwrite)",
                path.display()
            )));
        }
        fs::write(path, serde_json::to_string_pretty(&keypair)?)?;
        print_success(&format!("Keypair written to {}", path.display()));
    }

    match output_format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&keypair)?);
        }
        OutputFormat::Text => {
            println!("Public key:  {}", keypair.public_key);
            if args.out.is_none() {
                println!("Private key: {}", keypair.private_key);
                print_warning("Store the private key securely; it is not saved anywhere");
            }
        }
    }

    if args.seed.is_some() {
        print_info("Key derived from seed; anyone holding the seed holds the key");
    }

    Ok(())
}

fn execute_public(args: PublicArgs, output_format: OutputFormat) -> CliResult<()> {
    let key = BlsPrivateKey::from_hex(&args.private_key)
        .map_err(|e| CliError::KeyError(e.to_string()))?;
    let public_key = key.public_key().to_hex();

    match output_format {
        OutputFormat::Json => {
            println!("{}", serde_json::json!({ "public_key": public_key }));
        }
        OutputFormat::Text => println!("{}", public_key),
    }
    Ok(())
}
