//! # Vigil CLI
//!
//! Command-line tools for the Vigil view-change subsystem.
//!
//! ## Available Commands
//!
//! - `simulate` - Run an in-process committee through a view change
//! - `decode` - Decode a hex-encoded header
//! - `keys` - Generate BLS keys and derive public keys
//! - `config` - Scaffold and validate `vigil.toml`
//! - `version` - Display version information
//!
//! ## Example Usage
//!
//! ```bash
//! # Four members, the genesis leader and member 2 crashed
//! vigil simulate --nodes 4 --crash 0,2
//!
//! # Write a config describing the same committee
//! vigil config init --members 4
//!
//! # Inspect a header
//! vigil decode 0x0000000100...
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod commands;
pub mod utils;

// Re-export the main CLI types for convenience
pub use commands::{run_cli, Cli, Commands};
pub use utils::{CliError, CliResult, OutputFormat};

/// Version information for the CLI
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// CLI application name
pub const APP_NAME: &str = "vigil";

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "vigil.toml";
