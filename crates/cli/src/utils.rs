//! Shared utilities for CLI commands.
//!
//! This module provides common functionality used across CLI commands:
//! - Error types and result handling
//! - Output formatting and logging setup
//! - Conversions from `vigil.toml` settings to engine parameters
//! - Display helpers for headers

use clap::ValueEnum;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing_subscriber::EnvFilter;
use vigil_config::{BackoffKind, Config, ConfigError, ViewChangeConfig};
use vigil_consensus::{BackoffMode, QuorumThreshold, TimeoutConfig};
use vigil_types::{HeaderCodec, VcBlockHeader};

// ============================================================================
// Error Types
// ============================================================================

/// CLI error types
#[derive(Error, Debug)]
pub enum CliError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Invalid argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Key-related error
    #[error("Key error: {0}")]
    KeyError(String),

    /// Header bytes could not be decoded
    #[error("Decode error: {0}")]
    Decode(#[from] vigil_types::Error),

    /// View-change engine failure
    #[error("Engine error: {0}")]
    Engine(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Timeout error
    #[error("Operation timed out: {0}")]
    Timeout(String),
}

/// CLI result type alias
pub type CliResult<T> = Result<T, CliError>;

// ============================================================================
// Output Formatting
// ============================================================================

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    /// Human-readable text output
    #[default]
    Text,
    /// JSON output for scripting
    Json,
}

/// Print an info message to stderr (so JSON output stays clean)
pub fn print_info(msg: &str) {
    use console::style;
    eprintln!("{} {}", style("[INFO]").cyan().bold(), msg);
}

/// Print a success message to stderr
pub fn print_success(msg: &str) {
    use console::style;
    eprintln!("{} {}", style("[OK]").green().bold(), msg);
}

/// Print a warning message to stderr
pub fn print_warning(msg: &str) {
    use console::style;
    eprintln!("{} {}", style("[WARN]").yellow().bold(), msg);
}

/// Print an error message to stderr
pub fn print_error(msg: &str) {
    use console::style;
    eprintln!("{} {}", style("[ERROR]").red().bold(), msg);
}

/// Format a duration for display
pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis < 1_000 {
        return format!("{}ms", millis);
    }
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{}.{:03}s", secs, duration.subsec_millis())
    } else {
        format!("{}m {}s", secs / 60, secs % 60)
    }
}

/// Multi-line, human-readable rendering of a view-change header.
pub fn format_vc_header(header: &VcBlockHeader) -> String {
    let mut out = String::new();
    out.push_str(&format!("  Hash:            {}\n", header.compute_hash()));
    out.push_str(&format!("  DS epoch:        {}\n", header.ds_epoch_number()));
    out.push_str(&format!("  VC epoch:        {}\n", header.view_change_epoch_number()));
    out.push_str(&format!("  State:           {}\n", header.view_change_state()));
    out.push_str(&format!("  Counter:         {}\n", header.view_change_counter()));
    out.push_str(&format!(
        "  Candidate:       {} @ {}\n",
        header.candidate_leader_key().short_hex(),
        header.candidate_leader_address()
    ));
    if header.faulty_leaders().is_empty() {
        out.push_str("  Faulty leaders:  none\n");
    } else {
        out.push_str("  Faulty leaders:\n");
        for faulty in header.faulty_leaders() {
            out.push_str(&format!(
                "    - {} @ {}\n",
                faulty.public_key.short_hex(),
                faulty.address
            ));
        }
    }
    out.push_str(&format!("  Committee hash:  {}\n", header.committee_hash()));
    out.push_str(&format!("  Prev hash:       {}", header.prev_hash()));
    out
}

// ============================================================================
// Logging
// ============================================================================

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins when set. Otherwise `-q` selects errors only, each `-v`
/// raises the level, and with neither the `[logging]` level applies.
pub fn init_logging(verbose: u8, quiet: bool, config: Option<&Config>) {
    let configured = config.map(|c| c.logging.level.to_lowercase());
    let level = match (quiet, verbose) {
        (true, _) => "error".to_string(),
        (_, 0) => configured.unwrap_or_else(|| "info".to_string()),
        (_, 1) => "debug".to_string(),
        (_, _) => "trace".to_string(),
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let json = config.map(|c| c.logging.is_json()).unwrap_or(false);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbose >= 2)
        .with_writer(std::io::stderr);
    // A second initialisation (tests) is not an error worth reporting.
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

/// Load the optional `--config` file.
pub fn load_config(path: Option<&Path>) -> CliResult<Option<Config>> {
    match path {
        Some(path) => Ok(Some(Config::load(path)?)),
        None => Ok(None),
    }
}

// ============================================================================
// Config Conversions
// ============================================================================

/// Engine timeouts from the `[view_change]` section.
pub fn timeouts_from_config(config: &ViewChangeConfig) -> TimeoutConfig {
    let backoff_mode = match config.backoff {
        BackoffKind::Linear => BackoffMode::Linear,
        BackoffKind::Exponential => BackoffMode::exponential_with_cap(config.max_backoff_exponent),
    };
    TimeoutConfig {
        liveness: Duration::from_millis(config.liveness_timeout_ms),
        agreement_base: Duration::from_millis(config.agreement_timeout_base_ms),
        agreement_delta: Duration::from_millis(config.agreement_timeout_delta_ms),
        max_timeout: Duration::from_millis(config.max_timeout_ms),
        backoff_mode,
        jitter_percent: config.jitter_percent,
    }
}

/// Quorum fraction from the `[view_change]` section.
pub fn quorum_from_config(config: &ViewChangeConfig) -> CliResult<QuorumThreshold> {
    QuorumThreshold::new(config.quorum_numerator, config.quorum_denominator)
        .map_err(|e| CliError::InvalidArgument(e.to_string()))
}

// ============================================================================
// Parsing
// ============================================================================

/// Decode a hex string, with or without `0x`.
pub fn decode_hex(input: &str) -> CliResult<Vec<u8>> {
    let trimmed = input.trim();
    let stripped = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    hex::decode(stripped).map_err(|e| CliError::InvalidArgument(format!("invalid hex: {}", e)))
}

/// Check a list of member indices against the committee size.
pub fn check_indices(indices: &[usize], committee_size: usize) -> CliResult<()> {
    for &index in indices {
        if index >= committee_size {
            return Err(CliError::InvalidArgument(format!(
                "member index {} out of range for a committee of {}",
                index, committee_size
            )));
        }
    }
    Ok(())
}
