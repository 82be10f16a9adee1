//! Configuration error types

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during configuration loading and validation
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file
    #[error("Failed to read config file at {path}: {source}")]
    FileRead {
        /// File that could not be read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Failed to write configuration file
    #[error("Failed to write config file at {path}: {source}")]
    FileWrite {
        /// File that could not be written
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse TOML configuration
    #[error("Failed to parse TOML config: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// Failed to render TOML configuration
    #[error("Failed to serialize TOML config: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// Empty chain id
    #[error("Invalid chain ID: chain_id must not be empty")]
    InvalidChainId,

    /// Invalid timeout configuration
    #[error("Invalid timeout: {name} must be positive, got {value}ms")]
    InvalidTimeout {
        /// Setting name
        name: &'static str,
        /// Configured value
        value: u64,
    },

    /// Timeout cap below the base timeout
    #[error("Invalid timeout cap: max_timeout_ms ({max}) is below agreement_timeout_base_ms ({base})")]
    TimeoutCapTooLow {
        /// Configured cap
        max: u64,
        /// Configured base
        base: u64,
    },

    /// Quorum fraction outside (1/2, 1]
    #[error("Invalid quorum {numerator}/{denominator}: must be above 1/2 and at most 1")]
    InvalidQuorum {
        /// Configured numerator
        numerator: u64,
        /// Configured denominator
        denominator: u64,
    },

    /// Jitter outside [0, 0.5]
    #[error("Invalid jitter: must be between 0.0 and 0.5, got {0}")]
    InvalidJitter(f64),

    /// Invalid public key format
    #[error("Invalid public key format: {0}")]
    InvalidPubkey(String),

    /// Invalid socket address format
    #[error("Invalid socket address format: {0}")]
    InvalidSocketAddr(String),

    /// Committee member with zero weight
    #[error("Invalid weight for committee member {0}: must be positive")]
    InvalidWeight(String),

    /// Duplicate committee member
    #[error("Duplicate committee member: {0}")]
    DuplicateMember(String),

    /// Invalid log level
    #[error("Invalid log level: {0}. Valid values: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    /// Invalid log format
    #[error("Invalid log format: {0}. Valid values: json, pretty")]
    InvalidLogFormat(String),
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;
