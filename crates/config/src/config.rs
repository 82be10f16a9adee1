//! Main configuration module for Vigil
//!
//! All view-change settings live in one `vigil.toml` file.

use crate::error::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info};
use vigil_crypto::BlsPublicKey;
use vigil_types::NetworkAddress;

/// Main configuration struct containing all Vigil settings.
///
/// Loaded from a single `vigil.toml` file. Missing sections take their
/// defaults.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// View-change timing and quorum
    #[serde(default)]
    pub view_change: ViewChangeConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Static committee
    #[serde(default)]
    pub committee: CommitteeConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the TOML configuration file
    ///
    /// # Returns
    ///
    /// The parsed and validated configuration, or an error if loading fails.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        info!("Loading configuration from {:?}", path);

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Config = toml::from_str(&content)?;

        debug!("Configuration parsed successfully, validating...");
        config.validate()?;

        info!(
            "Configuration loaded: chain_id={}, committee_size={}",
            config.view_change.chain_id,
            config.committee.members.len()
        );

        Ok(config)
    }

    /// Load configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate every section.
    pub fn validate(&self) -> ConfigResult<()> {
        self.view_change.validate()?;
        self.logging.validate()?;
        self.committee.validate()?;

        debug!("Configuration validation passed");
        Ok(())
    }

    /// Render as TOML.
    pub fn to_toml_string(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = self.to_toml_string()?;
        std::fs::write(path, content).map_err(|e| ConfigError::FileWrite {
            path: path.to_path_buf(),
            source: e,
        })?;
        info!("Configuration written to {:?}", path);
        Ok(())
    }
}

// =============================================================================
// View-Change Configuration
// =============================================================================

/// How agreement timeouts grow with the view-change counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    /// `base + delta * (counter - 1)`
    #[default]
    Linear,
    /// `base * 2^(counter - 1)`, exponent capped
    Exponential,
}

/// View-change parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewChangeConfig {
    /// Signature domain; nodes on different chains never accept each other's proposals
    pub chain_id: String,

    /// Time without primary progress before the leader is suspected (milliseconds)
    pub liveness_timeout_ms: u64,

    /// Agreement wait for the first attempt (milliseconds)
    pub agreement_timeout_base_ms: u64,

    /// Increment per further attempt under linear backoff (milliseconds)
    pub agreement_timeout_delta_ms: u64,

    /// Upper bound for any agreement wait (milliseconds)
    pub max_timeout_ms: u64,

    /// Backoff shape
    pub backoff: BackoffKind,

    /// Largest exponent under exponential backoff
    pub max_backoff_exponent: u32,

    /// Random extension of each timeout, as a fraction
    pub jitter_percent: f64,

    /// Quorum numerator
    pub quorum_numerator: u64,

    /// Quorum denominator
    pub quorum_denominator: u64,
}

impl ViewChangeConfig {
    /// Check ranges.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.chain_id.trim().is_empty() {
            return Err(ConfigError::InvalidChainId);
        }

        if self.liveness_timeout_ms == 0 {
            return Err(ConfigError::InvalidTimeout {
                name: "liveness_timeout_ms",
                value: 0,
            });
        }

        if self.agreement_timeout_base_ms == 0 {
            return Err(ConfigError::InvalidTimeout {
                name: "agreement_timeout_base_ms",
                value: 0,
            });
        }

        if self.max_timeout_ms < self.agreement_timeout_base_ms {
            return Err(ConfigError::TimeoutCapTooLow {
                max: self.max_timeout_ms,
                base: self.agreement_timeout_base_ms,
            });
        }

        if !(0.0..=0.5).contains(&self.jitter_percent) {
            return Err(ConfigError::InvalidJitter(self.jitter_percent));
        }

        let (num, den) = (self.quorum_numerator, self.quorum_denominator);
        if den == 0 || num > den || (num as u128) * 2 <= den as u128 {
            return Err(ConfigError::InvalidQuorum {
                numerator: num,
                denominator: den,
            });
        }

        Ok(())
    }

    /// Agreement timeout for a given counter, before jitter (milliseconds).
    pub fn agreement_timeout_ms(&self, counter: u32) -> u64 {
        let attempt = counter.saturating_sub(1);
        let timeout = match self.backoff {
            BackoffKind::Linear => self
                .agreement_timeout_base_ms
                .saturating_add(self.agreement_timeout_delta_ms.saturating_mul(attempt as u64)),
            BackoffKind::Exponential => {
                let exponent = attempt.min(self.max_backoff_exponent).min(63);
                self.agreement_timeout_base_ms.saturating_mul(1u64 << exponent)
            }
        };
        timeout.min(self.max_timeout_ms)
    }
}

impl Default for ViewChangeConfig {
    fn default() -> Self {
        Self {
            chain_id: "vigil-local".to_string(),
            liveness_timeout_ms: 10_000,
            agreement_timeout_base_ms: 3_000,
            agreement_timeout_delta_ms: 1_000,
            max_timeout_ms: 60_000,
            backoff: BackoffKind::Linear,
            max_backoff_exponent: 5,
            jitter_percent: 0.1,
            quorum_numerator: 2,
            quorum_denominator: 3,
        }
    }
}

// =============================================================================
// Logging Configuration
// =============================================================================

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, pretty)
    pub format: String,
}

impl LoggingConfig {
    /// Check level and format names.
    pub fn validate(&self) -> ConfigResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.level.to_lowercase().as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.level.clone()));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.format.to_lowercase().as_str()) {
            return Err(ConfigError::InvalidLogFormat(self.format.clone()));
        }

        Ok(())
    }

    /// Whether structured JSON output is selected.
    pub fn is_json(&self) -> bool {
        self.format.eq_ignore_ascii_case("json")
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

// =============================================================================
// Committee Configuration
// =============================================================================

/// Static committee, in rotation order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommitteeConfig {
    /// Members
    #[serde(default)]
    pub members: Vec<MemberConfig>,
}

/// One committee seat as written in the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberConfig {
    /// BLS public key, hex with or without `0x`
    pub public_key: String,

    /// Reachable endpoint, `ip:port`
    pub address: String,

    /// Voting weight
    #[serde(default = "default_weight")]
    pub weight: u64,
}

fn default_weight() -> u64 {
    1
}

/// A committee seat with parsed fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedMember {
    /// Member identity
    pub public_key: BlsPublicKey,
    /// Member endpoint
    pub address: NetworkAddress,
    /// Voting weight
    pub weight: u64,
}

impl MemberConfig {
    /// Parse key and address.
    pub fn parse(&self) -> ConfigResult<ParsedMember> {
        let public_key = BlsPublicKey::from_hex(&self.public_key)
            .map_err(|e| ConfigError::InvalidPubkey(format!("{}: {}", self.public_key, e)))?;
        let address = self
            .address
            .parse::<NetworkAddress>()
            .map_err(|_| ConfigError::InvalidSocketAddr(self.address.clone()))?;
        if self.weight == 0 {
            return Err(ConfigError::InvalidWeight(self.public_key.clone()));
        }
        Ok(ParsedMember {
            public_key,
            address,
            weight: self.weight,
        })
    }
}

impl CommitteeConfig {
    /// Check every member and reject duplicates. An empty committee is allowed.
    pub fn validate(&self) -> ConfigResult<()> {
        self.parsed_members().map(|_| ())
    }

    /// Members with parsed fields, in file order.
    pub fn parsed_members(&self) -> ConfigResult<Vec<ParsedMember>> {
        let mut seen = HashSet::with_capacity(self.members.len());
        self.members
            .iter()
            .map(|member| {
                let parsed = member.parse()?;
                if !seen.insert(parsed.public_key.clone()) {
                    return Err(ConfigError::DuplicateMember(member.public_key.clone()));
                }
                Ok(parsed)
            })
            .collect()
    }
}
