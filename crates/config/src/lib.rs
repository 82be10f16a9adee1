//! # Vigil Configuration
//!
//! Every node setting lives in one `vigil.toml` file.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use vigil_config::Config;
//! use std::path::Path;
//!
//! let config = Config::load(Path::new("vigil.toml"))?;
//! println!("Liveness timeout: {}ms", config.view_change.liveness_timeout_ms);
//!
//! let members = config.committee.parsed_members()?;
//! ```
//!
//! ## Configuration Sections
//!
//! - `[view_change]` - Timeouts, backoff, quorum fraction and signing domain
//! - `[logging]` - Log level and output format
//! - `[[committee.members]]` - Static committee in rotation order

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

mod config;
mod error;

pub use config::*;
pub use error::*;
