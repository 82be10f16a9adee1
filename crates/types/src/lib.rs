//! # Vigil Types
//!
//! Header types and the canonical byte codec shared by every header kind.
//!
//! This crate provides:
//! - [`H256`] - 32-byte Keccak256 digests used for header linkage
//! - [`NetworkAddress`] - fixed-width encodable peer endpoints
//! - [`HeaderCodec`] - the serialize/deserialize/hash contract for headers
//! - [`VcBlockHeader`] - the immutable record of one completed view change
//! - [`TxBlockHeader`] - the primary (final) block header
//! - [`ChainHeader`] - either header kind, as stored at the chain tip
//!
//! ## Example
//!
//! ```rust
//! use vigil_types::{HeaderCodec, VcBlockHeader};
//!
//! let placeholder = VcBlockHeader::placeholder();
//! assert!(placeholder.is_placeholder());
//!
//! let bytes = placeholder.serialize();
//! let decoded = VcBlockHeader::deserialize(&bytes, 0).unwrap();
//! assert_eq!(decoded.compute_hash(), placeholder.compute_hash());
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod address;
pub mod block;
pub mod codec;
pub mod hash;
pub mod header;
pub mod view_change;

pub use address::NetworkAddress;
pub use block::{BlockHeaderBase, TxBlockHeader};
pub use codec::{ByteReader, ByteWriter, HeaderCodec};
pub use hash::{BlockHash, CommitteeHash, H256};
pub use header::{ChainHeader, HeaderKind};
pub use view_change::{FaultyLeader, VcBlockHeader};

/// Result type alias for Vigil types operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when working with Vigil types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid hex string
    #[error("invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    /// Invalid network address format
    #[error("invalid network address: {0}")]
    InvalidAddress(String),

    /// Invalid hash format
    #[error("invalid hash format: {0}")]
    InvalidHash(String),

    /// Structural decode failure of a canonical header encoding
    #[error("malformed header: {0}")]
    MalformedHeader(String),

    /// Field values violate a header invariant at construction time
    #[error("invalid header: {0}")]
    InvalidHeader(String),
}
