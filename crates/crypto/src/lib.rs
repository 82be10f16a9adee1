//! # Vigil Crypto
//!
//! Cryptographic primitives for the Vigil view-change subsystem.
//!
//! This crate provides:
//! - **Keccak256 hashing** - the chain-wide digest used for header linkage
//! - **BLS12-381 signatures** - aggregatable signatures for committee endorsements
//! - **[`CryptoProvider`]** - the sign/verify/aggregate/hash capability consumed by
//!   the coordinator and validator, with a BLS + Keccak implementation
//!
//! ## Example
//!
//! ```rust
//! use vigil_crypto::{keccak256, BlsKeccak, BlsPrivateKey, CryptoProvider};
//!
//! let provider = BlsKeccak::new("vigil-local");
//! let key = BlsPrivateKey::from_seed(&[7u8; 32]).unwrap();
//! let digest = keccak256(b"view change");
//!
//! let signature = provider.sign(&digest, &key);
//! assert!(provider.verify(&digest, &signature, &key.public_key()));
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod bls;
pub mod hash;
pub mod identity;

pub use bls::{
    BlsPrivateKey, BlsPublicKey, BlsSignature, DomainTag, MessageType, PUBLIC_KEY_SIZE,
    SECRET_KEY_SIZE, SIGNATURE_SIZE,
};
pub use hash::{keccak256, Hasher};
pub use identity::{BlsKeccak, CryptoProvider};

/// Common type alias for 32-byte hash
pub type Hash = [u8; 32];

/// Error types for cryptographic operations
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// Invalid private key bytes
    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),

    /// Invalid public key bytes
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    /// Invalid signature bytes
    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    /// BLS operation failed
    #[error("BLS operation failed: {0}")]
    BlsError(String),

    /// Invalid input length
    #[error("invalid input length: expected {expected}, got {actual}")]
    InvalidLength {
        /// Expected length in bytes
        expected: usize,
        /// Actual length in bytes
        actual: usize,
    },

    /// Hex decoding error
    #[error("hex decoding error: {0}")]
    HexError(String),
}

impl From<hex::FromHexError> for CryptoError {
    fn from(e: hex::FromHexError) -> Self {
        CryptoError::HexError(e.to_string())
    }
}

/// Result type for cryptographic operations
pub type Result<T> = std::result::Result<T, CryptoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keccak256_basic() {
        let hash = keccak256(b"hello");
        assert_eq!(
            hex::encode(hash),
            "1c8aff950685c2ed4bc3174f3472287b56d9517b9c948127319a09a7a36deac8"
        );
    }

    #[test]
    fn test_bls_aggregate_through_provider() {
        let provider = BlsKeccak::new("vigil-test");
        let keys: Vec<_> = (0..3u8)
            .map(|i| BlsPrivateKey::from_seed(&[i + 1; 32]).unwrap())
            .collect();
        let pubkeys: Vec<_> = keys.iter().map(|k| k.public_key()).collect();
        let message = provider.hash(b"candidate header");

        let signatures: Vec<_> = keys.iter().map(|k| provider.sign(&message, k)).collect();
        let sig_refs: Vec<_> = signatures.iter().collect();
        let aggregate = provider.aggregate(&sig_refs).unwrap();

        let pk_refs: Vec<_> = pubkeys.iter().collect();
        assert!(provider.verify_aggregate(&message, &aggregate, &pk_refs));
    }
}
