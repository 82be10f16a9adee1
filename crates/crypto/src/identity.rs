//! The signing capability consumed by view-change coordination.
//!
//! The coordinator and validator never call BLS or Keccak directly. They go
//! through [`CryptoProvider`], which bundles sign, verify, aggregate and hash
//! behind one generic parameter so committees can be driven with any provider
//! that satisfies the contract.

use crate::bls::{BlsPrivateKey, BlsPublicKey, BlsSignature, DomainTag};
use crate::hash::keccak256;
use crate::{Hash, Result};

/// Sign/verify/aggregate/hash capability.
///
/// Implementations must be deterministic: the same inputs always produce the
/// same signature and the same digest on every node.
pub trait CryptoProvider: Send + Sync + 'static {
    /// Sign `message` with `key`.
    fn sign(&self, message: &[u8], key: &BlsPrivateKey) -> BlsSignature;

    /// Verify a single signature.
    fn verify(&self, message: &[u8], signature: &BlsSignature, key: &BlsPublicKey) -> bool;

    /// Combine signatures over the same message.
    fn aggregate(&self, signatures: &[&BlsSignature]) -> Result<BlsSignature>;

    /// Verify an aggregate produced by [`CryptoProvider::aggregate`] against
    /// the keys of every contributing signer.
    fn verify_aggregate(
        &self,
        message: &[u8],
        signature: &BlsSignature,
        keys: &[&BlsPublicKey],
    ) -> bool;

    /// Digest of the messages proposals and endorsements sign.
    fn hash(&self, data: &[u8]) -> Hash;
}

/// BLS12-381 signatures under the view-change domain, Keccak256 digests.
#[derive(Debug, Clone)]
pub struct BlsKeccak {
    domain: DomainTag,
}

impl BlsKeccak {
    /// Provider bound to the view-change domain of `chain_id`.
    pub fn new(chain_id: impl Into<String>) -> Self {
        Self {
            domain: DomainTag::view_change(chain_id),
        }
    }

    /// The domain every signature is made under.
    pub fn domain(&self) -> &DomainTag {
        &self.domain
    }
}

impl CryptoProvider for BlsKeccak {
    fn sign(&self, message: &[u8], key: &BlsPrivateKey) -> BlsSignature {
        key.sign(message, &self.domain)
    }

    fn verify(&self, message: &[u8], signature: &BlsSignature, key: &BlsPublicKey) -> bool {
        signature.verify(message, key, &self.domain)
    }

    fn aggregate(&self, signatures: &[&BlsSignature]) -> Result<BlsSignature> {
        BlsSignature::aggregate(signatures)
    }

    fn verify_aggregate(
        &self,
        message: &[u8],
        signature: &BlsSignature,
        keys: &[&BlsPublicKey],
    ) -> bool {
        signature.verify_aggregate(message, keys, &self.domain)
    }

    fn hash(&self, data: &[u8]) -> Hash {
        keccak256(data)
    }
}
