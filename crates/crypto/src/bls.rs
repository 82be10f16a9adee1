//! # BLS12-381 Signatures for Committee Endorsements
//!
//! View-change proposals are signed with BLS so that a quorum of matching
//! proposals collapses into one 96-byte aggregate signature that any node can
//! check against the committee's public keys.
//!
//! Every signature is produced under a [`DomainTag`] that binds the message
//! type and chain id into the hash-to-curve DST, so a view-change signature
//! can never be replayed as anything else.
//!
//! ## Key Types
//!
//! - `BlsPrivateKey` - Secret key for signing (32 bytes scalar)
//! - `BlsPublicKey` - Public key (48 bytes G1 point)
//! - `BlsSignature` - Signature (96 bytes G2 point)
//!
//! ## Example
//!
//! ```rust
//! use vigil_crypto::bls::{BlsPrivateKey, BlsSignature, DomainTag};
//!
//! let domain = DomainTag::view_change("vigil-local");
//! let keys: Vec<_> = (1..=3u8)
//!     .map(|i| BlsPrivateKey::from_seed(&[i; 32]).unwrap())
//!     .collect();
//! let pubkeys: Vec<_> = keys.iter().map(|k| k.public_key()).collect();
//!
//! let signatures: Vec<_> = keys.iter().map(|k| k.sign(b"header hash", &domain)).collect();
//! let refs: Vec<_> = signatures.iter().collect();
//! let aggregate = BlsSignature::aggregate(&refs).unwrap();
//!
//! let pk_refs: Vec<_> = pubkeys.iter().collect();
//! assert!(aggregate.verify_aggregate(b"header hash", &pk_refs, &domain));
//! ```

use crate::{CryptoError, Result};
use blst::min_pk::{AggregateSignature, PublicKey, SecretKey, Signature};
use blst::BLST_ERROR;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Size of a compressed public key in bytes.
pub const PUBLIC_KEY_SIZE: usize = 48;

/// Size of a compressed signature in bytes.
pub const SIGNATURE_SIZE: usize = 96;

/// Size of a secret key scalar in bytes.
pub const SECRET_KEY_SIZE: usize = 32;

/// Base domain separation tag prefix for Vigil BLS signatures.
const DST_PREFIX: &[u8] = b"BLS_SIG_BLS12381G2_XMD:SHA-256_SSWU_RO_VIGIL_";

// ============================================================================
// Domain Separation
// ============================================================================

/// Message types for domain separation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    /// Signed view-change proposal over a candidate header hash
    ViewChange,
    /// Application-defined message
    Custom,
}

impl MessageType {
    /// Get the string tag for this message type.
    pub fn as_tag(&self) -> &'static str {
        match self {
            MessageType::ViewChange => "VIEW_CHANGE",
            MessageType::Custom => "CUSTOM",
        }
    }
}

/// Domain separation tag for BLS signatures.
///
/// Format: `VIGIL_<MESSAGE_TYPE>_<CHAIN_ID>` appended to the ciphersuite prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DomainTag {
    message_type: MessageType,
    chain_id: String,
    dst: Vec<u8>,
}

impl DomainTag {
    /// Create a new domain tag.
    pub fn new(message_type: MessageType, chain_id: impl Into<String>) -> Self {
        let chain_id = chain_id.into();
        let mut dst = Vec::with_capacity(DST_PREFIX.len() + 16 + chain_id.len());
        dst.extend_from_slice(DST_PREFIX);
        dst.extend_from_slice(message_type.as_tag().as_bytes());
        dst.push(b'_');
        dst.extend_from_slice(chain_id.as_bytes());
        Self {
            message_type,
            chain_id,
            dst,
        }
    }

    /// Domain tag for view-change proposals and their aggregate endorsements.
    pub fn view_change(chain_id: impl Into<String>) -> Self {
        Self::new(MessageType::ViewChange, chain_id)
    }

    /// Get the message type.
    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    /// Get the chain ID.
    pub fn chain_id(&self) -> &str {
        &self.chain_id
    }

    /// Get the full DST bytes for signing.
    pub fn dst(&self) -> &[u8] {
        &self.dst
    }
}

fn decode_fixed<const N: usize>(hex_str: &str) -> Result<[u8; N]> {
    let hex_str = hex_str.strip_prefix("0x").unwrap_or(hex_str);
    let bytes = hex::decode(hex_str)?;
    if bytes.len() != N {
        return Err(CryptoError::InvalidLength {
            expected: N,
            actual: bytes.len(),
        });
    }
    let mut arr = [0u8; N];
    arr.copy_from_slice(&bytes);
    Ok(arr)
}

// ============================================================================
// BLS Private Key
// ============================================================================

/// BLS private key (secret key)
///
/// A 32-byte scalar used for signing. Must be kept secret.
#[derive(Clone)]
pub struct BlsPrivateKey {
    inner: SecretKey,
}

impl BlsPrivateKey {
    /// Generate a random BLS private key from OS entropy.
    pub fn random() -> Self {
        let mut ikm = [0u8; SECRET_KEY_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut ikm);
        let sk = SecretKey::key_gen(&ikm, &[]).expect("32-byte ikm is always accepted");
        Self { inner: sk }
    }

    /// Derive a BLS private key from input keying material.
    ///
    /// The same seed always yields the same key, which is how test and
    /// simulation committees are built.
    pub fn from_seed(ikm: &[u8]) -> Result<Self> {
        if ikm.len() < SECRET_KEY_SIZE {
            return Err(CryptoError::InvalidLength {
                expected: SECRET_KEY_SIZE,
                actual: ikm.len(),
            });
        }
        let sk = SecretKey::key_gen(ikm, &[])
            .map_err(|_| CryptoError::InvalidPrivateKey("key generation failed".to_string()))?;
        Ok(Self { inner: sk })
    }

    /// Create a BLS private key from its big-endian scalar bytes.
    pub fn from_bytes(bytes: &[u8; SECRET_KEY_SIZE]) -> Result<Self> {
        let sk = SecretKey::from_bytes(bytes)
            .map_err(|e| CryptoError::InvalidPrivateKey(format!("{:?}", e)))?;
        Ok(Self { inner: sk })
    }

    /// Create a BLS private key from a hex string.
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        Self::from_bytes(&decode_fixed::<SECRET_KEY_SIZE>(hex_str)?)
    }

    /// Get the raw bytes of the private key.
    pub fn to_bytes(&self) -> [u8; SECRET_KEY_SIZE] {
        self.inner.to_bytes()
    }

    /// Get the hex-encoded private key.
    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// Derive the public key from this private key.
    pub fn public_key(&self) -> BlsPublicKey {
        BlsPublicKey {
            inner: self.inner.sk_to_pk(),
        }
    }

    /// Sign a message under the given domain.
    pub fn sign(&self, message: &[u8], domain: &DomainTag) -> BlsSignature {
        BlsSignature {
            inner: self.inner.sign(message, domain.dst(), &[]),
        }
    }
}

impl fmt::Debug for BlsPrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlsPrivateKey")
            .field("public_key", &self.public_key().to_hex())
            .finish()
    }
}

// ============================================================================
// BLS Public Key
// ============================================================================

/// BLS public key (48 bytes, G1 point)
///
/// Ordered by its compressed encoding so committee member lists and signer
/// sets have a canonical order.
#[derive(Clone)]
pub struct BlsPublicKey {
    inner: PublicKey,
}

impl BlsPublicKey {
    /// Create a public key from compressed bytes.
    ///
    /// Rejects points off the curve and non-canonical encodings.
    pub fn from_bytes(bytes: &[u8; PUBLIC_KEY_SIZE]) -> Result<Self> {
        let pk = PublicKey::from_bytes(bytes)
            .map_err(|e| CryptoError::InvalidPublicKey(format!("{:?}", e)))?;

        if pk.to_bytes() != *bytes {
            return Err(CryptoError::BlsError(
                "non-canonical public key encoding".to_string(),
            ));
        }

        Ok(Self { inner: pk })
    }

    /// Create a public key from a hex string.
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        Self::from_bytes(&decode_fixed::<PUBLIC_KEY_SIZE>(hex_str)?)
    }

    /// Get the compressed public key bytes.
    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_SIZE] {
        self.inner.to_bytes()
    }

    /// Get the hex-encoded public key.
    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// Short hex prefix for log lines.
    pub fn short_hex(&self) -> String {
        hex::encode(&self.to_bytes()[..6])
    }

    /// Verify a signature made under `domain` by this key.
    pub fn verify(&self, message: &[u8], signature: &BlsSignature, domain: &DomainTag) -> bool {
        signature.verify(message, self, domain)
    }
}

impl PartialEq for BlsPublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

impl Eq for BlsPublicKey {}

impl PartialOrd for BlsPublicKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BlsPublicKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.to_bytes().cmp(&other.to_bytes())
    }
}

impl std::hash::Hash for BlsPublicKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.to_bytes().hash(state);
    }
}

impl fmt::Debug for BlsPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlsPublicKey({})", self.to_hex())
    }
}

impl fmt::Display for BlsPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}

impl Serialize for BlsPublicKey {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let bytes = self.to_bytes();
        if serializer.is_human_readable() {
            serializer.serialize_str(&hex::encode(bytes))
        } else {
            serializer.serialize_bytes(&bytes)
        }
    }
}

impl<'de> Deserialize<'de> for BlsPublicKey {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            BlsPublicKey::from_hex(&s).map_err(serde::de::Error::custom)
        } else {
            let bytes = <Vec<u8>>::deserialize(deserializer)?;
            let arr: [u8; PUBLIC_KEY_SIZE] = bytes.as_slice().try_into().map_err(|_| {
                serde::de::Error::custom(format!(
                    "expected {} bytes, got {}",
                    PUBLIC_KEY_SIZE,
                    bytes.len()
                ))
            })?;
            BlsPublicKey::from_bytes(&arr).map_err(serde::de::Error::custom)
        }
    }
}

// ============================================================================
// BLS Signature
// ============================================================================

/// BLS signature (96 bytes, G2 point)
#[derive(Clone)]
pub struct BlsSignature {
    inner: Signature,
}

impl BlsSignature {
    /// Create a signature from compressed bytes.
    ///
    /// Validates canonical encoding to prevent malleability.
    pub fn from_bytes(bytes: &[u8; SIGNATURE_SIZE]) -> Result<Self> {
        let sig = Signature::from_bytes(bytes)
            .map_err(|e| CryptoError::InvalidSignature(format!("{:?}", e)))?;

        if sig.to_bytes() != *bytes {
            return Err(CryptoError::BlsError(
                "non-canonical signature encoding".to_string(),
            ));
        }

        Ok(Self { inner: sig })
    }

    /// Create a signature from a hex string.
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        Self::from_bytes(&decode_fixed::<SIGNATURE_SIZE>(hex_str)?)
    }

    /// Get the compressed signature bytes.
    pub fn to_bytes(&self) -> [u8; SIGNATURE_SIZE] {
        self.inner.to_bytes()
    }

    /// Get the hex-encoded signature.
    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// Verify the signature against a message and public key.
    pub fn verify(&self, message: &[u8], public_key: &BlsPublicKey, domain: &DomainTag) -> bool {
        let result = self
            .inner
            .verify(true, message, domain.dst(), &[], &public_key.inner, true);
        result == BLST_ERROR::BLST_SUCCESS
    }

    /// Aggregate signatures over the same message into one.
    pub fn aggregate(signatures: &[&BlsSignature]) -> Result<Self> {
        if signatures.is_empty() {
            return Err(CryptoError::BlsError(
                "cannot aggregate empty list".to_string(),
            ));
        }

        let sigs: Vec<&Signature> = signatures.iter().map(|s| &s.inner).collect();
        let agg = AggregateSignature::aggregate(&sigs, true)
            .map_err(|e| CryptoError::BlsError(format!("aggregation failed: {:?}", e)))?;

        Ok(Self {
            inner: agg.to_signature(),
        })
    }

    /// Verify an aggregate signature where every signer signed `message`.
    ///
    /// Returns false for an empty key list.
    pub fn verify_aggregate(
        &self,
        message: &[u8],
        public_keys: &[&BlsPublicKey],
        domain: &DomainTag,
    ) -> bool {
        if public_keys.is_empty() {
            return false;
        }

        let pks: Vec<&PublicKey> = public_keys.iter().map(|pk| &pk.inner).collect();
        let result = self
            .inner
            .fast_aggregate_verify(true, message, domain.dst(), &pks);
        result == BLST_ERROR::BLST_SUCCESS
    }
}

impl PartialEq for BlsSignature {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

impl Eq for BlsSignature {}

impl fmt::Debug for BlsSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlsSignature({})", self.to_hex())
    }
}

impl Serialize for BlsSignature {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let bytes = self.to_bytes();
        if serializer.is_human_readable() {
            serializer.serialize_str(&hex::encode(bytes))
        } else {
            serializer.serialize_bytes(&bytes)
        }
    }
}

impl<'de> Deserialize<'de> for BlsSignature {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            BlsSignature::from_hex(&s).map_err(serde::de::Error::custom)
        } else {
            let bytes = <Vec<u8>>::deserialize(deserializer)?;
            let arr: [u8; SIGNATURE_SIZE] = bytes.as_slice().try_into().map_err(|_| {
                serde::de::Error::custom(format!(
                    "expected {} bytes, got {}",
                    SIGNATURE_SIZE,
                    bytes.len()
                ))
            })?;
            BlsSignature::from_bytes(&arr).map_err(serde::de::Error::custom)
        }
    }
}
