//! Keccak256 hashing.
//!
//! Keccak256 is the chain-wide digest: header `selfHash`, `prevHash` linkage
//! and the committee digest are all computed with it. [`Hasher`] streams
//! the committee member list into its digest without building a buffer.

use sha3::{Digest, Keccak256};

/// Compute the Keccak256 hash of the input data.
#[inline]
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// A streaming Keccak256 hasher.
///
/// ```rust
/// use vigil_crypto::Hasher;
///
/// let mut hasher = Hasher::new();
/// hasher.update_u64(7);
/// hasher.update(b"member");
/// let digest = hasher.finalize();
/// assert_eq!(digest.len(), 32);
/// ```
#[derive(Clone)]
pub struct Hasher {
    inner: Keccak256,
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new()
    }
}

impl Hasher {
    /// Create a new Keccak256 hasher.
    #[inline]
    pub fn new() -> Self {
        Self {
            inner: Keccak256::new(),
        }
    }

    /// Feed more bytes.
    #[inline]
    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    /// Feed a `u64` in big-endian order.
    #[inline]
    pub fn update_u64(&mut self, value: u64) {
        self.inner.update(value.to_be_bytes());
    }

    /// Consume the hasher and return the digest.
    #[inline]
    pub fn finalize(self) -> [u8; 32] {
        self.inner.finalize().into()
    }
}

impl std::fmt::Debug for Hasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hasher").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keccak256_empty() {
        assert_eq!(
            hex::encode(keccak256(b"")),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn test_hasher_u64_is_big_endian() {
        let mut hasher = Hasher::new();
        hasher.update_u64(0x0102_0304_0506_0708);
        assert_eq!(
            hasher.finalize(),
            keccak256(&[1, 2, 3, 4, 5, 6, 7, 8])
        );
    }

    #[test]
    fn test_hasher_streaming() {
        let mut hasher = Hasher::new();
        hasher.update(b"hello");
        hasher.update(b" world");
        assert_eq!(hasher.finalize(), keccak256(b"hello world"));
    }
}
