//! Canonical byte codec shared by all header kinds.
//!
//! Every header kind lays out fixed-width big-endian fields in declaration
//! order, starting with the [`BlockHeaderBase`](crate::BlockHeaderBase)
//! prefix. Variable-length sequences are a `u32` count followed by that many
//! fixed-width items. The header hash is Keccak256 over exactly these bytes.
//!
//! Nodes only agree on a header hash if they agree on these bytes, so the
//! reader is strict: short buffers, trailing bytes and counts that disagree
//! with the remaining length are all [`Error::MalformedHeader`].

use crate::address::NetworkAddress;
use crate::hash::{H256, HASH_SIZE};
use crate::{Error, Result};
use vigil_crypto::{BlsPublicKey, PUBLIC_KEY_SIZE};

/// Serialize, deserialize and hash a header.
///
/// Implemented per header kind and dispatched statically. Implementors provide
/// [`write_fields`](HeaderCodec::write_fields) and
/// [`read_fields`](HeaderCodec::read_fields); the byte-buffer entry points and
/// the hash are derived from them.
pub trait HeaderCodec: Sized {
    /// Append this header's canonical encoding.
    fn write_fields(&self, writer: &mut ByteWriter);

    /// Read one header from the reader's current position.
    fn read_fields(reader: &mut ByteReader<'_>) -> Result<Self>;

    /// Canonical encoding as a fresh buffer.
    fn serialize(&self) -> Vec<u8> {
        let mut writer = ByteWriter::new();
        self.write_fields(&mut writer);
        writer.into_bytes()
    }

    /// Write the canonical encoding into `dst` starting at `offset`, growing
    /// `dst` as needed. Bytes after the header are truncated.
    fn serialize_into(&self, dst: &mut Vec<u8>, offset: usize) {
        let bytes = self.serialize();
        dst.resize(offset, 0);
        dst.extend_from_slice(&bytes);
    }

    /// Decode a header occupying `src[offset..]` exactly.
    fn deserialize(src: &[u8], offset: usize) -> Result<Self> {
        if offset > src.len() {
            return Err(Error::MalformedHeader(format!(
                "offset {} beyond buffer of {} bytes",
                offset,
                src.len()
            )));
        }
        let mut reader = ByteReader::new(&src[offset..]);
        let header = Self::read_fields(&mut reader)?;
        reader.finish()?;
        Ok(header)
    }

    /// Keccak256 over the canonical encoding.
    fn compute_hash(&self) -> H256 {
        H256::keccak256(&self.serialize())
    }
}

/// Append-only big-endian writer.
#[derive(Debug, Default)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    /// Create an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Write one byte.
    pub fn put_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    /// Write a big-endian `u32`.
    pub fn put_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    /// Write a big-endian `u64`.
    pub fn put_u64(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    /// Write raw bytes.
    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Write a 32-byte hash.
    pub fn put_hash(&mut self, hash: &H256) {
        self.buf.extend_from_slice(hash.as_bytes());
    }

    /// Write a compressed 48-byte public key.
    pub fn put_public_key(&mut self, key: &BlsPublicKey) {
        self.buf.extend_from_slice(&key.to_bytes());
    }

    /// Write an 18-byte network address.
    pub fn put_address(&mut self, address: &NetworkAddress) {
        self.buf.extend_from_slice(&address.to_bytes());
    }

    /// Bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Finish and take the buffer.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Bounds-checked big-endian reader.
#[derive(Debug)]
pub struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    /// Read from the start of `buf`.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Current position.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Take the next `n` bytes.
    pub fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(Error::MalformedHeader(format!(
                "need {} bytes at offset {}, only {} remain",
                n,
                self.pos,
                self.remaining()
            )));
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut arr = [0u8; N];
        arr.copy_from_slice(self.take(N)?);
        Ok(arr)
    }

    /// Read one byte.
    pub fn get_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    /// Read a big-endian `u32`.
    pub fn get_u32(&mut self) -> Result<u32> {
        Ok(u32::from_be_bytes(self.take_array()?))
    }

    /// Read a big-endian `u64`.
    pub fn get_u64(&mut self) -> Result<u64> {
        Ok(u64::from_be_bytes(self.take_array()?))
    }

    /// Read a 32-byte hash.
    pub fn get_hash(&mut self) -> Result<H256> {
        Ok(H256::new(self.take_array::<HASH_SIZE>()?))
    }

    /// Read a compressed public key; invalid curve points are malformed.
    pub fn get_public_key(&mut self) -> Result<BlsPublicKey> {
        let offset = self.pos;
        let bytes = self.take_array::<PUBLIC_KEY_SIZE>()?;
        BlsPublicKey::from_bytes(&bytes).map_err(|e| {
            Error::MalformedHeader(format!("invalid public key at offset {}: {}", offset, e))
        })
    }

    /// Read an 18-byte network address.
    pub fn get_address(&mut self) -> Result<NetworkAddress> {
        Ok(NetworkAddress::from_bytes(
            &self.take_array::<{ NetworkAddress::ENCODED_SIZE }>()?,
        ))
    }

    /// Read a `u32` item count and check that exactly `count * item_size`
    /// bytes remain.
    pub fn get_exact_count(&mut self, item_size: usize) -> Result<usize> {
        let count = self.get_u32()? as usize;
        let needed = count.checked_mul(item_size).ok_or_else(|| {
            Error::MalformedHeader(format!("item count {} overflows", count))
        })?;
        if needed != self.remaining() {
            return Err(Error::MalformedHeader(format!(
                "count prefix {} needs {} bytes, {} remain",
                count,
                needed,
                self.remaining()
            )));
        }
        Ok(count)
    }

    /// Fail if any bytes are left unconsumed.
    pub fn finish(&self) -> Result<()> {
        if self.remaining() != 0 {
            return Err(Error::MalformedHeader(format!(
                "{} trailing bytes after header",
                self.remaining()
            )));
        }
        Ok(())
    }
}
