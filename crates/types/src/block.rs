//! The shared header base and the primary block header.
//!
//! - [`BlockHeaderBase`] - version, committee digest and `prevHash` linkage,
//!   written first by every header kind
//! - [`TxBlockHeader`] - the header of a block finalized by the primary
//!   consensus round

use crate::codec::{ByteReader, ByteWriter, HeaderCodec};
use crate::{BlockHash, CommitteeHash, Error, Result, H256};
use serde::Serialize;
use std::fmt;
use vigil_crypto::BlsPublicKey;

/// Fields common to every header kind.
///
/// Encoded as `version: u32 | committee_hash: 32 | prev_hash: 32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BlockHeaderBase {
    /// Layout version of the header kind that embeds this base
    pub version: u32,
    /// Digest of the committee membership in effect
    pub committee_hash: CommitteeHash,
    /// Hash of the preceding header in the chain
    pub prev_hash: BlockHash,
}

impl BlockHeaderBase {
    /// Encoded size of the base prefix.
    pub const ENCODED_SIZE: usize = 4 + 32 + 32;

    /// Create a base with the given version.
    pub fn new(version: u32, committee_hash: CommitteeHash, prev_hash: BlockHash) -> Self {
        Self {
            version,
            committee_hash,
            prev_hash,
        }
    }

    /// Write the base prefix.
    pub fn write(&self, writer: &mut ByteWriter) {
        writer.put_u32(self.version);
        writer.put_hash(&self.committee_hash);
        writer.put_hash(&self.prev_hash);
    }

    /// Read the base prefix and require `expected_version`.
    pub fn read(reader: &mut ByteReader<'_>, expected_version: u32) -> Result<Self> {
        let version = reader.get_u32()?;
        if version != expected_version {
            return Err(Error::MalformedHeader(format!(
                "unsupported header version {}, expected {}",
                version, expected_version
            )));
        }
        Ok(Self {
            version,
            committee_hash: reader.get_hash()?,
            prev_hash: reader.get_hash()?,
        })
    }
}

/// Header of a block finalized by the primary consensus round.
///
/// View-change records link to these through `prevHash`, and a ledger is
/// seeded with one as its genesis tip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TxBlockHeader {
    base: BlockHeaderBase,
    epoch_number: u64,
    ds_epoch_number: u64,
    timestamp: u64,
    proposer_key: BlsPublicKey,
    state_root: H256,
}

impl TxBlockHeader {
    /// Current layout version.
    pub const VERSION: u32 = 1;

    /// Create a primary block header.
    pub fn new(
        epoch_number: u64,
        ds_epoch_number: u64,
        timestamp: u64,
        proposer_key: BlsPublicKey,
        state_root: H256,
        committee_hash: CommitteeHash,
        prev_hash: BlockHash,
    ) -> Self {
        Self {
            base: BlockHeaderBase::new(Self::VERSION, committee_hash, prev_hash),
            epoch_number,
            ds_epoch_number,
            timestamp,
            proposer_key,
            state_root,
        }
    }

    /// The first block of a chain: epoch 0, DS epoch 0, nil parent.
    pub fn genesis(proposer_key: BlsPublicKey, committee_hash: CommitteeHash, timestamp: u64) -> Self {
        Self::new(
            0,
            0,
            timestamp,
            proposer_key,
            H256::NIL,
            committee_hash,
            H256::NIL,
        )
    }

    /// Shared base fields.
    pub fn base(&self) -> &BlockHeaderBase {
        &self.base
    }

    /// Final-block epoch number.
    pub fn epoch_number(&self) -> u64 {
        self.epoch_number
    }

    /// DS epoch this block belongs to.
    pub fn ds_epoch_number(&self) -> u64 {
        self.ds_epoch_number
    }

    /// Unix timestamp in milliseconds.
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Leader that proposed this block.
    pub fn proposer_key(&self) -> &BlsPublicKey {
        &self.proposer_key
    }

    /// State root after the block.
    pub fn state_root(&self) -> H256 {
        self.state_root
    }

    /// Committee digest.
    pub fn committee_hash(&self) -> CommitteeHash {
        self.base.committee_hash
    }

    /// Parent linkage.
    pub fn prev_hash(&self) -> BlockHash {
        self.base.prev_hash
    }
}

impl HeaderCodec for TxBlockHeader {
    fn write_fields(&self, writer: &mut ByteWriter) {
        self.base.write(writer);
        writer.put_u64(self.epoch_number);
        writer.put_u64(self.ds_epoch_number);
        writer.put_u64(self.timestamp);
        writer.put_public_key(&self.proposer_key);
        writer.put_hash(&self.state_root);
    }

    fn read_fields(reader: &mut ByteReader<'_>) -> Result<Self> {
        Ok(Self {
            base: BlockHeaderBase::read(reader, Self::VERSION)?,
            epoch_number: reader.get_u64()?,
            ds_epoch_number: reader.get_u64()?,
            timestamp: reader.get_u64()?,
            proposer_key: reader.get_public_key()?,
            state_root: reader.get_hash()?,
        })
    }
}

impl fmt::Display for TxBlockHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TxBlock(epoch={}, ds_epoch={}, prev={})",
            self.epoch_number,
            self.ds_epoch_number,
            self.base.prev_hash.short_hex()
        )
    }
}
