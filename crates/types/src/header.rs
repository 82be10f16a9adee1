//! Either header kind, as it sits at the chain tip.
//!
//! [`ChainHeader`] dispatches the codec over header kinds with a `match`
//! instead of a trait object. Its own encoding is a one-byte [`HeaderKind`]
//! tag followed by the inner header's canonical bytes; the hash of a
//! `ChainHeader` is the hash of the inner header, so linkage does not depend
//! on the envelope.

use crate::block::TxBlockHeader;
use crate::codec::{ByteReader, ByteWriter, HeaderCodec};
use crate::view_change::VcBlockHeader;
use crate::{BlockHash, CommitteeHash, Error, Result, H256};
use serde::Serialize;
use std::fmt;

/// Wire tag of a header kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
pub enum HeaderKind {
    /// Primary (final) block header
    Tx = 1,
    /// View-change block header
    ViewChange = 2,
}

impl TryFrom<u8> for HeaderKind {
    type Error = Error;

    fn try_from(tag: u8) -> Result<Self> {
        match tag {
            1 => Ok(HeaderKind::Tx),
            2 => Ok(HeaderKind::ViewChange),
            other => Err(Error::MalformedHeader(format!("unknown header kind {}", other))),
        }
    }
}

/// A header of any kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "header", rename_all = "snake_case")]
pub enum ChainHeader {
    /// Primary block header
    Tx(TxBlockHeader),
    /// View-change block header
    ViewChange(VcBlockHeader),
}

impl ChainHeader {
    /// Kind tag.
    pub fn kind(&self) -> HeaderKind {
        match self {
            ChainHeader::Tx(_) => HeaderKind::Tx,
            ChainHeader::ViewChange(_) => HeaderKind::ViewChange,
        }
    }

    /// Hash of the inner header; the value the next header links to.
    pub fn hash(&self) -> H256 {
        match self {
            ChainHeader::Tx(h) => h.compute_hash(),
            ChainHeader::ViewChange(h) => h.compute_hash(),
        }
    }

    /// DS epoch of the header.
    pub fn ds_epoch_number(&self) -> u64 {
        match self {
            ChainHeader::Tx(h) => h.ds_epoch_number(),
            ChainHeader::ViewChange(h) => h.ds_epoch_number(),
        }
    }

    /// Final-block epoch of the header.
    pub fn epoch_number(&self) -> u64 {
        match self {
            ChainHeader::Tx(h) => h.epoch_number(),
            ChainHeader::ViewChange(h) => h.view_change_epoch_number(),
        }
    }

    /// `(ds_epoch, epoch, counter)`; a primary block sorts before any view
    /// change at the same epochs, so its counter is 0.
    pub fn ordering_key(&self) -> (u64, u64, u32) {
        match self {
            ChainHeader::Tx(h) => (h.ds_epoch_number(), h.epoch_number(), 0),
            ChainHeader::ViewChange(h) => h.ordering_key(),
        }
    }

    /// Committee digest.
    pub fn committee_hash(&self) -> CommitteeHash {
        match self {
            ChainHeader::Tx(h) => h.committee_hash(),
            ChainHeader::ViewChange(h) => h.committee_hash(),
        }
    }

    /// Hash of the preceding header.
    pub fn prev_hash(&self) -> BlockHash {
        match self {
            ChainHeader::Tx(h) => h.prev_hash(),
            ChainHeader::ViewChange(h) => h.prev_hash(),
        }
    }

    /// The view-change header, if this is one.
    pub fn as_view_change(&self) -> Option<&VcBlockHeader> {
        match self {
            ChainHeader::ViewChange(h) => Some(h),
            ChainHeader::Tx(_) => None,
        }
    }
}

impl HeaderCodec for ChainHeader {
    fn write_fields(&self, writer: &mut ByteWriter) {
        writer.put_u8(self.kind() as u8);
        match self {
            ChainHeader::Tx(h) => h.write_fields(writer),
            ChainHeader::ViewChange(h) => h.write_fields(writer),
        }
    }

    fn read_fields(reader: &mut ByteReader<'_>) -> Result<Self> {
        match HeaderKind::try_from(reader.get_u8()?)? {
            HeaderKind::Tx => Ok(ChainHeader::Tx(TxBlockHeader::read_fields(reader)?)),
            HeaderKind::ViewChange => Ok(ChainHeader::ViewChange(VcBlockHeader::read_fields(
                reader,
            )?)),
        }
    }

    fn compute_hash(&self) -> H256 {
        self.hash()
    }
}

impl From<TxBlockHeader> for ChainHeader {
    fn from(header: TxBlockHeader) -> Self {
        ChainHeader::Tx(header)
    }
}

impl From<VcBlockHeader> for ChainHeader {
    fn from(header: VcBlockHeader) -> Self {
        ChainHeader::ViewChange(header)
    }
}

impl fmt::Display for ChainHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainHeader::Tx(h) => fmt::Display::fmt(h, f),
            ChainHeader::ViewChange(h) => fmt::Display::fmt(h, f),
        }
    }
}
