//! The view-change block header.
//!
//! A [`VcBlockHeader`] records one completed view change: the epoch and phase
//! in which the leader failed, the replacement leader the committee agreed
//! on, how many attempts it took, and every earlier candidate that also
//! failed. It is immutable; a later view change produces a new header.
//!
//! # Layout
//!
//! ```text
//! base (version, committee_hash, prev_hash)      68 bytes
//! ds_epoch_number                                 u64
//! view_change_epoch_number                        u64
//! view_change_state                               u8
//! candidate_leader_address                        18 bytes
//! candidate_leader_key                            48 bytes
//! view_change_counter                             u32
//! faulty leader count                             u32
//! count x (public key 48 bytes, address 18 bytes)
//! ```
//!
//! The decoder checks structure only. Whether the counter matches the
//! faulty-leader list is a validation concern, so a decoded header may
//! violate it; a header built with [`VcBlockHeader::new`] cannot.

use crate::address::NetworkAddress;
use crate::block::BlockHeaderBase;
use crate::codec::{ByteReader, ByteWriter, HeaderCodec};
use crate::{BlockHash, CommitteeHash, Error, Result, H256};
use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;
use std::sync::OnceLock;
use vigil_crypto::{BlsPrivateKey, BlsPublicKey, PUBLIC_KEY_SIZE};

/// A candidate that was nominated earlier in the round and failed to reach
/// agreement before its timeout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FaultyLeader {
    /// Identity of the failed candidate
    pub public_key: BlsPublicKey,
    /// Endpoint it was reachable at when nominated
    pub address: NetworkAddress,
}

impl FaultyLeader {
    /// Encoded size of one list entry.
    pub const ENCODED_SIZE: usize = PUBLIC_KEY_SIZE + NetworkAddress::ENCODED_SIZE;

    /// Create an entry.
    pub fn new(public_key: BlsPublicKey, address: NetworkAddress) -> Self {
        Self {
            public_key,
            address,
        }
    }
}

fn placeholder_key() -> &'static BlsPublicKey {
    static KEY: OnceLock<BlsPublicKey> = OnceLock::new();
    KEY.get_or_init(|| {
        BlsPrivateKey::from_seed(b"vigil/view-change/placeholder-key")
            .expect("placeholder seed is longer than 32 bytes")
            .public_key()
    })
}

/// Immutable record of one completed view change.
///
/// Equality is field for field, so two headers are equal exactly when their
/// canonical encodings are.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VcBlockHeader {
    base: BlockHeaderBase,
    ds_epoch_number: u64,
    view_change_epoch_number: u64,
    view_change_state: u8,
    candidate_leader_address: NetworkAddress,
    candidate_leader_key: BlsPublicKey,
    view_change_counter: u32,
    faulty_leaders: Vec<FaultyLeader>,
}

impl VcBlockHeader {
    /// Current layout version.
    pub const VERSION: u32 = 1;

    /// Create a header from agreed fields.
    ///
    /// Fails with [`Error::InvalidHeader`] when `view_change_counter` is not
    /// one more than the number of faulty leaders, or when the candidate
    /// appears among them.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ds_epoch_number: u64,
        view_change_epoch_number: u64,
        view_change_state: u8,
        candidate_leader_address: NetworkAddress,
        candidate_leader_key: BlsPublicKey,
        view_change_counter: u32,
        faulty_leaders: Vec<FaultyLeader>,
        committee_hash: CommitteeHash,
        prev_hash: BlockHash,
    ) -> Result<Self> {
        let header = Self {
            base: BlockHeaderBase::new(Self::VERSION, committee_hash, prev_hash),
            ds_epoch_number,
            view_change_epoch_number,
            view_change_state,
            candidate_leader_address,
            candidate_leader_key,
            view_change_counter,
            faulty_leaders,
        };
        if !header.counter_matches_faulty() {
            return Err(Error::InvalidHeader(format!(
                "counter {} with {} faulty leaders",
                header.view_change_counter,
                header.faulty_leaders.len()
            )));
        }
        if header.candidate_is_faulty() {
            return Err(Error::InvalidHeader(format!(
                "candidate {} is listed as faulty",
                header.candidate_leader_key.short_hex()
            )));
        }
        Ok(header)
    }

    /// The "no view change yet" header.
    ///
    /// Both epoch fields are `u64::MAX`. It is never a valid chain entry.
    pub fn placeholder() -> Self {
        Self {
            base: BlockHeaderBase::new(Self::VERSION, H256::NIL, H256::NIL),
            ds_epoch_number: u64::MAX,
            view_change_epoch_number: u64::MAX,
            view_change_state: 0,
            candidate_leader_address: NetworkAddress::UNSPECIFIED,
            candidate_leader_key: placeholder_key().clone(),
            view_change_counter: 1,
            faulty_leaders: Vec::new(),
        }
    }

    /// Whether this is the placeholder instance.
    pub fn is_placeholder(&self) -> bool {
        self.ds_epoch_number == u64::MAX && self.view_change_epoch_number == u64::MAX
    }

    /// `(ds_epoch, view_change_epoch, counter)`, the ordering key.
    pub fn ordering_key(&self) -> (u64, u64, u32) {
        (
            self.ds_epoch_number,
            self.view_change_epoch_number,
            self.view_change_counter,
        )
    }

    /// `view_change_counter == faulty_leaders.len() + 1`.
    pub fn counter_matches_faulty(&self) -> bool {
        self.faulty_leaders.len() as u64 + 1 == u64::from(self.view_change_counter)
    }

    /// Whether the candidate key appears in the faulty-leader list.
    pub fn candidate_is_faulty(&self) -> bool {
        self.is_listed_faulty(&self.candidate_leader_key)
    }

    /// Whether `key` appears in the faulty-leader list.
    pub fn is_listed_faulty(&self, key: &BlsPublicKey) -> bool {
        self.faulty_leaders.iter().any(|f| &f.public_key == key)
    }

    /// Shared base fields.
    pub fn base(&self) -> &BlockHeaderBase {
        &self.base
    }

    /// DS epoch in which the view change happened.
    pub fn ds_epoch_number(&self) -> u64 {
        self.ds_epoch_number
    }

    /// Final-block epoch in which the view change happened.
    pub fn view_change_epoch_number(&self) -> u64 {
        self.view_change_epoch_number
    }

    /// Consensus phase tag at the time of failure.
    pub fn view_change_state(&self) -> u8 {
        self.view_change_state
    }

    /// Endpoint of the elected leader.
    pub fn candidate_leader_address(&self) -> &NetworkAddress {
        &self.candidate_leader_address
    }

    /// Identity of the elected leader.
    pub fn candidate_leader_key(&self) -> &BlsPublicKey {
        &self.candidate_leader_key
    }

    /// Attempt number within this (epoch, state) context.
    pub fn view_change_counter(&self) -> u32 {
        self.view_change_counter
    }

    /// Earlier candidates of this round, in attempt order.
    pub fn faulty_leaders(&self) -> &[FaultyLeader] {
        &self.faulty_leaders
    }

    /// Committee digest.
    pub fn committee_hash(&self) -> CommitteeHash {
        self.base.committee_hash
    }

    /// Hash of the preceding header.
    pub fn prev_hash(&self) -> BlockHash {
        self.base.prev_hash
    }
}

impl Default for VcBlockHeader {
    fn default() -> Self {
        Self::placeholder()
    }
}

impl HeaderCodec for VcBlockHeader {
    fn write_fields(&self, writer: &mut ByteWriter) {
        self.base.write(writer);
        writer.put_u64(self.ds_epoch_number);
        writer.put_u64(self.view_change_epoch_number);
        writer.put_u8(self.view_change_state);
        writer.put_address(&self.candidate_leader_address);
        writer.put_public_key(&self.candidate_leader_key);
        writer.put_u32(self.view_change_counter);
        writer.put_u32(self.faulty_leaders.len() as u32);
        for leader in &self.faulty_leaders {
            writer.put_public_key(&leader.public_key);
            writer.put_address(&leader.address);
        }
    }

    fn read_fields(reader: &mut ByteReader<'_>) -> Result<Self> {
        let base = BlockHeaderBase::read(reader, Self::VERSION)?;
        let ds_epoch_number = reader.get_u64()?;
        let view_change_epoch_number = reader.get_u64()?;
        let view_change_state = reader.get_u8()?;
        let candidate_leader_address = reader.get_address()?;
        let candidate_leader_key = reader.get_public_key()?;
        let view_change_counter = reader.get_u32()?;

        let count = reader.get_exact_count(FaultyLeader::ENCODED_SIZE)?;
        let mut faulty_leaders = Vec::with_capacity(count);
        for _ in 0..count {
            let public_key = reader.get_public_key()?;
            let address = reader.get_address()?;
            faulty_leaders.push(FaultyLeader::new(public_key, address));
        }

        Ok(Self {
            base,
            ds_epoch_number,
            view_change_epoch_number,
            view_change_state,
            candidate_leader_address,
            candidate_leader_key,
            view_change_counter,
            faulty_leaders,
        })
    }
}

/// Lexicographic on `(ds_epoch, view_change_epoch, counter)`.
///
/// Two different headers with the same key are incomparable.
impl PartialOrd for VcBlockHeader {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match self.ordering_key().cmp(&other.ordering_key()) {
            Ordering::Equal if self != other => None,
            ordering => Some(ordering),
        }
    }
}

impl fmt::Display for VcBlockHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_placeholder() {
            return write!(f, "VcBlock(placeholder)");
        }
        write!(
            f,
            "VcBlock(ds_epoch={}, epoch={}, state={}, counter={}, candidate={}@{}, faulty={})",
            self.ds_epoch_number,
            self.view_change_epoch_number,
            self.view_change_state,
            self.view_change_counter,
            self.candidate_leader_key.short_hex(),
            self.candidate_leader_address,
            self.faulty_leaders.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(seed: u8) -> (BlsPublicKey, NetworkAddress) {
        let key = BlsPrivateKey::from_seed(&[seed; 32]).unwrap().public_key();
        let addr = format!("10.0.0.{}:4000", seed).parse().unwrap();
        (key, addr)
    }

    fn header(counter: u32, faulty_seeds: &[u8], candidate_seed: u8) -> Result<VcBlockHeader> {
        let (key, addr) = member(candidate_seed);
        let faulty = faulty_seeds
            .iter()
            .map(|s| {
                let (k, a) = member(*s);
                FaultyLeader::new(k, a)
            })
            .collect();
        VcBlockHeader::new(
            4,
            120,
            2,
            addr,
            key,
            counter,
            faulty,
            H256::keccak256(b"committee"),
            H256::keccak256(b"prev"),
        )
    }

    #[test]
    fn test_new_enforces_counter() {
        assert!(header(1, &[], 1).is_ok());
        assert!(header(3, &[2, 3], 1).is_ok());
        assert!(matches!(header(3, &[2], 1), Err(Error::InvalidHeader(_))));
        assert!(matches!(header(0, &[], 1), Err(Error::InvalidHeader(_))));
    }

    #[test]
    fn test_new_rejects_faulty_candidate() {
        assert!(matches!(header(2, &[1], 1), Err(Error::InvalidHeader(_))));
    }

    #[test]
    fn test_encoded_length() {
        let h = header(3, &[2, 3], 1).unwrap();
        let fixed = BlockHeaderBase::ENCODED_SIZE + 8 + 8 + 1 + 18 + 48 + 4 + 4;
        assert_eq!(HeaderCodec::serialize(&h).len(), fixed + 2 * FaultyLeader::ENCODED_SIZE);
    }

    #[test]
    fn test_placeholder() {
        let p = VcBlockHeader::placeholder();
        assert!(p.is_placeholder());
        assert_eq!(p.ordering_key(), (u64::MAX, u64::MAX, 1));
        assert!(VcBlockHeader::default().is_placeholder());
        assert_eq!(p.to_string(), "VcBlock(placeholder)");
        assert!(!header(1, &[], 1).unwrap().is_placeholder());
    }

    #[test]
    fn test_same_key_different_candidate_is_incomparable() {
        let a = header(1, &[], 1).unwrap();
        let b = header(1, &[], 2).unwrap();
        assert_ne!(a, b);
        assert_eq!(a.partial_cmp(&b), None);
        assert_eq!(a.partial_cmp(&a.clone()), Some(Ordering::Equal));
    }

    #[test]
    fn test_ordering_by_counter() {
        let first = header(1, &[], 1).unwrap();
        let second = header(2, &[1], 2).unwrap();
        assert!(first < second);
        assert!(second > first);
    }

    #[test]
    fn test_truncated_buffer_is_malformed() {
        let bytes = HeaderCodec::serialize(&header(2, &[2], 1).unwrap());
        for cut in [0, 10, 100, bytes.len() - 1] {
            assert!(matches!(
                VcBlockHeader::deserialize(&bytes[..cut], 0),
                Err(Error::MalformedHeader(_))
            ));
        }
    }
}
