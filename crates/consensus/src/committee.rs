//! Committee membership and quorum arithmetic.
//!
//! The coordinator and validator never look up peers through global state.
//! They take a [`CommitteeDirectory`] as a parameter, so tests can drive them
//! with synthetic committees and a node can swap directories at epoch
//! boundaries.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use vigil_crypto::{BlsPublicKey, Hasher};
use vigil_types::{CommitteeHash, NetworkAddress, H256};

/// Errors building a committee or a quorum threshold
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommitteeError {
    /// No members
    #[error("committee has no members")]
    Empty,

    /// A member with zero weight
    #[error("member {0} has zero weight")]
    ZeroWeight(String),

    /// The same key listed twice
    #[error("member {0} listed more than once")]
    DuplicateMember(String),

    /// Total weight does not fit the arithmetic
    #[error("total committee weight overflows")]
    WeightOverflow,

    /// Quorum fraction outside (1/2, 1]
    #[error("quorum fraction {numerator}/{denominator} must be above 1/2 and at most 1")]
    InvalidQuorum {
        /// Numerator
        numerator: u64,
        /// Denominator
        denominator: u64,
    },
}

/// One committee seat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitteeMember {
    /// Consensus identity
    pub public_key: BlsPublicKey,
    /// Reachable endpoint
    pub address: NetworkAddress,
    /// Voting weight
    pub weight: u64,
}

impl CommitteeMember {
    /// Create a member.
    pub fn new(public_key: BlsPublicKey, address: NetworkAddress, weight: u64) -> Self {
        Self {
            public_key,
            address,
            weight,
        }
    }
}

/// Read-only view of the committee in effect.
///
/// `members` order is significant: it is the rotation order and the bit order
/// of endorsement bitmaps, so every node must see the same sequence.
pub trait CommitteeDirectory: Send + Sync {
    /// Members in canonical order.
    fn members(&self) -> &[CommitteeMember];

    /// Digest of the membership, compared against `committeeHash`.
    fn committee_digest(&self) -> CommitteeHash;

    /// Weight of `key`, zero for non-members.
    fn weight_of(&self, key: &BlsPublicKey) -> u64 {
        self.member(key).map(|m| m.weight).unwrap_or(0)
    }

    /// Position of `key` in member order.
    fn index_of(&self, key: &BlsPublicKey) -> Option<usize> {
        self.members().iter().position(|m| &m.public_key == key)
    }

    /// Member entry for `key`.
    fn member(&self, key: &BlsPublicKey) -> Option<&CommitteeMember> {
        self.members().iter().find(|m| &m.public_key == key)
    }

    /// Whether `key` holds a seat.
    fn is_member(&self, key: &BlsPublicKey) -> bool {
        self.index_of(key).is_some()
    }

    /// Sum of all member weights.
    fn total_weight(&self) -> u64 {
        self.members().iter().map(|m| m.weight).sum()
    }

    /// Number of seats.
    fn len(&self) -> usize {
        self.members().len()
    }

    /// Whether the committee has no seats.
    fn is_empty(&self) -> bool {
        self.members().is_empty()
    }
}

/// A fixed committee held in memory.
#[derive(Debug, Clone)]
pub struct Committee {
    members: Vec<CommitteeMember>,
    total_weight: u64,
    digest: CommitteeHash,
}

impl Committee {
    /// Build a committee, keeping the given member order.
    pub fn new(members: Vec<CommitteeMember>) -> Result<Self, CommitteeError> {
        if members.is_empty() {
            return Err(CommitteeError::Empty);
        }

        let mut seen = HashSet::with_capacity(members.len());
        let mut total_weight: u64 = 0;
        for member in &members {
            if member.weight == 0 {
                return Err(CommitteeError::ZeroWeight(member.public_key.short_hex()));
            }
            if !seen.insert(member.public_key.clone()) {
                return Err(CommitteeError::DuplicateMember(member.public_key.short_hex()));
            }
            total_weight = total_weight
                .checked_add(member.weight)
                .ok_or(CommitteeError::WeightOverflow)?;
        }

        let digest = Self::compute_digest(&members);
        Ok(Self {
            members,
            total_weight,
            digest,
        })
    }

    /// Digest of a member list.
    ///
    /// ```text
    /// keccak256(
    ///     member_count ||
    ///     for each member in order:
    ///         public_key || address || weight
    /// )
    /// ```
    ///
    /// Integers are big-endian, matching the header codec.
    pub fn compute_digest(members: &[CommitteeMember]) -> CommitteeHash {
        let mut hasher = Hasher::new();
        hasher.update_u64(members.len() as u64);
        for member in members {
            hasher.update(&member.public_key.to_bytes());
            hasher.update(&member.address.to_bytes());
            hasher.update_u64(member.weight);
        }
        H256::new(hasher.finalize())
    }
}

impl CommitteeDirectory for Committee {
    fn members(&self) -> &[CommitteeMember] {
        &self.members
    }

    fn committee_digest(&self) -> CommitteeHash {
        self.digest
    }

    fn total_weight(&self) -> u64 {
        self.total_weight
    }
}

/// Fraction of committee weight that constitutes agreement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuorumThreshold {
    numerator: u64,
    denominator: u64,
}

impl QuorumThreshold {
    /// Create a threshold of `numerator / denominator`.
    ///
    /// Anything at or below one half would let two disjoint quorums exist.
    pub fn new(numerator: u64, denominator: u64) -> Result<Self, CommitteeError> {
        let invalid = CommitteeError::InvalidQuorum {
            numerator,
            denominator,
        };
        if denominator == 0
            || numerator > denominator
            || numerator as u128 * 2 <= denominator as u128
        {
            return Err(invalid);
        }
        Ok(Self {
            numerator,
            denominator,
        })
    }

    /// The usual BFT threshold of two thirds.
    pub const fn two_thirds() -> Self {
        Self {
            numerator: 2,
            denominator: 3,
        }
    }

    /// Numerator.
    pub fn numerator(&self) -> u64 {
        self.numerator
    }

    /// Denominator.
    pub fn denominator(&self) -> u64 {
        self.denominator
    }

    /// Smallest weight that meets the threshold out of `total`.
    pub fn required_weight(&self, total: u64) -> u64 {
        let scaled = total as u128 * self.numerator as u128;
        let den = self.denominator as u128;
        ((scaled + den - 1) / den) as u64
    }

    /// Whether `weight` out of `total` meets the threshold.
    pub fn is_met(&self, weight: u64, total: u64) -> bool {
        weight as u128 * self.denominator as u128 >= total as u128 * self.numerator as u128
    }

    /// Weight required in `directory`.
    pub fn required_for<D: CommitteeDirectory + ?Sized>(&self, directory: &D) -> u64 {
        self.required_weight(directory.total_weight())
    }
}

impl Default for QuorumThreshold {
    fn default() -> Self {
        Self::two_thirds()
    }
}

impl std::fmt::Display for QuorumThreshold {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_crypto::BlsPrivateKey;

    fn member(seed: u8, weight: u64) -> CommitteeMember {
        let key = BlsPrivateKey::from_seed(&[seed; 32]).unwrap().public_key();
        let addr = format!("10.1.0.{}:7000", seed).parse().unwrap();
        CommitteeMember::new(key, addr, weight)
    }

    #[test]
    fn test_committee_lookups() {
        let committee = Committee::new(vec![member(1, 10), member(2, 20), member(3, 30)]).unwrap();
        let key = member(2, 20).public_key;

        assert_eq!(committee.len(), 3);
        assert_eq!(committee.total_weight(), 60);
        assert_eq!(committee.weight_of(&key), 20);
        assert_eq!(committee.index_of(&key), Some(1));
        assert!(committee.is_member(&key));
        assert_eq!(committee.weight_of(&member(9, 1).public_key), 0);
    }

    #[test]
    fn test_committee_rejects_bad_members() {
        assert_eq!(Committee::new(vec![]).unwrap_err(), CommitteeError::Empty);
        assert!(matches!(
            Committee::new(vec![member(1, 0)]),
            Err(CommitteeError::ZeroWeight(_))
        ));
        assert!(matches!(
            Committee::new(vec![member(1, 1), member(1, 5)]),
            Err(CommitteeError::DuplicateMember(_))
        ));
    }

    #[test]
    fn test_digest_depends_on_order_and_weight() {
        let a = Committee::new(vec![member(1, 1), member(2, 1)]).unwrap();
        let b = Committee::new(vec![member(2, 1), member(1, 1)]).unwrap();
        let c = Committee::new(vec![member(1, 1), member(2, 2)]).unwrap();
        let again = Committee::new(vec![member(1, 1), member(2, 1)]).unwrap();

        assert_eq!(a.committee_digest(), again.committee_digest());
        assert_ne!(a.committee_digest(), b.committee_digest());
        assert_ne!(a.committee_digest(), c.committee_digest());
    }

    #[test]
    fn test_digest_layout() {
        let members = vec![member(1, 3), member(2, 5)];
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&2u64.to_be_bytes());
        for m in &members {
            bytes.extend_from_slice(&m.public_key.to_bytes());
            bytes.extend_from_slice(&m.address.to_bytes());
            bytes.extend_from_slice(&m.weight.to_be_bytes());
        }
        assert_eq!(Committee::compute_digest(&members), H256::keccak256(&bytes));
    }

    #[test]
    fn test_two_thirds_quorum() {
        let q = QuorumThreshold::two_thirds();
        assert_eq!(q.required_weight(3), 2);
        assert_eq!(q.required_weight(4), 3);
        assert_eq!(q.required_weight(5), 4);
        assert_eq!(q.required_weight(100), 67);

        assert!(q.is_met(2, 3));
        assert!(!q.is_met(2, 5));
        assert!(!q.is_met(40, 100));
        assert!(q.is_met(67, 100));
    }

    #[test]
    fn test_quorum_bounds() {
        assert!(QuorumThreshold::new(1, 2).is_err());
        assert!(QuorumThreshold::new(4, 3).is_err());
        assert!(QuorumThreshold::new(1, 0).is_err());
        assert!(QuorumThreshold::new(3, 4).is_ok());
        assert!(QuorumThreshold::new(1, 1).is_ok());
    }
}
