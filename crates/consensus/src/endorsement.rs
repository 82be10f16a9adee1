//! Aggregate endorsement of an agreed view-change header.
//!
//! A [`ViewChangeEndorsement`] is the proof carried alongside a finalized
//! header: one aggregated BLS signature over the header's signing digest plus
//! a bitmap of which committee members contributed to it. Bit `i` stands for
//! `directory.members()[i]`.

use serde::{Deserialize, Serialize};
use tracing::trace;
use vigil_crypto::{BlsPublicKey, BlsSignature, CryptoProvider};
use vigil_types::H256;

use crate::committee::{CommitteeDirectory, QuorumThreshold};
use crate::proposal::ViewChangeProposal;

/// Errors building or checking an endorsement
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum EndorsementError {
    /// Nothing to aggregate
    #[error("no signatures to aggregate")]
    Empty,

    /// Signer index outside the committee
    #[error("signer index {0} is outside the committee")]
    UnknownSigner(usize),

    /// Signer holds no committee seat
    #[error("signer {0} is not a committee member")]
    NotMember(String),

    /// Bitmap length does not match the committee
    #[error("signers bitmap has {got} bytes, committee needs {expected}")]
    BitmapLength {
        /// Bytes needed
        expected: usize,
        /// Bytes present
        got: usize,
    },

    /// Signers cover too little weight
    #[error("endorsement weight {got} below required {required}")]
    InsufficientWeight {
        /// Weight of the signers
        got: u64,
        /// Weight needed
        required: u64,
    },

    /// Aggregate signature does not verify
    #[error("aggregate signature does not verify")]
    InvalidAggregate,

    /// Aggregation failed
    #[error("aggregation failed: {0}")]
    Aggregation(String),
}

/// Aggregate signature plus the members that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewChangeEndorsement {
    /// Aggregated BLS signature over the header's signing digest
    pub aggregate_signature: BlsSignature,
    /// Bit `i` set means member `i` signed
    pub signers_bitmap: Vec<u8>,
}

impl ViewChangeEndorsement {
    /// Create an endorsement from its parts.
    pub fn new(aggregate_signature: BlsSignature, signers_bitmap: Vec<u8>) -> Self {
        Self {
            aggregate_signature,
            signers_bitmap,
        }
    }

    /// Aggregate the signatures of `proposals`, which must all be for the same
    /// header and come from committee members.
    pub fn aggregate<D, C>(
        proposals: &[&ViewChangeProposal],
        directory: &D,
        crypto: &C,
    ) -> Result<Self, EndorsementError>
    where
        D: CommitteeDirectory + ?Sized,
        C: CryptoProvider + ?Sized,
    {
        if proposals.is_empty() {
            return Err(EndorsementError::Empty);
        }

        let mut bitmap = vec![0u8; bitmap_len(directory.len())];
        let mut signatures = Vec::with_capacity(proposals.len());
        for proposal in proposals {
            let idx = directory
                .index_of(&proposal.proposer)
                .ok_or_else(|| EndorsementError::NotMember(proposal.proposer.short_hex()))?;
            bitmap[idx / 8] |= 1 << (idx % 8);
            signatures.push(&proposal.signature);
        }

        let aggregate_signature = crypto
            .aggregate(&signatures)
            .map_err(|e| EndorsementError::Aggregation(e.to_string()))?;

        trace!(signers = signatures.len(), "Aggregated endorsement");
        Ok(Self::new(aggregate_signature, bitmap))
    }

    /// Member indices that signed.
    pub fn signers(&self) -> Vec<usize> {
        let mut signers = Vec::new();
        for (byte_idx, byte) in self.signers_bitmap.iter().enumerate() {
            for bit in 0..8 {
                if byte & (1 << bit) != 0 {
                    signers.push(byte_idx * 8 + bit);
                }
            }
        }
        signers
    }

    /// Number of signers.
    pub fn signer_count(&self) -> u32 {
        self.signers_bitmap.iter().map(|b| b.count_ones()).sum()
    }

    /// Total weight of the signers in `directory`.
    pub fn signed_weight<D: CommitteeDirectory + ?Sized>(
        &self,
        directory: &D,
    ) -> Result<u64, EndorsementError> {
        let members = directory.members();
        self.signers()
            .into_iter()
            .map(|i| {
                members
                    .get(i)
                    .map(|m| m.weight)
                    .ok_or(EndorsementError::UnknownSigner(i))
            })
            .sum()
    }

    /// Whether member `key` is among the signers.
    pub fn includes<D: CommitteeDirectory + ?Sized>(
        &self,
        key: &BlsPublicKey,
        directory: &D,
    ) -> bool {
        directory
            .index_of(key)
            .map(|i| {
                self.signers_bitmap
                    .get(i / 8)
                    .map(|b| b & (1 << (i % 8)) != 0)
                    .unwrap_or(false)
            })
            .unwrap_or(false)
    }

    /// Check that the endorsement covers quorum weight of `directory` and
    /// that the aggregate verifies over `digest`.
    ///
    /// Returns the signed weight.
    pub fn verify<D, C>(
        &self,
        digest: &H256,
        directory: &D,
        crypto: &C,
        threshold: QuorumThreshold,
    ) -> Result<u64, EndorsementError>
    where
        D: CommitteeDirectory + ?Sized,
        C: CryptoProvider + ?Sized,
    {
        let expected = bitmap_len(directory.len());
        if self.signers_bitmap.len() != expected {
            return Err(EndorsementError::BitmapLength {
                expected,
                got: self.signers_bitmap.len(),
            });
        }

        let weight = self.signed_weight(directory)?;
        let total = directory.total_weight();
        if !threshold.is_met(weight, total) {
            return Err(EndorsementError::InsufficientWeight {
                got: weight,
                required: threshold.required_weight(total),
            });
        }

        let members = directory.members();
        let keys: Vec<&BlsPublicKey> = self
            .signers()
            .into_iter()
            .map(|i| &members[i].public_key)
            .collect();
        if !crypto.verify_aggregate(digest.as_bytes(), &self.aggregate_signature, &keys) {
            return Err(EndorsementError::InvalidAggregate);
        }
        Ok(weight)
    }
}

fn bitmap_len(members: usize) -> usize {
    (members + 7) / 8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::committee::{Committee, CommitteeMember};
    use crate::proposal::signing_digest;
    use vigil_crypto::{BlsKeccak, BlsPrivateKey};
    use vigil_types::VcBlockHeader;

    struct Fixture {
        keys: Vec<BlsPrivateKey>,
        committee: Committee,
        crypto: BlsKeccak,
        header: VcBlockHeader,
    }

    fn fixture(n: u8) -> Fixture {
        let keys: Vec<_> = (1..=n)
            .map(|i| BlsPrivateKey::from_seed(&[i; 32]).unwrap())
            .collect();
        let members = keys
            .iter()
            .enumerate()
            .map(|(i, k)| {
                CommitteeMember::new(
                    k.public_key(),
                    format!("10.2.0.{}:5000", i + 1).parse().unwrap(),
                    1,
                )
            })
            .collect();
        let committee = Committee::new(members).unwrap();
        let m = &committee.members()[0];
        let header = VcBlockHeader::new(
            1,
            1,
            0,
            m.address,
            m.public_key.clone(),
            1,
            vec![],
            committee.committee_digest(),
            H256::NIL,
        )
        .unwrap();
        Fixture {
            keys,
            committee,
            crypto: BlsKeccak::new("test"),
            header,
        }
    }

    fn endorse(f: &Fixture, signers: &[usize]) -> ViewChangeEndorsement {
        let proposals: Vec<ViewChangeProposal> = signers
            .iter()
            .map(|i| ViewChangeProposal::sign(f.header.clone(), &f.keys[*i], &f.crypto))
            .collect();
        let refs: Vec<&ViewChangeProposal> = proposals.iter().collect();
        ViewChangeEndorsement::aggregate(&refs, &f.committee, &f.crypto).unwrap()
    }

    #[test]
    fn test_bitmap_roundtrip() {
        let f = fixture(10);
        let e = endorse(&f, &[0, 3, 9]);
        assert_eq!(e.signers_bitmap.len(), 2);
        assert_eq!(e.signers(), vec![0, 3, 9]);
        assert_eq!(e.signer_count(), 3);
        assert!(e.includes(&f.keys[9].public_key(), &f.committee));
        assert!(!e.includes(&f.keys[1].public_key(), &f.committee));
    }

    #[test]
    fn test_verify_quorum() {
        let f = fixture(4);
        let e = endorse(&f, &[0, 1, 2]);
        let weight = e
            .verify(
                &signing_digest(&f.header, &f.crypto),
                &f.committee,
                &f.crypto,
                QuorumThreshold::two_thirds(),
            )
            .unwrap();
        assert_eq!(weight, 3);
    }

    #[test]
    fn test_verify_rejects_low_weight() {
        let f = fixture(5);
        let e = endorse(&f, &[0, 1]);
        assert_eq!(
            e.verify(
                &signing_digest(&f.header, &f.crypto),
                &f.committee,
                &f.crypto,
                QuorumThreshold::two_thirds()
            ),
            Err(EndorsementError::InsufficientWeight {
                got: 2,
                required: 4
            })
        );
    }

    #[test]
    fn test_verify_rejects_wrong_message() {
        let f = fixture(4);
        let e = endorse(&f, &[0, 1, 2, 3]);
        assert_eq!(
            e.verify(
                &H256::keccak256(b"other"),
                &f.committee,
                &f.crypto,
                QuorumThreshold::two_thirds()
            ),
            Err(EndorsementError::InvalidAggregate)
        );
    }

    #[test]
    fn test_verify_rejects_inflated_bitmap() {
        let f = fixture(4);
        let mut e = endorse(&f, &[0, 1]);
        e.signers_bitmap[0] |= 0b1100;
        assert_eq!(
            e.verify(
                &signing_digest(&f.header, &f.crypto),
                &f.committee,
                &f.crypto,
                QuorumThreshold::two_thirds()
            ),
            Err(EndorsementError::InvalidAggregate)
        );
    }

    #[test]
    fn test_unknown_signer_bit() {
        let f = fixture(4);
        let mut e = endorse(&f, &[0, 1, 2]);
        e.signers_bitmap[0] |= 0b1000_0000;
        assert_eq!(
            e.signed_weight(&f.committee),
            Err(EndorsementError::UnknownSigner(7))
        );
    }
}
