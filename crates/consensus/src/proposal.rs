//! Signed view-change proposals and quorum detection.
//!
//! This module handles:
//! - Signing a proposed [`VcBlockHeader`] over its provider digest
//! - Collecting proposals from committee members for one `(context, counter)`
//! - Grouping them by header hash and tracking the weight behind each
//! - Detecting agreement: quorum weight that includes the candidate itself

use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, trace, warn};
use vigil_crypto::{BlsPrivateKey, BlsPublicKey, BlsSignature, CryptoProvider};
use vigil_types::{HeaderCodec, VcBlockHeader, H256};

use crate::committee::{CommitteeDirectory, QuorumThreshold};
use crate::types::RoundContext;

/// Error types for proposal handling
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ProposalError {
    /// Proposal belongs to another round context or chain tip
    #[error("proposal for {got} does not match current context {expected}")]
    ContextMismatch {
        /// Context being collected
        expected: RoundContext,
        /// Context of the proposal
        got: RoundContext,
    },

    /// Proposal links to a different chain tip
    #[error("proposal links to {got}, current tip is {expected}")]
    TipMismatch {
        /// Tip hash this node links to
        expected: H256,
        /// Tip hash in the proposal
        got: H256,
    },

    /// Counter does not match the set
    #[error("proposal counter {got} does not match set counter {expected}")]
    WrongCounter {
        /// Counter being collected
        expected: u32,
        /// Counter of the proposal
        got: u32,
    },

    /// Header violates a structural invariant
    #[error("malformed proposal: {0}")]
    Malformed(String),

    /// Proposer does not hold a committee seat
    #[error("proposer {0} is not a committee member")]
    NotCommitteeMember(String),

    /// Signature does not verify
    #[error("invalid signature from {0}")]
    InvalidSignature(String),

    /// Same proposer already sent this proposal
    #[error("duplicate proposal from {0}")]
    DuplicateProposal(String),

    /// Same proposer sent two different headers for one counter
    #[error("equivocation by {proposer} at counter {counter}")]
    Equivocation {
        /// Offending proposer
        proposer: String,
        /// Counter both proposals were for
        counter: u32,
    },
}

/// A committee member's signed vote for a view-change header.
#[derive(Debug, Clone, Serialize)]
pub struct ViewChangeProposal {
    /// Header the proposer wants finalized
    pub header: VcBlockHeader,
    /// Who signed
    pub proposer: BlsPublicKey,
    /// Signature over the header's signing digest under the view-change domain
    pub signature: BlsSignature,
}

/// The message proposals and endorsements sign: the provider's digest of the
/// header's canonical encoding.
///
/// Chain linkage keeps using [`HeaderCodec::compute_hash`]; only signatures go
/// through the provider. With [`vigil_crypto::BlsKeccak`] the two agree.
pub fn signing_digest<C: CryptoProvider + ?Sized>(header: &VcBlockHeader, crypto: &C) -> H256 {
    H256::new(crypto.hash(&HeaderCodec::serialize(header)))
}

impl ViewChangeProposal {
    /// Sign `header` with `key`.
    pub fn sign<C: CryptoProvider + ?Sized>(
        header: VcBlockHeader,
        key: &BlsPrivateKey,
        crypto: &C,
    ) -> Self {
        let digest = signing_digest(&header, crypto);
        let signature = crypto.sign(digest.as_bytes(), key);
        Self {
            header,
            proposer: key.public_key(),
            signature,
        }
    }

    /// Hash of the proposed header.
    pub fn header_hash(&self) -> H256 {
        self.header.compute_hash()
    }

    /// Check the signature.
    pub fn verify<C: CryptoProvider + ?Sized>(&self, crypto: &C) -> bool {
        crypto.verify(
            signing_digest(&self.header, crypto).as_bytes(),
            &self.signature,
            &self.proposer,
        )
    }

    /// Counter of the proposed header.
    pub fn counter(&self) -> u32 {
        self.header.view_change_counter()
    }

    /// Context of the proposed header.
    pub fn context(&self) -> RoundContext {
        RoundContext::of_header(&self.header)
    }
}

/// Proposals for one `(context, counter)`.
#[derive(Debug, Clone)]
pub struct ProposalSet {
    context: RoundContext,
    counter: u32,
    threshold: QuorumThreshold,
    /// Proposals indexed by proposer
    proposals: HashMap<BlsPublicKey, ViewChangeProposal>,
    /// Proposers grouped by header hash
    by_hash: HashMap<H256, Vec<BlsPublicKey>>,
    /// Weight behind each header hash
    weight_by_hash: HashMap<H256, u64>,
    /// Weight of everyone who proposed anything
    total_weight: u64,
}

impl ProposalSet {
    /// Create an empty set.
    pub fn new(context: RoundContext, counter: u32, threshold: QuorumThreshold) -> Self {
        Self {
            context,
            counter,
            threshold,
            proposals: HashMap::new(),
            by_hash: HashMap::new(),
            weight_by_hash: HashMap::new(),
            total_weight: 0,
        }
    }

    /// Context being collected.
    pub fn context(&self) -> RoundContext {
        self.context
    }

    /// Counter being collected.
    pub fn counter(&self) -> u32 {
        self.counter
    }

    /// Add a proposal after checking it.
    ///
    /// Returns `Ok(Some(hash))` if the header with `hash` now has agreement,
    /// `Ok(None)` if the proposal was added without reaching it.
    pub fn add<D, C>(
        &mut self,
        proposal: ViewChangeProposal,
        directory: &D,
        crypto: &C,
    ) -> Result<Option<H256>, ProposalError>
    where
        D: CommitteeDirectory + ?Sized,
        C: CryptoProvider + ?Sized,
    {
        let got = proposal.context();
        if got != self.context {
            return Err(ProposalError::ContextMismatch {
                expected: self.context,
                got,
            });
        }
        if proposal.counter() != self.counter {
            return Err(ProposalError::WrongCounter {
                expected: self.counter,
                got: proposal.counter(),
            });
        }

        let header = &proposal.header;
        if !header.counter_matches_faulty() {
            return Err(ProposalError::Malformed(format!(
                "counter {} with {} faulty leaders",
                header.view_change_counter(),
                header.faulty_leaders().len()
            )));
        }
        if header.candidate_is_faulty() {
            return Err(ProposalError::Malformed(
                "candidate listed as faulty".to_string(),
            ));
        }
        if !directory.is_member(header.candidate_leader_key()) {
            return Err(ProposalError::Malformed(format!(
                "candidate {} is not a committee member",
                header.candidate_leader_key().short_hex()
            )));
        }

        let proposer = proposal.proposer.clone();
        let weight = directory.weight_of(&proposer);
        if weight == 0 {
            return Err(ProposalError::NotCommitteeMember(proposer.short_hex()));
        }

        let hash = proposal.header_hash();
        if let Some(existing) = self.proposals.get(&proposer) {
            if existing.header_hash() == hash {
                return Err(ProposalError::DuplicateProposal(proposer.short_hex()));
            }
            warn!(
                proposer = %proposer.short_hex(),
                counter = self.counter,
                "Conflicting view-change proposals"
            );
            return Err(ProposalError::Equivocation {
                proposer: proposer.short_hex(),
                counter: self.counter,
            });
        }

        if !proposal.verify(crypto) {
            warn!(proposer = %proposer.short_hex(), "Invalid proposal signature");
            return Err(ProposalError::InvalidSignature(proposer.short_hex()));
        }

        trace!(
            context = %self.context,
            counter = self.counter,
            proposer = %proposer.short_hex(),
            header_hash = %hash.short_hex(),
            weight = weight,
            "Adding proposal"
        );

        self.proposals.insert(proposer.clone(), proposal);
        self.by_hash.entry(hash).or_default().push(proposer);
        *self.weight_by_hash.entry(hash).or_default() += weight;
        self.total_weight += weight;

        if self.has_agreement_for(&hash, directory) {
            debug!(
                context = %self.context,
                counter = self.counter,
                header_hash = %hash.short_hex(),
                weight = self.weight_for(&hash),
                "Agreement reached"
            );
            Ok(Some(hash))
        } else {
            Ok(None)
        }
    }

    /// Weight behind `hash`.
    pub fn weight_for(&self, hash: &H256) -> u64 {
        self.weight_by_hash.get(hash).copied().unwrap_or(0)
    }

    /// Weight of every member that proposed anything.
    pub fn observed_weight(&self) -> u64 {
        self.total_weight
    }

    /// Quorum weight behind `hash`, with the candidate among its signers.
    ///
    /// A candidate that signed a different header does not acknowledge this one.
    pub fn has_agreement_for<D: CommitteeDirectory + ?Sized>(
        &self,
        hash: &H256,
        directory: &D,
    ) -> bool {
        if !self
            .threshold
            .is_met(self.weight_for(hash), directory.total_weight())
        {
            return false;
        }
        let Some(header) = self.header_for(hash) else {
            return false;
        };
        self.by_hash
            .get(hash)
            .map_or(false, |signers| signers.contains(header.candidate_leader_key()))
    }

    /// Any header hash with agreement.
    pub fn agreed_hash<D: CommitteeDirectory + ?Sized>(&self, directory: &D) -> Option<H256> {
        self.by_hash
            .keys()
            .find(|h| self.has_agreement_for(h, directory))
            .copied()
    }

    /// The header proposed under `hash`.
    pub fn header_for(&self, hash: &H256) -> Option<&VcBlockHeader> {
        let proposer = self.by_hash.get(hash)?.first()?;
        self.proposals.get(proposer).map(|p| &p.header)
    }

    /// Proposals for `hash`, in committee member order.
    pub fn proposals_for<D: CommitteeDirectory + ?Sized>(
        &self,
        hash: &H256,
        directory: &D,
    ) -> Vec<&ViewChangeProposal> {
        let mut out: Vec<&ViewChangeProposal> = self
            .by_hash
            .get(hash)
            .map(|keys| keys.iter().filter_map(|k| self.proposals.get(k)).collect())
            .unwrap_or_default();
        out.sort_by_key(|p| directory.index_of(&p.proposer));
        out
    }

    /// Whether `key` has proposed in this set.
    pub fn has_proposed(&self, key: &BlsPublicKey) -> bool {
        self.proposals.contains_key(key)
    }

    /// Number of proposals held.
    pub fn len(&self) -> usize {
        self.proposals.len()
    }

    /// Whether no proposals are held.
    pub fn is_empty(&self) -> bool {
        self.proposals.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::committee::{Committee, CommitteeMember};
    use vigil_crypto::BlsKeccak;

    fn keys(n: u8) -> Vec<BlsPrivateKey> {
        (1..=n)
            .map(|i| BlsPrivateKey::from_seed(&[i; 32]).unwrap())
            .collect()
    }

    fn committee(keys: &[BlsPrivateKey]) -> Committee {
        let members = keys
            .iter()
            .enumerate()
            .map(|(i, k)| {
                CommitteeMember::new(
                    k.public_key(),
                    format!("10.0.0.{}:5000", i + 1).parse().unwrap(),
                    1,
                )
            })
            .collect();
        Committee::new(members).unwrap()
    }

    fn header(committee: &Committee, candidate: usize) -> VcBlockHeader {
        let member = &committee.members()[candidate];
        VcBlockHeader::new(
            1,
            10,
            0,
            member.address,
            member.public_key.clone(),
            1,
            vec![],
            committee.committee_digest(),
            H256::keccak256(b"tip"),
        )
        .unwrap()
    }

    fn set() -> ProposalSet {
        ProposalSet::new(RoundContext::new(1, 10, 0), 1, QuorumThreshold::two_thirds())
    }

    #[test]
    fn test_sign_and_verify() {
        let keys = keys(1);
        let committee = committee(&keys);
        let crypto = BlsKeccak::new("test");
        let proposal = ViewChangeProposal::sign(header(&committee, 0), &keys[0], &crypto);
        assert!(proposal.verify(&crypto));
        assert!(!proposal.verify(&BlsKeccak::new("other")));
    }

    #[test]
    fn test_agreement_needs_quorum_and_candidate() {
        let keys = keys(4);
        let committee = committee(&keys);
        let crypto = BlsKeccak::new("test");
        let h = header(&committee, 3);
        let mut set = set();

        for key in &keys[..3] {
            let p = ViewChangeProposal::sign(h.clone(), key, &crypto);
            assert_eq!(set.add(p, &committee, &crypto).unwrap(), None);
        }
        // three of four is quorum weight, but the candidate has not signed
        assert_eq!(set.weight_for(&h.compute_hash()), 3);
        assert!(set.agreed_hash(&committee).is_none());

        let p = ViewChangeProposal::sign(h.clone(), &keys[3], &crypto);
        assert_eq!(
            set.add(p, &committee, &crypto).unwrap(),
            Some(h.compute_hash())
        );
        assert_eq!(set.proposals_for(&h.compute_hash(), &committee).len(), 4);
    }

    #[test]
    fn test_candidate_must_sign_the_agreed_header() {
        let keys = keys(4);
        let committee = committee(&keys);
        let crypto = BlsKeccak::new("test");
        let h = header(&committee, 3);
        let member = &committee.members()[3];
        let rival = VcBlockHeader::new(
            1,
            10,
            0,
            member.address,
            member.public_key.clone(),
            1,
            vec![],
            committee.committee_digest(),
            H256::keccak256(b"other tip"),
        )
        .unwrap();
        assert_ne!(rival.compute_hash(), h.compute_hash());
        let mut set = set();

        let p = ViewChangeProposal::sign(rival.clone(), &keys[3], &crypto);
        assert_eq!(set.add(p, &committee, &crypto).unwrap(), None);
        for key in &keys[..3] {
            let p = ViewChangeProposal::sign(h.clone(), key, &crypto);
            assert_eq!(set.add(p, &committee, &crypto).unwrap(), None);
        }

        assert_eq!(set.weight_for(&h.compute_hash()), 3);
        assert!(set.has_proposed(&member.public_key));
        assert!(!set.has_agreement_for(&h.compute_hash(), &committee));
        assert!(set.agreed_hash(&committee).is_none());
    }

    #[test]
    fn test_duplicate_and_equivocation() {
        let keys = keys(4);
        let committee = committee(&keys);
        let crypto = BlsKeccak::new("test");
        let mut set = set();

        let p = ViewChangeProposal::sign(header(&committee, 1), &keys[0], &crypto);
        set.add(p.clone(), &committee, &crypto).unwrap();
        assert!(matches!(
            set.add(p, &committee, &crypto),
            Err(ProposalError::DuplicateProposal(_))
        ));

        let other = ViewChangeProposal::sign(header(&committee, 2), &keys[0], &crypto);
        assert!(matches!(
            set.add(other, &committee, &crypto),
            Err(ProposalError::Equivocation { counter: 1, .. })
        ));
    }

    #[test]
    fn test_rejects_outsider_and_bad_signature() {
        let keys = keys(4);
        let committee = committee(&keys);
        let crypto = BlsKeccak::new("test");
        let mut set = set();

        let outsider = BlsPrivateKey::from_seed(&[99u8; 32]).unwrap();
        let p = ViewChangeProposal::sign(header(&committee, 1), &outsider, &crypto);
        assert!(matches!(
            set.add(p, &committee, &crypto),
            Err(ProposalError::NotCommitteeMember(_))
        ));

        let mut forged = ViewChangeProposal::sign(header(&committee, 1), &keys[0], &crypto);
        forged.proposer = keys[1].public_key();
        assert!(matches!(
            set.add(forged, &committee, &crypto),
            Err(ProposalError::InvalidSignature(_))
        ));
        assert!(set.is_empty());
    }

    #[test]
    fn test_rejects_other_context() {
        let keys = keys(4);
        let committee = committee(&keys);
        let crypto = BlsKeccak::new("test");
        let mut set = ProposalSet::new(RoundContext::new(1, 11, 0), 1, QuorumThreshold::two_thirds());

        let p = ViewChangeProposal::sign(header(&committee, 1), &keys[0], &crypto);
        assert!(matches!(
            set.add(p, &committee, &crypto),
            Err(ProposalError::ContextMismatch { .. })
        ));
    }
}
