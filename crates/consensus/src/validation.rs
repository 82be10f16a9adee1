//! Acceptance checks for view-change headers.
//!
//! [`ViewChangeValidator`] decides whether a header and its endorsement may
//! extend the local chain. It holds no chain state: the caller passes in the
//! current [`ChainTip`] and committee, so one validator can be shared by any
//! number of threads.
//!
//! Checks run in a fixed order and stop at the first failure:
//!
//! 0. the placeholder header is never a chain entry
//! 1. `prev_hash` links to the tip
//! 2. epochs neither regress nor jump ahead, and the ordering key advances
//! 3. `counter == faulty_leaders.len() + 1`
//! 4. the candidate sits on the committee and is not listed as faulty
//! 5. `committee_hash` matches the local committee digest
//! 6. the endorsement verifies over the signing digest with quorum weight

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};
use vigil_crypto::CryptoProvider;
use vigil_types::{ChainHeader, CommitteeHash, HeaderCodec, VcBlockHeader, H256};

use crate::committee::{CommitteeDirectory, QuorumThreshold};
use crate::endorsement::{EndorsementError, ViewChangeEndorsement};
use crate::proposal::signing_digest;
use crate::types::FinalizedViewChange;

/// How far either epoch of a header may run ahead of the tip.
pub const MAX_EPOCH_LOOKAHEAD: u64 = 1;

/// Reasons a view-change header is rejected.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Structurally invalid header
    #[error("malformed header: {0}")]
    MalformedHeader(String),

    /// Header does not link to the local tip
    #[error("chain discontinuity: tip is {expected}, header links to {got}")]
    ChainDiscontinuity {
        /// Local tip hash
        expected: H256,
        /// Header's `prev_hash`
        got: H256,
    },

    /// Header epochs or counter are inconsistent with the tip
    #[error("header {got:?} is stale or ahead of tip {tip:?}")]
    StaleOrFutureHeader {
        /// Tip ordering key
        tip: (u64, u64, u32),
        /// Header ordering key
        got: (u64, u64, u32),
    },

    /// Candidate may not lead
    #[error("invalid candidate {candidate}: {reason}")]
    InvalidCandidate {
        /// Candidate key, abbreviated
        candidate: String,
        /// Why it was refused
        reason: String,
    },

    /// Header was built for another committee
    #[error("committee mismatch: local digest {expected}, header carries {got}")]
    CommitteeMismatch {
        /// Local committee digest
        expected: CommitteeHash,
        /// Digest in the header
        got: CommitteeHash,
    },

    /// Endorsement is missing weight or does not verify
    #[error("insufficient endorsement: {0}")]
    InsufficientEndorsement(EndorsementError),
}

impl From<vigil_types::Error> for ValidationError {
    fn from(e: vigil_types::Error) -> Self {
        ValidationError::MalformedHeader(e.to_string())
    }
}

/// The header new records must link to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChainTip {
    /// Hash of the tip header
    pub hash: H256,
    /// DS epoch of the tip
    pub ds_epoch: u64,
    /// Final-block epoch of the tip
    pub epoch: u64,
    /// View-change counter of the tip, 0 for a primary block
    pub counter: u32,
}

impl ChainTip {
    /// Tip from explicit values.
    pub fn new(hash: H256, ds_epoch: u64, epoch: u64, counter: u32) -> Self {
        Self {
            hash,
            ds_epoch,
            epoch,
            counter,
        }
    }

    /// Tip for a header of either kind.
    pub fn from_header(header: &ChainHeader) -> Self {
        let (ds_epoch, epoch, counter) = header.ordering_key();
        Self::new(header.hash(), ds_epoch, epoch, counter)
    }

    /// `(ds_epoch, epoch, counter)`.
    pub fn ordering_key(&self) -> (u64, u64, u32) {
        (self.ds_epoch, self.epoch, self.counter)
    }
}

impl fmt::Display for ChainTip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Tip({}, ds_epoch={}, epoch={}, counter={})",
            self.hash.short_hex(),
            self.ds_epoch,
            self.epoch,
            self.counter
        )
    }
}

/// Stateless view-change header validator.
pub struct ViewChangeValidator<C> {
    crypto: Arc<C>,
    threshold: QuorumThreshold,
}

impl<C> Clone for ViewChangeValidator<C> {
    fn clone(&self) -> Self {
        Self {
            crypto: Arc::clone(&self.crypto),
            threshold: self.threshold,
        }
    }
}

impl<C: CryptoProvider> ViewChangeValidator<C> {
    /// Create a validator requiring `threshold` of committee weight.
    pub fn new(crypto: Arc<C>, threshold: QuorumThreshold) -> Self {
        Self { crypto, threshold }
    }

    /// Required quorum.
    pub fn threshold(&self) -> QuorumThreshold {
        self.threshold
    }

    /// Run every check against `tip` and `directory`.
    pub fn validate<D: CommitteeDirectory + ?Sized>(
        &self,
        header: &VcBlockHeader,
        endorsement: &ViewChangeEndorsement,
        tip: &ChainTip,
        directory: &D,
    ) -> Result<(), ValidationError> {
        let result = self.check(header, endorsement, tip, directory);
        match &result {
            Ok(()) => debug!(
                ds_epoch = header.ds_epoch_number(),
                epoch = header.view_change_epoch_number(),
                counter = header.view_change_counter(),
                "View-change header valid"
            ),
            Err(e) => warn!(
                ds_epoch = header.ds_epoch_number(),
                epoch = header.view_change_epoch_number(),
                counter = header.view_change_counter(),
                tip = %tip,
                error = %e,
                "View-change header rejected"
            ),
        }
        result
    }

    /// Validate a finalized record.
    pub fn validate_record<D: CommitteeDirectory + ?Sized>(
        &self,
        record: &FinalizedViewChange,
        tip: &ChainTip,
        directory: &D,
    ) -> Result<(), ValidationError> {
        self.validate(&record.header, &record.endorsement, tip, directory)
    }

    /// Validate and return the tip the header establishes.
    pub fn accept<D: CommitteeDirectory + ?Sized>(
        &self,
        header: &VcBlockHeader,
        endorsement: &ViewChangeEndorsement,
        tip: &ChainTip,
        directory: &D,
    ) -> Result<ChainTip, ValidationError> {
        self.validate(header, endorsement, tip, directory)?;
        let (ds_epoch, epoch, counter) = header.ordering_key();
        Ok(ChainTip::new(header.compute_hash(), ds_epoch, epoch, counter))
    }

    /// Decode `bytes` and validate the result.
    pub fn decode_and_validate<D: CommitteeDirectory + ?Sized>(
        &self,
        bytes: &[u8],
        endorsement: &ViewChangeEndorsement,
        tip: &ChainTip,
        directory: &D,
    ) -> Result<VcBlockHeader, ValidationError> {
        let header = VcBlockHeader::deserialize(bytes, 0)?;
        self.validate(&header, endorsement, tip, directory)?;
        Ok(header)
    }

    fn check<D: CommitteeDirectory + ?Sized>(
        &self,
        header: &VcBlockHeader,
        endorsement: &ViewChangeEndorsement,
        tip: &ChainTip,
        directory: &D,
    ) -> Result<(), ValidationError> {
        if header.is_placeholder() {
            return Err(ValidationError::MalformedHeader(
                "placeholder header is not a chain entry".into(),
            ));
        }

        if header.prev_hash() != tip.hash {
            return Err(ValidationError::ChainDiscontinuity {
                expected: tip.hash,
                got: header.prev_hash(),
            });
        }

        check_ordering(header, tip)?;

        if !header.counter_matches_faulty() {
            return Err(ValidationError::MalformedHeader(format!(
                "counter {} with {} faulty leaders",
                header.view_change_counter(),
                header.faulty_leaders().len()
            )));
        }

        let candidate = header.candidate_leader_key();
        match directory.member(candidate) {
            None => {
                return Err(ValidationError::InvalidCandidate {
                    candidate: candidate.short_hex(),
                    reason: "not a committee member".into(),
                })
            }
            Some(member) if &member.address != header.candidate_leader_address() => {
                return Err(ValidationError::InvalidCandidate {
                    candidate: candidate.short_hex(),
                    reason: format!(
                        "address {} does not match committee entry {}",
                        header.candidate_leader_address(),
                        member.address
                    ),
                })
            }
            Some(_) => {}
        }
        if header.candidate_is_faulty() {
            return Err(ValidationError::InvalidCandidate {
                candidate: candidate.short_hex(),
                reason: "listed among faulty leaders".into(),
            });
        }

        let local = directory.committee_digest();
        if header.committee_hash() != local {
            return Err(ValidationError::CommitteeMismatch {
                expected: local,
                got: header.committee_hash(),
            });
        }

        endorsement
            .verify(
                &signing_digest(header, self.crypto.as_ref()),
                directory,
                self.crypto.as_ref(),
                self.threshold,
            )
            .map_err(ValidationError::InsufficientEndorsement)?;
        Ok(())
    }
}

fn check_ordering(header: &VcBlockHeader, tip: &ChainTip) -> Result<(), ValidationError> {
    let got = header.ordering_key();
    let stale = || ValidationError::StaleOrFutureHeader {
        tip: tip.ordering_key(),
        got,
    };

    let (ds_epoch, epoch, _) = got;
    if ds_epoch < tip.ds_epoch || epoch < tip.epoch {
        return Err(stale());
    }
    if ds_epoch - tip.ds_epoch > MAX_EPOCH_LOOKAHEAD || epoch - tip.epoch > MAX_EPOCH_LOOKAHEAD {
        return Err(stale());
    }
    if got <= tip.ordering_key() {
        return Err(stale());
    }
    Ok(())
}
