//! The in-flight view-change round.
//!
//! A [`ViewChangeRound`] owns the faulty-leader list and therefore the
//! counter for one [`RoundContext`]. The list is append-only; when the
//! context changes the coordinator drops the round and builds a new one.

use tracing::debug;
use vigil_crypto::BlsPublicKey;
use vigil_types::{BlockHash, CommitteeHash, FaultyLeader, VcBlockHeader};

use crate::committee::{CommitteeDirectory, CommitteeMember};
use crate::rotation::{select_candidate, RotationSeed};
use crate::types::RoundContext;

/// Faulty-leader accumulation for one context.
#[derive(Debug, Clone)]
pub struct ViewChangeRound {
    context: RoundContext,
    stalled_leader: BlsPublicKey,
    faulty: Vec<FaultyLeader>,
    candidate: Option<CommitteeMember>,
}

impl ViewChangeRound {
    /// Open a round because `stalled_leader` stopped making progress.
    pub fn new(context: RoundContext, stalled_leader: BlsPublicKey) -> Self {
        Self {
            context,
            stalled_leader,
            faulty: Vec::new(),
            candidate: None,
        }
    }

    /// Context this round is bound to.
    pub fn context(&self) -> RoundContext {
        self.context
    }

    /// The leader whose failure opened the round.
    pub fn stalled_leader(&self) -> &BlsPublicKey {
        &self.stalled_leader
    }

    /// Current attempt number.
    pub fn counter(&self) -> u32 {
        self.faulty.len() as u32 + 1
    }

    /// Failed candidates in attempt order.
    pub fn faulty_leaders(&self) -> &[FaultyLeader] {
        &self.faulty
    }

    /// The candidate of the current attempt, once nominated.
    pub fn candidate(&self) -> Option<&CommitteeMember> {
        self.candidate.as_ref()
    }

    /// Whether `key` may not be nominated in this round.
    pub fn is_excluded(&self, key: &BlsPublicKey) -> bool {
        key == &self.stalled_leader || self.faulty.iter().any(|f| &f.public_key == key)
    }

    /// Pick the candidate for the current counter.
    ///
    /// Returns `None` when every member is excluded.
    pub fn nominate<D: CommitteeDirectory + ?Sized>(
        &mut self,
        directory: &D,
    ) -> Option<&CommitteeMember> {
        let seed = RotationSeed::new(
            self.context.ds_epoch,
            self.context.view_change_epoch,
            self.counter(),
        );
        let member = select_candidate(directory, seed, |k| self.is_excluded(k))?.clone();
        debug!(
            context = %self.context,
            counter = self.counter(),
            candidate = %member.public_key.short_hex(),
            "Candidate nominated"
        );
        self.candidate = Some(member);
        self.candidate.as_ref()
    }

    /// Record the current candidate as faulty and advance the counter.
    pub fn fail_candidate(&mut self) -> Option<FaultyLeader> {
        let member = self.candidate.take()?;
        let leader = FaultyLeader::new(member.public_key, member.address);
        self.faulty.push(leader.clone());
        Some(leader)
    }

    /// Record a leader that failed after it had been agreed on.
    ///
    /// No-op if the leader is already excluded.
    pub fn fail_leader(&mut self, leader: FaultyLeader) -> bool {
        if self.is_excluded(&leader.public_key) {
            return false;
        }
        self.candidate = None;
        self.faulty.push(leader);
        true
    }

    /// Adopt the faulty list of a header agreed in this context.
    ///
    /// Used when the committee finalized an attempt this node had not reached
    /// yet; the agreed history replaces the local one.
    pub fn adopt(&mut self, header: &VcBlockHeader) {
        self.faulty = header.faulty_leaders().to_vec();
        self.candidate = None;
    }

    /// Build the header for the current candidate.
    pub fn build_header(
        &self,
        committee_hash: CommitteeHash,
        prev_hash: BlockHash,
    ) -> Option<vigil_types::Result<VcBlockHeader>> {
        let candidate = self.candidate.as_ref()?;
        Some(VcBlockHeader::new(
            self.context.ds_epoch,
            self.context.view_change_epoch,
            self.context.state,
            candidate.address,
            candidate.public_key.clone(),
            self.counter(),
            self.faulty.clone(),
            committee_hash,
            prev_hash,
        ))
    }
}
