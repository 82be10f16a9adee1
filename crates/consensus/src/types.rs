//! Shared value types for view-change coordination.
//!
//! - [`RoundContext`] - the `(ds_epoch, epoch, state)` key a round is bound to
//! - [`MonitorContext`] - what the primary consensus is currently doing
//! - [`FinalizedViewChange`] - an agreed header with its aggregate endorsement
//! - [`LivenessStall`] - the operator-visible "cannot make progress" report

use serde::{Deserialize, Serialize};
use std::fmt;
use vigil_crypto::BlsPublicKey;
use vigil_types::{BlockHash, HeaderCodec, VcBlockHeader, H256};

use crate::endorsement::ViewChangeEndorsement;

/// The context a view-change round belongs to.
///
/// A new context starts a new round with counter 1; the same context
/// continues the existing round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RoundContext {
    /// DS epoch
    pub ds_epoch: u64,
    /// Final-block epoch
    pub view_change_epoch: u64,
    /// Consensus phase tag the leader failed in
    pub state: u8,
}

impl RoundContext {
    /// Create a context.
    pub fn new(ds_epoch: u64, view_change_epoch: u64, state: u8) -> Self {
        Self {
            ds_epoch,
            view_change_epoch,
            state,
        }
    }

    /// The context a header was produced in.
    pub fn of_header(header: &VcBlockHeader) -> Self {
        Self::new(
            header.ds_epoch_number(),
            header.view_change_epoch_number(),
            header.view_change_state(),
        )
    }
}

impl fmt::Display for RoundContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(ds_epoch={}, epoch={}, state={})",
            self.ds_epoch, self.view_change_epoch, self.state
        )
    }
}

/// Snapshot of the primary consensus a coordinator is watching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorContext {
    /// DS epoch in progress
    pub ds_epoch: u64,
    /// Final-block epoch in progress
    pub view_change_epoch: u64,
    /// Phase of the primary round
    pub state: u8,
    /// Leader expected to drive the primary round
    pub leader: BlsPublicKey,
    /// Hash of the current chain tip
    pub prev_hash: BlockHash,
}

impl MonitorContext {
    /// Create a monitor context.
    pub fn new(
        ds_epoch: u64,
        view_change_epoch: u64,
        state: u8,
        leader: BlsPublicKey,
        prev_hash: BlockHash,
    ) -> Self {
        Self {
            ds_epoch,
            view_change_epoch,
            state,
            leader,
            prev_hash,
        }
    }

    /// The round key of this context.
    pub fn round_context(&self) -> RoundContext {
        RoundContext::new(self.ds_epoch, self.view_change_epoch, self.state)
    }
}

/// A view-change header the committee agreed on, with the proof.
#[derive(Debug, Clone, Serialize)]
pub struct FinalizedViewChange {
    /// The agreed header
    pub header: VcBlockHeader,
    /// Aggregate signature of the agreeing members over the header hash
    pub endorsement: ViewChangeEndorsement,
}

impl FinalizedViewChange {
    /// Pair a header with its endorsement.
    pub fn new(header: VcBlockHeader, endorsement: ViewChangeEndorsement) -> Self {
        Self {
            header,
            endorsement,
        }
    }

    /// Hash of the header.
    pub fn hash(&self) -> H256 {
        self.header.compute_hash()
    }
}

/// Why a coordinator reports that it cannot make progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StallReason {
    /// Fewer members than a quorum took part in an attempt
    InsufficientWeight {
        /// Weight of distinct members seen proposing
        observed: u64,
        /// Weight a quorum needs
        required: u64,
    },
    /// Every member was excluded before agreement
    RotationExhausted {
        /// Attempts made in the round
        attempts: u32,
    },
}

/// Operator-visible report that view change is not converging.
///
/// The coordinator keeps retrying after emitting one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LivenessStall {
    /// Round the stall happened in
    pub context: RoundContext,
    /// Attempt that stalled
    pub counter: u32,
    /// What went wrong
    pub reason: StallReason,
}

impl fmt::Display for LivenessStall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            StallReason::InsufficientWeight { observed, required } => write!(
                f,
                "liveness stall in {} at counter {}: observed weight {} below quorum {}",
                self.context, self.counter, observed, required
            ),
            StallReason::RotationExhausted { attempts } => write!(
                f,
                "liveness stall in {}: rotation exhausted after {} attempts",
                self.context, attempts
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_crypto::BlsPrivateKey;

    #[test]
    fn test_monitor_round_context() {
        let leader = BlsPrivateKey::from_seed(&[1u8; 32]).unwrap().public_key();
        let ctx = MonitorContext::new(2, 20, 5, leader, H256::NIL);
        assert_eq!(ctx.round_context(), RoundContext::new(2, 20, 5));
    }

    #[test]
    fn test_stall_display() {
        let stall = LivenessStall {
            context: RoundContext::new(1, 2, 3),
            counter: 4,
            reason: StallReason::InsufficientWeight {
                observed: 1,
                required: 3,
            },
        };
        assert_eq!(
            stall.to_string(),
            "liveness stall in (ds_epoch=1, epoch=2, state=3) at counter 4: observed weight 1 below quorum 3"
        );
    }
}
