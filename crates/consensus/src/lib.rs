//! # Vigil Consensus
//!
//! View-change coordination for a leader-based committee.
//!
//! When the leader of the primary consensus round stops making progress, the
//! committee replaces it without waiting for the next epoch rotation. Every
//! member runs a [`ViewChangeCoordinator`]; agreement is reached only through
//! signed proposals, and the outcome is a [`VcBlockHeader`] endorsed by an
//! aggregate BLS signature of a committee quorum.
//!
//! ## Features
//!
//! - **Deterministic rotation** seeded by `(ds_epoch, epoch, counter)`, never
//!   nominating a leader already marked faulty in the round
//! - **Quorum agreement** on the exact header bytes, including the candidate's
//!   own proposal
//! - **Backoff timeouts** that grow with the view-change counter
//! - **Stateless validation** of headers against the chain tip and committee
//! - **Append-only ledger** of accepted view changes
//!
//! ## View-Change Flow
//!
//! ```text
//! Context (ds_epoch, epoch, state), counter k:
//!
//! ┌──────────────┐
//! │  MONITORING  │  liveness timer runs while the primary round is idle
//! └──────┬───────┘
//!        │ timer fires
//!        ▼
//! ┌──────────────┐
//! │  SUSPECTING  │  candidate = rotation(seed(ds, epoch, k)) \ faulty
//! └──────┬───────┘
//!        ▼
//! ┌──────────────┐
//! │  NOMINATING  │  broadcast Proposal{header(k, faulty), sig(hash)}
//! └──────┬───────┘
//!        ▼
//! ┌────────────────────┐  timeout: faulty += candidate, k += 1
//! │ AWAITING AGREEMENT │──────────────────────────────────► SUSPECTING
//! └──────┬─────────────┘
//!        │ quorum for one hash, candidate included
//!        ▼
//! ┌──────────────┐
//! │  FINALIZED   │  endorsement = aggregate(signatures)
//! └──────────────┘  back to MONITORING under the new leader
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use vigil_consensus::{Committee, CoordinatorConfig, ViewChangeCoordinator};
//! use vigil_crypto::{BlsKeccak, BlsPrivateKey};
//!
//! let coordinator = ViewChangeCoordinator::new(
//!     key,
//!     Arc::new(committee),
//!     Arc::new(BlsKeccak::new("vigil-local")),
//!     CoordinatorConfig::default(),
//! );
//! let actions = coordinator.start(monitor_context)?;
//! ```
//!
//! [`VcBlockHeader`]: vigil_types::VcBlockHeader

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod committee;
pub mod coordinator;
pub mod endorsement;
pub mod engine;
pub mod ledger;
pub mod proposal;
pub mod rotation;
pub mod round;
pub mod timeout;
pub mod types;
pub mod validation;

// Re-export main types at crate root for convenience
pub use committee::{Committee, CommitteeDirectory, CommitteeError, CommitteeMember, QuorumThreshold};
pub use coordinator::{
    CoordinatorAction, CoordinatorConfig, CoordinatorError, CoordinatorEvent, CoordinatorPhase,
    CoordinatorResult, CoordinatorSnapshot, ViewChangeCoordinator,
};
pub use endorsement::{EndorsementError, ViewChangeEndorsement};
pub use engine::{EngineError, EngineInputs, FinalizedSink, ViewChangeEngine};
pub use ledger::{LedgerError, ViewChangeLedger};
pub use proposal::{signing_digest, ProposalError, ProposalSet, ViewChangeProposal};
pub use rotation::{rotation_order, select_candidate, RotationSeed};
pub use round::ViewChangeRound;
pub use timeout::{BackoffMode, TimeoutConfig, TimeoutInfo, TimeoutKind, TimeoutScheduler};
pub use types::{FinalizedViewChange, LivenessStall, MonitorContext, RoundContext, StallReason};
pub use validation::{ChainTip, ValidationError, ViewChangeValidator, MAX_EPOCH_LOOKAHEAD};
