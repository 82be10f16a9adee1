//! View-Change Coordinator
//!
//! The state machine each committee member runs locally to replace a leader
//! that stopped making progress.
//!
//! # State Machine Diagram
//!
//! ```text
//! ┌─────────────┐   primary progress
//! │ Monitoring  │◄────────────────────────────────────────┐
//! └─────┬───────┘                                         │
//!       │ liveness timeout                                │
//!       ▼                                                 │
//! ┌─────────────┐                                         │
//! │ Suspecting  │◄──────────────────────┐                 │
//! └─────┬───────┘                       │                 │
//!       │ candidate chosen by rotation  │                 │
//!       ▼                               │ agreement       │
//! ┌─────────────┐                       │ timeout:        │
//! │ Nominating  │  broadcast proposal   │ candidate       │
//! └─────┬───────┘                       │ becomes faulty, │
//!       ▼                               │ counter + 1     │
//! ┌───────────────────┐                 │                 │
//! │ AwaitingAgreement │─────────────────┘                 │
//! └─────┬─────────────┘                                   │
//!       │ quorum of matching proposals incl. candidate    │
//!       ▼                                                 │
//! ┌─────────────┐                                         │
//! │  Finalized  │─────────────────────────────────────────┘
//! └─────────────┘  header + endorsement handed off
//! ```
//!
//! `Failed` is entered only through [`CoordinatorEvent::Shutdown`].
//!
//! The coordinator is synchronous and performs no I/O. Every event returns
//! the [`CoordinatorAction`]s the caller must carry out: broadcasts, timers,
//! finalized records and stall reports. The async engine owns one coordinator
//! behind a mutex so that transitions are serialized.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, error, info, trace, warn};
use vigil_crypto::{BlsPrivateKey, BlsPublicKey, CryptoProvider};
use vigil_types::{FaultyLeader, H256};

use crate::committee::{CommitteeDirectory, QuorumThreshold};
use crate::endorsement::{EndorsementError, ViewChangeEndorsement};
use crate::proposal::{ProposalError, ProposalSet, ViewChangeProposal};
use crate::round::ViewChangeRound;
use crate::timeout::{TimeoutConfig, TimeoutInfo, TimeoutKind};
use crate::types::{FinalizedViewChange, LivenessStall, MonitorContext, RoundContext, StallReason};

/// Errors surfaced by the coordinator
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// Event after shutdown
    #[error("coordinator has shut down")]
    ShutDown,

    /// Event that needs a monitored context before one was supplied
    #[error("coordinator has not been started")]
    NotStarted,

    /// Internal phase change not allowed
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition {
        /// Source phase
        from: CoordinatorPhase,
        /// Target phase
        to: CoordinatorPhase,
    },

    /// Rejected proposal
    #[error("proposal rejected: {0}")]
    Proposal(#[from] ProposalError),

    /// Could not aggregate the agreeing signatures
    #[error("endorsement failed: {0}")]
    Endorsement(#[from] EndorsementError),

    /// Could not build the proposed header
    #[error("header construction failed: {0}")]
    Header(#[from] vigil_types::Error),
}

/// Result type for coordinator operations
pub type CoordinatorResult<T> = Result<T, CoordinatorError>;

/// Phase of the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CoordinatorPhase {
    /// Watching the primary round and the liveness timer
    #[default]
    Monitoring,
    /// Leader judged unresponsive, choosing a candidate
    Suspecting,
    /// Signing and broadcasting the proposal
    Nominating,
    /// Collecting proposals until quorum or timeout
    AwaitingAgreement,
    /// Header agreed and handed off
    Finalized,
    /// Shut down
    Failed,
}

impl CoordinatorPhase {
    /// Returns true if this phase can transition to `target`
    #[must_use]
    pub fn can_transition_to(&self, target: CoordinatorPhase) -> bool {
        use CoordinatorPhase::*;
        matches!(
            (self, target),
            (Monitoring, Monitoring | Suspecting | Finalized | Failed)
                | (Suspecting, Nominating | Monitoring | Finalized | Failed)
                | (Nominating, AwaitingAgreement | Monitoring | Failed)
                | (AwaitingAgreement, Suspecting | Finalized | Monitoring | Failed)
                | (Finalized, Monitoring | Failed)
        )
    }
}

impl fmt::Display for CoordinatorPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoordinatorPhase::Monitoring => write!(f, "Monitoring"),
            CoordinatorPhase::Suspecting => write!(f, "Suspecting"),
            CoordinatorPhase::Nominating => write!(f, "Nominating"),
            CoordinatorPhase::AwaitingAgreement => write!(f, "AwaitingAgreement"),
            CoordinatorPhase::Finalized => write!(f, "Finalized"),
            CoordinatorPhase::Failed => write!(f, "Failed"),
        }
    }
}

/// Inputs to the coordinator.
#[derive(Debug, Clone)]
pub enum CoordinatorEvent {
    /// The primary round made progress, or the coordinator is being started
    PrimaryProgress(MonitorContext),
    /// A scheduled timer expired
    Timeout(TimeoutInfo),
    /// A proposal arrived from a peer
    ProposalReceived(ViewChangeProposal),
    /// Stop for good
    Shutdown,
}

impl fmt::Display for CoordinatorEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoordinatorEvent::PrimaryProgress(ctx) => write!(
                f,
                "PrimaryProgress({}, leader={})",
                ctx.round_context(),
                ctx.leader.short_hex()
            ),
            CoordinatorEvent::Timeout(info) => write!(
                f,
                "Timeout({}, gen={}, counter={})",
                info.kind, info.generation, info.counter
            ),
            CoordinatorEvent::ProposalReceived(p) => write!(
                f,
                "Proposal(from={}, counter={})",
                p.proposer.short_hex(),
                p.counter()
            ),
            CoordinatorEvent::Shutdown => write!(f, "Shutdown"),
        }
    }
}

/// Work the caller must carry out after an event.
#[derive(Debug, Clone)]
pub enum CoordinatorAction {
    /// Send this proposal to every other committee member
    Broadcast(ViewChangeProposal),
    /// Deliver `info` back to the coordinator after `duration`
    ScheduleTimeout {
        /// Timer to deliver
        info: TimeoutInfo,
        /// Delay
        duration: Duration,
    },
    /// Hand this record to the chain-append path
    Finalized(FinalizedViewChange),
    /// Report to operators; the coordinator keeps retrying
    LivenessStall(LivenessStall),
}

/// Coordinator tuning.
#[derive(Debug, Clone, Default)]
pub struct CoordinatorConfig {
    /// Liveness and agreement timeouts
    pub timeouts: TimeoutConfig,
    /// Agreement threshold
    pub quorum: QuorumThreshold,
}

/// One node's view-change state machine.
pub struct ViewChangeCoordinator<D, C> {
    key: BlsPrivateKey,
    public_key: BlsPublicKey,
    directory: Arc<D>,
    crypto: Arc<C>,
    config: CoordinatorConfig,

    phase: CoordinatorPhase,
    monitor: Option<MonitorContext>,
    round: Option<ViewChangeRound>,

    /// Proposals by counter, for the monitored context and tip
    proposals: BTreeMap<u32, ProposalSet>,
    /// What this node proposed per counter; never re-signed differently
    own_proposals: HashMap<u32, ViewChangeProposal>,

    /// Bumped on every scheduled timer; older timers are ignored
    generation: u64,
    last_finalized: Option<H256>,
    finalized_count: u64,
}

impl<D, C> ViewChangeCoordinator<D, C>
where
    D: CommitteeDirectory,
    C: CryptoProvider,
{
    /// Create a coordinator for the member holding `key`.
    pub fn new(
        key: BlsPrivateKey,
        directory: Arc<D>,
        crypto: Arc<C>,
        config: CoordinatorConfig,
    ) -> Self {
        let public_key = key.public_key();
        if !directory.is_member(&public_key) {
            warn!(
                key = %public_key.short_hex(),
                "Coordinator key is not a committee member; it will observe only"
            );
        }
        Self {
            key,
            public_key,
            directory,
            crypto,
            config,
            phase: CoordinatorPhase::Monitoring,
            monitor: None,
            round: None,
            proposals: BTreeMap::new(),
            own_proposals: HashMap::new(),
            generation: 0,
            last_finalized: None,
            finalized_count: 0,
        }
    }

    /// Begin monitoring `ctx`.
    pub fn start(&mut self, ctx: MonitorContext) -> CoordinatorResult<Vec<CoordinatorAction>> {
        self.apply(CoordinatorEvent::PrimaryProgress(ctx))
    }

    /// Process an event and return the resulting actions.
    pub fn apply(&mut self, event: CoordinatorEvent) -> CoordinatorResult<Vec<CoordinatorAction>> {
        if self.phase == CoordinatorPhase::Failed {
            return match event {
                CoordinatorEvent::Shutdown => Ok(Vec::new()),
                _ => Err(CoordinatorError::ShutDown),
            };
        }

        debug!(
            phase = %self.phase,
            counter = self.counter(),
            event = %event,
            "Processing view-change event"
        );

        let mut actions = Vec::new();
        match event {
            CoordinatorEvent::PrimaryProgress(ctx) => self.handle_progress(ctx, &mut actions)?,
            CoordinatorEvent::Timeout(info) => match info.kind {
                TimeoutKind::Liveness => self.handle_liveness_timeout(info, &mut actions)?,
                TimeoutKind::Agreement => self.handle_agreement_timeout(info, &mut actions)?,
            },
            CoordinatorEvent::ProposalReceived(proposal) => {
                self.record_proposal(proposal, &mut actions)?
            }
            CoordinatorEvent::Shutdown => self.handle_shutdown()?,
        }
        Ok(actions)
    }

    fn handle_progress(
        &mut self,
        ctx: MonitorContext,
        actions: &mut Vec<CoordinatorAction>,
    ) -> CoordinatorResult<()> {
        let context = ctx.round_context();
        let same_context = self.round.as_ref().map(|r| r.context()) == Some(context);
        if !same_context {
            if let Some(old) = self.round.take() {
                debug!(
                    old = %old.context(),
                    new = %context,
                    faulty = old.faulty_leaders().len(),
                    "Context changed, discarding view-change round"
                );
            }
        }

        let tip_changed = self.monitor.as_ref().map(|m| m.prev_hash) != Some(ctx.prev_hash);
        if !same_context || tip_changed {
            self.proposals.clear();
            self.own_proposals.clear();
        }

        self.monitor = Some(ctx);
        self.transition(CoordinatorPhase::Monitoring)?;
        self.schedule(TimeoutKind::Liveness, self.counter(), actions);
        Ok(())
    }

    fn handle_liveness_timeout(
        &mut self,
        info: TimeoutInfo,
        actions: &mut Vec<CoordinatorAction>,
    ) -> CoordinatorResult<()> {
        if info.generation != self.generation || self.phase != CoordinatorPhase::Monitoring {
            trace!(generation = info.generation, "Stale liveness timeout ignored");
            return Ok(());
        }
        let ctx = self.monitor.clone().ok_or(CoordinatorError::NotStarted)?;
        let context = ctx.round_context();

        let continuing = self.round.as_ref().map(|r| r.context()) == Some(context);
        if continuing {
            let address = self.directory.member(&ctx.leader).map(|m| m.address);
            if let (Some(round), Some(address)) = (self.round.as_mut(), address) {
                if round.fail_leader(FaultyLeader::new(ctx.leader.clone(), address)) {
                    info!(
                        context = %context,
                        leader = %ctx.leader.short_hex(),
                        counter = round.counter(),
                        "Agreed leader failed again, continuing round"
                    );
                }
            }
        } else {
            self.round = Some(ViewChangeRound::new(context, ctx.leader.clone()));
            self.proposals.clear();
            self.own_proposals.clear();
        }

        warn!(
            context = %context,
            leader = %ctx.leader.short_hex(),
            "Leader made no progress, starting view change"
        );
        self.transition(CoordinatorPhase::Suspecting)?;
        self.nominate(actions)
    }

    fn handle_agreement_timeout(
        &mut self,
        info: TimeoutInfo,
        actions: &mut Vec<CoordinatorAction>,
    ) -> CoordinatorResult<()> {
        if info.generation != self.generation {
            trace!(generation = info.generation, "Stale agreement timeout ignored");
            return Ok(());
        }
        match self.phase {
            CoordinatorPhase::AwaitingAgreement => {}
            CoordinatorPhase::Suspecting => return self.nominate(actions),
            _ => return Ok(()),
        }

        let round = self.round.as_mut().ok_or(CoordinatorError::NotStarted)?;
        let counter = round.counter();
        let context = round.context();
        let failed = round.fail_candidate();

        let observed = self
            .proposals
            .get(&counter)
            .map(|s| s.observed_weight())
            .unwrap_or(0);
        let required = self.config.quorum.required_for(self.directory.as_ref());

        if let Some(leader) = &failed {
            warn!(
                context = %context,
                counter = counter,
                candidate = %leader.public_key.short_hex(),
                observed_weight = observed,
                "No agreement before timeout, candidate marked faulty"
            );
        }
        if observed < required {
            let stall = LivenessStall {
                context,
                counter,
                reason: StallReason::InsufficientWeight { observed, required },
            };
            warn!(stall = %stall, "View change lacks quorum participation");
            actions.push(CoordinatorAction::LivenessStall(stall));
        }

        self.proposals = self.proposals.split_off(&(counter + 1));
        self.transition(CoordinatorPhase::Suspecting)?;
        self.nominate(actions)
    }

    fn handle_shutdown(&mut self) -> CoordinatorResult<()> {
        self.transition(CoordinatorPhase::Failed)?;
        self.generation += 1;
        info!(finalized = self.finalized_count, "View-change coordinator shut down");
        Ok(())
    }

    /// Pick the candidate for the current counter and propose it.
    fn nominate(&mut self, actions: &mut Vec<CoordinatorAction>) -> CoordinatorResult<()> {
        let directory = Arc::clone(&self.directory);
        let ctx = self.monitor.clone().ok_or(CoordinatorError::NotStarted)?;

        let mut restarted = false;
        loop {
            let round = self.round.as_mut().ok_or(CoordinatorError::NotStarted)?;
            if round.nominate(directory.as_ref()).is_some() {
                break;
            }

            let stall = LivenessStall {
                context: round.context(),
                counter: round.counter(),
                reason: StallReason::RotationExhausted {
                    attempts: round.counter() - 1,
                },
            };
            let fresh = ViewChangeRound::new(round.context(), round.stalled_leader().clone());
            warn!(stall = %stall, "Rotation exhausted, restarting view-change round");
            actions.push(CoordinatorAction::LivenessStall(stall));

            self.round = Some(fresh);
            self.proposals.clear();
            self.own_proposals.clear();

            if restarted {
                // Nobody but the stalled leader holds a seat; retry later.
                self.schedule(TimeoutKind::Agreement, 1, actions);
                return Ok(());
            }
            restarted = true;
        }

        let round = self.round.as_ref().ok_or(CoordinatorError::NotStarted)?;
        let counter = round.counter();
        let proposal = match self.own_proposals.get(&counter) {
            Some(existing) => existing.clone(),
            None => {
                let header = round
                    .build_header(directory.committee_digest(), ctx.prev_hash)
                    .ok_or(CoordinatorError::NotStarted)??;
                let proposal = ViewChangeProposal::sign(header, &self.key, self.crypto.as_ref());
                self.own_proposals.insert(counter, proposal.clone());
                proposal
            }
        };

        self.transition(CoordinatorPhase::Nominating)?;
        info!(
            context = %ctx.round_context(),
            counter = counter,
            candidate = %proposal.header.candidate_leader_key().short_hex(),
            faulty = proposal.header.faulty_leaders().len(),
            "Proposing view change"
        );

        let is_member = directory.is_member(&self.public_key);
        if is_member {
            actions.push(CoordinatorAction::Broadcast(proposal.clone()));
        }
        self.transition(CoordinatorPhase::AwaitingAgreement)?;
        self.schedule(TimeoutKind::Agreement, counter, actions);

        if is_member {
            match self.record_proposal(proposal, actions) {
                Err(CoordinatorError::Proposal(ProposalError::DuplicateProposal(_))) => Ok(()),
                other => other,
            }
        } else {
            Ok(())
        }
    }

    /// Check a proposal against the monitored context and add it.
    fn record_proposal(
        &mut self,
        proposal: ViewChangeProposal,
        actions: &mut Vec<CoordinatorAction>,
    ) -> CoordinatorResult<()> {
        let ctx = self.monitor.as_ref().ok_or(CoordinatorError::NotStarted)?;
        let context = ctx.round_context();

        let hash = proposal.header_hash();
        if self.last_finalized == Some(hash) {
            trace!(proposer = %proposal.proposer.short_hex(), "Late proposal for finalized header");
            return Ok(());
        }

        let got = proposal.context();
        if got != context {
            return Err(ProposalError::ContextMismatch {
                expected: context,
                got,
            }
            .into());
        }

        let counter = proposal.counter();
        if counter < self.counter() {
            trace!(
                counter = counter,
                current = self.counter(),
                proposer = %proposal.proposer.short_hex(),
                "Proposal for an earlier counter ignored"
            );
            return Ok(());
        }

        if proposal.header.prev_hash() != ctx.prev_hash {
            return Err(ProposalError::TipMismatch {
                expected: ctx.prev_hash,
                got: proposal.header.prev_hash(),
            }
            .into());
        }

        let quorum = self.config.quorum;
        let directory = Arc::clone(&self.directory);
        let crypto = Arc::clone(&self.crypto);
        let set = self
            .proposals
            .entry(counter)
            .or_insert_with(|| ProposalSet::new(context, counter, quorum));

        if let Some(agreed) = set.add(proposal, directory.as_ref(), crypto.as_ref())? {
            self.finalize(counter, agreed, actions)?;
        }
        Ok(())
    }

    /// Aggregate the agreeing proposals and hand the record off.
    fn finalize(
        &mut self,
        counter: u32,
        hash: H256,
        actions: &mut Vec<CoordinatorAction>,
    ) -> CoordinatorResult<()> {
        let directory = Arc::clone(&self.directory);
        let set = self
            .proposals
            .get(&counter)
            .ok_or(CoordinatorError::NotStarted)?;
        let header = set
            .header_for(&hash)
            .cloned()
            .ok_or(CoordinatorError::NotStarted)?;
        let agreeing = set.proposals_for(&hash, directory.as_ref());
        let endorsement =
            ViewChangeEndorsement::aggregate(&agreeing, directory.as_ref(), self.crypto.as_ref())?;

        self.transition(CoordinatorPhase::Finalized)?;
        let context = RoundContext::of_header(&header);
        info!(
            context = %context,
            counter = counter,
            candidate = %header.candidate_leader_key().short_hex(),
            faulty = header.faulty_leaders().len(),
            signers = endorsement.signer_count(),
            hash = %hash.short_hex(),
            "View change finalized"
        );

        let stalled = self
            .monitor
            .as_ref()
            .map(|m| m.leader.clone())
            .ok_or(CoordinatorError::NotStarted)?;
        let round = self
            .round
            .get_or_insert_with(|| ViewChangeRound::new(context, stalled));
        round.adopt(&header);

        self.proposals.clear();
        self.own_proposals.clear();
        self.last_finalized = Some(hash);
        self.finalized_count += 1;

        if let Some(monitor) = self.monitor.as_mut() {
            monitor.leader = header.candidate_leader_key().clone();
            monitor.prev_hash = hash;
        }
        actions.push(CoordinatorAction::Finalized(FinalizedViewChange::new(
            header,
            endorsement,
        )));

        self.transition(CoordinatorPhase::Monitoring)?;
        self.schedule(TimeoutKind::Liveness, counter, actions);
        Ok(())
    }

    fn schedule(&mut self, kind: TimeoutKind, counter: u32, actions: &mut Vec<CoordinatorAction>) {
        self.generation += 1;
        let info = TimeoutInfo {
            kind,
            generation: self.generation,
            counter,
        };
        let duration = self.config.timeouts.timeout_for(kind, counter);
        actions.push(CoordinatorAction::ScheduleTimeout { info, duration });
    }

    fn transition(&mut self, to: CoordinatorPhase) -> CoordinatorResult<()> {
        if !self.phase.can_transition_to(to) {
            error!(from = %self.phase, to = %to, "Invalid view-change transition");
            return Err(CoordinatorError::InvalidTransition {
                from: self.phase,
                to,
            });
        }
        trace!(from = %self.phase, to = %to, "Phase transition");
        self.phase = to;
        Ok(())
    }

    // Getters

    /// Current phase.
    pub fn phase(&self) -> CoordinatorPhase {
        self.phase
    }

    /// Current view-change counter; 1 when no round is open.
    pub fn counter(&self) -> u32 {
        self.round.as_ref().map(|r| r.counter()).unwrap_or(1)
    }

    /// The leader the node currently believes in.
    pub fn current_leader(&self) -> Option<&BlsPublicKey> {
        self.monitor.as_ref().map(|m| &m.leader)
    }

    /// Monitored primary context.
    pub fn monitor(&self) -> Option<&MonitorContext> {
        self.monitor.as_ref()
    }

    /// Open round, if any.
    pub fn round(&self) -> Option<&ViewChangeRound> {
        self.round.as_ref()
    }

    /// Timer generation.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// This node's identity.
    pub fn public_key(&self) -> &BlsPublicKey {
        &self.public_key
    }

    /// Committee in effect.
    pub fn directory(&self) -> &Arc<D> {
        &self.directory
    }

    /// Number of view changes finalized.
    pub fn finalized_count(&self) -> u64 {
        self.finalized_count
    }

    /// Point-in-time summary.
    pub fn snapshot(&self) -> CoordinatorSnapshot {
        CoordinatorSnapshot {
            phase: self.phase,
            context: self.monitor.as_ref().map(|m| m.round_context()),
            counter: self.counter(),
            faulty: self
                .round
                .as_ref()
                .map(|r| r.faulty_leaders().len())
                .unwrap_or(0),
            candidate: self
                .round
                .as_ref()
                .and_then(|r| r.candidate())
                .map(|m| m.public_key.short_hex()),
            finalized: self.finalized_count,
        }
    }
}

/// Summary of a coordinator for logs and the CLI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorSnapshot {
    /// Current phase
    pub phase: CoordinatorPhase,
    /// Monitored context
    pub context: Option<RoundContext>,
    /// Current counter
    pub counter: u32,
    /// Faulty leaders in the open round
    pub faulty: usize,
    /// Current candidate
    pub candidate: Option<String>,
    /// View changes finalized so far
    pub finalized: u64,
}

impl fmt::Display for CoordinatorSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Coordinator(phase={}, counter={}, faulty={}, candidate={}, finalized={})",
            self.phase,
            self.counter,
            self.faulty,
            self.candidate.as_deref().unwrap_or("none"),
            self.finalized
        )
    }
}
