//! View-Change Engine
//!
//! Async driver around [`ViewChangeCoordinator`].
//!
//! ## Flow
//!
//! 1. **Inputs**: peer proposals, primary-progress notices and fired timers
//!    arrive on mpsc channels
//! 2. **Transition**: the event is applied to the coordinator under a single
//!    mutex, so only one transition runs at a time
//! 3. **Outputs**: the returned actions are carried out with the lock
//!    released: proposals go to the network channel, timers to the
//!    [`TimeoutScheduler`], finalized records to the [`FinalizedSink`] and
//!    stall reports to the alert channel
//!
//! Rejected proposals are logged and dropped. Only [`LivenessStall`] leaves
//! the engine as an operator-facing signal.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};
use vigil_crypto::CryptoProvider;

use crate::committee::CommitteeDirectory;
use crate::coordinator::{
    CoordinatorAction, CoordinatorError, CoordinatorEvent, CoordinatorSnapshot,
    ViewChangeCoordinator,
};
use crate::proposal::ViewChangeProposal;
use crate::timeout::{TimeoutInfo, TimeoutScheduler};
use crate::types::{FinalizedViewChange, LivenessStall, MonitorContext};

/// Errors that can occur while driving the coordinator
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The coordinator refused the event
    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),

    /// An outbound channel was closed
    #[error("channel error: {0}")]
    ChannelError(String),
}

/// Receiver of finalized view changes (implemented by the ledger)
#[async_trait]
pub trait FinalizedSink: Send + Sync {
    /// Take ownership of an agreed header and its endorsement
    async fn on_finalized(&self, record: &FinalizedViewChange) -> Result<(), String>;
}

/// Inbound channels consumed by [`ViewChangeEngine::run`].
pub struct EngineInputs {
    /// Proposals from peers
    pub proposal_rx: mpsc::Receiver<ViewChangeProposal>,
    /// Primary-consensus progress
    pub progress_rx: mpsc::Receiver<MonitorContext>,
    /// Fired timers
    pub timeout_rx: mpsc::Receiver<TimeoutInfo>,
    /// Stop signal
    pub shutdown_rx: oneshot::Receiver<()>,
}

/// Async view-change engine for one node.
pub struct ViewChangeEngine<D, C, S> {
    coordinator: Mutex<ViewChangeCoordinator<D, C>>,
    timeout_scheduler: TimeoutScheduler,
    sink: Arc<S>,
    network_tx: mpsc::Sender<ViewChangeProposal>,
    alert_tx: mpsc::Sender<LivenessStall>,
}

impl<D, C, S> ViewChangeEngine<D, C, S>
where
    D: CommitteeDirectory + 'static,
    C: CryptoProvider,
    S: FinalizedSink,
{
    /// Create an engine. Timers fire into `timeout_tx`, which should feed the
    /// `timeout_rx` handed to [`ViewChangeEngine::run`].
    pub fn new(
        coordinator: ViewChangeCoordinator<D, C>,
        sink: Arc<S>,
        network_tx: mpsc::Sender<ViewChangeProposal>,
        alert_tx: mpsc::Sender<LivenessStall>,
        timeout_tx: mpsc::Sender<TimeoutInfo>,
    ) -> Self {
        Self {
            coordinator: Mutex::new(coordinator),
            timeout_scheduler: TimeoutScheduler::new(timeout_tx),
            sink,
            network_tx,
            alert_tx,
        }
    }

    /// Begin monitoring `ctx`.
    pub async fn start(&self, ctx: MonitorContext) -> Result<(), EngineError> {
        info!(
            ds_epoch = ctx.ds_epoch,
            epoch = ctx.view_change_epoch,
            state = ctx.state,
            leader = %ctx.leader.short_hex(),
            "Starting view-change engine"
        );
        self.dispatch(CoordinatorEvent::PrimaryProgress(ctx)).await
    }

    /// The primary round moved on.
    pub async fn on_primary_progress(&self, ctx: MonitorContext) -> Result<(), EngineError> {
        self.dispatch(CoordinatorEvent::PrimaryProgress(ctx)).await
    }

    /// A peer proposal arrived. Rejections are logged, not returned.
    pub async fn on_proposal(&self, proposal: ViewChangeProposal) -> Result<(), EngineError> {
        let proposer = proposal.proposer.short_hex();
        let counter = proposal.counter();
        match self.dispatch(CoordinatorEvent::ProposalReceived(proposal)).await {
            Err(EngineError::Coordinator(CoordinatorError::Proposal(e))) => {
                warn!(proposer = %proposer, counter = counter, error = %e, "Proposal rejected");
                Ok(())
            }
            other => other,
        }
    }

    /// A scheduled timer fired.
    pub async fn on_timeout(&self, timeout: TimeoutInfo) -> Result<(), EngineError> {
        self.dispatch(CoordinatorEvent::Timeout(timeout)).await
    }

    /// Stop the coordinator and cancel its timers.
    pub async fn shutdown(&self) -> Result<(), EngineError> {
        self.timeout_scheduler.cancel_all();
        self.dispatch(CoordinatorEvent::Shutdown).await
    }

    /// Current coordinator summary.
    pub fn snapshot(&self) -> CoordinatorSnapshot {
        self.coordinator.lock().snapshot()
    }

    /// Process inputs until shutdown or until every input channel closes.
    pub async fn run(self: Arc<Self>, inputs: EngineInputs) -> Result<(), EngineError> {
        let EngineInputs {
            mut proposal_rx,
            mut progress_rx,
            mut timeout_rx,
            mut shutdown_rx,
        } = inputs;

        loop {
            let result = tokio::select! {
                _ = &mut shutdown_rx => break,
                Some(proposal) = proposal_rx.recv() => self.on_proposal(proposal).await,
                Some(ctx) = progress_rx.recv() => self.on_primary_progress(ctx).await,
                Some(timeout) = timeout_rx.recv() => self.on_timeout(timeout).await,
                else => break,
            };
            match result {
                Ok(()) => {}
                Err(EngineError::Coordinator(CoordinatorError::ShutDown)) => break,
                Err(e) => error!(error = %e, "View-change event failed"),
            }
        }

        self.shutdown().await?;
        debug!("View-change engine stopped");
        Ok(())
    }

    async fn dispatch(&self, event: CoordinatorEvent) -> Result<(), EngineError> {
        let actions = {
            let mut coordinator = self.coordinator.lock();
            coordinator.apply(event)?
        };
        self.execute(actions).await
    }

    async fn execute(&self, actions: Vec<CoordinatorAction>) -> Result<(), EngineError> {
        for action in actions {
            match action {
                CoordinatorAction::Broadcast(proposal) => {
                    self.network_tx
                        .send(proposal)
                        .await
                        .map_err(|e| EngineError::ChannelError(e.to_string()))?;
                }
                CoordinatorAction::ScheduleTimeout { info, duration } => {
                    self.timeout_scheduler.schedule(info, duration);
                }
                CoordinatorAction::Finalized(record) => {
                    if let Err(e) = self.sink.on_finalized(&record).await {
                        error!(
                            hash = %record.hash().short_hex(),
                            error = %e,
                            "Finalized view change was not accepted"
                        );
                    }
                }
                CoordinatorAction::LivenessStall(stall) => {
                    if self.alert_tx.send(stall).await.is_err() {
                        warn!("Alert channel closed, liveness stall dropped");
                    }
                }
            }
        }
        Ok(())
    }
}
