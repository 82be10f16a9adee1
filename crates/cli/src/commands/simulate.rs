//! In-process committee simulation.
//!
//! Builds a committee from seed-derived keys, runs one view-change engine per
//! live member over in-memory channels and waits until the live members
//! finalize a replacement for the genesis leader. No primary blocks are
//! produced, so every live member suspects the leader once its liveness
//! timeout expires. Crashed members never start and cannot acknowledge a
//! nomination, so each one that comes up as candidate ends in the faulty list.

use async_trait::async_trait;
use clap::Parser;
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::commands::config::BASE_PORT;
use crate::utils::{
    check_indices, format_duration, format_vc_header, print_info, print_success, print_warning,
    quorum_from_config, timeouts_from_config, CliError, CliResult, OutputFormat,
};
use vigil_config::Config;
use vigil_consensus::{
    Committee, CommitteeDirectory, CommitteeMember, CoordinatorConfig, EngineInputs, FinalizedSink,
    FinalizedViewChange, LivenessStall, MonitorContext, QuorumThreshold, TimeoutConfig,
    ViewChangeCoordinator, ViewChangeEngine, ViewChangeLedger, ViewChangeValidator,
};
use vigil_crypto::{BlsKeccak, BlsPrivateKey};
use vigil_types::{ChainHeader, HeaderCodec, NetworkAddress, TxBlockHeader, VcBlockHeader};

/// Arguments for the simulate command
#[derive(Parser, Debug)]
pub struct SimulateArgs {
    /// Committee size
    #[arg(long, default_value = "4")]
    pub nodes: u8,

    /// Members that never start, by index (member 0 leads at genesis)
    #[arg(long, value_delimiter = ',', default_value = "0")]
    pub crash: Vec<usize>,

    /// Give up after this many seconds
    #[arg(long, default_value = "30")]
    pub timeout_secs: u64,

    /// Signature domain (overrides the config file)
    #[arg(long)]
    pub chain_id: Option<String>,
}

/// Everything a simulation run needs.
#[derive(Debug, Clone)]
pub struct SimulationParams {
    /// Committee size
    pub nodes: u8,
    /// Members that never start
    pub crashed: Vec<usize>,
    /// Engine timeouts
    pub timeouts: TimeoutConfig,
    /// Agreement threshold
    pub quorum: QuorumThreshold,
    /// Signature domain
    pub chain_id: String,
    /// Wall-clock limit
    pub deadline: Duration,
}

impl SimulationParams {
    /// Parameters from the command line, with `[view_change]` settings when a
    /// config file was given and fast local timeouts otherwise.
    pub fn from_args(args: &SimulateArgs, config: Option<&Config>) -> CliResult<Self> {
        let (timeouts, quorum, chain_id) = match config {
            Some(config) => (
                timeouts_from_config(&config.view_change),
                quorum_from_config(&config.view_change)?,
                config.view_change.chain_id.clone(),
            ),
            None => (
                TimeoutConfig::fast(),
                QuorumThreshold::two_thirds(),
                "vigil-simulation".to_string(),
            ),
        };
        Ok(Self {
            nodes: args.nodes,
            crashed: args.crash.clone(),
            timeouts,
            quorum,
            chain_id: args.chain_id.clone().unwrap_or(chain_id),
            deadline: Duration::from_secs(args.timeout_secs),
        })
    }
}

/// Result of a simulation run.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationOutcome {
    /// The agreed header
    pub header: VcBlockHeader,
    /// Its hash
    pub hash: String,
    /// Live members that finalized it
    pub confirmations: usize,
    /// Members that were running
    pub live: usize,
    /// Time from start to the last confirmation
    pub elapsed_ms: u64,
    /// Liveness stalls reported along the way
    pub stalls: Vec<String>,
}

/// Appends to this node's ledger and reports the accepted record.
struct SimulationSink {
    node: usize,
    ledger: ViewChangeLedger<Committee, BlsKeccak>,
    finalized_tx: mpsc::UnboundedSender<(usize, FinalizedViewChange)>,
}

#[async_trait]
impl FinalizedSink for SimulationSink {
    async fn on_finalized(&self, record: &FinalizedViewChange) -> Result<(), String> {
        self.ledger.on_finalized(record).await?;
        let _ = self.finalized_tx.send((self.node, record.clone()));
        Ok(())
    }
}

type SimulationEngine = ViewChangeEngine<Committee, BlsKeccak, SimulationSink>;

/// Seed-derived committee keys; seeds match `vigil config init --members`.
pub fn simulation_keys(nodes: u8) -> CliResult<Vec<BlsPrivateKey>> {
    (0..nodes)
        .map(|i| {
            BlsPrivateKey::from_seed(&[i + 1; 32]).map_err(|e| CliError::KeyError(e.to_string()))
        })
        .collect()
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Run the committee until the live members agree or the deadline passes.
pub async fn run_simulation(params: SimulationParams) -> CliResult<SimulationOutcome> {
    let n = params.nodes as usize;
    if n == 0 {
        return Err(CliError::InvalidArgument("committee must not be empty".into()));
    }
    check_indices(&params.crashed, n)?;
    let crashed: BTreeSet<usize> = params.crashed.iter().copied().collect();
    let live: Vec<usize> = (0..n).filter(|i| !crashed.contains(i)).collect();
    if live.is_empty() {
        return Err(CliError::InvalidArgument("every member is crashed".into()));
    }

    let keys = simulation_keys(params.nodes)?;
    let members = keys
        .iter()
        .enumerate()
        .map(|(i, key)| {
            let address = format!("127.0.0.1:{}", BASE_PORT + i as u16)
                .parse::<NetworkAddress>()
                .map_err(|e| CliError::InvalidArgument(e.to_string()))?;
            Ok(CommitteeMember::new(key.public_key(), address, 1))
        })
        .collect::<CliResult<Vec<_>>>()?;
    let committee =
        Arc::new(Committee::new(members).map_err(|e| CliError::InvalidArgument(e.to_string()))?);
    let crypto = Arc::new(BlsKeccak::new(params.chain_id.clone()));

    let genesis = TxBlockHeader::genesis(
        keys[0].public_key(),
        committee.committee_digest(),
        now_millis(),
    );
    let context = MonitorContext::new(
        genesis.ds_epoch_number(),
        genesis.epoch_number() + 1,
        1,
        keys[0].public_key(),
        genesis.compute_hash(),
    );

    info!(
        nodes = n,
        live = live.len(),
        crashed = ?crashed,
        chain_id = %params.chain_id,
        "Starting view-change simulation"
    );

    let (finalized_tx, mut finalized_rx) = mpsc::unbounded_channel();
    let (alert_tx, mut alert_rx) = mpsc::channel::<LivenessStall>(256);

    let mut inboxes = Vec::with_capacity(live.len());
    let mut nodes = Vec::with_capacity(live.len());
    for &i in &live {
        let (network_tx, network_rx) = mpsc::channel(256);
        let (proposal_tx, proposal_rx) = mpsc::channel(256);
        // No primary blocks: the sender is dropped and progress stays idle.
        let (_, progress_rx) = mpsc::channel(1);
        let (timeout_tx, timeout_rx) = mpsc::channel(64);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let coordinator = ViewChangeCoordinator::new(
            keys[i].clone(),
            committee.clone(),
            crypto.clone(),
            CoordinatorConfig {
                timeouts: params.timeouts.clone(),
                quorum: params.quorum,
            },
        );
        let sink = Arc::new(SimulationSink {
            node: i,
            ledger: ViewChangeLedger::new(
                ChainHeader::Tx(genesis.clone()),
                committee.clone(),
                ViewChangeValidator::new(crypto.clone(), params.quorum),
            ),
            finalized_tx: finalized_tx.clone(),
        });
        let engine: Arc<SimulationEngine> = Arc::new(ViewChangeEngine::new(
            coordinator,
            sink,
            network_tx,
            alert_tx.clone(),
            timeout_tx,
        ));
        inboxes.push(proposal_tx);
        nodes.push((
            i,
            engine,
            network_rx,
            shutdown_tx,
            EngineInputs {
                proposal_rx,
                progress_rx,
                timeout_rx,
                shutdown_rx,
            },
        ));
    }
    drop(alert_tx);
    drop(finalized_tx);

    let started = Instant::now();
    let mut shutdowns = Vec::with_capacity(nodes.len());
    for (slot, (i, engine, mut network_rx, shutdown_tx, inputs)) in nodes.into_iter().enumerate() {
        tokio::spawn(engine.clone().run(inputs));

        let peers = inboxes.clone();
        tokio::spawn(async move {
            while let Some(proposal) = network_rx.recv().await {
                for (j, peer) in peers.iter().enumerate() {
                    if j != slot {
                        let _ = peer.send(proposal.clone()).await;
                    }
                }
            }
        });

        engine
            .start(context.clone())
            .await
            .map_err(|e| CliError::Engine(e.to_string()))?;
        debug!(node = i, "Simulated member started");
        shutdowns.push(shutdown_tx);
    }

    let deadline = tokio::time::sleep(params.deadline);
    tokio::pin!(deadline);

    let mut stalls = Vec::new();
    let mut agreed: Option<FinalizedViewChange> = None;
    let mut confirmed = HashSet::new();
    let mut elapsed = Duration::ZERO;

    while confirmed.len() < live.len() {
        tokio::select! {
            _ = &mut deadline => break,
            Some((node, record)) = finalized_rx.recv() => {
                match &agreed {
                    None => agreed = Some(record),
                    Some(first) if first.hash() != record.hash() => {
                        // A later view change on a node that already reported.
                        if confirmed.contains(&node) {
                            continue;
                        }
                        return Err(CliError::Engine(format!(
                            "node {} finalized {} but {} was agreed first",
                            node,
                            record.hash().short_hex(),
                            first.hash().short_hex()
                        )));
                    }
                    Some(_) => {}
                }
                confirmed.insert(node);
                elapsed = started.elapsed();
            }
            Some(stall) = alert_rx.recv() => {
                warn!(%stall, "Liveness stall");
                stalls.push(stall.to_string());
            }
        }
    }

    for shutdown_tx in shutdowns {
        let _ = shutdown_tx.send(());
    }

    let record = agreed.ok_or_else(|| {
        CliError::Timeout(format!(
            "no view change finalized within {}",
            format_duration(params.deadline)
        ))
    })?;

    Ok(SimulationOutcome {
        hash: record.hash().to_string(),
        header: record.header,
        confirmations: confirmed.len(),
        live: live.len(),
        elapsed_ms: elapsed.as_millis() as u64,
        stalls,
    })
}

/// Execute the simulate command
pub async fn execute(
    args: SimulateArgs,
    config: Option<&Config>,
    output_format: OutputFormat,
) -> CliResult<()> {
    let params = SimulationParams::from_args(&args, config)?;
    if output_format == OutputFormat::Text {
        print_info(&format!(
            "Simulating {} members, crashed: {:?}",
            params.nodes, params.crashed
        ));
    }

    let outcome = run_simulation(params).await?;

    match output_format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        OutputFormat::Text => {
            for stall in &outcome.stalls {
                print_warning(stall);
            }
            if outcome.confirmations < outcome.live {
                print_warning(&format!(
                    "Only {} of {} live members finalized before the deadline",
                    outcome.confirmations, outcome.live
                ));
            } else {
                print_success(&format!(
                    "View change finalized on all {} live members in {}",
                    outcome.live,
                    format_duration(Duration::from_millis(outcome.elapsed_ms))
                ));
            }
            println!("{}", format_vc_header(&outcome.header));
        }
    }

    Ok(())
}
