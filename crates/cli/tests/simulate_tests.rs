//! Tests for commands/simulate.rs

use std::collections::HashSet;
use std::time::Duration;
use vigil_cli::commands::simulate::{run_simulation, simulation_keys, SimulationParams};
use vigil_cli::CliError;
use vigil_consensus::{QuorumThreshold, TimeoutConfig};
use vigil_crypto::BlsPublicKey;

fn params(nodes: u8, crashed: &[usize]) -> SimulationParams {
    SimulationParams {
        nodes,
        crashed: crashed.to_vec(),
        timeouts: TimeoutConfig::fast(),
        quorum: QuorumThreshold::two_thirds(),
        chain_id: "simulate-tests".to_string(),
        deadline: Duration::from_secs(20),
    }
}

fn crashed_keys(nodes: u8, crashed: &[usize]) -> HashSet<BlsPublicKey> {
    let keys = simulation_keys(nodes).unwrap();
    crashed.iter().map(|&i| keys[i].public_key()).collect()
}

#[tokio::test(start_paused = true)]
async fn test_live_members_replace_crashed_leader() {
    let outcome = run_simulation(params(4, &[0])).await.unwrap();

    assert_eq!(outcome.live, 3);
    assert_eq!(outcome.confirmations, 3);
    assert!(!crashed_keys(4, &[0]).contains(outcome.header.candidate_leader_key()));
    assert_eq!(
        outcome.header.view_change_counter() as usize,
        outcome.header.faulty_leaders().len() + 1
    );
}

#[tokio::test(start_paused = true)]
async fn test_crashed_candidates_end_up_faulty() {
    let crashed = [0, 1];
    let outcome = run_simulation(params(7, &crashed)).await.unwrap();
    let down = crashed_keys(7, &crashed);

    assert_eq!(outcome.confirmations, 5);
    assert!(!down.contains(outcome.header.candidate_leader_key()));
    for faulty in outcome.header.faulty_leaders() {
        assert!(down.contains(&faulty.public_key));
    }
}

#[tokio::test(start_paused = true)]
async fn test_without_quorum_times_out() {
    let mut p = params(4, &[0, 1]);
    p.deadline = Duration::from_secs(5);

    let err = run_simulation(p).await.unwrap_err();
    assert!(matches!(err, CliError::Timeout(_)));
}

#[tokio::test]
async fn test_invalid_parameters() {
    assert!(matches!(
        run_simulation(params(3, &[0, 1, 2])).await,
        Err(CliError::InvalidArgument(_))
    ));
    assert!(matches!(
        run_simulation(params(3, &[5])).await,
        Err(CliError::InvalidArgument(_))
    ));
    assert!(matches!(
        run_simulation(params(0, &[])).await,
        Err(CliError::InvalidArgument(_))
    ));
}
