//! Integration tests for the view-change coordinator.
//!
//! Several coordinators exchange proposals through an in-memory network that
//! can crash nodes. Timers are fired by hand.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use vigil_consensus::{
    ChainTip, Committee, CommitteeDirectory, CommitteeMember, CoordinatorAction, CoordinatorConfig,
    CoordinatorEvent, CoordinatorPhase, FinalizedViewChange, LivenessStall, MonitorContext,
    QuorumThreshold, RoundContext, StallReason, TimeoutConfig, TimeoutInfo, TimeoutKind,
    ViewChangeCoordinator, ViewChangeProposal, ViewChangeRound, ViewChangeValidator,
};
use vigil_crypto::{BlsKeccak, BlsPrivateKey, BlsPublicKey};
use vigil_types::{ChainHeader, HeaderCodec, TxBlockHeader, H256};

const DS_EPOCH: u64 = 1;
const EPOCH: u64 = 5;

struct Node {
    coordinator: ViewChangeCoordinator<Committee, BlsKeccak>,
    timer: Option<TimeoutInfo>,
    finalized: Vec<FinalizedViewChange>,
    stalls: Vec<LivenessStall>,
    sent: Vec<ViewChangeProposal>,
}

struct Network {
    keys: Vec<BlsPrivateKey>,
    committee: Arc<Committee>,
    crypto: Arc<BlsKeccak>,
    nodes: Vec<Node>,
    crashed: HashSet<usize>,
    queue: VecDeque<(usize, ViewChangeProposal)>,
    genesis: TxBlockHeader,
}

impl Network {
    fn new(n: u8) -> Self {
        let keys: Vec<_> = (1..=n)
            .map(|i| BlsPrivateKey::from_seed(&[i; 32]).unwrap())
            .collect();
        let members = keys
            .iter()
            .enumerate()
            .map(|(i, k)| {
                CommitteeMember::new(
                    k.public_key(),
                    format!("10.4.0.{}:5000", i + 1).parse().unwrap(),
                    1,
                )
            })
            .collect();
        let committee = Arc::new(Committee::new(members).unwrap());
        let crypto = Arc::new(BlsKeccak::new("coordinator-tests"));

        let nodes = keys
            .iter()
            .map(|k| Node {
                coordinator: ViewChangeCoordinator::new(
                    k.clone(),
                    committee.clone(),
                    crypto.clone(),
                    CoordinatorConfig {
                        timeouts: TimeoutConfig::fast().with_jitter(0.0),
                        quorum: QuorumThreshold::two_thirds(),
                    },
                ),
                timer: None,
                finalized: Vec::new(),
                stalls: Vec::new(),
                sent: Vec::new(),
            })
            .collect();

        let genesis = TxBlockHeader::new(
            EPOCH - 1,
            DS_EPOCH,
            0,
            keys[0].public_key(),
            H256::NIL,
            committee.committee_digest(),
            H256::NIL,
        );

        Self {
            keys,
            committee,
            crypto,
            nodes,
            crashed: HashSet::new(),
            queue: VecDeque::new(),
            genesis,
        }
    }

    fn key(&self, i: usize) -> BlsPublicKey {
        self.keys[i].public_key()
    }

    fn index_of(&self, key: &BlsPublicKey) -> usize {
        self.committee.index_of(key).unwrap()
    }

    fn live(&self) -> Vec<usize> {
        (0..self.nodes.len())
            .filter(|i| !self.crashed.contains(i))
            .collect()
    }

    fn context(&self, leader: usize) -> MonitorContext {
        MonitorContext::new(DS_EPOCH, EPOCH, 0, self.key(leader), self.genesis.compute_hash())
    }

    fn crash(&mut self, i: usize) {
        self.crashed.insert(i);
    }

    fn start_all(&mut self, leader: usize) {
        let ctx = self.context(leader);
        for i in self.live() {
            let actions = self.nodes[i].coordinator.start(ctx.clone()).unwrap();
            self.absorb(i, actions);
        }
    }

    fn absorb(&mut self, i: usize, actions: Vec<CoordinatorAction>) {
        for action in actions {
            match action {
                CoordinatorAction::Broadcast(p) => {
                    self.nodes[i].sent.push(p.clone());
                    self.queue.push_back((i, p));
                }
                CoordinatorAction::ScheduleTimeout { info, .. } => self.nodes[i].timer = Some(info),
                CoordinatorAction::Finalized(record) => self.nodes[i].finalized.push(record),
                CoordinatorAction::LivenessStall(stall) => self.nodes[i].stalls.push(stall),
            }
        }
    }

    fn fire(&mut self, i: usize) {
        if let Some(info) = self.nodes[i].timer.take() {
            let actions = self.nodes[i]
                .coordinator
                .apply(CoordinatorEvent::Timeout(info))
                .unwrap();
            self.absorb(i, actions);
        }
    }

    fn flush(&mut self) {
        while let Some((from, proposal)) = self.queue.pop_front() {
            for to in self.live() {
                if to == from {
                    continue;
                }
                let result = self.nodes[to]
                    .coordinator
                    .apply(CoordinatorEvent::ProposalReceived(proposal.clone()));
                if let Ok(actions) = result {
                    self.absorb(to, actions);
                }
            }
        }
    }

    /// Fire the timers pending at the start of the tick, delivering messages
    /// after each. Timers replaced during the tick are not due yet.
    fn tick(&mut self) {
        let due: Vec<(usize, TimeoutInfo)> = self
            .live()
            .into_iter()
            .filter_map(|i| self.nodes[i].timer.map(|t| (i, t)))
            .collect();
        for (i, info) in due {
            if self.nodes[i].timer == Some(info) {
                self.fire(i);
                self.flush();
            }
        }
    }

    fn predicted_candidate(&self, leader: usize, faulty: &[usize]) -> usize {
        let mut round = ViewChangeRound::new(RoundContext::new(DS_EPOCH, EPOCH, 0), self.key(leader));
        for &f in faulty {
            let member = self.committee.members()[f].clone();
            round.fail_leader(vigil_types::FaultyLeader::new(member.public_key, member.address));
        }
        let key = round.nominate(self.committee.as_ref()).unwrap().public_key.clone();
        self.index_of(&key)
    }
}

#[test]
fn test_quorum_finalizes_on_every_live_node() {
    let mut net = Network::new(4);
    net.crash(0);
    net.start_all(0);
    net.tick();

    let live = net.live();
    let first = net.nodes[live[0]].finalized[0].hash();
    for &i in &live {
        let node = &net.nodes[i];
        assert_eq!(node.finalized.len(), 1, "node {} did not finalize", i);
        assert_eq!(node.finalized[0].hash(), first);
        assert_eq!(node.coordinator.phase(), CoordinatorPhase::Monitoring);
    }

    let header = &net.nodes[live[0]].finalized[0].header;
    assert_eq!(header.view_change_counter(), 1);
    assert!(header.faulty_leaders().is_empty());
    assert_ne!(header.candidate_leader_key(), &net.key(0));
    assert_eq!(header.prev_hash(), net.genesis.compute_hash());
    assert_eq!(
        net.index_of(header.candidate_leader_key()),
        net.predicted_candidate(0, &[])
    );
}

#[test]
fn test_finalized_record_passes_validation() {
    let mut net = Network::new(4);
    net.crash(0);
    net.start_all(0);
    net.tick();

    let record = net.nodes[1].finalized[0].clone();
    let validator = ViewChangeValidator::new(net.crypto.clone(), QuorumThreshold::two_thirds());
    let tip = ChainTip::from_header(&ChainHeader::Tx(net.genesis.clone()));
    let next = validator
        .accept(&record.header, &record.endorsement, &tip, net.committee.as_ref())
        .unwrap();
    assert_eq!(next.ordering_key(), (DS_EPOCH, EPOCH, 1));
    assert_eq!(next.hash, record.hash());
}

#[test]
fn test_new_leader_is_adopted() {
    let mut net = Network::new(4);
    net.crash(0);
    net.start_all(0);
    net.tick();

    let candidate = net.nodes[1].finalized[0].header.candidate_leader_key().clone();
    for i in net.live() {
        let c = &net.nodes[i].coordinator;
        assert_eq!(c.current_leader(), Some(&candidate));
        assert_eq!(c.monitor().unwrap().prev_hash, net.nodes[i].finalized[0].hash());
    }
}

#[test]
fn test_crashed_candidate_is_marked_faulty() {
    let mut net = Network::new(7);
    let first = net.predicted_candidate(0, &[]);
    net.crash(0);
    net.crash(first);
    net.start_all(0);

    // Counter 1 names a crashed candidate and cannot reach agreement.
    net.tick();
    assert!(net.live().iter().all(|&i| net.nodes[i].finalized.is_empty()));

    // Agreement timeouts move every live node to counter 2.
    net.tick();
    let live = net.live();
    for &i in &live {
        assert_eq!(net.nodes[i].finalized.len(), 1, "node {} did not finalize", i);
    }

    let header = &net.nodes[live[0]].finalized[0].header;
    assert_eq!(header.view_change_counter(), 2);
    assert_eq!(header.faulty_leaders().len(), 1);
    assert_eq!(header.faulty_leaders()[0].public_key, net.key(first));
    assert_eq!(
        net.index_of(header.candidate_leader_key()),
        net.predicted_candidate(0, &[first])
    );
}

#[test]
fn test_continuation_when_new_leader_fails() {
    let mut net = Network::new(7);
    net.crash(0);
    net.start_all(0);
    net.tick();

    let first = net.nodes[1].finalized[0].clone();
    let new_leader = net.index_of(first.header.candidate_leader_key());
    net.crash(new_leader);

    // Liveness timers under the new leader fire.
    net.tick();

    for i in net.live() {
        let node = &net.nodes[i];
        assert_eq!(node.finalized.len(), 2, "node {} missed the continuation", i);
        let second = &node.finalized[1].header;
        assert_eq!(second.view_change_counter(), 2);
        assert_eq!(second.faulty_leaders()[0].public_key, net.key(new_leader));
        assert_eq!(second.prev_hash(), first.hash());
        assert_ne!(second.candidate_leader_key(), &net.key(0));
    }

    let validator = ViewChangeValidator::new(net.crypto.clone(), QuorumThreshold::two_thirds());
    let tip = ChainTip::from_header(&ChainHeader::Tx(net.genesis.clone()));
    let live = net.live();
    let records = &net.nodes[live[0]].finalized;
    let tip = validator
        .accept(&records[0].header, &records[0].endorsement, &tip, net.committee.as_ref())
        .unwrap();
    let tip = validator
        .accept(&records[1].header, &records[1].endorsement, &tip, net.committee.as_ref())
        .unwrap();
    assert_eq!(tip.ordering_key(), (DS_EPOCH, EPOCH, 2));
}

#[test]
fn test_rotation_terminates_within_committee_size() {
    // One isolated node: every nominee fails because nobody else answers.
    let n = 5;
    let mut net = Network::new(n as u8);
    for i in 2..n {
        net.crash(i);
    }
    net.crash(0);
    net.start_all(0);

    let mut candidates = Vec::new();
    for _ in 0..n {
        net.fire(1);
        net.queue.clear();
        if let Some(p) = net.nodes[1].sent.last() {
            candidates.push((p.counter(), p.header.candidate_leader_key().clone()));
        }
        if net.nodes[1]
            .stalls
            .iter()
            .any(|s| matches!(s.reason, StallReason::RotationExhausted { .. }))
        {
            break;
        }
    }

    let exhausted = net.nodes[1]
        .stalls
        .iter()
        .find(|s| matches!(s.reason, StallReason::RotationExhausted { .. }))
        .expect("rotation should exhaust");
    assert_eq!(exhausted.reason, StallReason::RotationExhausted { attempts: 4 });

    // Counters 1..=4 named four distinct members, never the stalled leader,
    // then the round restarted at counter 1.
    let attempts: Vec<_> = candidates.iter().take(4).collect();
    let distinct: HashSet<_> = attempts.iter().map(|(_, k)| k.clone()).collect();
    assert_eq!(distinct.len(), 4);
    assert!(!distinct.contains(&net.key(0)));
    assert_eq!(
        attempts.iter().map(|(c, _)| *c).collect::<Vec<_>>(),
        vec![1, 2, 3, 4]
    );
    let restart = candidates.last().unwrap();
    assert_eq!(restart.0, 1);
    assert_eq!(restart.1, candidates[0].1);
    assert_eq!(net.nodes[1].coordinator.counter(), 1);
}

#[test]
fn test_insufficient_weight_reports_stall() {
    let mut net = Network::new(4);
    net.crash(0);
    net.crash(3);
    net.start_all(0);
    net.tick();
    net.tick();

    for i in net.live() {
        let node = &net.nodes[i];
        assert!(node.finalized.is_empty());
        let stall = node
            .stalls
            .iter()
            .find(|s| matches!(s.reason, StallReason::InsufficientWeight { .. }))
            .expect("stall expected");
        assert_eq!(stall.counter, 1);
        match stall.reason {
            StallReason::InsufficientWeight { observed, required } => {
                assert!(observed <= 2);
                assert_eq!(required, 3);
            }
            _ => unreachable!(),
        }
        // Still retrying.
        assert_eq!(node.coordinator.phase(), CoordinatorPhase::AwaitingAgreement);
        assert_eq!(node.coordinator.counter(), 2);
    }
}

#[test]
fn test_proposes_once_per_counter() {
    let mut net = Network::new(4);
    net.crash(0);
    net.start_all(0);
    net.fire(1);
    net.flush();

    let sent = net.nodes[1].sent.clone();
    assert_eq!(sent.len(), 1);

    // A replayed copy of our own proposal is not counted twice.
    let result = net.nodes[2]
        .coordinator
        .apply(CoordinatorEvent::ProposalReceived(sent[0].clone()));
    assert!(result.is_err());
}

#[test]
fn test_stale_agreement_timer_after_finalization() {
    let mut net = Network::new(4);
    net.crash(0);
    net.start_all(0);

    net.fire(1);
    net.flush();
    let stale = TimeoutInfo {
        kind: TimeoutKind::Agreement,
        generation: net.nodes[1].coordinator.generation(),
        counter: 1,
    };
    net.fire(2);
    net.flush();
    net.fire(3);
    net.flush();
    assert_eq!(net.nodes[1].finalized.len(), 1);

    let actions = net.nodes[1]
        .coordinator
        .apply(CoordinatorEvent::Timeout(stale))
        .unwrap();
    assert!(actions.is_empty());
    assert_eq!(net.nodes[1].coordinator.phase(), CoordinatorPhase::Monitoring);
}
