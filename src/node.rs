//! Per-node wiring: spins up one Acceptor, one Proposer and one Leader
//! task, registers them on a shared [`LocalTransport`], and exposes a
//! single client-facing handle.
//!
//! Grounded on the teacher's `examples/simulate.rs`, which spawns one
//! thread per agent and coordinates their startup with an
//! `Arc<Barrier>` before any message can be sent. This module keeps that
//! shape — spawn everything first, only hand out the client-facing
//! handle once every mailbox is registered — translated from
//! thread-per-agent to `tokio::spawn` per spec.md §5's actor-per-task
//! model.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::config::PaxosConfig;
use crate::message::{StartRequest, Value};
use crate::outcome::{NodeName, RoundOutcome};
use crate::transport::{ActorKind, AgentReply, AgentRequest, LocalTransport, Target, Transport};
use crate::{acceptor, leader, proposer};

/// The three background tasks backing one simulated node. Dropping this
/// (or letting it go out of scope) does not stop the tasks; call
/// [`NodeTasks::abort_all`] or simply drop the `JoinHandle`s held
/// elsewhere if a test needs to tear a node down.
pub struct NodeTasks {
    pub acceptor: JoinHandle<()>,
    pub proposer: JoinHandle<()>,
    pub leader: JoinHandle<()>,
}

impl NodeTasks {
    pub fn abort_all(&self) {
        self.acceptor.abort();
        self.proposer.abort();
        self.leader.abort();
    }
}

/// The client-facing surface of a running node: `leader_start` is the
/// single entry point spec.md §2's "Application/wiring" bullet calls out
/// ("the only client-facing operation is `Leader.Start`").
#[derive(Clone)]
pub struct NodeHandle {
    node_id: NodeName,
    transport: Arc<dyn Transport>,
}

impl NodeHandle {
    /// `Leader.Start(value)`: routes through this node's Leader, which in
    /// turn forwards to whichever Proposer is currently elected
    /// (spec.md §4.3).
    pub async fn leader_start(&self, value: Value, timeout: std::time::Duration) -> Result<RoundOutcome, crate::transport::TransportError> {
        let target = Target::new(ActorKind::Leader, self.node_id.clone());
        let reply = self
            .transport
            .call(
                &target,
                AgentRequest::LeaderStart(StartRequest { value, retry: true }),
                timeout,
            )
            .await?;
        match reply {
            AgentReply::Outcome(outcome) => Ok(outcome),
            _ => unreachable!("Leader always answers LeaderStart with AgentReply::Outcome"),
        }
    }

    /// `Leader.GetLeader()`.
    pub async fn get_leader(&self, timeout: std::time::Duration) -> Result<NodeName, crate::transport::TransportError> {
        let target = Target::new(ActorKind::Leader, self.node_id.clone());
        let reply = self
            .transport
            .call(&target, AgentRequest::LeaderGetLeader, timeout)
            .await?;
        match reply {
            AgentReply::Leader(leader) => Ok(leader),
            _ => unreachable!("Leader always answers LeaderGetLeader with AgentReply::Leader"),
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }
}

/// Spawns the Acceptor/Proposer/Leader tasks for `node_id` and returns
/// both their `JoinHandle`s (for lifecycle control in tests) and a
/// [`NodeHandle`] ready for client calls. `all_nodes` is the full cluster
/// roster (this node included) used to compute the Acceptor and Proposer
/// target lists for multicast.
///
/// `registry` owns mailbox registration and the membership broadcast;
/// `transport` is what the spawned actors place outbound calls through.
/// The two are almost always the same `LocalTransport`, but scenario
/// tests pass a `LossyTransport` wrapping `registry` as `transport` so
/// outbound calls can be dropped (simulating a partition) while
/// registration still goes through the plain registry.
///
/// Callers must not invoke `spawn_node` for two different nodes
/// concurrently on the same `registry`: the initial `peer_count` is
/// derived from a live-registry snapshot taken immediately before this
/// node announces itself, and an interleaved spawn could be observed by
/// neither the snapshot nor a prior subscription.
pub fn spawn_node(
    node_id: impl Into<NodeName>,
    all_nodes: Vec<NodeName>,
    registry: &LocalTransport,
    transport: Arc<dyn Transport>,
    config: PaxosConfig,
    mailbox_capacity: usize,
) -> (NodeTasks, NodeHandle) {
    let node_id = node_id.into();
    let peers = crate::peers::live_peers(&all_nodes, &config.excluded_nodes);

    let acceptor_mailbox = registry.register(
        Target::new(ActorKind::Acceptor, node_id.clone()),
        mailbox_capacity,
    );
    let proposer_mailbox = registry.register(
        Target::new(ActorKind::Proposer, node_id.clone()),
        mailbox_capacity,
    );
    let leader_mailbox = registry.register(
        Target::new(ActorKind::Leader, node_id.clone()),
        mailbox_capacity,
    );

    // Seed peer_count from what is actually live in the registry right
    // now (this node's own mailboxes just registered above, plus any
    // peer that registered before it), not from the full static roster:
    // seeding at `peers.len()` unconditionally double-counts, because
    // every other already-running node also broadcasts its own
    // `announce_node_up` on arrival, and a peer present in `peers` is
    // already reflected in this snapshot before that broadcast is ever
    // observed. Snapshotting before announcing and subscribing (in that
    // order) means: peers already live are counted exactly once here;
    // this node's own announce is sent before it subscribes, so it never
    // observes (and double counts) itself; and any peer that joins after
    // this point is counted exactly once via its own `NodeUp` broadcast.
    let already_live = registry
        .live_nodes()
        .into_iter()
        .filter(|node| peers.contains(node))
        .count();
    registry.announce_node_up(&node_id);

    let peer_count = proposer::PeerCount::new(already_live);
    let membership_task_count = peer_count.clone();
    let membership_rx = transport.subscribe_membership();
    tokio::spawn(proposer::track_membership(membership_rx, membership_task_count));

    let acceptor_task = tokio::spawn(acceptor::run(node_id.clone(), acceptor_mailbox));

    let proposer_state = proposer::Proposer::new(
        node_id.clone(),
        transport.clone(),
        peers.clone(),
        peer_count,
        config.clone(),
    );
    let proposer_task = tokio::spawn(proposer::run(proposer_state, proposer_mailbox));

    let leader_state = leader::Leader::new(node_id.clone(), transport.clone(), peers, config);
    let leader_task = tokio::spawn(leader::run(leader_state, leader_mailbox));

    (
        NodeTasks {
            acceptor: acceptor_task,
            proposer: proposer_task,
            leader: leader_task,
        },
        NodeHandle { node_id, transport },
    )
}
