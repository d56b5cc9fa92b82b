//! Simulates a small Paxos cluster in one process and drives a single
//! client proposal through it.
//!
//! Run this example as follows:
//!     RUST_LOG=paxos_core=info cargo run --example simulate
//!
//! Adapted from the teacher's `examples/simulate.rs` (thread-per-agent,
//! `Arc<Barrier>`-coordinated startup over UDP) to the in-process actor
//! model: every agent is a tokio task registered on one shared
//! `LocalTransport` instead of a socket bound to a configured address,
//! so no barrier is needed — registration happens before any task is
//! spawned, and `spawn_node` only returns once it has.

use std::sync::Arc;
use std::time::Duration;

use log::info;

use paxos_core::config::PaxosConfig;
use paxos_core::message::Value;
use paxos_core::node::spawn_node;
use paxos_core::transport::{LocalTransport, Transport};

#[tokio::main]
async fn main() {
    env_logger::init();

    let nodes = vec![
        "paxos1".to_string(),
        "paxos2".to_string(),
        "paxos3".to_string(),
    ];
    let config = PaxosConfig::default();
    let registry = LocalTransport::new();

    let mut tasks = Vec::new();
    let mut handles = Vec::new();
    for node in &nodes {
        let transport: Arc<dyn Transport> = registry.clone();
        let (node_tasks, handle) = spawn_node(
            node.clone(),
            nodes.clone(),
            &registry,
            transport,
            config.clone(),
            32,
        );
        tasks.push(node_tasks);
        handles.push(handle);
    }

    info!("spawned {} nodes: {:?}", nodes.len(), nodes);

    // A correlation id for this client run, the way the teacher's own
    // `Client`/`Proposer`/`Acceptor::new` tag each process with a fresh
    // `Uuid::new_v4()` identity.
    let correlation_id = uuid::Uuid::new_v4();
    info!("client {} proposing", correlation_id);

    let client_handle = handles[0].clone();
    let outcome = client_handle
        .leader_start(Value::from("hello-paxos"), Duration::from_secs(5))
        .await
        .expect("leader_start should not hit a transport error in this simulation");

    info!("client {} round outcome: {:?}", correlation_id, outcome);

    for node_tasks in &tasks {
        node_tasks.abort_all();
    }
}
