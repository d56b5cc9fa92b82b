//! The peer transport (spec.md §6): `call`, `multicall` and a membership
//! event stream, addressed by `(actorName, nodeName)` pairs.
//!
//! The protocol core in `acceptor.rs`/`proposer.rs`/`leader.rs` only ever
//! talks to the [`Transport`] trait. This module supplies the in-process
//! collaborator spec.md §1 marks out of scope ("the generic remote-
//! procedure transport used to deliver requests to named peer
//! processes") in the minimal form needed to run and test the core: a
//! mailbox registry keyed by `Target`, built on `tokio::sync::mpsc` and
//! `tokio::sync::oneshot`, replacing the teacher's UDP `NetNode` (see
//! `net_node.rs` in the teacher crate) with in-process delivery per
//! spec.md §1's "in-process message transport".

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::message::{AcceptorRequest, AcceptorReply, StartRequest};
use crate::outcome::{NodeName, RoundOutcome};

/// The three kinds of agent a message can be addressed to (spec.md §2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActorKind {
    Acceptor,
    Proposer,
    Leader,
}

/// `(actorName, nodeName)` address, per spec.md §6.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Target {
    pub kind: ActorKind,
    pub node: NodeName,
}

impl Target {
    pub fn new(kind: ActorKind, node: impl Into<NodeName>) -> Self {
        Target {
            kind,
            node: node.into(),
        }
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}({})", self.kind, self.node)
    }
}

/// The request payload of a `call`/`multicall`.
#[derive(Debug, Clone)]
pub enum AgentRequest {
    Acceptor(AcceptorRequest),
    /// Addressed to a Proposer: run (or retry-run) a round.
    ProposerStart(StartRequest),
    /// Addressed to a Proposer: `GetId`.
    ProposerGetId,
    /// Addressed to a Leader: the client entry point, forwarded to
    /// whichever Proposer is currently elected.
    LeaderStart(StartRequest),
    /// Addressed to a Leader: `GetLeader`.
    LeaderGetLeader,
}

/// The reply payload of a `call`/`multicall`.
#[derive(Debug, Clone)]
pub enum AgentReply {
    Acceptor(AcceptorReply),
    Outcome(RoundOutcome),
    ProposerId(String),
    Leader(NodeName),
}

/// A membership change, as delivered by `subscribe_membership` (spec.md §6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MembershipEvent {
    NodeUp(NodeName),
    NodeDown(NodeName),
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("no actor registered for {0}")]
    UnknownTarget(Target),
    #[error("mailbox for {0} is closed")]
    MailboxClosed(Target),
    #[error("call to {0} timed out")]
    Timeout(Target),
}

/// An inbound envelope delivered to a registered actor mailbox: the
/// request plus the channel its reply must be sent back on.
pub struct Envelope {
    pub request: AgentRequest,
    pub reply_to: oneshot::Sender<AgentReply>,
}

/// Receiving half of an actor's mailbox, returned by
/// [`LocalTransport::register`].
pub type Mailbox = mpsc::Receiver<Envelope>;

/// `call`/`multicall`/`subscribe_membership` per spec.md §6.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn call(
        &self,
        target: &Target,
        request: AgentRequest,
        timeout: Duration,
    ) -> Result<AgentReply, TransportError>;

    /// Sends `request` to every target in `targets` and collects replies
    /// within `timeout`. Targets that time out or are unreachable are
    /// omitted from the result, per spec.md §6.
    async fn multicall(
        &self,
        targets: &[Target],
        request: AgentRequest,
        timeout: Duration,
    ) -> Vec<(NodeName, AgentReply)>;

    fn subscribe_membership(&self) -> broadcast::Receiver<MembershipEvent>;
}

/// Lets an `Arc<dyn Transport>` itself be handed to `LossyTransport::new`
/// (or anything else generic over `T: Transport`), delegating straight
/// through to the trait object it wraps.
#[async_trait]
impl Transport for Arc<dyn Transport> {
    async fn call(
        &self,
        target: &Target,
        request: AgentRequest,
        timeout: Duration,
    ) -> Result<AgentReply, TransportError> {
        (**self).call(target, request, timeout).await
    }

    async fn multicall(
        &self,
        targets: &[Target],
        request: AgentRequest,
        timeout: Duration,
    ) -> Vec<(NodeName, AgentReply)> {
        (**self).multicall(targets, request, timeout).await
    }

    fn subscribe_membership(&self) -> broadcast::Receiver<MembershipEvent> {
        (**self).subscribe_membership()
    }
}

/// In-process implementation of [`Transport`]: a registry of actor
/// mailboxes plus a membership broadcast channel. Every simulated node in
/// a test or demo cluster shares one `LocalTransport`.
pub struct LocalTransport {
    mailboxes: RwLock<HashMap<Target, mpsc::Sender<Envelope>>>,
    membership: broadcast::Sender<MembershipEvent>,
}

impl LocalTransport {
    pub fn new() -> Arc<Self> {
        let (membership, _) = broadcast::channel(256);
        Arc::new(LocalTransport {
            mailboxes: RwLock::new(HashMap::new()),
            membership,
        })
    }

    /// Registers a fresh mailbox for `target`, returning the receiving
    /// half for the actor task to poll. Replaces any previous
    /// registration for the same target (used when a stopped node is
    /// restarted in tests).
    pub fn register(&self, target: Target, capacity: usize) -> Mailbox {
        let (tx, rx) = mpsc::channel(capacity);
        self.mailboxes.write().unwrap().insert(target, tx);
        rx
    }

    /// Removes a target's mailbox, simulating the node going down.
    /// Publishes `NodeDown` to membership subscribers.
    pub fn deregister_node(&self, node: &str) {
        let mut mailboxes = self.mailboxes.write().unwrap();
        mailboxes.retain(|target, _| target.node != node);
        drop(mailboxes);
        let _ = self.membership.send(MembershipEvent::NodeDown(node.to_string()));
    }

    pub fn announce_node_up(&self, node: &str) {
        let _ = self.membership.send(MembershipEvent::NodeUp(node.to_string()));
    }

    /// Distinct node names currently holding at least one registered
    /// mailbox. Used by `node::spawn_node` to seed a joining node's
    /// `peer_count` from what is actually live right now, rather than
    /// from the full static roster (see that function's doc comment).
    pub fn live_nodes(&self) -> std::collections::HashSet<NodeName> {
        self.mailboxes
            .read()
            .unwrap()
            .keys()
            .map(|target| target.node.clone())
            .collect()
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn call(
        &self,
        target: &Target,
        request: AgentRequest,
        timeout: Duration,
    ) -> Result<AgentReply, TransportError> {
        let sender = {
            let mailboxes = self.mailboxes.read().unwrap();
            mailboxes.get(target).cloned()
        }
        .ok_or_else(|| TransportError::UnknownTarget(target.clone()))?;

        let (reply_to, reply_rx) = oneshot::channel();
        let envelope = Envelope { request, reply_to };

        sender
            .send(envelope)
            .await
            .map_err(|_| TransportError::MailboxClosed(target.clone()))?;

        match tokio::time::timeout(timeout, reply_rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(TransportError::MailboxClosed(target.clone())),
            Err(_) => Err(TransportError::Timeout(target.clone())),
        }
    }

    async fn multicall(
        &self,
        targets: &[Target],
        request: AgentRequest,
        timeout: Duration,
    ) -> Vec<(NodeName, AgentReply)> {
        let calls = targets.iter().map(|target| {
            let request = request.clone();
            async move {
                let result = self.call(target, request, timeout).await;
                (target.node.clone(), result)
            }
        });

        let results = futures::future::join_all(calls).await;

        results
            .into_iter()
            .filter_map(|(node, result)| match result {
                Ok(reply) => Some((node, reply)),
                Err(_) => None,
            })
            .collect()
    }

    fn subscribe_membership(&self) -> broadcast::Receiver<MembershipEvent> {
        self.membership.subscribe()
    }
}

/// A fault-injecting decorator used by the scenario tests of spec.md §8
/// to simulate partitions ("drop every message to/from this node").
/// Not part of the protocol core; the spec explicitly places "test
/// harnesses that simulate partitions" out of scope (§1) — this is that
/// harness, built on top of the `Transport` trait rather than inside it.
pub struct LossyTransport<T: Transport> {
    inner: T,
    /// Node names currently partitioned away: calls to a `Target` whose
    /// node is in this set are dropped (never delivered, always time out).
    cut_off: RwLock<std::collections::HashSet<NodeName>>,
}

impl<T: Transport> LossyTransport<T> {
    pub fn new(inner: T) -> Self {
        LossyTransport {
            inner,
            cut_off: RwLock::new(std::collections::HashSet::new()),
        }
    }

    /// Partitions `node` away: every call addressed to it will time out.
    pub fn cut_off(&self, node: impl Into<NodeName>) {
        self.cut_off.write().unwrap().insert(node.into());
    }

    /// Heals a partition previously induced by [`Self::cut_off`].
    pub fn heal(&self, node: &str) {
        self.cut_off.write().unwrap().remove(node);
    }
}

#[async_trait]
impl<T: Transport> Transport for LossyTransport<T> {
    async fn call(
        &self,
        target: &Target,
        request: AgentRequest,
        timeout: Duration,
    ) -> Result<AgentReply, TransportError> {
        if self.cut_off.read().unwrap().contains(&target.node) {
            tokio::time::sleep(timeout).await;
            return Err(TransportError::Timeout(target.clone()));
        }

        self.inner.call(target, request, timeout).await
    }

    async fn multicall(
        &self,
        targets: &[Target],
        request: AgentRequest,
        timeout: Duration,
    ) -> Vec<(NodeName, AgentReply)> {
        let calls = targets.iter().map(|target| {
            let request = request.clone();
            async move {
                let result = self.call(target, request, timeout).await;
                (target.node.clone(), result)
            }
        });

        let results = futures::future::join_all(calls).await;

        results
            .into_iter()
            .filter_map(|(node, result)| result.ok().map(|reply| (node, reply)))
            .collect()
    }

    fn subscribe_membership(&self) -> broadcast::Receiver<MembershipEvent> {
        self.inner.subscribe_membership()
    }
}
