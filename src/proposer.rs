//! The Proposer: round driver executing Phase 1 and Phase 2 handshakes
//! (spec.md §4.2). The largest module in the crate, per spec.md §2's
//! implementation-budget split (~40% of the core).
//!
//! Grounded on the teacher's `Proposer<T>` `prepare`/`propose`/`decide`
//! in `multi_paxos.rs` for the phase-sequencing shape: accumulate replies
//! until a majority is seen, then compare received rounds/values against
//! the proposer's own. Generalized from the teacher's accumulate-over-
//! unordered-UDP-messages style (where `propose`/`decide` are re-entered
//! once per incoming message) to a multicall-with-bounded-timeout style
//! (spec.md §5), since the in-process `Transport` delivers whole reply
//! sets rather than one message at a time. The retry loop is new: the
//! teacher has none (its own TODO: "doesn't support the re-sending of
//! Preparation messages").

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Instant;

use log::{debug, info, warn};
use tokio::sync::oneshot;

use crate::backoff::ExponentialBackoff;
use crate::config::PaxosConfig;
use crate::error::PaxosErrorKind;
use crate::message::{AcceptorReply, AcceptorRequest, Commit, Prepare, StartRequest, Value};
use crate::outcome::{NodeName, RoundOutcome};
use crate::peers::quorum_size;
use crate::proposal_id::ProposalIdGenerator;
use crate::transport::{ActorKind, AgentReply, AgentRequest, Envelope, MembershipEvent, Mailbox, Target, Transport};

/// Shared, atomically-updated peer count. A `Proposer`'s mailbox loop and
/// its membership-tracking task both hold a clone of this handle; the
/// mailbox loop reads a snapshot at the start of every round (spec.md
/// §4.2 step 3), the membership task writes to it as nodeup/nodedown
/// events arrive (spec.md §9 "Membership count staleness").
#[derive(Clone)]
pub struct PeerCount(Arc<AtomicUsize>);

impl PeerCount {
    pub fn new(initial: usize) -> Self {
        PeerCount(Arc::new(AtomicUsize::new(initial)))
    }

    pub fn snapshot(&self) -> usize {
        self.0.load(AtomicOrdering::Acquire)
    }

    fn inc(&self) {
        self.0.fetch_add(1, AtomicOrdering::AcqRel);
    }

    fn dec(&self) {
        // Saturating: a redundant nodedown for an already-down peer must
        // not wrap the counter past zero.
        let _ = self
            .0
            .fetch_update(AtomicOrdering::AcqRel, AtomicOrdering::Acquire, |n| {
                Some(n.saturating_sub(1))
            });
    }
}

/// Runs the membership-tracking side task: applies `nodeup`/`nodedown`
/// events to `peer_count` until the subscription ends.
pub async fn track_membership(
    mut membership: tokio::sync::broadcast::Receiver<MembershipEvent>,
    peer_count: PeerCount,
) {
    loop {
        match membership.recv().await {
            Ok(MembershipEvent::NodeUp(node)) => {
                peer_count.inc();
                debug!("membership: {} up, peer_count={}", node, peer_count.snapshot());
            }
            Ok(MembershipEvent::NodeDown(node)) => {
                peer_count.dec();
                debug!("membership: {} down, peer_count={}", node, peer_count.snapshot());
            }
            Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Per-node round driver state (spec.md §3 "ProposerState").
pub struct Proposer {
    node_id: String,
    transport: Arc<dyn Transport>,
    /// Every configured Acceptor's node name (this node included), minus
    /// excluded nodes. The round always multicasts to this full set; a
    /// dead peer simply never replies within the timeout.
    acceptor_nodes: Vec<NodeName>,
    peer_count: PeerCount,
    id_gen: ProposalIdGenerator,
    config: PaxosConfig,
}

impl Proposer {
    pub fn new(
        node_id: impl Into<String>,
        transport: Arc<dyn Transport>,
        acceptor_nodes: Vec<NodeName>,
        peer_count: PeerCount,
        config: PaxosConfig,
    ) -> Self {
        let node_id = node_id.into();
        Proposer {
            id_gen: ProposalIdGenerator::new(node_id.clone()),
            node_id,
            transport,
            acceptor_nodes,
            peer_count,
            config,
        }
    }

    fn acceptor_targets(&self) -> Vec<Target> {
        self.acceptor_nodes
            .iter()
            .map(|node| Target::new(ActorKind::Acceptor, node.clone()))
            .collect()
    }

    /// One full Phase 1 + Phase 2 attempt (spec.md §4.2 "Round algorithm").
    async fn run_round(&mut self, value: &Value) -> RoundOutcome {
        // Step 1: fresh, strictly-greater ProposalId.
        let round = self.id_gen.next();
        info!("[proposer={}] starting round {:?}", self.node_id, round);

        // Step 3 snapshot (taken before Phase 1 completes, per spec.md §9
        // "Membership count staleness": "the round continues with the
        // snapshot value taken at step 3").
        let peer_count = self.peer_count.snapshot();
        if peer_count < self.config.min_quorum {
            warn!(
                "[proposer={}] {} peers below min_quorum {}",
                self.node_id, peer_count, self.config.min_quorum
            );
            return RoundOutcome::error(PaxosErrorKind::PrepareNodesBelowMinQuorum);
        }
        let quorum = quorum_size(peer_count);

        // Step 2: multicast Prepare. The target list is the full
        // configured Acceptor set; `peer_count` (checked above and
        // enforced below, against the *reply* counts) is the live-peer
        // snapshot used for quorum arithmetic, which may be smaller.
        let targets = self.acceptor_targets();

        let prepare_replies = self
            .transport
            .multicall(
                &targets,
                AgentRequest::Acceptor(AcceptorRequest::Prepare(Prepare {
                    proposal_id: round.clone(),
                })),
                self.config.round_timeout(),
            )
            .await;

        if prepare_replies.len() > peer_count {
            panic!(
                "[proposer={}] invariant violated: {} prepare replies exceed peer_count snapshot {}",
                self.node_id,
                prepare_replies.len(),
                peer_count
            );
        }

        let mut promises = 0usize;
        let mut best_accepted: Option<crate::message::AcceptedPair> = None;

        for (_node, reply) in &prepare_replies {
            if let AgentReply::Acceptor(AcceptorReply::Promise(promise)) = reply {
                promises += 1;
                if let Some(accepted) = &promise.accepted {
                    let better = match &best_accepted {
                        None => true,
                        Some(current) => accepted.id > current.id,
                    };
                    if better {
                        best_accepted = Some(accepted.clone());
                    }
                }
            }
        }

        if promises < quorum {
            debug!(
                "[proposer={}] round {:?}: only {}/{} promises",
                self.node_id, round, promises, quorum
            );
            return RoundOutcome::declined(
                round,
                HashSet::new(),
                PaxosErrorKind::PrepareConsensusNotReached,
            );
        }

        // Step 5: consensus value.
        let chosen_value = match best_accepted {
            Some(accepted) => accepted.value,
            None => value.clone(),
        };

        // Step 6: multicast Commit.
        let commit_replies = self
            .transport
            .multicall(
                &targets,
                AgentRequest::Acceptor(AcceptorRequest::Commit(Commit {
                    proposal_id: round.clone(),
                    value: chosen_value.clone(),
                })),
                self.config.round_timeout(),
            )
            .await;

        if commit_replies.len() > peer_count {
            panic!(
                "[proposer={}] invariant violated: {} commit replies exceed peer_count snapshot {}",
                self.node_id,
                commit_replies.len(),
                peer_count
            );
        }

        // Step 7: partition replies.
        let mut participants = HashSet::new();
        let mut declines = HashSet::new();
        for (node, reply) in &commit_replies {
            match reply {
                AgentReply::Acceptor(AcceptorReply::Accepted(accepted))
                    if accepted.proposal_id == round && accepted.value == chosen_value =>
                {
                    participants.insert(node.clone());
                }
                AgentReply::Acceptor(AcceptorReply::Decline(_)) => {
                    declines.insert(node.clone());
                }
                other => {
                    debug!(
                        "[proposer={}] round {:?}: discarding unexpected reply {:?} from {}",
                        self.node_id, round, other, node
                    );
                }
            }
        }

        // Step 8.
        if participants.len() >= quorum {
            info!(
                "[proposer={}] round {:?} accepted by {:?}",
                self.node_id, round, participants
            );
            RoundOutcome::accepted(round, chosen_value, participants, declines)
        } else {
            debug!(
                "[proposer={}] round {:?}: only {}/{} accepts",
                self.node_id,
                round,
                participants.len(),
                quorum
            );
            RoundOutcome::declined(round, declines, PaxosErrorKind::CommitDeclined)
        }
    }

    /// `StartOnce(value)`: a single round, never retried (spec.md §4.2).
    pub async fn start_once(&mut self, value: Value) -> RoundOutcome {
        self.run_round(&value).await
    }

    /// `Start(value)`: rounds until success or the retry budget elapses
    /// (spec.md §4.2 "Retry policy").
    pub async fn start(&mut self, value: Value) -> RoundOutcome {
        let deadline = Instant::now() + self.config.retry_budget();
        let mut backoff = ExponentialBackoff::new(
            std::time::Duration::from_millis(20),
            std::time::Duration::from_millis(500),
        );

        loop {
            let outcome = self.run_round(&value).await;

            if !outcome.is_retryable() {
                return outcome;
            }

            if Instant::now() >= deadline {
                warn!("[proposer={}] retry budget exhausted", self.node_id);
                return RoundOutcome::error(PaxosErrorKind::Timeout);
            }

            backoff.wait().await;

            if Instant::now() >= deadline {
                return RoundOutcome::error(PaxosErrorKind::Timeout);
            }
        }
    }

    /// `GetId() -> string` (spec.md §4.2): the stable per-node identifier
    /// used for leader comparison (spec.md §9 "Global identifiers").
    pub fn get_id(&self) -> String {
        crate::ident::node_identity(&self.node_id)
    }
}

/// Runs a Proposer's mailbox loop. Requests are processed strictly one
/// at a time (spec.md §5 "concurrent `Start` invocations ... are
/// serialized by the actor-message discipline"), so a round always runs
/// to completion (or is abandoned on the caller's own timeout, see
/// `call`'s behavior in `transport.rs`) before the next request begins.
pub async fn run(mut proposer: Proposer, mut mailbox: Mailbox) {
    info!("[proposer={}] started", proposer.node_id);

    while let Some(Envelope { request, reply_to }) = mailbox.recv().await {
        match request {
            AgentRequest::ProposerStart(StartRequest { value, retry }) => {
                let outcome = if retry {
                    proposer.start(value).await
                } else {
                    proposer.start_once(value).await
                };
                send_reply(reply_to, AgentReply::Outcome(outcome));
            }
            AgentRequest::ProposerGetId => {
                send_reply(reply_to, AgentReply::ProposerId(proposer.get_id()));
            }
            other => {
                debug!(
                    "[proposer={}] ignoring unexpected request {:?}",
                    proposer.node_id, other
                );
            }
        }
    }

    info!("[proposer={}] stopped", proposer.node_id);
}

fn send_reply(reply_to: oneshot::Sender<AgentReply>, reply: AgentReply) {
    let _ = reply_to.send(reply);
}
