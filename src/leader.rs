//! The Leader: elects a single Proposer to front client requests, so that
//! well-behaved clients don't drive two Proposers into a duelling
//! livelock (spec.md §4.3).
//!
//! The teacher has no equivalent actor — its `Client` talks to a
//! `Proposer` directly and accepts livelock as a known limitation (its
//! own comment: "In practice ... two or more processes may compete").
//! This module is new, grounded on the teacher's membership/addressing
//! conventions (`NetNode`'s peer table in `net_node.rs`) generalized to
//! the election rule spec.md §4.3 states explicitly: compare every live
//! peer's `GetId()` and adopt the lexicographically greatest.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::oneshot;

use crate::backoff::sleep_uniform;
use crate::config::PaxosConfig;
use crate::message::StartRequest;
use crate::outcome::{NodeName, RoundOutcome};
use crate::transport::{ActorKind, AgentReply, AgentRequest, Envelope, MembershipEvent, Mailbox, Target, Transport};

/// Per-node election state (spec.md §4.3 "LeaderState").
pub struct Leader {
    node_id: String,
    transport: Arc<dyn Transport>,
    proposer_nodes: Vec<NodeName>,
    config: PaxosConfig,
    current_leader: Option<NodeName>,
}

impl Leader {
    pub fn new(
        node_id: impl Into<String>,
        transport: Arc<dyn Transport>,
        proposer_nodes: Vec<NodeName>,
        config: PaxosConfig,
    ) -> Self {
        Leader {
            node_id: node_id.into(),
            transport,
            proposer_nodes,
            config,
            current_leader: None,
        }
    }

    fn proposer_target(node: &str) -> Target {
        Target::new(ActorKind::Proposer, node.to_string())
    }

    /// Queries every configured Proposer's `GetId()` and adopts the node
    /// whose id is lexicographically greatest as leader (spec.md §4.3
    /// "Election algorithm"). A Proposer that doesn't answer within
    /// `round_timeout` is treated as not a candidate. Ids only ever serve
    /// the comparison; `GetLeader`/routing always deal in the underlying
    /// `NodeName`, so the `(id, node)` pairing is kept together rather
    /// than collapsed to a bare set of ids.
    async fn elect(&mut self) -> Option<NodeName> {
        let mut candidates: BTreeSet<(String, NodeName)> = BTreeSet::new();

        for node in &self.proposer_nodes {
            let target = Self::proposer_target(node);
            let reply = self
                .transport
                .call(&target, AgentRequest::ProposerGetId, self.config.round_timeout())
                .await;
            match reply {
                Ok(AgentReply::ProposerId(id)) => {
                    candidates.insert((id, node.clone()));
                }
                Ok(other) => {
                    debug!(
                        "[leader={}] unexpected reply to GetId from {}: {:?}",
                        self.node_id, node, other
                    );
                }
                Err(err) => {
                    debug!("[leader={}] {} unreachable during election: {}", self.node_id, node, err);
                }
            }
        }

        let elected = candidates.into_iter().next_back().map(|(_, node)| node);
        match &elected {
            Some(node) => info!("[leader={}] elected {}", self.node_id, node),
            None => warn!("[leader={}] election found no reachable candidates", self.node_id),
        }
        self.current_leader = elected.clone();
        elected
    }

    /// `GetLeader()`: the currently elected node id, electing one first if
    /// none is known yet.
    async fn get_leader(&mut self) -> Option<NodeName> {
        if self.current_leader.is_none() {
            self.elect().await;
        }
        self.current_leader.clone()
    }

    /// `Start(value)`: forwards to the elected Proposer's `Start`,
    /// electing (or retrying election) if none is currently known
    /// (spec.md §4.3 "Client entry point").
    async fn start(&mut self, value: crate::message::Value) -> RoundOutcome {
        loop {
            let leader = match self.get_leader().await {
                Some(leader) => leader,
                None => {
                    sleep_uniform(Duration::from_millis(50), Duration::from_millis(200)).await;
                    continue;
                }
            };

            let target = Self::proposer_target(&leader);
            let result = self
                .transport
                .call(
                    &target,
                    AgentRequest::ProposerStart(StartRequest { value: value.clone(), retry: true }),
                    self.config.retry_budget(),
                )
                .await;

            match result {
                Ok(AgentReply::Outcome(outcome)) => return outcome,
                Ok(other) => {
                    warn!("[leader={}] unexpected reply from elected proposer: {:?}", self.node_id, other);
                    return RoundOutcome::error(crate::error::PaxosErrorKind::CatchAll);
                }
                Err(err) => {
                    warn!(
                        "[leader={}] elected proposer {} unreachable ({}), re-electing",
                        self.node_id, leader, err
                    );
                    self.current_leader = None;
                }
            }
        }
    }

    /// Handles a membership event (spec.md §4.3 "Re-election triggers"):
    /// re-elects immediately if the down node was the current leader,
    /// after settling for `leader_choose_delay` so a flapping node
    /// doesn't trigger back-to-back elections.
    async fn on_membership_event(&mut self, event: MembershipEvent) {
        match event {
            MembershipEvent::NodeDown(node) if self.current_leader.as_deref() == Some(node.as_str()) => {
                info!("[leader={}] current leader {} went down, re-electing", self.node_id, node);
                self.current_leader = None;
                tokio::time::sleep(self.config.leader_choose_delay()).await;
                self.elect().await;
            }
            MembershipEvent::NodeDown(node) => {
                debug!("[leader={}] {} down, not the current leader", self.node_id, node);
            }
            MembershipEvent::NodeUp(node) => {
                debug!("[leader={}] {} up", self.node_id, node);
            }
        }
    }
}

/// Runs a Leader's mailbox loop, interleaving client requests with
/// membership events on the same `select!` so election state is only
/// ever touched by one task (spec.md §5 "single owner of LeaderState").
pub async fn run(mut leader: Leader, mut mailbox: Mailbox) {
    info!("[leader={}] started", leader.node_id);
    let mut membership = leader.transport.subscribe_membership();

    loop {
        tokio::select! {
            maybe_envelope = mailbox.recv() => {
                let Envelope { request, reply_to } = match maybe_envelope {
                    Some(envelope) => envelope,
                    None => break,
                };
                match request {
                    AgentRequest::LeaderStart(StartRequest { value, .. }) => {
                        let outcome = leader.start(value).await;
                        send_reply(reply_to, AgentReply::Outcome(outcome));
                    }
                    AgentRequest::LeaderGetLeader => {
                        let current = leader.get_leader().await.unwrap_or_default();
                        send_reply(reply_to, AgentReply::Leader(current));
                    }
                    other => {
                        debug!("[leader={}] ignoring unexpected request {:?}", leader.node_id, other);
                    }
                }
            }
            event = membership.recv() => {
                match event {
                    Ok(event) => leader.on_membership_event(event).await,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    info!("[leader={}] stopped", leader.node_id);
}

fn send_reply(reply_to: oneshot::Sender<AgentReply>, reply: AgentReply) {
    let _ = reply_to.send(reply);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn election_prefers_lexicographically_greatest_id() {
        let mut candidates: BTreeSet<(String, String)> = BTreeSet::new();
        candidates.insert(("bbb".to_string(), "paxos2".to_string()));
        candidates.insert(("aaa".to_string(), "paxos1".to_string()));
        candidates.insert(("ccc".to_string(), "paxos3".to_string()));
        let elected = candidates.into_iter().next_back().map(|(_, node)| node);
        assert_eq!(elected, Some("paxos3".to_string()));
    }
}
