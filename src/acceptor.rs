//! The Acceptor: Paxos's distributed memory (spec.md §4.1).
//!
//! Grounded on the teacher's `Acceptor<T>` in `multi_paxos.rs`
//! (`handle_preparation`/`handle_proposal`/`promise`/`accept`), collapsed
//! from a `HashMap<usize, AcceptorState<T>>` (one entry per Multi-Paxos
//! instance) down to a single `AcceptorState` for single-decree Paxos,
//! and with the teacher's Phase 2 `c_rnd >= rnd` single branch split into
//! the spec's explicit three-way `==`/`<`/`>` case analysis.

use log::{debug, info, trace};
use tokio::sync::oneshot;

use crate::message::{AcceptedPair, AcceptorReply, AcceptorRequest, Decline, Promise, Value};
use crate::proposal_id::ProposalId;
use crate::transport::{AgentReply, AgentRequest, Envelope, Mailbox};

/// `(highestPromise, highestAccepted)` per spec.md §3.
///
/// Invariants upheld by every transition below:
/// 1. `highest_accepted`'s id is always `<= highest_promise`.
/// 2. `highest_promise` never decreases.
/// 3. Once `highest_accepted` is non-empty, it is only replaced by a
///    pair with strictly greater id.
#[derive(Debug, Clone, Default)]
pub struct AcceptorState {
    highest_promise: ProposalId,
    highest_accepted: Option<AcceptedPair>,
}

impl AcceptorState {
    pub fn new() -> Self {
        AcceptorState::default()
    }

    pub fn highest_promise(&self) -> &ProposalId {
        &self.highest_promise
    }

    pub fn highest_accepted(&self) -> Option<&AcceptedPair> {
        self.highest_accepted.as_ref()
    }

    /// Phase 1 on `Prepare` (spec.md §4.1 Cases A/B/C).
    fn prepare(&mut self, proposal_id: ProposalId) -> AcceptorReply {
        if proposal_id <= self.highest_promise {
            // Case A.
            return AcceptorReply::Decline(Decline);
        }

        self.highest_promise = proposal_id.clone();

        match &self.highest_accepted {
            // Case B.
            None => AcceptorReply::Promise(Promise {
                proposal_id,
                accepted: None,
            }),
            // Case C.
            Some(accepted) => AcceptorReply::Promise(Promise {
                proposal_id,
                accepted: Some(accepted.clone()),
            }),
        }
    }

    /// Phase 2 on `Commit` (spec.md §4.1).
    fn commit(&mut self, proposal_id: ProposalId, value: Value) -> AcceptorReply {
        if proposal_id == self.highest_promise {
            self.highest_accepted = Some(AcceptedPair {
                id: proposal_id.clone(),
                value: value.clone(),
            });
            AcceptorReply::Accepted(crate::message::Accepted { proposal_id, value })
        } else {
            // Covers both proposal_id < highest_promise (an old commit)
            // and proposal_id > highest_promise (a stray commit without a
            // matching promise, which should not occur under a
            // well-behaved Proposer — see spec.md §9 Open Questions).
            AcceptorReply::Decline(Decline)
        }
    }
}

/// Runs one Acceptor's mailbox loop until its mailbox is closed (the
/// node is "stopped" in a test, or the transport is torn down).
pub async fn run(id: String, mut mailbox: Mailbox) {
    let mut state = AcceptorState::new();

    info!("[acceptor={}] started", id);

    while let Some(Envelope { request, reply_to }) = mailbox.recv().await {
        let reply = match request {
            AgentRequest::Acceptor(AcceptorRequest::Prepare(prepare)) => {
                trace!("[acceptor={}] received {:?}", id, prepare);
                let reply = state.prepare(prepare.proposal_id);
                debug!("[acceptor={}] sending {:?}", id, reply);
                reply
            }
            AgentRequest::Acceptor(AcceptorRequest::Commit(commit)) => {
                trace!("[acceptor={}] received {:?}", id, commit);
                let reply = state.commit(commit.proposal_id, commit.value);
                debug!("[acceptor={}] sending {:?}", id, reply);
                reply
            }
            other => {
                debug!("[acceptor={}] ignoring unexpected request {:?}", id, other);
                continue;
            }
        };

        send_reply(reply_to, AgentReply::Acceptor(reply));
    }

    info!("[acceptor={}] stopped", id);
}

fn send_reply(reply_to: oneshot::Sender<AgentReply>, reply: AgentReply) {
    // The caller may have timed out and dropped its receiver already;
    // that is not a bug in the Acceptor, so the send failure is ignored.
    let _ = reply_to.send(reply);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Accepted;

    fn pid(seq: u64, origin: &str) -> ProposalId {
        ProposalId {
            sequence: seq,
            origin: origin.to_string(),
        }
    }

    #[test]
    fn case_a_declines_non_increasing_prepare() {
        let mut state = AcceptorState::new();
        state.prepare(pid(5, "p1"));
        let reply = state.prepare(pid(3, "p1"));
        assert!(matches!(reply, AcceptorReply::Decline(_)));
        assert_eq!(state.highest_promise(), &pid(5, "p1"));
    }

    #[test]
    fn case_b_promises_with_no_history() {
        let mut state = AcceptorState::new();
        let reply = state.prepare(pid(1, "p1"));
        match reply {
            AcceptorReply::Promise(p) => {
                assert_eq!(p.proposal_id, pid(1, "p1"));
                assert!(p.accepted.is_none());
            }
            _ => panic!("expected Promise"),
        }
    }

    #[test]
    fn case_c_promises_with_history() {
        let mut state = AcceptorState::new();
        state.prepare(pid(1, "p1"));
        state.commit(pid(1, "p1"), Value::from("v1"));

        let reply = state.prepare(pid(2, "p2"));
        match reply {
            AcceptorReply::Promise(p) => {
                let accepted = p.accepted.expect("expected prior history");
                assert_eq!(accepted.id, pid(1, "p1"));
                assert_eq!(accepted.value, Value::from("v1"));
            }
            _ => panic!("expected Promise"),
        }
    }

    #[test]
    fn commit_matching_promise_is_accepted() {
        let mut state = AcceptorState::new();
        state.prepare(pid(1, "p1"));
        let reply = state.commit(pid(1, "p1"), Value::from("v1"));
        assert!(matches!(
            reply,
            AcceptorReply::Accepted(Accepted { .. })
        ));
        assert_eq!(state.highest_accepted().unwrap().value, Value::from("v1"));
    }

    #[test]
    fn commit_below_promise_is_declined_and_state_unchanged() {
        let mut state = AcceptorState::new();
        state.prepare(pid(5, "p1"));
        state.commit(pid(5, "p1"), Value::from("v1"));

        let reply = state.commit(pid(3, "p1"), Value::from("v2"));
        assert!(matches!(reply, AcceptorReply::Decline(_)));
        assert_eq!(state.highest_accepted().unwrap().value, Value::from("v1"));
    }

    #[test]
    fn commit_above_promise_is_defensively_declined() {
        // A stray commit without a matching promise (spec.md §9 Open
        // Questions): the defensive policy is Decline, state unchanged.
        let mut state = AcceptorState::new();
        state.prepare(pid(2, "p1"));
        let reply = state.commit(pid(5, "p1"), Value::from("v1"));
        assert!(matches!(reply, AcceptorReply::Decline(_)));
        assert!(state.highest_accepted().is_none());
    }

    #[test]
    fn replaying_an_accepted_commit_is_idempotent() {
        let mut state = AcceptorState::new();
        state.prepare(pid(1, "p1"));
        state.commit(pid(1, "p1"), Value::from("v1"));
        let reply = state.commit(pid(1, "p1"), Value::from("v1"));
        match reply {
            AcceptorReply::Accepted(a) => assert_eq!(a.value, Value::from("v1")),
            _ => panic!("expected Accepted"),
        }
    }
}
