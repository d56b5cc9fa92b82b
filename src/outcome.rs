//! `RoundOutcome`: the structured record returned to the caller of
//! `Proposer::start`/`start_once` and `Leader::start` (spec.md §3, §4.2).

use std::collections::HashSet;

use crate::error::PaxosErrorKind;
use crate::message::Value;
use crate::proposal_id::ProposalId;

/// The node name type used throughout the crate. A plain `String` alias
/// (rather than a newtype) matches the teacher's own preference for
/// using simple built-in types (`usize` ids, `Uuid`) over wrapper types
/// where a wrapper would add no behavior.
pub type NodeName = String;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoundStatus {
    Accepted,
    Declined,
    Error,
}

/// The record returned by a round attempt (spec.md §3 "RoundOutcome").
///
/// When `status == Accepted`, `round` and `value` are singletons and
/// equal across every Acceptor that accepted.
#[derive(Debug, Clone)]
pub struct RoundOutcome {
    pub status: RoundStatus,
    pub participants: HashSet<NodeName>,
    pub round: HashSet<ProposalId>,
    pub value: HashSet<Value>,
    pub declines: HashSet<NodeName>,
    pub error_kind: Option<PaxosErrorKind>,
}

impl RoundOutcome {
    pub fn accepted(round: ProposalId, value: Value, participants: HashSet<NodeName>, declines: HashSet<NodeName>) -> Self {
        let mut round_set = HashSet::new();
        round_set.insert(round);
        let mut value_set = HashSet::new();
        value_set.insert(value);
        RoundOutcome {
            status: RoundStatus::Accepted,
            participants,
            round: round_set,
            value: value_set,
            declines,
            error_kind: None,
        }
    }

    pub fn declined(round: ProposalId, declines: HashSet<NodeName>, error_kind: PaxosErrorKind) -> Self {
        let mut round_set = HashSet::new();
        round_set.insert(round);
        RoundOutcome {
            status: RoundStatus::Declined,
            participants: HashSet::new(),
            round: round_set,
            value: HashSet::new(),
            declines,
            error_kind: Some(error_kind),
        }
    }

    pub fn error(error_kind: PaxosErrorKind) -> Self {
        RoundOutcome {
            status: RoundStatus::Error,
            participants: HashSet::new(),
            round: HashSet::new(),
            value: HashSet::new(),
            declines: HashSet::new(),
            error_kind: Some(error_kind),
        }
    }

    /// Whether the Proposer's retry loop should attempt another round.
    pub fn is_retryable(&self) -> bool {
        self.status != RoundStatus::Accepted
            && self
                .error_kind
                .map(|k| k.is_retryable())
                .unwrap_or(false)
    }
}
