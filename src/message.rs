//! Wire schema for the messages exchanged between Proposers and Acceptors
//! (spec.md §6). The schema is "logical, not byte-exact" per the spec, so
//! these are plain `Serialize + Deserialize` Rust types rather than a
//! hand-rolled byte layout, matching the teacher's `message.rs` approach
//! of deriving `Serialize`/`Deserialize` on a small family of per-phase
//! structs. Unlike the teacher, there is no per-instance `instance` field
//! and no generic `T`: this is single-decree Paxos over a fixed `Value`
//! payload (spec.md §3).

use bytes::Bytes;
use serde_derive::{Deserialize, Serialize};

use crate::proposal_id::ProposalId;

/// An opaque application payload. The protocol only ever compares
/// values for equality and moves them around; it never inspects their
/// contents (spec.md §3). Backed by `bytes::Bytes` so that a `Value`
/// clones cheaply (refcounted) as it crosses actor mailboxes during a
/// round's Prepare/Commit multicast.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Value(pub Bytes);

impl Value {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Value(bytes.into())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value(Bytes::copy_from_slice(s.as_bytes()))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value(Bytes::from(s.into_bytes()))
    }
}

/// The `(ProposalId, Value)` pair an Acceptor has accepted, if any.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptedPair {
    pub id: ProposalId,
    pub value: Value,
}

/// Phase 1a: sent by a Proposer to every Acceptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prepare {
    pub proposal_id: ProposalId,
}

/// Phase 2a: sent by a Proposer to every Acceptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Commit {
    pub proposal_id: ProposalId,
    pub value: Value,
}

/// Phase 1b: an Acceptor's reply to `Prepare`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Promise {
    pub proposal_id: ProposalId,
    /// Present when the Acceptor had previously accepted a value
    /// (spec.md §4.1 Case C).
    pub accepted: Option<AcceptedPair>,
}

/// Phase 2b: an Acceptor's reply to `Commit` when it accepts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Accepted {
    pub proposal_id: ProposalId,
    pub value: Value,
}

/// An Acceptor's refusal, in either phase. Encoded as a tag distinct
/// from `Accepted`/`Promise` per spec.md §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decline;

/// The request an Acceptor actor receives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AcceptorRequest {
    Prepare(Prepare),
    Commit(Commit),
}

/// The reply an Acceptor actor sends back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AcceptorReply {
    Promise(Promise),
    Accepted(Accepted),
    Decline(Decline),
}

/// The request a Proposer actor's round entry points accept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartRequest {
    pub value: Value,
    /// When `false`, run a single round and never retry (`StartOnce`).
    pub retry: bool,
}
