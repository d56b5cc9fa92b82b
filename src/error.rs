//! Error kinds surfaced by the consensus core (spec.md §7).

use thiserror::Error;

/// The error kinds a `RoundOutcome` (see [`crate::outcome::RoundOutcome`])
/// can carry. These are exactly the kinds enumerated in spec.md §7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PaxosErrorKind {
    /// Fewer than `minQuorum` reachable peers at Phase 1. Not retried by
    /// the Proposer: retrying cannot help until topology changes.
    #[error("prepare_nodes_below_min_quorum")]
    PrepareNodesBelowMinQuorum,

    /// Phase 1 lacked majority promises. Retried within budget.
    #[error("prepare_consensus_not_reached")]
    PrepareConsensusNotReached,

    /// Phase 2 lacked majority accepts. Retried within budget.
    #[error("commit_declined")]
    CommitDeclined,

    /// The caller's own deadline (retry budget) elapsed.
    #[error("timeout")]
    Timeout,

    /// Unexpected transport or actor failure.
    #[error("catch_all")]
    CatchAll,
}

impl PaxosErrorKind {
    /// Whether the Proposer's retry loop should attempt another round
    /// after this outcome (spec.md §4.2 "Retry policy").
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PaxosErrorKind::PrepareConsensusNotReached | PaxosErrorKind::CommitDeclined
        )
    }
}
