//! Proposal-identifier arithmetic and ordering.
//!
//! A `ProposalId` totally orders the proposal attempts made by every
//! Proposer in the cluster. Ordering is first by `sequence`, then by
//! `origin` so that two proposers that happen to read the clock in the
//! same nanosecond still produce distinct, comparable ids.

use std::cmp::Ordering;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_derive::{Deserialize, Serialize};

/// Total-ordered identifier of a single proposal attempt.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProposalId {
    pub sequence: u64,
    pub origin: String,
}

impl ProposalId {
    pub fn empty() -> ProposalId {
        ProposalId {
            sequence: 0,
            origin: String::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sequence == 0 && self.origin.is_empty()
    }
}

impl Default for ProposalId {
    fn default() -> Self {
        ProposalId::empty()
    }
}

impl PartialOrd for ProposalId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ProposalId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sequence
            .cmp(&other.sequence)
            .then_with(|| self.origin.cmp(&other.origin))
    }
}

/// Mints strictly-increasing `ProposalId`s for a single Proposer.
///
/// `sequence` is drawn from the nanosecond wall clock, which is a
/// sufficiently fine-grained monotone source under the single-leader
/// assumption (spec.md §3). If two calls land on the same nanosecond
/// (or the clock regresses), the sequence is bumped by one past the
/// last issued value so that the "each new round is strictly greater
/// than any previously issued" contract always holds.
pub struct ProposalIdGenerator {
    origin: String,
    last: u64,
}

impl ProposalIdGenerator {
    pub fn new(origin: impl Into<String>) -> Self {
        ProposalIdGenerator {
            origin: origin.into(),
            last: 0,
        }
    }

    /// Produces a fresh id strictly greater than any this generator has
    /// issued before.
    pub fn next(&mut self) -> ProposalId {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock is before the unix epoch")
            .as_nanos() as u64;

        self.last = std::cmp::max(now, self.last + 1);

        ProposalId {
            sequence: self.last,
            origin: self.origin.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_is_less_than_any_real_id() {
        let id = ProposalId {
            sequence: 1,
            origin: String::new(),
        };
        assert!(ProposalId::empty() < id);
        assert!(ProposalId::empty().is_empty());
    }

    #[test]
    fn equal_sequence_breaks_tie_on_origin() {
        let a = ProposalId {
            sequence: 5,
            origin: "paxos1".to_string(),
        };
        let b = ProposalId {
            sequence: 5,
            origin: "paxos2".to_string(),
        };
        assert!(a < b);
    }

    #[test]
    fn generator_produces_strictly_increasing_ids() {
        let mut gen = ProposalIdGenerator::new("paxos1");
        let mut prev = ProposalId::empty();
        for _ in 0..100 {
            let next = gen.next();
            assert!(next > prev, "{:?} should be greater than {:?}", next, prev);
            prev = next;
        }
    }

    #[test]
    fn generator_is_monotone_even_under_identical_clock_reads() {
        // Simulate a clock that doesn't advance between calls by calling
        // next() in a tight loop; `last` bumping guarantees monotonicity
        // regardless of OS clock resolution.
        let mut gen = ProposalIdGenerator::new("p");
        let a = gen.next();
        let b = gen.next();
        assert!(b > a);
    }
}
