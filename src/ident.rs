//! Stable per-node identifier derivation, used for leader comparison
//! (spec.md §4.3, §9 "Global identifiers").
//!
//! The id is a stable hash of the hostname component of a node name
//! (the part before `@`, mirroring how the original system names
//! processes), so that which node wins an election does not trivially
//! correlate with a numeric suffix. A simpler scheme — raw lexicographic
//! comparison of the node name — is total and stable too, and the spec
//! explicitly allows it (§9); we keep the hostname-hash scheme as the
//! primary implementation since it is fully specified.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Derives the stable identifier used to compare nodes during election.
///
/// Hashes only the hostname component of `node_name` (everything before
/// the first `@`, or the whole name if there is no `@`), so that
/// `node_name` can carry an instance suffix (`paxos1@host`) without that
/// suffix influencing who wins.
pub fn node_identity(node_name: &str) -> String {
    let hostname = node_name.split('@').next().unwrap_or(node_name);
    let mut hasher = DefaultHasher::new();
    hostname.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ignores_suffix_after_at() {
        assert_eq!(node_identity("paxos1@host-a"), node_identity("paxos1@host-b"));
    }

    #[test]
    fn distinct_hostnames_give_distinct_ids() {
        assert_ne!(node_identity("paxos1"), node_identity("paxos2"));
    }

    #[test]
    fn stable_across_calls() {
        assert_eq!(node_identity("paxos3"), node_identity("paxos3"));
    }
}
