//! Peer-set enumeration, excluding configured non-participant names
//! (spec.md §2 "Helper primitives", §6 "Node naming / filtering").

use std::collections::HashSet;

use crate::outcome::NodeName;

/// Returns the subset of `all_nodes` that participate in consensus,
/// i.e. everything not named in `excluded`. Order is preserved from
/// `all_nodes` so that callers relying on a stable iteration order (for
/// example, logging) see consistent output.
pub fn live_peers(all_nodes: &[NodeName], excluded: &[NodeName]) -> Vec<NodeName> {
    let excluded: HashSet<&str> = excluded.iter().map(String::as_str).collect();
    all_nodes
        .iter()
        .filter(|node| !excluded.contains(node.as_str()))
        .cloned()
        .collect()
}

/// The majority quorum size for a cluster of `peer_count` Acceptors:
/// `floor(n / 2) + 1` (spec.md §4.2 step 3, §8 "Quorum arithmetic").
pub fn quorum_size(peer_count: usize) -> usize {
    peer_count / 2 + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excludes_configured_names() {
        let all = vec!["paxos1".to_string(), "manager".to_string(), "paxos2".to_string()];
        let excluded = vec!["manager".to_string()];
        assert_eq!(live_peers(&all, &excluded), vec!["paxos1", "paxos2"]);
    }

    #[test]
    fn quorum_arithmetic_matches_spec_examples() {
        assert_eq!(quorum_size(3), 2);
        assert_eq!(quorum_size(4), 3);
        assert_eq!(quorum_size(5), 3);
        assert_eq!(quorum_size(1), 1);
    }
}
