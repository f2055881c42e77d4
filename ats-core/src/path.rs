//! Reduced hash tree extraction

use ats_types::{HashValue, ReducedHashTree};

use crate::merkle::{MerkleTree, NodeId};

/// Extract the reduced hash tree for the first node in pre-order whose node
/// hash equals `target`.
///
/// Entry 0 is the partial hash set of that node itself, each following
/// entry belongs to the next ancestor, and the last entry is the root's set.
/// Returns `None` when no node has that hash.
pub fn extract_path(tree: &MerkleTree, target: &HashValue) -> Option<ReducedHashTree> {
    let id = tree.find_by_hash(target)?;
    extract_path_for(tree, id)
}

/// Extract the reduced hash tree for a specific node
pub fn extract_path_for(tree: &MerkleTree, id: NodeId) -> Option<ReducedHashTree> {
    let chain = tree.ancestors(id)?;
    let levels = chain
        .into_iter()
        .map(|node| tree.partial_hash_set(node))
        .collect::<Option<Vec<_>>>()?;
    Some(ReducedHashTree::new(levels))
}
