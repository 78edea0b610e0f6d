use phylo_core::{PhyloError, RngHandle};
use phylo_state::State;

use crate::operators::Proposal;

/// Scales every internal node height by a common factor.
///
/// The draw is the same `[factor, 1/factor]` uniform used for parameter
/// scaling. With `n` heights scaled the Jacobian contributes `n ln s` and the
/// asymmetric draw `-ln s` twice, leaving a Hastings term of `(n - 2) ln s`.
pub fn propose_tree_scale(
    state: &mut State,
    factor: f64,
    rng: &mut RngHandle,
) -> Result<Proposal, PhyloError> {
    let s = factor + rng.next_f64() * (1.0 / factor - factor);
    let tree = state.tree_mut();
    let leaf_count = tree.leaf_count();
    let node_count = tree.node_count();
    for node in leaf_count..node_count {
        let height = tree.height(node);
        tree.set_height(node, height * s);
    }
    // Shrinking can push an internal node below a leaf child with a fixed
    // (non-zero) sampling height.
    for node in 0..node_count {
        if let Some(parent) = tree.parent(node) {
            if tree.height(node) > tree.height(parent) {
                return Ok(Proposal::Invalid);
            }
        }
    }
    let scaled = (node_count - leaf_count) as f64;
    Ok(Proposal::Ratio((scaled - 2.0) * s.ln()))
}

/// Slides one internal node's height uniformly between its children and its
/// parent. The root is excluded; its height only moves under the tree scale.
pub fn propose_node_slide(state: &mut State, rng: &mut RngHandle) -> Result<Proposal, PhyloError> {
    let tree = state.tree_mut();
    let candidates: Vec<usize> = (tree.leaf_count()..tree.node_count())
        .filter(|&node| node != tree.root())
        .collect();
    if candidates.is_empty() {
        return Ok(Proposal::Invalid);
    }
    let node = candidates[rng.next_index(candidates.len())];
    let [left, right] = tree.children(node).expect("internal node has children");
    let lower = tree.height(left).max(tree.height(right));
    let upper = tree.height(tree.parent(node).expect("non-root node has a parent"));
    tree.set_height(node, lower + rng.next_f64() * (upper - lower));
    Ok(Proposal::Ratio(0.0))
}

/// Narrow exchange: swaps a random child of an internal node with that node's
/// sibling, a minimal topology change that keeps all heights fixed.
pub fn propose_narrow_exchange(
    state: &mut State,
    rng: &mut RngHandle,
) -> Result<Proposal, PhyloError> {
    let tree = state.tree_mut();
    let candidates: Vec<usize> = (tree.leaf_count()..tree.node_count())
        .filter(|&node| node != tree.root())
        .collect();
    if candidates.is_empty() {
        return Ok(Proposal::Invalid);
    }
    let node = candidates[rng.next_index(candidates.len())];
    let grandparent = tree.parent(node).expect("non-root node has a parent");
    let [gp_left, gp_right] = tree.children(grandparent).expect("internal node has children");
    let uncle = if gp_left == node { gp_right } else { gp_left };
    if tree.height(uncle) >= tree.height(node) {
        return Ok(Proposal::Invalid);
    }
    let [left, right] = tree.children(node).expect("internal node has children");
    let child = if rng.next_f64() < 0.5 { left } else { right };
    tree.replace_child(node, child, uncle)?;
    tree.replace_child(grandparent, uncle, child)?;
    Ok(Proposal::Ratio(0.0))
}
