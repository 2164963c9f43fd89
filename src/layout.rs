//! Tidy tree layout over the visible part of the hierarchy.
//!
//! Breadth (`x`): every visible leaf gets its own slot, in pre-order; a
//! parent sits midway between its first and last visible child. Slots are
//! spread evenly over the canvas height. Depth (`y`): level times the
//! configured depth spacing.

use crate::config::LayoutConfig;
use crate::hierarchy::Tree;

/// Lay out every node reachable through expanded nodes and return their
/// arena indices in pre-order. Hidden nodes keep their old coordinates.
pub(crate) fn layout(tree: &mut Tree, config: &LayoutConfig) -> Vec<usize> {
    let visible = visible_nodes(tree);

    // Post-order walk: (node, children already placed).
    let mut slots = vec![0.0f64; tree.len()];
    let mut next_leaf = 0usize;
    let mut stack = vec![(tree.root_index(), false)];
    while let Some((i, done)) = stack.pop() {
        let node = tree.node(i);
        let shown = node.expanded && node.has_children();
        if !shown {
            slots[i] = next_leaf as f64;
            next_leaf += 1;
        } else if done {
            let first = node.children[0];
            let last = node.children[node.children.len() - 1];
            slots[i] = (slots[first] + slots[last]) / 2.0;
        } else {
            stack.push((i, true));
            stack.extend(node.children.iter().rev().map(|&c| (c, false)));
        }
    }

    let leaves = next_leaf.max(1) as f64;
    let band = config.inner_height() / leaves;
    for &i in &visible {
        let node = tree.node_mut(i);
        node.x = (slots[i] + 0.5) * band;
        node.y = node.depth as f64 * config.depth_spacing;
    }

    visible
}

/// Arena indices of visible nodes, pre-order.
pub(crate) fn visible_nodes(tree: &Tree) -> Vec<usize> {
    let mut out = Vec::new();
    let mut stack = vec![tree.root_index()];
    while let Some(i) = stack.pop() {
        out.push(i);
        let node = tree.node(i);
        if node.expanded {
            stack.extend(node.children.iter().rev());
        }
    }
    out
}
