//! Topological linearization of the sub-graph reachable from a root.

use std::collections::HashSet;

use crate::node::{Node, NodeId};

/// Which edges a linearization follows away from the root.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Follow children: the root's descendants, each after all of its reachable parents.
    Forward,
    /// Follow parents: the root's ancestors, each after all of its reachable children.
    Reverse,
}

impl Direction {
    fn next<'a>(&self, node: &'a Node) -> &'a [NodeId] {
        match self {
            Self::Forward => &node.children,
            Self::Reverse => &node.parents,
        }
    }
}

/// Depth-first post-order from `root` along `direction`, reversed, so the root comes first.
///
/// Uses an explicit stack instead of recursion so long chains do not exhaust the call stack.
pub(crate) fn topological_order(nodes: &[Node], root: NodeId, direction: Direction) -> Vec<NodeId> {
    let mut ordering = vec![];
    let mut visited = HashSet::new();
    // (node, index of the next successor to visit)
    let mut stack = vec![(root, 0usize)];
    visited.insert(root);

    while let Some((idx, cursor)) = stack.last_mut() {
        let successors = direction.next(&nodes[idx.index()]);
        if let Some(&next) = successors.get(*cursor) {
            *cursor += 1;
            if visited.insert(next) {
                stack.push((next, 0));
            }
        } else {
            ordering.push(*idx);
            stack.pop();
        }
    }

    ordering.reverse();
    ordering
}
