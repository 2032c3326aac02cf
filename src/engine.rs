//! Forward (tangent) and reverse (adjoint) propagation over a linearized graph.

use tracing::{debug, trace};

use crate::{
    error::Result,
    graph::{Graph, Var},
    node::{Node, NodeId},
    order::{topological_order, Direction},
};

impl Graph {
    /// Forward mode: after this returns, every descendant of `root` holds d(node)/d(root).
    /// Nodes that do not depend on `root` are left unset.
    pub fn forward(&self, root: Var) -> Result<()> {
        self.check(root)?;
        let mut nodes = self.nodes.borrow_mut();
        let ordering = seed(&mut nodes, root.idx, Direction::Forward);
        debug!(
            root = %root.idx,
            direction = ?Direction::Forward,
            nodes = ordering.len(),
            "pass start"
        );

        for &idx in ordering.iter().skip(1) {
            let node = &nodes[idx.index()];
            let mut grad = 0.;
            for parent in node.distinct_parents() {
                // Parents that are not descendants of the root contribute nothing.
                if let Some(parent_grad) = nodes[parent.index()].grad {
                    grad += node.local_grad(idx, parent)? * parent_grad;
                }
            }
            trace!(node = %idx, op = %node.op, grad, "tangent");
            nodes[idx.index()].grad = Some(grad);
        }
        debug!(root = %root.idx, direction = ?Direction::Forward, "pass end");
        Ok(())
    }

    /// Reverse mode: after this returns, every ancestor of `root` holds d(root)/d(node).
    /// Nodes that `root` does not depend on are left unset.
    pub fn backward(&self, root: Var) -> Result<()> {
        self.check(root)?;
        let mut nodes = self.nodes.borrow_mut();
        let ordering = seed(&mut nodes, root.idx, Direction::Reverse);
        debug!(
            root = %root.idx,
            direction = ?Direction::Reverse,
            nodes = ordering.len(),
            "pass start"
        );

        for &idx in &ordering {
            let node = &nodes[idx.index()];
            // Every child in the ordering precedes this node, so its adjoint is complete.
            let Some(grad) = node.grad else {
                continue;
            };
            let terms = node
                .distinct_parents()
                .map(|parent| Ok((parent, grad * node.local_grad(idx, parent)?)))
                .collect::<Result<Vec<_>>>()?;
            trace!(node = %idx, op = %node.op, grad, "adjoint");
            for (parent, term) in terms {
                nodes[parent.index()].accumulate(term);
            }
        }
        debug!(root = %root.idx, direction = ?Direction::Reverse, "pass end");
        Ok(())
    }
}

/// Clears all gradients, sets the root's to 1 and linearizes from it.
fn seed(nodes: &mut [Node], root: NodeId, direction: Direction) -> Vec<NodeId> {
    for node in nodes.iter_mut() {
        node.grad = None;
    }
    nodes[root.index()].grad = Some(1.);
    topological_order(nodes, root, direction)
}

impl<'a> Var<'a> {
    /// Propagates tangents from this node to all of its descendants.
    pub fn forward(&self) -> Result<()> {
        self.graph.forward(*self)
    }

    /// Propagates adjoints from this node to all of its ancestors.
    pub fn backward(&self) -> Result<()> {
        self.graph.backward(*self)
    }
}

#[cfg(test)]
mod test {
    use crate::Graph;

    #[test]
    fn backward_mul() {
        let graph = Graph::new();
        let a = graph.input(2.);
        let b = graph.input(3.);
        let c = a.mul(b);
        c.backward().unwrap();
        assert_eq!(c.grad(), Some(1.));
        assert_eq!(a.grad(), Some(3.));
        assert_eq!(b.grad(), Some(2.));
    }

    #[test]
    fn forward_mul() {
        let graph = Graph::new();
        let a = graph.input(2.);
        let b = graph.input(3.);
        let c = a.mul(b);
        a.forward().unwrap();
        assert_eq!(a.grad(), Some(1.));
        assert_eq!(c.grad(), Some(3.));
        assert_eq!(b.grad(), None);
    }

    #[test]
    fn self_subtraction_cancels() {
        let graph = Graph::new();
        let x = graph.input(5.);
        let y = x.sub(x);
        y.backward().unwrap();
        assert_eq!(x.grad(), Some(0.));
        x.forward().unwrap();
        assert_eq!(y.grad(), Some(0.));
    }

    #[test]
    fn second_pass_forgets_the_first() {
        let graph = Graph::new();
        let x = graph.input(1.);
        let y = graph.input(2.);
        let a = x.sin();
        let b = y.cos();
        a.backward().unwrap();
        assert!(x.grad().is_some());
        b.backward().unwrap();
        assert_eq!(x.grad(), None);
        assert_eq!(a.grad(), None);
        assert!(y.grad().is_some());
    }
}
