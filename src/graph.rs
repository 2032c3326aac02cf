//! Shared node arena for one traced computation, and the operations that grow it.
//! Every operation allocates a new node, records the partial derivative of the result
//! with respect to each operand, and registers itself as a child of its operands.

use std::cell::RefCell;

use tracing::trace;

use crate::{
    error::{GraphError, Result},
    node::{Node, NodeId, Op},
    order::{topological_order, Direction},
};

#[derive(Default, Debug)]
pub struct Graph {
    pub(crate) nodes: RefCell<Vec<Node>>,
}

/// A handle to a node in a [`Graph`]. Cheap to copy; all state lives in the graph.
#[derive(Copy, Clone)]
pub struct Var<'a> {
    pub(crate) graph: &'a Graph,
    pub(crate) idx: NodeId,
}

/// An operand of a graph operation: either an existing node or a raw scalar,
/// which is promoted to a fresh input node when used.
#[derive(Copy, Clone, Debug)]
pub enum Operand<'a> {
    Var(Var<'a>),
    Scalar(f64),
}

impl<'a> From<Var<'a>> for Operand<'a> {
    fn from(value: Var<'a>) -> Self {
        Self::Var(value)
    }
}

impl<'a> From<&Var<'a>> for Operand<'a> {
    fn from(value: &Var<'a>) -> Self {
        Self::Var(*value)
    }
}

impl From<f64> for Operand<'_> {
    fn from(value: f64) -> Self {
        Self::Scalar(value)
    }
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            nodes: RefCell::new(Vec::with_capacity(capacity)),
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.borrow().is_empty()
    }

    /// Creates an input node with no parents.
    pub fn input(&self, value: f64) -> Var<'_> {
        self.push(Node::input(value))
    }

    fn push(&self, node: Node) -> Var<'_> {
        let mut nodes = self.nodes.borrow_mut();
        let idx = NodeId(nodes.len() as u32);
        trace!(node = %idx, op = %node.op, value = node.value, "new node");
        // A repeated operand is consumed twice, so it lists the child twice.
        for parent in &node.parents {
            nodes[parent.index()].children.push(idx);
        }
        nodes.push(node);
        Var { graph: self, idx }
    }

    /// Turns an operand into a node of this graph. Raw scalars always become a new input node.
    fn coerce<'a>(&'a self, operand: impl Into<Operand<'a>>) -> (NodeId, f64) {
        match operand.into() {
            Operand::Var(var) => {
                assert!(
                    std::ptr::eq(var.graph, self),
                    "operand {} belongs to a different graph",
                    var.idx
                );
                (var.idx, var.value())
            }
            Operand::Scalar(value) => (self.input(value).idx, value),
        }
    }

    fn binary<'a>(
        &'a self,
        op: Op,
        lhs: impl Into<Operand<'a>>,
        rhs: impl Into<Operand<'a>>,
        f: impl FnOnce(f64, f64) -> (f64, f64, f64),
    ) -> Var<'a> {
        let (x, xv) = self.coerce(lhs);
        let (y, yv) = self.coerce(rhs);
        let (value, dx, dy) = f(xv, yv);
        self.push(Node::with_parents(value, op, &[(x, dx), (y, dy)]))
    }

    fn unary<'a>(
        &'a self,
        op: Op,
        operand: impl Into<Operand<'a>>,
        f: impl FnOnce(f64) -> (f64, f64),
    ) -> Var<'a> {
        let (x, xv) = self.coerce(operand);
        let (value, dx) = f(xv);
        self.push(Node::with_parents(value, op, &[(x, dx)]))
    }

    pub fn add<'a>(&'a self, lhs: impl Into<Operand<'a>>, rhs: impl Into<Operand<'a>>) -> Var<'a> {
        self.binary(Op::Add, lhs, rhs, |x, y| (x + y, 1., 1.))
    }

    pub fn sub<'a>(&'a self, lhs: impl Into<Operand<'a>>, rhs: impl Into<Operand<'a>>) -> Var<'a> {
        self.binary(Op::Sub, lhs, rhs, |x, y| (x - y, 1., -1.))
    }

    pub fn mul<'a>(&'a self, lhs: impl Into<Operand<'a>>, rhs: impl Into<Operand<'a>>) -> Var<'a> {
        self.binary(Op::Mul, lhs, rhs, |x, y| (x * y, y, x))
    }

    pub fn div<'a>(&'a self, lhs: impl Into<Operand<'a>>, rhs: impl Into<Operand<'a>>) -> Var<'a> {
        self.binary(Op::Div, lhs, rhs, |x, y| (x / y, 1. / y, -x / (y * y)))
    }

    /// `base ^ exponent`. With a constant base this is the exponential `b^x`,
    /// whose derivative is `b^x * ln(b)`.
    pub fn pow<'a>(
        &'a self,
        base: impl Into<Operand<'a>>,
        exponent: impl Into<Operand<'a>>,
    ) -> Var<'a> {
        self.binary(Op::Pow, base, exponent, |x, y| {
            let value = x.powf(y);
            (value, y * x.powf(y - 1.), value * x.ln())
        })
    }

    /// Natural logarithm.
    pub fn log<'a>(&'a self, operand: impl Into<Operand<'a>>) -> Var<'a> {
        self.unary(Op::Log, operand, |x| (x.ln(), 1. / x))
    }

    /// Logarithm of `operand` in `base`, differentiable in both.
    pub fn log_base<'a>(
        &'a self,
        operand: impl Into<Operand<'a>>,
        base: impl Into<Operand<'a>>,
    ) -> Var<'a> {
        self.binary(Op::Log, operand, base, |x, b| {
            let ln_b = b.ln();
            (x.ln() / ln_b, 1. / (x * ln_b), -x.ln() / (b * ln_b * ln_b))
        })
    }

    /// `e^x`, recorded as a power with a promoted `e` base.
    pub fn exp<'a>(&'a self, operand: impl Into<Operand<'a>>) -> Var<'a> {
        self.pow(std::f64::consts::E, operand)
    }

    pub fn sin<'a>(&'a self, operand: impl Into<Operand<'a>>) -> Var<'a> {
        self.unary(Op::Sin, operand, |x| (x.sin(), x.cos()))
    }

    pub fn cos<'a>(&'a self, operand: impl Into<Operand<'a>>) -> Var<'a> {
        self.unary(Op::Cos, operand, |x| (x.cos(), -x.sin()))
    }

    /// Negation, recorded as multiplication by a constant `-1`.
    pub fn neg<'a>(&'a self, operand: impl Into<Operand<'a>>) -> Var<'a> {
        self.mul(operand, -1.)
    }

    /// Resets every accumulated gradient to unset.
    pub fn clear_grads(&self) {
        for node in self.nodes.borrow_mut().iter_mut() {
            node.grad = None;
        }
    }

    /// Linearizes the sub-graph reachable from `root` along `direction`. The root comes first.
    pub fn topological_order<'a>(
        &'a self,
        root: Var<'a>,
        direction: Direction,
    ) -> Result<Vec<Var<'a>>> {
        self.check(root)?;
        let nodes = self.nodes.borrow();
        Ok(topological_order(&nodes, root.idx, direction)
            .into_iter()
            .map(|idx| Var { graph: self, idx })
            .collect())
    }

    pub(crate) fn check(&self, var: Var) -> Result<()> {
        if std::ptr::eq(var.graph, self) {
            Ok(())
        } else {
            Err(GraphError::ForeignNode(var.idx))
        }
    }

    fn var(&self, idx: NodeId) -> Var<'_> {
        Var { graph: self, idx }
    }
}

impl<'a> Var<'a> {
    pub fn id(&self) -> NodeId {
        self.idx
    }

    pub fn graph(&self) -> &'a Graph {
        self.graph
    }

    pub fn value(&self) -> f64 {
        self.graph.nodes.borrow()[self.idx.index()].value
    }

    /// The gradient written by the last differentiation pass, or `None` if that pass
    /// did not reach this node.
    pub fn grad(&self) -> Option<f64> {
        self.graph.nodes.borrow()[self.idx.index()].grad
    }

    pub fn op(&self) -> Op {
        self.graph.nodes.borrow()[self.idx.index()].op
    }

    pub fn parents(&self) -> Vec<Var<'a>> {
        let nodes = self.graph.nodes.borrow();
        nodes[self.idx.index()]
            .parents
            .iter()
            .map(|idx| self.graph.var(*idx))
            .collect()
    }

    pub fn children(&self) -> Vec<Var<'a>> {
        let nodes = self.graph.nodes.borrow();
        nodes[self.idx.index()]
            .children
            .iter()
            .map(|idx| self.graph.var(*idx))
            .collect()
    }

    /// Partial derivative of this node with respect to `parent`, fixed when this node was built.
    pub fn local_grad(&self, parent: Var) -> Result<f64> {
        self.graph.check(parent)?;
        self.graph.nodes.borrow()[self.idx.index()].local_grad(self.idx, parent.idx)
    }

    pub fn add(self, rhs: impl Into<Operand<'a>>) -> Self {
        self.graph.add(self, rhs)
    }

    pub fn sub(self, rhs: impl Into<Operand<'a>>) -> Self {
        self.graph.sub(self, rhs)
    }

    pub fn mul(self, rhs: impl Into<Operand<'a>>) -> Self {
        self.graph.mul(self, rhs)
    }

    pub fn div(self, rhs: impl Into<Operand<'a>>) -> Self {
        self.graph.div(self, rhs)
    }

    pub fn pow(self, exponent: impl Into<Operand<'a>>) -> Self {
        self.graph.pow(self, exponent)
    }

    pub fn ln(self) -> Self {
        self.graph.log(self)
    }

    pub fn log(self, base: impl Into<Operand<'a>>) -> Self {
        self.graph.log_base(self, base)
    }

    pub fn exp(self) -> Self {
        self.graph.exp(self)
    }

    pub fn sin(self) -> Self {
        self.graph.sin(self)
    }

    pub fn cos(self) -> Self {
        self.graph.cos(self)
    }

    pub fn neg(self) -> Self {
        self.graph.neg(self)
    }
}

impl std::fmt::Debug for Var<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let nodes = self.graph.nodes.borrow();
        let node = &nodes[self.idx.index()];
        f.debug_struct("Var")
            .field("id", &self.idx)
            .field("op", &node.op)
            .field("value", &node.value)
            .field("grad", &node.grad)
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn scalar_operands_are_promoted() {
        let graph = Graph::new();
        let x = graph.input(3.);
        let y = graph.mul(2., x);
        assert_eq!(y.value(), 6.);
        assert_eq!(graph.len(), 3);
        let parents = y.parents();
        assert_eq!(parents[0].op(), Op::Input);
        assert_eq!(parents[0].value(), 2.);
        assert_eq!(parents[1].id(), x.id());
    }

    #[test]
    fn equal_scalars_are_distinct_nodes() {
        let graph = Graph::new();
        let y = graph.add(1., 1.);
        let parents = y.parents();
        assert_ne!(parents[0].id(), parents[1].id());
        assert_eq!(y.local_grad(parents[0]), Ok(1.));
        assert_eq!(y.local_grad(parents[1]), Ok(1.));
    }

    #[test]
    fn children_are_registered() {
        let graph = Graph::new();
        let x = graph.input(2.);
        let a = x.sin();
        let b = x.add(x);
        let children: Vec<_> = x.children().iter().map(|c| c.id()).collect();
        assert_eq!(children, vec![a.id(), b.id(), b.id()]);
        assert_eq!(b.local_grad(x), Ok(2.));
    }

    #[test]
    fn neg_is_mul_by_minus_one() {
        let graph = Graph::new();
        let x = graph.input(4.);
        let y = x.neg();
        assert_eq!(y.op(), Op::Mul);
        assert_eq!(y.value(), -4.);
        assert_eq!(y.local_grad(x), Ok(-1.));
    }

    #[test]
    fn div_partials() {
        let graph = Graph::new();
        let x = graph.input(3.);
        let y = graph.input(4.);
        let z = x.div(y);
        assert_eq!(z.local_grad(x), Ok(0.25));
        assert_eq!(z.local_grad(y), Ok(-3. / 16.));
    }

    #[test]
    fn log_of_negative_is_nan() {
        let graph = Graph::new();
        let y = graph.log(-1.);
        assert!(y.value().is_nan());
        let z = graph.div(1., 0.);
        assert_eq!(z.value(), f64::INFINITY);
    }

    #[test]
    fn local_grad_of_non_parent() {
        let graph = Graph::new();
        let x = graph.input(1.);
        let other = graph.input(2.);
        let y = x.cos();
        assert_eq!(
            y.local_grad(other),
            Err(GraphError::MissingEdge {
                node: y.id(),
                parent: other.id()
            })
        );
    }

    #[test]
    fn foreign_node() {
        let graph = Graph::new();
        let other = Graph::new();
        let x = graph.input(1.);
        let y = other.input(1.);
        assert_eq!(
            graph.topological_order(y, Direction::Forward).unwrap_err(),
            GraphError::ForeignNode(y.id())
        );
        assert_eq!(x.local_grad(y), Err(GraphError::ForeignNode(y.id())));
        assert_eq!(graph.backward(y), Err(GraphError::ForeignNode(y.id())));
    }

    #[test]
    #[should_panic(expected = "belongs to a different graph")]
    fn foreign_operand_panics() {
        let graph = Graph::new();
        let other = Graph::new();
        let x = graph.input(1.);
        let y = other.input(2.);
        graph.add(x, y);
    }
}
