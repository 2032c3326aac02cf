use std::{collections::HashMap, fmt::Display};

use crate::error::{GraphError, Result};

/// Index of a node in its graph's arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The primitive that produced a node. Descriptive only; traversals never look at it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Op {
    Input,
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Log,
    Sin,
    Cos,
}

impl Op {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Add => "add",
            Self::Sub => "sub",
            Self::Mul => "mul",
            Self::Div => "div",
            Self::Pow => "pow",
            Self::Log => "log",
            Self::Sin => "sin",
            Self::Cos => "cos",
        }
    }
}

impl Display for Op {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One recorded scalar value together with the operation and operands that produced it.
#[derive(Clone, Debug)]
pub(crate) struct Node {
    pub(crate) value: f64,
    /// Operands in call order. The same parent appears twice for `x + x`.
    pub(crate) parents: Vec<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) op: Op,
    /// d(self)/d(parent), keyed by parent identity. A repeated operand holds the sum
    /// of its partials.
    pub(crate) local_grads: HashMap<NodeId, f64>,
    /// `None` until a differentiation pass visits this node.
    pub(crate) grad: Option<f64>,
}

impl Node {
    pub(crate) fn input(value: f64) -> Self {
        Self {
            value,
            parents: vec![],
            children: vec![],
            op: Op::Input,
            local_grads: HashMap::new(),
            grad: None,
        }
    }

    /// Builds an operation node from `(parent, partial)` pairs.
    pub(crate) fn with_parents(value: f64, op: Op, edges: &[(NodeId, f64)]) -> Self {
        let mut local_grads = HashMap::with_capacity(edges.len());
        for &(parent, partial) in edges {
            *local_grads.entry(parent).or_insert(0.) += partial;
        }
        Self {
            value,
            parents: edges.iter().map(|(parent, _)| *parent).collect(),
            children: vec![],
            op,
            local_grads,
            grad: None,
        }
    }

    /// Parents with duplicates removed, first occurrence order preserved.
    pub(crate) fn distinct_parents(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.parents
            .iter()
            .enumerate()
            .filter(|&(i, parent)| !self.parents[..i].contains(parent))
            .map(|(_, parent)| *parent)
    }

    pub(crate) fn local_grad(&self, this: NodeId, parent: NodeId) -> Result<f64> {
        self.local_grads
            .get(&parent)
            .copied()
            .ok_or(GraphError::MissingEdge { node: this, parent })
    }

    /// Adds a term to the accumulated gradient, initializing it on first write.
    pub(crate) fn accumulate(&mut self, term: f64) {
        self.grad = Some(self.grad.unwrap_or(0.) + term);
    }
}
