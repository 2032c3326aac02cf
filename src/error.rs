use thiserror::Error;

use crate::node::NodeId;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphError {
    /// A local gradient was requested for an edge that was never recorded.
    /// This can only happen if the graph bookkeeping is broken.
    #[error("node {node} has no recorded edge from parent {parent}")]
    MissingEdge { node: NodeId, parent: NodeId },
    #[error("node {0} does not belong to this graph")]
    ForeignNode(NodeId),
}

pub type Result<T> = std::result::Result<T, GraphError>;
