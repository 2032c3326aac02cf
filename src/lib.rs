//! Scalar automatic differentiation over a traced computation graph.
//!
//! Operations on a [`Graph`] record every intermediate value together with the local
//! partial derivatives of each step. Afterwards, [`Graph::forward`] propagates tangents
//! from an input to its descendants and [`Graph::backward`] propagates adjoints from an
//! output to all of its ancestors.
//!
//! ```
//! use tracegrad::Graph;
//!
//! let graph = Graph::new();
//! let x1 = graph.input(2.);
//! let x2 = graph.input(5.);
//! let y = graph.sub(graph.add(x1.ln(), x1.mul(x2)), x2.sin());
//! y.backward().unwrap();
//! assert!((x1.grad().unwrap() - 5.5).abs() < 1e-12);
//! ```

mod engine;
pub mod error;
mod graph;
mod node;
#[cfg(feature = "ops")]
mod ops;
mod order;

pub use error::GraphError;
pub use graph::{Graph, Operand, Var};
pub use node::{NodeId, Op};
pub use order::Direction;
