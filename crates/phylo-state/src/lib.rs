#![deny(missing_docs)]

//! Transactional model state for the phylo MCMC engine: bounded numeric
//! parameters and a rooted time tree, each double-buffered so that a
//! rejected proposal rolls back by buffer swap rather than recomputation.

/// Bounded, double-buffered numeric parameters.
pub mod parameter;
/// Transactional aggregate and checkpoint record schema.
pub mod state;
/// Rooted binary tree state node.
pub mod tree;

pub use parameter::{ParamId, ParameterRecord, RealParameter};
pub use state::{State, StateRecords};
pub use tree::{Tree, TreeRecord, NO_NODE};
