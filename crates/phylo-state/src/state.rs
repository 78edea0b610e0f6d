//! Transactional aggregate over all state nodes.

use phylo_core::errors::ErrorInfo;
use phylo_core::{digest_f64s, PhyloError, SchemaVersion};
use serde::{Deserialize, Serialize};

use crate::parameter::{ParamId, ParameterRecord, RealParameter};
use crate::tree::{Tree, TreeRecord};

/// Owns the tree and every numeric parameter and provides the
/// store/restore/accept protocol at iteration granularity.
///
/// Contract: for any operator, `propose(); restore();` leaves the aggregate
/// bit-for-bit identical to its value before the proposal, including
/// topology edits. Dirty flags are cleared on both accept and restore, so
/// downstream caches (which roll back their own buffers in lockstep) never
/// see a stale flag.
#[derive(Debug, Clone, PartialEq)]
pub struct State {
    tree: Tree,
    params: Vec<RealParameter>,
}

/// Keyed checkpoint records for a whole state, one record per state node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateRecords {
    /// Schema version of the record layout.
    pub schema: SchemaVersion,
    /// Tree topology and heights.
    pub tree: TreeRecord,
    /// Parameter records in registration (`ParamId`) order.
    pub params: Vec<ParameterRecord>,
}

impl State {
    /// Creates a state owning the given tree and no parameters yet.
    pub fn new(tree: Tree) -> Self {
        Self {
            tree,
            params: Vec::new(),
        }
    }

    /// Registers a parameter and returns its stable handle.
    pub fn add_param(&mut self, param: RealParameter) -> ParamId {
        let id = ParamId::from_raw(self.params.len());
        self.params.push(param);
        id
    }

    /// Looks up a parameter handle by name.
    pub fn param_id(&self, name: &str) -> Option<ParamId> {
        self.params
            .iter()
            .position(|p| p.name() == name)
            .map(ParamId::from_raw)
    }

    /// Immutable access to a parameter.
    pub fn param(&self, id: ParamId) -> &RealParameter {
        &self.params[id.as_raw()]
    }

    /// Mutable access to a parameter.
    pub fn param_mut(&mut self, id: ParamId) -> &mut RealParameter {
        &mut self.params[id.as_raw()]
    }

    /// Number of registered parameters.
    pub fn param_count(&self) -> usize {
        self.params.len()
    }

    /// Immutable access to the tree.
    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    /// Mutable access to the tree.
    pub fn tree_mut(&mut self) -> &mut Tree {
        &mut self.tree
    }

    /// Snapshots every state node. Called once at the start of an iteration.
    pub fn store(&mut self) {
        self.tree.store();
        for param in &mut self.params {
            param.store();
        }
    }

    /// Rolls every state node back to the last snapshot.
    pub fn restore(&mut self) {
        self.tree.restore();
        for param in &mut self.params {
            param.restore();
        }
    }

    /// Keeps the current values and clears all dirty flags.
    pub fn accept(&mut self) {
        self.tree.accept();
        for param in &mut self.params {
            param.accept();
        }
    }

    /// Forces or clears the dirty flag on every state node.
    pub fn set_everything_dirty(&mut self, dirty: bool) {
        self.tree.set_all_dirty(dirty);
        for param in &mut self.params {
            param.set_dirty(dirty);
        }
    }

    /// Checks the structural invariants on the current (accepted) values:
    /// bounds on every parameter and the height ordering on every edge.
    pub fn validate(&self) -> Result<(), PhyloError> {
        for param in &self.params {
            if let Some(&value) = param.values().iter().find(|v| !param.in_bounds(**v)) {
                return Err(PhyloError::State(
                    ErrorInfo::new("bounds-violation", "accepted value violates bounds")
                        .with_context("name", param.name())
                        .with_context("value", value.to_string()),
                ));
            }
        }
        self.tree.validate()
    }

    /// Deterministic digest over heights, topology and parameter values.
    /// Child slot order is included: it steers which child a topology move
    /// draws, so two states that differ only in slot order diverge.
    pub fn digest(&self) -> u64 {
        let tree = &self.tree;
        let heights = (0..tree.node_count()).map(|n| tree.height(n));
        let parents = (0..tree.node_count()).map(|n| match tree.parent(n) {
            Some(p) => p as f64,
            None => -1.0,
        });
        let slots = (0..tree.node_count()).flat_map(|n| match tree.children(n) {
            Some([a, b]) => [a as f64, b as f64],
            None => [-1.0, -1.0],
        });
        let values = self.params.iter().flat_map(|p| p.values().iter().copied());
        digest_f64s(heights.chain(parents).chain(slots).chain(values))
    }

    /// Extracts keyed checkpoint records for every state node.
    pub fn to_records(&self) -> StateRecords {
        StateRecords {
            schema: SchemaVersion::default(),
            tree: self.tree.to_record(),
            params: self.params.iter().map(|p| p.to_record()).collect(),
        }
    }

    /// Reconstructs a state from checkpoint records. Parameter order in the
    /// records defines the `ParamId` assignment, so handles taken against
    /// the original state remain valid after a resume.
    pub fn from_records(records: &StateRecords) -> Result<Self, PhyloError> {
        let tree = Tree::from_record(&records.tree)?;
        let mut state = Self::new(tree);
        for record in &records.params {
            state.add_param(RealParameter::from_record(record)?);
        }
        Ok(state)
    }
}
