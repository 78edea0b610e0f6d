//! Bounded, double-buffered numeric parameter store.

use phylo_core::errors::ErrorInfo;
use phylo_core::PhyloError;
use serde::{Deserialize, Serialize};

/// Stable handle for a parameter registered with a [`crate::State`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ParamId(usize);

impl ParamId {
    /// Creates a handle from its raw index.
    pub fn from_raw(raw: usize) -> Self {
        Self(raw)
    }

    /// Returns the raw index of the handle.
    pub fn as_raw(&self) -> usize {
        self.0
    }
}

/// Fixed-dimension vector of bounded scalars with a current and a stored
/// buffer.
///
/// `store` snapshots the current values; `restore` swaps the two buffers
/// back, which undoes any number of in-place mutations made since the last
/// `store` without touching the data. Bounds are inclusive and must hold
/// whenever a computation node reads the value; operators are expected to
/// check [`RealParameter::in_bounds`] before writing and report an invalid
/// proposal instead of writing an out-of-range value.
#[derive(Debug, Clone)]
pub struct RealParameter {
    name: String,
    values: Vec<f64>,
    stored: Vec<f64>,
    lower: f64,
    upper: f64,
    dirty: bool,
}

/// Equality covers the live values and bounds only. The stored buffer is
/// scratch whose content depends on the store/restore history, and `restore`
/// is a swap, so it must not participate in state comparisons.
impl PartialEq for RealParameter {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.values == other.values
            && self.lower == other.lower
            && self.upper == other.upper
    }
}

/// Serializable checkpoint record for one parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterRecord {
    /// Name the parameter was registered under.
    pub name: String,
    /// Current values at checkpoint time.
    pub values: Vec<f64>,
    /// Inclusive lower bound.
    pub lower: f64,
    /// Inclusive upper bound.
    pub upper: f64,
}

impl RealParameter {
    /// Creates a parameter, validating that every initial value is in bounds.
    pub fn new(
        name: impl Into<String>,
        values: Vec<f64>,
        lower: f64,
        upper: f64,
    ) -> Result<Self, PhyloError> {
        let name = name.into();
        if values.is_empty() {
            return Err(PhyloError::State(
                ErrorInfo::new("empty-parameter", "parameter must have at least one dimension")
                    .with_context("name", name),
            ));
        }
        if let Some(&value) = values.iter().find(|v| **v < lower || **v > upper) {
            return Err(PhyloError::State(
                ErrorInfo::new("initial-out-of-bounds", "initial value violates bounds")
                    .with_context("name", name)
                    .with_context("value", value.to_string())
                    .with_context("lower", lower.to_string())
                    .with_context("upper", upper.to_string()),
            ));
        }
        let stored = values.clone();
        Ok(Self {
            name,
            values,
            stored,
            lower,
            upper,
            dirty: false,
        })
    }

    /// Name the parameter was registered under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of scalar dimensions.
    pub fn dimension(&self) -> usize {
        self.values.len()
    }

    /// Current value of dimension `index`.
    pub fn value(&self, index: usize) -> f64 {
        self.values[index]
    }

    /// All current values.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Inclusive lower bound.
    pub fn lower(&self) -> f64 {
        self.lower
    }

    /// Inclusive upper bound.
    pub fn upper(&self) -> f64 {
        self.upper
    }

    /// True when `value` satisfies the bounds.
    pub fn in_bounds(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }

    /// Writes dimension `index` and marks the parameter dirty. The caller
    /// must have verified bounds; this is the fast path used by operators.
    pub fn set_value(&mut self, index: usize, value: f64) {
        debug_assert!(self.in_bounds(value), "operator wrote out-of-bounds value");
        self.values[index] = value;
        self.dirty = true;
    }

    /// Snapshots the current values into the stored buffer.
    pub fn store(&mut self) {
        self.stored.copy_from_slice(&self.values);
    }

    /// Swaps current and stored buffers, undoing all writes since `store`.
    pub fn restore(&mut self) {
        std::mem::swap(&mut self.values, &mut self.stored);
        self.dirty = false;
    }

    /// Keeps the current values and drops the snapshot.
    pub fn accept(&mut self) {
        self.dirty = false;
    }

    /// True when the parameter changed since the last accept/restore.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Forces the dirty flag, used by the full-recompute verification pass.
    pub fn set_dirty(&mut self, dirty: bool) {
        self.dirty = dirty;
    }

    /// Extracts a checkpoint record for the current values.
    pub fn to_record(&self) -> ParameterRecord {
        ParameterRecord {
            name: self.name.clone(),
            values: self.values.clone(),
            lower: self.lower,
            upper: self.upper,
        }
    }

    /// Reconstructs a parameter from a checkpoint record.
    pub fn from_record(record: &ParameterRecord) -> Result<Self, PhyloError> {
        Self::new(
            record.name.clone(),
            record.values.clone(),
            record.lower,
            record.upper,
        )
    }
}
