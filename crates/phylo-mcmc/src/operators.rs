use phylo_core::{ErrorInfo, PhyloError, RngHandle};
use phylo_state::{ParamId, State};

use crate::checkpoint::OperatorRecord;
use crate::{moves_param, moves_tree};

/// Result of applying a move to the working copy of the state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Proposal {
    /// A legal proposal with its log Hastings ratio.
    Ratio(f64),
    /// The draw left the support of the target; rejected without evaluation.
    Invalid,
}

/// The move a given operator performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveKind {
    /// Multiplicative scaling of one parameter dimension.
    Scale {
        /// Parameter the move acts on.
        param: ParamId,
    },
    /// Symmetric additive walk on one parameter dimension.
    RandomWalk {
        /// Parameter the move acts on.
        param: ParamId,
    },
    /// Uniform scaling of all internal node heights.
    TreeScale,
    /// Height slide of a single non-root internal node.
    NodeSlide,
    /// Child/sibling swap around a random internal node.
    NarrowExchange,
}

/// A weighted, self-tuning proposal generator with acceptance bookkeeping.
#[derive(Debug, Clone)]
pub struct Operator {
    kind: MoveKind,
    weight: f64,
    tuning: f64,
    accepted: u64,
    rejected: u64,
}

/// Acceptance rate the tuning loop steers towards.
const TARGET_ACCEPTANCE: f64 = 0.234;

impl Operator {
    /// Scale operator on `param` with the given selection weight and initial
    /// scale factor in `(0, 1)`.
    pub fn scale(param: ParamId, weight: f64, factor: f64) -> Self {
        Self::new(MoveKind::Scale { param }, weight, factor)
    }

    /// Random-walk operator on `param` with the given window half-width.
    pub fn random_walk(param: ParamId, weight: f64, window: f64) -> Self {
        Self::new(MoveKind::RandomWalk { param }, weight, window)
    }

    /// Whole-tree height scaling operator.
    pub fn tree_scale(weight: f64, factor: f64) -> Self {
        Self::new(MoveKind::TreeScale, weight, factor)
    }

    /// Single-node height slide operator. Not tuned; the slide window is the
    /// full interval between the node's children and its parent.
    pub fn node_slide(weight: f64) -> Self {
        Self::new(MoveKind::NodeSlide, weight, 0.0)
    }

    /// Narrow-exchange topology operator.
    pub fn narrow_exchange(weight: f64) -> Self {
        Self::new(MoveKind::NarrowExchange, weight, 0.0)
    }

    fn new(kind: MoveKind, weight: f64, tuning: f64) -> Self {
        Self {
            kind,
            weight,
            tuning,
            accepted: 0,
            rejected: 0,
        }
    }

    /// Stable name used in traces, summaries and checkpoints.
    pub fn name(&self) -> String {
        match self.kind {
            MoveKind::Scale { param } => format!("scale:p{}", param.as_raw()),
            MoveKind::RandomWalk { param } => format!("walk:p{}", param.as_raw()),
            MoveKind::TreeScale => "tree-scale".to_string(),
            MoveKind::NodeSlide => "node-slide".to_string(),
            MoveKind::NarrowExchange => "narrow-exchange".to_string(),
        }
    }

    /// Selection weight relative to the other operators in the schedule.
    pub fn weight(&self) -> f64 {
        self.weight
    }

    /// Current tuning value (scale factor or window half-width).
    pub fn tuning(&self) -> f64 {
        self.tuning
    }

    /// Mutates the working copy of `state` and returns the proposal outcome.
    pub fn propose(
        &self,
        state: &mut State,
        rng: &mut RngHandle,
    ) -> Result<Proposal, PhyloError> {
        match self.kind {
            MoveKind::Scale { param } => {
                Ok(moves_param::propose_scale(state, param, self.tuning, rng))
            }
            MoveKind::RandomWalk { param } => {
                Ok(moves_param::propose_random_walk(state, param, self.tuning, rng))
            }
            MoveKind::TreeScale => moves_tree::propose_tree_scale(state, self.tuning, rng),
            MoveKind::NodeSlide => moves_tree::propose_node_slide(state, rng),
            MoveKind::NarrowExchange => moves_tree::propose_narrow_exchange(state, rng),
        }
    }

    /// Records an accepted proposal.
    pub fn accept(&mut self) {
        self.accepted += 1;
    }

    /// Records a rejected (or invalid) proposal.
    pub fn reject(&mut self) {
        self.rejected += 1;
    }

    /// Fraction of proposals accepted so far, or zero before any proposal.
    pub fn acceptance_rate(&self) -> f64 {
        let total = self.accepted + self.rejected;
        if total == 0 {
            0.0
        } else {
            self.accepted as f64 / total as f64
        }
    }

    /// Adjusts the tuning value towards the target acceptance rate using the
    /// observed acceptance probability of the latest proposal.
    ///
    /// The step size shrinks with proposal count so the adjustment vanishes
    /// asymptotically and the chain's stationary distribution is preserved.
    pub fn optimize(&mut self, log_alpha: f64) {
        let alpha = log_alpha.min(0.0).exp();
        let count = (self.accepted + self.rejected) as f64;
        let delta = (alpha - TARGET_ACCEPTANCE) / (2.0 + count).sqrt();
        match self.kind {
            MoveKind::Scale { .. } | MoveKind::TreeScale => {
                // Scale factors live in (0, 1); smaller means bolder draws, so
                // a too-high acceptance rate pushes the factor down.
                self.tuning = (self.tuning.ln() - delta).exp().clamp(1e-4, 0.999);
            }
            MoveKind::RandomWalk { .. } => {
                self.tuning = (self.tuning.ln() + delta).exp();
            }
            MoveKind::NodeSlide | MoveKind::NarrowExchange => {}
        }
    }

    /// Serializable snapshot of the operator's tuning and counters.
    pub fn to_record(&self) -> OperatorRecord {
        OperatorRecord {
            name: self.name(),
            tuning: self.tuning,
            accepted: self.accepted,
            rejected: self.rejected,
        }
    }

    /// Restores tuning and counters from a checkpoint record.
    pub fn apply_record(&mut self, record: &OperatorRecord) {
        self.tuning = record.tuning;
        self.accepted = record.accepted;
        self.rejected = record.rejected;
    }
}

/// Restores operator statistics from checkpoint records, matching by name.
pub fn restore_operator_records(
    operators: &mut [Operator],
    records: &[OperatorRecord],
) -> Result<(), PhyloError> {
    for operator in operators.iter_mut() {
        let name = operator.name();
        let record = records.iter().find(|r| r.name == name).ok_or_else(|| {
            PhyloError::State(
                ErrorInfo::new("operator-missing", "checkpoint has no record for operator")
                    .with_context("operator", name.clone())
                    .with_hint("resume with the same operator schedule the run started with"),
            )
        })?;
        operator.apply_record(record);
    }
    Ok(())
}

/// Picks an operator index with probability proportional to its weight.
pub fn choose_operator(operators: &[Operator], rng: &mut RngHandle) -> usize {
    let total: f64 = operators.iter().map(Operator::weight).sum();
    let mut draw = rng.next_f64() * total;
    for (index, operator) in operators.iter().enumerate() {
        draw -= operator.weight();
        if draw <= 0.0 {
            return index;
        }
    }
    operators.len() - 1
}
