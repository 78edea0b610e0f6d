//! Felsenstein pruning engine with double-buffered caches and scaling.

use phylo_core::errors::ErrorInfo;
use phylo_core::PhyloError;
use phylo_state::{ParamId, State, Tree};

use crate::alignment::{Alignment, PatternClass};
use crate::sites::SiteModel;
use crate::subst::SubstModel;

/// Which inputs a scheduled partial computation combines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeCase {
    /// Both children are leaves with observed (or ambiguous) states.
    LeafLeaf,
    /// One leaf child, one child with a cached partial.
    LeafPartial,
    /// Both children carry cached partials.
    PartialPartial,
}

/// One pending partial computation: combine `left` and `right` into `parent`.
#[derive(Debug, Clone, Copy)]
struct Op {
    parent: usize,
    left: usize,
    right: usize,
    case: NodeCase,
}

/// Tree-structured dynamic program producing the per-site log-likelihood.
///
/// Every branch owns a transition-matrix cache and every internal node a
/// partial-likelihood cache, each with two fixed buffers and a one-bit
/// selector. A recomputation flips the selector once per iteration and
/// writes the fresh value into the newly selected buffer; `restore` copies
/// the remembered selector bits back, which undoes an arbitrary set of
/// recomputations in O(nodes) with no data movement. `accept` keeps the
/// bits as they are.
///
/// Work is scheduled lazily: a traversal records pending
/// `(child1, child2, parent, case)` operations only for nodes whose inputs
/// changed, and the batch runs immediately before the root value is read,
/// so a proposal that touches one branch recomputes only the path from that
/// branch to the root.
#[derive(Debug, Clone)]
pub struct TreeLikelihood {
    subst: SubstModel,
    sites: SiteModel,
    state_count: usize,
    pattern_count: usize,
    category_count: usize,
    leaf_count: usize,
    pattern_weights: Vec<f64>,
    pattern_classes: Vec<PatternClass>,
    // leaf_codes[leaf][pattern] = coded state
    leaf_codes: Vec<Vec<u8>>,
    use_scaling: bool,
    param_inputs: Vec<ParamId>,

    // Per-branch transition matrices, category-major `cat * k * k`.
    matrices: Vec<[Vec<f64>; 2]>,
    matrix_sel: Vec<u8>,
    stored_matrix_sel: Vec<u8>,
    // Per-internal-node partials, `(cat * patterns + pattern) * k`, and the
    // per-pattern log-scale accumulators that flip with them.
    partials: Vec<[Vec<f64>; 2]>,
    scale_logs: Vec<[Vec<f64>; 2]>,
    partial_sel: Vec<u8>,
    stored_partial_sel: Vec<u8>,
    // Flip-once guards for the current iteration.
    moved_matrix: Vec<bool>,
    moved_partial: Vec<bool>,

    cached: f64,
    stored_cached: f64,
    force_recalc: bool,
}

impl TreeLikelihood {
    /// Builds the engine for an alignment and the tree's leaf labeling.
    pub fn new(
        alignment: &Alignment,
        tree: &Tree,
        subst: SubstModel,
        sites: SiteModel,
        use_scaling: bool,
    ) -> Result<Self, PhyloError> {
        let state_count = subst.state_count();
        if state_count != alignment.state_count() {
            return Err(PhyloError::Likelihood(
                ErrorInfo::new("alphabet-mismatch", "model and alignment alphabets differ")
                    .with_context("model", state_count.to_string())
                    .with_context("alignment", alignment.state_count().to_string()),
            ));
        }
        let leaf_count = tree.leaf_count();
        let node_count = tree.node_count();
        let pattern_count = alignment.pattern_count();
        let category_count = sites.category_count();

        let mut leaf_codes = Vec::with_capacity(leaf_count);
        for leaf in 0..leaf_count {
            let taxon = alignment.taxon_index(tree.label(leaf)).ok_or_else(|| {
                PhyloError::Likelihood(
                    ErrorInfo::new("unknown-taxon", "tree leaf has no alignment row")
                        .with_context("label", tree.label(leaf)),
                )
            })?;
            leaf_codes.push((0..pattern_count).map(|p| alignment.code(p, taxon)).collect());
        }

        let matrix_len = category_count * state_count * state_count;
        let partial_len = category_count * pattern_count * state_count;
        let matrices = (0..node_count)
            .map(|_| [vec![0.0; matrix_len], vec![0.0; matrix_len]])
            .collect();
        let partials = (0..node_count)
            .map(|node| {
                if node < leaf_count {
                    [Vec::new(), Vec::new()]
                } else {
                    [vec![0.0; partial_len], vec![0.0; partial_len]]
                }
            })
            .collect();
        let scale_logs = (0..node_count)
            .map(|node| {
                if node < leaf_count {
                    [Vec::new(), Vec::new()]
                } else {
                    [vec![0.0; pattern_count], vec![0.0; pattern_count]]
                }
            })
            .collect();

        let mut param_inputs = subst.param_inputs();
        param_inputs.extend(sites.param_inputs());

        Ok(Self {
            subst,
            sites,
            state_count,
            pattern_count,
            category_count,
            leaf_count,
            pattern_weights: alignment.weights().iter().map(|&w| w as f64).collect(),
            pattern_classes: (0..pattern_count).map(|p| alignment.pattern_class(p)).collect(),
            leaf_codes,
            use_scaling,
            param_inputs,
            matrices,
            matrix_sel: vec![0; node_count],
            stored_matrix_sel: vec![0; node_count],
            partials,
            scale_logs,
            partial_sel: vec![0; node_count],
            stored_partial_sel: vec![0; node_count],
            moved_matrix: vec![false; node_count],
            moved_partial: vec![false; node_count],
            cached: f64::NAN,
            stored_cached: f64::NAN,
            force_recalc: true,
        })
    }

    /// Declared parameter inputs of the engine.
    pub fn param_inputs(&self) -> &[ParamId] {
        &self.param_inputs
    }

    /// True when the cached value can no longer be trusted.
    pub fn is_dirty(&self, state: &State) -> bool {
        self.force_recalc || state.tree().any_dirty() || self.params_dirty(state)
    }

    /// Forces the next evaluation to recompute every matrix and partial.
    pub fn make_dirty(&mut self) {
        self.force_recalc = true;
    }

    /// Remembers the current buffer selectors and cached value.
    pub fn store(&mut self) {
        self.stored_matrix_sel.copy_from_slice(&self.matrix_sel);
        self.stored_partial_sel.copy_from_slice(&self.partial_sel);
        self.stored_cached = self.cached;
        self.moved_matrix.iter_mut().for_each(|m| *m = false);
        self.moved_partial.iter_mut().for_each(|m| *m = false);
    }

    /// Flips every touched buffer selector back. O(1) per node, no data
    /// movement, no recomputation.
    pub fn restore(&mut self) {
        self.matrix_sel.copy_from_slice(&self.stored_matrix_sel);
        self.partial_sel.copy_from_slice(&self.stored_partial_sel);
        self.cached = self.stored_cached;
        self.moved_matrix.iter_mut().for_each(|m| *m = false);
        self.moved_partial.iter_mut().for_each(|m| *m = false);
        self.force_recalc = false;
    }

    /// Keeps the current buffers; the selector bits are already
    /// authoritative.
    pub fn accept(&mut self) {
        self.moved_matrix.iter_mut().for_each(|m| *m = false);
        self.moved_partial.iter_mut().for_each(|m| *m = false);
    }

    fn params_dirty(&self, state: &State) -> bool {
        self.param_inputs.iter().any(|&id| state.param(id).is_dirty())
    }

    /// Computes (or returns the cached) log-likelihood for the current
    /// state. Idempotent: a second call in the same iteration reuses the
    /// already flipped buffers and produces the identical value.
    pub fn log_likelihood(&mut self, state: &State) -> Result<f64, PhyloError> {
        let tree = state.tree();
        let full = self.force_recalc || self.params_dirty(state);
        if !full && !tree.any_dirty() {
            if self.cached.is_finite() {
                return Ok(self.cached);
            }
            return Err(non_finite_error(self.cached));
        }

        let order = tree.post_order();
        let root = tree.root();

        // Pass 1: branch matrices. The branch above `node` depends on the
        // node's own height and its parent's height.
        let mut update_matrix = vec![false; tree.node_count()];
        for &node in &order {
            if node == root {
                continue;
            }
            let parent = tree.parent(node).expect("non-root has a parent");
            update_matrix[node] =
                full || tree.is_node_dirty(node) || tree.is_node_dirty(parent);
        }

        // Pass 2: schedule partial recomputations bottom-up. A node is
        // re-enqueued when any child branch or child partial changed, which
        // re-derives exactly the path from an edit to the root.
        let mut update_partial = vec![false; tree.node_count()];
        let mut pending: Vec<Op> = Vec::new();
        for &node in &order {
            if tree.is_leaf(node) {
                continue;
            }
            let [left, right] = tree.children(node).expect("internal node");
            let need = full
                || tree.is_node_dirty(node)
                || update_matrix[left]
                || update_matrix[right]
                || update_partial[left]
                || update_partial[right];
            if need {
                update_partial[node] = true;
                let case = match (tree.is_leaf(left), tree.is_leaf(right)) {
                    (true, true) => NodeCase::LeafLeaf,
                    (false, false) => NodeCase::PartialPartial,
                    _ => NodeCase::LeafPartial,
                };
                pending.push(Op {
                    parent: node,
                    left,
                    right,
                    case,
                });
            }
        }

        for node in 0..tree.node_count() {
            if update_matrix[node] {
                self.fill_matrices(state, tree, node)?;
            }
        }
        for op in pending {
            self.compute_partials(op);
        }

        self.integrate_root(state, tree)
    }

    fn fill_matrices(&mut self, state: &State, tree: &Tree, node: usize) -> Result<(), PhyloError> {
        let length = tree.branch_length(node);
        if length < 0.0 {
            // Operators must have fast-rejected this before evaluation; a
            // negative branch here is a consistency bug, not a proposal.
            return Err(PhyloError::Tree(
                ErrorInfo::new("negative-branch-length", "evaluated a negative branch")
                    .with_context("node", node.to_string())
                    .with_context("length", length.to_string()),
            ));
        }
        if !self.moved_matrix[node] {
            self.matrix_sel[node] ^= 1;
            self.moved_matrix[node] = true;
        }
        let k = self.state_count;
        let sel = self.matrix_sel[node] as usize;
        let mut buffer = std::mem::take(&mut self.matrices[node][sel]);
        for cat in 0..self.category_count {
            let distance = length * self.sites.rate(cat, state);
            let block = &mut buffer[cat * k * k..(cat + 1) * k * k];
            self.subst.transition_probabilities(state, distance, block);
        }
        self.matrices[node][sel] = buffer;
        Ok(())
    }

    fn compute_partials(&mut self, op: Op) {
        if !self.moved_partial[op.parent] {
            self.partial_sel[op.parent] ^= 1;
            self.moved_partial[op.parent] = true;
        }
        let k = self.state_count;
        let patterns = self.pattern_count;
        let sel = self.partial_sel[op.parent] as usize;
        let mut out = std::mem::take(&mut self.partials[op.parent][sel]);
        let mut scales = std::mem::take(&mut self.scale_logs[op.parent][sel]);

        let mut left_contrib = vec![0.0; k];
        let mut right_contrib = vec![0.0; k];
        for pattern in 0..patterns {
            for cat in 0..self.category_count {
                match op.case {
                    NodeCase::LeafLeaf => {
                        self.leaf_row(op.left, cat, pattern, &mut left_contrib);
                        self.leaf_row(op.right, cat, pattern, &mut right_contrib);
                    }
                    NodeCase::PartialPartial => {
                        self.partial_product(op.left, cat, pattern, &mut left_contrib);
                        self.partial_product(op.right, cat, pattern, &mut right_contrib);
                    }
                    NodeCase::LeafPartial => {
                        self.child_contribution(op.left, cat, pattern, &mut left_contrib);
                        self.child_contribution(op.right, cat, pattern, &mut right_contrib);
                    }
                }
                let base = (cat * patterns + pattern) * k;
                for i in 0..k {
                    out[base + i] = left_contrib[i] * right_contrib[i];
                }
            }
            scales[pattern] = 0.0;
            if self.use_scaling {
                let mut max = 0.0f64;
                for cat in 0..self.category_count {
                    let base = (cat * patterns + pattern) * k;
                    for i in 0..k {
                        max = max.max(out[base + i]);
                    }
                }
                if max > 0.0 {
                    for cat in 0..self.category_count {
                        let base = (cat * patterns + pattern) * k;
                        for i in 0..k {
                            out[base + i] /= max;
                        }
                    }
                    scales[pattern] = max.ln();
                }
            }
        }

        self.partials[op.parent][sel] = out;
        self.scale_logs[op.parent][sel] = scales;
    }

    /// Transition row for an observed leaf state, all ones when ambiguous.
    fn leaf_row(&self, child: usize, cat: usize, pattern: usize, out: &mut [f64]) {
        let k = self.state_count;
        let matrix_base = cat * k * k;
        let matrix = &self.matrices[child][self.matrix_sel[child] as usize];
        let code = self.leaf_codes[child][pattern] as usize;
        if code >= k {
            out.iter_mut().for_each(|v| *v = 1.0);
        } else {
            for i in 0..k {
                out[i] = matrix[matrix_base + i * k + code];
            }
        }
    }

    /// Matrix-vector product of a child branch against its cached partial.
    fn partial_product(&self, child: usize, cat: usize, pattern: usize, out: &mut [f64]) {
        let k = self.state_count;
        let matrix_base = cat * k * k;
        let matrix = &self.matrices[child][self.matrix_sel[child] as usize];
        let partial = &self.partials[child][self.partial_sel[child] as usize];
        let base = (cat * self.pattern_count + pattern) * k;
        for i in 0..k {
            let mut sum = 0.0;
            for j in 0..k {
                sum += matrix[matrix_base + i * k + j] * partial[base + j];
            }
            out[i] = sum;
        }
    }

    /// Mixed-case dispatch for one child of a leaf/partial pair.
    fn child_contribution(&self, child: usize, cat: usize, pattern: usize, out: &mut [f64]) {
        if child < self.leaf_count {
            self.leaf_row(child, cat, pattern, out);
        } else {
            self.partial_product(child, cat, pattern, out);
        }
    }

    fn integrate_root(&mut self, state: &State, tree: &Tree) -> Result<f64, PhyloError> {
        let k = self.state_count;
        let patterns = self.pattern_count;
        let freqs = self.subst.frequencies();
        let p_inv = self.sites.prop_invariant(state);
        let root = tree.root();
        let root_partials = &self.partials[root][self.partial_sel[root] as usize];

        let mut total = 0.0;
        for pattern in 0..patterns {
            let mut site = 0.0;
            for cat in 0..self.category_count {
                let base = (cat * patterns + pattern) * k;
                let mut dot = 0.0;
                for i in 0..k {
                    dot += freqs[i] * root_partials[base + i];
                }
                site += self.sites.weight(cat) * dot;
            }
            let mut log_scale = 0.0;
            for node in self.leaf_count..tree.node_count() {
                log_scale += self.scale_logs[node][self.partial_sel[node] as usize][pattern];
            }

            // Invariant-site correction folds into the integrated root
            // partial before logs; with scaling active the two terms live on
            // different scales, so combine them in log space. An all-gap
            // pattern is compatible with every invariant state, so its
            // invariant term sums to p_inv and the site stays at 1.
            let variable = ((1.0 - p_inv) * site).ln() + log_scale;
            let log_site = if p_inv > 0.0 {
                match self.pattern_classes[pattern] {
                    PatternClass::Constant(state_at_tip) => {
                        log_sum_exp(variable, (p_inv * freqs[state_at_tip]).ln())
                    }
                    PatternClass::AllAmbiguous => log_sum_exp(variable, p_inv.ln()),
                    PatternClass::Variable => variable,
                }
            } else {
                variable
            };
            total += log_site * self.pattern_weights[pattern];
        }

        if !total.is_finite() {
            self.cached = total;
            self.force_recalc = false;
            return Err(non_finite_error(total));
        }
        self.cached = total;
        self.force_recalc = false;
        Ok(total)
    }
}

fn log_sum_exp(a: f64, b: f64) -> f64 {
    if a == f64::NEG_INFINITY {
        return b;
    }
    if b == f64::NEG_INFINITY {
        return a;
    }
    let (hi, lo) = if a >= b { (a, b) } else { (b, a) };
    hi + (lo - hi).exp().ln_1p()
}

fn non_finite_error(value: f64) -> PhyloError {
    PhyloError::Numeric(
        ErrorInfo::new("non-finite-likelihood", "site likelihood is zero or undefined")
            .with_context("value", value.to_string()),
    )
}
