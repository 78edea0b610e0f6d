//! Cached-term posterior graph rooted at a single scalar.

use phylo_core::errors::ErrorInfo;
use phylo_core::PhyloError;
use phylo_state::{State, Tree};

use crate::alignment::Alignment;
use crate::priors::{ParamPrior, YulePrior};
use crate::pruning::TreeLikelihood;
use crate::sites::SiteModel;
use crate::subst::SubstModel;

/// Log-density components of one posterior evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Density {
    /// Data log-likelihood.
    pub log_likelihood: f64,
    /// Sum of tree and parameter prior log-densities.
    pub log_prior: f64,
}

impl Density {
    /// Unnormalized log-posterior.
    pub fn total(&self) -> f64 {
        self.log_likelihood + self.log_prior
    }
}

/// Declarative model assembly: everything needed to attach a posterior to a
/// tree. Kept separate from the posterior so a resumed or cloned chain can
/// rebuild its caches against a deserialized state.
#[derive(Debug, Clone)]
pub struct Model {
    /// Site-pattern data.
    pub alignment: Alignment,
    /// Substitution model.
    pub subst: SubstModel,
    /// Rate-category site model.
    pub sites: SiteModel,
    /// Tree prior.
    pub tree_prior: YulePrior,
    /// Parameter priors.
    pub param_priors: Vec<ParamPrior>,
    /// Enables partial-likelihood rescaling.
    pub use_scaling: bool,
}

impl Model {
    /// Builds a posterior whose leaf mapping matches `tree`.
    pub fn build(&self, tree: &Tree) -> Result<Posterior, PhyloError> {
        let likelihood = TreeLikelihood::new(
            &self.alignment,
            tree,
            self.subst.clone(),
            self.sites.clone(),
            self.use_scaling,
        )?;
        Ok(Posterior::new(likelihood, self.tree_prior, self.param_priors.clone()))
    }
}

/// Composes the tree likelihood with the prior terms, each cached with its
/// stored twin so that a rejected proposal rolls the whole posterior back
/// without recomputation.
///
/// Dirtiness is pulled: a term recomputes only when [`Posterior::evaluate`]
/// is called and only if one of its declared inputs changed, so a proposal
/// touching only a substitution parameter never re-derives the tree prior.
#[derive(Debug, Clone)]
pub struct Posterior {
    likelihood: TreeLikelihood,
    tree_prior: YulePrior,
    param_priors: Vec<ParamPrior>,
    tree_prior_value: f64,
    stored_tree_prior_value: f64,
    prior_values: Vec<f64>,
    stored_prior_values: Vec<f64>,
    force_recalc: bool,
}

impl Posterior {
    /// Assembles the posterior from its terms.
    pub fn new(
        likelihood: TreeLikelihood,
        tree_prior: YulePrior,
        param_priors: Vec<ParamPrior>,
    ) -> Self {
        let n = param_priors.len();
        Self {
            likelihood,
            tree_prior,
            param_priors,
            tree_prior_value: f64::NAN,
            stored_tree_prior_value: f64::NAN,
            prior_values: vec![f64::NAN; n],
            stored_prior_values: vec![f64::NAN; n],
            force_recalc: true,
        }
    }

    /// Remembers every cached term. Called in lockstep with `State::store`.
    pub fn store(&mut self) {
        self.likelihood.store();
        self.stored_tree_prior_value = self.tree_prior_value;
        self.stored_prior_values.copy_from_slice(&self.prior_values);
    }

    /// Rolls every cached term back. Called in lockstep with
    /// `State::restore`.
    pub fn restore(&mut self) {
        self.likelihood.restore();
        self.tree_prior_value = self.stored_tree_prior_value;
        std::mem::swap(&mut self.prior_values, &mut self.stored_prior_values);
    }

    /// Keeps the current cached terms.
    pub fn accept(&mut self) {
        self.likelihood.accept();
    }

    /// Forces the next evaluation to recompute every term from scratch.
    pub fn make_dirty(&mut self) {
        self.likelihood.make_dirty();
        self.force_recalc = true;
    }

    /// Lazily evaluates the posterior against the current state.
    pub fn evaluate(&mut self, state: &State) -> Result<Density, PhyloError> {
        let log_likelihood = self.likelihood.log_likelihood(state)?;

        let tree_prior_dirty = self.force_recalc
            || state.tree().any_dirty()
            || state.param(self.tree_prior.param_input()).is_dirty();
        if tree_prior_dirty {
            self.tree_prior_value = self.tree_prior.log_density(state);
        }

        for (index, prior) in self.param_priors.iter().enumerate() {
            if self.force_recalc || state.param(prior.param_input()).is_dirty() {
                self.prior_values[index] = prior.log_density(state);
            }
        }
        self.force_recalc = false;

        let log_prior = self.tree_prior_value + self.prior_values.iter().sum::<f64>();
        if !log_prior.is_finite() {
            return Err(PhyloError::Numeric(
                ErrorInfo::new("undefined-prior", "prior density is zero or undefined")
                    .with_context("log_prior", log_prior.to_string()),
            ));
        }
        Ok(Density {
            log_likelihood,
            log_prior,
        })
    }

    /// Full, non-incremental evaluation: every input is marked dirty, every
    /// cache recomputed. Intended for the initial evaluation and for the
    /// periodic verification pass; call only between iterations (it clears
    /// the state's dirty flags when done).
    pub fn evaluate_full(&mut self, state: &mut State) -> Result<Density, PhyloError> {
        state.set_everything_dirty(true);
        self.make_dirty();
        let result = self.evaluate(state);
        state.set_everything_dirty(false);
        result
    }
}
