//! Discrete rate-category site model.

use phylo_core::errors::ErrorInfo;
use phylo_core::PhyloError;
use phylo_state::{ParamId, State};

/// One discrete rate category.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateCategory {
    /// Relative substitution rate of the category.
    pub rate: f64,
    /// Mixture weight of the category.
    pub weight: f64,
}

/// Mixture of discrete rate categories with an optional overall rate
/// multiplier and an optional proportion of invariant sites.
///
/// The category rates and weights are supplied at construction (the engine
/// does not own the discretization scheme that produced them); the two
/// optional parameters are read from the state on every evaluation so that
/// proposals on them invalidate the likelihood.
#[derive(Debug, Clone, PartialEq)]
pub struct SiteModel {
    categories: Vec<RateCategory>,
    mu: Option<ParamId>,
    prop_invariant: Option<ParamId>,
}

impl SiteModel {
    /// Creates a site model from explicit categories. Weights must sum to
    /// one and rates must be positive.
    pub fn new(categories: Vec<RateCategory>) -> Result<Self, PhyloError> {
        if categories.is_empty() {
            return Err(PhyloError::Likelihood(ErrorInfo::new(
                "no-categories",
                "a site model needs at least one rate category",
            )));
        }
        let weight_sum: f64 = categories.iter().map(|c| c.weight).sum();
        if (weight_sum - 1.0).abs() > 1e-9 {
            return Err(PhyloError::Likelihood(
                ErrorInfo::new("bad-weights", "category weights must sum to one")
                    .with_context("sum", weight_sum.to_string()),
            ));
        }
        if categories.iter().any(|c| c.rate <= 0.0) {
            return Err(PhyloError::Likelihood(ErrorInfo::new(
                "bad-rate",
                "category rates must be positive",
            )));
        }
        Ok(Self {
            categories,
            mu: None,
            prop_invariant: None,
        })
    }

    /// Single category at rate one.
    pub fn single() -> Self {
        Self {
            categories: vec![RateCategory {
                rate: 1.0,
                weight: 1.0,
            }],
            mu: None,
            prop_invariant: None,
        }
    }

    /// Attaches an overall rate multiplier parameter (the clock rate).
    pub fn with_mu(mut self, mu: ParamId) -> Self {
        self.mu = Some(mu);
        self
    }

    /// Attaches a proportion-invariant parameter in `[0, 1)`.
    pub fn with_prop_invariant(mut self, prop: ParamId) -> Self {
        self.prop_invariant = Some(prop);
        self
    }

    /// Number of rate categories.
    pub fn category_count(&self) -> usize {
        self.categories.len()
    }

    /// Effective rate of category `index`, including the multiplier.
    pub fn rate(&self, index: usize, state: &State) -> f64 {
        let mu = self.mu.map(|id| state.param(id).value(0)).unwrap_or(1.0);
        self.categories[index].rate * mu
    }

    /// Mixture weight of category `index`.
    pub fn weight(&self, index: usize) -> f64 {
        self.categories[index].weight
    }

    /// Current proportion of invariant sites (zero when not modeled).
    pub fn prop_invariant(&self, state: &State) -> f64 {
        self.prop_invariant
            .map(|id| state.param(id).value(0))
            .unwrap_or(0.0)
    }

    /// Parameters this model reads, declared for dirtiness propagation.
    pub fn param_inputs(&self) -> Vec<ParamId> {
        self.mu.iter().chain(self.prop_invariant.iter()).copied().collect()
    }
}
