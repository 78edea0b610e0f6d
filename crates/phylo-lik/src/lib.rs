#![deny(missing_docs)]

//! Likelihood layer of the phylo MCMC engine: site-pattern data,
//! closed-form substitution models, the Felsenstein pruning engine with
//! double-buffered caches and underflow scaling, priors, and the cached
//! posterior graph.

/// Site-pattern compressed alignments.
pub mod alignment;
/// Cached posterior composition.
pub mod posterior;
/// Tree and parameter priors.
pub mod priors;
/// The pruning engine.
pub mod pruning;
/// Rate-category site model.
pub mod sites;
/// Substitution models.
pub mod subst;

pub use alignment::{Alignment, PatternClass};
pub use posterior::{Density, Model, Posterior};
pub use priors::{ParamPrior, PriorKind, YulePrior};
pub use pruning::{NodeCase, TreeLikelihood};
pub use sites::{RateCategory, SiteModel};
pub use subst::SubstModel;
