//! Tree and parameter prior log-densities.

use phylo_state::{ParamId, State};

/// Pure-birth (Yule) prior over the tree's internal node heights, with the
/// birth rate read from a state parameter.
///
/// Convention used here: `(n - 1) * ln(lambda) - lambda * sum(heights)` over
/// all internal nodes, root included.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct YulePrior {
    birth_rate: ParamId,
}

impl YulePrior {
    /// Creates the prior reading `birth_rate` from the state.
    pub fn new(birth_rate: ParamId) -> Self {
        Self { birth_rate }
    }

    /// The birth-rate parameter handle, declared for dirtiness propagation.
    pub fn param_input(&self) -> ParamId {
        self.birth_rate
    }

    /// Log-density of the current tree.
    pub fn log_density(&self, state: &State) -> f64 {
        let lambda = state.param(self.birth_rate).value(0);
        let tree = state.tree();
        let mut height_sum = 0.0;
        for node in tree.leaf_count()..tree.node_count() {
            height_sum += tree.height(node);
        }
        (tree.leaf_count() as f64 - 1.0) * lambda.ln() - lambda * height_sum
    }
}

/// Closed set of parameter prior densities.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PriorKind {
    /// Exponential with the given mean.
    Exponential {
        /// Mean of the distribution.
        mean: f64,
    },
    /// Log-normal parameterized in log space.
    LogNormal {
        /// Mean of the log values.
        mean_log: f64,
        /// Standard deviation of the log values.
        sd_log: f64,
    },
    /// Gamma with shape and scale.
    Gamma {
        /// Shape parameter.
        shape: f64,
        /// Scale parameter.
        scale: f64,
    },
    /// Improper flat prior inside the parameter's bounds.
    Uniform,
}

/// A prior density attached to one parameter; the log-density sums over all
/// of the parameter's dimensions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamPrior {
    param: ParamId,
    kind: PriorKind,
}

impl ParamPrior {
    /// Attaches `kind` to `param`.
    pub fn new(param: ParamId, kind: PriorKind) -> Self {
        Self { param, kind }
    }

    /// The parameter handle, declared for dirtiness propagation.
    pub fn param_input(&self) -> ParamId {
        self.param
    }

    /// Log-density of the parameter's current values. Returns negative
    /// infinity where the density is undefined (the caller reports that
    /// through the budgeted numeric channel).
    pub fn log_density(&self, state: &State) -> f64 {
        state
            .param(self.param)
            .values()
            .iter()
            .map(|&x| self.kind.log_density(x))
            .sum()
    }
}

impl PriorKind {
    /// Log-density at `x`.
    pub fn log_density(&self, x: f64) -> f64 {
        match *self {
            PriorKind::Exponential { mean } => {
                if x < 0.0 {
                    f64::NEG_INFINITY
                } else {
                    -mean.ln() - x / mean
                }
            }
            PriorKind::LogNormal { mean_log, sd_log } => {
                if x <= 0.0 {
                    f64::NEG_INFINITY
                } else {
                    let z = (x.ln() - mean_log) / sd_log;
                    -x.ln() - sd_log.ln() - 0.5 * ((2.0 * std::f64::consts::PI).ln() + z * z)
                }
            }
            PriorKind::Gamma { shape, scale } => {
                if x <= 0.0 {
                    f64::NEG_INFINITY
                } else {
                    (shape - 1.0) * x.ln() - x / scale - shape * scale.ln() - ln_gamma(shape)
                }
            }
            PriorKind::Uniform => 0.0,
        }
    }
}

/// Lanczos approximation of `ln(Gamma(x))` for positive `x`.
fn ln_gamma(x: f64) -> f64 {
    const COEFFS: [f64; 8] = [
        676.5203681218851,
        -1259.1392167224028,
        771.32342877765313,
        -176.61502916214059,
        12.507343278686905,
        -0.13857109526572012,
        9.9843695780195716e-6,
        1.5056327351493116e-7,
    ];
    if x < 0.5 {
        // Reflection to keep the series in its accurate range.
        let pi = std::f64::consts::PI;
        return (pi / (pi * x).sin()).ln() - ln_gamma(1.0 - x);
    }
    let x = x - 1.0;
    let mut acc = 0.99999999999980993;
    for (i, &c) in COEFFS.iter().enumerate() {
        acc += c / (x + i as f64 + 1.0);
    }
    let t = x + 7.5;
    0.5 * (2.0 * std::f64::consts::PI).ln() + (x + 0.5) * t.ln() - t + acc.ln()
}
