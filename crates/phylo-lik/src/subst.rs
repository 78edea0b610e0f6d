//! Substitution models with closed-form transition probabilities.

use phylo_core::errors::ErrorInfo;
use phylo_core::PhyloError;
use phylo_state::{ParamId, State};

/// Closed set of substitution models.
///
/// Both variants have analytic transition probabilities, normalized so that
/// branch distances are measured in expected substitutions per site. The
/// HKY `kappa` is read from the state on every matrix fill, which is what
/// makes a kappa-only proposal invalidate every branch matrix at once.
#[derive(Debug, Clone, PartialEq)]
pub enum SubstModel {
    /// Jukes-Cantor over an arbitrary alphabet size: equal rates, uniform
    /// equilibrium frequencies.
    JukesCantor {
        /// Size of the state alphabet.
        state_count: usize,
    },
    /// HKY85 over nucleotides: transition/transversion ratio `kappa` with
    /// fixed equilibrium frequencies in A, C, G, T order.
    Hky {
        /// Handle of the kappa parameter.
        kappa: ParamId,
        /// Equilibrium frequencies (must sum to one).
        freqs: [f64; 4],
    },
}

impl SubstModel {
    /// Validates an HKY frequency vector at model assembly time.
    pub fn hky(kappa: ParamId, freqs: [f64; 4]) -> Result<Self, PhyloError> {
        let sum: f64 = freqs.iter().sum();
        if (sum - 1.0).abs() > 1e-9 || freqs.iter().any(|&f| f <= 0.0) {
            return Err(PhyloError::Likelihood(
                ErrorInfo::new("bad-frequencies", "HKY frequencies must be positive and sum to one")
                    .with_context("sum", sum.to_string()),
            ));
        }
        Ok(Self::Hky { kappa, freqs })
    }

    /// Size of the state alphabet.
    pub fn state_count(&self) -> usize {
        match self {
            Self::JukesCantor { state_count } => *state_count,
            Self::Hky { .. } => 4,
        }
    }

    /// Equilibrium frequencies used for root integration.
    pub fn frequencies(&self) -> Vec<f64> {
        match self {
            Self::JukesCantor { state_count } => vec![1.0 / *state_count as f64; *state_count],
            Self::Hky { freqs, .. } => freqs.to_vec(),
        }
    }

    /// Parameters this model reads, declared for dirtiness propagation.
    pub fn param_inputs(&self) -> Vec<ParamId> {
        match self {
            Self::JukesCantor { .. } => Vec::new(),
            Self::Hky { kappa, .. } => vec![*kappa],
        }
    }

    /// Fills `out` (row-major `k*k`) with `P(distance)` for this model.
    /// `distance` is the branch length times the site rate, in expected
    /// substitutions per site.
    pub fn transition_probabilities(&self, state: &State, distance: f64, out: &mut [f64]) {
        match self {
            Self::JukesCantor { state_count } => {
                jc_probabilities(*state_count, distance, out);
            }
            Self::Hky { kappa, freqs } => {
                hky_probabilities(state.param(*kappa).value(0), freqs, distance, out);
            }
        }
    }
}

fn jc_probabilities(k: usize, distance: f64, out: &mut [f64]) {
    debug_assert_eq!(out.len(), k * k);
    let kf = k as f64;
    // Q normalized to one expected substitution per unit distance:
    // exp(Qt) has eigenvalue exp(-k/(k-1) * t) on the non-constant modes.
    let decay = (-kf / (kf - 1.0) * distance).exp();
    let p_same = 1.0 / kf + (1.0 - 1.0 / kf) * decay;
    let p_diff = (1.0 - decay) / kf;
    for i in 0..k {
        for j in 0..k {
            out[i * k + j] = if i == j { p_same } else { p_diff };
        }
    }
}

/// HKY transition probabilities via the Tamura-Nei closed form with equal
/// purine/pyrimidine transition rates. States are A=0, C=1, G=2, T=3.
fn hky_probabilities(kappa: f64, freqs: &[f64; 4], distance: f64, out: &mut [f64]) {
    debug_assert_eq!(out.len(), 16);
    let pi_r = freqs[0] + freqs[2];
    let pi_y = freqs[1] + freqs[3];
    // Mean rate normalization: transitions weighted by kappa.
    let mean_rate =
        2.0 * (freqs[0] * freqs[2] + freqs[1] * freqs[3]) * kappa + 2.0 * pi_r * pi_y;
    let beta = 1.0 / mean_rate;

    let e2 = (-beta * distance).exp();
    for i in 0..4 {
        for j in 0..4 {
            let pi_j = freqs[j];
            let group_j = if j == 0 || j == 2 { pi_r } else { pi_y };
            let same_group = (i == 0 || i == 2) == (j == 0 || j == 2);
            let e4 = (-(group_j * kappa + (1.0 - group_j)) * beta * distance).exp();
            out[i * 4 + j] = if !same_group {
                pi_j * (1.0 - e2)
            } else if i == j {
                pi_j + pi_j * (1.0 / group_j - 1.0) * e2 + ((group_j - pi_j) / group_j) * e4
            } else {
                pi_j + pi_j * (1.0 / group_j - 1.0) * e2 - (pi_j / group_j) * e4
            };
        }
    }
}
