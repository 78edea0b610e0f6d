use phylo_core::RngHandle;
use phylo_state::{ParamId, State};

use crate::operators::Proposal;

/// Multiplicative scale proposal on one dimension of a real parameter.
///
/// Draws `s` uniformly from `[factor, 1/factor]` (with `factor` in `(0, 1)`)
/// and multiplies the chosen dimension by it. The density of the draw is
/// uniform in `s` rather than `ln s`, giving the Hastings correction `-ln s`.
pub fn propose_scale(
    state: &mut State,
    param: ParamId,
    factor: f64,
    rng: &mut RngHandle,
) -> Proposal {
    let target = state.param_mut(param);
    let dim = if target.dimension() > 1 {
        rng.next_index(target.dimension())
    } else {
        0
    };
    let s = factor + rng.next_f64() * (1.0 / factor - factor);
    let value = target.value(dim) * s;
    if !target.in_bounds(value) {
        return Proposal::Invalid;
    }
    target.set_value(dim, value);
    Proposal::Ratio(-s.ln())
}

/// Symmetric uniform random-walk proposal on one dimension of a parameter.
pub fn propose_random_walk(
    state: &mut State,
    param: ParamId,
    window: f64,
    rng: &mut RngHandle,
) -> Proposal {
    let target = state.param_mut(param);
    let dim = if target.dimension() > 1 {
        rng.next_index(target.dimension())
    } else {
        0
    };
    let value = target.value(dim) + (2.0 * rng.next_f64() - 1.0) * window;
    if !target.in_bounds(value) {
        return Proposal::Invalid;
    }
    target.set_value(dim, value);
    Proposal::Ratio(0.0)
}
