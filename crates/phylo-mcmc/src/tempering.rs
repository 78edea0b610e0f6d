use std::collections::BTreeMap;
use std::thread;

use phylo_core::{ErrorInfo, PhyloError, RngHandle};
use phylo_lik::Model;
use phylo_state::State;
use rand::RngCore;

use crate::config::{LadderConfig, LadderPolicy, RunConfig};
use crate::determinism;
use crate::kernel::{Chain, Target};
use crate::operators::Operator;

/// Builds a deterministic temperature ladder following the provided policy.
pub fn build_ladder(config: &LadderConfig) -> Vec<f64> {
    match &config.policy {
        LadderPolicy::Geometric { ratio } => {
            let ratio = (*ratio).max(1.01);
            let mut ladder = Vec::with_capacity(config.chains.max(1));
            let mut temp = config.base_temperature;
            for _ in 0..config.chains.max(1) {
                ladder.push(temp.max(1e-6));
                temp *= ratio;
            }
            ladder
        }
        LadderPolicy::Manual { temperatures } => {
            if temperatures.is_empty() {
                vec![config.base_temperature]
            } else {
                temperatures.clone()
            }
        }
    }
}

/// Metropolis acceptance probability for exchanging two tempered chains.
pub fn exchange_acceptance(log_post_a: f64, temp_a: f64, log_post_b: f64, temp_b: f64) -> f64 {
    let beta_a = 1.0 / temp_a.max(1e-9);
    let beta_b = 1.0 / temp_b.max(1e-9);
    let delta = (beta_a - beta_b) * (log_post_b - log_post_a);
    delta.exp().min(1.0)
}

/// Attempts a state exchange using the provided RNG handle.
pub fn attempt_exchange(
    log_post_a: f64,
    temp_a: f64,
    log_post_b: f64,
    temp_b: f64,
    rng: &mut RngHandle,
) -> (bool, f64) {
    let acceptance = exchange_acceptance(log_post_a, temp_a, log_post_b, temp_b);
    let draw = rng.next_u64() as f64 / u64::MAX as f64;
    (draw < acceptance, acceptance)
}

/// Summary of a tempered run, reported from the cold chain's point of view.
#[derive(Debug, Clone)]
pub struct TemperingSummary {
    /// Temperature of each chain, coldest first.
    pub temperatures: Vec<f64>,
    /// Observed exchange acceptance rate per adjacent pair.
    pub exchange_rates: Vec<f64>,
    /// Log posterior of the cold chain's final sample.
    pub cold_log_posterior: f64,
    /// Digest of the cold chain's final state.
    pub cold_state_digest: String,
    /// Acceptance rate per operator on the cold chain.
    pub cold_acceptance_rates: BTreeMap<String, f64>,
}

/// Runs a ladder of tempered chains with periodic neighbour exchanges.
///
/// Chains advance in parallel between exchange epochs; at each epoch boundary
/// alternating adjacent pairs attempt a state swap. Operator schedules and
/// substream indices stay with their temperature, only states move, so each
/// chain's randomness remains a pure function of the master seed.
pub fn run_tempered(
    config: &RunConfig,
    ladder: &LadderConfig,
    model: &Model,
    init: &State,
    operators: &[Operator],
) -> Result<TemperingSummary, PhyloError> {
    let temperatures = build_ladder(ladder);
    let master_seed = config.seed_policy.master_seed;
    let mut chains = Vec::with_capacity(temperatures.len());
    for index in 0..temperatures.len() {
        chains.push(Chain::init(
            model,
            init.clone(),
            operators.to_vec(),
            master_seed,
            index,
            config.max_numeric_warnings,
        )?);
    }

    let pair_count = temperatures.len().saturating_sub(1);
    let mut attempted = vec![0u64; pair_count];
    let mut swapped = vec![0u64; pair_count];
    let exchange_every = ladder.exchange_every.max(1);
    let total = config.chain_length;
    let mut sample = 0u64;
    let mut epoch = 0u64;
    while sample < total {
        let segment = exchange_every.min(total - sample);
        let range = sample as i64..(sample + segment) as i64;
        thread::scope(|scope| -> Result<(), PhyloError> {
            let mut handles = Vec::new();
            for (chain, &temperature) in chains.iter_mut().zip(&temperatures) {
                let range = range.clone();
                handles.push(scope.spawn(move || {
                    chain.run_segment(Target::Tempered { temperature }, range, true)
                }));
            }
            for handle in handles {
                handle.join().map_err(|_| {
                    PhyloError::State(ErrorInfo::new(
                        "worker-panic",
                        "a tempered chain worker panicked",
                    ))
                })??;
            }
            Ok(())
        })?;

        // Alternate even and odd adjacent pairs between epochs so every pair
        // gets attempts without two swaps touching the same chain at once.
        let first = (epoch % 2) as usize;
        for pair in (first..pair_count).step_by(2) {
            let mut rng =
                RngHandle::from_seed(determinism::exchange_seed(master_seed, epoch, pair));
            let (left, right) = chains.split_at_mut(pair + 1);
            let a = &mut left[pair];
            let b = &mut right[0];
            let (swap, _) = attempt_exchange(
                a.current().total(),
                temperatures[pair],
                b.current().total(),
                temperatures[pair + 1],
                &mut rng,
            );
            attempted[pair] += 1;
            if swap {
                swapped[pair] += 1;
                Chain::swap_states(a, b)?;
            }
        }
        sample += segment;
        epoch += 1;
    }

    let exchange_rates = attempted
        .iter()
        .zip(&swapped)
        .map(|(&tries, &swaps)| {
            if tries == 0 {
                0.0
            } else {
                swaps as f64 / tries as f64
            }
        })
        .collect();
    let cold = &chains[0];
    Ok(TemperingSummary {
        temperatures,
        exchange_rates,
        cold_log_posterior: cold.current().total(),
        cold_state_digest: format!("{:016x}", cold.state().digest()),
        cold_acceptance_rates: cold.acceptance_rates(),
    })
}
