//! Alternative drivers reusing the single-chain iteration: simulated
//! annealing, power-posterior path sampling and particle-style resampling.

use std::collections::BTreeMap;
use std::thread;

use phylo_core::{ErrorInfo, PhyloError};
use phylo_lik::Model;
use phylo_state::{State, StateRecords};
use serde::{Deserialize, Serialize};

use crate::config::RunConfig;
use crate::kernel::{Chain, Target};
use crate::operators::Operator;

/// Geometric temperature schedule for simulated annealing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnealSchedule {
    /// Temperature at the first sample.
    #[serde(default = "default_start_temperature")]
    pub start_temperature: f64,
    /// Temperature approached at the last sample.
    #[serde(default = "default_end_temperature")]
    pub end_temperature: f64,
}

fn default_start_temperature() -> f64 {
    10.0
}

fn default_end_temperature() -> f64 {
    0.01
}

impl Default for AnnealSchedule {
    fn default() -> Self {
        Self {
            start_temperature: default_start_temperature(),
            end_temperature: default_end_temperature(),
        }
    }
}

impl AnnealSchedule {
    /// Temperature at `sample` out of `total`, interpolated geometrically.
    pub fn temperature(&self, sample: u64, total: u64) -> f64 {
        if total <= 1 {
            return self.end_temperature;
        }
        let fraction = sample as f64 / (total - 1) as f64;
        let log_start = self.start_temperature.ln();
        let log_end = self.end_temperature.ln();
        (log_start + fraction * (log_end - log_start)).exp()
    }
}

/// Outcome of an annealing run.
#[derive(Debug, Clone)]
pub struct AnnealSummary {
    /// Best log posterior visited.
    pub best_log_posterior: f64,
    /// Sample at which the best state was visited.
    pub best_sample: u64,
    /// Serialized best state.
    pub best_state: StateRecords,
    /// Temperature at the final sample.
    pub final_temperature: f64,
    /// Acceptance rate per operator name.
    pub acceptance_rates: BTreeMap<String, f64>,
}

/// Runs a single chain under a decreasing temperature schedule and reports
/// the best state visited rather than a posterior sample.
pub fn run_annealed(
    config: &RunConfig,
    schedule: &AnnealSchedule,
    model: &Model,
    init: &State,
    operators: Vec<Operator>,
) -> Result<AnnealSummary, PhyloError> {
    let mut chain = Chain::init(
        model,
        init.clone(),
        operators,
        config.seed_policy.master_seed,
        0,
        config.max_numeric_warnings,
    )?;
    let total = config.chain_length;
    let mut best_log_posterior = chain.current().total();
    let mut best_sample = 0u64;
    let mut best_state = chain.state().to_records();
    let mut temperature = schedule.temperature(0, total);
    for sample in 0..total {
        temperature = schedule.temperature(sample, total);
        chain.step(sample as i64, Target::Tempered { temperature }, true)?;
        let density = chain.current().total();
        if density > best_log_posterior {
            best_log_posterior = density;
            best_sample = sample;
            best_state = chain.state().to_records();
        }
    }
    Ok(AnnealSummary {
        best_log_posterior,
        best_sample,
        best_state,
        final_temperature: temperature,
        acceptance_rates: chain.acceptance_rates(),
    })
}

/// Power-posterior path configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathConfig {
    /// Number of beta steps on the path from 1 to 0.
    #[serde(default = "default_path_steps")]
    pub steps: usize,
    /// Samples drawn within each step.
    #[serde(default = "default_step_samples")]
    pub samples_per_step: u64,
    /// Skew of the beta spacing; betas follow `x^(1/alpha)` so small values
    /// concentrate steps near the prior end where the integrand moves fastest.
    #[serde(default = "default_path_alpha")]
    pub alpha: f64,
}

fn default_path_steps() -> usize {
    8
}

fn default_step_samples() -> u64 {
    1_000
}

fn default_path_alpha() -> f64 {
    0.3
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            steps: default_path_steps(),
            samples_per_step: default_step_samples(),
            alpha: default_path_alpha(),
        }
    }
}

/// Outcome of a path-sampling run.
#[derive(Debug, Clone)]
pub struct PathSamplingSummary {
    /// Likelihood exponents visited, descending from 1 towards 0.
    pub betas: Vec<f64>,
    /// Mean log likelihood within each step (after discarding the first half).
    pub mean_log_likelihoods: Vec<f64>,
    /// Trapezoid estimate of the log marginal likelihood.
    pub log_marginal_likelihood: f64,
}

/// Estimates the log marginal likelihood by sampling a sequence of power
/// posteriors `likelihood^beta * prior` along a beta path from 1 to 0 and
/// integrating the mean log likelihood over beta.
pub fn run_path_sampling(
    config: &RunConfig,
    path: &PathConfig,
    model: &Model,
    init: &State,
    operators: Vec<Operator>,
) -> Result<PathSamplingSummary, PhyloError> {
    if path.steps < 2 {
        return Err(PhyloError::State(
            ErrorInfo::new("path-too-short", "path sampling needs at least two beta steps")
                .with_context("steps", path.steps.to_string()),
        ));
    }
    let mut chain = Chain::init(
        model,
        init.clone(),
        operators,
        config.seed_policy.master_seed,
        0,
        config.max_numeric_warnings,
    )?;
    let mut betas = Vec::with_capacity(path.steps);
    for step in 0..path.steps {
        let fraction = (path.steps - 1 - step) as f64 / (path.steps - 1) as f64;
        betas.push(fraction.powf(1.0 / path.alpha));
    }

    let mut means = Vec::with_capacity(path.steps);
    let mut sample = 0i64;
    for &beta in &betas {
        let mut sum = 0.0;
        let mut kept = 0u64;
        for within in 0..path.samples_per_step {
            chain.step(sample, Target::Power { beta }, true)?;
            sample += 1;
            // First half of each step is equilibration at the new beta.
            if within >= path.samples_per_step / 2 {
                sum += chain.current().log_likelihood;
                kept += 1;
            }
        }
        means.push(if kept == 0 { 0.0 } else { sum / kept as f64 });
    }

    let mut log_marginal = 0.0;
    for step in 1..betas.len() {
        let width = betas[step - 1] - betas[step];
        log_marginal += width * (means[step - 1] + means[step]) / 2.0;
    }
    Ok(PathSamplingSummary {
        betas,
        mean_log_likelihoods: means,
        log_marginal_likelihood: log_marginal,
    })
}

/// Particle-resampling configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticleConfig {
    /// Number of independent chains.
    #[serde(default = "default_particles")]
    pub particles: usize,
    /// Samples each chain advances between rendezvous points.
    #[serde(default = "default_segment_length")]
    pub segment_length: u64,
    /// Log-posterior gap beyond which a lagging chain adopts the leader.
    #[serde(default = "default_catchup_threshold")]
    pub catchup_threshold: f64,
}

fn default_particles() -> usize {
    4
}

fn default_segment_length() -> u64 {
    500
}

fn default_catchup_threshold() -> f64 {
    50.0
}

impl Default for ParticleConfig {
    fn default() -> Self {
        Self {
            particles: default_particles(),
            segment_length: default_segment_length(),
            catchup_threshold: default_catchup_threshold(),
        }
    }
}

/// Outcome of a particle-resampling run.
#[derive(Debug, Clone)]
pub struct ParticleSummary {
    /// Final log posterior of each chain.
    pub log_posteriors: Vec<f64>,
    /// Index of the best chain at the final rendezvous.
    pub best_particle: usize,
    /// Serialized state of the best chain.
    pub best_state: StateRecords,
    /// Number of catch-up adoptions performed over the run.
    pub adoptions: u64,
}

/// Runs independent chains segment-wise; at each rendezvous, chains whose log
/// posterior trails the leader by more than the threshold adopt the leader's
/// state. The hand-off goes through serialized records so chains never share
/// live state.
pub fn run_particles(
    config: &RunConfig,
    particles: &ParticleConfig,
    model: &Model,
    init: &State,
    operators: &[Operator],
) -> Result<ParticleSummary, PhyloError> {
    let count = particles.particles.max(1);
    let mut chains = Vec::with_capacity(count);
    for index in 0..count {
        chains.push(Chain::init(
            model,
            init.clone(),
            operators.to_vec(),
            config.seed_policy.master_seed,
            index,
            config.max_numeric_warnings,
        )?);
    }
    let segment_length = particles.segment_length.max(1);
    let total = config.chain_length;
    let mut sample = 0u64;
    let mut adoptions = 0u64;
    while sample < total {
        let segment = segment_length.min(total - sample);
        let range = sample as i64..(sample + segment) as i64;
        thread::scope(|scope| -> Result<(), PhyloError> {
            let mut handles = Vec::new();
            for chain in chains.iter_mut() {
                let range = range.clone();
                handles.push(
                    scope.spawn(move || chain.run_segment(Target::Posterior, range, true)),
                );
            }
            for handle in handles {
                handle.join().map_err(|_| {
                    PhyloError::State(ErrorInfo::new(
                        "worker-panic",
                        "a particle chain worker panicked",
                    ))
                })??;
            }
            Ok(())
        })?;

        let best = best_particle(&chains);
        let best_log_posterior = chains[best].current().total();
        let records = chains[best].state().to_records();
        for (index, chain) in chains.iter_mut().enumerate() {
            if index == best {
                continue;
            }
            if best_log_posterior - chain.current().total() > particles.catchup_threshold {
                chain.adopt(&records)?;
                adoptions += 1;
            }
        }
        sample += segment;
    }

    let best = best_particle(&chains);
    Ok(ParticleSummary {
        log_posteriors: chains.iter().map(|c| c.current().total()).collect(),
        best_particle: best,
        best_state: chains[best].state().to_records(),
        adoptions,
    })
}

fn best_particle(chains: &[Chain]) -> usize {
    let mut best = 0;
    for (index, chain) in chains.iter().enumerate() {
        if chain.current().total() > chains[best].current().total() {
            best = index;
        }
    }
    best
}
