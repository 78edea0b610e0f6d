use std::collections::BTreeMap;
use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;

use phylo_core::{ErrorInfo, PhyloError, RngHandle};
use phylo_lik::{Density, Model, Posterior};
use phylo_state::{ParamId, State, StateRecords};

use crate::checkpoint::{checkpoint_path, CheckpointPayload};
use crate::config::RunConfig;
use crate::determinism;
use crate::manifest::{build_provenance, RunManifest};
use crate::operators::{choose_operator, restore_operator_records, Operator, Proposal};
use crate::trace::{TraceRecorder, TraceSample};

/// Distribution the accept/reject test targets.
#[derive(Debug, Clone, Copy)]
pub enum Target {
    /// The plain posterior.
    Posterior,
    /// The posterior flattened by a temperature, `posterior^(1/T)`.
    Tempered {
        /// Temperature, with 1.0 recovering the plain posterior.
        temperature: f64,
    },
    /// A power posterior `likelihood^beta * prior`, used for path sampling.
    Power {
        /// Likelihood exponent in `[0, 1]`.
        beta: f64,
    },
}

impl Target {
    fn log_alpha(&self, current: &Density, proposed: &Density, hastings: f64) -> f64 {
        match *self {
            Target::Posterior => proposed.total() - current.total() + hastings,
            Target::Tempered { temperature } => {
                (proposed.total() - current.total()) / temperature + hastings
            }
            Target::Power { beta } => {
                beta * (proposed.log_likelihood - current.log_likelihood)
                    + (proposed.log_prior - current.log_prior)
                    + hastings
            }
        }
    }
}

/// What a single sampling iteration did.
#[derive(Debug, Clone, Copy)]
pub struct StepOutcome {
    /// Whether the proposal was accepted.
    pub accepted: bool,
    /// Index of the operator that ran.
    pub operator: usize,
}

#[derive(Debug)]
struct WarningBudget {
    seen: u64,
    max: u64,
}

impl WarningBudget {
    fn note(&mut self, err: &PhyloError, operator: &str, sample: i64) -> Result<(), PhyloError> {
        self.seen += 1;
        if self.seen > self.max {
            return Err(PhyloError::Numeric(
                ErrorInfo::new(
                    "numeric-budget-exhausted",
                    "too many proposals failed numerically",
                )
                .with_context("failures", self.seen.to_string())
                .with_context("operator", operator.to_string())
                .with_context("sample", sample.to_string())
                .with_context("last_error", err.to_string())
                .with_hint("the chain is wandering into a numerically hostile region; check priors and starting state"),
            ));
        }
        Ok(())
    }
}

/// One Markov chain: its state, posterior caches, operator schedule and the
/// cached density of the current sample.
#[derive(Debug)]
pub struct Chain {
    state: State,
    posterior: Posterior,
    operators: Vec<Operator>,
    current: Density,
    master_seed: u64,
    chain_index: usize,
    warnings: WarningBudget,
}

impl Chain {
    /// Builds a chain around `state` and evaluates the posterior from scratch.
    ///
    /// A non-finite posterior at the initial state is fatal: the chain would
    /// reject every proposal and never leave it.
    pub fn init(
        model: &Model,
        mut state: State,
        operators: Vec<Operator>,
        master_seed: u64,
        chain_index: usize,
        max_numeric_warnings: u64,
    ) -> Result<Self, PhyloError> {
        state.validate()?;
        let mut posterior = model.build(state.tree())?;
        let current = posterior.evaluate_full(&mut state)?;
        if !current.total().is_finite() {
            return Err(PhyloError::Likelihood(
                ErrorInfo::new(
                    "init-non-finite",
                    "posterior is not finite at the initial state",
                )
                .with_context("log_likelihood", current.log_likelihood.to_string())
                .with_context("log_prior", current.log_prior.to_string())
                .with_hint("start from a state with positive prior support"),
            ));
        }
        Ok(Self {
            state,
            posterior,
            operators,
            current,
            master_seed,
            chain_index,
            warnings: WarningBudget {
                seen: 0,
                max: max_numeric_warnings,
            },
        })
    }

    /// The current sample.
    pub fn state(&self) -> &State {
        &self.state
    }

    /// The operator schedule with its live counters.
    pub fn operators(&self) -> &[Operator] {
        &self.operators
    }

    /// Cached density of the current sample.
    pub fn current(&self) -> Density {
        self.current
    }

    /// Master seed the chain's substreams derive from.
    pub fn master_seed(&self) -> u64 {
        self.master_seed
    }

    /// Acceptance rate per operator name.
    pub fn acceptance_rates(&self) -> BTreeMap<String, f64> {
        self.operators
            .iter()
            .map(|op| (op.name(), op.acceptance_rate()))
            .collect()
    }

    /// Runs one Metropolis-Hastings iteration against `target`.
    ///
    /// Every iteration draws its randomness from a seed derived from the
    /// `(chain, sample)` pair, so the trajectory is a pure function of the
    /// master seed and independent of how often the run was interrupted.
    pub fn step(
        &mut self,
        sample: i64,
        target: Target,
        tune: bool,
    ) -> Result<StepOutcome, PhyloError> {
        let seed = determinism::iteration_seed(self.master_seed, self.chain_index, sample);
        let mut rng = RngHandle::from_seed(seed);
        self.state.store();
        self.posterior.store();
        let op_index = choose_operator(&self.operators, &mut rng);
        let proposal = self.operators[op_index].propose(&mut self.state, &mut rng)?;
        let accepted = match proposal {
            Proposal::Invalid => {
                self.reject(op_index);
                if tune {
                    self.operators[op_index].optimize(f64::NEG_INFINITY);
                }
                false
            }
            Proposal::Ratio(hastings) => match self.posterior.evaluate(&self.state) {
                Err(err) if err.is_numeric() => {
                    let name = self.operators[op_index].name();
                    self.warnings.note(&err, &name, sample)?;
                    self.reject(op_index);
                    if tune {
                        self.operators[op_index].optimize(f64::NEG_INFINITY);
                    }
                    false
                }
                Err(err) => return Err(err),
                Ok(proposed) => {
                    let log_alpha = target.log_alpha(&self.current, &proposed, hastings);
                    let accept = log_alpha >= 0.0 || rng.next_f64().ln() < log_alpha;
                    if accept {
                        self.state.accept();
                        self.posterior.accept();
                        self.operators[op_index].accept();
                        self.current = proposed;
                    } else {
                        self.reject(op_index);
                    }
                    if tune {
                        self.operators[op_index].optimize(log_alpha);
                    }
                    accept
                }
            },
        };
        self.state.set_everything_dirty(false);
        Ok(StepOutcome {
            accepted,
            operator: op_index,
        })
    }

    fn reject(&mut self, op_index: usize) {
        self.state.restore();
        self.posterior.restore();
        self.operators[op_index].reject();
    }

    /// Runs a contiguous block of iterations without trace or checkpoint
    /// bookkeeping. Used by the tempering and variant drivers.
    pub fn run_segment(
        &mut self,
        target: Target,
        samples: Range<i64>,
        tune: bool,
    ) -> Result<(), PhyloError> {
        for sample in samples {
            self.step(sample, target, tune)?;
        }
        Ok(())
    }

    /// Cross-checks the cached density against a from-scratch evaluation.
    ///
    /// A mismatch means an operator mutated state outside its declared inputs
    /// or a cache survived a restore, so it is reported as a fatal error
    /// rather than a rejection.
    pub fn verify(
        &mut self,
        tolerance: f64,
        sample: i64,
        operator: &str,
    ) -> Result<(), PhyloError> {
        let cached = self.current;
        let full = self.posterior.evaluate_full(&mut self.state)?;
        let difference = (full.total() - cached.total()).abs();
        if !(difference <= tolerance) {
            return Err(PhyloError::Verify(
                ErrorInfo::new(
                    "incremental-divergence",
                    "incremental and full evaluation disagree",
                )
                .with_context("sample", sample.to_string())
                .with_context("operator", operator.to_string())
                .with_context("cached", cached.total().to_string())
                .with_context("full", full.total().to_string())
                .with_context("difference", difference.to_string())
                .with_hint("an operator is mutating state outside its declared inputs"),
            ));
        }
        self.state.validate()?;
        self.current = full;
        Ok(())
    }

    /// Replaces the chain's state wholesale and rebuilds all caches.
    pub fn adopt(&mut self, records: &StateRecords) -> Result<(), PhyloError> {
        self.state = State::from_records(records)?;
        self.refresh()
    }

    fn refresh(&mut self) -> Result<(), PhyloError> {
        self.current = self.posterior.evaluate_full(&mut self.state)?;
        Ok(())
    }

    /// Swaps the states of two chains and rebuilds both caches. Operator
    /// schedules and substream indices stay with their chain.
    pub fn swap_states(a: &mut Chain, b: &mut Chain) -> Result<(), PhyloError> {
        std::mem::swap(&mut a.state, &mut b.state);
        a.refresh()?;
        b.refresh()
    }
}

/// Summary of a completed run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Log posterior at the final sample.
    pub final_log_posterior: f64,
    /// Digest of the final sampler state.
    pub final_state_digest: String,
    /// Acceptance rate per operator name.
    pub acceptance_rates: BTreeMap<String, f64>,
    /// Effective sample size of the logged posterior series.
    pub effective_sample_size: f64,
    /// Last logged value of every trace column, in column order.
    pub final_parameters: IndexMap<String, f64>,
    /// Recorded trace rows.
    pub samples: Vec<TraceSample>,
    /// Trace file, when a run directory was configured.
    pub trace_path: Option<PathBuf>,
    /// Manifest file, when a run directory was configured.
    pub manifest_path: Option<PathBuf>,
    /// Checkpoint files still on disk after retention.
    pub checkpoints: Vec<PathBuf>,
}

/// Runs a single chain from `init` to completion.
pub fn run(
    config: &RunConfig,
    model: &Model,
    init: &State,
    operators: Vec<Operator>,
) -> Result<RunSummary, PhyloError> {
    let mut chain = Chain::init(
        model,
        init.clone(),
        operators,
        config.seed_policy.master_seed,
        0,
        config.max_numeric_warnings,
    )?;
    let start = -(config.burn_in as i64);
    run_loop(config, &mut chain, start)
}

/// Resumes a run from a checkpoint file.
///
/// The caller supplies the same operator schedule the run started with;
/// tuning values and acceptance counters are restored from the checkpoint by
/// operator name. Because iteration seeds are derived from `(chain, sample)`,
/// the resumed trajectory matches the uninterrupted one exactly.
pub fn resume(
    path: &Path,
    model: &Model,
    mut operators: Vec<Operator>,
) -> Result<RunSummary, PhyloError> {
    let payload = CheckpointPayload::load(path)?;
    let state = State::from_records(&payload.state)?;
    restore_operator_records(&mut operators, &payload.operators)?;
    let mut chain = Chain::init(
        model,
        state,
        operators,
        payload.master_seed,
        0,
        payload.config.max_numeric_warnings,
    )?;
    run_loop(&payload.config, &mut chain, payload.sample + 1)
}

fn run_loop(
    config: &RunConfig,
    chain: &mut Chain,
    start_sample: i64,
) -> Result<RunSummary, PhyloError> {
    let outputs = resolve_outputs(config)?;
    let mut recorder = TraceRecorder::new(trace_columns(chain.state()));
    let mut checkpoints: Vec<PathBuf> = Vec::new();
    let end = config.chain_length as i64;
    for sample in start_sample..end {
        // Tuning pauses on samples the consistency check re-derives.
        let verifying = config.verify.applies(sample);
        let outcome = chain.step(sample, Target::Posterior, !verifying)?;
        if verifying {
            let name = chain.operators()[outcome.operator].name();
            chain.verify(config.verify.tolerance, sample, &name)?;
        }
        if sample >= 0 && (sample as u64) % config.log_every == 0 {
            recorder.push(sample, &chain.current(), trace_values(chain.state()));
        }
        let due = config.checkpoint.interval > 0
            && sample >= 0
            && (sample as u64 + 1) % config.checkpoint.interval == 0;
        if due {
            if let Some(dir) = &outputs.checkpoint_dir {
                let payload = CheckpointPayload {
                    sample,
                    config: config.clone(),
                    master_seed: chain.master_seed(),
                    state: chain.state().to_records(),
                    operators: chain.operators().iter().map(Operator::to_record).collect(),
                };
                let path = checkpoint_path(dir, sample);
                payload.store(&path)?;
                checkpoints.push(path);
                enforce_retention(&mut checkpoints, config.checkpoint.max_to_keep)?;
            }
        }
    }

    let density = chain.current();
    let digest = format!("{:016x}", chain.state().digest());
    if let Some(path) = &outputs.trace {
        recorder.write_tsv(path).map_err(|err| {
            PhyloError::Serde(
                ErrorInfo::new("trace-write", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })?;
    }
    if let Some(path) = &outputs.manifest {
        let manifest = RunManifest {
            config: config.clone(),
            provenance: build_provenance(chain.master_seed(), chain.state().digest()),
            seed_label: config.seed_policy.label.clone(),
            final_state_digest: digest.clone(),
            final_log_posterior: density.total(),
            acceptance_rates: chain.acceptance_rates(),
            trace_file: outputs.trace.clone(),
            checkpoints: checkpoints.clone(),
        };
        manifest.write(path)?;
    }
    Ok(RunSummary {
        final_log_posterior: density.total(),
        final_state_digest: digest,
        acceptance_rates: chain.acceptance_rates(),
        effective_sample_size: recorder.effective_sample_size(),
        final_parameters: recorder.latest_extras(),
        samples: recorder.samples().to_vec(),
        trace_path: outputs.trace,
        manifest_path: outputs.manifest,
        checkpoints,
    })
}

struct ResolvedOutputs {
    trace: Option<PathBuf>,
    manifest: Option<PathBuf>,
    checkpoint_dir: Option<PathBuf>,
}

fn resolve_outputs(config: &RunConfig) -> Result<ResolvedOutputs, PhyloError> {
    match &config.output.run_directory {
        None => Ok(ResolvedOutputs {
            trace: None,
            manifest: None,
            checkpoint_dir: None,
        }),
        Some(root) => {
            fs::create_dir_all(root).map_err(|err| {
                PhyloError::Serde(
                    ErrorInfo::new("run-dir-create", err.to_string())
                        .with_context("path", root.display().to_string()),
                )
            })?;
            Ok(ResolvedOutputs {
                trace: Some(root.join(&config.output.trace_file)),
                manifest: Some(root.join(&config.output.manifest_file)),
                checkpoint_dir: Some(root.join(&config.output.checkpoint_dir)),
            })
        }
    }
}

fn enforce_retention(checkpoints: &mut Vec<PathBuf>, max_to_keep: usize) -> Result<(), PhyloError> {
    if max_to_keep == 0 {
        return Ok(());
    }
    while checkpoints.len() > max_to_keep {
        let stale = checkpoints.remove(0);
        fs::remove_file(&stale).map_err(|err| {
            PhyloError::Serde(
                ErrorInfo::new("checkpoint-prune", err.to_string())
                    .with_context("path", stale.display().to_string()),
            )
        })?;
    }
    Ok(())
}

/// Column names for the trace: every parameter dimension plus the root height.
pub fn trace_columns(state: &State) -> Vec<String> {
    let mut columns = Vec::new();
    for raw in 0..state.param_count() {
        let param = state.param(ParamId::from_raw(raw));
        if param.dimension() == 1 {
            columns.push(param.name().to_string());
        } else {
            for dim in 0..param.dimension() {
                columns.push(format!("{}.{}", param.name(), dim + 1));
            }
        }
    }
    columns.push("rootHeight".to_string());
    columns
}

/// Values matching [`trace_columns`] for the current state.
pub fn trace_values(state: &State) -> Vec<f64> {
    let mut values = Vec::new();
    for raw in 0..state.param_count() {
        values.extend_from_slice(state.param(ParamId::from_raw(raw)).values());
    }
    values.push(state.tree().height(state.tree().root()));
    values
}
