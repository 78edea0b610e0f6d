#![deny(missing_docs)]

//! Deterministic Metropolis-Hastings drivers over the cached phylogenetic
//! posterior: the single-chain kernel with checkpointing and trace output,
//! self-tuning operators, parallel tempering, and the annealing,
//! path-sampling and particle variants.

/// Checkpoint serialization helpers and payload structures.
pub mod checkpoint;
/// YAML configuration schema and defaults.
pub mod config;
/// Deterministic seed derivation helpers.
pub mod determinism;
/// Core sampling kernel and public `run`/`resume` entry points.
pub mod kernel;
/// Run manifest serialization helpers.
pub mod manifest;
/// Parameter proposal moves.
pub mod moves_param;
/// Tree height and topology proposal moves.
pub mod moves_tree;
/// Operator schedule, tuning and bookkeeping.
pub mod operators;
/// Parallel tempering ladder and exchange driver.
pub mod tempering;
/// Trace recording and effective-sample-size estimation.
pub mod trace;
/// Annealing, path-sampling and particle drivers.
pub mod variants;

pub use checkpoint::{checkpoint_path, CheckpointPayload, OperatorRecord};
pub use config::{
    CheckpointConfig, LadderConfig, LadderPolicy, OutputConfig, RunConfig, SeedPolicy,
    VerifyConfig,
};
pub use kernel::{resume, run, Chain, RunSummary, StepOutcome, Target};
pub use manifest::RunManifest;
pub use operators::{MoveKind, Operator, Proposal};
pub use tempering::{build_ladder, run_tempered, TemperingSummary};
pub use trace::{TraceRecorder, TraceSample};
pub use variants::{
    run_annealed, run_particles, run_path_sampling, AnnealSchedule, AnnealSummary,
    ParticleConfig, ParticleSummary, PathConfig, PathSamplingSummary,
};
