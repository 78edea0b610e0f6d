use std::fs;
use std::path::{Path, PathBuf};

use phylo_core::{ErrorInfo, PhyloError};
use serde::{Deserialize, Serialize};

/// YAML-configurable parameters governing a sampling run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Number of samples to draw (post burn-in).
    pub chain_length: u64,
    /// Number of initial samples to discard before the trace starts.
    #[serde(default)]
    pub burn_in: u64,
    /// Interval at which to record trace rows.
    #[serde(default = "default_log_every")]
    pub log_every: u64,
    /// Cross-checking of incremental evaluation against full recomputation.
    #[serde(default)]
    pub verify: VerifyConfig,
    /// Maximum number of numeric proposal failures tolerated before aborting.
    #[serde(default = "default_max_numeric_warnings")]
    pub max_numeric_warnings: u64,
    /// Checkpointing behaviour.
    #[serde(default)]
    pub checkpoint: CheckpointConfig,
    /// Master seed and substream policy.
    #[serde(default)]
    pub seed_policy: SeedPolicy,
    /// Output directory configuration.
    #[serde(default)]
    pub output: OutputConfig,
}

impl RunConfig {
    /// Loads a configuration from a YAML file.
    pub fn load_yaml(path: &Path) -> Result<Self, PhyloError> {
        let contents = fs::read_to_string(path).map_err(|err| {
            PhyloError::Serde(
                ErrorInfo::new("config-read", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })?;
        serde_yaml::from_str(&contents).map_err(|err| {
            PhyloError::Serde(
                ErrorInfo::new("config-parse", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })
    }
}

fn default_log_every() -> u64 {
    10
}

fn default_max_numeric_warnings() -> u64 {
    100
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            chain_length: 10_000,
            burn_in: 0,
            log_every: default_log_every(),
            verify: VerifyConfig::default(),
            max_numeric_warnings: default_max_numeric_warnings(),
            checkpoint: CheckpointConfig::default(),
            seed_policy: SeedPolicy::default(),
            output: OutputConfig::default(),
        }
    }
}

/// Configuration for the full-vs-incremental consistency check.
///
/// The check is expensive (it discards all caches), so it is confined to a
/// window at the start of the run where bookkeeping bugs are most likely to
/// surface, and thinned within that window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyConfig {
    /// Number of leading samples inside which verification may run (0 disables).
    #[serde(default = "default_verify_budget")]
    pub budget: u64,
    /// Verify every n-th sample within the budget window.
    #[serde(default = "default_verify_every")]
    pub every: u64,
    /// Maximum tolerated absolute difference in log posterior.
    #[serde(default = "default_verify_tolerance")]
    pub tolerance: f64,
}

fn default_verify_budget() -> u64 {
    1_000
}

fn default_verify_every() -> u64 {
    10
}

fn default_verify_tolerance() -> f64 {
    1e-6
}

impl VerifyConfig {
    /// Whether the consistency check should run after the given sample.
    pub fn applies(&self, sample: i64) -> bool {
        if sample < 0 || self.every == 0 {
            return false;
        }
        let sample = sample as u64;
        sample < self.budget && sample % self.every == 0
    }
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            budget: default_verify_budget(),
            every: default_verify_every(),
            tolerance: default_verify_tolerance(),
        }
    }
}

/// Temperature ladder construction settings for tempered runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LadderConfig {
    /// Number of chains in the ladder (the coldest targets the posterior).
    #[serde(default = "default_chains")]
    pub chains: usize,
    /// Temperature of the coldest chain.
    #[serde(default = "default_base_temperature")]
    pub base_temperature: f64,
    /// Policy used to generate higher temperatures.
    #[serde(default)]
    pub policy: LadderPolicy,
    /// Samples between neighbouring-pair exchange attempts.
    #[serde(default = "default_exchange_every")]
    pub exchange_every: u64,
}

fn default_chains() -> usize {
    3
}

fn default_base_temperature() -> f64 {
    1.0
}

fn default_exchange_every() -> u64 {
    100
}

impl Default for LadderConfig {
    fn default() -> Self {
        Self {
            chains: default_chains(),
            base_temperature: default_base_temperature(),
            policy: LadderPolicy::default(),
            exchange_every: default_exchange_every(),
        }
    }
}

/// Supported ladder construction strategies.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum LadderPolicy {
    /// Geometric progression with a fixed ratio between neighbouring chains.
    Geometric {
        /// Multiplicative spacing ratio between adjacent chains.
        #[serde(default = "default_ratio")]
        ratio: f64,
    },
    /// Explicit list of temperatures supplied by the user (overrides `chains`).
    Manual {
        /// Ordered list of temperatures assigned to chains.
        temperatures: Vec<f64>,
    },
}

fn default_ratio() -> f64 {
    1.5
}

impl Default for LadderPolicy {
    fn default() -> Self {
        LadderPolicy::Geometric {
            ratio: default_ratio(),
        }
    }
}

/// Checkpointing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointConfig {
    /// Interval in samples between checkpoint writes (0 disables checkpoints).
    #[serde(default)]
    pub interval: u64,
    /// Maximum number of checkpoints to retain.
    #[serde(default = "default_checkpoint_retention")]
    pub max_to_keep: usize,
}

fn default_checkpoint_retention() -> usize {
    4
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            interval: 0,
            max_to_keep: default_checkpoint_retention(),
        }
    }
}

/// Deterministic seeding configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedPolicy {
    /// Master seed used for the run.
    #[serde(default = "default_master_seed")]
    pub master_seed: u64,
    /// Optional label used when deriving substream seeds (documented in manifests).
    #[serde(default)]
    pub label: Option<String>,
}

fn default_master_seed() -> u64 {
    0x05EE_D5EE_DD15_5EED_u64
}

impl Default for SeedPolicy {
    fn default() -> Self {
        Self {
            master_seed: default_master_seed(),
            label: None,
        }
    }
}

/// Output directory layout configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Root directory for run artefacts. Created if it does not exist.
    #[serde(default)]
    pub run_directory: Option<PathBuf>,
    /// Trace filename relative to `run_directory`.
    #[serde(default = "default_trace_filename")]
    pub trace_file: PathBuf,
    /// Manifest filename relative to `run_directory`.
    #[serde(default = "default_manifest_filename")]
    pub manifest_file: PathBuf,
    /// Subdirectory used for checkpoint files.
    #[serde(default = "default_checkpoint_dir")]
    pub checkpoint_dir: PathBuf,
}

fn default_trace_filename() -> PathBuf {
    PathBuf::from("trace.tsv")
}

fn default_manifest_filename() -> PathBuf {
    PathBuf::from("manifest.json")
}

fn default_checkpoint_dir() -> PathBuf {
    PathBuf::from("checkpoints")
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            run_directory: None,
            trace_file: default_trace_filename(),
            manifest_file: default_manifest_filename(),
            checkpoint_dir: default_checkpoint_dir(),
        }
    }
}
