use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use phylo_core::{ErrorInfo, PhyloError, RunProvenance};
use serde::{Deserialize, Serialize};

use crate::config::RunConfig;

/// Structured manifest describing a completed or running sampling run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    /// Configuration used for the run.
    pub config: RunConfig,
    /// Seed, data digest and timestamp provenance.
    pub provenance: RunProvenance,
    /// Optional seed label captured from the configuration.
    pub seed_label: Option<String>,
    /// Digest of the terminal sampler state.
    pub final_state_digest: String,
    /// Log posterior at the final sample.
    pub final_log_posterior: f64,
    /// Acceptance rate per operator name.
    pub acceptance_rates: BTreeMap<String, f64>,
    /// Trace file produced during the run (relative to run directory).
    pub trace_file: Option<PathBuf>,
    /// Checkpoint files generated during the run (write order preserved).
    pub checkpoints: Vec<PathBuf>,
}

/// Builds the provenance block stamped into manifests.
pub fn build_provenance(seed: u64, data_digest: u64) -> RunProvenance {
    let mut tool_versions = BTreeMap::new();
    tool_versions.insert(
        env!("CARGO_PKG_NAME").to_string(),
        env!("CARGO_PKG_VERSION").to_string(),
    );
    RunProvenance {
        seed,
        data_digest: format!("{data_digest:016x}"),
        created_at: chrono::Utc::now().to_rfc3339(),
        tool_versions,
    }
}

impl RunManifest {
    /// Writes the manifest to a JSON file.
    pub fn write(&self, path: &Path) -> Result<(), PhyloError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| {
                PhyloError::Serde(
                    ErrorInfo::new("manifest-mkdir", err.to_string())
                        .with_context("path", parent.display().to_string()),
                )
            })?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|err| {
            PhyloError::Serde(
                ErrorInfo::new("manifest-serialize", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })?;
        fs::write(path, json).map_err(|err| {
            PhyloError::Serde(
                ErrorInfo::new("manifest-write", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })
    }

    /// Loads a manifest from disk.
    pub fn load(path: &Path) -> Result<Self, PhyloError> {
        let contents = fs::read_to_string(path).map_err(|err| {
            PhyloError::Serde(
                ErrorInfo::new("manifest-read", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })?;
        serde_json::from_str(&contents).map_err(|err| {
            PhyloError::Serde(
                ErrorInfo::new("manifest-parse", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })
    }
}
