use std::fs;
use std::path::{Path, PathBuf};

use phylo_core::{ErrorInfo, PhyloError};
use phylo_state::StateRecords;
use serde::{Deserialize, Serialize};

/// Serialized tuning and acceptance counters for one operator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorRecord {
    /// Stable operator name, used to match records on resume.
    pub name: String,
    /// Tuning value at checkpoint time.
    pub tuning: f64,
    /// Accepted proposal count.
    pub accepted: u64,
    /// Rejected proposal count.
    pub rejected: u64,
}

/// Serializable payload representing a checkpointed chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointPayload {
    /// Sample number when the checkpoint was written.
    pub sample: i64,
    /// Configuration snapshot associated with the run.
    pub config: crate::config::RunConfig,
    /// Master seed used to derive per-iteration substreams.
    pub master_seed: u64,
    /// Full sampler state at checkpoint time.
    pub state: StateRecords,
    /// Operator tuning and acceptance counters.
    pub operators: Vec<OperatorRecord>,
}

impl CheckpointPayload {
    /// Restores the payload from disk.
    pub fn load(path: &Path) -> Result<Self, PhyloError> {
        let contents = fs::read_to_string(path).map_err(|err| {
            PhyloError::Serde(
                ErrorInfo::new("checkpoint-read", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })?;
        serde_json::from_str(&contents).map_err(|err| {
            PhyloError::Serde(
                ErrorInfo::new("checkpoint-parse", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })
    }

    /// Writes the payload to disk.
    pub fn store(&self, path: &Path) -> Result<(), PhyloError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| {
                PhyloError::Serde(
                    ErrorInfo::new("checkpoint-mkdir", err.to_string())
                        .with_context("path", parent.display().to_string()),
                )
            })?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|err| {
            PhyloError::Serde(
                ErrorInfo::new("checkpoint-serialize", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })?;
        fs::write(path, json).map_err(|err| {
            PhyloError::Serde(
                ErrorInfo::new("checkpoint-write", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })
    }
}

/// Determines the checkpoint file path using a deterministic numbering scheme.
pub fn checkpoint_path(root: &Path, sample: i64) -> PathBuf {
    root.join(format!("ckpt_{sample:08}.json"))
}
