//! Structured error types shared across the phylo crates.
//!
//! Three tiers exist at runtime. Structurally invalid proposals are not
//! errors at all (they are reported through the proposal result type in
//! `phylo-mcmc`). Numeric trouble during a density evaluation surfaces as
//! [`PhyloError::Numeric`] and is counted against a configured budget by the
//! kernel. [`PhyloError::Verify`] and structural invariant violations on an
//! accepted state are unconditionally fatal.

use std::collections::BTreeMap;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structured payload attached to every [`PhyloError`] variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable machine readable error code.
    pub code: String,
    /// Human readable diagnostic message.
    pub message: String,
    /// Contextual key value pairs (identifiers, sizes, operator names).
    #[serde(default)]
    pub context: BTreeMap<String, String>,
    /// Optional hint that may help the caller resolve the issue.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ErrorInfo {
    /// Creates a new error payload with the provided code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            context: BTreeMap::new(),
            hint: None,
        }
    }

    /// Adds a context entry to the payload.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Sets a human readable hint for remediation.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

/// Canonical error type for the phylo engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "family", content = "detail")]
pub enum PhyloError {
    /// Transactional state and parameter store errors.
    #[error("state error: {0}")]
    State(ErrorInfo),
    /// Tree structural errors (height inversion, orphaned node).
    #[error("tree error: {0}")]
    Tree(ErrorInfo),
    /// Likelihood / posterior evaluation errors.
    #[error("likelihood error: {0}")]
    Likelihood(ErrorInfo),
    /// Mathematically undefined density evaluation (budgeted tier).
    #[error("numeric error: {0}")]
    Numeric(ErrorInfo),
    /// Incremental-vs-full verification mismatch (fatal tier).
    #[error("verify error: {0}")]
    Verify(ErrorInfo),
    /// Randomness and seeding errors.
    #[error("rng error: {0}")]
    Rng(ErrorInfo),
    /// Serialization and schema errors.
    #[error("serde error: {0}")]
    Serde(ErrorInfo),
}

impl Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code: {})", self.message, self.code)?;
        if !self.context.is_empty() {
            write!(f, " | context: [")?;
            for (idx, (key, value)) in self.context.iter().enumerate() {
                if idx > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{key}={value}")?;
            }
            write!(f, "]")?;
        }
        if let Some(hint) = &self.hint {
            write!(f, " | hint: {hint}")?;
        }
        Ok(())
    }
}

impl PhyloError {
    /// Returns a reference to the payload describing the error.
    pub fn info(&self) -> &ErrorInfo {
        match self {
            PhyloError::State(info)
            | PhyloError::Tree(info)
            | PhyloError::Likelihood(info)
            | PhyloError::Numeric(info)
            | PhyloError::Verify(info)
            | PhyloError::Rng(info)
            | PhyloError::Serde(info) => info,
        }
    }

    /// True for the budgeted numeric-warning tier.
    pub fn is_numeric(&self) -> bool {
        matches!(self, PhyloError::Numeric(_))
    }
}
