//! Site-pattern compressed sequence data.

use std::collections::BTreeMap;

use phylo_core::errors::ErrorInfo;
use phylo_core::PhyloError;

/// Aligned sequences compressed into weighted site patterns.
///
/// States are coded `0..state_count`; any code `>= state_count` is treated
/// as fully ambiguous (a gap) and contributes a factor of one to every
/// conditional likelihood it enters. Identical alignment columns are
/// collapsed into a single pattern with an integer weight.
#[derive(Debug, Clone, PartialEq)]
pub struct Alignment {
    state_count: usize,
    taxa: Vec<String>,
    // patterns[p][taxon] = coded state of taxon at pattern p
    patterns: Vec<Vec<u8>>,
    weights: Vec<u32>,
    classes: Vec<PatternClass>,
    site_count: usize,
}

/// How a pattern interacts with the proportion-invariant correction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternClass {
    /// Two or more distinct observed states; never an invariant site.
    Variable,
    /// Every observed code agrees on this state.
    Constant(usize),
    /// No observed codes at all; compatible with every invariant state, so
    /// the column multiplies through as identity.
    AllAmbiguous,
}

impl Alignment {
    /// Compresses coded sequences into site patterns.
    ///
    /// All sequences must have the same length and at least one site.
    pub fn from_sequences(
        state_count: usize,
        sequences: Vec<(String, Vec<u8>)>,
    ) -> Result<Self, PhyloError> {
        if sequences.len() < 2 {
            return Err(PhyloError::Likelihood(ErrorInfo::new(
                "too-few-sequences",
                "an alignment needs at least two sequences",
            )));
        }
        let site_count = sequences[0].1.len();
        if site_count == 0 {
            return Err(PhyloError::Likelihood(ErrorInfo::new(
                "empty-alignment",
                "sequences contain no sites",
            )));
        }
        for (label, seq) in &sequences {
            if seq.len() != site_count {
                return Err(PhyloError::Likelihood(
                    ErrorInfo::new("ragged-alignment", "sequence length mismatch")
                        .with_context("taxon", label.clone())
                        .with_context("expected", site_count.to_string())
                        .with_context("actual", seq.len().to_string()),
                ));
            }
        }

        let taxa: Vec<String> = sequences.iter().map(|(label, _)| label.clone()).collect();
        let mut pattern_weights = BTreeMap::<Vec<u8>, u32>::new();
        for site in 0..site_count {
            let column: Vec<u8> = sequences.iter().map(|(_, seq)| seq[site]).collect();
            *pattern_weights.entry(column).or_insert(0) += 1;
        }

        let mut patterns = Vec::with_capacity(pattern_weights.len());
        let mut weights = Vec::with_capacity(pattern_weights.len());
        let mut classes = Vec::with_capacity(pattern_weights.len());
        for (column, weight) in pattern_weights {
            classes.push(classify(&column, state_count));
            patterns.push(column);
            weights.push(weight);
        }

        Ok(Self {
            state_count,
            taxa,
            patterns,
            weights,
            classes,
            site_count,
        })
    }

    /// Size of the state alphabet.
    pub fn state_count(&self) -> usize {
        self.state_count
    }

    /// Number of distinct site patterns.
    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }

    /// Number of alignment columns before compression.
    pub fn site_count(&self) -> usize {
        self.site_count
    }

    /// Taxon labels in sequence order.
    pub fn taxa(&self) -> &[String] {
        &self.taxa
    }

    /// Row index of a taxon label, if present.
    pub fn taxon_index(&self, label: &str) -> Option<usize> {
        self.taxa.iter().position(|t| t == label)
    }

    /// Coded state of `taxon` at `pattern`.
    pub fn code(&self, pattern: usize, taxon: usize) -> u8 {
        self.patterns[pattern][taxon]
    }

    /// Multiplicity of each pattern.
    pub fn weights(&self) -> &[u32] {
        &self.weights
    }

    /// Invariant-site classification of a pattern, used for the
    /// proportion-invariant correction at the root.
    pub fn pattern_class(&self, pattern: usize) -> PatternClass {
        self.classes[pattern]
    }
}

fn classify(column: &[u8], state_count: usize) -> PatternClass {
    let mut observed = None;
    for &code in column {
        if (code as usize) >= state_count {
            continue;
        }
        match observed {
            None => observed = Some(code as usize),
            Some(state) if state != code as usize => return PatternClass::Variable,
            Some(_) => {}
        }
    }
    match observed {
        Some(state) => PatternClass::Constant(state),
        None => PatternClass::AllAmbiguous,
    }
}
