use std::fs::File;
use std::io::Write;
use std::path::Path;

use indexmap::IndexMap;
use phylo_lik::Density;
use serde::{Deserialize, Serialize};

/// One logged trace row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TraceSample {
    /// Sample number (post burn-in) when the row was recorded.
    pub sample: i64,
    /// Log posterior density.
    pub log_posterior: f64,
    /// Log likelihood component.
    pub log_likelihood: f64,
    /// Log prior component.
    pub log_prior: f64,
    /// Values of the extra columns, in recorder column order.
    pub extras: Vec<f64>,
}

/// Collects trace rows and writes them as tab-separated text.
///
/// The extra columns (parameter dimensions, root height) are declared up
/// front; every pushed row must supply them in the same order.
#[derive(Debug, Default)]
pub struct TraceRecorder {
    columns: Vec<String>,
    samples: Vec<TraceSample>,
}

impl TraceRecorder {
    /// Creates a recorder with the given extra column names.
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            samples: Vec::new(),
        }
    }

    /// Records one row.
    pub fn push(&mut self, sample: i64, density: &Density, extras: Vec<f64>) {
        debug_assert_eq!(extras.len(), self.columns.len());
        self.samples.push(TraceSample {
            sample,
            log_posterior: density.total(),
            log_likelihood: density.log_likelihood,
            log_prior: density.log_prior,
            extras,
        });
    }

    /// Returns an immutable view over the recorded rows.
    pub fn samples(&self) -> &[TraceSample] {
        &self.samples
    }

    /// The last recorded values of the extra columns, keyed by column name.
    pub fn latest_extras(&self) -> IndexMap<String, f64> {
        let mut map = IndexMap::new();
        if let Some(last) = self.samples.last() {
            for (name, value) in self.columns.iter().zip(&last.extras) {
                map.insert(name.clone(), *value);
            }
        }
        map
    }

    /// Effective sample size of the log posterior series.
    ///
    /// Uses the initial-positive-sequence estimator: autocovariances are
    /// summed until the first negative lag, which is where the noise in the
    /// empirical autocorrelation starts to dominate.
    pub fn effective_sample_size(&self) -> f64 {
        let values: Vec<f64> = self.samples.iter().map(|s| s.log_posterior).collect();
        let n = values.len();
        if n < 2 {
            return n as f64;
        }
        let mean = values.iter().sum::<f64>() / n as f64;
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64;
        if var <= 0.0 {
            return n as f64;
        }
        let mut rho_sum = 0.0;
        for lag in 1..n {
            let mut cov = 0.0;
            for i in 0..n - lag {
                cov += (values[i] - mean) * (values[i + lag] - mean);
            }
            let rho = cov / (n as f64 * var);
            if rho < 0.0 {
                break;
            }
            rho_sum += rho;
        }
        (n as f64 / (1.0 + 2.0 * rho_sum)).max(1.0)
    }

    /// Writes the recorded rows to a TSV file with a header line.
    pub fn write_tsv<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let mut file = File::create(path)?;
        write!(file, "sample\tposterior\tlikelihood\tprior")?;
        for column in &self.columns {
            write!(file, "\t{column}")?;
        }
        writeln!(file)?;
        for row in &self.samples {
            write!(
                file,
                "{}\t{:.6}\t{:.6}\t{:.6}",
                row.sample, row.log_posterior, row.log_likelihood, row.log_prior
            )?;
            for value in &row.extras {
                write!(file, "\t{value:.6}")?;
            }
            writeln!(file)?;
        }
        Ok(())
    }
}
