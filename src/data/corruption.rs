//! Artificial corruption of expression values for denoising benchmarks
//!
//! A fraction of entries is picked without replacement and thinned, so the
//! corrupted copy can later be compared cell-for-cell with the original.

use std::fmt;
use std::str::FromStr;

use ndarray::Array2;
use rand::seq::index::sample;
use rand::Rng;
use rand_distr::{Binomial, Distribution as _};
use serde::{Deserialize, Serialize};

use super::ExpressionTable;
use crate::error::{MetricError, Result};

/// Probability that a picked count survives corruption
pub const DEFAULT_RETAIN_RATE: f64 = 0.2;

/// How picked entries are corrupted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CorruptionDist {
    /// Pick among nonzero entries; each picked entry is kept with
    /// probability `retain_rate`, otherwise dropped to zero.
    Uniform,
    /// Pick among all entries; each picked count `n` becomes
    /// `Binomial(n, retain_rate)`.
    #[default]
    Binomial,
}

impl fmt::Display for CorruptionDist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CorruptionDist::Uniform => write!(f, "uniform"),
            CorruptionDist::Binomial => write!(f, "binomial"),
        }
    }
}

impl FromStr for CorruptionDist {
    type Err = MetricError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "uniform" => Ok(CorruptionDist::Uniform),
            "binomial" => Ok(CorruptionDist::Binomial),
            other => Err(MetricError::InvalidInput {
                reason: format!("Unknown corruption distribution '{}'. Use 'uniform' or 'binomial'.", other),
            }),
        }
    }
}

/// Parameters of the corruption process
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CorruptionParams {
    /// Fraction of candidate entries to corrupt
    pub rate: f64,
    pub dist: CorruptionDist,
    pub retain_rate: f64,
}

impl CorruptionParams {
    pub fn new(rate: f64, dist: CorruptionDist) -> Self {
        Self {
            rate,
            dist,
            retain_rate: DEFAULT_RETAIN_RATE,
        }
    }

    pub fn with_retain_rate(mut self, retain_rate: f64) -> Self {
        self.retain_rate = retain_rate;
        self
    }

    fn validate(&self) -> Result<()> {
        for (label, value) in [("rate", self.rate), ("retain rate", self.retain_rate)] {
            if !(0.0..=1.0).contains(&value) {
                return Err(MetricError::InvalidInput {
                    reason: format!("corruption {} must be in [0, 1], got {}", label, value),
                });
            }
        }
        Ok(())
    }
}

impl ExpressionTable {
    /// Return a corrupted copy; the source table is left untouched.
    pub fn corrupt<R: Rng + ?Sized>(&self, params: &CorruptionParams, rng: &mut R) -> Result<Self> {
        params.validate()?;

        let mut corrupted: Array2<f64> = self.matrix().to_owned();
        let n_features = corrupted.ncols();

        let candidates: Vec<(usize, usize)> = match params.dist {
            CorruptionDist::Uniform => corrupted
                .indexed_iter()
                .filter(|(_, &x)| x != 0.0)
                .map(|(ij, _)| ij)
                .collect(),
            CorruptionDist::Binomial => (0..corrupted.len())
                .map(|k| (k / n_features, k % n_features))
                .collect(),
        };

        let n_pick = (params.rate * candidates.len() as f64).floor() as usize;
        let picked = sample(rng, candidates.len(), n_pick);

        let mut n_changed = 0usize;
        for k in picked.iter() {
            let (i, j) = candidates[k];
            let original = corrupted[[i, j]];
            let value = match params.dist {
                CorruptionDist::Uniform => {
                    if rng.random_bool(params.retain_rate) {
                        original
                    } else {
                        0.0
                    }
                }
                CorruptionDist::Binomial => {
                    let trials = original.max(0.0).round() as u64;
                    let binomial = Binomial::new(trials, params.retain_rate).map_err(|e| {
                        MetricError::InvalidInput {
                            reason: format!("binomial corruption failed: {}", e),
                        }
                    })?;
                    binomial.sample(rng) as f64
                }
            };
            if value != original {
                n_changed += 1;
            }
            corrupted[[i, j]] = value;
        }

        log::debug!(
            "Corrupted {} of {} picked entries ({}, rate={}, retain={})",
            n_changed,
            n_pick,
            params.dist,
            params.rate,
            params.retain_rate
        );

        self.with_matrix(corrupted)
    }
}
