//! Reference model: per-feature count distributions scaled by library size
//!
//! Each feature gets a mean (after dividing cells by their size factor), a
//! method-of-moments negative binomial dispersion and, for the zero-inflated
//! families, the fraction of zeros the count model cannot explain. The fit is
//! recomputed from whatever inputs `predict` receives, so it denoises
//! corrupted inputs by borrowing strength across cells.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use ndarray::{stack, Array2, ArrayView1, ArrayD, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::{GenerativeModel, PredictOptions, Prediction};
use crate::data::{CorruptionDist, CorruptionParams, ExpressionTable, OneOrMany};
use crate::distribution::Distribution;
use crate::error::{MetricError, Result};
use crate::rng::rng_from_seed;

/// Smallest dispersion used when a feature looks Poisson or under-dispersed
pub const MIN_DISPERSION: f64 = 1e-8;

/// Count family of the baseline's predictive distribution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BaselineFamily {
    Poisson,
    #[serde(rename = "nb")]
    NegativeBinomial,
    #[serde(rename = "zip")]
    ZeroInflatedPoisson,
    #[default]
    #[serde(rename = "zinb")]
    ZeroInflatedNegativeBinomial,
}

impl BaselineFamily {
    fn is_zero_inflated(self) -> bool {
        matches!(
            self,
            BaselineFamily::ZeroInflatedPoisson | BaselineFamily::ZeroInflatedNegativeBinomial
        )
    }

    fn is_negative_binomial(self) -> bool {
        matches!(
            self,
            BaselineFamily::NegativeBinomial | BaselineFamily::ZeroInflatedNegativeBinomial
        )
    }
}

impl fmt::Display for BaselineFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BaselineFamily::Poisson => "poisson",
            BaselineFamily::NegativeBinomial => "nb",
            BaselineFamily::ZeroInflatedPoisson => "zip",
            BaselineFamily::ZeroInflatedNegativeBinomial => "zinb",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for BaselineFamily {
    type Err = MetricError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "poisson" => Ok(BaselineFamily::Poisson),
            "nb" => Ok(BaselineFamily::NegativeBinomial),
            "zip" => Ok(BaselineFamily::ZeroInflatedPoisson),
            "zinb" => Ok(BaselineFamily::ZeroInflatedNegativeBinomial),
            other => Err(MetricError::InvalidInput {
                reason: format!("Unknown model family '{}'. Use poisson, nb, zip or zinb.", other),
            }),
        }
    }
}

/// Per-feature parameters
#[derive(Debug, Clone, Copy)]
struct FeatureFit {
    mean: f64,
    dispersion: f64,
    dropout: f64,
}

/// Fit one feature from its size-factor normalised values
fn fit_feature(values: ArrayView1<'_, f64>, family: BaselineFamily) -> FeatureFit {
    let n = values.len() as f64;
    let mean = values.sum() / n;
    let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;

    let dispersion = if family.is_negative_binomial() && mean > 0.0 {
        ((var - mean) / (mean * mean)).max(MIN_DISPERSION)
    } else {
        MIN_DISPERSION
    };

    let dropout = if family.is_zero_inflated() {
        let zero_frac = values.iter().filter(|&&v| v == 0.0).count() as f64 / n;
        let p0 = if family.is_negative_binomial() {
            (1.0 + dispersion * mean).powf(-1.0 / dispersion)
        } else {
            (-mean).exp()
        };
        if p0 < 1.0 {
            ((zero_frac - p0) / (1.0 - p0)).clamp(0.0, 1.0)
        } else {
            0.0
        }
    } else {
        0.0
    };

    FeatureFit {
        mean,
        dispersion,
        dropout,
    }
}

/// Library-size baseline implementing [`GenerativeModel`]
#[derive(Debug, Clone, Default)]
pub struct BaselineModel {
    family: BaselineFamily,
    corruption: Option<CorruptionParams>,
    seed: Option<u64>,
}

impl BaselineModel {
    pub fn new(family: BaselineFamily) -> Self {
        Self {
            family,
            corruption: None,
            seed: None,
        }
    }

    /// Declare the corruption the model was trained with
    pub fn with_corruption(mut self, params: CorruptionParams) -> Self {
        self.corruption = Some(params);
        self
    }

    /// Seed for corruption applied inside `predict`
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn family(&self) -> BaselineFamily {
        self.family
    }

    fn predict_table(&self, table: &ExpressionTable, options: &PredictOptions) -> Result<Distribution> {
        let (n_cells, n_features) = table.matrix().dim();
        if n_cells == 0 || n_features == 0 {
            return Err(MetricError::EmptyData {
                reason: "cannot fit baseline on an empty table".to_string(),
            });
        }

        let lib_sizes = table.library_sizes();
        let mean_lib = lib_sizes.iter().sum::<f64>() / n_cells as f64;
        let size_factors: Vec<f64> = lib_sizes
            .iter()
            .map(|&l| if mean_lib > 0.0 && l > 0.0 { l / mean_lib } else { 1.0 })
            .collect();

        let normalized = Array2::from_shape_fn((n_cells, n_features), |(i, j)| {
            table.matrix()[[i, j]] / size_factors[i]
        });

        // Fit each feature in parallel
        let fits: Vec<FeatureFit> = (0..n_features)
            .into_par_iter()
            .map(|j| fit_feature(normalized.column(j), self.family))
            .collect();

        let batch_size = options.batch_size.max(1);
        let mut mean = Array2::zeros((n_cells, n_features));
        for (b, mut rows) in mean.axis_chunks_iter_mut(Axis(0), batch_size).enumerate() {
            let offset = b * batch_size;
            for (k, mut row) in rows.axis_iter_mut(Axis(0)).enumerate() {
                let s = size_factors[offset + k];
                row.iter_mut().zip(fits.iter()).for_each(|(m, fit)| *m = s * fit.mean);
            }
            if options.verbose > 0 {
                log::debug!("Predicted batch {} ({} cells)", b, rows.nrows());
            }
        }

        let per_feature = |f: fn(&FeatureFit) -> f64| {
            Array2::from_shape_fn((n_cells, n_features), |(_, j)| f(&fits[j]))
        };
        let expand = |a: Array2<f64>| -> Result<ArrayD<f64>> {
            if options.n_samples <= 1 {
                return Ok(a.into_dyn());
            }
            let views = vec![a.view(); options.n_samples];
            stack(Axis(0), &views)
                .map(|s| s.into_dyn())
                .map_err(|e| MetricError::DimensionMismatch {
                    expected: "stackable posterior samples".to_string(),
                    got: e.to_string(),
                })
        };

        let count = if self.family.is_negative_binomial() {
            Distribution::negative_binomial(expand(mean)?, expand(per_feature(|f| f.dispersion))?)?
        } else {
            Distribution::poisson(expand(mean)?)?
        };
        let element = if self.family.is_zero_inflated() {
            Distribution::zero_inflated(count, expand(per_feature(|f| f.dropout))?)?
        } else {
            count
        };
        Distribution::independent(element, 1)
    }

    fn latent_code(&self, table: &ExpressionTable) -> Result<Distribution> {
        let loc = Array2::from_shape_vec(
            (table.n_cells(), 1),
            table.library_sizes().iter().map(|l| l.max(0.0).ln_1p()).collect(),
        )
        .map_err(|e| MetricError::DimensionMismatch {
            expected: format!("{} latent rows", table.n_cells()),
            got: e.to_string(),
        })?;
        let scale = Array2::from_elem(loc.raw_dim(), 1.0);
        Distribution::independent(Distribution::normal(loc.into_dyn(), scale.into_dyn())?, 1)
    }
}

impl GenerativeModel for BaselineModel {
    fn corruption_rate(&self) -> Option<f64> {
        self.corruption.map(|c| c.rate)
    }

    fn corruption_dist(&self) -> CorruptionDist {
        self.corruption.map(|c| c.dist).unwrap_or_default()
    }

    fn predict(&self, inputs: &[ExpressionTable], options: &PredictOptions) -> Result<Prediction> {
        let first = inputs.first().ok_or_else(|| MetricError::InvalidInput {
            reason: "predict needs at least one input table".to_string(),
        })?;

        let first: Cow<'_, ExpressionTable> = match (options.apply_corruption, &self.corruption) {
            (true, Some(params)) => Cow::Owned(first.corrupt(params, &mut rng_from_seed(self.seed))?),
            _ => Cow::Borrowed(first),
        };

        log::debug!(
            "Baseline {} predicting {} table(s), {} sample(s)",
            self.family,
            inputs.len(),
            options.n_samples
        );

        let mut outputs = Vec::with_capacity(inputs.len());
        outputs.push(self.predict_table(&first, options)?);
        for table in &inputs[1..] {
            outputs.push(self.predict_table(table, options)?);
        }

        let outputs = if outputs.len() == 1 {
            OneOrMany::One(outputs.remove(0))
        } else {
            OneOrMany::Many(outputs)
        };

        Ok(Prediction {
            outputs,
            latents: OneOrMany::One(self.latent_code(&first)?),
        })
    }
}
