//! Generative model capability consumed by the metrics

mod baseline;

use crate::data::{CorruptionDist, ExpressionTable, OneOrMany};
use crate::distribution::Distribution;
use crate::error::{MetricError, Result};

pub use baseline::{BaselineFamily, BaselineModel};

/// Options forwarded to [`GenerativeModel::predict`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PredictOptions {
    /// Posterior samples to draw per cell
    pub n_samples: usize,
    pub batch_size: usize,
    pub verbose: usize,
    /// Whether the model should corrupt its inputs itself
    pub apply_corruption: bool,
}

impl Default for PredictOptions {
    fn default() -> Self {
        Self {
            n_samples: 1,
            batch_size: 128,
            verbose: 0,
            apply_corruption: true,
        }
    }
}

/// Output of one inference call
#[derive(Debug, Clone)]
pub struct Prediction {
    /// Predictive distribution per input table
    pub outputs: OneOrMany<Distribution>,
    /// Per-cell latent code distribution(s)
    pub latents: OneOrMany<Distribution>,
}

/// A trained model that can be evaluated by the metrics.
///
/// Inference is only ever called through shared references; implementations
/// that cache state must synchronise it themselves.
pub trait GenerativeModel {
    /// Fraction of entries corrupted during training, if any
    fn corruption_rate(&self) -> Option<f64>;

    fn corruption_dist(&self) -> CorruptionDist;

    fn predict(&self, inputs: &[ExpressionTable], options: &PredictOptions) -> Result<Prediction>;
}

/// Check that a model's declared configuration is usable for evaluation
pub fn validate_model(model: &dyn GenerativeModel) -> Result<()> {
    if let Some(rate) = model.corruption_rate() {
        if !rate.is_finite() || !(0.0..=1.0).contains(&rate) {
            return Err(MetricError::contract(format!(
                "model declares corruption rate {} outside [0, 1]",
                rate
            )));
        }
    }
    Ok(())
}
