//! Negative log-likelihood of the true tables under the predictions

use super::{Metric, Score, ScoreInputs, ScoreValue};
use crate::data::Extras;
use crate::error::{MetricError, Result};

/// Smallest log-density a cell contributes; keeps `nllk` finite when the
/// data has zero probability under the prediction
pub const MIN_LOG_DENSITY: f64 = -708.3964185322641;

/// Reports `nllk{i}`: the negative mean log-probability of the i-th true
/// table under the i-th predictive distribution. Per-cell log-densities are
/// floored at [`MIN_LOG_DENSITY`].
#[derive(Debug, Clone, Copy, Default)]
pub struct NegativeLogLikelihood;

impl Metric for NegativeLogLikelihood {
    fn default_name(&self) -> &'static str {
        "negativeloglikelihood"
    }

    fn score(&self, inputs: &ScoreInputs<'_>, _extras: Option<&Extras>) -> Result<Score> {
        if inputs.y_true.len() != inputs.y_pred.len() {
            log::debug!(
                "Scoring {} of {} tables ({} predictions)",
                inputs.y_true.len().min(inputs.y_pred.len()),
                inputs.y_true.len(),
                inputs.y_pred.len()
            );
        }

        let mut scores = Vec::with_capacity(inputs.y_pred.len());
        for (i, (table, dist)) in inputs.y_true.iter().zip(inputs.y_pred.iter()).enumerate() {
            let log_prob = dist
                .log_prob(table.matrix().into_dyn())?
                .mapv(|lp| if lp < MIN_LOG_DENSITY { MIN_LOG_DENSITY } else { lp });
            let n_floored = log_prob.iter().filter(|&&lp| lp == MIN_LOG_DENSITY).count();
            if n_floored > 0 {
                log::debug!("Table {}: {} cell log-densities floored", i, n_floored);
            }
            let mean = log_prob.mean().ok_or_else(|| MetricError::EmptyData {
                reason: format!("table {} has no cells to score", i),
            })?;
            scores.push((format!("nllk{}", i), ScoreValue::Scalar(-mean)));
        }
        Ok(Score::mapping(scores))
    }
}
