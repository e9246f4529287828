//! Correlation of predicted gene expression with measured protein levels

use super::{Metric, Score, ScoreInputs};
use crate::data::Extras;
use crate::distribution::expected_expression;
use crate::error::{MetricError, Result};
use crate::scoring::correlation_scores;
use crate::stats::{mean, median};

/// Requires the protein table as extras, indexed by the same cells the first
/// input table was taken from. Reports `pearson_mean`, `spearman_mean`,
/// `pearson_med` and `spearman_med` over matched gene/protein pairs.
#[derive(Debug, Clone, Copy, Default)]
pub struct Correlation;

impl Metric for Correlation {
    fn default_name(&self) -> &'static str {
        "correlation"
    }

    fn score(&self, inputs: &ScoreInputs<'_>, extras: Option<&Extras>) -> Result<Score> {
        let protein = match extras {
            Some(Extras::Table(table)) => table,
            Some(Extras::Matrix(_)) => {
                return Err(MetricError::contract(
                    "correlation extras must be a protein expression table with cell identifiers",
                ))
            }
            None => return Err(MetricError::contract("correlation requires a protein table as extras")),
        };

        let (y_true, _, y_pred) = inputs.primary()?;
        let protein = protein.select_rows(y_true.indices())?;
        protein.assert_matching_cells(y_true)?;

        let expression = expected_expression(y_pred)?;
        let scores = correlation_scores(
            expression.view(),
            protein.matrix(),
            y_true.feature_ids(),
            protein.feature_ids(),
        )?;
        log::debug!("Correlation computed for {} gene/protein pairs", scores.len());

        let pearson: Vec<f64> = scores.iter().map(|s| s.pearson).collect();
        let spearman: Vec<f64> = scores.iter().map(|s| s.spearman).collect();
        Ok(Score::mapping([
            ("pearson_mean", mean(&pearson)),
            ("spearman_mean", mean(&spearman)),
            ("pearson_med", median(&pearson)),
            ("spearman_med", median(&spearman)),
        ]))
    }
}
