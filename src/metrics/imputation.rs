//! Denoising quality on the artificially corrupted primary table

use super::{Metric, Score, ScoreInputs};
use crate::data::Extras;
use crate::distribution::expected_expression;
use crate::error::Result;
use crate::scoring::{imputation_mean_score, imputation_score, imputation_std_score};

/// Compares the predicted mean of the first table with its uncorrupted
/// values. Reports `imp_med` over all entries and `imp_mean`/`imp_std` over
/// the entries that corruption changed.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImputationError;

impl Metric for ImputationError {
    fn default_name(&self) -> &'static str {
        "imputationerror"
    }

    fn score(&self, inputs: &ScoreInputs<'_>, _extras: Option<&Extras>) -> Result<Score> {
        let (y_true, y_crpt, y_pred) = inputs.primary()?;
        let imputed = expected_expression(y_pred)?;

        let original = y_true.matrix();
        let corrupted = y_crpt.matrix();
        Ok(Score::mapping([
            ("imp_med", imputation_score(original, imputed.view())?),
            ("imp_mean", imputation_mean_score(original, corrupted, imputed.view())?),
            ("imp_std", imputation_std_score(original, corrupted, imputed.view())?),
        ]))
    }
}
