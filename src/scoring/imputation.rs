//! Imputation error scores
//!
//! All three scores compare the original (uncorrupted) values with the
//! model's imputed values. The median score looks at the entries that are
//! nonzero in the original. The mean and std scores only look at entries the
//! corruption changed, detected as `original != corrupted`. An entry the
//! corruption picked but left unchanged (e.g. a binomial draw that kept every
//! count) is therefore not counted.

use ndarray::ArrayView2;

use crate::error::{MetricError, Result};
use crate::stats::{mean, median, population_std};

fn check_shape(what: &str, expected: (usize, usize), got: (usize, usize)) -> Result<()> {
    if expected != got {
        return Err(MetricError::DimensionMismatch {
            expected: format!("{} of shape {:?}", what, expected),
            got: format!("{:?}", got),
        });
    }
    Ok(())
}

/// Absolute errors at the entries changed by corruption
fn corrupted_errors(
    original: ArrayView2<'_, f64>,
    corrupted: ArrayView2<'_, f64>,
    imputed: ArrayView2<'_, f64>,
) -> Result<Vec<f64>> {
    check_shape("corrupted", original.dim(), corrupted.dim())?;
    check_shape("imputed", original.dim(), imputed.dim())?;
    Ok(original
        .iter()
        .zip(corrupted.iter())
        .zip(imputed.iter())
        .filter(|((o, c), _)| o != c)
        .map(|((o, _), i)| (o - i).abs())
        .collect())
}

/// Median absolute difference between original and imputed values over the
/// entries that are nonzero in the original; 0.0 if there are none
pub fn imputation_score(original: ArrayView2<'_, f64>, imputed: ArrayView2<'_, f64>) -> Result<f64> {
    check_shape("imputed", original.dim(), imputed.dim())?;
    if original.is_empty() {
        return Err(MetricError::EmptyData {
            reason: "no entries to score".to_string(),
        });
    }
    let diffs: Vec<f64> = original
        .iter()
        .zip(imputed.iter())
        .filter(|(o, _)| **o != 0.0)
        .map(|(o, i)| (o - i).abs())
        .collect();
    if diffs.is_empty() {
        log::debug!("Original table has no nonzero entries; imputation score is 0");
        return Ok(0.0);
    }
    Ok(median(&diffs))
}

/// Mean absolute error over corrupted entries; 0.0 if nothing was corrupted
pub fn imputation_mean_score(
    original: ArrayView2<'_, f64>,
    corrupted: ArrayView2<'_, f64>,
    imputed: ArrayView2<'_, f64>,
) -> Result<f64> {
    let errors = corrupted_errors(original, corrupted, imputed)?;
    if errors.is_empty() {
        log::debug!("No corrupted entries found; imputation mean score is 0");
        return Ok(0.0);
    }
    Ok(mean(&errors))
}

/// Standard deviation of the absolute error over corrupted entries
pub fn imputation_std_score(
    original: ArrayView2<'_, f64>,
    corrupted: ArrayView2<'_, f64>,
    imputed: ArrayView2<'_, f64>,
) -> Result<f64> {
    let errors = corrupted_errors(original, corrupted, imputed)?;
    if errors.is_empty() {
        return Ok(0.0);
    }
    Ok(population_std(&errors))
}
