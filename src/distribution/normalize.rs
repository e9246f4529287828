//! Uniform count-distribution view of model outputs

use std::borrow::Cow;

use ndarray::{Array2, Axis, Ix2};

use super::Distribution;
use crate::error::{MetricError, Result};

/// Strip a zero-inflation envelope from an `Independent` distribution.
///
/// `Independent(ZeroInflated(count))` becomes `Independent(count)` with the
/// same number of reinterpreted batch axes; anything else is returned as is.
/// Zero-inflated distributions only ever wrap element-wise count
/// distributions, so applying this twice gives the same result as once.
pub fn unwrap_zero_inflation(dist: &Distribution) -> Cow<'_, Distribution> {
    match dist {
        Distribution::Independent {
            base,
            reinterpreted_batch_ndims,
        } => match base.as_ref() {
            Distribution::ZeroInflated { count, .. } => Cow::Owned(Distribution::Independent {
                base: count.clone(),
                reinterpreted_batch_ndims: *reinterpreted_batch_ndims,
            }),
            _ => Cow::Borrowed(dist),
        },
        _ => Cow::Borrowed(dist),
    }
}

/// Expected expression per cell and feature.
///
/// Unwraps zero-inflation, takes the mean and averages away a leading
/// sampling axis if present.
pub fn expected_expression(dist: &Distribution) -> Result<Array2<f64>> {
    let mean = unwrap_zero_inflation(dist).mean();
    let mean = match mean.ndim() {
        2 => mean,
        3 => mean.mean_axis(Axis(0)).ok_or_else(|| MetricError::EmptyData {
            reason: "predictive distribution has an empty sampling axis".to_string(),
        })?,
        n => {
            return Err(MetricError::DimensionMismatch {
                expected: "a [cells, features] or [samples, cells, features] mean".to_string(),
                got: format!("rank {} mean with shape {:?}", n, mean.shape()),
            })
        }
    };
    mean.into_dimensionality::<Ix2>()
        .map_err(|e| MetricError::DimensionMismatch {
            expected: "rank 2".to_string(),
            got: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array3, ArrayD};

    fn zinb(shape: &[usize]) -> Distribution {
        let count = Distribution::negative_binomial(
            ArrayD::from_elem(shape.to_vec(), 6.0),
            ArrayD::from_elem(shape.to_vec(), 0.5),
        )
        .unwrap();
        let zi = Distribution::zero_inflated(count, ArrayD::from_elem(shape.to_vec(), 0.5)).unwrap();
        Distribution::independent(zi, 1).unwrap()
    }

    #[test]
    fn test_unwrap_preserves_event_ndims() {
        let dist = zinb(&[3, 2]);
        let unwrapped = unwrap_zero_inflation(&dist);
        assert_eq!(unwrapped.event_ndims(), 1);
        match unwrapped.as_ref() {
            Distribution::Independent { base, .. } => {
                assert_eq!(base.family(), "NegativeBinomial")
            }
            other => panic!("unexpected {}", other.family()),
        }
    }

    #[test]
    fn test_unwrap_is_idempotent() {
        let dist = zinb(&[3, 2]);
        let once = unwrap_zero_inflation(&dist).into_owned();
        let twice = unwrap_zero_inflation(&once);
        assert!(matches!(twice, Cow::Borrowed(_)));
        assert_eq!(twice.as_ref(), &once);
    }

    #[test]
    fn test_plain_distribution_passes_through() {
        let base = Distribution::normal(array![[0.0, 1.0]].into_dyn(), array![[1.0, 1.0]].into_dyn()).unwrap();
        let dist = Distribution::independent(base, 1).unwrap();
        assert!(matches!(unwrap_zero_inflation(&dist), Cow::Borrowed(d) if d == &dist));

        // bare zero-inflation (no Independent) is left alone
        let count = Distribution::poisson(array![[2.0]].into_dyn()).unwrap();
        let zi = Distribution::zero_inflated(count, array![[0.5]].into_dyn()).unwrap();
        assert!(matches!(unwrap_zero_inflation(&zi), Cow::Borrowed(_)));
    }

    #[test]
    fn test_expected_expression_ignores_dropout() {
        let mean = expected_expression(&zinb(&[3, 2])).unwrap();
        assert_eq!(mean.dim(), (3, 2));
        assert!(mean.iter().all(|&m| (m - 6.0).abs() < 1e-12));
    }

    #[test]
    fn test_expected_expression_averages_samples() {
        let mut rate = Array3::zeros((2, 2, 2));
        rate.index_axis_mut(Axis(0), 0).fill(1.0);
        rate.index_axis_mut(Axis(0), 1).fill(3.0);
        let dist = Distribution::independent(Distribution::poisson(rate.into_dyn()).unwrap(), 1).unwrap();
        let mean = expected_expression(&dist).unwrap();
        assert_eq!(mean, array![[2.0, 2.0], [2.0, 2.0]]);
    }

    #[test]
    fn test_expected_expression_rejects_rank_one() {
        let dist = Distribution::poisson(array![1.0, 2.0].into_dyn()).unwrap();
        assert!(matches!(
            expected_expression(&dist),
            Err(MetricError::DimensionMismatch { .. })
        ));
    }
}
