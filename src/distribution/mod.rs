//! Batched predictive distributions returned by generative models
//!
//! Parameters are stored element-wise with shape `[cells, features]`, or
//! `[samples, cells, features]` when the model drew several posterior
//! samples. `Independent` reinterprets trailing batch axes as event axes so
//! that `log_prob` sums over them.

mod normalize;

use std::f64::consts::PI;

use ndarray::{ArrayD, ArrayViewD, Axis, Zip};
use statrs::function::gamma::ln_gamma;

use crate::error::{MetricError, Result};

pub use normalize::{expected_expression, unwrap_zero_inflation};

/// A batched probability distribution
#[derive(Debug, Clone, PartialEq)]
pub enum Distribution {
    Normal {
        loc: ArrayD<f64>,
        scale: ArrayD<f64>,
    },
    Poisson {
        rate: ArrayD<f64>,
    },
    /// Mean/dispersion parameterisation: Var = mean + dispersion * mean^2
    NegativeBinomial {
        mean: ArrayD<f64>,
        dispersion: ArrayD<f64>,
    },
    /// Point mass at `loc`
    Deterministic {
        loc: ArrayD<f64>,
    },
    /// Mixture of a point mass at zero (probability `dropout`) and an
    /// element-wise count distribution
    ZeroInflated {
        count: Box<Distribution>,
        dropout: ArrayD<f64>,
    },
    Independent {
        base: Box<Distribution>,
        reinterpreted_batch_ndims: usize,
    },
}

fn check_same_shape(family: &str, a: &ArrayD<f64>, b: &ArrayD<f64>) -> Result<()> {
    if a.shape() != b.shape() {
        return Err(MetricError::InvalidDistribution {
            reason: format!(
                "{} parameters have different shapes: {:?} vs {:?}",
                family,
                a.shape(),
                b.shape()
            ),
        });
    }
    Ok(())
}

fn check_values(family: &str, what: &str, values: &ArrayD<f64>, ok: impl Fn(f64) -> bool) -> Result<()> {
    if let Some(bad) = values.iter().find(|&&v| !ok(v)) {
        return Err(MetricError::InvalidDistribution {
            reason: format!("{} {} out of support: {}", family, what, bad),
        });
    }
    Ok(())
}

fn normal_ln_pdf(x: f64, loc: f64, scale: f64) -> f64 {
    let z = (x - loc) / scale;
    -0.5 * z * z - scale.ln() - 0.5 * (2.0 * PI).ln()
}

fn poisson_ln_pmf(x: f64, rate: f64) -> f64 {
    if x < 0.0 {
        return f64::NEG_INFINITY;
    }
    if rate == 0.0 {
        return if x == 0.0 { 0.0 } else { f64::NEG_INFINITY };
    }
    x * rate.ln() - rate - ln_gamma(x + 1.0)
}

fn nb_ln_pmf(x: f64, mean: f64, dispersion: f64) -> f64 {
    if x < 0.0 {
        return f64::NEG_INFINITY;
    }
    if mean == 0.0 {
        return if x == 0.0 { 0.0 } else { f64::NEG_INFINITY };
    }
    let r = 1.0 / dispersion;
    let p = dispersion * mean / (1.0 + dispersion * mean);
    ln_gamma(x + r) - ln_gamma(r) - ln_gamma(x + 1.0) + r * (1.0 - p).ln() + x * p.ln()
}

impl Distribution {
    pub fn normal(loc: ArrayD<f64>, scale: ArrayD<f64>) -> Result<Self> {
        check_same_shape("Normal", &loc, &scale)?;
        check_values("Normal", "loc", &loc, f64::is_finite)?;
        check_values("Normal", "scale", &scale, |s| s.is_finite() && s > 0.0)?;
        Ok(Distribution::Normal { loc, scale })
    }

    pub fn poisson(rate: ArrayD<f64>) -> Result<Self> {
        check_values("Poisson", "rate", &rate, |r| r.is_finite() && r >= 0.0)?;
        Ok(Distribution::Poisson { rate })
    }

    pub fn negative_binomial(mean: ArrayD<f64>, dispersion: ArrayD<f64>) -> Result<Self> {
        check_same_shape("NegativeBinomial", &mean, &dispersion)?;
        check_values("NegativeBinomial", "mean", &mean, |m| m.is_finite() && m >= 0.0)?;
        check_values("NegativeBinomial", "dispersion", &dispersion, |a| a.is_finite() && a > 0.0)?;
        Ok(Distribution::NegativeBinomial { mean, dispersion })
    }

    pub fn deterministic(loc: ArrayD<f64>) -> Result<Self> {
        check_values("Deterministic", "loc", &loc, f64::is_finite)?;
        Ok(Distribution::Deterministic { loc })
    }

    /// Wrap an element-wise count distribution with excess zeros.
    /// Nesting zero-inflation or wrapping an `Independent` is rejected.
    pub fn zero_inflated(count: Distribution, dropout: ArrayD<f64>) -> Result<Self> {
        if matches!(
            count,
            Distribution::ZeroInflated { .. } | Distribution::Independent { .. }
        ) {
            return Err(MetricError::InvalidDistribution {
                reason: format!(
                    "zero-inflation requires an element-wise count distribution, got {}",
                    count.family()
                ),
            });
        }
        if dropout.shape() != count.shape() {
            return Err(MetricError::InvalidDistribution {
                reason: format!(
                    "dropout shape {:?} does not match count shape {:?}",
                    dropout.shape(),
                    count.shape()
                ),
            });
        }
        check_values("ZeroInflated", "dropout", &dropout, |p| (0.0..=1.0).contains(&p))?;
        Ok(Distribution::ZeroInflated {
            count: Box::new(count),
            dropout,
        })
    }

    pub fn independent(base: Distribution, reinterpreted_batch_ndims: usize) -> Result<Self> {
        // only the base's batch axes can be reinterpreted
        let batch_ndims = base.shape().len().saturating_sub(base.event_ndims());
        if reinterpreted_batch_ndims > batch_ndims {
            return Err(MetricError::InvalidDistribution {
                reason: format!(
                    "cannot reinterpret {} batch dims of a distribution with {} batch dims",
                    reinterpreted_batch_ndims, batch_ndims
                ),
            });
        }
        Ok(Distribution::Independent {
            base: Box::new(base),
            reinterpreted_batch_ndims,
        })
    }

    /// Short family name, e.g. for log messages
    pub fn family(&self) -> &'static str {
        match self {
            Distribution::Normal { .. } => "Normal",
            Distribution::Poisson { .. } => "Poisson",
            Distribution::NegativeBinomial { .. } => "NegativeBinomial",
            Distribution::Deterministic { .. } => "Deterministic",
            Distribution::ZeroInflated { .. } => "ZeroInflated",
            Distribution::Independent { .. } => "Independent",
        }
    }

    /// Full parameter shape (batch and event axes together)
    pub fn shape(&self) -> &[usize] {
        match self {
            Distribution::Normal { loc, .. } => loc.shape(),
            Distribution::Poisson { rate } => rate.shape(),
            Distribution::NegativeBinomial { mean, .. } => mean.shape(),
            Distribution::Deterministic { loc } => loc.shape(),
            Distribution::ZeroInflated { dropout, .. } => dropout.shape(),
            Distribution::Independent { base, .. } => base.shape(),
        }
    }

    /// Number of trailing axes summed over by `log_prob`
    pub fn event_ndims(&self) -> usize {
        match self {
            Distribution::Independent {
                reinterpreted_batch_ndims,
                ..
            } => *reinterpreted_batch_ndims,
            _ => 0,
        }
    }

    /// Element-wise mean, same shape as the parameters
    pub fn mean(&self) -> ArrayD<f64> {
        match self {
            Distribution::Normal { loc, .. } => loc.clone(),
            Distribution::Poisson { rate } => rate.clone(),
            Distribution::NegativeBinomial { mean, .. } => mean.clone(),
            Distribution::Deterministic { loc } => loc.clone(),
            Distribution::ZeroInflated { count, dropout } => dropout.mapv(|p| 1.0 - p) * count.mean(),
            Distribution::Independent { base, .. } => base.mean(),
        }
    }

    /// Log density of `x`.
    ///
    /// `x` is broadcast against the parameter shape, so a `[cells, features]`
    /// matrix can be scored under a `[samples, cells, features]` distribution.
    /// The result has the batch shape: the parameter shape without the
    /// trailing event axes.
    pub fn log_prob(&self, x: ArrayViewD<'_, f64>) -> Result<ArrayD<f64>> {
        match self {
            Distribution::Independent {
                base,
                reinterpreted_batch_ndims,
            } => {
                let mut lp = base.log_prob(x)?;
                for _ in 0..*reinterpreted_batch_ndims {
                    let last = lp.ndim().checked_sub(1).ok_or_else(|| MetricError::InvalidDistribution {
                        reason: format!(
                            "{} event dims exceed the rank of the log-density",
                            reinterpreted_batch_ndims
                        ),
                    })?;
                    lp = lp.sum_axis(Axis(last));
                }
                Ok(lp)
            }
            Distribution::ZeroInflated { count, dropout } => {
                let count_lp = count.log_prob(x.view())?;
                let xb = self.broadcast(&x)?;
                Ok(Zip::from(&xb)
                    .and(&count_lp)
                    .and(dropout)
                    .map_collect(|&x, &lp, &pi| {
                        if x == 0.0 {
                            (pi + (1.0 - pi) * lp.exp()).ln()
                        } else {
                            (1.0 - pi).ln() + lp
                        }
                    }))
            }
            Distribution::Normal { loc, scale } => {
                let xb = self.broadcast(&x)?;
                Ok(Zip::from(&xb)
                    .and(loc)
                    .and(scale)
                    .map_collect(|&x, &m, &s| normal_ln_pdf(x, m, s)))
            }
            Distribution::Poisson { rate } => {
                let xb = self.broadcast(&x)?;
                Ok(Zip::from(&xb).and(rate).map_collect(|&x, &r| poisson_ln_pmf(x, r)))
            }
            Distribution::NegativeBinomial { mean, dispersion } => {
                let xb = self.broadcast(&x)?;
                Ok(Zip::from(&xb)
                    .and(mean)
                    .and(dispersion)
                    .map_collect(|&x, &m, &a| nb_ln_pmf(x, m, a)))
            }
            Distribution::Deterministic { loc } => {
                let xb = self.broadcast(&x)?;
                Ok(Zip::from(&xb)
                    .and(loc)
                    .map_collect(|&x, &l| if x == l { 0.0 } else { f64::NEG_INFINITY }))
            }
        }
    }

    fn broadcast<'a>(&self, x: &'a ArrayViewD<'_, f64>) -> Result<ArrayViewD<'a, f64>> {
        x.broadcast(self.shape()).ok_or_else(|| MetricError::DimensionMismatch {
            expected: format!("values broadcastable to {:?}", self.shape()),
            got: format!("{:?}", x.shape()),
        })
    }
}
