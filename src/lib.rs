//! rust_scmetrics: evaluation metrics for single-cell generative models
//!
//! A metric takes a trained model, corrupts the primary expression table,
//! runs inference and scores the predictive distributions against the
//! uncorrupted data (likelihood, imputation error, gene/protein correlation).
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use rust_scmetrics::prelude::*;
//!
//! let genes = read_expression_table("genes.csv")?;
//! let proteins = read_expression_table("proteins.csv")?;
//!
//! let model: SharedModel = Arc::new(
//!     BaselineModel::new(BaselineFamily::ZeroInflatedNegativeBinomial)
//!         .with_corruption(CorruptionParams::new(0.25, CorruptionDist::Binomial)),
//! );
//!
//! let config = MetricConfig::default().with_inputs(genes).with_extras(proteins);
//! let mut metric = SingleCellMetric::new(Correlation, config)?;
//! metric.bind(model)?;
//! let report = metric.evaluate()?;
//! ```

pub mod cli;
pub mod data;
pub mod distribution;
pub mod error;
pub mod io;
pub mod metrics;
pub mod model;
pub mod rng;
pub mod scoring;
pub mod stats;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::data::{
        CorruptionDist, CorruptionParams, Dataset, ExpressionTable, Extras, OneOrMany, TableInput,
    };
    pub use crate::distribution::{expected_expression, unwrap_zero_inflation, Distribution};
    pub use crate::error::{MetricError, Result};
    pub use crate::io::{read_expression_table, write_report, ReportFormat};
    pub use crate::metrics::{
        evaluate_all, merge_report, Correlation, EpochCallback, ImputationError, Metric, MetricConfig,
        MetricReport, NegativeLogLikelihood, Score, ScoreInputs, ScoreValue, SharedModel, SingleCellMetric,
    };
    pub use crate::model::{BaselineFamily, BaselineModel, GenerativeModel, PredictOptions, Prediction};
    pub use crate::scoring::{correlation_scores, imputation_mean_score, imputation_score};
}

#[cfg(test)]
mod tests {
    use super::prelude::*;
    use ndarray::Array2;
    use std::sync::Arc;

    fn ids(prefix: &str, n: usize) -> Vec<String> {
        (0..n).map(|i| format!("{}{}", prefix, i)).collect()
    }

    #[test]
    fn test_reports_are_plain_finite_scalars() {
        use crate::metrics::tests::{standard_normal, StubModel};
        use ndarray::ArrayD;

        // 10 cells x 5 genes x 3 proteins
        let genes = ExpressionTable::new(
            Array2::from_shape_fn((10, 5), |(i, j)| ((2 * i + 3 * j) % 7) as f64),
            ids("cell", 10),
            vec!["CD3E", "CD4", "CD8A", "LYZ", "GAPDH"].into_iter().map(String::from).collect(),
        )
        .unwrap();
        let proteins = ExpressionTable::new(
            Array2::from_shape_fn((10, 3), |(i, k)| ((7 * i + k) % 5) as f64),
            ids("cell", 10),
            vec!["CD3E_ADT", "CD4_ADT", "CD8A_ADT"].into_iter().map(String::from).collect(),
        )
        .unwrap();

        // fixed independent normal; its mean must vary across cells for
        // correlation to be defined
        let loc = ArrayD::from_shape_fn(vec![10, 5], |ix| ((ix[0] + 2 * ix[1]) % 4) as f64);
        let varying = Distribution::independent(
            Distribution::normal(loc, ArrayD::from_elem(vec![10, 5], 1.0)).unwrap(),
            1,
        )
        .unwrap();

        let config = MetricConfig::default().with_inputs(genes).with_seed(3);
        for (model, with_correlation) in [
            (StubModel::new(Some(0.5), vec![standard_normal(10, 5)]), false),
            (StubModel::new(Some(0.5), vec![varying]), true),
        ] {
            let model: SharedModel = Arc::new(model);
            let mut nllk = SingleCellMetric::new(NegativeLogLikelihood, config.clone()).unwrap();
            let mut imputation = SingleCellMetric::new(ImputationError, config.clone()).unwrap();
            nllk.bind(model.clone()).unwrap();
            imputation.bind(model.clone()).unwrap();

            let callbacks: [&dyn EpochCallback; 2] = [&nllk, &imputation];
            let mut logs = evaluate_all(&callbacks, 0).unwrap();
            if with_correlation {
                let mut correlation =
                    SingleCellMetric::new(Correlation, config.clone().with_extras(proteins.clone())).unwrap();
                correlation.bind(model).unwrap();
                merge_report(&mut logs, correlation.evaluate().unwrap()).unwrap();
                assert_eq!(logs.len(), 8);
            } else {
                assert_eq!(logs.len(), 4);
            }
            for (key, value) in &logs {
                assert!(value.is_finite(), "{} = {}", key, value);
            }
        }
    }

    #[test]
    fn test_full_pipeline() {
        // 10 cells x 5 genes, 3 proteins tracking the first three genes
        let genes = Array2::from_shape_fn((10, 5), |(i, j)| ((3 * i + 5 * j) % 11) as f64 * (j + 1) as f64);
        let proteins = Array2::from_shape_fn((10, 3), |(i, k)| genes[[i, k]] * 4.0 + (i % 2) as f64);
        let genes = ExpressionTable::new(
            genes,
            ids("cell", 10),
            vec!["CD3E", "CD4", "CD14", "LYZ", "GAPDH"].into_iter().map(String::from).collect(),
        )
        .unwrap();
        let proteins = ExpressionTable::new(
            proteins,
            ids("cell", 10),
            vec!["CD3E_TotalSeqB", "CD4_TotalSeqB", "CD14_TotalSeqB"]
                .into_iter()
                .map(String::from)
                .collect(),
        )
        .unwrap();

        let model: SharedModel = Arc::new(
            BaselineModel::new(BaselineFamily::ZeroInflatedNegativeBinomial)
                .with_corruption(CorruptionParams::new(0.3, CorruptionDist::Uniform)),
        );
        let config = MetricConfig::default()
            .with_inputs(genes.clone())
            .with_n_samples(2)
            .with_seed(8);

        let mut nllk = SingleCellMetric::new(NegativeLogLikelihood, config.clone()).unwrap();
        let mut imputation = SingleCellMetric::new(ImputationError, config.clone()).unwrap();
        let mut correlation = SingleCellMetric::new(Correlation, config.with_extras(proteins)).unwrap();
        nllk.bind(model.clone()).unwrap();
        imputation.bind(model.clone()).unwrap();
        correlation.bind(model).unwrap();

        let callbacks: [&dyn EpochCallback; 3] = [&nllk, &imputation, &correlation];
        let logs = evaluate_all(&callbacks, 1).unwrap();

        let keys: Vec<&str> = logs.keys().map(|k| k.as_str()).collect();
        assert_eq!(
            keys,
            vec![
                "imp_mean",
                "imp_med",
                "imp_std",
                "nllk0",
                "pearson_mean",
                "pearson_med",
                "spearman_mean",
                "spearman_med"
            ]
        );
        assert!(logs["nllk0"].is_finite() && logs["nllk0"] > 0.0);
        assert!(logs["imp_med"] >= 0.0);
        for key in ["pearson_mean", "pearson_med", "spearman_mean", "spearman_med"] {
            assert!((-1.0..=1.0).contains(&logs[key]), "{} = {}", key, logs[key]);
        }
    }
}
