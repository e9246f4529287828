//! Metric evaluation against a bound generative model
//!
//! [`SingleCellMetric`] owns the shared evaluation protocol: coerce inputs to
//! expression tables, corrupt the primary table, run inference, hand the
//! aligned lists to a [`Metric`] and flatten what it returns into a
//! [`MetricReport`]. Concrete metrics only implement the scoring step.

mod correlation;
mod imputation;
mod nllk;

use std::collections::BTreeMap;
use std::sync::Arc;

use ndarray::ArrayD;

use crate::data::{CorruptionParams, ExpressionTable, Extras, OneOrMany, TableInput};
use crate::distribution::Distribution;
use crate::error::{MetricError, Result};
use crate::model::{validate_model, GenerativeModel, PredictOptions};
use crate::rng::rng_from_seed;

pub use correlation::Correlation;
pub use imputation::ImputationError;
pub use nllk::{NegativeLogLikelihood, MIN_LOG_DENSITY};

/// Flat mapping from metric key to value
pub type MetricReport = BTreeMap<String, f64>;

/// A model shared between metrics and the training loop
pub type SharedModel = Arc<dyn GenerativeModel + Send + Sync>;

/// A value produced by a scoring step before flattening
#[derive(Debug, Clone, PartialEq)]
pub enum ScoreValue {
    Scalar(f64),
    /// Only single-element arrays are accepted when flattening
    Array(ArrayD<f64>),
}

impl ScoreValue {
    fn into_scalar(self, key: &str) -> Result<f64> {
        match self {
            ScoreValue::Scalar(v) => finite(key, v),
            ScoreValue::Array(a) if a.len() == 1 => finite(key, a.iter().copied().sum()),
            ScoreValue::Array(a) => Err(MetricError::contract(format!(
                "score '{}' is an array of shape {:?}, expected a scalar",
                key,
                a.shape()
            ))),
        }
    }
}

/// Reports hold plain finite numbers only
fn finite(key: &str, v: f64) -> Result<f64> {
    if v.is_finite() {
        Ok(v)
    } else {
        Err(MetricError::contract(format!("score '{}' is not finite ({})", key, v)))
    }
}

impl From<f64> for ScoreValue {
    fn from(v: f64) -> Self {
        ScoreValue::Scalar(v)
    }
}

impl From<ArrayD<f64>> for ScoreValue {
    fn from(a: ArrayD<f64>) -> Self {
        ScoreValue::Array(a)
    }
}

/// Result of a metric's scoring step
#[derive(Debug, Clone, PartialEq)]
pub enum Score {
    Empty,
    /// Reported under the metric's name
    Scalar(ScoreValue),
    Mapping(BTreeMap<String, ScoreValue>),
}

impl Score {
    pub fn mapping<K, V, I>(entries: I) -> Self
    where
        K: Into<String>,
        V: Into<ScoreValue>,
        I: IntoIterator<Item = (K, V)>,
    {
        Score::Mapping(entries.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }

    /// Flatten into plain scalars, keying a bare scalar by `name`
    pub fn into_report(self, name: &str) -> Result<MetricReport> {
        match self {
            Score::Empty => Ok(MetricReport::new()),
            Score::Scalar(value) => {
                let v = value.into_scalar(name)?;
                Ok(MetricReport::from([(name.to_string(), v)]))
            }
            Score::Mapping(values) => values
                .into_iter()
                .map(|(k, v)| -> Result<(String, f64)> {
                    let v = v.into_scalar(&k)?;
                    Ok((k, v))
                })
                .collect(),
        }
    }
}

impl From<f64> for Score {
    fn from(v: f64) -> Self {
        Score::Scalar(ScoreValue::Scalar(v))
    }
}

/// The four aligned lists a metric scores
#[derive(Debug, Clone, Copy)]
pub struct ScoreInputs<'a> {
    /// Tables as supplied, before corruption
    pub y_true: &'a [ExpressionTable],
    /// Tables passed to the model; only the first may differ from `y_true`
    pub y_crpt: &'a [ExpressionTable],
    pub y_pred: &'a [Distribution],
    pub latents: &'a [Distribution],
}

impl<'a> ScoreInputs<'a> {
    /// First (true, corrupted, predicted) triple
    pub fn primary(&self) -> Result<(&'a ExpressionTable, &'a ExpressionTable, &'a Distribution)> {
        match (self.y_true.first(), self.y_crpt.first(), self.y_pred.first()) {
            (Some(t), Some(c), Some(p)) => Ok((t, c, p)),
            _ => Err(MetricError::contract(format!(
                "expected at least one input and prediction, got {} tables and {} predictions",
                self.y_true.len(),
                self.y_pred.len()
            ))),
        }
    }
}

/// Metric-specific scoring step
pub trait Metric {
    /// Report key used when the config gives no name
    fn default_name(&self) -> &'static str;

    fn score(&self, inputs: &ScoreInputs<'_>, extras: Option<&Extras>) -> Result<Score>;
}

/// Construction-time settings of a metric
#[derive(Debug, Clone)]
pub struct MetricConfig {
    /// Default inputs for [`SingleCellMetric::evaluate`]
    pub inputs: Option<OneOrMany<TableInput>>,
    pub extras: Option<Extras>,
    pub n_samples: usize,
    pub batch_size: usize,
    pub verbose: usize,
    pub name: Option<String>,
    /// Re-seed corruption on every call; fresh OS entropy when unset
    pub seed: Option<u64>,
}

impl Default for MetricConfig {
    fn default() -> Self {
        Self {
            inputs: None,
            extras: None,
            n_samples: 1,
            batch_size: 128,
            verbose: 0,
            name: None,
            seed: None,
        }
    }
}

impl MetricConfig {
    pub fn with_inputs(mut self, inputs: impl Into<OneOrMany<TableInput>>) -> Self {
        self.inputs = Some(inputs.into());
        self
    }

    pub fn with_extras(mut self, extras: impl Into<Extras>) -> Self {
        self.extras = Some(extras.into());
        self
    }

    pub fn with_n_samples(mut self, n_samples: usize) -> Self {
        self.n_samples = n_samples;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_verbose(mut self, verbose: usize) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    fn validate(&self) -> Result<()> {
        if self.n_samples == 0 {
            return Err(MetricError::InvalidInput {
                reason: "n_samples must be at least 1".to_string(),
            });
        }
        if self.batch_size == 0 {
            return Err(MetricError::InvalidInput {
                reason: "batch_size must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// A metric together with its configuration and bound model
pub struct SingleCellMetric<M> {
    metric: M,
    config: MetricConfig,
    name: String,
    model: Option<SharedModel>,
}

impl<M: Metric> SingleCellMetric<M> {
    pub fn new(metric: M, config: MetricConfig) -> Result<Self> {
        config.validate()?;
        let name = config
            .name
            .clone()
            .unwrap_or_else(|| metric.default_name().to_string());
        Ok(Self {
            metric,
            config,
            name,
            model: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &MetricConfig {
        &self.config
    }

    pub fn metric(&self) -> &M {
        &self.metric
    }

    /// Attach the model evaluated by subsequent calls
    pub fn bind(&mut self, model: SharedModel) -> Result<()> {
        validate_model(model.as_ref())?;
        self.model = Some(model);
        Ok(())
    }

    pub fn is_bound(&self) -> bool {
        self.model.is_some()
    }

    /// Evaluate on the configured inputs and sample count
    pub fn evaluate(&self) -> Result<MetricReport> {
        self.evaluate_with(None, None)
    }

    /// Evaluate, overriding the configured inputs and/or sample count
    pub fn evaluate_with(
        &self,
        inputs: Option<OneOrMany<TableInput>>,
        n_samples: Option<usize>,
    ) -> Result<MetricReport> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| MetricError::contract(format!("metric '{}' has no bound model", self.name)))?;

        let inputs = match inputs.or_else(|| self.config.inputs.clone()) {
            Some(inputs) => inputs,
            None => {
                return Err(MetricError::InvalidInput {
                    reason: format!("metric '{}' was given no inputs", self.name),
                })
            }
        };
        let y_true = inputs
            .into_vec()
            .into_iter()
            .map(TableInput::into_table)
            .collect::<Result<Vec<ExpressionTable>>>()?;
        if y_true.is_empty() {
            return Err(MetricError::InvalidInput {
                reason: format!("metric '{}' was given an empty input list", self.name),
            });
        }

        let n_samples = n_samples.unwrap_or(self.config.n_samples);
        if n_samples == 0 {
            return Err(MetricError::InvalidInput {
                reason: "n_samples must be at least 1".to_string(),
            });
        }

        let mut y_crpt = y_true.clone();
        if let Some(rate) = model.corruption_rate() {
            let params = CorruptionParams::new(rate, model.corruption_dist());
            let mut rng = rng_from_seed(self.config.seed);
            y_crpt[0] = y_true[0].corrupt(&params, &mut rng)?;
        }

        let options = PredictOptions {
            n_samples,
            batch_size: self.config.batch_size,
            verbose: self.config.verbose,
            apply_corruption: false,
        };
        if self.config.verbose > 0 {
            log::info!(
                "[{}] predicting {} table(s), {} cells, n_samples={}",
                self.name,
                y_crpt.len(),
                y_crpt[0].n_cells(),
                n_samples
            );
        }
        let prediction = model.predict(&y_crpt, &options)?;
        let y_pred = prediction.outputs.into_vec();
        let latents = prediction.latents.into_vec();

        let score = self.metric.score(
            &ScoreInputs {
                y_true: &y_true,
                y_crpt: &y_crpt,
                y_pred: &y_pred,
                latents: &latents,
            },
            self.config.extras.as_ref(),
        )?;
        let report = score.into_report(&self.name)?;

        if self.config.verbose > 0 {
            for (key, value) in &report {
                log::info!("[{}] {} = {:.6}", self.name, key, value);
            }
        }
        Ok(report)
    }
}

/// Epoch-end hook driven by a training loop.
///
/// The hook returns its report rather than writing into the loop's logs; use
/// [`merge_report`] to combine reports.
pub trait EpochCallback {
    fn name(&self) -> &str;

    fn on_epoch_end(&self, epoch: usize) -> Result<MetricReport>;
}

impl<M: Metric> EpochCallback for SingleCellMetric<M> {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_epoch_end(&self, epoch: usize) -> Result<MetricReport> {
        log::debug!("[{}] evaluating at epoch {}", self.name, epoch);
        self.evaluate()
    }
}

/// Merge `report` into `logs`; an existing key is an error
pub fn merge_report(logs: &mut MetricReport, report: MetricReport) -> Result<()> {
    if let Some(key) = report.keys().find(|k| logs.contains_key(*k)) {
        return Err(MetricError::contract(format!(
            "metric key '{}' is already present in the logs",
            key
        )));
    }
    logs.extend(report);
    Ok(())
}

/// Run every callback for `epoch` and merge their reports
pub fn evaluate_all(callbacks: &[&dyn EpochCallback], epoch: usize) -> Result<MetricReport> {
    let mut logs = MetricReport::new();
    for callback in callbacks {
        let report = callback.on_epoch_end(epoch)?;
        merge_report(&mut logs, report)?;
    }
    Ok(logs)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::data::CorruptionDist;
    use crate::model::Prediction;
    use ndarray::{array, Array2};
    use std::sync::Mutex;

    /// Model returning fixed distributions and recording what it was given
    pub(crate) struct StubModel {
        pub rate: Option<f64>,
        pub outputs: Vec<Distribution>,
        pub latents: Vec<Distribution>,
        pub seen: Mutex<Vec<(Vec<ExpressionTable>, PredictOptions)>>,
    }

    impl StubModel {
        pub(crate) fn new(rate: Option<f64>, outputs: Vec<Distribution>) -> Self {
            let latent = Distribution::normal(
                ArrayD::zeros(vec![1, 2]),
                ArrayD::from_elem(vec![1, 2], 1.0),
            )
            .unwrap();
            Self {
                rate,
                outputs,
                latents: vec![latent],
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl GenerativeModel for StubModel {
        fn corruption_rate(&self) -> Option<f64> {
            self.rate
        }

        fn corruption_dist(&self) -> CorruptionDist {
            CorruptionDist::Binomial
        }

        fn predict(&self, inputs: &[ExpressionTable], options: &PredictOptions) -> Result<Prediction> {
            self.seen.lock().unwrap().push((inputs.to_vec(), *options));
            let outputs = if self.outputs.len() == 1 {
                OneOrMany::One(self.outputs[0].clone())
            } else {
                OneOrMany::Many(self.outputs.clone())
            };
            Ok(Prediction {
                outputs,
                latents: OneOrMany::One(self.latents[0].clone()),
            })
        }
    }

    /// Independent standard normal over `cells x features`
    pub(crate) fn standard_normal(cells: usize, features: usize) -> Distribution {
        let base = Distribution::normal(
            ArrayD::zeros(vec![cells, features]),
            ArrayD::from_elem(vec![cells, features], 1.0),
        )
        .unwrap();
        Distribution::independent(base, 1).unwrap()
    }

    /// Metric returning a fixed score
    struct FixedScore(Score);

    impl Metric for FixedScore {
        fn default_name(&self) -> &'static str {
            "fixedscore"
        }

        fn score(&self, _inputs: &ScoreInputs<'_>, _extras: Option<&Extras>) -> Result<Score> {
            Ok(self.0.clone())
        }
    }

    fn counts() -> ExpressionTable {
        ExpressionTable::from_matrix(array![[100.0, 50.0], [80.0, 120.0], [60.0, 90.0]]).unwrap()
    }

    fn bound(score: Score, model: Arc<StubModel>, config: MetricConfig) -> SingleCellMetric<FixedScore> {
        let mut metric = SingleCellMetric::new(FixedScore(score), config).unwrap();
        metric.bind(model).unwrap();
        metric
    }

    #[test]
    fn test_unbound_metric_is_contract_violation() {
        let metric = SingleCellMetric::new(FixedScore(Score::Empty), MetricConfig::default().with_inputs(counts()))
            .unwrap();
        assert!(matches!(metric.evaluate(), Err(MetricError::ContractViolation { .. })));
    }

    #[test]
    fn test_bind_rejects_invalid_corruption_rate() {
        let model = Arc::new(StubModel::new(Some(1.5), vec![standard_normal(3, 2)]));
        let mut metric = SingleCellMetric::new(FixedScore(Score::Empty), MetricConfig::default()).unwrap();
        assert!(matches!(metric.bind(model), Err(MetricError::ContractViolation { .. })));
        assert!(!metric.is_bound());
    }

    #[test]
    fn test_config_validation() {
        let config = MetricConfig::default().with_n_samples(0);
        assert!(matches!(
            SingleCellMetric::new(FixedScore(Score::Empty), config),
            Err(MetricError::InvalidInput { .. })
        ));
        let config = MetricConfig::default().with_batch_size(0);
        assert!(SingleCellMetric::new(FixedScore(Score::Empty), config).is_err());
    }

    #[test]
    fn test_singleton_matches_one_element_list() {
        let model = Arc::new(StubModel::new(None, vec![standard_normal(3, 2)]));
        let metric = bound(Score::from(1.0), model.clone(), MetricConfig::default());

        let single = metric
            .evaluate_with(Some(OneOrMany::One(TableInput::from(counts()))), None)
            .unwrap();
        let list = metric
            .evaluate_with(Some(OneOrMany::Many(vec![TableInput::from(counts())])), None)
            .unwrap();
        assert_eq!(single, list);

        let seen = model.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].0, seen[1].0);
    }

    #[test]
    fn test_corruption_only_touches_first_table() {
        let proteins = ExpressionTable::from_matrix(array![[5.0, 7.0], [3.0, 9.0], [4.0, 4.0]]).unwrap();
        let model = Arc::new(StubModel::new(
            Some(1.0),
            vec![standard_normal(3, 2), standard_normal(3, 2)],
        ));
        let config = MetricConfig::default()
            .with_inputs(vec![counts(), proteins.clone()])
            .with_seed(11);
        let metric = bound(Score::Empty, model.clone(), config);
        metric.evaluate().unwrap();

        let seen = model.seen.lock().unwrap();
        let (tables, options) = &seen[0];
        assert_ne!(tables[0].matrix(), counts().matrix());
        assert_eq!(tables[0].cell_ids(), counts().cell_ids());
        assert_eq!(tables[1], proteins);
        assert!(!options.apply_corruption);
    }

    #[test]
    fn test_seeded_corruption_repeats() {
        let model = Arc::new(StubModel::new(Some(0.5), vec![standard_normal(3, 2)]));
        let config = MetricConfig::default().with_inputs(counts()).with_seed(5);
        let metric = bound(Score::Empty, model.clone(), config);
        metric.evaluate().unwrap();
        metric.evaluate().unwrap();

        let seen = model.seen.lock().unwrap();
        assert_eq!(seen[0].0, seen[1].0);
    }

    #[test]
    fn test_n_samples_override_reaches_model() {
        let model = Arc::new(StubModel::new(None, vec![standard_normal(3, 2)]));
        let config = MetricConfig::default().with_inputs(counts()).with_n_samples(2).with_batch_size(16);
        let metric = bound(Score::Empty, model.clone(), config);
        metric.evaluate().unwrap();
        metric.evaluate_with(None, Some(7)).unwrap();

        let seen = model.seen.lock().unwrap();
        assert_eq!(seen[0].1.n_samples, 2);
        assert_eq!(seen[0].1.batch_size, 16);
        assert_eq!(seen[1].1.n_samples, 7);
    }

    #[test]
    fn test_scalar_score_keyed_by_name() {
        let model = Arc::new(StubModel::new(None, vec![standard_normal(3, 2)]));
        let config = MetricConfig::default().with_inputs(counts());
        let metric = bound(Score::from(2.5), model.clone(), config.clone());
        assert_eq!(metric.evaluate().unwrap(), MetricReport::from([("fixedscore".to_string(), 2.5)]));

        let renamed = bound(Score::from(2.5), model, config.with_name("custom"));
        assert_eq!(renamed.evaluate().unwrap(), MetricReport::from([("custom".to_string(), 2.5)]));
    }

    #[test]
    fn test_empty_score_is_empty_report() {
        let model = Arc::new(StubModel::new(None, vec![standard_normal(3, 2)]));
        let metric = bound(Score::Empty, model, MetricConfig::default().with_inputs(counts()));
        assert!(metric.evaluate().unwrap().is_empty());
    }

    #[test]
    fn test_array_scores() {
        let single = Score::Scalar(ScoreValue::Array(array![[4.0]].into_dyn()));
        assert_eq!(single.into_report("m").unwrap()["m"], 4.0);

        let wide = Score::mapping([("a", ScoreValue::Array(Array2::<f64>::zeros((2, 2)).into_dyn()))]);
        assert!(matches!(wide.into_report("m"), Err(MetricError::ContractViolation { .. })));
    }

    #[test]
    fn test_non_finite_scores_rejected() {
        for bad in [f64::INFINITY, f64::NEG_INFINITY, f64::NAN] {
            assert!(matches!(
                Score::from(bad).into_report("m"),
                Err(MetricError::ContractViolation { .. })
            ));
            let wrapped = Score::mapping([("x", ScoreValue::Array(array![bad].into_dyn()))]);
            assert!(wrapped.into_report("m").is_err());
        }
    }

    #[test]
    fn test_merge_report_rejects_collisions() {
        let mut logs = MetricReport::from([("loss".to_string(), 1.0)]);
        merge_report(&mut logs, MetricReport::from([("nllk0".to_string(), 2.0)])).unwrap();
        assert_eq!(logs.len(), 2);
        let clash = merge_report(&mut logs, MetricReport::from([("loss".to_string(), 3.0)]));
        assert!(matches!(clash, Err(MetricError::ContractViolation { .. })));
        assert_eq!(logs["loss"], 1.0);
    }

    #[test]
    fn test_evaluate_all_merges_callbacks() {
        let model = Arc::new(StubModel::new(None, vec![standard_normal(3, 2)]));
        let config = MetricConfig::default().with_inputs(counts());
        let a = bound(Score::from(1.0), model.clone(), config.clone().with_name("a"));
        let b = bound(Score::from(2.0), model.clone(), config.clone().with_name("b"));
        let callbacks: [&dyn EpochCallback; 2] = [&a, &b];
        let logs = evaluate_all(&callbacks, 3).unwrap();
        assert_eq!(logs, MetricReport::from([("a".to_string(), 1.0), ("b".to_string(), 2.0)]));

        let dup = bound(Score::from(9.0), model, config.with_name("a"));
        let callbacks: [&dyn EpochCallback; 2] = [&a, &dup];
        assert!(evaluate_all(&callbacks, 3).is_err());
    }
}
