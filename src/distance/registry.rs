//! Open registry mapping metric names to implementations.
//!
//! Built-in metrics are registered by [`MetricRegistry::default`]; callers add their own by
//! implementing [`Metric`] and calling [`MetricRegistry::register`].

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use ndarray::ArrayView2;

use crate::distance::{Aggregation, cloud, counts, featurewise, profile, wasserstein};
use crate::error::{PerturbationError, Result};

/// Behavioural class of a metric; determines which axioms it can be expected to satisfy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricClass {
    /// Non-negative, zero on identical inputs, symmetric, triangle inequality
    TrueMetric,
    /// Symmetric after pairwise assembly and zero on self, no triangle inequality
    Pseudo,
    /// Pseudo-distance that expects raw non-negative integer counts
    CountPseudo,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Float(f64),
    Text(String),
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Float(value)
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        ParamValue::Float(value as f64)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Text(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Text(value)
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Float(v) => write!(f, "{v}"),
            ParamValue::Text(v) => write!(f, "'{v}'"),
        }
    }
}

/// Keyword parameters forwarded to a metric.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricParams(BTreeMap<String, ParamValue>);

impl MetricParams {
    pub fn new() -> Self {
        MetricParams::default()
    }

    pub fn with(mut self, key: &str, value: impl Into<ParamValue>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Numeric parameter, or `default` when absent.
    pub fn float(&self, key: &str, default: f64) -> Result<f64> {
        match self.0.get(key) {
            None => Ok(default),
            Some(ParamValue::Float(v)) => Ok(*v),
            Some(other) => Err(PerturbationError::Configuration(format!(
                "parameter '{key}' must be numeric, got {other}"
            ))),
        }
    }

    /// Text parameter, or `default` when absent.
    pub fn text<'a>(&'a self, key: &str, default: &'a str) -> Result<&'a str> {
        match self.0.get(key) {
            None => Ok(default),
            Some(ParamValue::Text(v)) => Ok(v.as_str()),
            Some(other) => Err(PerturbationError::Configuration(format!(
                "parameter '{key}' must be text, got {other}"
            ))),
        }
    }

    /// Reject any key the metric does not declare.
    pub fn validate(&self, metric: &str, accepted: &[&str]) -> Result<()> {
        if let Some(key) = self.0.keys().find(|k| !accepted.contains(&k.as_str())) {
            return Err(PerturbationError::Configuration(format!(
                "metric '{metric}' does not accept parameter '{key}' (accepted: {accepted:?})"
            )));
        }
        Ok(())
    }
}

/// Everything a metric may read besides the two point clouds.
#[derive(Debug, Clone, Copy)]
pub struct MetricContext<'a> {
    pub params: &'a MetricParams,
    pub aggregation: Aggregation,
}

/// A point-cloud-to-point-cloud distance over two matrices sharing their columns.
pub trait Metric: Send + Sync {
    fn class(&self) -> MetricClass;

    /// Parameter keys this metric reads from [`MetricParams`].
    fn accepted_params(&self) -> &'static [&'static str] {
        &[]
    }

    fn distance(
        &self,
        x: ArrayView2<'_, f64>,
        y: ArrayView2<'_, f64>,
        ctx: &MetricContext<'_>,
    ) -> Result<f64>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinMetric {
    Edistance,
    Euclidean,
    RootMeanSquaredError,
    MeanSquaredError,
    MeanAbsoluteError,
    PearsonDistance,
    SpearmanDistance,
    KendallTauDistance,
    CosineDistance,
    R2Distance,
    MeanPairwise,
    Mmd,
    Wasserstein,
    KlDivergence,
    SymmetricKlDivergence,
    TTest,
    KsTest,
    NegativeBinomialNll,
}

impl Metric for BuiltinMetric {
    fn class(&self) -> MetricClass {
        use BuiltinMetric::*;
        match self {
            Edistance | Euclidean | RootMeanSquaredError | MeanAbsoluteError | PearsonDistance
            | SpearmanDistance | KendallTauDistance | CosineDistance | Wasserstein => {
                MetricClass::TrueMetric
            }
            MeanSquaredError | R2Distance | MeanPairwise | Mmd | KlDivergence
            | SymmetricKlDivergence | TTest | KsTest => MetricClass::Pseudo,
            NegativeBinomialNll => MetricClass::CountPseudo,
        }
    }

    fn accepted_params(&self) -> &'static [&'static str] {
        match self {
            BuiltinMetric::Mmd => &["kernel", "gamma", "degree", "coef0"],
            BuiltinMetric::Wasserstein => &["epsilon", "max_iter", "tol"],
            BuiltinMetric::KlDivergence
            | BuiltinMetric::SymmetricKlDivergence
            | BuiltinMetric::TTest
            | BuiltinMetric::NegativeBinomialNll => &["epsilon"],
            _ => &[],
        }
    }

    fn distance(
        &self,
        x: ArrayView2<'_, f64>,
        y: ArrayView2<'_, f64>,
        ctx: &MetricContext<'_>,
    ) -> Result<f64> {
        let agg = ctx.aggregation;
        let params = ctx.params;
        let value = match self {
            BuiltinMetric::Edistance => cloud::edistance(x, y),
            BuiltinMetric::MeanPairwise => cloud::mean_pairwise(x, y),
            BuiltinMetric::Mmd => cloud::mmd(x, y, &cloud::Kernel::from_params(params)?),
            BuiltinMetric::Euclidean => profile::euclidean(x, y, agg),
            BuiltinMetric::RootMeanSquaredError => profile::root_mean_squared_error(x, y, agg),
            BuiltinMetric::MeanSquaredError => profile::mean_squared_error(x, y, agg),
            BuiltinMetric::MeanAbsoluteError => profile::mean_absolute_error(x, y, agg),
            BuiltinMetric::PearsonDistance => profile::pearson_distance(x, y, agg),
            BuiltinMetric::SpearmanDistance => profile::spearman_distance(x, y, agg),
            BuiltinMetric::KendallTauDistance => profile::kendall_tau_distance(x, y, agg),
            BuiltinMetric::CosineDistance => profile::cosine_distance(x, y, agg),
            BuiltinMetric::R2Distance => profile::r2_distance(x, y, agg),
            BuiltinMetric::Wasserstein => {
                let options = wasserstein::SinkhornOptions::from_params(params)?;
                wasserstein::wasserstein_distance(x, y, &options)
            }
            BuiltinMetric::KlDivergence => {
                let epsilon = params.float("epsilon", featurewise::DEFAULT_EPSILON)?;
                featurewise::kl_divergence(x, y, epsilon)
            }
            BuiltinMetric::SymmetricKlDivergence => {
                let epsilon = params.float("epsilon", featurewise::DEFAULT_EPSILON)?;
                featurewise::kl_divergence(x, y, epsilon)
                    + featurewise::kl_divergence(y, x, epsilon)
            }
            BuiltinMetric::TTest => {
                let epsilon = params.float("epsilon", featurewise::DEFAULT_EPSILON)?;
                featurewise::t_test_distance(x, y, epsilon)
            }
            BuiltinMetric::KsTest => featurewise::ks_test_distance(x, y),
            BuiltinMetric::NegativeBinomialNll => {
                let epsilon = params.float("epsilon", counts::DEFAULT_EPSILON)?;
                counts::negative_binomial_nll(x, y, epsilon)?
            }
        };
        Ok(value)
    }
}

/// Name → metric mapping. Cloning is cheap; implementations are shared.
#[derive(Clone)]
pub struct MetricRegistry {
    metrics: HashMap<String, Arc<dyn Metric>>,
}

impl fmt::Debug for MetricRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricRegistry")
            .field("metrics", &self.names())
            .finish()
    }
}

impl Default for MetricRegistry {
    fn default() -> Self {
        let mut registry = MetricRegistry::empty();
        let builtins: [(&str, BuiltinMetric); 21] = [
            ("edistance", BuiltinMetric::Edistance),
            ("euclidean", BuiltinMetric::Euclidean),
            ("pseudobulk", BuiltinMetric::Euclidean),
            ("root_mean_squared_error", BuiltinMetric::RootMeanSquaredError),
            ("mse", BuiltinMetric::MeanSquaredError),
            ("mean_absolute_error", BuiltinMetric::MeanAbsoluteError),
            ("mean_absolute_distance", BuiltinMetric::MeanAbsoluteError),
            ("pearson_distance", BuiltinMetric::PearsonDistance),
            ("spearman_distance", BuiltinMetric::SpearmanDistance),
            ("kendalltau_distance", BuiltinMetric::KendallTauDistance),
            ("cosine_distance", BuiltinMetric::CosineDistance),
            ("r2_distance", BuiltinMetric::R2Distance),
            ("mean_pairwise", BuiltinMetric::MeanPairwise),
            ("mmd", BuiltinMetric::Mmd),
            ("wasserstein", BuiltinMetric::Wasserstein),
            ("kl_divergence", BuiltinMetric::KlDivergence),
            ("sym_kldiv", BuiltinMetric::SymmetricKlDivergence),
            ("t_test", BuiltinMetric::TTest),
            ("ks_test", BuiltinMetric::KsTest),
            ("nb_nll", BuiltinMetric::NegativeBinomialNll),
            ("nb_ll", BuiltinMetric::NegativeBinomialNll),
        ];
        for (name, metric) in builtins {
            registry.register(name, Arc::new(metric));
        }
        registry
    }
}

impl MetricRegistry {
    pub fn empty() -> Self {
        MetricRegistry {
            metrics: HashMap::new(),
        }
    }

    /// Register `metric` under `name`, returning any implementation it replaces.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        metric: Arc<dyn Metric>,
    ) -> Option<Arc<dyn Metric>> {
        self.metrics.insert(name.into(), metric)
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Metric>> {
        self.metrics
            .get(name)
            .cloned()
            .ok_or_else(|| PerturbationError::UnknownMetric(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.metrics.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.metrics.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
