//! Distances between groups of observations.
//!
//! A [`Distance`] pairs a metric from the [`MetricRegistry`] with the representation of an
//! [`AnnotatedData`] it reads (an `obsm` embedding or a raw layer) and assembles pairwise
//! matrices over the groups of an observation column.
//!
//! ```
//! use ndarray::array;
//! use single_perturbation::distance::Distance;
//! use single_perturbation::matrix::AnnotatedData;
//!
//! let x = array![[0.0, 0.0], [0.0, 1.0], [5.0, 5.0], [5.0, 6.0]];
//! let data = AnnotatedData::new(x.clone())
//!     .with_obsm("X_pca", x)
//!     .unwrap()
//!     .with_obs("perturbation", vec!["control", "control", "KO", "KO"])
//!     .unwrap();
//!
//! let distance = Distance::new("euclidean", None, None).unwrap();
//! let matrix = distance.pairwise(&data, "perturbation", None, false).unwrap();
//! assert_eq!(matrix.labels(), &["control".to_string(), "KO".to_string()]);
//! assert!((matrix.get("control", "KO").unwrap() - 50.0_f64.sqrt()).abs() < 1e-12);
//! ```

pub(crate) mod cloud;
pub mod counts;
pub(crate) mod featurewise;
pub(crate) mod profile;
pub mod registry;
pub mod wasserstein;

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{self, AtomicUsize};

use ndarray::Array2;
use rayon::prelude::*;

use crate::error::{PerturbationError, Result};
use crate::matrix::{AnnotatedData, FeatureMatrix, Representation};

pub use cloud::Kernel;
pub use profile::pseudobulk;
pub use registry::{
    BuiltinMetric, Metric, MetricClass, MetricContext, MetricParams, MetricRegistry, ParamValue,
};

/// Embedding read when neither a layer nor an embedding is named.
pub const DEFAULT_EMBEDDING: &str = "X_pca";

/// How profile metrics collapse a group to a single vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Aggregation {
    #[default]
    Mean,
    Median,
}

/// Square, labelled, symmetric matrix of group distances with a zero diagonal.
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceMatrix {
    labels: Vec<String>,
    values: Array2<f64>,
}

impl DistanceMatrix {
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Distance between groups `a` and `b`, `None` if either label is absent.
    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.labels.iter().position(|l| l == a)?;
        let j = self.labels.iter().position(|l| l == b)?;
        Some(self.values[[i, j]])
    }

    /// Exact symmetry check.
    pub fn is_symmetric(&self) -> bool {
        let n = self.len();
        (0..n).all(|i| {
            (0..n).all(|j| self.values[[i, j]].to_bits() == self.values[[j, i]].to_bits())
        })
    }
}

/// A metric bound to the representation it reads.
#[derive(Clone)]
pub struct Distance {
    name: String,
    metric: Arc<dyn Metric>,
    representation: Representation,
    aggregation: Aggregation,
    params: MetricParams,
}

impl fmt::Debug for Distance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Distance")
            .field("metric", &self.name)
            .field("representation", &self.representation)
            .field("aggregation", &self.aggregation)
            .field("params", &self.params)
            .finish()
    }
}

fn representation_from_keys(
    layer_key: Option<&str>,
    obsm_key: Option<&str>,
) -> Result<Representation> {
    match (layer_key, obsm_key) {
        (Some(layer), Some(obsm)) => Err(PerturbationError::Configuration(format!(
            "Cannot use 'layer_key' ('{layer}') and 'obsm_key' ('{obsm}') at the same time"
        ))),
        (Some(layer), None) => Ok(Representation::Layer(layer.to_string())),
        (None, Some(obsm)) => Ok(Representation::Embedding(obsm.to_string())),
        (None, None) => Ok(Representation::Embedding(DEFAULT_EMBEDDING.to_string())),
    }
}

impl Distance {
    /// Resolve `metric` in the built-in registry.
    ///
    /// At most one of `layer_key` and `obsm_key` may be given; with neither, the
    /// [`DEFAULT_EMBEDDING`] is read.
    pub fn new(metric: &str, layer_key: Option<&str>, obsm_key: Option<&str>) -> Result<Self> {
        Self::from_registry(&MetricRegistry::default(), metric, layer_key, obsm_key)
    }

    pub fn from_registry(
        registry: &MetricRegistry,
        metric: &str,
        layer_key: Option<&str>,
        obsm_key: Option<&str>,
    ) -> Result<Self> {
        let representation = representation_from_keys(layer_key, obsm_key)?;
        let implementation = registry.get(metric)?;
        Ok(Distance {
            name: metric.to_string(),
            metric: implementation,
            representation,
            aggregation: Aggregation::default(),
            params: MetricParams::default(),
        })
    }

    pub fn with_aggregation(mut self, aggregation: Aggregation) -> Self {
        self.aggregation = aggregation;
        self
    }

    /// Attach metric parameters; keys the metric does not read are rejected.
    pub fn with_params(mut self, params: MetricParams) -> Result<Self> {
        params.validate(&self.name, self.metric.accepted_params())?;
        self.params = params;
        Ok(self)
    }

    pub fn metric_name(&self) -> &str {
        &self.name
    }

    pub fn class(&self) -> MetricClass {
        self.metric.class()
    }

    pub fn representation(&self) -> &Representation {
        &self.representation
    }

    pub fn params(&self) -> &MetricParams {
        &self.params
    }

    /// Distance between two point clouds sharing their feature columns.
    pub fn metric_fct(&self, x: &FeatureMatrix, y: &FeatureMatrix) -> Result<f64> {
        x.ensure_same_features(y, &format!("{} input columns", self.name))?;
        if x.nrows() == 0 || y.nrows() == 0 {
            return Err(PerturbationError::InvalidInput(format!(
                "metric '{}' needs at least one observation per input (got {} and {})",
                self.name,
                x.nrows(),
                y.nrows()
            )));
        }
        let x = x.to_dense();
        let y = y.to_dense();
        self.evaluate(&x, &y)
    }

    fn evaluate(&self, x: &Array2<f64>, y: &Array2<f64>) -> Result<f64> {
        self.params.validate(&self.name, self.metric.accepted_params())?;
        let ctx = MetricContext {
            params: &self.params,
            aggregation: self.aggregation,
        };
        self.metric.distance(x.view(), y.view(), &ctx)
    }

    /// Groups of `groupby` as dense point clouds, in subset order or order of first appearance.
    fn group_clouds(
        &self,
        data: &AnnotatedData,
        groupby: &str,
        groups: Option<&[&str]>,
    ) -> Result<Vec<(String, Array2<f64>)>> {
        let mut all = data.group_indices(groupby)?;
        if let Some(subset) = groups {
            let mut selected = Vec::with_capacity(subset.len());
            for &wanted in subset {
                let position = all
                    .iter()
                    .position(|(name, _)| name == wanted)
                    .ok_or_else(|| {
                        PerturbationError::Configuration(format!(
                            "group '{wanted}' not found in obs['{groupby}']"
                        ))
                    })?;
                selected.push(all.swap_remove(position));
            }
            all = selected;
        }

        all.into_iter()
            .map(|(name, rows)| {
                let cloud = data.rows_of(&self.representation, &rows)?.to_dense().into_owned();
                Ok((name, cloud))
            })
            .collect()
    }

    /// Distance between every pair of groups of `groupby`.
    ///
    /// Only the upper triangle is evaluated; the matrix is mirrored and its diagonal is zero.
    pub fn pairwise(
        &self,
        data: &AnnotatedData,
        groupby: &str,
        groups: Option<&[&str]>,
        show_progress: bool,
    ) -> Result<DistanceMatrix> {
        let clouds = self.group_clouds(data, groupby, groups)?;
        let n = clouds.len();
        let pairs: Vec<(usize, usize)> = (0..n)
            .flat_map(|i| ((i + 1)..n).map(move |j| (i, j)))
            .collect();
        let total = pairs.len();
        tracing::debug!(
            metric = %self.name,
            representation = %self.representation,
            groups = n,
            pairs = total,
            "computing pairwise distances"
        );

        let done = AtomicUsize::new(0);
        let results: Vec<Result<f64>> = pairs
            .par_iter()
            .map(|&(i, j)| {
                let value = self.evaluate(&clouds[i].1, &clouds[j].1);
                let finished = done.fetch_add(1, atomic::Ordering::Relaxed) + 1;
                if show_progress {
                    tracing::info!(metric = %self.name, "pairwise distances: {finished}/{total}");
                }
                value
            })
            .collect();

        let mut values = Array2::zeros((n, n));
        for (&(i, j), result) in pairs.iter().zip(results) {
            let value = result?;
            values[[i, j]] = value;
            values[[j, i]] = value;
        }

        Ok(DistanceMatrix {
            labels: clouds.into_iter().map(|(name, _)| name).collect(),
            values,
        })
    }

    /// The row of [`Distance::pairwise`] belonging to `selected_group`, itself included at zero.
    ///
    /// Each pair is evaluated in the same orientation as the pairwise matrix: the group that
    /// comes first in group order is the first argument. A selected group outside `groups` is
    /// placed after them.
    pub fn onesided_distances(
        &self,
        data: &AnnotatedData,
        groupby: &str,
        selected_group: &str,
        groups: Option<&[&str]>,
    ) -> Result<Vec<(String, f64)>> {
        let clouds = self.group_clouds(data, groupby, groups)?;
        let listed = clouds.iter().position(|(name, _)| name == selected_group);
        let appended = match listed {
            Some(_) => None,
            None => self
                .group_clouds(data, groupby, Some(&[selected_group][..]))?
                .into_iter()
                .next()
                .map(|(_, cloud)| cloud),
        };
        let (selected_position, selected) = match (listed, &appended) {
            (Some(position), _) => (position, &clouds[position].1),
            (None, Some(cloud)) => (clouds.len(), cloud),
            (None, None) => {
                return Err(PerturbationError::Configuration(format!(
                    "group '{selected_group}' not found"
                )));
            }
        };

        clouds
            .par_iter()
            .enumerate()
            .map(|(position, (name, cloud))| {
                let value = match position.cmp(&selected_position) {
                    Ordering::Equal => 0.0,
                    Ordering::Less => self.evaluate(cloud, selected)?,
                    Ordering::Greater => self.evaluate(selected, cloud)?,
                };
                Ok((name.clone(), value))
            })
            .collect()
    }
}
