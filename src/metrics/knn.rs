use std::collections::BTreeMap;

use crate::error::{PerturbationError, Result};
use crate::matrix::{FeatureMatrix, GroupLabel};
use crate::metrics::ensure_same_features;
use crate::neighbors::KnnIndex;

/// Lower bound on the graph degree used to build the index.
const MIN_INDEX_NEIGHBORS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnnOptions {
    pub n_neighbors: usize,
    /// Put `Y` itself into the index; only used when a control is given
    pub use_y_knn: bool,
    pub random_state: u64,
    /// Worker threads for building and querying the index
    pub n_jobs: usize,
}

impl Default for KnnOptions {
    fn default() -> Self {
        KnnOptions {
            n_neighbors: 20,
            use_y_knn: false,
            random_state: 0,
            n_jobs: 1,
        }
    }
}

impl KnnOptions {
    pub fn with_n_neighbors(mut self, n_neighbors: usize) -> Self {
        self.n_neighbors = n_neighbors;
        self
    }

    pub fn with_use_y_knn(mut self, use_y_knn: bool) -> Self {
        self.use_y_knn = use_y_knn;
        self
    }

    pub fn with_random_state(mut self, random_state: u64) -> Self {
        self.random_state = random_state;
        self
    }

    pub fn with_n_jobs(mut self, n_jobs: usize) -> Self {
        self.n_jobs = n_jobs;
        self
    }
}

/// Share of each group among the nearest indexed neighbours of the simulated points `y`.
///
/// Without a control the index holds `y` (as `siml`) and `x` (as `comp`). With a control it
/// holds `x` and `c` (as `ctrl`), plus `y` when `use_y_knn` is set. Every group placed in
/// the index appears in the result, with 0.0 when no neighbour belongs to it.
pub fn compare_knn(
    x: &FeatureMatrix,
    y: &FeatureMatrix,
    c: Option<&FeatureMatrix>,
    options: &KnnOptions,
) -> Result<BTreeMap<GroupLabel, f64>> {
    ensure_same_features(&[("X", x), ("Y", y)])?;
    if let Some(c) = c {
        ensure_same_features(&[("X", x), ("C", c)])?;
    }

    let mut parts: Vec<(GroupLabel, &FeatureMatrix)> = Vec::with_capacity(3);
    match c {
        None => {
            parts.push((GroupLabel::Siml, y));
            parts.push((GroupLabel::Comp, x));
        }
        Some(c) => {
            if options.use_y_knn {
                parts.push((GroupLabel::Siml, y));
            }
            parts.push((GroupLabel::Comp, x));
            parts.push((GroupLabel::Ctrl, c));
        }
    }

    let labels: Vec<GroupLabel> = parts
        .iter()
        .flat_map(|(label, matrix)| std::iter::repeat_n(*label, matrix.nrows()))
        .collect();
    let n_reference = labels.len();
    if options.n_neighbors == 0 || options.n_neighbors > n_reference {
        return Err(PerturbationError::InvalidInput(format!(
            "n_neighbors must be between 1 and the index size ({n_reference}), got {}",
            options.n_neighbors
        )));
    }
    tracing::debug!(
        n_x = x.nrows(),
        n_y = y.nrows(),
        n_c = c.map(FeatureMatrix::nrows),
        n_reference,
        n_neighbors = options.n_neighbors,
        "compare_knn"
    );

    let reference = FeatureMatrix::vstack(&parts.iter().map(|(_, m)| *m).collect::<Vec<_>>())?;
    let index_neighbors = options.n_neighbors.max(MIN_INDEX_NEIGHBORS).min(n_reference);
    let index = KnnIndex::build(
        reference.to_dense().view(),
        index_neighbors,
        options.random_state,
        options.n_jobs,
    )?;
    let neighbors = index.query(y.to_dense().view(), options.n_neighbors)?;

    let mut proportions: BTreeMap<GroupLabel, f64> =
        parts.iter().map(|(label, _)| (*label, 0.0)).collect();
    let mut total = 0usize;
    for neighbor in neighbors.iter().flatten() {
        if let Some(share) = proportions.get_mut(&labels[neighbor.index]) {
            *share += 1.0;
        }
        total += 1;
    }
    if total > 0 {
        for share in proportions.values_mut() {
            *share /= total as f64;
        }
    }
    Ok(proportions)
}
