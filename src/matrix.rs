//! In-memory feature matrices and the annotated dataset consumed by the distance engine.
//!
//! Rows are always observations (cells) and columns are features (genes or embedding
//! dimensions). Matrices may be dense or CSR-sparse; routines that need random access
//! densify through [`FeatureMatrix::to_dense`].

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;

use nalgebra_sparse::{CooMatrix, CsrMatrix};
use ndarray::{Array2, ArrayView2, Axis, concatenate};
use single_utilities::traits::FloatOpsTS;

use crate::error::{PerturbationError, Result};

/// Tag attached to each row of a concatenated matrix for the duration of one computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GroupLabel {
    /// Real perturbed observations
    Comp,
    /// Control observations
    Ctrl,
    /// Simulated perturbed observations
    Siml,
}

impl GroupLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupLabel::Comp => "comp",
            GroupLabel::Ctrl => "ctrl",
            GroupLabel::Siml => "siml",
        }
    }
}

impl fmt::Display for GroupLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub enum FeatureMatrix {
    Dense(Array2<f64>),
    Sparse(CsrMatrix<f64>),
}

impl From<Array2<f64>> for FeatureMatrix {
    fn from(value: Array2<f64>) -> Self {
        FeatureMatrix::Dense(value)
    }
}

impl From<CsrMatrix<f64>> for FeatureMatrix {
    fn from(value: CsrMatrix<f64>) -> Self {
        FeatureMatrix::Sparse(value)
    }
}

#[inline]
fn as_f64<T: FloatOpsTS>(value: T) -> f64 {
    num_traits::ToPrimitive::to_f64(&value).unwrap_or(f64::NAN)
}

impl FeatureMatrix {
    /// Build a dense matrix from any float element type.
    pub fn from_dense<T>(view: ArrayView2<'_, T>) -> Self
    where
        T: FloatOpsTS,
    {
        FeatureMatrix::Dense(view.mapv(as_f64))
    }

    /// Build a sparse matrix from any float element type, keeping the sparsity pattern.
    pub fn from_csr<T>(matrix: &CsrMatrix<T>) -> Result<Self>
    where
        T: FloatOpsTS,
    {
        let values: Vec<f64> = matrix.values().iter().map(|&v| as_f64(v)).collect();
        let converted = CsrMatrix::try_from_pattern_and_values(matrix.pattern().clone(), values)
            .map_err(|e| PerturbationError::InvalidInput(format!("invalid CSR matrix: {e}")))?;
        Ok(FeatureMatrix::Sparse(converted))
    }

    pub fn nrows(&self) -> usize {
        match self {
            FeatureMatrix::Dense(m) => m.nrows(),
            FeatureMatrix::Sparse(m) => m.nrows(),
        }
    }

    pub fn ncols(&self) -> usize {
        match self {
            FeatureMatrix::Dense(m) => m.ncols(),
            FeatureMatrix::Sparse(m) => m.ncols(),
        }
    }

    pub fn is_sparse(&self) -> bool {
        matches!(self, FeatureMatrix::Sparse(_))
    }

    /// Dense view of the data. Borrows when already dense.
    pub fn to_dense(&self) -> Cow<'_, Array2<f64>> {
        match self {
            FeatureMatrix::Dense(m) => Cow::Borrowed(m),
            FeatureMatrix::Sparse(m) => {
                let mut dense = Array2::zeros((m.nrows(), m.ncols()));
                for (row, col, &value) in m.triplet_iter() {
                    dense[[row, col]] = value;
                }
                Cow::Owned(dense)
            }
        }
    }

    /// Fails with a shape error naming `context` when the feature spaces differ.
    pub fn ensure_same_features(&self, other: &FeatureMatrix, context: &str) -> Result<()> {
        if self.ncols() != other.ncols() {
            return Err(PerturbationError::shape(context, self.ncols(), other.ncols()));
        }
        Ok(())
    }

    /// Copy of the given rows, in the given order.
    pub fn select_rows(&self, rows: &[usize]) -> Result<FeatureMatrix> {
        check_rows(rows, self.nrows())?;

        match self {
            FeatureMatrix::Dense(m) => Ok(FeatureMatrix::Dense(m.select(Axis(0), rows))),
            FeatureMatrix::Sparse(m) => {
                let mut coo = CooMatrix::new(rows.len(), m.ncols());
                for (new_row, &row) in rows.iter().enumerate() {
                    let lane = m.row(row);
                    for (&col, &value) in lane.col_indices().iter().zip(lane.values()) {
                        coo.push(new_row, col, value);
                    }
                }
                Ok(FeatureMatrix::Sparse(CsrMatrix::from(&coo)))
            }
        }
    }

    /// Stack matrices vertically. The result is sparse only when every part is sparse.
    pub fn vstack(parts: &[&FeatureMatrix]) -> Result<FeatureMatrix> {
        let first = parts
            .first()
            .ok_or_else(|| PerturbationError::InvalidInput("nothing to stack".to_string()))?;
        for part in &parts[1..] {
            first.ensure_same_features(part, "stacked matrix columns")?;
        }

        if parts.iter().all(|p| p.is_sparse()) {
            let n_rows = parts.iter().map(|p| p.nrows()).sum();
            let mut coo = CooMatrix::new(n_rows, first.ncols());
            let mut offset = 0;
            for part in parts {
                if let FeatureMatrix::Sparse(m) = part {
                    for (row, col, &value) in m.triplet_iter() {
                        coo.push(offset + row, col, value);
                    }
                }
                offset += part.nrows();
            }
            return Ok(FeatureMatrix::Sparse(CsrMatrix::from(&coo)));
        }

        let dense: Vec<Cow<'_, Array2<f64>>> = parts.iter().map(|p| p.to_dense()).collect();
        let views: Vec<ArrayView2<'_, f64>> = dense.iter().map(|d| d.view()).collect();
        let stacked = concatenate(Axis(0), &views)
            .map_err(|e| PerturbationError::InvalidInput(format!("cannot stack matrices: {e}")))?;
        Ok(FeatureMatrix::Dense(stacked))
    }
}

/// Which feature representation of an [`AnnotatedData`] a computation reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Representation {
    /// A reduced embedding stored under this `obsm` key (e.g. `X_pca`)
    Embedding(String),
    /// An alternate layer of the main matrix (e.g. raw `counts`)
    Layer(String),
}

impl fmt::Display for Representation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Representation::Embedding(key) => write!(f, "obsm['{key}']"),
            Representation::Layer(key) => write!(f, "layers['{key}']"),
        }
    }
}

fn check_rows(rows: &[usize], nrows: usize) -> Result<()> {
    match rows.iter().find(|&&r| r >= nrows) {
        Some(&bad) => Err(PerturbationError::InvalidInput(format!(
            "row index {bad} out of bounds for {nrows} rows"
        ))),
        None => Ok(()),
    }
}

/// Observation-annotated dataset: a main matrix plus per-row categorical columns,
/// embeddings and alternate layers, all sharing the same rows.
#[derive(Debug, Clone)]
pub struct AnnotatedData {
    x: FeatureMatrix,
    obs: HashMap<String, Vec<String>>,
    obsm: HashMap<String, Array2<f64>>,
    layers: HashMap<String, FeatureMatrix>,
}

impl AnnotatedData {
    pub fn new(x: impl Into<FeatureMatrix>) -> Self {
        AnnotatedData {
            x: x.into(),
            obs: HashMap::new(),
            obsm: HashMap::new(),
            layers: HashMap::new(),
        }
    }

    pub fn n_obs(&self) -> usize {
        self.x.nrows()
    }

    pub fn x(&self) -> &FeatureMatrix {
        &self.x
    }

    /// Attach a categorical observation column.
    pub fn with_obs<S: Into<String>>(mut self, key: &str, values: Vec<S>) -> Result<Self> {
        if values.len() != self.n_obs() {
            return Err(PerturbationError::shape(
                format!("obs['{key}'] length"),
                self.n_obs(),
                values.len(),
            ));
        }
        self.obs
            .insert(key.to_string(), values.into_iter().map(Into::into).collect());
        Ok(self)
    }

    /// Attach an embedding with one row per observation.
    pub fn with_obsm(mut self, key: &str, embedding: Array2<f64>) -> Result<Self> {
        if embedding.nrows() != self.n_obs() {
            return Err(PerturbationError::shape(
                format!("obsm['{key}'] rows"),
                self.n_obs(),
                embedding.nrows(),
            ));
        }
        self.obsm.insert(key.to_string(), embedding);
        Ok(self)
    }

    /// Attach an alternate layer with the same shape as the main matrix.
    pub fn with_layer(mut self, key: &str, layer: impl Into<FeatureMatrix>) -> Result<Self> {
        let layer = layer.into();
        if layer.nrows() != self.n_obs() {
            return Err(PerturbationError::shape(
                format!("layers['{key}'] rows"),
                self.n_obs(),
                layer.nrows(),
            ));
        }
        self.x
            .ensure_same_features(&layer, &format!("layers['{key}'] columns"))?;
        self.layers.insert(key.to_string(), layer);
        Ok(self)
    }

    pub fn obs(&self, key: &str) -> Result<&[String]> {
        self.obs
            .get(key)
            .map(Vec::as_slice)
            .ok_or_else(|| PerturbationError::Configuration(format!("unknown obs column '{key}'")))
    }

    pub fn obsm(&self, key: &str) -> Result<&Array2<f64>> {
        self.obsm
            .get(key)
            .ok_or_else(|| PerturbationError::Configuration(format!("unknown obsm key '{key}'")))
    }

    pub fn layer(&self, key: &str) -> Result<&FeatureMatrix> {
        self.layers
            .get(key)
            .ok_or_else(|| PerturbationError::Configuration(format!("unknown layer key '{key}'")))
    }

    /// Row indices of every value of `groupby`, in order of first appearance.
    pub fn group_indices(&self, groupby: &str) -> Result<Vec<(String, Vec<usize>)>> {
        let column = self.obs(groupby)?;
        let mut order: Vec<(String, Vec<usize>)> = Vec::new();
        let mut position: HashMap<&str, usize> = HashMap::new();
        for (row, value) in column.iter().enumerate() {
            match position.get(value.as_str()) {
                Some(&slot) => order[slot].1.push(row),
                None => {
                    position.insert(value.as_str(), order.len());
                    order.push((value.clone(), vec![row]));
                }
            }
        }
        Ok(order)
    }

    /// Extract `rows` from the requested representation.
    pub fn rows_of(
        &self,
        representation: &Representation,
        rows: &[usize],
    ) -> Result<FeatureMatrix> {
        match representation {
            Representation::Embedding(key) => {
                let embedding = self.obsm(key)?;
                check_rows(rows, embedding.nrows())?;
                Ok(FeatureMatrix::Dense(embedding.select(Axis(0), rows)))
            }
            Representation::Layer(key) => self.layer(key)?.select_rows(rows),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn sparse_example() -> CsrMatrix<f64> {
        let coo = CooMatrix::try_from_triplets(
            3,
            4,
            vec![0, 1, 2, 2],
            vec![1, 0, 2, 3],
            vec![1.0, 2.0, 3.0, 4.0],
        )
        .unwrap();
        CsrMatrix::from(&coo)
    }

    #[test]
    fn sparse_densifies_in_place() {
        let m = FeatureMatrix::from(sparse_example());
        let dense = m.to_dense();
        assert_eq!(dense[[0, 1]], 1.0);
        assert_eq!(dense[[1, 0]], 2.0);
        assert_eq!(dense[[2, 3]], 4.0);
        assert_eq!(dense[[0, 0]], 0.0);
    }

    #[test]
    fn select_rows_matches_dense_and_sparse() {
        let sparse = FeatureMatrix::from(sparse_example());
        let dense = FeatureMatrix::from(sparse.to_dense().into_owned());
        let a = sparse.select_rows(&[2, 0]).unwrap();
        let b = dense.select_rows(&[2, 0]).unwrap();
        assert!(a.is_sparse());
        assert_eq!(a.to_dense().into_owned(), b.to_dense().into_owned());
        assert!(sparse.select_rows(&[3]).is_err());
    }

    #[test]
    fn vstack_keeps_sparsity_only_when_uniform() {
        let sparse = FeatureMatrix::from(sparse_example());
        let dense = FeatureMatrix::from(Array2::<f64>::ones((2, 4)));

        let both_sparse = FeatureMatrix::vstack(&[&sparse, &sparse]).unwrap();
        assert!(both_sparse.is_sparse());
        assert_eq!(both_sparse.nrows(), 6);

        let mixed = FeatureMatrix::vstack(&[&sparse, &dense]).unwrap();
        assert!(!mixed.is_sparse());
        assert_eq!(mixed.to_dense()[[4, 0]], 1.0);

        let narrow = FeatureMatrix::from(Array2::<f64>::ones((2, 3)));
        assert!(matches!(
            FeatureMatrix::vstack(&[&dense, &narrow]),
            Err(PerturbationError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn generic_construction_converts_to_f64() {
        let m = array![[1.0_f32, 2.0], [3.0, 4.0]];
        let fm = FeatureMatrix::from_dense(m.view());
        assert_eq!(fm.to_dense()[[1, 1]], 4.0);

        let coo =
            CooMatrix::try_from_triplets(2, 3, vec![0, 1], vec![2, 0], vec![0.5_f32, 7.0]).unwrap();
        let sparse = FeatureMatrix::from_csr(&CsrMatrix::from(&coo)).unwrap();
        assert!(sparse.is_sparse());
        assert_eq!(sparse.to_dense()[[0, 2]], 0.5);

        let data = AnnotatedData::new(sparse);
        assert_eq!(data.x().ncols(), 3);
    }

    #[test]
    fn group_indices_follow_first_appearance() {
        let data = AnnotatedData::new(Array2::<f64>::zeros((5, 2)))
            .with_obs("perturbation", vec!["b", "a", "b", "c", "a"])
            .unwrap();
        let groups = data.group_indices("perturbation").unwrap();
        let names: Vec<&str> = groups.iter().map(|(g, _)| g.as_str()).collect();
        assert_eq!(names, vec!["b", "a", "c"]);
        assert_eq!(groups[1].1, vec![1, 4]);
    }

    #[test]
    fn rows_of_reads_embeddings_and_layers() {
        let embedding = array![[0.0, 1.0], [2.0, 3.0], [4.0, 5.0]];
        let data = AnnotatedData::new(Array2::<f64>::zeros((3, 4)))
            .with_obsm("X_pca", embedding)
            .unwrap()
            .with_layer("counts", sparse_example())
            .unwrap();

        let pca = Representation::Embedding("X_pca".to_string());
        let picked = data.rows_of(&pca, &[2, 0]).unwrap();
        assert_eq!(picked.to_dense().into_owned(), array![[4.0, 5.0], [0.0, 1.0]]);
        assert!(matches!(data.rows_of(&pca, &[3]), Err(PerturbationError::InvalidInput(_))));

        let counts = data
            .rows_of(&Representation::Layer("counts".to_string()), &[1])
            .unwrap();
        assert!(counts.is_sparse());
        assert_eq!(counts.to_dense()[[0, 0]], 2.0);
        assert!(data
            .rows_of(&Representation::Embedding("X_umap".to_string()), &[0])
            .is_err());
    }

    #[test]
    fn annotations_must_match_row_count() {
        let data = AnnotatedData::new(Array2::<f64>::zeros((5, 2)));
        assert!(data.clone().with_obs("g", vec!["x"; 4]).is_err());
        assert!(data.clone().with_obsm("X_pca", Array2::zeros((4, 2))).is_err());
        assert!(data.with_layer("counts", Array2::<f64>::zeros((5, 3))).is_err());
    }
}
