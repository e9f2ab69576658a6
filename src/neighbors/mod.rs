//! Approximate nearest-neighbour index over a reference point cloud, backed by `hnsw_rs`.
//!
//! The index is built and queried inside one call and dropped afterwards. Insertion order is
//! shuffled by `random_state`; insertion and search both run on a rayon pool sized by
//! `n_jobs`.

use std::fmt;

use hnsw_rs::hnsw::Hnsw;
use hnsw_rs::prelude::*;
use ndarray::ArrayView2;
use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use rayon::ThreadPool;

use crate::error::{PerturbationError, Result};

const MAX_LAYER: usize = 16;
const EF_CONSTRUCTION: usize = 200;

/// One neighbour of a query point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub index: usize,
    pub distance: f64,
}

pub struct KnnIndex {
    hnsw: Hnsw<'static, f64, DistL2>,
    pool: ThreadPool,
    n_points: usize,
    dims: usize,
    n_neighbors: usize,
}

impl fmt::Debug for KnnIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KnnIndex")
            .field("n_points", &self.n_points)
            .field("dims", &self.dims)
            .field("n_neighbors", &self.n_neighbors)
            .field("threads", &self.pool.current_num_threads())
            .finish()
    }
}

impl KnnIndex {
    /// Index every row of `data` with graph degree `n_neighbors`.
    pub fn build(
        data: ArrayView2<'_, f64>,
        n_neighbors: usize,
        random_state: u64,
        n_jobs: usize,
    ) -> Result<Self> {
        let n_points = data.nrows();
        if n_neighbors == 0 || n_neighbors > n_points {
            return Err(PerturbationError::InvalidInput(format!(
                "index degree must be between 1 and the number of points ({n_points}), \
                 got {n_neighbors}"
            )));
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(n_jobs.max(1))
            .build()
            .map_err(|e| {
                let message = format!("cannot start {n_jobs} index threads: {e}");
                PerturbationError::Configuration(message)
            })?;

        let rows: Vec<Vec<f64>> = data.rows().into_iter().map(|row| row.to_vec()).collect();
        let mut order: Vec<usize> = (0..n_points).collect();
        order.shuffle(&mut ChaCha8Rng::seed_from_u64(random_state));
        let items: Vec<(&[f64], usize)> = order.iter().map(|&i| (rows[i].as_slice(), i)).collect();

        let hnsw = Hnsw::<f64, DistL2>::new(
            n_neighbors,
            n_points,
            MAX_LAYER,
            EF_CONSTRUCTION.max(n_neighbors),
            DistL2 {},
        );
        pool.install(|| hnsw.parallel_insert_slice(&items));
        tracing::debug!(n_points, dims = data.ncols(), n_neighbors, "built hnsw index");

        Ok(KnnIndex {
            hnsw,
            pool,
            n_points,
            dims: data.ncols(),
            n_neighbors,
        })
    }

    pub fn n_points(&self) -> usize {
        self.n_points
    }

    /// The `k` nearest indexed points of every row of `points`, closest first.
    pub fn query(&self, points: ArrayView2<'_, f64>, k: usize) -> Result<Vec<Vec<Neighbor>>> {
        if k == 0 || k > self.n_points {
            return Err(PerturbationError::InvalidInput(format!(
                "k must be between 1 and the number of indexed points ({}), got {k}",
                self.n_points
            )));
        }
        if points.ncols() != self.dims {
            return Err(PerturbationError::shape(
                "query point dimensions",
                self.dims,
                points.ncols(),
            ));
        }

        let queries: Vec<Vec<f64>> = points.rows().into_iter().map(|row| row.to_vec()).collect();
        let ef_search = 2 * self.n_neighbors.max(k);
        let found = self.pool.install(|| self.hnsw.parallel_search(&queries, k, ef_search));

        Ok(found
            .into_iter()
            .map(|neighbours| {
                let mut hits: Vec<Neighbor> = neighbours
                    .into_iter()
                    .map(|n| Neighbor {
                        index: n.d_id,
                        distance: f64::from(n.distance),
                    })
                    .collect();
                hits.sort_by(|a, b| a.distance.total_cmp(&b.distance).then(a.index.cmp(&b.index)));
                hits
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array2, ArrayView1};
    use rand::distributions::Distribution;
    use statrs::distribution::Normal;

    fn gaussian_points(n: usize, dims: usize, seed: u64) -> Array2<f64> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let normal = Normal::new(0.0, 1.0).unwrap();
        Array2::from_shape_fn((n, dims), |_| normal.sample(&mut rng))
    }

    fn brute_force(data: &Array2<f64>, point: ArrayView1<'_, f64>, k: usize) -> Vec<usize> {
        let mut all: Vec<(f64, usize)> = data
            .rows()
            .into_iter()
            .enumerate()
            .map(|(i, row)| (row.iter().zip(point.iter()).map(|(a, b)| (a - b) * (a - b)).sum(), i))
            .collect();
        all.sort_by(|a, b| a.0.total_cmp(&b.0));
        all.into_iter().take(k).map(|(_, i)| i).collect()
    }

    #[test]
    fn recall_against_brute_force() {
        let data = gaussian_points(500, 5, 7);
        let index = KnnIndex::build(data.view(), 16, 42, 2).unwrap();
        let queries = gaussian_points(50, 5, 8);
        let results = index.query(queries.view(), 10).unwrap();

        let mut hits = 0;
        for (q, found) in results.iter().enumerate() {
            assert_eq!(found.len(), 10);
            assert!(found.windows(2).all(|w| w[0].distance <= w[1].distance));
            let truth = brute_force(&data, queries.row(q), 10);
            hits += found.iter().filter(|n| truth.contains(&n.index)).count();
        }
        let recall = hits as f64 / (50.0 * 10.0);
        assert!(recall > 0.9, "recall {recall}");
    }

    #[test]
    fn small_indexes_answer_exactly_for_any_thread_count() {
        let data = gaussian_points(120, 4, 3);
        let queries = gaussian_points(30, 4, 4);
        for n_jobs in [1, 3] {
            let index = KnnIndex::build(data.view(), 50, 11, n_jobs).unwrap();
            let results = index.query(queries.view(), 5).unwrap();
            for (q, found) in results.iter().enumerate() {
                let indices: Vec<usize> = found.iter().map(|n| n.index).collect();
                assert_eq!(indices, brute_force(&data, queries.row(q), 5), "n_jobs = {n_jobs}");
            }
        }
    }

    #[test]
    fn indexed_points_find_themselves() {
        let data = gaussian_points(200, 3, 1);
        let index = KnnIndex::build(data.view(), 10, 0, 1).unwrap();
        let results = index.query(data.view(), 5).unwrap();
        let found_self = results.iter().enumerate().filter(|(i, r)| r[0].index == *i).count();
        assert!(found_self >= 195);
        assert_eq!(results[0][0].distance, 0.0);
    }

    #[test]
    fn full_k_returns_every_point() {
        let data = gaussian_points(6, 2, 5);
        let index = KnnIndex::build(data.view(), 6, 0, 1).unwrap();
        let results = index.query(data.view(), 6).unwrap();
        for found in results {
            let mut indices: Vec<usize> = found.iter().map(|n| n.index).collect();
            indices.sort_unstable();
            assert_eq!(indices, vec![0, 1, 2, 3, 4, 5]);
        }
    }

    #[test]
    fn invalid_neighbor_counts() {
        let data = gaussian_points(5, 2, 0);
        assert!(KnnIndex::build(data.view(), 0, 0, 1).is_err());
        assert!(KnnIndex::build(data.view(), 6, 0, 1).is_err());
        let index = KnnIndex::build(data.view(), 3, 0, 1).unwrap();
        assert_eq!(index.n_points(), 5);
        assert!(matches!(index.query(data.view(), 6), Err(PerturbationError::InvalidInput(_))));
        let wrong_dims = gaussian_points(2, 3, 0);
        assert!(matches!(
            index.query(wrong_dims.view(), 2),
            Err(PerturbationError::ShapeMismatch { .. })
        ));
    }
}
