//! # single-perturbation
//!
//! A Rust library for scoring simulated single-cell perturbation responses against measured ones,
//! part of the single-rust ecosystem.
//!
//! Given the real perturbed cells `X`, the simulated cells `Y` and the control cells `C`, the crate
//! answers how well `Y` reproduces `X` from several angles: differential-expression agreement,
//! classifier discriminability, neighbourhood composition and distance ratios. It also provides
//! the pairwise group-distance engine these comparisons build on.
//!
//! ## Core Features
//!
//! - **Comparison Metrics**: `compare_de`, `compare_class`, `compare_knn` and `compare_dist`
//! - **Distances**: An open registry of point-cloud metrics (energy distance, pseudobulk distances,
//!   MMD, Sinkhorn-Wasserstein, negative binomial likelihood, ...) with pairwise group matrices
//! - **Differential Expression**: Welch/Student t-tests and Wilcoxon rank-sum ranking with
//!   multiple testing correction
//! - **Sparse Matrix Support**: Dense `ndarray` or `CsrMatrix` inputs from nalgebra-sparse
//!
//! ## Quick Start
//!
//! ```
//! use ndarray::Array2;
//! use single_perturbation::matrix::FeatureMatrix;
//! use single_perturbation::metrics::{DistOptions, compare_dist};
//!
//! let mut real = Array2::<f64>::zeros((100, 20));
//! real.column_mut(3).fill(2.0);
//! let control = FeatureMatrix::from(Array2::<f64>::zeros((100, 20)));
//! let real = FeatureMatrix::from(real);
//! let simulated = real.clone();
//!
//! let score = compare_dist(&real, &simulated, &control, &DistOptions::default()).unwrap();
//! assert_eq!(score, 0.0);
//! ```
//!
//! ## Module Organization
//!
//! - **[`metrics`]**: The four comparison routines and their options
//! - **[`distance`]**: `Distance`, the metric registry and pairwise distance matrices
//! - **[`testing`]**: Statistical tests, feature ranking and multiple testing correction
//! - **[`neighbors`]**: HNSW approximate nearest-neighbour index
//! - **[`classifier`]**: The `Classifier` trait and logistic regression
//! - **[`matrix`]**: Feature matrices and annotated datasets

pub mod classifier;
pub mod distance;
pub mod error;
pub mod matrix;
pub mod metrics;
pub mod neighbors;
pub mod scaling;
pub mod testing;

pub use error::{PerturbationError, Result};
pub use matrix::{AnnotatedData, FeatureMatrix, GroupLabel};
