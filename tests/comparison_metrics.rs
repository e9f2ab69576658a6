use std::collections::BTreeMap;

use approx::assert_abs_diff_eq;
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use ndarray::Array2;
use rand::SeedableRng;
use rand::distributions::Distribution;
use rand_chacha::ChaCha8Rng;
use single_perturbation::metrics::{
    ComparisonMode, DeOptions, DistOptions, KnnOptions, compare_class, compare_de, compare_dist,
    compare_knn,
};
use single_perturbation::testing::{TTestType, TestMethod};
use single_perturbation::{FeatureMatrix, GroupLabel, PerturbationError};
use statrs::distribution::Normal;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// `rows` observations scattered around `center` with unit noise.
fn gaussian(rows: usize, center: &[f64], seed: u64) -> Array2<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let noise = Normal::new(0.0, 1.0).unwrap();
    Array2::from_shape_fn((rows, center.len()), |(_, f)| center[f] + noise.sample(&mut rng))
}

fn dense(values: Array2<f64>) -> FeatureMatrix {
    FeatureMatrix::from(values)
}

fn sparse(values: &Array2<f64>) -> FeatureMatrix {
    let mut coo = CooMatrix::new(values.nrows(), values.ncols());
    for ((r, c), &v) in values.indexed_iter() {
        if v != 0.0 {
            coo.push(r, c, v);
        }
    }
    FeatureMatrix::from(CsrMatrix::from(&coo))
}

fn shifted_center(n_features: usize, shift: f64, shifted: &[usize]) -> Vec<f64> {
    (0..n_features)
        .map(|f| if shifted.contains(&f) { 3.0 + shift } else { 3.0 })
        .collect()
}

#[test]
fn exact_prediction_scores_zero_distance() {
    init_tracing();
    let mut perturbed = Array2::<f64>::zeros((100, 20));
    perturbed.column_mut(7).fill(1.5);
    let pert = dense(perturbed.clone());
    let pred = dense(perturbed);
    let ctrl = dense(Array2::zeros((100, 20)));

    for metric in ["euclidean", "edistance", "mean_absolute_distance", "root_mean_squared_error"] {
        let options = DistOptions::default().with_metric(metric);
        assert_eq!(compare_dist(&pert, &pred, &ctrl, &options).unwrap(), 0.0, "{metric}");
    }
}

#[test]
fn closer_prediction_scores_lower() {
    let ctrl = gaussian(60, &[0.0; 8], 1);
    let pert = gaussian(60, &[2.0; 8], 2);
    let good = gaussian(60, &[1.9; 8], 3);
    let bad = gaussian(60, &[0.5; 8], 4);

    for mode in ["simple", "scaled"] {
        let options = DistOptions::default()
            .with_metric("edistance")
            .with_mode(mode.parse::<ComparisonMode>().unwrap());
        let ctrl = dense(ctrl.clone());
        let pert = dense(pert.clone());
        let good_score = compare_dist(&pert, &dense(good.clone()), &ctrl, &options).unwrap();
        let bad_score = compare_dist(&pert, &dense(bad.clone()), &ctrl, &options).unwrap();
        assert!(good_score < bad_score, "{mode}: {good_score} vs {bad_score}");
    }
    assert!(matches!(
        "log".parse::<ComparisonMode>(),
        Err(PerturbationError::UnknownMode(_))
    ));
}

#[test]
fn knn_without_control_reports_comp_and_siml() {
    let x = dense(gaussian(50, &[0.0, 0.0, 0.0], 10));
    let y = dense(gaussian(50, &[20.0, 20.0, 20.0], 11));
    let result = compare_knn(&x, &y, None, &KnnOptions::default().with_n_neighbors(5)).unwrap();

    assert_eq!(
        result.keys().copied().collect::<Vec<_>>(),
        vec![GroupLabel::Comp, GroupLabel::Siml]
    );
    assert_abs_diff_eq!(result.values().sum::<f64>(), 1.0, epsilon = 1e-12);
    // Y is far from X, so every neighbour of a simulated point is simulated
    assert_eq!(result[&GroupLabel::Siml], 1.0);
    assert_eq!(result[&GroupLabel::Comp], 0.0);
}

#[test]
fn knn_with_control_finds_the_real_cluster() {
    let center = [5.0, 5.0, 5.0, 5.0];
    let x = dense(gaussian(50, &center, 20));
    let c = dense(gaussian(50, &[-5.0, -5.0, -5.0, -5.0], 21));
    // Every simulated point sits at the real cluster's center
    let y = dense(Array2::from_shape_fn((20, 4), |(_, f)| center[f]));

    let result = compare_knn(&x, &y, Some(&c), &KnnOptions::default().with_n_neighbors(5)).unwrap();
    let expected: BTreeMap<GroupLabel, f64> = [(GroupLabel::Comp, 1.0), (GroupLabel::Ctrl, 0.0)]
        .into_iter()
        .collect();
    assert_eq!(result, expected);

    let with_y = compare_knn(
        &x,
        &y,
        Some(&c),
        &KnnOptions::default().with_n_neighbors(5).with_use_y_knn(true).with_n_jobs(2),
    )
    .unwrap();
    assert_eq!(with_y.len(), 3);
    assert_eq!(with_y[&GroupLabel::Ctrl], 0.0);
    assert_abs_diff_eq!(with_y.values().sum::<f64>(), 1.0, epsilon = 1e-12);
}

#[test]
fn knn_is_reproducible_for_a_seed() {
    let x = dense(gaussian(80, &[0.0, 0.0], 30));
    let y = dense(gaussian(40, &[0.5, 0.0], 31));
    let options = KnnOptions::default().with_n_neighbors(10).with_random_state(7);
    let first = compare_knn(&x, &y, None, &options).unwrap();
    let second = compare_knn(&x, &y, None, &options.with_n_jobs(4)).unwrap();
    assert_eq!(first, second);
}

#[test]
fn knn_rejects_mismatched_columns_before_indexing() {
    let x = dense(gaussian(10, &[0.0, 0.0], 1));
    let y = dense(gaussian(10, &[0.0, 0.0, 0.0], 2));
    assert!(matches!(
        compare_knn(&x, &y, None, &KnnOptions::default()),
        Err(PerturbationError::ShapeMismatch { .. })
    ));
}

#[test]
fn classifier_score_tracks_similarity() {
    let ctrl_center = [0.0; 10];
    let pert_center = [2.5; 10];
    let x = dense(gaussian(80, &pert_center, 40));
    let c = dense(gaussian(80, &ctrl_center, 41));

    let like_real = dense(gaussian(60, &pert_center, 42));
    let score = compare_class(&x, &like_real, &c, None).unwrap();
    assert!(score > 0.95, "{score}");
    assert!(score <= 1.0);

    let like_control = dense(gaussian(60, &ctrl_center, 43));
    let score = compare_class(&x, &like_control, &c, None).unwrap();
    assert!(score < 0.05, "{score}");
}

#[test]
fn de_agreement_follows_the_shifted_features() {
    let n_features = 30;
    let ctrl = gaussian(40, &shifted_center(n_features, 0.0, &[]), 50);
    let pert = gaussian(40, &shifted_center(n_features, 2.0, &[1, 4, 9, 16, 25]), 51);
    let close = gaussian(40, &shifted_center(n_features, 2.0, &[1, 4, 9, 16, 25]), 52);
    let unrelated = gaussian(40, &shifted_center(n_features, 2.0, &[0, 2, 3, 5, 6]), 53);

    let options = DeOptions::default().with_shared_top(5);
    let good =
        compare_de(&dense(pert.clone()), &dense(close), &dense(ctrl.clone()), &options).unwrap();
    let poor = compare_de(&dense(pert), &dense(unrelated), &dense(ctrl), &options).unwrap();

    assert_eq!(good.shared_top_genes, 1.0);
    assert_eq!(poor.shared_top_genes, 0.0);
    assert!(good.scores_corr > poor.scores_corr);
    assert!(good.scores_ranks_corr > poor.scores_ranks_corr);
}

#[test]
fn de_clamps_shared_top_and_accepts_sparse_input() {
    let ctrl = gaussian(30, &shifted_center(12, 0.0, &[]), 60).mapv(|v| v.max(0.0).round());
    let pert = gaussian(30, &shifted_center(12, 3.0, &[0, 5]), 61).mapv(|v| v.max(0.0).round());
    let pred = gaussian(30, &shifted_center(12, 3.0, &[0, 6]), 62).mapv(|v| v.max(0.0).round());

    for method in [
        TestMethod::TTest(TTestType::Welch),
        TestMethod::TTest(TTestType::OverestimatedVariance),
        TestMethod::Wilcoxon { tie_correct: true },
    ] {
        let options = DeOptions::default().with_method(method).with_shared_top(500);
        let from_dense = compare_de(
            &dense(pert.clone()),
            &dense(pred.clone()),
            &dense(ctrl.clone()),
            &options,
        )
        .unwrap();
        let from_sparse =
            compare_de(&sparse(&pert), &sparse(&pred), &sparse(&ctrl), &options).unwrap();

        assert!((0.0..=1.0).contains(&from_dense.shared_top_genes));
        // Every feature is in both top sets once the request is clamped to 12
        assert_eq!(from_dense.shared_top_genes, 1.0);
        assert_abs_diff_eq!(from_dense.scores_corr, from_sparse.scores_corr, epsilon = 1e-9);
        assert_abs_diff_eq!(
            from_dense.scores_ranks_corr,
            from_sparse.scores_ranks_corr,
            epsilon = 1e-9
        );
    }
}

#[test]
fn comparisons_reject_mismatched_columns() {
    let a = dense(gaussian(5, &[0.0, 0.0], 1));
    let b = dense(gaussian(5, &[0.0, 0.0, 0.0], 2));
    assert!(matches!(
        compare_de(&a, &b, &a, &DeOptions::default()),
        Err(PerturbationError::ShapeMismatch { .. })
    ));
    assert!(matches!(
        compare_class(&a, &a, &b, None),
        Err(PerturbationError::ShapeMismatch { .. })
    ));
    assert!(matches!(
        compare_dist(&a, &b, &a, &DistOptions::default()),
        Err(PerturbationError::ShapeMismatch { .. })
    ));
}
