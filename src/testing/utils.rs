use crate::matrix::{FeatureMatrix, GroupLabel};

/// Rows carrying `label`, in row order.
pub fn label_indices(labels: &[GroupLabel], label: GroupLabel) -> Vec<usize> {
    labels
        .iter()
        .enumerate()
        .filter_map(|(i, &l)| if l == label { Some(i) } else { None })
        .collect()
}

/// Per-feature sums and sums of squares over the given rows.
///
/// Sparse matrices only visit stored entries.
pub fn accumulate_feature_statistics(
    matrix: &FeatureMatrix,
    rows: &[usize],
) -> (Vec<f64>, Vec<f64>) {
    let n_features = matrix.ncols();
    let mut sums = vec![0.0; n_features];
    let mut sum_squares = vec![0.0; n_features];

    match matrix {
        FeatureMatrix::Dense(m) => {
            for &row in rows {
                for (feature, &value) in m.row(row).iter().enumerate() {
                    sums[feature] += value;
                    sum_squares[feature] += value * value;
                }
            }
        }
        FeatureMatrix::Sparse(m) => {
            for &row in rows {
                let lane = m.row(row);
                for (&feature, &value) in lane.col_indices().iter().zip(lane.values()) {
                    sums[feature] += value;
                    sum_squares[feature] += value * value;
                }
            }
        }
    }

    (sums, sum_squares)
}

/// 1-based ranks with ties replaced by their average rank.
pub fn rank_average(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut ranks = vec![0.0; values.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i + 1;
        while j < order.len() && values[order[j]] == values[order[i]] {
            j += 1;
        }
        // Positions i..j share the average of ranks i+1..=j
        let rank = (i + j + 1) as f64 / 2.0;
        for &idx in &order[i..j] {
            ranks[idx] = rank;
        }
        i = j;
    }

    ranks
}

/// Sizes of each run of tied values, used for rank-sum tie corrections.
pub fn tie_group_sizes(values: &[f64]) -> Vec<usize> {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mut sizes = Vec::new();
    let mut i = 0;
    while i < sorted.len() {
        let mut j = i + 1;
        while j < sorted.len() && sorted[j] == sorted[i] {
            j += 1;
        }
        sizes.push(j - i);
        i = j;
    }
    sizes
}
