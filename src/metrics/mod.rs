//! Scores comparing a simulated perturbation against the real one.
//!
//! Each routine takes the real perturbed observations `X`, the simulated observations `Y`
//! and, where relevant, control observations `C`, all sharing the same feature columns.
//!
//! | routine          | question answered                                               |
//! |------------------|-----------------------------------------------------------------|
//! | [`compare_de`]   | do `X` and `Y` produce the same differential-expression ranking? |
//! | [`compare_class`]| does a classifier trained on `X` vs `C` see `Y` as perturbed?    |
//! | [`compare_knn`]  | which groups surround `Y` in a nearest-neighbour graph?          |
//! | [`compare_dist`] | is `Y` closer to `X` than to `C` under a chosen metric?          |

mod class;
mod de;
mod dist;
mod knn;

pub use class::compare_class;
pub use de::{DeComparison, DeOptions, compare_de};
pub use dist::{ComparisonMode, DistOptions, compare_dist};
pub use knn::{KnnOptions, compare_knn};

use crate::error::Result;
use crate::matrix::FeatureMatrix;

/// Fails with a shape error unless every named matrix has as many columns as the first.
pub(crate) fn ensure_same_features(inputs: &[(&str, &FeatureMatrix)]) -> Result<()> {
    if let Some(((_, first), rest)) = inputs.split_first() {
        for (name, matrix) in rest {
            first.ensure_same_features(matrix, &format!("{name} feature columns"))?;
        }
    }
    Ok(())
}
