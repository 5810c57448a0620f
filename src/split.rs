//! Reproducible train/holdout partitioning of table rows.

use rand::seq::index;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::casting::fraction_of;

/// Default share of rows used for training.
pub const DEFAULT_TRAIN_FRACTION: f64 = 0.8;

/// Default seed of the row partition.
pub const DEFAULT_SPLIT_SEED: u64 = 123;

/// Disjoint training and holdout row indices covering `0..n_rows`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainTestSplit {
    /// Training rows in sampling order
    pub train: Vec<usize>,
    /// Remaining rows, ascending
    pub holdout: Vec<usize>,
}

impl TrainTestSplit {
    #[must_use]
    pub fn n_rows(&self) -> usize {
        self.train.len() + self.holdout.len()
    }
}

/// Sample `floor(fraction * n_rows)` training rows without replacement.
///
/// Membership depends only on `n_rows`, `fraction` and `seed`; row contents
/// (including missing values) are never inspected.
///
/// # Errors
/// Returns an error if `fraction` is not in `(0, 1]`.
pub fn train_test_split(n_rows: usize, fraction: f64, seed: u64) -> Result<TrainTestSplit, String> {
    if !(fraction > 0.0 && fraction <= 1.0) {
        return Err(format!("train fraction must be in (0, 1], got {fraction}"));
    }

    let n_train = fraction_of(n_rows, fraction);
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let train = index::sample(&mut rng, n_rows, n_train).into_vec();

    let mut in_train = vec![false; n_rows];
    for &i in &train {
        in_train[i] = true;
    }
    let holdout = (0..n_rows).filter(|&i| !in_train[i]).collect();

    Ok(TrainTestSplit { train, holdout })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_split_sizes_and_coverage() {
        for n in [0, 1, 4, 10, 97, 1000] {
            let split = train_test_split(n, 0.8, DEFAULT_SPLIT_SEED).unwrap();
            assert_eq!(split.train.len(), (n as f64 * 0.8).floor() as usize, "n = {n}");
            assert_eq!(split.n_rows(), n);

            let train: HashSet<usize> = split.train.iter().copied().collect();
            let holdout: HashSet<usize> = split.holdout.iter().copied().collect();
            assert_eq!(train.len(), split.train.len(), "training rows must be distinct");
            assert!(train.is_disjoint(&holdout));
            assert_eq!(train.union(&holdout).count(), n);
        }
    }

    #[test]
    fn test_split_is_reproducible() {
        let a = train_test_split(500, 0.8, 7).unwrap();
        let b = train_test_split(500, 0.8, 7).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_split_depends_on_seed() {
        let a = train_test_split(500, 0.8, 1).unwrap();
        let b = train_test_split(500, 0.8, 2).unwrap();
        assert_ne!(a.train, b.train);
    }

    #[test]
    fn test_holdout_sorted() {
        let split = train_test_split(50, 0.5, 3).unwrap();
        assert!(split.holdout.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_full_fraction_has_empty_holdout() {
        let split = train_test_split(10, 1.0, 0).unwrap();
        assert_eq!(split.train.len(), 10);
        assert!(split.holdout.is_empty());
    }

    #[test]
    fn test_invalid_fraction() {
        assert!(train_test_split(10, 0.0, 0).is_err());
        assert!(train_test_split(10, 1.5, 0).is_err());
        assert!(train_test_split(10, f64::NAN, 0).is_err());
    }
}
