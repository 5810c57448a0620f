//! Random forest regression.
//!
//! An ensemble of CART regression trees, each grown on a bootstrap sample of
//! the training rows with the MSE split criterion. Predictions average the
//! trees. All randomness flows from one seed, so a configuration fitted on
//! the same data always yields the same forest.
//!
//! # Example
//!
//! ```
//! use geodownscale::model::{FittedModel, RandomForestConfig, RandomForestRegressor, Regressor};
//! use ndarray::array;
//!
//! let x = array![[1.0], [2.0], [3.0], [4.0]];
//! let y = array![10.0, 20.0, 30.0, 40.0];
//! let config = RandomForestConfig { n_estimators: 20, ..Default::default() };
//! let forest = RandomForestRegressor::new(config).fit(x.view(), y.view()).unwrap();
//! let pred = forest.predict(array![[4.0]].view()).unwrap();
//! assert!(pred[0] > 25.0);
//! ```

use ndarray::{Array1, ArrayView1, ArrayView2};
use rand::seq::index;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{check_training_data, FittedModel, ModelError, Regressor};

/// How many predictors each split considers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MaxFeatures {
    /// Every predictor (the usual choice for regression forests)
    #[default]
    All,
    /// `ceil(sqrt(n_features))`
    Sqrt,
    /// `ceil(fraction * n_features)`, at least one
    Fraction(f64),
}

impl MaxFeatures {
    fn resolve(self, n_features: usize) -> usize {
        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let count = match self {
            Self::All => n_features,
            Self::Sqrt => (n_features as f64).sqrt().ceil() as usize,
            Self::Fraction(f) => (f * n_features as f64).ceil() as usize,
        };
        count.clamp(1, n_features.max(1))
    }
}

/// Random forest hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RandomForestConfig {
    /// Number of trees
    pub n_estimators: usize,
    /// Maximum tree depth (`None` grows until leaves are pure or too small)
    pub max_depth: Option<usize>,
    /// Minimum rows a node needs to be split
    pub min_samples_split: usize,
    /// Minimum rows on each side of a split
    pub min_samples_leaf: usize,
    /// Predictors considered per split
    pub max_features: MaxFeatures,
    /// Grow each tree on a bootstrap resample of the rows
    pub bootstrap: bool,
    /// Seed of all model randomness
    pub seed: u64,
}

impl Default for RandomForestConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::All,
            bootstrap: true,
            seed: 0,
        }
    }
}

impl RandomForestConfig {
    fn validate(&self) -> Result<(), ModelError> {
        if self.n_estimators == 0 {
            return Err(ModelError::InvalidConfig("n_estimators must be at least 1".into()));
        }
        if self.min_samples_split < 2 {
            return Err(ModelError::InvalidConfig("min_samples_split must be at least 2".into()));
        }
        if self.min_samples_leaf == 0 {
            return Err(ModelError::InvalidConfig("min_samples_leaf must be at least 1".into()));
        }
        if let MaxFeatures::Fraction(f) = self.max_features {
            if !(f > 0.0 && f <= 1.0) {
                return Err(ModelError::InvalidConfig(format!(
                    "max_features fraction must be in (0, 1], got {f}"
                )));
            }
        }
        Ok(())
    }
}

/// Untrained forest: a configuration implementing [`Regressor`].
#[derive(Debug, Clone, Default)]
pub struct RandomForestRegressor {
    config: RandomForestConfig,
}

impl RandomForestRegressor {
    #[must_use]
    pub fn new(config: RandomForestConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &RandomForestConfig {
        &self.config
    }
}

impl Regressor for RandomForestRegressor {
    type Model = RandomForest;

    fn fit(
        &self,
        features: ArrayView2<'_, f64>,
        target: ArrayView1<'_, f64>,
    ) -> Result<RandomForest, ModelError> {
        self.config.validate()?;
        check_training_data(features, target)?;

        let n_rows = target.len();
        let n_features = features.ncols();
        let max_features = self.config.max_features.resolve(n_features);
        let mut master = ChaCha8Rng::seed_from_u64(self.config.seed);

        let mut trees = Vec::with_capacity(self.config.n_estimators);
        for _ in 0..self.config.n_estimators {
            let mut rng = ChaCha8Rng::seed_from_u64(master.gen());
            let rows: Vec<usize> = if self.config.bootstrap {
                (0..n_rows).map(|_| rng.gen_range(0..n_rows)).collect()
            } else {
                (0..n_rows).collect()
            };
            let grower = TreeGrower {
                features: features.view(),
                target: target.view(),
                config: &self.config,
                max_features,
            };
            trees.push(grower.grow(rows, &mut rng));
        }

        debug!(
            trees = trees.len(),
            rows = n_rows,
            features = n_features,
            nodes = trees.iter().map(|t| t.nodes.len()).sum::<usize>(),
            "Fitted random forest"
        );

        Ok(RandomForest { trees, n_features })
    }
}

/// A fitted random forest.
#[derive(Debug, Clone)]
pub struct RandomForest {
    trees: Vec<RegressionTree>,
    n_features: usize,
}

impl RandomForest {
    /// Number of trees in the ensemble.
    #[must_use]
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    fn predict_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        let sum: f64 = self.trees.iter().map(|t| t.predict(row)).sum();
        #[allow(clippy::cast_precision_loss)]
        let n = self.trees.len() as f64;
        sum / n
    }
}

impl FittedModel for RandomForest {
    fn n_features(&self) -> usize {
        self.n_features
    }

    fn predict(&self, features: ArrayView2<'_, f64>) -> Result<Array1<f64>, ModelError> {
        if features.ncols() != self.n_features {
            return Err(ModelError::FeatureMismatch {
                expected: self.n_features,
                actual: features.ncols(),
            });
        }
        Ok(features.outer_iter().map(|row| self.predict_row(row)).collect())
    }
}

#[derive(Debug, Clone)]
enum TreeNode {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

#[derive(Debug, Clone)]
struct RegressionTree {
    nodes: Vec<TreeNode>,
}

impl RegressionTree {
    fn predict(&self, row: ArrayView1<'_, f64>) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                TreeNode::Leaf { value } => return *value,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if row[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    /// sum_l^2 / n_l + sum_r^2 / n_r, larger is a purer split
    score: f64,
}

struct TreeGrower<'a> {
    features: ArrayView2<'a, f64>,
    target: ArrayView1<'a, f64>,
    config: &'a RandomForestConfig,
    max_features: usize,
}

impl TreeGrower<'_> {
    /// Grow a tree depth-first with an explicit work stack.
    fn grow(&self, rows: Vec<usize>, rng: &mut ChaCha8Rng) -> RegressionTree {
        let mut nodes = vec![TreeNode::Leaf { value: 0.0 }];
        let mut stack = vec![(0usize, rows, 0usize)];

        while let Some((node_idx, rows, depth)) = stack.pop() {
            let (sum, sum_sq) = rows.iter().fold((0.0, 0.0), |(s, q), &i| {
                let y = self.target[i];
                (s + y, q + y * y)
            });
            #[allow(clippy::cast_precision_loss)]
            let n = rows.len() as f64;
            let mean = sum / n;

            let depth_reached = self.config.max_depth.is_some_and(|d| depth >= d);
            let impurity = sum_sq - sum * sum / n;
            let splittable = !depth_reached
                && rows.len() >= self.config.min_samples_split
                && rows.len() >= 2 * self.config.min_samples_leaf
                && impurity > 1e-12 * sum_sq.max(1.0);

            let split = if splittable {
                self.best_split(&rows, sum * sum / n, rng)
            } else {
                None
            };

            let Some(split) = split else {
                nodes[node_idx] = TreeNode::Leaf { value: mean };
                continue;
            };

            let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
                .iter()
                .partition(|&&i| self.features[[i, split.feature]] <= split.threshold);

            let left = nodes.len();
            let right = left + 1;
            nodes.push(TreeNode::Leaf { value: 0.0 });
            nodes.push(TreeNode::Leaf { value: 0.0 });
            nodes[node_idx] = TreeNode::Split {
                feature: split.feature,
                threshold: split.threshold,
                left,
                right,
            };

            stack.push((right, right_rows, depth + 1));
            stack.push((left, left_rows, depth + 1));
        }

        RegressionTree { nodes }
    }

    fn candidate_features(&self, rng: &mut ChaCha8Rng) -> Vec<usize> {
        let n = self.features.ncols();
        if self.max_features >= n {
            return (0..n).collect();
        }
        let mut picked = index::sample(rng, n, self.max_features).into_vec();
        picked.sort_unstable();
        picked
    }

    fn best_split(&self, rows: &[usize], parent_score: f64, rng: &mut ChaCha8Rng) -> Option<SplitCandidate> {
        let min_leaf = self.config.min_samples_leaf;
        let total: f64 = rows.iter().map(|&i| self.target[i]).sum();
        let mut best: Option<SplitCandidate> = None;
        let mut pairs: Vec<(f64, f64)> = Vec::with_capacity(rows.len());

        for feature in self.candidate_features(rng) {
            pairs.clear();
            pairs.extend(rows.iter().map(|&i| (self.features[[i, feature]], self.target[i])));
            pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

            let mut left_sum = 0.0;
            for k in 0..pairs.len() - 1 {
                left_sum += pairs[k].1;
                let n_left = k + 1;
                let n_right = pairs.len() - n_left;
                if n_left < min_leaf {
                    continue;
                }
                if n_right < min_leaf {
                    break;
                }
                if pairs[k].0 == pairs[k + 1].0 {
                    continue;
                }

                let right_sum = total - left_sum;
                #[allow(clippy::cast_precision_loss)]
                let score = left_sum * left_sum / n_left as f64 + right_sum * right_sum / n_right as f64;

                if best.as_ref().map_or(true, |b| score > b.score) {
                    let (lo, hi) = (pairs[k].0, pairs[k + 1].0);
                    let mid = lo + (hi - lo) / 2.0;
                    // Adjacent floats can round the midpoint up onto `hi`
                    let threshold = if mid < hi { mid } else { lo };
                    best = Some(SplitCandidate {
                        feature,
                        threshold,
                        score,
                    });
                }
            }
        }

        best.filter(|b| b.score > parent_score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};

    fn small_config(n_estimators: usize) -> RandomForestConfig {
        RandomForestConfig {
            n_estimators,
            ..Default::default()
        }
    }

    #[test]
    fn test_single_tree_without_bootstrap_fits_exactly() {
        let x = array![[1.0], [2.0], [3.0], [4.0]];
        let y = array![5.0, 5.0, 9.0, 9.0];
        let config = RandomForestConfig {
            n_estimators: 1,
            bootstrap: false,
            ..Default::default()
        };
        let forest = RandomForestRegressor::new(config).fit(x.view(), y.view()).unwrap();
        let pred = forest.predict(x.view()).unwrap();
        assert_eq!(pred.to_vec(), vec![5.0, 5.0, 9.0, 9.0]);
        assert_eq!(forest.trees[0].nodes.len(), 3, "one split, two leaves");
    }

    #[test]
    fn test_constant_target_gives_single_leaf() {
        let x = array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]];
        let y = array![7.0, 7.0, 7.0];
        let forest = RandomForestRegressor::new(small_config(5)).fit(x.view(), y.view()).unwrap();
        assert!(forest.trees.iter().all(|t| t.nodes.len() == 1));
        assert_eq!(forest.predict(x.view()).unwrap().to_vec(), vec![7.0; 3]);
    }

    #[test]
    fn test_constant_feature_predicts_mean() {
        // Nothing separates the rows, so every leaf is a bootstrap mean
        let x = array![[1.0], [1.0], [1.0], [1.0]];
        let y = array![1.0, 2.0, 3.0, 4.0];
        let forest = RandomForestRegressor::new(small_config(10)).fit(x.view(), y.view()).unwrap();
        let pred = forest.predict(x.view()).unwrap();
        assert!(pred.iter().all(|&p| p == pred[0]));
        assert!(pred[0] >= 1.0 && pred[0] <= 4.0);
    }

    #[test]
    fn test_learns_step_function() {
        let x = Array2::from_shape_fn((200, 2), |(i, j)| if j == 0 { i as f64 } else { ((i * 7) % 13) as f64 });
        let y: Array1<f64> = (0..200).map(|i| if i < 100 { 0.0 } else { 10.0 }).collect();
        let forest = RandomForestRegressor::new(small_config(20)).fit(x.view(), y.view()).unwrap();

        let queries = array![[10.0, 3.0], [190.0, 3.0]];
        let pred = forest.predict(queries.view()).unwrap();
        assert!(pred[0] < 1.0, "low side: {}", pred[0]);
        assert!(pred[1] > 9.0, "high side: {}", pred[1]);
    }

    #[test]
    fn test_same_seed_same_predictions() {
        let x = Array2::from_shape_fn((50, 3), |(i, j)| ((i * 31 + j * 17) % 23) as f64);
        let y: Array1<f64> = (0..50).map(|i| ((i * 13) % 7) as f64).collect();

        let a = RandomForestRegressor::new(small_config(15)).fit(x.view(), y.view()).unwrap();
        let b = RandomForestRegressor::new(small_config(15)).fit(x.view(), y.view()).unwrap();
        assert_eq!(a.predict(x.view()).unwrap(), b.predict(x.view()).unwrap());

        let other = RandomForestConfig { seed: 99, ..small_config(15) };
        let c = RandomForestRegressor::new(other).fit(x.view(), y.view()).unwrap();
        assert_ne!(a.predict(x.view()).unwrap(), c.predict(x.view()).unwrap());
    }

    #[test]
    fn test_max_depth_limits_tree() {
        let x = Array2::from_shape_fn((64, 1), |(i, _)| i as f64);
        let y: Array1<f64> = (0..64).map(f64::from).collect();
        let config = RandomForestConfig {
            n_estimators: 1,
            max_depth: Some(2),
            bootstrap: false,
            ..Default::default()
        };
        let forest = RandomForestRegressor::new(config).fit(x.view(), y.view()).unwrap();
        // A depth-2 binary tree has at most 7 nodes
        assert!(forest.trees[0].nodes.len() <= 7);
        let distinct: std::collections::BTreeSet<u64> = forest
            .predict(x.view())
            .unwrap()
            .iter()
            .map(|v| v.to_bits())
            .collect();
        assert!(distinct.len() <= 4);
    }

    #[test]
    fn test_min_samples_leaf_respected() {
        let x = array![[1.0], [2.0], [3.0], [4.0]];
        let y = array![0.0, 0.0, 0.0, 100.0];
        let config = RandomForestConfig {
            n_estimators: 1,
            bootstrap: false,
            min_samples_leaf: 2,
            ..Default::default()
        };
        let forest = RandomForestRegressor::new(config).fit(x.view(), y.view()).unwrap();
        let pred = forest.predict(x.view()).unwrap();
        assert_eq!(pred.to_vec(), vec![0.0, 0.0, 50.0, 50.0]);
    }

    #[test]
    fn test_sqrt_max_features_resolves() {
        assert_eq!(MaxFeatures::All.resolve(9), 9);
        assert_eq!(MaxFeatures::Sqrt.resolve(9), 3);
        assert_eq!(MaxFeatures::Sqrt.resolve(10), 4);
        assert_eq!(MaxFeatures::Fraction(0.01).resolve(10), 1);
    }

    #[test]
    fn test_predict_feature_mismatch() {
        let forest = RandomForestRegressor::new(small_config(2))
            .fit(array![[1.0], [2.0]].view(), array![1.0, 2.0].view())
            .unwrap();
        assert!(matches!(
            forest.predict(array![[1.0, 2.0]].view()),
            Err(ModelError::FeatureMismatch { expected: 1, actual: 2 })
        ));
    }

    #[test]
    fn test_invalid_config() {
        let config = RandomForestConfig { n_estimators: 0, ..Default::default() };
        let result = RandomForestRegressor::new(config).fit(array![[1.0]].view(), array![1.0].view());
        assert!(matches!(result, Err(ModelError::InvalidConfig(_))));
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let config: RandomForestConfig = serde_json::from_str(r#"{"n_estimators": 10, "max_features": "sqrt"}"#).unwrap();
        assert_eq!(config.n_estimators, 10);
        assert_eq!(config.max_features, MaxFeatures::Sqrt);
        assert_eq!(config.seed, 0);
        assert!(config.bootstrap);
    }
}
