//! Gradient-boosted decision trees for binary classification.
//!
//! Logistic loss (binomial deviance):
//! - initial raw score: log-odds of the positive-class prior
//! - each stage fits a least-squares regression tree to the residuals
//!   `y - sigmoid(F)` and replaces every leaf by the Newton step
//!   `sum(r) / sum(p * (1 - p))`
//! - `F += learning_rate * tree(x)`
//!
//! Row subsampling per stage is driven by a `ChaCha8Rng` seeded from the
//! parameters, so a given dataset and seed always produce the same model.

use crate::error::TrainingError;
use rand::seq::index;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Leaf denominators below this are treated as zero.
const MIN_HESSIAN_SUM: f64 = 1e-150;

/// Minimum split improvement worth keeping.
const MIN_SPLIT_GAIN: f64 = 1e-12;

/// Hyperparameters for one training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoostingParams {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    /// Fraction of rows drawn (without replacement) for each stage.
    pub subsample: f64,
    pub seed: u64,
}

impl Default for BoostingParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 3,
            min_samples_leaf: 1,
            subsample: 1.0,
            seed: 42,
        }
    }
}

impl BoostingParams {
    pub fn validate(&self) -> Result<(), TrainingError> {
        let invalid = |name: &'static str, reason: &str| {
            Err(TrainingError::InvalidParameter {
                name,
                reason: reason.to_string(),
            })
        };

        if self.n_estimators == 0 {
            return invalid("n_estimators", "must be at least 1");
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return invalid("learning_rate", "must be a positive finite number");
        }
        if self.max_depth == 0 {
            return invalid("max_depth", "must be at least 1");
        }
        if self.min_samples_leaf == 0 {
            return invalid("min_samples_leaf", "must be at least 1");
        }
        if !(self.subsample > 0.0 && self.subsample <= 1.0) {
            return invalid("subsample", "must be in (0, 1]");
        }
        Ok(())
    }
}

/// Numerically stable logistic function.
pub fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Node {
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

/// Regression tree stored as a flat node list; node 0 is the root and
/// children always come after their parent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<Node>,
}

impl RegressionTree {
    pub fn predict(&self, x: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match self.nodes[idx] {
                Node::Leaf { value } => return value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if x[feature] <= threshold { left } else { right };
                }
            }
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn leaf_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, Node::Leaf { .. }))
            .count()
    }

    /// Structural check used before trusting a deserialized tree.
    fn check(&self, n_features: usize) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("empty tree".to_string());
        }
        for (idx, node) in self.nodes.iter().enumerate() {
            match *node {
                Node::Leaf { value } if !value.is_finite() => {
                    return Err(format!("non-finite leaf value at node {idx}"));
                }
                Node::Leaf { .. } => {}
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    if feature >= n_features {
                        return Err(format!("node {idx} splits on feature {feature}"));
                    }
                    if threshold.is_nan() {
                        return Err(format!("NaN threshold at node {idx}"));
                    }
                    let in_order = |child: usize| child > idx && child < self.nodes.len();
                    if !in_order(left) || !in_order(right) {
                        return Err(format!("node {idx} has out-of-order children"));
                    }
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct SplitCandidate {
    feature: usize,
    threshold: f64,
    gain: f64,
}

/// Grows one least-squares tree on a fixed residual vector.
struct TreeGrower<'a> {
    rows: &'a [Vec<f64>],
    residuals: &'a [f64],
    max_depth: usize,
    min_samples_leaf: usize,
    nodes: Vec<Node>,
}

impl<'a> TreeGrower<'a> {
    fn new(rows: &'a [Vec<f64>], residuals: &'a [f64], params: &BoostingParams) -> Self {
        Self {
            rows,
            residuals,
            max_depth: params.max_depth,
            min_samples_leaf: params.min_samples_leaf,
            nodes: Vec::with_capacity(1 << (params.max_depth + 1).min(16)),
        }
    }

    fn grow(mut self, sample: Vec<usize>, leaf_value: &impl Fn(&[usize]) -> f64) -> RegressionTree {
        self.build(sample, 0, leaf_value);
        RegressionTree { nodes: self.nodes }
    }

    fn build(&mut self, sample: Vec<usize>, depth: usize, leaf_value: &impl Fn(&[usize]) -> f64) -> usize {
        let id = self.nodes.len();
        self.nodes.push(Node::Leaf { value: 0.0 });

        let split = if depth < self.max_depth {
            self.best_split(&sample)
        } else {
            None
        };

        match split {
            Some(split) => {
                let (left, right): (Vec<usize>, Vec<usize>) = sample
                    .into_iter()
                    .partition(|&row| self.rows[row][split.feature] <= split.threshold);

                let left_id = self.build(left, depth + 1, leaf_value);
                let right_id = self.build(right, depth + 1, leaf_value);
                self.nodes[id] = Node::Split {
                    feature: split.feature,
                    threshold: split.threshold,
                    left: left_id,
                    right: right_id,
                };
            }
            None => {
                self.nodes[id] = Node::Leaf {
                    value: leaf_value(&sample),
                };
            }
        }

        id
    }

    /// Best split by Friedman's mean-squared-error improvement.
    fn best_split(&self, sample: &[usize]) -> Option<SplitCandidate> {
        let n = sample.len();
        if n < 2 * self.min_samples_leaf {
            return None;
        }

        let total: f64 = sample.iter().map(|&row| self.residuals[row]).sum();
        let n_features = self.rows[sample[0]].len();
        let mut order = sample.to_vec();
        let mut best: Option<SplitCandidate> = None;

        for feature in 0..n_features {
            order.sort_by(|&a, &b| self.rows[a][feature].total_cmp(&self.rows[b][feature]));

            let mut left_sum = 0.0;
            for pos in 1..n {
                left_sum += self.residuals[order[pos - 1]];

                let n_left = pos;
                let n_right = n - pos;
                if n_left < self.min_samples_leaf || n_right < self.min_samples_leaf {
                    continue;
                }

                let lo = self.rows[order[pos - 1]][feature];
                let hi = self.rows[order[pos]][feature];
                if lo >= hi {
                    continue;
                }

                let right_sum = total - left_sum;
                let diff = left_sum / n_left as f64 - right_sum / n_right as f64;
                let gain = (n_left * n_right) as f64 * diff * diff / n as f64;

                if gain > MIN_SPLIT_GAIN && best.map_or(true, |b| gain > b.gain) {
                    let mid = lo + (hi - lo) / 2.0;
                    // Rounding can land the midpoint on `hi`; fall back to `lo`.
                    let threshold = if mid < hi { mid } else { lo };
                    best = Some(SplitCandidate {
                        feature,
                        threshold,
                        gain,
                    });
                }
            }
        }

        best
    }
}

/// Class prediction for a single feature vector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassPrediction {
    /// 1 = success, 0 = failure
    pub label: u8,
    /// `[P(failure), P(success)]`
    pub probabilities: [f64; 2],
}

/// Fitted boosted ensemble. Immutable once fit; retraining builds a new one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostedClassifier {
    n_features: usize,
    init_score: f64,
    learning_rate: f64,
    trees: Vec<RegressionTree>,
}

impl GradientBoostedClassifier {
    /// Fit the ensemble on preprocessed rows and binary labels.
    pub fn fit(
        rows: &[Vec<f64>],
        labels: &[bool],
        params: &BoostingParams,
    ) -> Result<Self, TrainingError> {
        params.validate()?;

        if rows.len() != labels.len() {
            return Err(TrainingError::LabelCountMismatch {
                features: rows.len(),
                labels: labels.len(),
            });
        }
        let n = rows.len();
        if n == 0 {
            return Err(TrainingError::Empty);
        }

        let n_features = rows[0].len();
        if let Some(bad) = rows.iter().find(|r| r.len() != n_features) {
            return Err(TrainingError::RaggedFeatures {
                expected: n_features,
                found: bad.len(),
            });
        }

        let positives = labels.iter().filter(|&&y| y).count();
        if positives == 0 || positives == n {
            return Err(TrainingError::SingleClass {
                label: u8::from(positives == n),
                rows: n,
            });
        }

        let targets: Vec<f64> = labels.iter().map(|&y| if y { 1.0 } else { 0.0 }).collect();
        let prior = positives as f64 / n as f64;
        let init_score = (prior / (1.0 - prior)).ln();

        let mut raw = vec![init_score; n];
        let mut rng = ChaCha8Rng::seed_from_u64(params.seed);
        let sample_size = ((n as f64 * params.subsample).round() as usize).clamp(1, n);
        let mut trees = Vec::with_capacity(params.n_estimators);

        for _ in 0..params.n_estimators {
            let probabilities: Vec<f64> = raw.iter().map(|&f| sigmoid(f)).collect();
            let residuals: Vec<f64> = targets
                .iter()
                .zip(&probabilities)
                .map(|(y, p)| y - p)
                .collect();

            let sample: Vec<usize> = if sample_size < n {
                let mut picked = index::sample(&mut rng, n, sample_size).into_vec();
                picked.sort_unstable();
                picked
            } else {
                (0..n).collect()
            };

            let newton_step = |leaf_rows: &[usize]| {
                let numerator: f64 = leaf_rows.iter().map(|&i| residuals[i]).sum();
                let denominator: f64 = leaf_rows
                    .iter()
                    .map(|&i| probabilities[i] * (1.0 - probabilities[i]))
                    .sum();
                if denominator.abs() < MIN_HESSIAN_SUM {
                    0.0
                } else {
                    numerator / denominator
                }
            };

            let tree = TreeGrower::new(rows, &residuals, params).grow(sample, &newton_step);
            for (score, row) in raw.iter_mut().zip(rows) {
                *score += params.learning_rate * tree.predict(row);
            }
            trees.push(tree);
        }

        Ok(Self {
            n_features,
            init_score,
            learning_rate: params.learning_rate,
            trees,
        })
    }

    /// Raw log-odds of success.
    pub fn decision_function(&self, x: &[f64]) -> f64 {
        debug_assert_eq!(x.len(), self.n_features);
        self.init_score
            + self.learning_rate * self.trees.iter().map(|t| t.predict(x)).sum::<f64>()
    }

    /// `[P(failure), P(success)]`.
    pub fn predict_proba(&self, x: &[f64]) -> [f64; 2] {
        let p = sigmoid(self.decision_function(x));
        [1.0 - p, p]
    }

    /// Label is the more probable class, ties broken toward success.
    pub fn predict(&self, x: &[f64]) -> ClassPrediction {
        let probabilities = self.predict_proba(x);
        ClassPrediction {
            label: u8::from(probabilities[1] >= probabilities[0]),
            probabilities,
        }
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn trees(&self) -> &[RegressionTree] {
        &self.trees
    }

    /// Structural validation of a deserialized ensemble.
    pub fn check(&self, n_features: usize) -> Result<(), String> {
        if self.n_features != n_features {
            return Err(format!(
                "classifier expects {} features, transform produces {n_features}",
                self.n_features
            ));
        }
        if !self.init_score.is_finite() || !self.learning_rate.is_finite() {
            return Err("non-finite classifier parameters".to_string());
        }
        for (i, tree) in self.trees.iter().enumerate() {
            tree.check(n_features).map_err(|e| format!("tree {i}: {e}"))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Success iff the first feature is positive; second feature is noise.
    fn separable() -> (Vec<Vec<f64>>, Vec<bool>) {
        let rows: Vec<Vec<f64>> = (0..40)
            .map(|i| {
                let x = i as f64 - 19.5;
                vec![x, ((i * 7) % 5) as f64]
            })
            .collect();
        let labels = rows.iter().map(|r| r[0] > 0.0).collect();
        (rows, labels)
    }

    #[test]
    fn test_sigmoid() {
        assert_relative_eq!(sigmoid(0.0), 0.5);
        assert!(sigmoid(800.0) <= 1.0);
        assert!(sigmoid(-800.0) >= 0.0);
        assert_relative_eq!(sigmoid(2.0) + sigmoid(-2.0), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_default_params_match_reference_setup() {
        let params = BoostingParams::default();
        assert_eq!(params.n_estimators, 100);
        assert_eq!(params.learning_rate, 0.1);
        assert_eq!(params.max_depth, 3);
        assert_eq!(params.seed, 42);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_invalid_params() {
        let params = BoostingParams {
            subsample: 0.0,
            ..BoostingParams::default()
        };
        assert!(matches!(
            params.validate(),
            Err(TrainingError::InvalidParameter {
                name: "subsample",
                ..
            })
        ));

        let params = BoostingParams {
            n_estimators: 0,
            ..BoostingParams::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_fit_separable_data() {
        let (rows, labels) = separable();
        let model = GradientBoostedClassifier::fit(&rows, &labels, &BoostingParams::default()).unwrap();

        assert_eq!(model.n_trees(), 100);
        assert_eq!(model.n_features(), 2);
        for (row, &label) in rows.iter().zip(&labels) {
            let prediction = model.predict(row);
            assert_eq!(prediction.label, u8::from(label));
            let [p0, p1] = prediction.probabilities;
            assert!((0.0..=1.0).contains(&p0) && (0.0..=1.0).contains(&p1));
            assert_relative_eq!(p0 + p1, 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_trees_respect_depth() {
        let (rows, labels) = separable();
        let params = BoostingParams {
            n_estimators: 5,
            max_depth: 2,
            ..BoostingParams::default()
        };
        let model = GradientBoostedClassifier::fit(&rows, &labels, &params).unwrap();
        for tree in model.trees() {
            assert!(tree.leaf_count() <= 4);
            assert!(tree.node_count() <= 7);
        }
        assert!(model.check(2).is_ok());
        assert!(model.check(3).is_err());
    }

    #[test]
    fn test_single_class_is_rejected() {
        let rows = vec![vec![1.0], vec![2.0], vec![3.0]];
        let err = GradientBoostedClassifier::fit(&rows, &[true, true, true], &BoostingParams::default())
            .unwrap_err();
        assert_eq!(err, TrainingError::SingleClass { label: 1, rows: 3 });

        let err = GradientBoostedClassifier::fit(&rows, &[false, false, false], &BoostingParams::default())
            .unwrap_err();
        assert_eq!(err, TrainingError::SingleClass { label: 0, rows: 3 });
    }

    #[test]
    fn test_shape_errors() {
        let err = GradientBoostedClassifier::fit(&[vec![1.0], vec![2.0, 3.0]], &[true, false], &BoostingParams::default())
            .unwrap_err();
        assert_eq!(err, TrainingError::RaggedFeatures { expected: 1, found: 2 });

        let err = GradientBoostedClassifier::fit(&[vec![1.0]], &[true, false], &BoostingParams::default())
            .unwrap_err();
        assert!(matches!(err, TrainingError::LabelCountMismatch { .. }));
    }

    #[test]
    fn test_seeded_subsampling_is_reproducible() {
        let (rows, labels) = separable();
        let params = BoostingParams {
            n_estimators: 20,
            subsample: 0.6,
            seed: 7,
            ..BoostingParams::default()
        };

        let a = GradientBoostedClassifier::fit(&rows, &labels, &params).unwrap();
        let b = GradientBoostedClassifier::fit(&rows, &labels, &params).unwrap();
        assert_eq!(a, b);

        for row in &rows {
            assert_eq!(
                a.decision_function(row).to_bits(),
                b.decision_function(row).to_bits()
            );
        }
    }

    #[test]
    fn test_constant_features_predict_prior() {
        let rows = vec![vec![0.0]; 4];
        let labels = [true, true, true, false];
        let model = GradientBoostedClassifier::fit(&rows, &labels, &BoostingParams::default()).unwrap();

        // No split is possible, and residuals sum to zero at the prior.
        let [_, p] = model.predict_proba(&[0.0]);
        assert_relative_eq!(p, 0.75, epsilon = 1e-9);
    }
}
