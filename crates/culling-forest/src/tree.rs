use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, instrument};

use crate::{
    RfError,
    node::{Impurity, Node, NodeIndex},
    split::{SplitMethod, find_split},
};

/// Configuration for a single CART regression tree.
///
/// Construct via [`DecisionTreeConfig::new`], then chain `with_*` methods.
///
/// # Defaults
///
/// | Parameter           | Default               |
/// |---------------------|-----------------------|
/// | `split_method`      | `Exact`               |
/// | `max_depth`         | `None` (unlimited)    |
/// | `min_samples_split` | 2                     |
/// | `min_samples_leaf`  | 5                     |
/// | `max_features`      | `None` (all features) |
/// | `seed`              | 42                    |
#[derive(Debug, Clone)]
pub struct DecisionTreeConfig {
    pub(crate) split_method: SplitMethod,
    pub(crate) max_depth: Option<usize>,
    pub(crate) min_samples_split: usize,
    pub(crate) min_samples_leaf: usize,
    pub(crate) max_features: Option<usize>,
    pub(crate) seed: u64,
}

impl DecisionTreeConfig {
    /// Create a new config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            split_method: SplitMethod::Exact,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 5,
            max_features: None,
            seed: 42,
        }
    }

    /// Set the split-finding strategy.
    #[must_use]
    pub fn with_split_method(mut self, split_method: SplitMethod) -> Self {
        self.split_method = split_method;
        self
    }

    /// Set the maximum tree depth (root is depth 0). `None` means unlimited.
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: Option<usize>) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Set the minimum number of samples required to attempt a split.
    #[must_use]
    pub fn with_min_samples_split(mut self, min_samples_split: usize) -> Self {
        self.min_samples_split = min_samples_split;
        self
    }

    /// Set the minimum number of samples required in each leaf after a split.
    #[must_use]
    pub fn with_min_samples_leaf(mut self, min_samples_leaf: usize) -> Self {
        self.min_samples_leaf = min_samples_leaf;
        self
    }

    /// Set the number of features considered at each split. `None` means all.
    #[must_use]
    pub fn with_max_features(mut self, max_features: Option<usize>) -> Self {
        self.max_features = max_features;
        self
    }

    /// Set the random seed for reproducibility.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Return the split-finding strategy.
    #[must_use]
    pub fn split_method(&self) -> SplitMethod {
        self.split_method
    }

    /// Return the maximum depth limit, if any.
    #[must_use]
    pub fn max_depth(&self) -> Option<usize> {
        self.max_depth
    }

    /// Return the minimum samples required in each leaf.
    #[must_use]
    pub fn min_samples_leaf(&self) -> usize {
        self.min_samples_leaf
    }

    /// Train a regression tree on a row-major dataset.
    ///
    /// `features[sample_idx][feature_idx]` is row-major, `targets[sample_idx]`
    /// is the numeric response.
    ///
    /// # Errors
    ///
    /// | Variant                             | When                                            |
    /// |-------------------------------------|-------------------------------------------------|
    /// | [`RfError::EmptyDataset`]           | `features` is empty                             |
    /// | [`RfError::ZeroFeatures`]           | rows have zero feature columns                  |
    /// | [`RfError::FeatureCountMismatch`]   | rows have inconsistent lengths                  |
    /// | [`RfError::TargetCountMismatch`]    | `targets.len() != features.len()`               |
    /// | [`RfError::NonFiniteValue`]         | any feature value is NaN or infinite            |
    /// | [`RfError::NonFiniteTarget`]        | any target is NaN or infinite                   |
    /// | [`RfError::InvalidMaxFeatures`]     | `max_features` resolves outside [1, n_features] |
    /// | [`RfError::InvalidParameter`]       | depth, split or leaf limits out of range        |
    #[instrument(skip(self, features, targets), fields(n_samples = features.len()))]
    pub fn fit(&self, features: &[Vec<f64>], targets: &[f64]) -> Result<DecisionTree, RfError> {
        let n_features = crate::forest::validate_training_data(features, targets)?;
        self.validate()?;

        let max_features = self.max_features.unwrap_or(n_features);
        if max_features == 0 || max_features > n_features {
            return Err(RfError::InvalidMaxFeatures {
                max_features,
                n_features,
            });
        }

        let col_features: Vec<Vec<f64>> = (0..n_features)
            .map(|feat_idx| features.iter().map(|row| row[feat_idx]).collect())
            .collect();
        Ok(self.fit_columns(&col_features, targets, max_features))
    }

    pub(crate) fn validate(&self) -> Result<(), RfError> {
        if let Some(d) = self.max_depth
            && d == 0
        {
            return Err(RfError::parameter("max_depth", 0, "at least 1"));
        }
        if self.min_samples_split < 2 {
            return Err(RfError::parameter(
                "min_samples_split",
                self.min_samples_split,
                "at least 2",
            ));
        }
        if self.min_samples_leaf < 1 {
            return Err(RfError::parameter(
                "min_samples_leaf",
                self.min_samples_leaf,
                "at least 1",
            ));
        }
        Ok(())
    }

    /// Grow a tree on pre-validated column-major data.
    pub(crate) fn fit_columns(
        &self,
        col_features: &[Vec<f64>],
        targets: &[f64],
        max_features: usize,
    ) -> DecisionTree {
        let sample_indices: Vec<usize> = (0..targets.len()).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut arena: Vec<Node> = Vec::new();

        let mut builder = Builder {
            col_features,
            targets,
            config: self,
            max_features,
            rng: &mut rng,
            arena: &mut arena,
        };
        builder.grow(&sample_indices, 0);

        debug!(n_nodes = arena.len(), "regression tree built");

        DecisionTree {
            nodes: arena,
            n_features: col_features.len(),
        }
    }
}

impl Default for DecisionTreeConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Recursion state for growing one tree into an arena.
struct Builder<'a> {
    col_features: &'a [Vec<f64>],
    targets: &'a [f64],
    config: &'a DecisionTreeConfig,
    max_features: usize,
    rng: &'a mut ChaCha8Rng,
    arena: &'a mut Vec<Node>,
}

impl Builder<'_> {
    fn push_leaf(&mut self, value: f64, impurity: Impurity, n_samples: usize) -> NodeIndex {
        let idx = self.arena.len();
        self.arena.push(Node::Leaf {
            value,
            impurity,
            n_samples,
        });
        NodeIndex::new(idx)
    }

    fn grow(&mut self, sample_indices: &[usize], depth: usize) -> NodeIndex {
        let n_samples = sample_indices.len();
        let (sum, sum_sq) = sample_indices.iter().fold((0.0, 0.0), |(s, ss), &i| {
            let y = self.targets[i];
            (s + y, ss + y * y)
        });
        let impurity = Impurity::from_moments(sum, sum_sq, n_samples);
        let mean = if n_samples == 0 {
            0.0
        } else {
            sum / n_samples as f64
        };

        let depth_exceeded = self.config.max_depth.is_some_and(|max_d| depth >= max_d);
        let too_few = n_samples < self.config.min_samples_split
            || n_samples < 2 * self.config.min_samples_leaf;
        if too_few || depth_exceeded || impurity.value() <= f64::EPSILON {
            return self.push_leaf(mean, impurity, n_samples);
        }

        let Some(split) = find_split(
            self.col_features,
            self.targets,
            sample_indices,
            self.config.split_method,
            self.max_features,
            self.config.min_samples_leaf,
            &mut *self.rng,
        ) else {
            return self.push_leaf(mean, impurity, n_samples);
        };

        // Reserve the parent slot so children get higher indices.
        let node_idx = self.push_leaf(mean, impurity, n_samples);
        let left = self.grow(&split.left_indices, depth + 1);
        let right = self.grow(&split.right_indices, depth + 1);

        self.arena[node_idx.index()] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
            impurity,
            n_samples,
            impurity_decrease: split.impurity_decrease,
        };
        node_idx
    }
}

/// A fitted CART regression tree stored as a node arena rooted at index 0.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DecisionTree {
    pub(crate) nodes: Vec<Node>,
    pub(crate) n_features: usize,
}

impl DecisionTree {
    /// Predict the response for a single sample.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::PredictionFeatureMismatch`] when `sample.len() != n_features`.
    pub fn predict(&self, sample: &[f64]) -> Result<f64, RfError> {
        if sample.len() != self.n_features {
            return Err(RfError::PredictionFeatureMismatch {
                expected: self.n_features,
                got: sample.len(),
            });
        }
        Ok(self.leaf_value(sample))
    }

    /// Compute Mean Decrease in Impurity (MDI) feature importances.
    ///
    /// Split decreases are accumulated per feature and normalized to sum to
    /// 1.0. A single-leaf tree yields all zeros.
    #[must_use]
    pub fn feature_importances(&self) -> Vec<f64> {
        let mut totals = vec![0.0f64; self.n_features];
        for node in &self.nodes {
            if let Node::Split {
                feature,
                impurity_decrease,
                ..
            } = node
            {
                totals[feature.index()] += impurity_decrease;
            }
        }
        let sum: f64 = totals.iter().sum();
        if sum > 0.0 {
            totals.iter_mut().for_each(|v| *v /= sum);
        }
        totals
    }

    /// Return the total number of nodes in the tree.
    #[must_use]
    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Return the number of leaf nodes.
    #[must_use]
    pub fn n_leaves(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_leaf()).count()
    }

    /// Return the maximum depth of the tree. A lone root leaf has depth 0.
    #[must_use]
    pub fn depth(&self) -> usize {
        let mut max_depth = 0usize;
        let mut stack = vec![(0usize, 0usize)];
        while let Some((idx, d)) = stack.pop() {
            match &self.nodes[idx] {
                Node::Leaf { .. } => max_depth = max_depth.max(d),
                Node::Split { left, right, .. } => {
                    stack.push((left.index(), d + 1));
                    stack.push((right.index(), d + 1));
                }
            }
        }
        max_depth
    }

    /// Walk from the root to a leaf and return its value.
    pub(crate) fn leaf_value(&self, sample: &[f64]) -> f64 {
        let mut idx = 0usize;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { value, .. } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    idx = if sample[feature.index()] <= *threshold {
                        left.index()
                    } else {
                        right.index()
                    };
                }
            }
        }
    }
}
