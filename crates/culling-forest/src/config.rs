//! Forest-level configuration: ensemble size, bagging and per-split feature
//! sampling. Growth limits of the individual trees live in the embedded
//! [`DecisionTreeConfig`].

use crate::error::RfError;
use crate::result::RandomForestResult;
use crate::split::SplitMethod;
use crate::tree::DecisionTreeConfig;

/// Rule for how many columns each split may look at (`mtry`).
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum MaxFeatures {
    /// `floor(sqrt(p))`.
    Sqrt,
    /// `floor(p / 3)`, the usual regression default.
    Third,
    /// `ceil(p * f)` for `f` in (0, 1].
    Fraction(f64),
    /// A fixed count, clamped to `p`.
    Fixed(usize),
    /// Every column.
    All,
}

impl MaxFeatures {
    /// Resolve to a concrete feature count for `n_features` columns.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::InvalidMaxFeatures`] if the count falls outside
    /// `[1, n_features]`.
    pub fn resolve(self, n_features: usize) -> Result<usize, RfError> {
        crate::forest::resolve_max_features(self, n_features)
    }
}

/// Whether training also scores every row on the trees that did not see it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OobMode {
    /// Compute out-of-bag RMSE, MAE and R².
    Enabled,
    /// Skip it.
    Disabled,
}

/// Random-forest regressor settings.
///
/// # Defaults
///
/// | Parameter            | Default                        |
/// |----------------------|--------------------------------|
/// | `max_features`       | `Third`                        |
/// | `tree`               | [`DecisionTreeConfig::new`]    |
/// | `seed`               | 42                             |
/// | `oob_mode`           | `Disabled`                     |
/// | `bootstrap_fraction` | 1.0                            |
///
/// The tree-level shortcuts (`with_min_samples_leaf` and friends) edit the
/// embedded tree config in place.
#[derive(Debug, Clone)]
pub struct RandomForestConfig {
    pub(crate) n_trees: usize,
    pub(crate) max_features: MaxFeatures,
    pub(crate) tree: DecisionTreeConfig,
    pub(crate) seed: u64,
    pub(crate) oob_mode: OobMode,
    pub(crate) bootstrap_fraction: f64,
}

impl RandomForestConfig {
    /// Start a config for an ensemble of `n_trees` trees.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::InvalidParameter`] if `n_trees` is zero.
    pub fn new(n_trees: usize) -> Result<Self, RfError> {
        if n_trees == 0 {
            return Err(RfError::parameter("n_trees", n_trees, "at least 1"));
        }
        Ok(Self {
            n_trees,
            max_features: MaxFeatures::Third,
            tree: DecisionTreeConfig::new(),
            seed: 42,
            oob_mode: OobMode::Disabled,
            bootstrap_fraction: 1.0,
        })
    }

    #[must_use]
    pub fn with_max_features(mut self, max_features: MaxFeatures) -> Self {
        self.max_features = max_features;
        self
    }

    /// Replace the growth limits of every tree. The tree's own
    /// `max_features` and seed are ignored; the forest sets both per tree.
    #[must_use]
    pub fn with_tree(mut self, tree: DecisionTreeConfig) -> Self {
        self.tree = tree;
        self
    }

    #[must_use]
    pub fn with_max_depth(mut self, max_depth: Option<usize>) -> Self {
        self.tree = self.tree.with_max_depth(max_depth);
        self
    }

    #[must_use]
    pub fn with_min_samples_split(mut self, min_samples_split: usize) -> Self {
        self.tree = self.tree.with_min_samples_split(min_samples_split);
        self
    }

    /// Node size: a split must leave at least this many rows on each side.
    #[must_use]
    pub fn with_min_samples_leaf(mut self, min_samples_leaf: usize) -> Self {
        self.tree = self.tree.with_min_samples_leaf(min_samples_leaf);
        self
    }

    #[must_use]
    pub fn with_split_method(mut self, split_method: SplitMethod) -> Self {
        self.tree = self.tree.with_split_method(split_method);
        self
    }

    /// Master seed; every tree draws its own seed from it.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    #[must_use]
    pub fn with_oob_mode(mut self, oob_mode: OobMode) -> Self {
        self.oob_mode = oob_mode;
        self
    }

    /// Share of rows drawn (with replacement) for each tree.
    #[must_use]
    pub fn with_bootstrap_fraction(mut self, bootstrap_fraction: f64) -> Self {
        self.bootstrap_fraction = bootstrap_fraction;
        self
    }

    #[must_use]
    pub fn n_trees(&self) -> usize {
        self.n_trees
    }

    #[must_use]
    pub fn max_features(&self) -> MaxFeatures {
        self.max_features
    }

    /// Growth limits shared by every tree.
    #[must_use]
    pub fn tree(&self) -> &DecisionTreeConfig {
        &self.tree
    }

    #[must_use]
    pub fn min_samples_leaf(&self) -> usize {
        self.tree.min_samples_leaf()
    }

    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    #[must_use]
    pub fn oob_mode(&self) -> OobMode {
        self.oob_mode
    }

    #[must_use]
    pub fn bootstrap_fraction(&self) -> f64 {
        self.bootstrap_fraction
    }

    /// Grow the forest on row-major `features` (`features[row][column]`)
    /// against the numeric response `targets`; `feature_names` labels the
    /// columns.
    ///
    /// # Errors
    ///
    /// | Variant | When |
    /// |---|---|
    /// | [`RfError::EmptyDataset`] / [`RfError::ZeroFeatures`] | no rows or no columns |
    /// | [`RfError::FeatureCountMismatch`] | ragged rows |
    /// | [`RfError::TargetCountMismatch`] | one response per row is required |
    /// | [`RfError::NonFiniteValue`] / [`RfError::NonFiniteTarget`] | NaN or infinite input |
    /// | [`RfError::InvalidMaxFeatures`] | `mtry` resolves outside `[1, p]` |
    /// | [`RfError::InvalidParameter`] | bad bootstrap fraction or tree limits |
    /// | [`RfError::OobEvaluationFailed`] | OOB requested but every row was always in-bag |
    pub fn fit(
        &self,
        features: &[Vec<f64>],
        targets: &[f64],
        feature_names: &[String],
    ) -> Result<RandomForestResult, RfError> {
        crate::forest::train(self, features, targets, feature_names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tree_shortcuts_edit_embedded_config() {
        let config = RandomForestConfig::new(10)
            .unwrap()
            .with_min_samples_leaf(3)
            .with_max_depth(Some(4));
        assert_eq!(config.min_samples_leaf(), 3);
        assert_eq!(config.tree().max_depth(), Some(4));
        assert_eq!(config.max_features(), MaxFeatures::Third);
    }

    #[test]
    fn zero_trees_rejected() {
        assert!(matches!(
            RandomForestConfig::new(0),
            Err(RfError::InvalidParameter { name: "n_trees", .. })
        ));
    }

    #[test]
    fn resolve_rules() {
        assert_eq!(MaxFeatures::Third.resolve(21).unwrap(), 7);
        assert_eq!(MaxFeatures::Sqrt.resolve(21).unwrap(), 4);
        assert_eq!(MaxFeatures::All.resolve(21).unwrap(), 21);
    }
}
