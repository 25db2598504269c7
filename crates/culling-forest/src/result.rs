//! Fitted forest plus the by-products of growing it.

use crate::forest::RandomForest;
use crate::importance::RankedFeature;
use crate::oob::OobScore;
use crate::perm_importance::{PermutationImportance, compute_permutation_importance};

/// Output of [`RandomForestConfig::fit`](crate::RandomForestConfig::fit).
///
/// Besides the model it keeps each tree's out-of-bag rows, which permutation
/// importance needs later.
#[derive(Debug)]
pub struct RandomForestResult {
    forest: RandomForest,
    importances: Vec<RankedFeature>,
    oob_score: Option<OobScore>,
    out_of_bag: Vec<Vec<usize>>,
    n_samples: usize,
    mtry: usize,
}

impl RandomForestResult {
    pub(crate) fn new(
        forest: RandomForest,
        importances: Vec<RankedFeature>,
        oob_score: Option<OobScore>,
        out_of_bag: Vec<Vec<usize>>,
        n_samples: usize,
        mtry: usize,
    ) -> Self {
        Self {
            forest,
            importances,
            oob_score,
            out_of_bag,
            n_samples,
            mtry,
        }
    }

    #[must_use]
    pub fn forest(&self) -> &RandomForest {
        &self.forest
    }

    #[must_use]
    pub fn into_forest(self) -> RandomForest {
        self.forest
    }

    /// Normalised impurity-decrease importances, largest first.
    #[must_use]
    pub fn importances(&self) -> &[RankedFeature] {
        &self.importances
    }

    /// Out-of-bag metrics; `None` unless [`OobMode::Enabled`](crate::OobMode).
    #[must_use]
    pub fn oob_score(&self) -> Option<&OobScore> {
        self.oob_score.as_ref()
    }

    /// Rows each tree did not draw, indexed like the training rows.
    #[must_use]
    pub fn out_of_bag_rows(&self) -> &[Vec<usize>] {
        &self.out_of_bag
    }

    /// Number of training rows.
    #[must_use]
    pub fn n_samples(&self) -> usize {
        self.n_samples
    }

    /// Columns examined per split after resolving `max_features`.
    #[must_use]
    pub fn mtry(&self) -> usize {
        self.mtry
    }

    /// Increase in out-of-bag MSE when each column is shuffled.
    ///
    /// `features` and `targets` must be the training rows, in training order.
    #[must_use]
    pub fn permutation_importances(
        &self,
        features: &[Vec<f64>],
        targets: &[f64],
        seed: u64,
    ) -> Vec<PermutationImportance> {
        compute_permutation_importance(&self.forest, features, targets, &self.out_of_bag, seed)
    }
}
