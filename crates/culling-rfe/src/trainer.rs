//! Model trainer capability and its random-forest implementation.

use culling_forest::{
    CrossValidation, CrossValidationResult, MaxFeatures, OobMode, RandomForest,
    RandomForestConfig, RegressionMetrics,
};
use culling_io::Dataset;
use tracing::{debug, instrument};

use crate::aggregate::FeatureImportance;
use crate::design::{DesignLayout, encode};
use crate::error::{RfeError, TrainerError};

/// Everything the engine needs from one tuned fit.
#[derive(Debug)]
pub struct FitOutcome<M, P> {
    /// Model refit on the whole table with the selected parameters.
    pub model: M,
    /// Selected hyperparameters.
    pub params: P,
    /// Held-out internal-fold prediction for every row, in table order.
    pub fold_predictions: Vec<f64>,
    /// Zero-based internal fold of every row, in table order.
    pub fold_index: Vec<usize>,
    /// Internal cross-validation performance of the selected parameters.
    pub train_performance: RegressionMetrics,
    /// Importance per design column of the refit model.
    pub importances: Vec<FeatureImportance>,
    /// Out-of-bag performance of the refit model, for trainers that
    /// compute one.
    pub oob: Option<RegressionMetrics>,
}

/// Pluggable "tune, predict, explain" capability used by the engine.
///
/// Implementations receive the typed table and do their own encoding; the
/// importance vector they return is keyed by design column (see
/// [`DesignLayout`](crate::DesignLayout)) and aggregated by the engine.
pub trait ModelTrainer: Sync {
    /// One grid point.
    type Params: Clone + std::fmt::Debug + Send + serde::Serialize;
    /// Fitted model.
    type Model: Send;

    /// Build the hyperparameter grid for `table`.
    fn grid(&self, table: &Dataset) -> Vec<Self::Params>;

    /// Tune over `grid` with `cv_folds`-fold internal cross-validation and
    /// refit the winner. Internal folds depend only on `seed` and the rows.
    ///
    /// # Errors
    ///
    /// Returns [`TrainerError`] if the grid is empty or fitting fails.
    fn fit(
        &self,
        table: &Dataset,
        grid: &[Self::Params],
        cv_folds: usize,
        seed: u64,
    ) -> Result<FitOutcome<Self::Model, Self::Params>, TrainerError>;

    /// Predict every row of `table`.
    ///
    /// # Errors
    ///
    /// Returns [`TrainerError`] if the table does not match the model.
    fn predict(&self, model: &Self::Model, table: &Dataset) -> Result<Vec<f64>, TrainerError>;
}

/// Which importance the forest trainer reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ImportanceKind {
    /// Mean decrease in impurity, normalized to sum 1.
    Impurity,
    /// Mean OOB error increase under permutation.
    Permutation,
}

/// One forest grid point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ForestParams {
    /// Features tried at each split.
    pub mtry: usize,
    /// Minimum samples per leaf.
    pub min_samples_leaf: usize,
}

/// Grid policy for [`ForestTrainer`]: every mtry rule crossed with every
/// leaf size.
///
/// # Defaults
///
/// | Parameter    | Default                              |
/// |--------------|--------------------------------------|
/// | `mtry_rules` | `Sqrt`, `Third`, `Fraction(0.5)`, `All` |
/// | `leaf_sizes` | `[5]`                                |
#[derive(Debug, Clone)]
pub struct ForestGrid {
    mtry_rules: Vec<MaxFeatures>,
    leaf_sizes: Vec<usize>,
}

impl Default for ForestGrid {
    fn default() -> Self {
        Self {
            mtry_rules: vec![
                MaxFeatures::Sqrt,
                MaxFeatures::Third,
                MaxFeatures::Fraction(0.5),
                MaxFeatures::All,
            ],
            leaf_sizes: vec![5],
        }
    }
}

impl ForestGrid {
    /// Create a grid from explicit rules and leaf sizes.
    ///
    /// # Errors
    ///
    /// Returns [`RfeError::InvalidConfiguration`] if either list is empty or
    /// a leaf size is zero.
    pub fn new(mtry_rules: Vec<MaxFeatures>, leaf_sizes: Vec<usize>) -> Result<Self, RfeError> {
        if mtry_rules.is_empty() || leaf_sizes.is_empty() {
            return Err(RfeError::InvalidConfiguration {
                reason: "forest grid needs at least one mtry rule and one leaf size".into(),
            });
        }
        if leaf_sizes.contains(&0) {
            return Err(RfeError::InvalidConfiguration {
                reason: "leaf sizes must be at least 1".into(),
            });
        }
        Ok(Self {
            mtry_rules,
            leaf_sizes,
        })
    }

    /// Return the mtry rules.
    #[must_use]
    pub fn mtry_rules(&self) -> &[MaxFeatures] {
        &self.mtry_rules
    }

    /// Return the leaf sizes.
    #[must_use]
    pub fn leaf_sizes(&self) -> &[usize] {
        &self.leaf_sizes
    }

    /// Resolve the grid for a design matrix with `n_columns` columns.
    ///
    /// mtry counts design columns, so a categorical predictor contributes
    /// one per level. Rules that resolve to the same mtry are merged; rules
    /// that are invalid for this count are skipped.
    #[must_use]
    pub fn candidates(&self, n_columns: usize) -> Vec<ForestParams> {
        let mut mtrys: Vec<usize> = self
            .mtry_rules
            .iter()
            .filter_map(|rule| rule.resolve(n_columns).ok())
            .collect();
        mtrys.sort_unstable();
        mtrys.dedup();

        mtrys
            .iter()
            .flat_map(|&mtry| {
                self.leaf_sizes.iter().map(move |&min_samples_leaf| ForestParams {
                    mtry,
                    min_samples_leaf,
                })
            })
            .collect()
    }
}

/// Random-forest [`ModelTrainer`]: picks the grid point with the lowest
/// internal CV RMSE (first wins on ties) and refits it on the whole table.
#[derive(Debug, Clone)]
pub struct ForestTrainer {
    base: RandomForestConfig,
    grid: ForestGrid,
    importance: ImportanceKind,
}

impl ForestTrainer {
    /// Create a trainer from a base forest config. Its `max_features`,
    /// `min_samples_leaf` and `seed` are overridden per fit. Its split
    /// method applies to every forest; its OOB mode only to the refit, whose
    /// out-of-bag metrics land in [`FitOutcome::oob`].
    #[must_use]
    pub fn new(base: RandomForestConfig) -> Self {
        Self {
            base,
            grid: ForestGrid::default(),
            importance: ImportanceKind::Impurity,
        }
    }

    /// Set the grid policy.
    #[must_use]
    pub fn with_grid(mut self, grid: ForestGrid) -> Self {
        self.grid = grid;
        self
    }

    /// Set the importance kind.
    #[must_use]
    pub fn with_importance(mut self, importance: ImportanceKind) -> Self {
        self.importance = importance;
        self
    }

    /// Return the base forest config.
    #[must_use]
    pub fn base(&self) -> &RandomForestConfig {
        &self.base
    }

    /// Return the importance kind.
    #[must_use]
    pub fn importance(&self) -> ImportanceKind {
        self.importance
    }

    fn config_for(&self, params: ForestParams, seed: u64) -> RandomForestConfig {
        self.base
            .clone()
            .with_max_features(MaxFeatures::Fixed(params.mtry))
            .with_min_samples_leaf(params.min_samples_leaf)
            .with_seed(seed)
    }
}

impl ModelTrainer for ForestTrainer {
    type Params = ForestParams;
    type Model = RandomForest;

    fn grid(&self, table: &Dataset) -> Vec<ForestParams> {
        self.grid
            .candidates(DesignLayout::for_dataset(table).columns().len())
    }

    #[instrument(skip_all, fields(n_rows = table.n_rows(), n_predictors = table.n_predictors(), n_grid = grid.len()))]
    fn fit(
        &self,
        table: &Dataset,
        grid: &[ForestParams],
        cv_folds: usize,
        seed: u64,
    ) -> Result<FitOutcome<RandomForest, ForestParams>, TrainerError> {
        let design = encode(table);
        let names = design.layout.column_names();
        let targets = table.response();
        let cv = CrossValidation::new(cv_folds)?.with_seed(seed);

        let mut best: Option<(ForestParams, CrossValidationResult)> = None;
        for &params in grid {
            let config = self.config_for(params, seed).with_oob_mode(OobMode::Disabled);
            let result = cv.evaluate(&config, &design.rows, targets, &names)?;
            debug!(
                mtry = params.mtry,
                min_samples_leaf = params.min_samples_leaf,
                rmse = result.mean_metrics.rmse,
                "grid point evaluated"
            );
            if best
                .as_ref()
                .is_none_or(|(_, b)| result.mean_metrics.rmse < b.mean_metrics.rmse)
            {
                best = Some((params, result));
            }
        }
        let Some((params, cv_result)) = best else {
            return Err(TrainerError::EmptyGrid);
        };

        let fitted = self.config_for(params, seed).fit(&design.rows, targets, &names)?;
        let oob = fitted.oob_score().map(|score| score.metrics);
        let importances = match self.importance {
            ImportanceKind::Impurity => names
                .iter()
                .zip(fitted.forest().feature_importances())
                .map(|(name, importance)| FeatureImportance {
                    feature: name.clone(),
                    importance,
                })
                .collect(),
            ImportanceKind::Permutation => fitted
                .permutation_importances(&design.rows, targets, seed)
                .into_iter()
                .map(|p| FeatureImportance {
                    feature: p.name,
                    importance: p.importance,
                })
                .collect(),
        };

        Ok(FitOutcome {
            model: fitted.into_forest(),
            params,
            fold_predictions: cv_result.predictions,
            fold_index: cv_result.fold_assignments,
            train_performance: cv_result.mean_metrics,
            importances,
            oob,
        })
    }

    fn predict(&self, model: &RandomForest, table: &Dataset) -> Result<Vec<f64>, TrainerError> {
        Ok(model.predict_batch(&encode(table).rows)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use culling_forest::SplitMethod;
    use culling_io::{Column, Predictor};

    fn table() -> Dataset {
        let n = 84;
        let x: Vec<f64> = (0..n).map(|i| i as f64 / 10.0).collect();
        let noise: Vec<f64> = (0..n).map(|i| ((i * 17) % 13) as f64).collect();
        let codes: Vec<usize> = (0..n).map(|i| i % 3).collect();
        let y: Vec<f64> = x
            .iter()
            .zip(&codes)
            .map(|(&v, &c)| 2.0 * v + 3.0 * c as f64)
            .collect();
        Dataset::new(
            "y".into(),
            y,
            vec![
                Predictor {
                    name: "x".into(),
                    column: Column::Numeric(x),
                },
                Predictor {
                    name: "noise".into(),
                    column: Column::Numeric(noise),
                },
                Predictor {
                    name: "grp".into(),
                    column: Column::Categorical {
                        levels: vec!["a".into(), "b".into(), "c".into()],
                        codes,
                    },
                },
            ],
        )
        .unwrap()
    }

    fn trainer() -> ForestTrainer {
        ForestTrainer::new(RandomForestConfig::new(20).unwrap())
    }

    #[test]
    fn default_grid_dedups_mtry() {
        let grid = ForestGrid::default();
        let mtrys: Vec<usize> = grid.candidates(21).iter().map(|p| p.mtry).collect();
        assert_eq!(mtrys, vec![4, 7, 11, 21]);
        let small: Vec<usize> = grid.candidates(1).iter().map(|p| p.mtry).collect();
        assert_eq!(small, vec![1]);
    }

    #[test]
    fn grid_crosses_leaf_sizes() {
        let grid = ForestGrid::new(vec![MaxFeatures::All], vec![1, 5]).unwrap();
        assert_eq!(grid.candidates(3).len(), 2);
        assert!(ForestGrid::new(vec![], vec![5]).is_err());
        assert!(ForestGrid::new(vec![MaxFeatures::All], vec![0]).is_err());
    }

    #[test]
    fn fit_reports_design_importances() {
        let t = table();
        let tr = trainer();
        let grid = tr.grid(&t);
        let out = tr.fit(&t, &grid, 4, 7).unwrap();

        assert_eq!(out.fold_predictions.len(), t.n_rows());
        assert_eq!(out.fold_index.len(), t.n_rows());
        assert!(out.fold_index.iter().all(|&f| f < 4));
        assert_eq!(out.importances.len(), 5);
        assert_eq!(out.importances[2].feature, "grp=a");
        assert!(grid.contains(&out.params));
        assert!(out.train_performance.r_squared > 0.5);

        let preds = tr.predict(&out.model, &t).unwrap();
        assert_eq!(preds.len(), t.n_rows());
    }

    #[test]
    fn permutation_importance_keyed_by_design_column() {
        let t = table();
        let tr = trainer().with_importance(ImportanceKind::Permutation);
        let grid = vec![ForestParams {
            mtry: 3,
            min_samples_leaf: 3,
        }];
        let out = tr.fit(&t, &grid, 3, 1).unwrap();
        let mut names: Vec<&str> = out.importances.iter().map(|f| f.feature.as_str()).collect();
        names.sort_unstable();
        assert_eq!(names, vec!["grp=a", "grp=b", "grp=c", "noise", "x"]);
    }

    #[test]
    fn fold_index_depends_only_on_seed_and_rows() {
        let t = table();
        let tr = trainer();
        let grid = vec![ForestParams {
            mtry: 2,
            min_samples_leaf: 5,
        }];
        let a = tr.fit(&t, &grid, 3, 9).unwrap();
        let reduced = t.select_predictors(&["x"]).unwrap();
        let b = tr.fit(&reduced, &grid, 3, 9).unwrap();
        assert_eq!(a.fold_index, b.fold_index);
    }

    #[test]
    fn grid_counts_categorical_levels() {
        // x, noise and a three-level factor: five design columns.
        let t = table();
        let tr = trainer().with_grid(ForestGrid::new(vec![MaxFeatures::All], vec![5]).unwrap());
        let mtrys: Vec<usize> = tr.grid(&t).iter().map(|p| p.mtry).collect();
        assert_eq!(mtrys, vec![5]);

        let numeric = t.select_predictors(&["x", "noise"]).unwrap();
        assert_eq!(tr.grid(&numeric)[0].mtry, 2);
    }

    #[test]
    fn oob_metrics_follow_base_config() {
        let t = table();
        let grid = vec![ForestParams {
            mtry: 3,
            min_samples_leaf: 3,
        }];
        let plain = trainer().fit(&t, &grid, 3, 2).unwrap();
        assert!(plain.oob.is_none());

        let base = RandomForestConfig::new(20).unwrap().with_oob_mode(OobMode::Enabled);
        let out = ForestTrainer::new(base).fit(&t, &grid, 3, 2).unwrap();
        let oob = out.oob.unwrap();
        assert!(oob.r_squared > 0.5, "oob r2 = {}", oob.r_squared);
    }

    #[test]
    fn extra_trees_split_method_is_honoured() {
        let t = table();
        let grid = vec![ForestParams {
            mtry: 5,
            min_samples_leaf: 3,
        }];
        let exact = trainer().fit(&t, &grid, 3, 4).unwrap();
        let base = RandomForestConfig::new(20)
            .unwrap()
            .with_split_method(SplitMethod::ExtraTrees);
        let extra = ForestTrainer::new(base).fit(&t, &grid, 3, 4).unwrap();

        assert!(extra.train_performance.r_squared > 0.5);
        assert_ne!(extra.fold_predictions, exact.fold_predictions);
    }

    #[test]
    fn empty_grid_rejected() {
        let err = trainer().fit(&table(), &[], 3, 1).unwrap_err();
        assert!(matches!(err, TrainerError::EmptyGrid));
    }
}
