//! Random Forest training with parallel tree construction.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use tracing::{debug, instrument};

use crate::config::{MaxFeatures, OobMode, RandomForestConfig};
use crate::error::RfError;
use crate::importance::aggregate_importances;
use crate::oob::compute_oob;
use crate::result::RandomForestResult;
use crate::tree::DecisionTree;

/// A fitted Random Forest regressor.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RandomForest {
    pub(crate) trees: Vec<DecisionTree>,
    pub(crate) n_features: usize,
    pub(crate) feature_names: Vec<String>,
}

/// Resolve `MaxFeatures` to a concrete count.
pub(crate) fn resolve_max_features(
    max_features: MaxFeatures,
    n_features: usize,
) -> Result<usize, RfError> {
    let resolved = match max_features {
        MaxFeatures::Sqrt => (n_features as f64).sqrt().floor().max(1.0) as usize,
        MaxFeatures::Third => (n_features / 3).max(1),
        MaxFeatures::Fraction(f) => (n_features as f64 * f).ceil() as usize,
        MaxFeatures::Fixed(n) => n.min(n_features),
        MaxFeatures::All => n_features,
    };
    if resolved == 0 || resolved > n_features {
        return Err(RfError::InvalidMaxFeatures {
            max_features: resolved,
            n_features,
        });
    }
    Ok(resolved)
}

/// Check shape and finiteness of a training set; returns the feature count.
pub(crate) fn validate_training_data(
    features: &[Vec<f64>],
    targets: &[f64],
) -> Result<usize, RfError> {
    let Some(first) = features.first() else {
        return Err(RfError::EmptyDataset);
    };
    let n_features = first.len();
    if n_features == 0 {
        return Err(RfError::ZeroFeatures);
    }
    if targets.len() != features.len() {
        return Err(RfError::TargetCountMismatch {
            n_samples: features.len(),
            n_targets: targets.len(),
        });
    }
    for (sample_index, row) in features.iter().enumerate() {
        if row.len() != n_features {
            return Err(RfError::FeatureCountMismatch {
                expected: n_features,
                got: row.len(),
                sample_index,
            });
        }
        if let Some(feature_index) = row.iter().position(|v| !v.is_finite()) {
            return Err(RfError::NonFiniteValue {
                sample_index,
                feature_index,
            });
        }
    }
    if let Some(sample_index) = targets.iter().position(|v| !v.is_finite()) {
        return Err(RfError::NonFiniteTarget { sample_index });
    }
    Ok(n_features)
}

/// Draw a bootstrap sample and return `(in-bag indices, out-of-bag indices)`.
fn bootstrap_sample(
    n_samples: usize,
    draw_count: usize,
    rng: &mut impl Rng,
) -> (Vec<usize>, Vec<usize>) {
    let mut in_bag = vec![false; n_samples];
    let mut bootstrap_indices = Vec::with_capacity(draw_count);
    for _ in 0..draw_count {
        let idx = rng.gen_range(0..n_samples);
        bootstrap_indices.push(idx);
        in_bag[idx] = true;
    }
    let oob_indices: Vec<usize> = (0..n_samples).filter(|&i| !in_bag[i]).collect();
    (bootstrap_indices, oob_indices)
}

/// Train the Random Forest ensemble.
#[instrument(skip_all, fields(n_trees = config.n_trees, n_samples = features.len()))]
pub(crate) fn train(
    config: &RandomForestConfig,
    features: &[Vec<f64>],
    targets: &[f64],
    feature_names: &[String],
) -> Result<RandomForestResult, RfError> {
    let n_features = validate_training_data(features, targets)?;
    let n_samples = features.len();

    let max_features_resolved = resolve_max_features(config.max_features, n_features)?;
    if config.bootstrap_fraction <= 0.0 || config.bootstrap_fraction > 1.0 {
        return Err(RfError::parameter(
            "bootstrap_fraction",
            config.bootstrap_fraction,
            "a value in (0, 1]",
        ));
    }
    let draw_count = ((n_samples as f64) * config.bootstrap_fraction).ceil() as usize;

    let tree_template = config
        .tree
        .clone()
        .with_max_features(Some(max_features_resolved));
    tree_template.validate()?;

    debug!(
        n_trees = config.n_trees,
        n_samples,
        n_features,
        max_features = max_features_resolved,
        draw_count,
        "training random forest"
    );

    let col_features: Vec<Vec<f64>> = (0..n_features)
        .map(|f| features.iter().map(|row| row[f]).collect())
        .collect();

    let mut master_rng = ChaCha8Rng::seed_from_u64(config.seed);
    let tree_seeds: Vec<u64> = (0..config.n_trees).map(|_| master_rng.r#gen()).collect();

    let tree_results: Vec<(DecisionTree, Vec<usize>)> = tree_seeds
        .into_par_iter()
        .map(|seed| {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let (bootstrap_indices, oob_indices) =
                bootstrap_sample(n_samples, draw_count, &mut rng);

            let boot_columns: Vec<Vec<f64>> = col_features
                .iter()
                .map(|col| bootstrap_indices.iter().map(|&i| col[i]).collect())
                .collect();
            let boot_targets: Vec<f64> = bootstrap_indices.iter().map(|&i| targets[i]).collect();

            let tree = tree_template
                .clone()
                .with_seed(rng.r#gen())
                .fit_columns(&boot_columns, &boot_targets, max_features_resolved);
            (tree, oob_indices)
        })
        .collect();

    let (trees, oob_indices_per_tree): (Vec<DecisionTree>, Vec<Vec<usize>>) =
        tree_results.into_iter().unzip();

    let per_tree_importances: Vec<Vec<f64>> =
        trees.iter().map(|t| t.feature_importances()).collect();
    let importances = aggregate_importances(&per_tree_importances, feature_names);

    let oob_score = if config.oob_mode == OobMode::Enabled {
        Some(compute_oob(&trees, features, targets, &oob_indices_per_tree)?)
    } else {
        None
    };

    let forest = RandomForest {
        trees,
        n_features,
        feature_names: feature_names.to_vec(),
    };

    debug!(
        n_trees = config.n_trees,
        oob_rmse = oob_score.as_ref().map(|s| s.metrics.rmse),
        "random forest training complete"
    );

    Ok(RandomForestResult::new(
        forest,
        importances,
        oob_score,
        oob_indices_per_tree,
        n_samples,
        max_features_resolved,
    ))
}

#[cfg(test)]
mod tests {
    use crate::config::{MaxFeatures, OobMode, RandomForestConfig};
    use crate::forest::resolve_max_features;
    use crate::metrics::RegressionMetrics;
    use crate::split::SplitMethod;

    /// `y = 3·x0 + noise-free step on x1`, x2 is irrelevant.
    fn make_regression_data() -> (Vec<Vec<f64>>, Vec<f64>, Vec<String>) {
        let mut features = Vec::new();
        let mut targets = Vec::new();
        for i in 0..120 {
            let x0 = (i % 30) as f64 / 10.0;
            let x1 = if i % 2 == 0 { 0.0 } else { 1.0 };
            let x2 = ((i * 7) % 11) as f64;
            features.push(vec![x0, x1, x2]);
            targets.push(3.0 * x0 + 4.0 * x1);
        }
        let names = vec!["x0".to_string(), "x1".to_string(), "x2".to_string()];
        (features, targets, names)
    }

    #[test]
    fn fits_training_data_closely() {
        let (features, targets, names) = make_regression_data();
        let result = RandomForestConfig::new(50)
            .unwrap()
            .with_max_features(MaxFeatures::All)
            .with_min_samples_leaf(1)
            .fit(&features, &targets, &names)
            .unwrap();

        let predictions = result.forest().predict_batch(&features).unwrap();
        let m = RegressionMetrics::compute(&targets, &predictions).unwrap();
        assert!(m.r_squared > 0.95, "r2 = {}", m.r_squared);
    }

    #[test]
    fn oob_score_computed() {
        let (features, targets, names) = make_regression_data();
        let result = RandomForestConfig::new(50)
            .unwrap()
            .with_max_features(MaxFeatures::All)
            .with_oob_mode(OobMode::Enabled)
            .fit(&features, &targets, &names)
            .unwrap();

        let oob = result.oob_score().expect("OOB should be computed");
        assert!(oob.metrics.r_squared > 0.7, "oob r2 = {}", oob.metrics.r_squared);
        assert!(oob.n_oob_samples > 0);
    }

    #[test]
    fn importances_sum_to_one_and_skip_noise() {
        let (features, targets, names) = make_regression_data();
        let result = RandomForestConfig::new(30)
            .unwrap()
            .with_max_features(MaxFeatures::All)
            .fit(&features, &targets, &names)
            .unwrap();

        let total: f64 = result.importances().iter().map(|f| f.importance).sum();
        assert!((total - 1.0).abs() < 1e-10, "total = {total}");
        assert_ne!(result.importances()[0].name, "x2");
    }

    #[test]
    fn deterministic_with_same_seed() {
        let (features, targets, names) = make_regression_data();
        let fit = || {
            RandomForestConfig::new(10)
                .unwrap()
                .with_seed(99)
                .fit(&features, &targets, &names)
                .unwrap()
        };
        let preds1 = fit().forest().predict_batch(&features).unwrap();
        let preds2 = fit().forest().predict_batch(&features).unwrap();
        assert_eq!(preds1, preds2);
    }

    #[test]
    fn extra_trees_fits() {
        let (features, targets, names) = make_regression_data();
        let result = RandomForestConfig::new(50)
            .unwrap()
            .with_max_features(MaxFeatures::All)
            .with_split_method(SplitMethod::ExtraTrees)
            .with_min_samples_leaf(1)
            .fit(&features, &targets, &names)
            .unwrap();
        let predictions = result.forest().predict_batch(&features).unwrap();
        let m = RegressionMetrics::compute(&targets, &predictions).unwrap();
        assert!(m.r_squared > 0.9, "extra-trees r2 = {}", m.r_squared);
    }

    #[test]
    fn max_features_resolution() {
        assert_eq!(resolve_max_features(MaxFeatures::Third, 21).unwrap(), 7);
        assert_eq!(resolve_max_features(MaxFeatures::Third, 2).unwrap(), 1);
        assert_eq!(resolve_max_features(MaxFeatures::Sqrt, 17).unwrap(), 4);
        assert_eq!(resolve_max_features(MaxFeatures::Fixed(40), 5).unwrap(), 5);
        assert!(resolve_max_features(MaxFeatures::Fixed(0), 5).is_err());
    }

    #[test]
    fn invalid_inputs_rejected() {
        assert!(RandomForestConfig::new(0).is_err());
        let config = RandomForestConfig::new(10).unwrap();
        assert!(matches!(
            config.fit(&[], &[], &[]).unwrap_err(),
            crate::RfError::EmptyDataset
        ));
        let bad = config.clone().with_bootstrap_fraction(0.0);
        let (features, targets, names) = make_regression_data();
        assert!(matches!(
            bad.fit(&features, &targets, &names).unwrap_err(),
            crate::RfError::InvalidParameter {
                name: "bootstrap_fraction",
                ..
            }
        ));
    }
}
