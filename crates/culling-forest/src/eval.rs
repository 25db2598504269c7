//! Stratified k-fold cross-validation for Random Forest regression.

use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, instrument};

use crate::config::RandomForestConfig;
use crate::error::RfError;
use crate::metrics::RegressionMetrics;

/// Cross-validation configuration.
///
/// Construct via [`CrossValidation::new`], then chain `with_*` methods.
///
/// # Defaults
///
/// | Parameter  | Default |
/// |------------|---------|
/// | `seed`     | 42      |
/// | `n_strata` | 5       |
#[derive(Debug, Clone)]
pub struct CrossValidation {
    n_folds: usize,
    seed: u64,
    n_strata: usize,
}

/// Results of stratified k-fold cross-validation.
#[derive(Debug)]
pub struct CrossValidationResult {
    /// Held-out metrics for each fold.
    pub fold_metrics: Vec<RegressionMetrics>,
    /// Field-wise mean of `fold_metrics`.
    pub mean_metrics: RegressionMetrics,
    /// Out-of-fold prediction for every sample, in input order.
    pub predictions: Vec<f64>,
    /// Zero-based fold of every sample, in input order.
    pub fold_assignments: Vec<usize>,
    /// Number of folds.
    pub n_folds: usize,
    /// Total number of samples.
    pub n_samples: usize,
    /// Number of features.
    pub n_features: usize,
}

/// Assign each value to a quantile bin.
///
/// Breaks are the type-7 quantiles at `0, 1/(n_points-1), …, 1`,
/// de-duplicated, so there are at most `n_points - 1` bins. Bins are closed
/// on the right and the first bin also includes the minimum. Constant input
/// (or `n_points < 2`) puts everything in bin 0.
#[must_use]
pub fn quantile_strata(values: &[f64], n_points: usize) -> Vec<usize> {
    if values.is_empty() {
        return Vec::new();
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable_by(f64::total_cmp);

    let mut breaks: Vec<f64> = Vec::with_capacity(n_points);
    if n_points >= 2 {
        for i in 0..n_points {
            let q = quantile_sorted(&sorted, i as f64 / (n_points - 1) as f64);
            if breaks.last().is_none_or(|&b| q > b) {
                breaks.push(q);
            }
        }
    }
    if breaks.len() < 2 {
        return vec![0; values.len()];
    }

    let upper = &breaks[1..];
    values
        .iter()
        .map(|&v| {
            upper
                .iter()
                .position(|&b| v <= b)
                .unwrap_or(upper.len() - 1)
        })
        .collect()
}

/// Linear-interpolated quantile of an ascending slice.
fn quantile_sorted(sorted: &[f64], prob: f64) -> f64 {
    let h = (sorted.len() - 1) as f64 * prob;
    let lo = h.floor() as usize;
    let hi = h.ceil() as usize;
    let frac = h - lo as f64;
    sorted[lo] + frac * (sorted[hi] - sorted[lo])
}

impl CrossValidation {
    /// Create a new cross-validation config with the given number of folds.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::InvalidParameter`] if `n_folds` < 2.
    pub fn new(n_folds: usize) -> Result<Self, RfError> {
        if n_folds < 2 {
            return Err(RfError::parameter("n_folds", n_folds, "at least 2"));
        }
        Ok(Self {
            n_folds,
            seed: 42,
            n_strata: 5,
        })
    }

    /// Set the random seed for fold shuffling.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the maximum number of response quantile points used to stratify.
    #[must_use]
    pub fn with_strata(mut self, n_strata: usize) -> Self {
        self.n_strata = n_strata;
        self
    }

    /// Return the number of folds.
    #[must_use]
    pub fn n_folds(&self) -> usize {
        self.n_folds
    }

    /// Return the fold-shuffling seed.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Assign every sample to a fold, stratified by response quantiles.
    ///
    /// The number of quantile points is `n_samples / n_folds` clamped to
    /// `[2, n_strata]`. Samples are shuffled within each stratum and dealt
    /// round-robin, with the dealing position carried from one stratum to
    /// the next so fold sizes differ by at most one.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::TooFewSamplesForFolds`] if there are fewer samples
    /// than folds.
    pub fn assign_folds(&self, targets: &[f64]) -> Result<Vec<usize>, RfError> {
        let n_samples = targets.len();
        if n_samples < self.n_folds {
            return Err(RfError::TooFewSamplesForFolds {
                n_samples,
                n_folds: self.n_folds,
            });
        }

        let n_points = (n_samples / self.n_folds).clamp(2, self.n_strata.max(2));
        let strata = quantile_strata(targets, n_points);
        let n_bins = strata.iter().max().map_or(0, |&m| m + 1);

        let mut members: Vec<Vec<usize>> = vec![Vec::new(); n_bins];
        for (i, &s) in strata.iter().enumerate() {
            members[s].push(i);
        }

        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut assignments = vec![0usize; n_samples];
        let mut next = 0usize;
        for stratum in &mut members {
            stratum.shuffle(&mut rng);
            for &idx in stratum.iter() {
                assignments[idx] = next % self.n_folds;
                next += 1;
            }
        }
        Ok(assignments)
    }

    /// Run stratified k-fold cross-validation.
    ///
    /// Each fold trains a forest on the other folds, seeded with
    /// `config.seed + fold`, and predicts the held-out fold.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`RfError::EmptyDataset`] | Zero samples |
    /// | [`RfError::TargetCountMismatch`] | `targets` and `features` differ in length |
    /// | [`RfError::TooFewSamplesForFolds`] | Fewer samples than folds |
    /// | Other RF errors | From underlying training |
    #[instrument(skip_all, fields(n_folds = self.n_folds, n_samples = features.len()))]
    pub fn evaluate(
        &self,
        config: &RandomForestConfig,
        features: &[Vec<f64>],
        targets: &[f64],
        feature_names: &[String],
    ) -> Result<CrossValidationResult, RfError> {
        let n_features = crate::forest::validate_training_data(features, targets)?;
        let n_samples = features.len();
        let fold_assignments = self.assign_folds(targets)?;

        let mut fold_metrics = Vec::with_capacity(self.n_folds);
        let mut predictions = vec![0.0f64; n_samples];

        for fold in 0..self.n_folds {
            let (test_idx, train_idx): (Vec<usize>, Vec<usize>) =
                (0..n_samples).partition(|&i| fold_assignments[i] == fold);

            let train_features: Vec<Vec<f64>> =
                train_idx.iter().map(|&i| features[i].clone()).collect();
            let train_targets: Vec<f64> = train_idx.iter().map(|&i| targets[i]).collect();
            let test_features: Vec<Vec<f64>> =
                test_idx.iter().map(|&i| features[i].clone()).collect();
            let test_targets: Vec<f64> = test_idx.iter().map(|&i| targets[i]).collect();

            let fold_config = config.clone().with_seed(config.seed.wrapping_add(fold as u64));
            let result = fold_config.fit(&train_features, &train_targets, feature_names)?;
            let fold_predictions = result.forest().predict_batch(&test_features)?;

            let metrics = RegressionMetrics::compute(&test_targets, &fold_predictions)?;
            debug!(fold, rmse = metrics.rmse, r_squared = metrics.r_squared, "fold completed");
            fold_metrics.push(metrics);

            for (&i, &p) in test_idx.iter().zip(&fold_predictions) {
                predictions[i] = p;
            }
        }

        let mean_metrics = RegressionMetrics::mean(&fold_metrics).ok_or(RfError::EmptyDataset)?;

        debug!(
            rmse = mean_metrics.rmse,
            r_squared = mean_metrics.r_squared,
            "cross-validation complete"
        );

        Ok(CrossValidationResult {
            fold_metrics,
            mean_metrics,
            predictions,
            fold_assignments,
            n_folds: self.n_folds,
            n_samples,
            n_features,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MaxFeatures;

    fn make_data() -> (Vec<Vec<f64>>, Vec<f64>, Vec<String>) {
        let features: Vec<Vec<f64>> = (0..90)
            .map(|i| vec![i as f64 * 0.1, ((i * 13) % 7) as f64])
            .collect();
        let targets: Vec<f64> = features.iter().map(|r| 2.0 * r[0] + 1.0).collect();
        let names = vec!["x".to_string(), "noise".to_string()];
        (features, targets, names)
    }

    #[test]
    fn quantile_strata_bins() {
        let values: Vec<f64> = (1..=10).map(f64::from).collect();
        let strata = quantile_strata(&values, 5);
        // breaks 1, 3.25, 5.5, 7.75, 10
        assert_eq!(strata, vec![0, 0, 0, 1, 1, 2, 2, 3, 3, 3]);
    }

    #[test]
    fn quantile_strata_constant_is_single_bin() {
        assert_eq!(quantile_strata(&[2.0, 2.0, 2.0], 5), vec![0, 0, 0]);
        assert!(quantile_strata(&[], 5).is_empty());
    }

    #[test]
    fn folds_are_balanced_and_deterministic() {
        let (_, targets, _) = make_data();
        let cv = CrossValidation::new(7).unwrap().with_seed(3);
        let folds = cv.assign_folds(&targets).unwrap();
        let mut sizes = vec![0usize; 7];
        for &f in &folds {
            sizes[f] += 1;
        }
        let (min, max) = (sizes.iter().min().unwrap(), sizes.iter().max().unwrap());
        assert!(max - min <= 1, "sizes = {sizes:?}");
        assert_eq!(folds, cv.assign_folds(&targets).unwrap());
    }

    #[test]
    fn linear_signal_cross_validates() {
        let (features, targets, names) = make_data();
        let rf_config = RandomForestConfig::new(30)
            .unwrap()
            .with_max_features(MaxFeatures::All)
            .with_min_samples_leaf(2);
        let cv = CrossValidation::new(5).unwrap();
        let result = cv.evaluate(&rf_config, &features, &targets, &names).unwrap();

        assert_eq!(result.fold_metrics.len(), 5);
        assert_eq!(result.predictions.len(), 90);
        assert_eq!(result.fold_assignments.len(), 90);
        assert!(
            result.mean_metrics.r_squared > 0.8,
            "r2 = {}",
            result.mean_metrics.r_squared
        );
    }

    #[test]
    fn out_of_fold_predictions_come_from_fold_forests() {
        let (features, targets, names) = make_data();
        let rf_config = RandomForestConfig::new(8).unwrap().with_seed(11);
        let cv = CrossValidation::new(3).unwrap().with_seed(5);
        let result = cv.evaluate(&rf_config, &features, &targets, &names).unwrap();

        // Refit fold 1 by hand: train on the other folds with seed + 1.
        let fold = 1;
        let (test_idx, train_idx): (Vec<usize>, Vec<usize>) =
            (0..features.len()).partition(|&i| result.fold_assignments[i] == fold);
        let train_x: Vec<Vec<f64>> = train_idx.iter().map(|&i| features[i].clone()).collect();
        let train_y: Vec<f64> = train_idx.iter().map(|&i| targets[i]).collect();
        let test_x: Vec<Vec<f64>> = test_idx.iter().map(|&i| features[i].clone()).collect();
        let forest = rf_config
            .clone()
            .with_seed(12)
            .fit(&train_x, &train_y, &names)
            .unwrap()
            .into_forest();
        let expected = forest.predict_batch(&test_x).unwrap();
        let observed: Vec<f64> = test_idx.iter().map(|&i| result.predictions[i]).collect();
        assert_eq!(observed, expected);
    }

    #[test]
    fn invalid_fold_count() {
        assert!(CrossValidation::new(0).is_err());
        assert!(CrossValidation::new(1).is_err());
    }

    #[test]
    fn too_few_samples_for_folds() {
        let cv = CrossValidation::new(5).unwrap();
        let err = cv.assign_folds(&[1.0, 2.0, 3.0]).unwrap_err();
        assert!(matches!(
            err,
            RfError::TooFewSamplesForFolds {
                n_samples: 3,
                n_folds: 5
            }
        ));
    }
}
