//! Prediction methods for the Random Forest ensemble.

use rayon::iter::{IntoParallelIterator, ParallelIterator};

use crate::error::RfError;
use crate::forest::RandomForest;
use crate::importance::mean_importances;

impl RandomForest {
    /// Predict the response for a single sample as the mean over all trees.
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
        let total: f64 = self.trees.iter().map(|t| t.leaf_value(sample)).sum();
        Ok(total / self.trees.len() as f64)
    }

    /// Predict a batch of samples in parallel.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::PredictionFeatureMismatch`] if any sample has the wrong feature count.
    pub fn predict_batch(&self, features: &[Vec<f64>]) -> Result<Vec<f64>, RfError> {
        features
            .into_par_iter()
            .map(|sample| self.predict(sample))
            .collect()
    }

    /// Return MDI importances in column order, normalized to sum to 1.0.
    #[must_use]
    pub fn feature_importances(&self) -> Vec<f64> {
        let per_tree: Vec<Vec<f64>> = self.trees.iter().map(|t| t.feature_importances()).collect();
        mean_importances(&per_tree, self.n_features)
    }

    /// Return the number of features this forest was trained on.
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Return the number of trees in the ensemble.
    #[must_use]
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Return the feature names.
    #[must_use]
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }
}

#[cfg(test)]
mod tests {
    use crate::config::RandomForestConfig;

    fn fitted() -> (crate::RandomForest, Vec<Vec<f64>>) {
        let features: Vec<Vec<f64>> = (0..40).map(|i| vec![i as f64, (i % 3) as f64]).collect();
        let targets: Vec<f64> = (0..40).map(|i| if i < 20 { 1.0 } else { 9.0 }).collect();
        let names = vec!["x".to_string(), "z".to_string()];
        let result = RandomForestConfig::new(10)
            .unwrap()
            .fit(&features, &targets, &names)
            .unwrap();
        (result.into_forest(), features)
    }

    #[test]
    fn batch_matches_individual() {
        let (forest, features) = fitted();
        let batch = forest.predict_batch(&features).unwrap();
        for (i, sample) in features.iter().enumerate() {
            assert_eq!(batch[i], forest.predict(sample).unwrap());
        }
    }

    #[test]
    fn predictions_within_target_range() {
        let (forest, features) = fitted();
        for p in forest.predict_batch(&features).unwrap() {
            assert!((1.0..=9.0).contains(&p), "prediction {p} out of range");
        }
    }

    #[test]
    fn column_importances_sum_to_one() {
        let (forest, _) = fitted();
        let imp = forest.feature_importances();
        assert_eq!(imp.len(), 2);
        assert!((imp.iter().sum::<f64>() - 1.0).abs() < 1e-10);
        assert!(imp[0] > imp[1]);
    }

    #[test]
    fn wrong_width_rejected() {
        let (forest, _) = fitted();
        assert!(forest.predict(&[1.0]).is_err());
        assert!(forest.predict_batch(&[vec![1.0, 2.0, 3.0]]).is_err());
    }
}
