//! Final model stage: tune on a fixed feature set and score on a holdout.

use culling_forest::RegressionMetrics;
use culling_io::Dataset;
use tracing::{info, instrument};

use crate::aggregate::{FeatureImportance, aggregate};
use crate::design::DesignLayout;
use crate::error::RfeError;
use crate::resample::ResampleConfig;
use crate::trainer::ModelTrainer;

/// Observed and predicted response of one holdout row.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct HoldoutPrediction {
    /// Row index in the input dataset.
    pub row: usize,
    /// Observed response.
    pub observed: f64,
    /// Model prediction.
    pub predicted: f64,
}

/// Serializable summary of the final fit.
#[derive(Debug, Clone, serde::Serialize)]
pub struct FinalReport<P> {
    /// Predictors the model was trained on, in schema order.
    pub features: Vec<String>,
    /// Selected hyperparameters.
    pub params: P,
    /// Internal CV performance of the selected parameters.
    pub train: RegressionMetrics,
    /// Holdout performance.
    pub test: RegressionMetrics,
    /// Training-mean baseline on the holdout.
    pub null: RegressionMetrics,
    /// Out-of-bag performance on the training rows, when the trainer
    /// computes it.
    pub oob: Option<RegressionMetrics>,
    /// Importance per predictor, categorical levels summed.
    pub importances: Vec<FeatureImportance>,
    /// Training rows.
    pub n_train: usize,
    /// Holdout predictions for external diagnostics.
    pub holdout: Vec<HoldoutPrediction>,
}

/// Final model plus its report.
#[derive(Debug)]
pub struct FinalFit<M, P> {
    /// Model refit on the training rows.
    pub model: M,
    /// Evaluation summary.
    pub report: FinalReport<P>,
}

/// Tune `trainer` on one stratified split of `dataset` and score the winner
/// on the holdout rows.
///
/// Only the first partition of `split` is used.
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`RfeError::InvalidConfiguration`] | The split cannot be drawn |
/// | [`RfeError::FinalFit`] | The trainer failed |
/// | [`RfeError::UnknownFeature`] | The trainer reported an unknown design column |
#[instrument(skip_all, fields(n_rows = dataset.n_rows(), n_predictors = dataset.n_predictors()))]
pub fn fit_final<T: ModelTrainer>(
    trainer: &T,
    dataset: &Dataset,
    split: &ResampleConfig,
    cv_folds: usize,
    seed: u64,
) -> Result<FinalFit<T::Model, T::Params>, RfeError> {
    let partitions = split.create_partitions(dataset.response())?;
    let Some(partition) = partitions.first() else {
        return Err(RfeError::InvalidConfiguration {
            reason: "final split produced no partition".into(),
        });
    };
    let train = dataset.select_rows(&partition.train)?;
    let holdout = dataset.select_rows(&partition.holdout)?;

    let grid = trainer.grid(&train);
    let fit = trainer
        .fit(&train, &grid, cv_folds, seed)
        .map_err(|source| RfeError::FinalFit { source })?;
    let predictions = trainer
        .predict(&fit.model, &holdout)
        .map_err(|source| RfeError::FinalFit { source })?;

    let test = RegressionMetrics::compute(holdout.response(), &predictions)?;
    let mean = train.response().iter().sum::<f64>() / train.n_rows() as f64;
    let null = RegressionMetrics::compute(holdout.response(), &vec![mean; holdout.n_rows()])?;
    let importances = aggregate(&fit.importances, &DesignLayout::for_dataset(&train))?;

    info!(
        test_rmse = test.rmse,
        test_r_squared = test.r_squared,
        null_rmse = null.rmse,
        "final model evaluated"
    );

    let holdout_predictions = partition
        .holdout
        .iter()
        .zip(holdout.response())
        .zip(&predictions)
        .map(|((&row, &observed), &predicted)| HoldoutPrediction {
            row,
            observed,
            predicted,
        })
        .collect();

    Ok(FinalFit {
        model: fit.model,
        report: FinalReport {
            features: train.predictor_names(),
            params: fit.params,
            train: fit.train_performance,
            test,
            null,
            oob: fit.oob,
            importances,
            n_train: train.n_rows(),
            holdout: holdout_predictions,
        },
    })
}
