//! Regression performance metrics.

use crate::error::RfError;

/// RMSE, MAE and R² of a set of predictions.
///
/// R² is `1 - SS_res / SS_tot`; it is reported as `0.0` when the observed
/// values are constant and the ratio is undefined.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RegressionMetrics {
    /// Root mean squared error.
    pub rmse: f64,
    /// Mean absolute error.
    pub mae: f64,
    /// Coefficient of determination.
    pub r_squared: f64,
}

impl RegressionMetrics {
    /// Score `predicted` against `observed`.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::MetricLengthMismatch`] if the slices differ in
    /// length or are empty.
    pub fn compute(observed: &[f64], predicted: &[f64]) -> Result<Self, RfError> {
        if observed.len() != predicted.len() || observed.is_empty() {
            return Err(RfError::MetricLengthMismatch {
                n_observed: observed.len(),
                n_predicted: predicted.len(),
            });
        }
        let n = observed.len() as f64;
        let mean_obs = observed.iter().sum::<f64>() / n;

        let mut ss_res = 0.0;
        let mut ss_tot = 0.0;
        let mut abs_sum = 0.0;
        for (&y, &p) in observed.iter().zip(predicted) {
            let resid = y - p;
            ss_res += resid * resid;
            abs_sum += resid.abs();
            ss_tot += (y - mean_obs) * (y - mean_obs);
        }

        let r_squared = if ss_tot > 0.0 { 1.0 - ss_res / ss_tot } else { 0.0 };
        Ok(Self {
            rmse: (ss_res / n).sqrt(),
            mae: abs_sum / n,
            r_squared,
        })
    }

    /// Average several metric records field by field.
    ///
    /// Returns `None` for an empty input.
    #[must_use]
    pub fn mean(records: &[Self]) -> Option<Self> {
        if records.is_empty() {
            return None;
        }
        let n = records.len() as f64;
        let (rmse, mae, r2) = records.iter().fold((0.0, 0.0, 0.0), |acc, m| {
            (acc.0 + m.rmse, acc.1 + m.mae, acc.2 + m.r_squared)
        });
        Some(Self {
            rmse: rmse / n,
            mae: mae / n,
            r_squared: r2 / n,
        })
    }
}
