//! Subset schedule: the predictor-set sizes visited by one elimination run.

use crate::error::RfeError;

/// Strictly decreasing list of predictor-set sizes, smallest at least 1.
///
/// Step `j` (0-based) is labelled `sizes[j]`. Features eliminated after step
/// `j` receive rank `len - j`, so the earliest drops get the largest rank and
/// the survivors of the final step share rank 1.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SubsetSchedule(Vec<usize>);

impl SubsetSchedule {
    /// Validate and wrap a schedule.
    ///
    /// # Errors
    ///
    /// Returns [`RfeError::InvalidConfiguration`] if `sizes` is empty, not
    /// strictly decreasing, or ends below 1.
    pub fn new(sizes: Vec<usize>) -> Result<Self, RfeError> {
        let Some(&last) = sizes.last() else {
            return Err(RfeError::InvalidConfiguration {
                reason: "subset schedule is empty".into(),
            });
        };
        if last < 1 {
            return Err(RfeError::InvalidConfiguration {
                reason: "smallest subset size must be at least 1".into(),
            });
        }
        if let Some(w) = sizes.windows(2).find(|w| w[0] <= w[1]) {
            return Err(RfeError::InvalidConfiguration {
                reason: format!(
                    "subset schedule must be strictly decreasing, found {} then {}",
                    w[0], w[1]
                ),
            });
        }
        Ok(Self(sizes))
    }

    /// Return the sizes, largest first.
    #[must_use]
    pub fn sizes(&self) -> &[usize] {
        &self.0
    }

    /// Return the number of steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always `false`; a validated schedule has at least one step.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Return the largest subset size.
    #[must_use]
    pub fn first(&self) -> usize {
        self.0[0]
    }

    /// Rank given to features eliminated after `step` (0-based).
    #[must_use]
    pub fn rank_for_step(&self, step: usize) -> usize {
        self.0.len() - step
    }

    /// Number of features kept after `step`, or `None` for the final step.
    #[must_use]
    pub fn keep_after(&self, step: usize) -> Option<usize> {
        self.0.get(step + 1).copied()
    }

    /// Check the schedule against the number of available predictors.
    ///
    /// # Errors
    ///
    /// Returns [`RfeError::InsufficientFeatures`] if the first size exceeds
    /// `n_predictors`.
    pub fn check_available(&self, n_predictors: usize) -> Result<(), RfeError> {
        if self.first() > n_predictors {
            return Err(RfeError::InsufficientFeatures {
                requested: self.first(),
                available: n_predictors,
            });
        }
        Ok(())
    }
}
