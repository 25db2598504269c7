//! Stratified train/holdout partitions for the outer resampling loop.

use culling_forest::quantile_strata;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, instrument};

use crate::error::RfeError;

/// One outer resample: training rows and the complementary holdout rows.
///
/// Both lists are ascending row indices into the dataset the partition was
/// drawn from.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Partition {
    /// 1-based resample index.
    pub index: usize,
    /// Rows used to train.
    pub train: Vec<usize>,
    /// Rows held out for testing.
    pub holdout: Vec<usize>,
}

/// Repeated stratified random-subsampling configuration.
///
/// Construct via [`ResampleConfig::new`], then chain `with_*` methods.
///
/// # Defaults
///
/// | Parameter | Default |
/// |-----------|---------|
/// | `groups`  | 5       |
/// | `seed`    | 42      |
#[derive(Debug, Clone)]
pub struct ResampleConfig {
    train_fraction: f64,
    times: usize,
    groups: usize,
    seed: u64,
}

impl ResampleConfig {
    /// Create a config drawing `times` partitions with `train_fraction` of
    /// each response stratum in the training set.
    ///
    /// # Errors
    ///
    /// Returns [`RfeError::InvalidConfiguration`] if `train_fraction` is not
    /// in `(0, 1)` or `times` is zero.
    pub fn new(train_fraction: f64, times: usize) -> Result<Self, RfeError> {
        if !(train_fraction > 0.0 && train_fraction < 1.0) {
            return Err(RfeError::InvalidConfiguration {
                reason: format!("train fraction must be in (0, 1), got {train_fraction}"),
            });
        }
        if times == 0 {
            return Err(RfeError::InvalidConfiguration {
                reason: "resample count must be at least 1".into(),
            });
        }
        Ok(Self {
            train_fraction,
            times,
            groups: 5,
            seed: 42,
        })
    }

    /// Set the number of response quantile points used for stratification.
    #[must_use]
    pub fn with_groups(mut self, groups: usize) -> Self {
        self.groups = groups;
        self
    }

    /// Set the master seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Return the training fraction.
    #[must_use]
    pub fn train_fraction(&self) -> f64 {
        self.train_fraction
    }

    /// Return the number of partitions.
    #[must_use]
    pub fn times(&self) -> usize {
        self.times
    }

    /// Return the number of quantile points.
    #[must_use]
    pub fn groups(&self) -> usize {
        self.groups
    }

    /// Return the master seed.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Draw the partitions for `response`.
    ///
    /// The response is cut into quantile bins (see
    /// [`quantile_strata`]); within each bin `ceil(n_bin × train_fraction)`
    /// rows are sampled without replacement for training. Each partition
    /// uses its own sub-seed drawn from the master seed, so partition `i`
    /// does not depend on how many partitions follow it.
    ///
    /// # Errors
    ///
    /// Returns [`RfeError::InvalidConfiguration`] if `groups` < 2, the
    /// response is empty, or a partition would have an empty holdout.
    #[instrument(skip_all, fields(n_rows = response.len(), times = self.times))]
    pub fn create_partitions(&self, response: &[f64]) -> Result<Vec<Partition>, RfeError> {
        if self.groups < 2 {
            return Err(RfeError::InvalidConfiguration {
                reason: format!("stratification needs at least 2 groups, got {}", self.groups),
            });
        }
        if response.is_empty() {
            return Err(RfeError::InvalidConfiguration {
                reason: "cannot partition an empty response".into(),
            });
        }

        let strata = quantile_strata(response, self.groups);
        let n_bins = strata.iter().max().map_or(0, |&m| m + 1);
        let mut bins: Vec<Vec<usize>> = vec![Vec::new(); n_bins];
        for (row, &bin) in strata.iter().enumerate() {
            bins[bin].push(row);
        }
        debug!(n_bins, "response stratified");

        let mut master = ChaCha8Rng::seed_from_u64(self.seed);
        let sub_seeds: Vec<u64> = (0..self.times).map(|_| master.r#gen()).collect();

        sub_seeds
            .into_iter()
            .enumerate()
            .map(|(i, sub_seed)| self.draw(i + 1, response.len(), &bins, sub_seed))
            .collect()
    }

    fn draw(
        &self,
        index: usize,
        n_rows: usize,
        bins: &[Vec<usize>],
        sub_seed: u64,
    ) -> Result<Partition, RfeError> {
        let mut rng = ChaCha8Rng::seed_from_u64(sub_seed);
        let mut in_train = vec![false; n_rows];
        for bin in bins {
            let n_take = (bin.len() as f64 * self.train_fraction).ceil() as usize;
            let mut members = bin.clone();
            members.shuffle(&mut rng);
            for &row in members.iter().take(n_take) {
                in_train[row] = true;
            }
        }

        let (train, holdout): (Vec<usize>, Vec<usize>) = (0..n_rows).partition(|&r| in_train[r]);
        if holdout.is_empty() {
            return Err(RfeError::InvalidConfiguration {
                reason: format!(
                    "train fraction {} leaves no holdout rows out of {n_rows}",
                    self.train_fraction
                ),
            });
        }
        Ok(Partition {
            index,
            train,
            holdout,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(n: usize) -> Vec<f64> {
        (0..n).map(|i| ((i * 37) % 101) as f64 / 10.0).collect()
    }

    #[test]
    fn partitions_cover_rows_exactly_once() {
        let y = response(200);
        let parts = ResampleConfig::new(0.8, 5).unwrap().create_partitions(&y).unwrap();
        assert_eq!(parts.len(), 5);
        for (i, p) in parts.iter().enumerate() {
            assert_eq!(p.index, i + 1);
            assert_eq!(p.train.len() + p.holdout.len(), 200);
            let mut all: Vec<usize> = p.train.iter().chain(&p.holdout).copied().collect();
            all.sort_unstable();
            assert_eq!(all, (0..200).collect::<Vec<_>>());
            assert!(p.train.len() >= 160 && p.train.len() <= 164, "{}", p.train.len());
        }
        assert_ne!(parts[0].train, parts[1].train);
    }

    #[test]
    fn stratification_preserves_bin_proportions() {
        let y = response(200);
        let strata = quantile_strata(&y, 5);
        let parts = ResampleConfig::new(0.5, 1).unwrap().create_partitions(&y).unwrap();
        for bin in 0..4 {
            let total = strata.iter().filter(|&&s| s == bin).count();
            let taken = parts[0].train.iter().filter(|&&r| strata[r] == bin).count();
            assert_eq!(taken, total.div_ceil(2), "bin {bin}");
        }
    }

    #[test]
    fn deterministic_for_seed() {
        let y = response(60);
        let cfg = ResampleConfig::new(0.7, 3).unwrap().with_seed(11);
        assert_eq!(cfg.create_partitions(&y).unwrap(), cfg.create_partitions(&y).unwrap());
        let other = cfg.clone().with_seed(12).create_partitions(&y).unwrap();
        assert_ne!(cfg.create_partitions(&y).unwrap(), other);
    }

    #[test]
    fn prefix_stable_across_times() {
        let y = response(60);
        let three = ResampleConfig::new(0.7, 3).unwrap().create_partitions(&y).unwrap();
        let five = ResampleConfig::new(0.7, 5).unwrap().create_partitions(&y).unwrap();
        assert_eq!(three[..], five[..3]);
    }

    #[test]
    fn invalid_configurations() {
        assert!(ResampleConfig::new(0.0, 1).is_err());
        assert!(ResampleConfig::new(1.0, 1).is_err());
        assert!(ResampleConfig::new(0.5, 0).is_err());
        let cfg = ResampleConfig::new(0.5, 1).unwrap();
        assert!(cfg.clone().with_groups(1).create_partitions(&[1.0, 2.0]).is_err());
        assert!(cfg.create_partitions(&[]).is_err());
    }

    #[test]
    fn empty_holdout_rejected() {
        // Every bin holds one row, and single-row bins go to training.
        let cfg = ResampleConfig::new(0.5, 1).unwrap().with_groups(3);
        assert!(matches!(
            cfg.create_partitions(&[1.0, 2.0]),
            Err(RfeError::InvalidConfiguration { .. })
        ));
    }
}
