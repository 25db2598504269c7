//! Resampled recursive feature elimination.
//!
//! Every outer resample runs the whole subset schedule on its own training
//! partition: fit, score, aggregate importance, shrink, repeat. Resamples are
//! independent and run in parallel on the [`WorkerPool`]; the inner loop is
//! sequential. A resample's checkpoint is written only once all its steps
//! succeed, and resamples with a checkpoint on disk are skipped.

use culling_forest::RegressionMetrics;
use culling_io::Dataset;
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use tracing::{debug, info, instrument, warn};

use crate::aggregate::aggregate;
use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::design::DesignLayout;
use crate::error::{ResampleFailure, RfeError};
use crate::pool::WorkerPool;
use crate::resample::{Partition, ResampleConfig};
use crate::schedule::SubsetSchedule;
use crate::shrink::{RankEntry, shrink};
use crate::trainer::ModelTrainer;

/// Population the null baseline is scored on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum NullBaseline {
    /// Predict the training-partition mean for every holdout row.
    Holdout,
    /// Predict, for each internal fold, the mean of the other folds'
    /// responses, scored on the training rows.
    InternalFolds,
}

/// Elimination run configuration.
///
/// Construct via [`RfeConfig::new`], then chain `with_*` methods.
///
/// # Defaults
///
/// | Parameter       | Default   |
/// |-----------------|-----------|
/// | `cv_folds`      | 7         |
/// | `null_baseline` | `Holdout` |
/// | `seed`          | 42        |
#[derive(Debug, Clone)]
pub struct RfeConfig {
    schedule: SubsetSchedule,
    resampling: ResampleConfig,
    cv_folds: usize,
    null_baseline: NullBaseline,
    seed: u64,
}

impl RfeConfig {
    /// Create a config from a schedule and resampling scheme.
    #[must_use]
    pub fn new(schedule: SubsetSchedule, resampling: ResampleConfig) -> Self {
        Self {
            schedule,
            resampling,
            cv_folds: 7,
            null_baseline: NullBaseline::Holdout,
            seed: 42,
        }
    }

    /// Set the number of internal cross-validation folds.
    #[must_use]
    pub fn with_cv_folds(mut self, cv_folds: usize) -> Self {
        self.cv_folds = cv_folds;
        self
    }

    /// Set the null-baseline population.
    #[must_use]
    pub fn with_null_baseline(mut self, null_baseline: NullBaseline) -> Self {
        self.null_baseline = null_baseline;
        self
    }

    /// Set the base seed. Resample `i` uses `seed + i`.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Return the subset schedule.
    #[must_use]
    pub fn schedule(&self) -> &SubsetSchedule {
        &self.schedule
    }

    /// Return the resampling scheme.
    #[must_use]
    pub fn resampling(&self) -> &ResampleConfig {
        &self.resampling
    }

    /// Return the number of internal folds.
    #[must_use]
    pub fn cv_folds(&self) -> usize {
        self.cv_folds
    }

    /// Return the null-baseline population.
    #[must_use]
    pub fn null_baseline(&self) -> NullBaseline {
        self.null_baseline
    }

    /// Return the base seed.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    fn validate(&self) -> Result<(), RfeError> {
        if self.cv_folds < 2 {
            return Err(RfeError::InvalidConfiguration {
                reason: format!("need at least 2 internal folds, got {}", self.cv_folds),
            });
        }
        Ok(())
    }
}

/// Summary of one engine invocation.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct RfeRun {
    /// Resamples skipped because a checkpoint already existed.
    pub resumed: Vec<usize>,
    /// Resamples computed by this invocation.
    pub computed: Vec<usize>,
}

/// Everything produced by one schedule step.
struct StepOutcome {
    train: RegressionMetrics,
    test: RegressionMetrics,
    null: RegressionMetrics,
    ranked: Vec<RankEntry>,
    /// Reduced table for the next step; `None` after the final step.
    next: Option<Dataset>,
}

/// Read-only state shared by the steps of one resample.
struct ResampleContext<'a> {
    index: usize,
    seed: u64,
    holdout: &'a Dataset,
}

/// Drives outer resamples over a borrowed worker pool.
pub struct RfeEngine<'p, T> {
    trainer: T,
    config: RfeConfig,
    pool: &'p WorkerPool,
    store: CheckpointStore,
}

impl<'p, T: ModelTrainer> RfeEngine<'p, T> {
    /// Assemble an engine.
    ///
    /// # Errors
    ///
    /// Returns [`RfeError::InvalidConfiguration`] if `cv_folds` < 2.
    pub fn new(
        trainer: T,
        config: RfeConfig,
        pool: &'p WorkerPool,
        store: CheckpointStore,
    ) -> Result<Self, RfeError> {
        config.validate()?;
        Ok(Self {
            trainer,
            config,
            pool,
            store,
        })
    }

    /// Return the checkpoint store.
    #[must_use]
    pub fn store(&self) -> &CheckpointStore {
        &self.store
    }

    /// Run every pending resample.
    ///
    /// Configuration problems fail before any work starts. Failures inside
    /// individual resamples are collected; the others still run and write
    /// their checkpoints.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`RfeError::InsufficientFeatures`] | First schedule size exceeds the predictor count |
    /// | [`RfeError::InvalidConfiguration`] | Resampling parameters are invalid |
    /// | [`RfeError::ResamplesFailed`] | At least one resample failed |
    #[instrument(skip_all, fields(n_rows = dataset.n_rows(), n_predictors = dataset.n_predictors()))]
    pub fn run(&self, dataset: &Dataset) -> Result<RfeRun, RfeError> {
        let schedule = &self.config.schedule;
        schedule.check_available(dataset.n_predictors())?;
        if dataset.n_predictors() != schedule.first() {
            warn!(
                n_predictors = dataset.n_predictors(),
                label = schedule.first(),
                "first step trains on every predictor but is labelled with the first schedule size"
            );
        }

        let partitions = self.config.resampling.create_partitions(dataset.response())?;
        let plan = self.store.resume_plan(partitions.len());
        info!(
            n_resamples = partitions.len(),
            n_resumed = plan.completed.len(),
            n_pending = plan.pending.len(),
            n_threads = self.pool.n_threads(),
            "starting elimination"
        );

        let outcomes: Vec<(usize, Result<(), RfeError>)> = self.pool.install(|| {
            plan.pending
                .par_iter()
                .map(|&index| {
                    let result = self.run_resample(dataset, &partitions[index - 1]);
                    (index, result)
                })
                .collect()
        });

        let mut computed = Vec::new();
        let mut failures = Vec::new();
        for (index, result) in outcomes {
            match result {
                Ok(()) => computed.push(index),
                Err(e) => {
                    warn!(resample = index, error = %e, "resample failed");
                    failures.push(ResampleFailure {
                        index,
                        reason: error_chain(&e),
                    });
                }
            }
        }
        if !failures.is_empty() {
            return Err(RfeError::ResamplesFailed { failures });
        }

        info!(n_computed = computed.len(), "elimination complete");
        Ok(RfeRun {
            resumed: plan.completed,
            computed,
        })
    }

    #[instrument(skip_all, fields(resample = partition.index))]
    fn run_resample(&self, dataset: &Dataset, partition: &Partition) -> Result<(), RfeError> {
        let schedule = &self.config.schedule;
        let holdout = dataset.select_rows(&partition.holdout)?;
        let ctx = ResampleContext {
            index: partition.index,
            seed: self.config.seed.wrapping_add(partition.index as u64),
            holdout: &holdout,
        };

        let mut checkpoint = Checkpoint {
            resample: partition.index,
            ranks: Vec::with_capacity(dataset.n_predictors()),
            train: Vec::with_capacity(schedule.len()),
            test: Vec::with_capacity(schedule.len()),
            null: Vec::with_capacity(schedule.len()),
            subset_sizes: schedule.sizes().to_vec(),
            predictor_counts: Vec::with_capacity(schedule.len()),
        };

        let mut table = Some(dataset.select_rows(&partition.train)?);
        for step in 0..schedule.len() {
            let Some(current) = table.take() else {
                break;
            };
            checkpoint.predictor_counts.push(current.n_predictors());
            let outcome = self.run_step(&ctx, step, current)?;
            checkpoint.train.push(outcome.train);
            checkpoint.test.push(outcome.test);
            checkpoint.null.push(outcome.null);
            checkpoint.ranks.extend(outcome.ranked);
            table = outcome.next;
        }

        self.store.save(&checkpoint)?;
        Ok(())
    }

    /// Fit, score and shrink one step. Takes the step's table by value and
    /// returns the reduced table for the next step.
    fn run_step(
        &self,
        ctx: &ResampleContext<'_>,
        step: usize,
        table: Dataset,
    ) -> Result<StepOutcome, RfeError> {
        let schedule = &self.config.schedule;
        let label = schedule.sizes()[step];
        let n_predictors = table.n_predictors();
        // After the first step the table was shrunk to exactly the label.
        debug_assert!(step == 0 || n_predictors == label);
        let trainer_err = |source| RfeError::Trainer {
            resample: ctx.index,
            subset_size: label,
            source,
        };

        let grid = self.trainer.grid(&table);
        let fit = self
            .trainer
            .fit(&table, &grid, self.config.cv_folds, ctx.seed)
            .map_err(trainer_err)?;

        let holdout = ctx.holdout.select_predictors(&table.predictor_names())?;
        let predictions = self
            .trainer
            .predict(&fit.model, &holdout)
            .map_err(trainer_err)?;
        let test = RegressionMetrics::compute(holdout.response(), &predictions)?;
        let null = match self.config.null_baseline {
            NullBaseline::Holdout => holdout_null(table.response(), holdout.response())?,
            NullBaseline::InternalFolds => fold_null(table.response(), &fit.fold_index)?,
        };
        debug!(
            step,
            label,
            n_predictors,
            test_rmse = test.rmse,
            null_rmse = null.rmse,
            "step scored"
        );

        let rank = schedule.rank_for_step(step);
        let (ranked, next) = match schedule.keep_after(step) {
            None => {
                let ranked = table
                    .predictor_names()
                    .into_iter()
                    .map(|feature| RankEntry { feature, rank })
                    .collect();
                (ranked, None)
            }
            Some(keep) => {
                let layout = DesignLayout::for_dataset(&table);
                let importances = aggregate(&fit.importances, &layout)?;
                let shrunk = shrink(&importances, keep, rank)?;
                let next = table.select_predictors(&shrunk.kept)?;
                (shrunk.eliminated, Some(next))
            }
        };

        Ok(StepOutcome {
            train: fit.train_performance,
            test,
            null,
            ranked,
            next,
        })
    }
}

/// Score the training mean as a constant prediction on the holdout.
fn holdout_null(train: &[f64], holdout: &[f64]) -> Result<RegressionMetrics, RfeError> {
    let mean = train.iter().sum::<f64>() / train.len() as f64;
    Ok(RegressionMetrics::compute(holdout, &vec![mean; holdout.len()])?)
}

/// Score, for every internal fold, the mean of the other folds' responses on
/// that fold's rows.
fn fold_null(response: &[f64], fold_index: &[usize]) -> Result<RegressionMetrics, RfeError> {
    let n_folds = fold_index.iter().max().map_or(0, |&m| m + 1);
    let total: f64 = response.iter().sum();
    let mut fold_sum = vec![0.0f64; n_folds];
    let mut fold_n = vec![0usize; n_folds];
    for (&y, &f) in response.iter().zip(fold_index) {
        fold_sum[f] += y;
        fold_n[f] += 1;
    }
    let predictions: Vec<f64> = fold_index
        .iter()
        .map(|&f| (total - fold_sum[f]) / (response.len() - fold_n[f]).max(1) as f64)
        .collect();
    Ok(RegressionMetrics::compute(response, &predictions)?)
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut rendered = err.to_string();
    let mut source = err.source();
    while let Some(e) = source {
        rendered.push_str(": ");
        rendered.push_str(&e.to_string());
        source = e.source();
    }
    rendered
}
