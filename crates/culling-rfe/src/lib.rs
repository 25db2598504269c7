//! Resampled recursive feature elimination for regression.
//!
//! An [`RfeEngine`] runs a [`SubsetSchedule`] on every stratified
//! [`Partition`] of a dataset, using a pluggable [`ModelTrainer`] (the
//! random-forest [`ForestTrainer`] by default) and writing one
//! [`Checkpoint`] per resample. [`tidy`] turns the checkpoints into rank and
//! performance tables, [`select_top`] and [`prune`] cut the next run's input
//! down to the best-ranked, non-redundant predictors, and
//! [`fit_final`] tunes and scores the model on the surviving set.

mod aggregate;
mod checkpoint;
mod correlation;
mod design;
mod engine;
mod error;
mod final_fit;
mod pool;
mod prune;
mod resample;
mod schedule;
mod shrink;
mod tidy;
mod trainer;

pub use aggregate::{FeatureImportance, aggregate};
pub use checkpoint::{Checkpoint, CheckpointStore, ResumePlan};
pub use correlation::{CorrelationMatrix, pearson};
pub use design::{DesignColumn, DesignLayout, DesignMatrix, encode};
pub use engine::{NullBaseline, RfeConfig, RfeEngine, RfeRun};
pub use error::{ResampleFailure, RfeError, TrainerError};
pub use final_fit::{FinalFit, FinalReport, HoldoutPrediction, fit_final};
pub use pool::WorkerPool;
pub use prune::{CorrelatedPair, PrunePass, PruneReport, prune, select_top};
pub use resample::{Partition, ResampleConfig};
pub use schedule::SubsetSchedule;
pub use shrink::{RankEntry, Shrinkage, shrink};
pub use tidy::{EvalType, Metric, PerformanceRow, PerformanceTable, RankRow, RankTable, Summary, tidy};
pub use trainer::{FitOutcome, ForestGrid, ForestParams, ForestTrainer, ImportanceKind, ModelTrainer};
