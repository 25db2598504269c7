//! Error types for culling-rfe.

use std::path::PathBuf;

use culling_forest::RfError;
use culling_io::IoError;

/// One outer resample that did not complete.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ResampleFailure {
    /// 1-based resample index.
    pub index: usize,
    /// Rendered error chain.
    pub reason: String,
}

/// Errors raised by a [`ModelTrainer`](crate::ModelTrainer) implementation.
#[derive(Debug, thiserror::Error)]
pub enum TrainerError {
    /// Returned when the hyperparameter grid has no candidates.
    #[error("empty hyperparameter grid")]
    EmptyGrid,

    /// Returned when the forest crate rejects the data or configuration.
    #[error(transparent)]
    Forest(#[from] RfError),

    /// Returned by trainers that report failures as plain messages.
    #[error("{message}")]
    Failed {
        /// Human-readable cause.
        message: String,
    },
}

/// Errors from resampling, elimination, checkpointing, tidying, and pruning.
#[derive(Debug, thiserror::Error)]
pub enum RfeError {
    // --- Configuration ---
    /// Returned when resampling or schedule parameters are malformed.
    #[error("invalid configuration: {reason}")]
    InvalidConfiguration {
        /// What was wrong.
        reason: String,
    },

    /// Returned when a step asks for more predictors than are available.
    #[error("insufficient features: requested {requested}, only {available} available")]
    InsufficientFeatures {
        /// Requested subset size.
        requested: usize,
        /// Predictors currently available.
        available: usize,
    },

    /// Returned when a name does not match any known feature or design column.
    #[error("unknown feature \"{name}\"")]
    UnknownFeature {
        /// The unmatched name.
        name: String,
    },

    // --- Training ---
    /// Returned when the trainer fails inside an outer resample.
    #[error("trainer failed in resample {resample} at subset size {subset_size}")]
    Trainer {
        /// 1-based resample index.
        resample: usize,
        /// Subset-size label of the failing step.
        subset_size: usize,
        /// Underlying trainer error.
        source: TrainerError,
    },

    /// Returned when the trainer fails during the final model fit.
    #[error("final model fit failed")]
    FinalFit {
        /// Underlying trainer error.
        source: TrainerError,
    },

    /// Returned after all resamples ran when at least one of them failed.
    #[error("{} resample(s) failed: {}", .failures.len(), render_failures(.failures))]
    ResamplesFailed {
        /// Failed resamples in index order.
        failures: Vec<ResampleFailure>,
    },

    /// Returned when the worker pool cannot be built.
    #[error("cannot build worker pool with {n_threads} threads")]
    WorkerPool {
        /// Requested thread count.
        n_threads: usize,
        /// Underlying rayon error.
        source: rayon::ThreadPoolBuildError,
    },

    // --- Checkpoints ---
    /// Returned when the checkpoint directory cannot be created.
    #[error("cannot create checkpoint directory {path}")]
    CheckpointDir {
        /// Directory that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when checkpoint encoding fails.
    #[error("failed to encode checkpoint for resample {resample}")]
    EncodeCheckpoint {
        /// 1-based resample index.
        resample: usize,
        /// Underlying bincode error.
        source: bincode::Error,
    },

    /// Returned when a checkpoint file cannot be written or renamed into place.
    #[error("failed to write checkpoint {path}")]
    WriteCheckpoint {
        /// Target path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when a checkpoint file cannot be read.
    #[error("failed to read checkpoint {path}")]
    ReadCheckpoint {
        /// Source path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when checkpoint decoding fails.
    #[error("failed to decode checkpoint {path}")]
    DecodeCheckpoint {
        /// Source path.
        path: PathBuf,
        /// Underlying bincode error.
        source: bincode::Error,
    },

    /// Returned when a checkpoint was written by an incompatible format version.
    #[error("incompatible checkpoint version in {path}: expected {expected}, found {found}")]
    IncompatibleCheckpointVersion {
        /// Source path.
        path: PathBuf,
        /// Version this build reads.
        expected: u32,
        /// Version found in the file.
        found: u32,
    },

    /// Returned when tidying is asked to run without any checkpoints.
    #[error("no checkpoints to tidy")]
    NoCheckpoints,

    // --- Wrapped ---
    /// Dataset selection or I/O failure.
    #[error(transparent)]
    Dataset(#[from] IoError),

    /// Metric or forest failure outside a trainer call.
    #[error(transparent)]
    Forest(#[from] RfError),
}

fn render_failures(failures: &[ResampleFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("#{} ({})", f.index, f.reason))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resamples_failed_lists_every_index() {
        let err = RfeError::ResamplesFailed {
            failures: vec![
                ResampleFailure {
                    index: 2,
                    reason: "boom".into(),
                },
                ResampleFailure {
                    index: 5,
                    reason: "bust".into(),
                },
            ],
        };
        assert_eq!(err.to_string(), "2 resample(s) failed: #2 (boom), #5 (bust)");
    }
}
