use std::path::PathBuf;

/// Errors raised while configuring, training, scoring or persisting a forest.
#[derive(Debug, thiserror::Error)]
pub enum RfError {
    // --- Configuration ---
    /// A hyperparameter is outside its valid range.
    #[error("{name} = {value} is invalid, expected {expected}")]
    InvalidParameter {
        /// Parameter name as it appears on the config builder.
        name: &'static str,
        /// Rejected value, rendered for display.
        value: String,
        /// Accepted range.
        expected: &'static str,
    },

    /// `max_features` resolved to zero or to more columns than exist.
    #[error("max_features resolved to {max_features}, outside [1, {n_features}]")]
    InvalidMaxFeatures {
        /// Resolved feature count.
        max_features: usize,
        /// Columns available.
        n_features: usize,
    },

    // --- Training data ---
    /// No rows to train on.
    #[error("training data has no rows")]
    EmptyDataset,

    /// Rows have no columns.
    #[error("training data has no feature columns")]
    ZeroFeatures,

    /// A row is shorter or longer than the first row.
    #[error("row {sample_index} has {got} columns, expected {expected}")]
    FeatureCountMismatch {
        /// Column count of the first row.
        expected: usize,
        /// Column count of the offending row.
        got: usize,
        /// Zero-based row index.
        sample_index: usize,
    },

    /// Response length differs from the row count.
    #[error("{n_targets} responses for {n_samples} rows")]
    TargetCountMismatch {
        /// Row count.
        n_samples: usize,
        /// Response count.
        n_targets: usize,
    },

    /// A feature cell is NaN or infinite.
    #[error("non-finite value at row {sample_index}, column {feature_index}")]
    NonFiniteValue {
        /// Zero-based row index.
        sample_index: usize,
        /// Zero-based column index.
        feature_index: usize,
    },

    /// A response value is NaN or infinite.
    #[error("non-finite response at row {sample_index}")]
    NonFiniteTarget {
        /// Zero-based row index.
        sample_index: usize,
    },

    /// Fewer rows than cross-validation folds.
    #[error("{n_samples} rows cannot fill {n_folds} folds")]
    TooFewSamplesForFolds {
        /// Row count.
        n_samples: usize,
        /// Requested folds.
        n_folds: usize,
    },

    // --- Prediction and scoring ---
    /// Prediction rows do not match the training width.
    #[error("prediction row has {got} columns, model expects {expected}")]
    PredictionFeatureMismatch {
        /// Training column count.
        expected: usize,
        /// Column count supplied.
        got: usize,
    },

    /// Observed and predicted vectors are empty or differ in length.
    #[error("cannot score {n_predicted} predictions against {n_observed} observations")]
    MetricLengthMismatch {
        /// Observed count.
        n_observed: usize,
        /// Predicted count.
        n_predicted: usize,
    },

    /// Every row was drawn by every tree, so no out-of-bag estimate exists.
    #[error("out-of-bag scoring failed: {reason}")]
    OobEvaluationFailed {
        /// What went wrong.
        reason: String,
    },

    // --- Persistence ---
    /// bincode could not encode the model.
    #[error("failed to encode model")]
    SerializeModel {
        /// Underlying bincode error.
        source: Box<bincode::ErrorKind>,
    },

    /// bincode could not decode the model file.
    #[error("failed to decode model from {path}")]
    DeserializeModel {
        /// Model file.
        path: PathBuf,
        /// Underlying bincode error.
        source: Box<bincode::ErrorKind>,
    },

    /// The model file could not be written.
    #[error("failed to write model to {path}")]
    WriteModel {
        /// Destination file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The model file could not be read.
    #[error("failed to read model from {path}")]
    ReadModel {
        /// Source file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The model file was written by an incompatible format version.
    #[error("model {path} has format version {found}, this build reads {expected}")]
    IncompatibleModelVersion {
        /// Version this build reads.
        expected: u32,
        /// Version stored in the file.
        found: u32,
        /// Model file.
        path: PathBuf,
    },
}

impl RfError {
    pub(crate) fn parameter(
        name: &'static str,
        value: impl std::fmt::Display,
        expected: &'static str,
    ) -> Self {
        RfError::InvalidParameter {
            name,
            value: value.to_string(),
            expected,
        }
    }
}
