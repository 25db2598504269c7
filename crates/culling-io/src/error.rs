//! I/O error types for culling-io.

use std::path::PathBuf;

/// Errors from file I/O, CSV parsing, dataset validation, and result
/// serialization.
#[derive(Debug, thiserror::Error)]
pub enum IoError {
    /// Returned when the input file does not exist or is unreadable.
    #[error("file not found: {path}")]
    FileNotFound {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when the CSV parser encounters a malformed record.
    #[error("CSV parse error in {path} at byte offset {offset}")]
    CsvParse {
        /// Path to the CSV file.
        path: PathBuf,
        /// Byte offset where the error occurred.
        offset: u64,
        /// Underlying CSV error.
        source: csv::Error,
    },

    /// Returned when a CSV record cannot be written.
    #[error("cannot write CSV to {path}")]
    CsvWrite {
        /// Path being written.
        path: PathBuf,
        /// Underlying CSV error.
        source: csv::Error,
    },

    /// Returned when no complete data rows remain.
    #[error("empty dataset (no complete data rows) in {path}")]
    EmptyDataset {
        /// Path to the CSV file.
        path: PathBuf,
    },

    /// Returned when a data row has a different number of columns than the header.
    #[error("inconsistent row length in {path}: row {row_index} has {got} columns, expected {expected}")]
    InconsistentRowLength {
        /// Path to the CSV file.
        path: PathBuf,
        /// Zero-based row index (excluding header).
        row_index: usize,
        /// Expected number of columns (from header).
        expected: usize,
        /// Actual number of columns in this row.
        got: usize,
    },

    /// Returned when a numeric cell is infinite or not a float.
    #[error("non-finite value in {path}: row {row_index}, column \"{column}\", raw value \"{raw}\"")]
    NonFiniteValue {
        /// Path to the CSV file.
        path: PathBuf,
        /// Zero-based row index (excluding header).
        row_index: usize,
        /// Column name.
        column: String,
        /// The raw string value that failed to parse.
        raw: String,
    },

    /// Returned when a requested column is absent from the header.
    #[error("column \"{column}\" not found in {path}")]
    MissingColumn {
        /// Path to the CSV file.
        path: PathBuf,
        /// The requested column name.
        column: String,
    },

    /// Returned when the header names the same column twice.
    #[error("duplicate column \"{column}\" in {path}")]
    DuplicateColumn {
        /// Path to the CSV file.
        path: PathBuf,
        /// The repeated column name.
        column: String,
    },

    /// Returned when a dataset column has the wrong number of rows.
    #[error("column \"{column}\" has {got} rows, expected {expected}")]
    ColumnLengthMismatch {
        /// Column name.
        column: String,
        /// Row count of the response.
        expected: usize,
        /// Row count of this column.
        got: usize,
    },

    /// Returned when a categorical code does not index into its level list.
    #[error("column \"{column}\" has code {code} but only {n_levels} levels")]
    InvalidLevelCode {
        /// Column name.
        column: String,
        /// The out-of-range code.
        code: usize,
        /// Number of declared levels.
        n_levels: usize,
    },

    /// Returned when a predictor name is not part of the dataset.
    #[error("unknown predictor \"{name}\"")]
    UnknownPredictor {
        /// The requested name.
        name: String,
    },

    /// Returned when two predictors share a name.
    #[error("duplicate predictor \"{name}\"")]
    DuplicatePredictor {
        /// The repeated name.
        name: String,
    },

    /// Returned when a row index is past the end of the dataset.
    #[error("row index {index} out of range for {n_rows} rows")]
    RowOutOfRange {
        /// The requested row.
        index: usize,
        /// Number of rows in the dataset.
        n_rows: usize,
    },

    /// Returned when the experiment name contains characters outside `[a-zA-Z0-9_-]`.
    #[error("invalid experiment name \"{name}\": must match [a-zA-Z0-9_-]+")]
    InvalidExperimentName {
        /// The invalid name.
        name: String,
    },

    /// Returned when the output directory cannot be created.
    #[error("cannot create output directory {path}")]
    OutputDirCreate {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when a result file cannot be written.
    #[error("cannot write file {path}")]
    WriteFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when JSON encoding or decoding fails.
    #[error("invalid JSON for {path}")]
    Json {
        /// File being read or written.
        path: PathBuf,
        /// Underlying serde_json error.
        source: serde_json::Error,
    },
}
