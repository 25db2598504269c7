//! CSV dataset reader with schema declaration and complete-case filtering.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument, warn};

use crate::IoError;
use crate::domain::{Column, Dataset, Predictor};

/// Cell values treated as missing. Rows containing one are dropped.
const MISSING_TOKENS: [&str; 4] = ["", "NA", "NaN", "null"];

/// Reads a regression table from a CSV file.
///
/// Expected CSV format:
/// - Header row required
/// - One column named by `response`, holding numeric values
/// - Every other non-excluded column is a predictor: categorical when
///   declared via [`with_categorical`](Self::with_categorical), numeric otherwise
///
/// Rows with a missing cell (`""`, `NA`, `NaN`, `null`) in any used column
/// are dropped and counted. Categorical levels are the sorted distinct
/// labels of the retained rows.
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`IoError::FileNotFound`] | File doesn't exist or is unreadable |
/// | [`IoError::CsvParse`] | Malformed CSV record |
/// | [`IoError::DuplicateColumn`] | Header repeats a name |
/// | [`IoError::MissingColumn`] | Response or a declared column is absent |
/// | [`IoError::InconsistentRowLength`] | Row has different column count than header |
/// | [`IoError::NonFiniteValue`] | Numeric cell is infinite or unparseable |
/// | [`IoError::EmptyDataset`] | No complete rows remain |
pub struct DatasetReader {
    path: PathBuf,
    response: String,
    categorical: Vec<String>,
    excluded: Vec<String>,
}

/// How one CSV column is consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Response,
    Numeric,
    Categorical,
    Excluded,
}

impl DatasetReader {
    /// Create a new reader for the given CSV file and response column.
    pub fn new(path: &Path, response: impl Into<String>) -> Self {
        Self {
            path: path.to_path_buf(),
            response: response.into(),
            categorical: Vec::new(),
            excluded: Vec::new(),
        }
    }

    /// Declare predictor columns to be read as categorical.
    #[must_use]
    pub fn with_categorical<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.categorical = names.into_iter().map(Into::into).collect();
        self
    }

    /// Declare columns (identifiers, free text) to be skipped entirely.
    #[must_use]
    pub fn with_excluded<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.excluded = names.into_iter().map(Into::into).collect();
        self
    }

    /// Read and validate the CSV file, returning a [`Dataset`].
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn read(&self) -> Result<Dataset, IoError> {
        let file = std::fs::File::open(&self.path).map_err(|e| IoError::FileNotFound {
            path: self.path.clone(),
            source: e,
        })?;

        // flexible(true) lets our own InconsistentRowLength check fire
        // instead of a low-level CsvParse error.
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(file);

        let header: Vec<String> = rdr
            .headers()
            .map_err(|e| self.csv_error(e))?
            .iter()
            .map(str::to_string)
            .collect();
        let roles = self.resolve_roles(&header)?;
        debug!(n_columns = header.len(), "read CSV header");

        let mut response = Vec::new();
        let mut numeric: HashMap<usize, Vec<f64>> = HashMap::new();
        let mut labels: HashMap<usize, Vec<String>> = HashMap::new();
        let mut n_dropped = 0usize;

        for (row_index, result) in rdr.records().enumerate() {
            let record = result.map_err(|e| self.csv_error(e))?;
            if record.len() != header.len() {
                return Err(IoError::InconsistentRowLength {
                    path: self.path.clone(),
                    row_index,
                    expected: header.len(),
                    got: record.len(),
                });
            }

            let incomplete = record
                .iter()
                .zip(&roles)
                .any(|(cell, &role)| role != Role::Excluded && MISSING_TOKENS.contains(&cell.trim()));
            if incomplete {
                n_dropped += 1;
                continue;
            }

            for (col, (cell, &role)) in record.iter().zip(&roles).enumerate() {
                let cell = cell.trim();
                match role {
                    Role::Excluded => {}
                    Role::Categorical => labels.entry(col).or_default().push(cell.to_string()),
                    Role::Response | Role::Numeric => {
                        let value = self.parse_numeric(cell, row_index, &header[col])?;
                        if role == Role::Response {
                            response.push(value);
                        } else {
                            numeric.entry(col).or_default().push(value);
                        }
                    }
                }
            }
        }

        if response.is_empty() {
            return Err(IoError::EmptyDataset {
                path: self.path.clone(),
            });
        }
        if n_dropped > 0 {
            warn!(n_dropped, "dropped rows with missing values");
        }

        let mut predictors = Vec::new();
        for (col, &role) in roles.iter().enumerate() {
            let column = match role {
                Role::Numeric => Column::Numeric(numeric.remove(&col).unwrap_or_default()),
                Role::Categorical => encode_levels(labels.remove(&col).unwrap_or_default()),
                Role::Response | Role::Excluded => continue,
            };
            predictors.push(Predictor {
                name: header[col].clone(),
                column,
            });
        }

        let dataset = Dataset::new(self.response.clone(), response, predictors)?;
        info!(
            n_rows = dataset.n_rows(),
            n_predictors = dataset.n_predictors(),
            n_dropped,
            "dataset loaded"
        );
        Ok(dataset)
    }

    fn resolve_roles(&self, header: &[String]) -> Result<Vec<Role>, IoError> {
        let mut seen = BTreeSet::new();
        for name in header {
            if !seen.insert(name.as_str()) {
                return Err(IoError::DuplicateColumn {
                    path: self.path.clone(),
                    column: name.clone(),
                });
            }
        }
        for wanted in std::iter::once(&self.response).chain(&self.categorical).chain(&self.excluded) {
            if !seen.contains(wanted.as_str()) {
                return Err(IoError::MissingColumn {
                    path: self.path.clone(),
                    column: wanted.clone(),
                });
            }
        }

        Ok(header
            .iter()
            .map(|name| {
                if *name == self.response {
                    Role::Response
                } else if self.excluded.contains(name) {
                    Role::Excluded
                } else if self.categorical.contains(name) {
                    Role::Categorical
                } else {
                    Role::Numeric
                }
            })
            .collect())
    }

    fn parse_numeric(&self, raw: &str, row_index: usize, column: &str) -> Result<f64, IoError> {
        match raw.parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(v),
            _ => Err(IoError::NonFiniteValue {
                path: self.path.clone(),
                row_index,
                column: column.to_string(),
                raw: raw.to_string(),
            }),
        }
    }

    fn csv_error(&self, e: csv::Error) -> IoError {
        IoError::CsvParse {
            path: self.path.clone(),
            offset: e.position().map_or(0, |p| p.byte()),
            source: e,
        }
    }
}

/// Turn raw labels into sorted levels plus per-row codes.
fn encode_levels(raw: Vec<String>) -> Column {
    let levels: Vec<String> = raw.iter().cloned().collect::<BTreeSet<_>>().into_iter().collect();
    let index: HashMap<&str, usize> = levels
        .iter()
        .enumerate()
        .map(|(i, l)| (l.as_str(), i))
        .collect();
    let codes = raw.iter().map(|l| index[l.as_str()]).collect();
    Column::Categorical { levels, codes }
}

/// Read and decode a JSON file.
///
/// # Errors
///
/// Returns [`IoError::FileNotFound`] if the file cannot be read and
/// [`IoError::Json`] if it does not decode into `T`.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, IoError> {
    let text = std::fs::read_to_string(path).map_err(|e| IoError::FileNotFound {
        path: path.to_path_buf(),
        source: e,
    })?;
    serde_json::from_str(&text).map_err(|e| IoError::Json {
        path: path.to_path_buf(),
        source: e,
    })
}
