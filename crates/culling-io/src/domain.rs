//! Domain types for culling-io.

use std::collections::HashSet;

use crate::IoError;

/// A validated experiment name for output file naming.
///
/// Must match `[a-zA-Z0-9_-]+`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExperimentName(String);

impl ExperimentName {
    /// Parse and validate an experiment name.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::InvalidExperimentName`] if the name is empty or
    /// contains characters outside `[a-zA-Z0-9_-]`.
    pub fn new(name: String) -> Result<Self, IoError> {
        if name.is_empty()
            || !name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(IoError::InvalidExperimentName { name });
        }
        Ok(Self(name))
    }

    /// Return the experiment name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ExperimentName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Declared type of a predictor column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ColumnKind {
    /// Real-valued column.
    Numeric,
    /// Unordered factor with a fixed level set.
    Categorical,
}

/// Values of one predictor column.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    /// Real values, one per row.
    Numeric(Vec<f64>),
    /// Level codes into `levels`, one per row.
    Categorical {
        /// Sorted distinct level labels. Fixed at load time and never
        /// re-derived from a row subset.
        levels: Vec<String>,
        /// `levels[codes[row]]` is the value of `row`.
        codes: Vec<usize>,
    },
}

impl Column {
    /// Return the declared kind of this column.
    #[must_use]
    pub fn kind(&self) -> ColumnKind {
        match self {
            Column::Numeric(_) => ColumnKind::Numeric,
            Column::Categorical { .. } => ColumnKind::Categorical,
        }
    }

    /// Return the number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Column::Numeric(values) => values.len(),
            Column::Categorical { codes, .. } => codes.len(),
        }
    }

    /// Return `true` if the column has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Render the value at `row` as it appears in a CSV cell.
    #[must_use]
    pub fn display_value(&self, row: usize) -> String {
        match self {
            Column::Numeric(values) => values[row].to_string(),
            Column::Categorical { levels, codes } => levels[codes[row]].clone(),
        }
    }

    fn take(&self, rows: &[usize]) -> Self {
        match self {
            Column::Numeric(values) => Column::Numeric(rows.iter().map(|&r| values[r]).collect()),
            Column::Categorical { levels, codes } => Column::Categorical {
                levels: levels.clone(),
                codes: rows.iter().map(|&r| codes[r]).collect(),
            },
        }
    }
}

/// A named predictor column.
#[derive(Debug, Clone, PartialEq)]
pub struct Predictor {
    /// Column name from the CSV header.
    pub name: String,
    /// Column values.
    pub column: Column,
}

/// A complete-case regression table: one numeric response and a set of
/// typed predictors, all with the same number of rows.
///
/// Produced by [`DatasetReader`](crate::DatasetReader) or assembled
/// directly with [`Dataset::new`]. Predictor order is the schema order and
/// is preserved by every subsetting operation.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    response_name: String,
    response: Vec<f64>,
    predictors: Vec<Predictor>,
}

impl Dataset {
    /// Assemble a dataset and validate its shape.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`IoError::ColumnLengthMismatch`] | A predictor's row count differs from the response |
    /// | [`IoError::InvalidLevelCode`] | A categorical code is out of range |
    /// | [`IoError::DuplicatePredictor`] | Two predictors share a name |
    pub fn new(
        response_name: String,
        response: Vec<f64>,
        predictors: Vec<Predictor>,
    ) -> Result<Self, IoError> {
        let mut seen = HashSet::new();
        for p in &predictors {
            if !seen.insert(p.name.as_str()) {
                return Err(IoError::DuplicatePredictor {
                    name: p.name.clone(),
                });
            }
            if p.column.len() != response.len() {
                return Err(IoError::ColumnLengthMismatch {
                    column: p.name.clone(),
                    expected: response.len(),
                    got: p.column.len(),
                });
            }
            if let Column::Categorical { levels, codes } = &p.column
                && let Some(&code) = codes.iter().find(|&&c| c >= levels.len())
            {
                return Err(IoError::InvalidLevelCode {
                    column: p.name.clone(),
                    code,
                    n_levels: levels.len(),
                });
            }
        }
        Ok(Self {
            response_name,
            response,
            predictors,
        })
    }

    /// Return the response column name.
    #[must_use]
    pub fn response_name(&self) -> &str {
        &self.response_name
    }

    /// Return the response values.
    #[must_use]
    pub fn response(&self) -> &[f64] {
        &self.response
    }

    /// Return the predictors in schema order.
    #[must_use]
    pub fn predictors(&self) -> &[Predictor] {
        &self.predictors
    }

    /// Look up a predictor by name.
    #[must_use]
    pub fn predictor(&self, name: &str) -> Option<&Predictor> {
        self.predictors.iter().find(|p| p.name == name)
    }

    /// Return the predictor names in schema order.
    #[must_use]
    pub fn predictor_names(&self) -> Vec<String> {
        self.predictors.iter().map(|p| p.name.clone()).collect()
    }

    /// Return the number of rows.
    #[must_use]
    pub fn n_rows(&self) -> usize {
        self.response.len()
    }

    /// Return the number of predictor columns.
    #[must_use]
    pub fn n_predictors(&self) -> usize {
        self.predictors.len()
    }

    /// Return a new dataset containing `rows`, in the given order.
    ///
    /// Categorical level sets are carried over unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::RowOutOfRange`] if any index is past the end.
    pub fn select_rows(&self, rows: &[usize]) -> Result<Self, IoError> {
        let n_rows = self.n_rows();
        if let Some(&index) = rows.iter().find(|&&r| r >= n_rows) {
            return Err(IoError::RowOutOfRange { index, n_rows });
        }
        Ok(Self {
            response_name: self.response_name.clone(),
            response: rows.iter().map(|&r| self.response[r]).collect(),
            predictors: self
                .predictors
                .iter()
                .map(|p| Predictor {
                    name: p.name.clone(),
                    column: p.column.take(rows),
                })
                .collect(),
        })
    }

    /// Return a new dataset restricted to the named predictors.
    ///
    /// The result keeps this dataset's schema order regardless of the
    /// order of `names`.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::UnknownPredictor`] if a name is not a predictor.
    pub fn select_predictors<S: AsRef<str>>(&self, names: &[S]) -> Result<Self, IoError> {
        let wanted: HashSet<&str> = names.iter().map(AsRef::as_ref).collect();
        if let Some(missing) = wanted.iter().find(|n| self.predictor(n).is_none()) {
            return Err(IoError::UnknownPredictor {
                name: (*missing).to_string(),
            });
        }
        Ok(Self {
            response_name: self.response_name.clone(),
            response: self.response.clone(),
            predictors: self
                .predictors
                .iter()
                .filter(|p| wanted.contains(p.name.as_str()))
                .cloned()
                .collect(),
        })
    }
}
