//! Pearson correlation over the numeric predictors of a dataset.

use culling_io::{Column, Dataset};

use crate::error::RfeError;

/// Pearson correlation of two equal-length samples.
///
/// Returns 0 when either sample has zero variance.
#[must_use]
pub fn pearson(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len().min(y.len());
    if n == 0 {
        return 0.0;
    }
    let mean_x = x[..n].iter().sum::<f64>() / n as f64;
    let mean_y = y[..n].iter().sum::<f64>() / n as f64;

    let (mut cov, mut var_x, mut var_y) = (0.0, 0.0, 0.0);
    for (&a, &b) in x.iter().zip(y) {
        let (dx, dy) = (a - mean_x, b - mean_y);
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }
    if var_x <= 0.0 || var_y <= 0.0 {
        return 0.0;
    }
    (cov / (var_x.sqrt() * var_y.sqrt())).clamp(-1.0, 1.0)
}

/// Symmetric correlation matrix with named rows and columns.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CorrelationMatrix {
    names: Vec<String>,
    values: Vec<Vec<f64>>,
}

impl CorrelationMatrix {
    /// Correlate every pair of numeric predictors, in schema order.
    /// Categorical predictors are left out.
    #[must_use]
    pub fn from_dataset(dataset: &Dataset) -> Self {
        let numeric: Vec<(&str, &[f64])> = dataset
            .predictors()
            .iter()
            .filter_map(|p| match &p.column {
                Column::Numeric(values) => Some((p.name.as_str(), values.as_slice())),
                Column::Categorical { .. } => None,
            })
            .collect();

        let n = numeric.len();
        let mut values = vec![vec![1.0; n]; n];
        for i in 0..n {
            for j in (i + 1)..n {
                let r = pearson(numeric[i].1, numeric[j].1);
                values[i][j] = r;
                values[j][i] = r;
            }
        }
        Self {
            names: numeric.iter().map(|(name, _)| name.to_string()).collect(),
            values,
        }
    }

    /// Wrap a precomputed matrix.
    ///
    /// # Errors
    ///
    /// Returns [`RfeError::InvalidConfiguration`] if the matrix is not square
    /// with one row per name, or is not symmetric.
    pub fn from_parts(names: Vec<String>, values: Vec<Vec<f64>>) -> Result<Self, RfeError> {
        let n = names.len();
        if values.len() != n || values.iter().any(|row| row.len() != n) {
            return Err(RfeError::InvalidConfiguration {
                reason: format!("correlation matrix must be {n}x{n}"),
            });
        }
        for i in 0..n {
            for j in (i + 1)..n {
                if (values[i][j] - values[j][i]).abs() > 1e-12 {
                    return Err(RfeError::InvalidConfiguration {
                        reason: format!("correlation matrix is not symmetric at ({i}, {j})"),
                    });
                }
            }
        }
        Ok(Self { names, values })
    }

    /// Return the feature names in matrix order.
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Return the correlation between features `i` and `j`.
    #[must_use]
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.values[i][j]
    }

    /// Return the number of features.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Return `true` if the matrix has no features.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
