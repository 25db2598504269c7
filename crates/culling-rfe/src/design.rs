//! Numeric design-matrix encoding of a typed dataset.
//!
//! Numeric predictors map to one column. A categorical predictor with `k`
//! levels maps to `k` indicator columns named `{feature}={level}`. The level
//! set comes from the dataset schema, so every row subset of one dataset
//! encodes to the same columns.

use culling_io::{Column, Dataset};

/// One design column and the predictor it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesignColumn {
    /// Column name (`feature` or `feature=level`).
    pub name: String,
    /// Schema position of the source predictor.
    pub predictor: usize,
}

/// Mapping from design columns back to the original predictors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesignLayout {
    columns: Vec<DesignColumn>,
    predictor_names: Vec<String>,
}

impl DesignLayout {
    /// Derive the layout of `dataset` from its schema.
    #[must_use]
    pub fn for_dataset(dataset: &Dataset) -> Self {
        let mut columns = Vec::new();
        for (predictor, p) in dataset.predictors().iter().enumerate() {
            match &p.column {
                Column::Numeric(_) => columns.push(DesignColumn {
                    name: p.name.clone(),
                    predictor,
                }),
                Column::Categorical { levels, .. } => {
                    columns.extend(levels.iter().map(|level| DesignColumn {
                        name: format!("{}={level}", p.name),
                        predictor,
                    }));
                }
            }
        }
        Self {
            columns,
            predictor_names: dataset.predictor_names(),
        }
    }

    /// Return the design columns in order.
    #[must_use]
    pub fn columns(&self) -> &[DesignColumn] {
        &self.columns
    }

    /// Return the design column names in order.
    #[must_use]
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Return the original predictor names in schema order.
    #[must_use]
    pub fn predictor_names(&self) -> &[String] {
        &self.predictor_names
    }

    /// Return the position of the design column called `name`.
    #[must_use]
    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }
}

/// Row-major numeric encoding of a dataset plus its layout.
#[derive(Debug, Clone)]
pub struct DesignMatrix {
    /// `rows[sample][design_column]`.
    pub rows: Vec<Vec<f64>>,
    /// Column layout.
    pub layout: DesignLayout,
}

/// Encode every predictor of `dataset` into a row-major design matrix.
#[must_use]
pub fn encode(dataset: &Dataset) -> DesignMatrix {
    let layout = DesignLayout::for_dataset(dataset);
    let n_cols = layout.columns.len();
    let mut rows = vec![Vec::with_capacity(n_cols); dataset.n_rows()];

    for p in dataset.predictors() {
        match &p.column {
            Column::Numeric(values) => {
                for (row, &v) in rows.iter_mut().zip(values) {
                    row.push(v);
                }
            }
            Column::Categorical { levels, codes } => {
                for (row, &code) in rows.iter_mut().zip(codes) {
                    row.extend((0..levels.len()).map(|l| if l == code { 1.0 } else { 0.0 }));
                }
            }
        }
    }
    DesignMatrix { rows, layout }
}
