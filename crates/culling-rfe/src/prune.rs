//! Correlation pruning between elimination runs.

use culling_io::Dataset;
use tracing::{debug, info, instrument};

use crate::correlation::CorrelationMatrix;
use crate::error::RfeError;
use crate::tidy::RankTable;

/// Correlation threshold of one pruning pass.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum PrunePass {
    /// First pass over the full feature set: |r| > 0.925.
    First,
    /// Later passes over an already reduced set: |r| > 0.85.
    Subsequent,
    /// Explicit threshold.
    Threshold(f64),
}

impl PrunePass {
    /// Return the absolute-correlation threshold.
    #[must_use]
    pub fn threshold(self) -> f64 {
        match self {
            PrunePass::First => 0.925,
            PrunePass::Subsequent => 0.85,
            PrunePass::Threshold(t) => t,
        }
    }
}

/// A correlated pair and which member was dropped.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CorrelatedPair {
    /// Better-ranked member.
    pub kept: String,
    /// Worse-ranked member, marked for removal.
    pub dropped: String,
    /// Pearson correlation.
    pub correlation: f64,
}

/// Result of a pruning pass.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PruneReport {
    /// Absolute-correlation threshold used.
    pub threshold: f64,
    /// Every pair above the threshold, in matrix order.
    pub pairs: Vec<CorrelatedPair>,
    /// Unique dropped features in first-marked order.
    pub dropped: Vec<String>,
}

impl PruneReport {
    /// Return `dataset` without the dropped predictors.
    ///
    /// # Errors
    ///
    /// Returns [`RfeError::Dataset`] if a dropped name is not a predictor.
    pub fn apply(&self, dataset: &Dataset) -> Result<Dataset, RfeError> {
        let keep: Vec<String> = dataset
            .predictor_names()
            .into_iter()
            .filter(|n| !self.dropped.contains(n))
            .collect();
        Ok(dataset.select_predictors(&keep)?)
    }
}

/// Keep the response and the `top` best-ranked predictors of `dataset`,
/// in schema order. This is the input of the next elimination run, before
/// correlation pruning.
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`RfeError::InvalidConfiguration`] | `top` is zero |
/// | [`RfeError::Dataset`] | A selected feature is not a predictor of `dataset` |
#[instrument(skip_all, fields(top = top, n_ranked = ranks.rows.len()))]
pub fn select_top(dataset: &Dataset, ranks: &RankTable, top: usize) -> Result<Dataset, RfeError> {
    if top == 0 {
        return Err(RfeError::InvalidConfiguration {
            reason: "top-K selection needs at least one feature".into(),
        });
    }
    let reduced = dataset.select_predictors(&ranks.top(top))?;
    debug!(n_kept = reduced.n_predictors(), "top-ranked predictors selected");
    Ok(reduced)
}

/// Mark the lower-ranked member of every pair with |r| above the pass
/// threshold.
///
/// "Lower-ranked" means later in `ranks` order (larger mean rank). Every
/// pair is considered, including pairs whose better member is itself
/// dropped by another pair. Features outside `matrix` are never dropped.
///
/// # Errors
///
/// Returns [`RfeError::UnknownFeature`] if a matrix feature is missing from
/// `ranks`.
#[instrument(skip_all, fields(n_features = matrix.len(), threshold = pass.threshold()))]
pub fn prune(
    matrix: &CorrelationMatrix,
    ranks: &RankTable,
    pass: PrunePass,
) -> Result<PruneReport, RfeError> {
    let threshold = pass.threshold();
    let positions: Vec<usize> = matrix
        .names()
        .iter()
        .map(|name| {
            ranks
                .position(name)
                .ok_or_else(|| RfeError::UnknownFeature { name: name.clone() })
        })
        .collect::<Result<_, _>>()?;

    let names = matrix.names();
    let mut pairs = Vec::new();
    let mut dropped: Vec<String> = Vec::new();
    for i in 0..matrix.len() {
        for j in (i + 1)..matrix.len() {
            let r = matrix.get(i, j);
            if r.abs() <= threshold {
                continue;
            }
            let (keep, drop) = if positions[i] < positions[j] { (i, j) } else { (j, i) };
            debug!(kept = %names[keep], dropped = %names[drop], r, "correlated pair");
            if !dropped.contains(&names[drop]) {
                dropped.push(names[drop].clone());
            }
            pairs.push(CorrelatedPair {
                kept: names[keep].clone(),
                dropped: names[drop].clone(),
                correlation: r,
            });
        }
    }

    info!(n_pairs = pairs.len(), n_dropped = dropped.len(), "pruning complete");
    Ok(PruneReport {
        threshold,
        pairs,
        dropped,
    })
}
