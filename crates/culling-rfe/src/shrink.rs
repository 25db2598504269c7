//! Keep the top-K predictors and rank the rest.

use crate::aggregate::FeatureImportance;
use crate::error::RfeError;

/// A feature and the elimination rank it received in one resample.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RankEntry {
    /// Predictor name.
    pub feature: String,
    /// Elimination rank; 1 means retained to the end.
    pub rank: usize,
}

/// Outcome of one shrinking step.
#[derive(Debug, Clone, PartialEq)]
pub struct Shrinkage {
    /// Kept predictors, in the input order.
    pub kept: Vec<String>,
    /// Eliminated predictors with their rank, most important first.
    pub eliminated: Vec<RankEntry>,
}

/// Keep the `keep` most important features and rank the others `rank`.
///
/// Sorting is by descending importance and stable, so ties keep the input
/// (schema) order.
///
/// # Errors
///
/// Returns [`RfeError::InsufficientFeatures`] if `keep` exceeds the number
/// of features.
pub fn shrink(
    importances: &[FeatureImportance],
    keep: usize,
    rank: usize,
) -> Result<Shrinkage, RfeError> {
    if keep > importances.len() {
        return Err(RfeError::InsufficientFeatures {
            requested: keep,
            available: importances.len(),
        });
    }

    let mut order: Vec<usize> = (0..importances.len()).collect();
    order.sort_by(|&a, &b| importances[b].importance.total_cmp(&importances[a].importance));

    let mut is_kept = vec![false; importances.len()];
    for &i in &order[..keep] {
        is_kept[i] = true;
    }

    Ok(Shrinkage {
        kept: importances
            .iter()
            .zip(&is_kept)
            .filter(|(_, k)| **k)
            .map(|(f, _)| f.feature.clone())
            .collect(),
        eliminated: order[keep..]
            .iter()
            .map(|&i| RankEntry {
                feature: importances[i].feature.clone(),
                rank,
            })
            .collect(),
    })
}
