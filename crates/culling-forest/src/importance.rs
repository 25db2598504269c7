//! Feature importance aggregation across trees.

/// A ranked feature with name, importance score, and rank.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RankedFeature {
    /// Feature name.
    pub name: String,
    /// Normalized importance score (sums to 1.0 across all features).
    pub importance: f64,
    /// 1-based rank (1 = most important).
    pub rank: usize,
}

/// Sum per-tree importances and normalize the totals to 1.0.
///
/// The result is in column order; an all-zero vector is returned unchanged
/// when no tree made a split.
pub(crate) fn mean_importances(per_tree: &[Vec<f64>], n_features: usize) -> Vec<f64> {
    let mut totals = vec![0.0f64; n_features];
    for tree_imp in per_tree {
        for (total, &val) in totals.iter_mut().zip(tree_imp) {
            *total += val;
        }
    }
    let sum: f64 = totals.iter().sum();
    if sum > 0.0 {
        totals.iter_mut().for_each(|v| *v /= sum);
    }
    totals
}

/// Aggregate per-tree feature importances into ranked features.
///
/// Sorting is stable, so equally important features keep column order.
pub(crate) fn aggregate_importances(
    per_tree: &[Vec<f64>],
    names: &[String],
) -> Vec<RankedFeature> {
    if per_tree.is_empty() || names.is_empty() {
        return vec![];
    }
    let totals = mean_importances(per_tree, names.len());
    rank_features(names, &totals)
}

/// Pair names with scores, sort descending and assign 1-based ranks.
pub(crate) fn rank_features(names: &[String], scores: &[f64]) -> Vec<RankedFeature> {
    let mut features: Vec<RankedFeature> = names
        .iter()
        .zip(scores)
        .map(|(name, &importance)| RankedFeature {
            name: name.clone(),
            importance,
            rank: 0,
        })
        .collect();

    features.sort_by(|a, b| b.importance.total_cmp(&a.importance));
    for (i, feat) in features.iter_mut().enumerate() {
        feat.rank = i + 1;
    }
    features
}
