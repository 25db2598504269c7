//! Out-of-bag (OOB) evaluation for Random Forest regression.

use crate::error::RfError;
use crate::metrics::RegressionMetrics;
use crate::tree::DecisionTree;

/// Out-of-bag evaluation result.
#[derive(Debug, Clone)]
pub struct OobScore {
    /// Metrics over samples that had at least one OOB tree.
    pub metrics: RegressionMetrics,
    /// OOB prediction per training sample, `None` when every tree saw it.
    pub predictions: Vec<Option<f64>>,
    /// Number of samples that had at least one OOB tree.
    pub n_oob_samples: usize,
}

/// Average each sample's predictions over the trees that did not train on it.
pub(crate) fn compute_oob(
    trees: &[DecisionTree],
    features: &[Vec<f64>],
    targets: &[f64],
    oob_indices_per_tree: &[Vec<usize>],
) -> Result<OobScore, RfError> {
    let n_samples = features.len();
    let mut sums = vec![0.0f64; n_samples];
    let mut counts = vec![0usize; n_samples];

    for (tree, oob_indices) in trees.iter().zip(oob_indices_per_tree) {
        for &sample_idx in oob_indices {
            sums[sample_idx] += tree.predict(&features[sample_idx])?;
            counts[sample_idx] += 1;
        }
    }

    let predictions: Vec<Option<f64>> = sums
        .iter()
        .zip(&counts)
        .map(|(&s, &c)| (c > 0).then(|| s / c as f64))
        .collect();

    let (observed, predicted): (Vec<f64>, Vec<f64>) = predictions
        .iter()
        .zip(targets)
        .filter_map(|(p, &y)| p.map(|p| (y, p)))
        .unzip();

    if observed.is_empty() {
        return Err(RfError::OobEvaluationFailed {
            reason: "no sample has any OOB tree".to_string(),
        });
    }

    Ok(OobScore {
        metrics: RegressionMetrics::compute(&observed, &predicted)?,
        n_oob_samples: observed.len(),
        predictions,
    })
}
