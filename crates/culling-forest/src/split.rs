use rand::Rng;

use crate::node::{FeatureIndex, Impurity};

/// Strategy for choosing split thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SplitMethod {
    /// Scan every boundary between consecutive distinct values.
    Exact,
    /// Draw one uniform threshold per candidate feature (Extremely
    /// Randomized Trees).
    ExtraTrees,
}

/// Result of finding the best split for a node.
#[derive(Debug, Clone)]
pub(crate) struct SplitResult {
    pub(crate) feature: FeatureIndex,
    pub(crate) threshold: f64,
    /// Weighted impurity decrease: `n·var - n_l·var_l - n_r·var_r`.
    pub(crate) impurity_decrease: f64,
    pub(crate) left_indices: Vec<usize>,
    pub(crate) right_indices: Vec<usize>,
}

/// Running response moments for one side of a candidate split.
#[derive(Debug, Clone, Copy, Default)]
struct Moments {
    n: usize,
    sum: f64,
    sum_sq: f64,
}

impl Moments {
    fn push(&mut self, y: f64) {
        self.n += 1;
        self.sum += y;
        self.sum_sq += y * y;
    }

    fn pop(&mut self, y: f64) {
        self.n -= 1;
        self.sum -= y;
        self.sum_sq -= y * y;
    }

    fn weighted_impurity(&self) -> f64 {
        self.n as f64 * Impurity::from_moments(self.sum, self.sum_sq, self.n).value()
    }
}

/// Pick up to `max_features` distinct feature indices with a partial
/// Fisher-Yates shuffle.
fn sample_features(n_features: usize, max_features: usize, rng: &mut impl Rng) -> Vec<usize> {
    let mut order: Vec<usize> = (0..n_features).collect();
    let take = max_features.min(n_features);
    for i in 0..take {
        let j = rng.gen_range(i..n_features);
        order.swap(i, j);
    }
    order.truncate(take);
    order
}

/// Find the best variance-reducing split among a random subset of features.
///
/// Returns `None` when no candidate feature admits a split that leaves at
/// least `min_samples_leaf` samples on each side.
///
/// `features` is column-major: `features[feature_idx][sample_idx]`, and
/// `sample_indices` index into the inner vectors.
#[allow(clippy::too_many_arguments)]
pub(crate) fn find_split(
    features: &[Vec<f64>],
    targets: &[f64],
    sample_indices: &[usize],
    method: SplitMethod,
    max_features: usize,
    min_samples_leaf: usize,
    rng: &mut impl Rng,
) -> Option<SplitResult> {
    let n_samples = sample_indices.len();
    if n_samples < 2 || features.is_empty() {
        return None;
    }

    let mut parent = Moments::default();
    for &si in sample_indices {
        parent.push(targets[si]);
    }
    let parent_weighted = parent.weighted_impurity();

    let candidates = sample_features(features.len(), max_features, rng);
    let mut best_decrease = f64::NEG_INFINITY;
    let mut best: Option<(FeatureIndex, f64)> = None;

    for feat_idx in candidates {
        let col = &features[feat_idx];
        let found = match method {
            SplitMethod::Exact => {
                best_exact_threshold(col, targets, sample_indices, parent, min_samples_leaf)
            }
            SplitMethod::ExtraTrees => {
                random_threshold(col, targets, sample_indices, min_samples_leaf, rng)
            }
        };
        if let Some((threshold, children_weighted)) = found {
            let decrease = parent_weighted - children_weighted;
            if decrease > best_decrease {
                best_decrease = decrease;
                best = Some((FeatureIndex::new(feat_idx), threshold));
            }
        }
    }

    let (feature, threshold) = best?;
    let col = &features[feature.index()];
    let (left_indices, right_indices): (Vec<usize>, Vec<usize>) =
        sample_indices.iter().partition(|&&si| col[si] <= threshold);

    Some(SplitResult {
        feature,
        threshold,
        impurity_decrease: best_decrease.max(0.0),
        left_indices,
        right_indices,
    })
}

/// Scan sorted values left to right, moving one sample at a time from the
/// right moments to the left moments.
///
/// Returns `(threshold, weighted child impurity)` of the best boundary.
fn best_exact_threshold(
    col: &[f64],
    targets: &[f64],
    sample_indices: &[usize],
    parent: Moments,
    min_samples_leaf: usize,
) -> Option<(f64, f64)> {
    let mut sorted: Vec<(f64, f64)> = sample_indices
        .iter()
        .map(|&si| (col[si], targets[si]))
        .collect();
    sorted.sort_unstable_by(|a, b| a.0.total_cmp(&b.0));

    let mut left = Moments::default();
    let mut right = parent;
    let mut best: Option<(f64, f64)> = None;

    for i in 0..sorted.len() - 1 {
        let (x, y) = sorted[i];
        left.push(y);
        right.pop(y);

        let x_next = sorted[i + 1].0;
        if x == x_next {
            continue;
        }
        if left.n < min_samples_leaf || right.n < min_samples_leaf {
            continue;
        }

        let weighted = left.weighted_impurity() + right.weighted_impurity();
        if best.is_none_or(|(_, w)| weighted < w) {
            best = Some(((x + x_next) / 2.0, weighted));
        }
    }
    best
}

/// Draw a single threshold uniformly between the node's min and max value.
fn random_threshold(
    col: &[f64],
    targets: &[f64],
    sample_indices: &[usize],
    min_samples_leaf: usize,
    rng: &mut impl Rng,
) -> Option<(f64, f64)> {
    let (lo, hi) = sample_indices
        .iter()
        .map(|&si| col[si])
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
    if lo >= hi {
        return None;
    }

    let threshold = rng.gen_range(lo..hi);
    let mut left = Moments::default();
    let mut right = Moments::default();
    for &si in sample_indices {
        if col[si] <= threshold {
            left.push(targets[si]);
        } else {
            right.push(targets[si]);
        }
    }
    if left.n < min_samples_leaf || right.n < min_samples_leaf {
        return None;
    }
    Some((threshold, left.weighted_impurity() + right.weighted_impurity()))
}
