//! Consolidate checkpoints into rank and performance tables.

use std::collections::BTreeMap;

use culling_forest::RegressionMetrics;
use tracing::{debug, instrument};

use crate::checkpoint::Checkpoint;
use crate::error::RfeError;

/// Evaluation population of a performance record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub enum EvalType {
    /// Internal cross-validation.
    Train,
    /// Outer holdout.
    Test,
    /// Constant-mean baseline.
    Null,
}

/// Regression metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub enum Metric {
    /// Root mean squared error.
    Rmse,
    /// Mean absolute error.
    Mae,
    /// Coefficient of determination.
    RSquared,
}

impl Metric {
    /// All metrics in table order.
    pub const ALL: [Metric; 3] = [Metric::Rmse, Metric::Mae, Metric::RSquared];

    /// Extract this metric from a record.
    #[must_use]
    pub fn of(self, m: &RegressionMetrics) -> f64 {
        match self {
            Metric::Rmse => m.rmse,
            Metric::Mae => m.mae,
            Metric::RSquared => m.r_squared,
        }
    }
}

/// Mean, sample standard deviation and standard error of a set of values.
///
/// `sd` and `se` are `None` when fewer than two values contribute.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Summary {
    /// Arithmetic mean.
    pub mean: f64,
    /// Sample standard deviation (n - 1 denominator).
    pub sd: Option<f64>,
    /// `sd / sqrt(count)`.
    pub se: Option<f64>,
    /// Number of values.
    pub count: usize,
}

impl Summary {
    /// Summarize `values`; `None` if empty.
    #[must_use]
    pub fn of(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let count = values.len();
        let n = count as f64;
        let mean = values.iter().sum::<f64>() / n;
        let (sd, se) = if count >= 2 {
            let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
            let sd = var.sqrt();
            (Some(sd), Some(sd / n.sqrt()))
        } else {
            (None, None)
        };
        Some(Self {
            mean,
            sd,
            se,
            count,
        })
    }
}

/// One row of the performance table.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PerformanceRow {
    /// Subset-size label; 0 for the null baseline.
    pub subset_size: usize,
    /// Evaluation population.
    pub eval_type: EvalType,
    /// Metric.
    pub metric: Metric,
    /// Summary across resamples.
    #[serde(flatten)]
    pub summary: Summary,
}

/// Performance summaries per subset size, evaluation type and metric.
///
/// Train and Test rows come first, ascending by subset size; the Null rows
/// follow at subset size 0.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PerformanceTable {
    /// Table rows.
    pub rows: Vec<PerformanceRow>,
}

impl PerformanceTable {
    /// Return the row for a cell, if present.
    #[must_use]
    pub fn get(&self, subset_size: usize, eval_type: EvalType, metric: Metric) -> Option<&PerformanceRow> {
        self.rows
            .iter()
            .find(|r| r.subset_size == subset_size && r.eval_type == eval_type && r.metric == metric)
    }

    /// Return the distinct subset sizes present, ascending.
    #[must_use]
    pub fn subset_sizes(&self) -> Vec<usize> {
        let mut sizes: Vec<usize> = self.rows.iter().map(|r| r.subset_size).collect();
        sizes.sort_unstable();
        sizes.dedup();
        sizes
    }

    /// Return the subset size with the best mean Test value of `metric`
    /// (lowest error, highest R²). Ties favor the smaller subset.
    #[must_use]
    pub fn best_subset_size(&self, metric: Metric) -> Option<usize> {
        let better = |a: f64, b: f64| match metric {
            Metric::RSquared => a > b,
            Metric::Rmse | Metric::Mae => a < b,
        };
        self.rows
            .iter()
            .filter(|r| r.eval_type == EvalType::Test && r.metric == metric)
            .fold(None::<&PerformanceRow>, |best, r| match best {
                Some(b) if !better(r.summary.mean, b.summary.mean) => Some(b),
                _ => Some(r),
            })
            .map(|r| r.subset_size)
    }
}

/// One row of the rank table.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RankRow {
    /// Predictor name.
    pub feature: String,
    /// Rank in each resample (aligned with [`RankTable::resamples`]);
    /// `None` where the feature was absent.
    pub ranks: Vec<Option<usize>>,
    /// Summary over the present ranks.
    #[serde(flatten)]
    pub summary: Summary,
}

/// Elimination-rank summaries per feature, ascending by mean rank.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RankTable {
    /// Resample indices, one per rank column.
    pub resamples: Vec<usize>,
    /// Rows, most important first; ties broken by feature name.
    pub rows: Vec<RankRow>,
}

impl RankTable {
    /// Return the feature names in table order.
    #[must_use]
    pub fn features(&self) -> Vec<String> {
        self.rows.iter().map(|r| r.feature.clone()).collect()
    }

    /// Return the table position of `feature`.
    #[must_use]
    pub fn position(&self, feature: &str) -> Option<usize> {
        self.rows.iter().position(|r| r.feature == feature)
    }

    /// Return the `k` most important features.
    #[must_use]
    pub fn top(&self, k: usize) -> Vec<String> {
        self.rows.iter().take(k).map(|r| r.feature.clone()).collect()
    }
}

/// Merge checkpoints (in any order) into performance and rank tables.
///
/// # Errors
///
/// Returns [`RfeError::NoCheckpoints`] if `checkpoints` is empty.
#[instrument(skip_all, fields(n_checkpoints = checkpoints.len()))]
pub fn tidy(checkpoints: &[Checkpoint]) -> Result<(PerformanceTable, RankTable), RfeError> {
    if checkpoints.is_empty() {
        return Err(RfeError::NoCheckpoints);
    }
    let mut sorted: Vec<&Checkpoint> = checkpoints.iter().collect();
    sorted.sort_by_key(|c| c.resample);

    let performance = performance_table(&sorted);
    let ranks = rank_table(&sorted);
    debug!(
        n_performance_rows = performance.rows.len(),
        n_rank_rows = ranks.rows.len(),
        "tidy complete"
    );
    Ok((performance, ranks))
}

fn performance_table(checkpoints: &[&Checkpoint]) -> PerformanceTable {
    let mut cells: BTreeMap<(usize, EvalType, Metric), Vec<f64>> = BTreeMap::new();
    for cp in checkpoints {
        for (step, &size) in cp.subset_sizes.iter().enumerate() {
            for (eval_type, records) in [(EvalType::Train, &cp.train), (EvalType::Test, &cp.test)] {
                let Some(record) = records.get(step) else {
                    continue;
                };
                for metric in Metric::ALL {
                    cells
                        .entry((size, eval_type, metric))
                        .or_default()
                        .push(metric.of(record));
                }
            }
        }
    }

    let mut rows: Vec<PerformanceRow> = cells
        .into_iter()
        .filter_map(|((subset_size, eval_type, metric), values)| {
            Summary::of(&values).map(|summary| PerformanceRow {
                subset_size,
                eval_type,
                metric,
                summary,
            })
        })
        .collect();

    // The baseline does not depend on the subset, so each resample
    // contributes the mean over its steps.
    for metric in Metric::ALL {
        let per_resample: Vec<f64> = checkpoints
            .iter()
            .filter_map(|cp| {
                let values: Vec<f64> = cp.null.iter().map(|m| metric.of(m)).collect();
                Summary::of(&values).map(|s| s.mean)
            })
            .collect();
        if let Some(summary) = Summary::of(&per_resample) {
            rows.push(PerformanceRow {
                subset_size: 0,
                eval_type: EvalType::Null,
                metric,
                summary,
            });
        }
    }
    PerformanceTable { rows }
}

fn rank_table(checkpoints: &[&Checkpoint]) -> RankTable {
    let n = checkpoints.len();
    let mut by_feature: BTreeMap<&str, Vec<Option<usize>>> = BTreeMap::new();
    for (col, cp) in checkpoints.iter().enumerate() {
        for entry in &cp.ranks {
            by_feature.entry(entry.feature.as_str()).or_insert_with(|| vec![None; n])[col] =
                Some(entry.rank);
        }
    }

    let mut rows: Vec<RankRow> = by_feature
        .into_iter()
        .filter_map(|(feature, ranks)| {
            let present: Vec<f64> = ranks.iter().flatten().map(|&r| r as f64).collect();
            Summary::of(&present).map(|summary| RankRow {
                feature: feature.to_string(),
                ranks,
                summary,
            })
        })
        .collect();
    // BTreeMap order makes the stable sort break ties by name.
    rows.sort_by(|a, b| a.summary.mean.total_cmp(&b.summary.mean));

    RankTable {
        resamples: checkpoints.iter().map(|c| c.resample).collect(),
        rows,
    }
}
