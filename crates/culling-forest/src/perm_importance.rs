//! Permutation-based feature importance.

use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use rayon::iter::{IndexedParallelIterator, IntoParallelRefIterator, ParallelIterator};

use crate::forest::RandomForest;
use crate::tree::DecisionTree;

/// Permutation importance result for a single feature.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct PermutationImportance {
    /// Feature name.
    pub name: String,
    /// Mean increase in OOB mean squared error when this feature is permuted.
    pub importance: f64,
    /// Population standard deviation of the increase across trees.
    pub std: f64,
    /// Rank (1 = most important).
    pub rank: usize,
}

fn tree_oob_mse(
    tree: &DecisionTree,
    features: &[Vec<f64>],
    targets: &[f64],
    oob_indices: &[usize],
    permuted: Option<(usize, &[f64])>,
) -> f64 {
    let mut sample = Vec::new();
    let sse: f64 = oob_indices
        .iter()
        .enumerate()
        .map(|(pos, &idx)| {
            sample.clear();
            sample.extend_from_slice(&features[idx]);
            if let Some((feat_idx, values)) = permuted {
                sample[feat_idx] = values[pos];
            }
            let resid = targets[idx] - tree.leaf_value(&sample);
            resid * resid
        })
        .sum();
    sse / oob_indices.len() as f64
}

/// For every tree with a non-empty OOB set and every feature, shuffle the
/// feature among the OOB rows and record `permuted_mse - baseline_mse`.
///
/// Importance is the mean of those increases across trees. Each
/// (tree, feature) pair draws its permutation from its own seed, so the
/// result does not depend on thread scheduling.
pub(crate) fn compute_permutation_importance(
    forest: &RandomForest,
    features: &[Vec<f64>],
    targets: &[f64],
    oob_indices_per_tree: &[Vec<usize>],
    seed: u64,
) -> Vec<PermutationImportance> {
    let names = &forest.feature_names;
    let n_features = names.len();

    let increases: Vec<Vec<f64>> = forest
        .trees
        .par_iter()
        .zip(oob_indices_per_tree.par_iter())
        .enumerate()
        .filter(|(_, (_, oob))| !oob.is_empty())
        .map(|(tree_idx, (tree, oob_indices))| {
            let baseline = tree_oob_mse(tree, features, targets, oob_indices, None);
            (0..n_features)
                .map(|feat_idx| {
                    let rng_seed = seed
                        .wrapping_add((tree_idx as u64).wrapping_mul(n_features as u64))
                        .wrapping_add(feat_idx as u64);
                    let mut rng = ChaCha8Rng::seed_from_u64(rng_seed);
                    let mut values: Vec<f64> =
                        oob_indices.iter().map(|&i| features[i][feat_idx]).collect();
                    values.shuffle(&mut rng);
                    let permuted = tree_oob_mse(
                        tree,
                        features,
                        targets,
                        oob_indices,
                        Some((feat_idx, &values)),
                    );
                    permuted - baseline
                })
                .collect()
        })
        .collect();

    if increases.is_empty() {
        return names
            .iter()
            .enumerate()
            .map(|(i, name)| PermutationImportance {
                name: name.clone(),
                importance: 0.0,
                std: 0.0,
                rank: i + 1,
            })
            .collect();
    }

    let n_valid = increases.len() as f64;
    let mut results: Vec<PermutationImportance> = names
        .iter()
        .enumerate()
        .map(|(feat_idx, name)| {
            let mean = increases.iter().map(|t| t[feat_idx]).sum::<f64>() / n_valid;
            let variance = increases
                .iter()
                .map(|t| (t[feat_idx] - mean).powi(2))
                .sum::<f64>()
                / n_valid;
            PermutationImportance {
                name: name.clone(),
                importance: mean,
                std: variance.sqrt(),
                rank: 0,
            }
        })
        .collect();

    results.sort_by(|a, b| b.importance.total_cmp(&a.importance));
    for (i, result) in results.iter_mut().enumerate() {
        result.rank = i + 1;
    }
    results
}

#[cfg(test)]
mod tests {
    use crate::config::{MaxFeatures, RandomForestConfig};

    /// Feature 0 drives the response, feature 1 is constant.
    fn make_data() -> (Vec<Vec<f64>>, Vec<f64>, Vec<String>) {
        let features: Vec<Vec<f64>> = (0..90).map(|i| vec![i as f64 * 0.1, 0.5]).collect();
        let targets: Vec<f64> = (0..90).map(|i| (i / 30) as f64 * 10.0).collect();
        let names = vec!["informative".to_string(), "constant".to_string()];
        (features, targets, names)
    }

    #[test]
    fn informative_feature_dominates() {
        let (features, targets, names) = make_data();
        let result = RandomForestConfig::new(50)
            .unwrap()
            .with_max_features(MaxFeatures::All)
            .fit(&features, &targets, &names)
            .unwrap();
        let perm = result.permutation_importances(&features, &targets, 42);

        assert_eq!(perm.len(), 2);
        assert_eq!(perm[0].name, "informative");
        assert_eq!(perm[0].rank, 1);
        assert!(perm[0].importance > 1.0, "importance = {}", perm[0].importance);

        let constant = perm.iter().find(|p| p.name == "constant").unwrap();
        assert!(constant.importance.abs() < 1e-12);
    }

    #[test]
    fn deterministic_for_seed() {
        let (features, targets, names) = make_data();
        let result = RandomForestConfig::new(20)
            .unwrap()
            .fit(&features, &targets, &names)
            .unwrap();
        let a = result.permutation_importances(&features, &targets, 7);
        let b = result.permutation_importances(&features, &targets, 7);
        let scores = |v: &[super::PermutationImportance]| {
            v.iter().map(|p| (p.name.clone(), p.importance)).collect::<Vec<_>>()
        };
        assert_eq!(scores(&a), scores(&b));
    }
}
