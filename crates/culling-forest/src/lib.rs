//! Random Forest regression: train, evaluate, predict.
//!
//! Provides a hand-rolled Random Forest regressor with CART trees grown by
//! variance reduction, parallel training via rayon, out-of-bag scoring,
//! impurity and permutation feature importance, stratified k-fold
//! cross-validation, and model serialization.

mod config;
mod error;
mod eval;
mod forest;
mod importance;
mod metrics;
mod node;
mod oob;
mod perm_importance;
mod predict;
mod result;
mod serialize;
mod split;
mod tree;

pub use config::{MaxFeatures, OobMode, RandomForestConfig};
pub use error::RfError;
pub use eval::{CrossValidation, CrossValidationResult, quantile_strata};
pub use forest::RandomForest;
pub use importance::RankedFeature;
pub use metrics::RegressionMetrics;
pub use node::{FeatureIndex, Impurity, Node, NodeIndex};
pub use oob::OobScore;
pub use perm_importance::PermutationImportance;
pub use result::RandomForestResult;
pub use split::SplitMethod;
pub use tree::{DecisionTree, DecisionTreeConfig};
