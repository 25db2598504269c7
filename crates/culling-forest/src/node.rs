use std::fmt;

/// Zero-based feature column index.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
    serde::Serialize, serde::Deserialize,
)]
pub struct FeatureIndex(usize);

impl FeatureIndex {
    pub(crate) fn new(index: usize) -> Self {
        Self(index)
    }

    /// Return the zero-based feature column index.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for FeatureIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Index into a `Vec<Node>` arena.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
    serde::Serialize, serde::Deserialize,
)]
pub struct NodeIndex(usize);

impl NodeIndex {
    pub(crate) fn new(index: usize) -> Self {
        Self(index)
    }

    /// Return the zero-based arena index.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Node impurity, measured as the variance of the response among the
/// training samples that reached the node.
#[derive(
    Debug, Clone, Copy, PartialEq, PartialOrd,
    serde::Serialize, serde::Deserialize,
)]
pub struct Impurity(f64);

impl Impurity {
    pub(crate) fn new(value: f64) -> Self {
        Self(value)
    }

    /// Compute the variance impurity from a running sum and sum of squares.
    ///
    /// Clamped at zero so floating-point cancellation never yields a
    /// negative variance.
    pub(crate) fn from_moments(sum: f64, sum_sq: f64, n: usize) -> Self {
        if n == 0 {
            return Self(0.0);
        }
        let n = n as f64;
        let mean = sum / n;
        Self((sum_sq / n - mean * mean).max(0.0))
    }

    /// Return the raw impurity value.
    #[must_use]
    pub fn value(self) -> f64 {
        self.0
    }
}

impl fmt::Display for Impurity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}", self.0)
    }
}

/// A node in a regression tree arena.
///
/// Children are referenced by [`NodeIndex`] rather than pointers, so a
/// tree is a flat `Vec<Node>` that serializes without any fix-up.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum Node {
    /// An interior split node.
    Split {
        /// Feature used for the split.
        feature: FeatureIndex,
        /// Samples with `feature <= threshold` go left.
        threshold: f64,
        /// Index of the left child node.
        left: NodeIndex,
        /// Index of the right child node.
        right: NodeIndex,
        /// Impurity at this node before splitting.
        impurity: Impurity,
        /// Number of training samples that reached this node.
        n_samples: usize,
        /// Weighted decrease in impurity from this split.
        impurity_decrease: f64,
    },
    /// A terminal leaf node.
    Leaf {
        /// Mean response of the training samples in this leaf.
        value: f64,
        /// Impurity at this leaf.
        impurity: Impurity,
        /// Number of training samples in this leaf.
        n_samples: usize,
    },
}

impl Node {
    /// Return the impurity at this node (before splitting for interior nodes).
    #[must_use]
    pub fn impurity(&self) -> Impurity {
        match self {
            Node::Split { impurity, .. } | Node::Leaf { impurity, .. } => *impurity,
        }
    }

    /// Return the number of training samples that reached this node.
    #[must_use]
    pub fn n_samples(&self) -> usize {
        match self {
            Node::Split { n_samples, .. } | Node::Leaf { n_samples, .. } => *n_samples,
        }
    }

    /// Return `true` if this node is a leaf.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::{FeatureIndex, Impurity, Node, NodeIndex};

    #[test]
    fn feature_index_display() {
        assert_eq!(format!("{}", FeatureIndex::new(3)), "3");
    }

    #[test]
    fn node_index_ordering() {
        assert!(NodeIndex::new(10) < NodeIndex::new(20));
    }

    #[test]
    fn impurity_display() {
        assert_eq!(format!("{}", Impurity::new(0.333333)), "0.333333");
    }

    #[test]
    fn impurity_from_moments_matches_variance() {
        // values 1, 2, 3, 4: mean 2.5, population variance 1.25
        let imp = Impurity::from_moments(10.0, 30.0, 4);
        assert!((imp.value() - 1.25).abs() < 1e-12);
    }

    #[test]
    fn impurity_from_moments_constant_is_zero() {
        let imp = Impurity::from_moments(21.0, 147.0, 3);
        assert!(imp.value().abs() < 1e-12);
        assert_eq!(Impurity::from_moments(0.0, 0.0, 0).value(), 0.0);
    }

    #[test]
    fn leaf_and_split_accessors() {
        let leaf = Node::Leaf {
            value: 2.5,
            impurity: Impurity::new(0.4),
            n_samples: 10,
        };
        let split = Node::Split {
            feature: FeatureIndex::new(2),
            threshold: 3.5,
            left: NodeIndex::new(1),
            right: NodeIndex::new(2),
            impurity: Impurity::new(0.9),
            n_samples: 20,
            impurity_decrease: 6.0,
        };
        assert!(leaf.is_leaf());
        assert!(!split.is_leaf());
        assert_eq!(leaf.n_samples(), 10);
        assert_eq!(split.n_samples(), 20);
        assert!((split.impurity().value() - 0.9).abs() < f64::EPSILON);
    }
}
