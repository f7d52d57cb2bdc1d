//! CART regression tree on squared error

use crate::error::{ForecastError, Result};
use rand::seq::index;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Improvements below this are treated as no improvement
const MIN_GAIN: f64 = 1e-14;

/// Growth limits for a single tree
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TreeParams {
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features drawn per split (None = all)
    pub max_features: Option<usize>,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            max_depth: 3,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
        }
    }
}

/// Tree node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TreeNode {
    Leaf {
        value: f64,
        n_samples: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
}

impl TreeNode {
    fn predict(&self, features: &[f64]) -> f64 {
        let mut node = self;
        loop {
            match node {
                TreeNode::Leaf { value, .. } => return *value,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if features[*feature] <= *threshold {
                        left
                    } else {
                        right
                    };
                }
            }
        }
    }

    pub fn depth(&self) -> usize {
        match self {
            TreeNode::Leaf { .. } => 0,
            TreeNode::Split { left, right, .. } => 1 + left.depth().max(right.depth()),
        }
    }

    pub fn n_leaves(&self) -> usize {
        match self {
            TreeNode::Leaf { .. } => 1,
            TreeNode::Split { left, right, .. } => left.n_leaves() + right.n_leaves(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct BestSplit {
    feature: usize,
    threshold: f64,
    score: f64,
}

/// Fitted regression tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    n_features: usize,
    root: TreeNode,
}

impl RegressionTree {
    /// Grow a tree on the rows listed in `sample`.
    ///
    /// `features` and `targets` cover the whole training set; `sample` picks
    /// the rows this tree sees. `rng` is only used when `max_features`
    /// restricts the candidate features.
    pub fn fit<R: Rng>(
        features: &[Vec<f64>],
        targets: &[f64],
        sample: &[usize],
        params: &TreeParams,
        rng: &mut R,
    ) -> Result<Self> {
        if sample.is_empty() {
            return Err(ForecastError::ModelError(
                "Cannot grow a tree on an empty sample".to_string(),
            ));
        }
        let n_features = features.first().map(Vec::len).unwrap_or(0);

        let mut grower = Grower {
            features,
            targets,
            params,
            n_features,
            rng,
        };
        let root = grower.grow(sample.to_vec(), 0);

        Ok(Self { n_features, root })
    }

    pub fn predict(&self, features: &[f64]) -> f64 {
        self.root.predict(features)
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn root(&self) -> &TreeNode {
        &self.root
    }
}

struct Grower<'a, R> {
    features: &'a [Vec<f64>],
    targets: &'a [f64],
    params: &'a TreeParams,
    n_features: usize,
    rng: &'a mut R,
}

impl<R: Rng> Grower<'_, R> {
    fn grow(&mut self, rows: Vec<usize>, depth: usize) -> TreeNode {
        let n = rows.len();
        let sum: f64 = rows.iter().map(|&i| self.targets[i]).sum();
        let leaf = TreeNode::Leaf {
            value: sum / n as f64,
            n_samples: n,
        };

        if depth >= self.params.max_depth
            || n < self.params.min_samples_split
            || n < 2 * self.params.min_samples_leaf
        {
            return leaf;
        }

        let Some(best) = self.best_split(&rows, sum) else {
            return leaf;
        };

        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .into_iter()
            .partition(|&i| self.features[i][best.feature] <= best.threshold);

        TreeNode::Split {
            feature: best.feature,
            threshold: best.threshold,
            left: Box::new(self.grow(left_rows, depth + 1)),
            right: Box::new(self.grow(right_rows, depth + 1)),
        }
    }

    fn candidate_features(&mut self) -> Vec<usize> {
        match self.params.max_features {
            Some(k) if k < self.n_features => {
                let mut picked = index::sample(&mut *self.rng, self.n_features, k).into_vec();
                picked.sort_unstable();
                picked
            }
            _ => (0..self.n_features).collect(),
        }
    }

    /// Split maximising `sum_l²/n_l + sum_r²/n_r`, which is the split with the
    /// lowest total squared error. Ties keep the first candidate found.
    fn best_split(&mut self, rows: &[usize], total: f64) -> Option<BestSplit> {
        let n = rows.len();
        let min_leaf = self.params.min_samples_leaf.max(1);
        let parent_score = total * total / n as f64;
        let mut best: Option<BestSplit> = None;

        let mut order = rows.to_vec();
        for feature in self.candidate_features() {
            let column = |i: usize| self.features[i][feature];
            order.sort_by(|&a, &b| column(a).total_cmp(&column(b)));

            let mut left_sum = 0.0;
            for split_at in 1..n {
                left_sum += self.targets[order[split_at - 1]];
                let left_n = split_at;
                let right_n = n - split_at;
                if left_n < min_leaf || right_n < min_leaf {
                    continue;
                }

                let lower = column(order[split_at - 1]);
                let upper = column(order[split_at]);
                if lower >= upper {
                    continue;
                }

                let right_sum = total - left_sum;
                let score = left_sum * left_sum / left_n as f64
                    + right_sum * right_sum / right_n as f64;
                if best.map_or(true, |b| score > b.score) {
                    let midpoint = lower + (upper - lower) / 2.0;
                    best = Some(BestSplit {
                        feature,
                        threshold: if midpoint < upper { midpoint } else { lower },
                        score,
                    });
                }
            }
        }

        best.filter(|b| b.score - parent_score > MIN_GAIN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::seeded_rng;

    fn fit_all(features: &[Vec<f64>], targets: &[f64], params: TreeParams) -> RegressionTree {
        let sample: Vec<usize> = (0..targets.len()).collect();
        RegressionTree::fit(features, targets, &sample, &params, &mut seeded_rng(42)).unwrap()
    }

    #[test]
    fn test_tree_finds_step() {
        let features: Vec<Vec<f64>> = (0..10).map(|i| vec![i as f64]).collect();
        let targets: Vec<f64> = (0..10).map(|i| if i < 5 { -1.0 } else { 1.0 }).collect();

        let tree = fit_all(&features, &targets, TreeParams::default());

        assert_eq!(tree.predict(&[2.0]), -1.0);
        assert_eq!(tree.predict(&[7.0]), 1.0);
        match tree.root() {
            TreeNode::Split { feature, threshold, .. } => {
                assert_eq!(*feature, 0);
                assert_eq!(*threshold, 4.5);
            }
            leaf => panic!("expected a split, got {:?}", leaf),
        }
    }

    #[test]
    fn test_tree_respects_max_depth() {
        let features: Vec<Vec<f64>> = (0..64).map(|i| vec![i as f64, (i % 7) as f64]).collect();
        let targets: Vec<f64> = (0..64).map(|i| ((i * 37) % 11) as f64).collect();

        let tree = fit_all(&features, &targets, TreeParams::default());
        assert!(tree.root().depth() <= 3);
        assert!(tree.root().n_leaves() <= 8);
    }

    #[test]
    fn test_constant_targets_give_single_leaf() {
        let features: Vec<Vec<f64>> = (0..6).map(|i| vec![i as f64]).collect();
        let tree = fit_all(&features, &[2.5; 6], TreeParams::default());

        assert_eq!(tree.root().n_leaves(), 1);
        assert_eq!(tree.predict(&[100.0]), 2.5);
    }

    #[test]
    fn test_min_samples_leaf_is_honoured() {
        let features: Vec<Vec<f64>> = (0..6).map(|i| vec![i as f64]).collect();
        let targets = [10.0, 0.0, 0.0, 0.0, 0.0, 0.0];
        let params = TreeParams {
            max_depth: 1,
            min_samples_leaf: 2,
            ..TreeParams::default()
        };

        let tree = fit_all(&features, &targets, params);
        match tree.root() {
            TreeNode::Split { threshold, .. } => assert_eq!(*threshold, 1.5),
            leaf => panic!("expected a split, got {:?}", leaf),
        }
    }
}
