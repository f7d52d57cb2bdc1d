//! Gradient boosted regression trees on squared loss

use super::tree::{RegressionTree, TreeParams};
use super::{check_training_set, Regressor, TrainedRegressor};
use crate::error::{ForecastError, Result};
use crate::utils::seeded_rng;
use rand::seq::index;
use rand::Rng;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use tracing::debug;

/// Deepest tree accepted; keeps serialized artifacts within serde_json's
/// recursion limit.
const MAX_TREE_DEPTH: usize = 32;

/// Boosting hyper-parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GradientBoostingParams {
    /// Number of boosting stages (trees)
    pub n_estimators: usize,
    /// Shrinkage applied to every tree's output
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Fraction of rows drawn (without replacement) for each tree
    pub subsample: f64,
    /// Features considered per split (None = all)
    pub max_features: Option<usize>,
}

impl Default for GradientBoostingParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 3,
            min_samples_split: 2,
            min_samples_leaf: 1,
            subsample: 1.0,
            max_features: None,
        }
    }
}

impl GradientBoostingParams {
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(ForecastError::InvalidConfig(msg.to_string()));

        if self.n_estimators == 0 {
            return invalid("n_estimators must be positive");
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return invalid("learning_rate must be a positive number");
        }
        if self.max_depth == 0 || self.max_depth > MAX_TREE_DEPTH {
            return Err(ForecastError::InvalidConfig(format!(
                "max_depth must be within 1..={}",
                MAX_TREE_DEPTH
            )));
        }
        if self.min_samples_split < 2 {
            return invalid("min_samples_split must be at least 2");
        }
        if self.min_samples_leaf == 0 {
            return invalid("min_samples_leaf must be positive");
        }
        if !(self.subsample > 0.0 && self.subsample <= 1.0) {
            return invalid("subsample must be within (0, 1]");
        }
        if self.max_features == Some(0) {
            return invalid("max_features must be positive");
        }
        Ok(())
    }

    fn tree_params(&self) -> TreeParams {
        TreeParams {
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split,
            min_samples_leaf: self.min_samples_leaf,
            max_features: self.max_features,
        }
    }
}

/// Unfitted gradient boosting regressor
#[derive(Debug, Clone, PartialEq)]
pub struct GradientBoostingRegressor {
    params: GradientBoostingParams,
    seed: u64,
}

impl GradientBoostingRegressor {
    pub fn new(params: GradientBoostingParams, seed: u64) -> Self {
        Self { params, seed }
    }

    pub fn params(&self) -> &GradientBoostingParams {
        &self.params
    }

    fn draw_rows<R: Rng>(&self, n: usize, rng: &mut R) -> Vec<usize> {
        if self.params.subsample >= 1.0 {
            return (0..n).collect();
        }
        let amount = ((n as f64 * self.params.subsample).round() as usize).clamp(1, n);
        let mut rows = index::sample(rng, n, amount).into_vec();
        rows.sort_unstable();
        rows
    }
}

impl Default for GradientBoostingRegressor {
    fn default() -> Self {
        Self::new(GradientBoostingParams::default(), 42)
    }
}

impl Regressor for GradientBoostingRegressor {
    type Model = GradientBoostingModel;

    fn fit(&self, features: &[Vec<f64>], targets: &[f64]) -> Result<GradientBoostingModel> {
        self.params.validate()?;
        let n_features = check_training_set(features, targets)?;
        let n = targets.len();

        let init = targets.iter().mean();
        let tree_params = self.params.tree_params();
        let mut rng = seeded_rng(self.seed);
        let mut predictions = vec![init; n];
        let mut trees = Vec::with_capacity(self.params.n_estimators);

        for _ in 0..self.params.n_estimators {
            let residuals: Vec<f64> = targets
                .iter()
                .zip(&predictions)
                .map(|(y, p)| y - p)
                .collect();
            let rows = self.draw_rows(n, &mut rng);
            let tree = RegressionTree::fit(features, &residuals, &rows, &tree_params, &mut rng)?;

            for (prediction, row) in predictions.iter_mut().zip(features) {
                *prediction += self.params.learning_rate * tree.predict(row);
            }
            trees.push(tree);
        }

        debug!(
            rows = n,
            trees = trees.len(),
            train_rmse = targets
                .iter()
                .zip(&predictions)
                .map(|(y, p)| y - p)
                .quadratic_mean(),
            "Fitted gradient boosting model"
        );

        Ok(GradientBoostingModel {
            init,
            learning_rate: self.params.learning_rate,
            n_features,
            trees,
        })
    }

    fn name(&self) -> &str {
        "gradient_boosting"
    }
}

/// Fitted ensemble: `init + learning_rate * Σ tree(x)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostingModel {
    init: f64,
    learning_rate: f64,
    n_features: usize,
    trees: Vec<RegressionTree>,
}

impl GradientBoostingModel {
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn init(&self) -> f64 {
        self.init
    }
}

impl TrainedRegressor for GradientBoostingModel {
    fn predict_one(&self, features: &[f64]) -> Result<f64> {
        if features.len() != self.n_features {
            return Err(ForecastError::ModelError(format!(
                "Expected {} features, got {}",
                self.n_features,
                features.len()
            )));
        }
        if features.iter().any(|v| !v.is_finite()) {
            return Err(ForecastError::ModelError(
                "Feature vector contains non-finite values".to_string(),
            ));
        }

        let boost: f64 = self.trees.iter().map(|tree| tree.predict(features)).sum();
        Ok(self.init + self.learning_rate * boost)
    }

    fn n_features(&self) -> usize {
        self.n_features
    }
}
