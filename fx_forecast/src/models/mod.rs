//! Regression models behind the trainer and predictor
//!
//! [`Regressor`] fits a [`TrainedRegressor`] from a feature matrix; the
//! trainer and predictor are generic over the pair. Fitted models are
//! persisted inside a [`ModelArtifact`] envelope that records what they were
//! fitted on.

pub mod gradient_boosting;
pub mod tree;

pub use gradient_boosting::{GradientBoostingModel, GradientBoostingParams, GradientBoostingRegressor};
pub use tree::{RegressionTree, TreeParams};

use crate::error::{ForecastError, Result};
use crate::features::{feature_columns, Horizon};
use crate::utils::{load_json, save_json};
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::path::Path;

/// A fitted model mapping one feature vector to a scalar forecast
pub trait TrainedRegressor: Debug + Send + Sync {
    /// Forecast for a single feature vector
    fn predict_one(&self, features: &[f64]) -> Result<f64>;

    /// Forecasts for a batch of feature vectors
    fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>> {
        rows.iter().map(|row| self.predict_one(row)).collect()
    }

    /// Width of the feature vectors the model was fitted on
    fn n_features(&self) -> usize;
}

/// An unfitted regression algorithm with its hyper-parameters
pub trait Regressor: Debug + Send + Sync {
    type Model: TrainedRegressor + Serialize + DeserializeOwned;

    /// Fit on `features` (one row per sample) against `targets`
    fn fit(&self, features: &[Vec<f64>], targets: &[f64]) -> Result<Self::Model>;

    /// Short name recorded in model artifacts
    fn name(&self) -> &str;
}

/// Check that a training set is rectangular, finite and matches its targets.
/// Returns the feature width.
pub(crate) fn check_training_set(features: &[Vec<f64>], targets: &[f64]) -> Result<usize> {
    if features.is_empty() {
        return Err(ForecastError::ModelError(
            "Cannot fit on an empty training set".to_string(),
        ));
    }
    if features.len() != targets.len() {
        return Err(ForecastError::ModelError(format!(
            "Feature rows ({}) and targets ({}) differ in length",
            features.len(),
            targets.len()
        )));
    }

    let width = features[0].len();
    if width == 0 {
        return Err(ForecastError::ModelError(
            "Feature vectors are empty".to_string(),
        ));
    }
    if let Some(row) = features.iter().position(|row| row.len() != width) {
        return Err(ForecastError::ModelError(format!(
            "Row {} has {} features, expected {}",
            row,
            features[row].len(),
            width
        )));
    }
    if features.iter().flatten().chain(targets).any(|v| !v.is_finite()) {
        return Err(ForecastError::ModelError(
            "Training data contains non-finite values".to_string(),
        ));
    }

    Ok(width)
}

/// Persisted form of a fitted model.
///
/// The envelope doubles as a version token: a predictor refuses a model whose
/// `feature_columns` differ from the current feature layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact<M> {
    pub symbol: String,
    pub horizon: Horizon,
    pub regressor: String,
    pub feature_columns: Vec<String>,
    /// Date of the last training row
    pub trained_through: Option<NaiveDate>,
    pub training_rows: usize,
    pub model: M,
}

impl<M: TrainedRegressor + Serialize + DeserializeOwned> ModelArtifact<M> {
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        save_json(path, self)
    }

    /// Load an artifact and check it against the current feature layout
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ForecastError::MissingArtifact {
                path: path.to_path_buf(),
            });
        }

        let artifact: Self = load_json(path)?;
        let expected = feature_columns();
        if artifact.feature_columns != expected {
            return Err(ForecastError::ArtifactMismatch {
                path: path.to_path_buf(),
                detail: format!(
                    "fitted on {:?}, current layout is {:?}",
                    artifact.feature_columns, expected
                ),
            });
        }
        if artifact.model.n_features() != expected.len() {
            return Err(ForecastError::ArtifactMismatch {
                path: path.to_path_buf(),
                detail: format!(
                    "model expects {} features, current layout has {}",
                    artifact.model.n_features(),
                    expected.len()
                ),
            });
        }

        Ok(artifact)
    }
}
