//! Metrics for evaluating forecast performance

use crate::error::{ForecastError, Result};
use crate::features::Horizon;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::BTreeMap;

/// Mean absolute error. NaN when the inputs are empty or differ in length.
pub fn mean_absolute_error(actual: &[f64], predicted: &[f64]) -> f64 {
    if actual.is_empty() || actual.len() != predicted.len() {
        return f64::NAN;
    }
    actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).abs())
        .mean()
}

/// Root mean squared error. NaN when the inputs are empty or differ in length.
pub fn root_mean_squared_error(actual: &[f64], predicted: &[f64]) -> f64 {
    if actual.is_empty() || actual.len() != predicted.len() {
        return f64::NAN;
    }
    actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| a - p)
        .quadratic_mean()
}

/// Error metrics on one partition; both absent for an empty partition
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PartitionMetrics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mae: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rmse: Option<f64>,
}

impl PartitionMetrics {
    /// Score predictions against actuals
    pub fn evaluate(actual: &[f64], predicted: &[f64]) -> Result<Self> {
        if actual.len() != predicted.len() {
            return Err(ForecastError::ModelError(format!(
                "Actual ({}) and predicted ({}) values differ in length",
                actual.len(),
                predicted.len()
            )));
        }
        if actual.is_empty() {
            return Ok(Self::default());
        }

        Ok(Self {
            mae: Some(mean_absolute_error(actual, predicted)),
            rmse: Some(root_mean_squared_error(actual, predicted)),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.mae.is_none() && self.rmse.is_none()
    }
}

/// Validation and test metrics of one (symbol, horizon) model
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HorizonMetrics {
    pub val: PartitionMetrics,
    pub test: PartitionMetrics,
}

/// Metrics of one symbol, keyed by horizon
pub type SymbolMetrics = BTreeMap<Horizon, HorizonMetrics>;

/// Contents of `metrics.json`: symbol → horizon → {val, test} → {mae, rmse}
pub type MetricsReport = BTreeMap<String, SymbolMetrics>;
