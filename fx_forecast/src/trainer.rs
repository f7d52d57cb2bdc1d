//! Fits one model per (symbol, horizon) and the per-symbol risk thresholds

use crate::config::AppConfig;
use crate::error::{ForecastError, Result};
use crate::features::{feature_columns, FeatureBuilder, FeatureRow, FeatureStore, Horizon, Split};
use crate::metrics::{HorizonMetrics, MetricsReport, PartitionMetrics, SymbolMetrics};
use crate::models::{GradientBoostingRegressor, ModelArtifact, Regressor, TrainedRegressor};
use crate::service::BatchOutcome;
use crate::signals::RiskThresholds;
use crate::utils::{save_json, ArtifactPaths};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Trains every configured symbol from its feature table
#[derive(Debug)]
pub struct Trainer<R: Regressor = GradientBoostingRegressor> {
    config: Arc<AppConfig>,
    paths: ArtifactPaths,
    store: FeatureStore,
    regressor: R,
}

impl Trainer<GradientBoostingRegressor> {
    /// Trainer using the configured gradient boosting parameters and seed
    pub fn from_config(config: Arc<AppConfig>) -> Self {
        let regressor = GradientBoostingRegressor::new(config.model.clone(), config.seed);
        Self::new(config, regressor)
    }
}

impl<R: Regressor> Trainer<R> {
    pub fn new(config: Arc<AppConfig>, regressor: R) -> Self {
        let paths = config.paths();
        let store = FeatureStore::new(paths.clone(), FeatureBuilder::new(config.split));
        Self {
            config,
            paths,
            store,
            regressor,
        }
    }

    /// Train the three horizon models and the risk thresholds of one symbol
    pub fn train(&self, symbol: &str) -> Result<SymbolMetrics> {
        let symbol = self.config.resolve_symbol(symbol)?.name.clone();
        let table = self.store.load_or_build(&symbol)?;

        let train = table.partition(Split::Train);
        let val = table.partition(Split::Val);
        let test = table.partition(Split::Test);

        if train.is_empty() {
            return Err(ForecastError::NoData {
                symbol,
                detail: format!(
                    "training partition is empty ({} feature rows in total)",
                    table.len()
                ),
            });
        }
        for (name, rows) in [("val", &val), ("test", &test)] {
            if rows.is_empty() {
                warn!(symbol = %symbol, partition = name, "Partition is empty; its metrics will be empty");
            }
        }
        info!(
            symbol = %symbol,
            train = train.len(),
            val = val.len(),
            test = test.len(),
            "Training models"
        );

        let x_train = matrix(&train);
        let x_val = matrix(&val);
        let x_test = matrix(&test);

        // nothing is written until every horizon has fitted
        let mut fitted = Vec::with_capacity(Horizon::ALL.len());
        for horizon in Horizon::ALL {
            let y_train = labels(&train, horizon);
            let model = self.regressor.fit(&x_train, &y_train)?;
            let evaluation = HorizonMetrics {
                val: evaluate(&model, &x_val, &labels(&val, horizon))?,
                test: evaluate(&model, &x_test, &labels(&test, horizon))?,
            };
            fitted.push((horizon, model, evaluation));
        }
        let volatility: Vec<f64> = train.iter().map(|row| row.vol_7).collect();
        let thresholds = RiskThresholds::from_training_volatility(&volatility)?;

        let mut metrics = SymbolMetrics::new();
        for (horizon, model, evaluation) in fitted {
            let path = self.paths.model(&symbol, horizon);
            ModelArtifact {
                symbol: symbol.clone(),
                horizon,
                regressor: self.regressor.name().to_string(),
                feature_columns: feature_columns(),
                trained_through: train.last().map(|row| row.date),
                training_rows: train.len(),
                model,
            }
            .save(&path)?;

            info!(
                symbol = %symbol,
                horizon = %horizon,
                val_mae = ?evaluation.val.mae,
                test_mae = ?evaluation.test.mae,
                path = %path.display(),
                "Saved model"
            );
            metrics.insert(horizon, evaluation);
        }

        thresholds.save(self.paths.risk_thresholds(&symbol))?;
        info!(symbol = %symbol, low = thresholds.low, high = thresholds.high, "Saved risk thresholds");

        Ok(metrics)
    }

    /// Train every configured symbol and write `metrics.json`.
    ///
    /// A failing symbol is logged and reported in the outcome; the remaining
    /// symbols are still trained. The report holds the successful symbols.
    pub fn train_all(&self) -> Result<BatchOutcome<SymbolMetrics>> {
        let mut outcome = BatchOutcome::default();
        for symbol in self.config.symbol_names() {
            match self.train(&symbol) {
                Ok(metrics) => outcome.succeeded.push((symbol, metrics)),
                Err(e) => {
                    error!(symbol = %symbol, error = %e, "Training failed");
                    outcome.failed.push((symbol, e));
                }
            }
        }

        let report: MetricsReport = outcome
            .succeeded
            .iter()
            .map(|(symbol, metrics)| (symbol.clone(), metrics.clone()))
            .collect();
        save_json(self.paths.metrics_report(), &report)?;
        info!(
            trained = outcome.succeeded.len(),
            failed = outcome.failed.len(),
            "Training run finished"
        );

        Ok(outcome)
    }
}

fn matrix(rows: &[&FeatureRow]) -> Vec<Vec<f64>> {
    rows.iter().map(|row| row.feature_vector()).collect()
}

fn labels(rows: &[&FeatureRow], horizon: Horizon) -> Vec<f64> {
    rows.iter().map(|row| row.label(horizon)).collect()
}

fn evaluate<M: TrainedRegressor>(model: &M, features: &[Vec<f64>], actual: &[f64]) -> Result<PartitionMetrics> {
    if features.is_empty() {
        return Ok(PartitionMetrics::default());
    }
    let predicted = model.predict(features)?;
    PartitionMetrics::evaluate(actual, &predicted)
}
