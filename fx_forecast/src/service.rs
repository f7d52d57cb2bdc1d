//! Front-end facing entry point over the pipeline

use crate::acquisition::{DailyBarSource, Downloader};
use crate::config::AppConfig;
use crate::error::{ForecastError, Result};
use crate::metrics::SymbolMetrics;
use crate::models::{GradientBoostingRegressor, Regressor};
use crate::predictor::{PredictionResult, Predictor};
use crate::trainer::Trainer;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

/// Per-symbol results of a batch run
#[derive(Debug)]
pub struct BatchOutcome<T> {
    pub succeeded: Vec<(String, T)>,
    pub failed: Vec<(String, ForecastError)>,
}

impl<T> Default for BatchOutcome<T> {
    fn default() -> Self {
        Self {
            succeeded: Vec::new(),
            failed: Vec::new(),
        }
    }
}

impl<T> BatchOutcome<T> {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn failed_symbols(&self) -> Vec<&str> {
        self.failed.iter().map(|(symbol, _)| symbol.as_str()).collect()
    }
}

/// One prediction or all of them, serialized as an object or an array
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PredictionOutput {
    One(PredictionResult),
    All(Vec<PredictionResult>),
}

impl PredictionOutput {
    pub fn into_vec(self) -> Vec<PredictionResult> {
        match self {
            PredictionOutput::One(result) => vec![result],
            PredictionOutput::All(results) => results,
        }
    }
}

/// Summary of a download-then-train cycle
#[derive(Debug)]
pub struct RefreshSummary {
    pub downloads: BatchOutcome<PathBuf>,
    pub training: BatchOutcome<SymbolMetrics>,
}

/// Everything the CLI and HTTP front ends call
#[derive(Debug)]
pub struct Assistant<R: Regressor = GradientBoostingRegressor> {
    config: Arc<AppConfig>,
    downloader: Downloader,
    trainer: Trainer<R>,
    predictor: Predictor<R::Model>,
}

impl Assistant<GradientBoostingRegressor> {
    /// Assistant with the configured gradient boosting regressor
    pub fn new(config: AppConfig, source: Arc<dyn DailyBarSource>) -> Result<Self> {
        let regressor = GradientBoostingRegressor::new(config.model.clone(), config.seed);
        Self::with_regressor(config, source, regressor)
    }
}

impl<R: Regressor> Assistant<R> {
    pub fn with_regressor(config: AppConfig, source: Arc<dyn DailyBarSource>, regressor: R) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);
        Ok(Self {
            downloader: Downloader::new(Arc::clone(&config), source),
            trainer: Trainer::new(Arc::clone(&config), regressor),
            predictor: Predictor::new(Arc::clone(&config)),
            config,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn list_symbols(&self) -> Vec<String> {
        self.config.symbol_names()
    }

    /// Predict one symbol, or every configured symbol when `symbol` is `None`
    /// or blank
    pub fn predict(&self, symbol: Option<&str>) -> Result<PredictionOutput> {
        match symbol.map(str::trim).filter(|s| !s.is_empty()) {
            Some(symbol) => self.predictor.predict(symbol).map(PredictionOutput::One),
            None => self.predictor.predict_all().map(PredictionOutput::All),
        }
    }

    pub fn download_all(&self) -> BatchOutcome<PathBuf> {
        self.downloader.download_all()
    }

    pub fn train_all(&self) -> Result<BatchOutcome<SymbolMetrics>> {
        self.trainer.train_all()
    }

    /// Download every symbol, then retrain every symbol
    pub fn refresh(&self) -> Result<RefreshSummary> {
        let downloads = self.download_all();
        let training = self.train_all()?;
        Ok(RefreshSummary {
            downloads,
            training,
        })
    }

    pub fn downloader(&self) -> &Downloader {
        &self.downloader
    }

    pub fn trainer(&self) -> &Trainer<R> {
        &self.trainer
    }

    pub fn predictor(&self) -> &Predictor<R::Model> {
        &self.predictor
    }
}
