//! Latest-row forecasts with risk, trend and insight

use crate::config::AppConfig;
use crate::error::{ForecastError, Result};
use crate::features::{FeatureBuilder, FeatureStore, Horizon};
use crate::insight;
use crate::models::{GradientBoostingModel, ModelArtifact, TrainedRegressor};
use crate::signals::{RiskLevel, RiskThresholds, Trend};
use crate::utils::ArtifactPaths;
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, info};

/// Forecast cumulative log returns per horizon
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub h1: f64,
    pub h3: f64,
    pub h7: f64,
}

impl Forecast {
    pub fn get(&self, horizon: Horizon) -> f64 {
        match horizon {
            Horizon::H1 => self.h1,
            Horizon::H3 => self.h3,
            Horizon::H7 => self.h7,
        }
    }
}

/// Prediction for the most recent usable session of one symbol.
///
/// `trend` and `vol_7` feed the insight text and are not serialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub date: NaiveDate,
    pub symbol: String,
    pub forecast: Forecast,
    pub risk: RiskLevel,
    #[serde(skip)]
    pub trend: Trend,
    #[serde(skip)]
    pub vol_7: f64,
    pub insight: String,
}

/// Loads persisted models and produces [`PredictionResult`]s
#[derive(Debug)]
pub struct Predictor<M = GradientBoostingModel> {
    config: Arc<AppConfig>,
    paths: ArtifactPaths,
    store: FeatureStore,
    _model: PhantomData<fn() -> M>,
}

impl<M: TrainedRegressor + Serialize + DeserializeOwned> Predictor<M> {
    pub fn new(config: Arc<AppConfig>) -> Self {
        let paths = config.paths();
        let store = FeatureStore::new(paths.clone(), FeatureBuilder::new(config.split));
        Self {
            config,
            paths,
            store,
            _model: PhantomData,
        }
    }

    /// Forecast the latest feature row of one symbol.
    ///
    /// Builds the feature table from the raw table when it is missing; fails
    /// when any horizon model or the thresholds are absent.
    pub fn predict(&self, symbol: &str) -> Result<PredictionResult> {
        let symbol = self.config.resolve_symbol(symbol)?.name.clone();
        let table = self.store.load_or_build(&symbol)?;
        let latest = table.latest().ok_or_else(|| ForecastError::NoData {
            symbol: symbol.clone(),
            detail: "feature table is empty".to_string(),
        })?;
        let features = latest.feature_vector();

        let mut forecasts = [0.0; 3];
        for (slot, horizon) in forecasts.iter_mut().zip(Horizon::ALL) {
            let artifact = ModelArtifact::<M>::load(self.paths.model(&symbol, horizon))?;
            *slot = artifact.model.predict_one(&features)?;
            debug!(symbol = %symbol, horizon = %horizon, forecast = *slot, "Predicted");
        }

        let thresholds_path = self.paths.risk_thresholds(&symbol);
        if !thresholds_path.exists() {
            return Err(ForecastError::MissingArtifact {
                path: thresholds_path,
            });
        }
        let thresholds = RiskThresholds::load(&thresholds_path)?;

        let risk = thresholds.classify(latest.vol_7);
        let trend = Trend::classify(latest);
        info!(symbol = %symbol, date = %latest.date, risk = %risk, trend = %trend, "Prediction ready");

        Ok(PredictionResult {
            date: latest.date,
            symbol,
            forecast: Forecast {
                h1: forecasts[0],
                h3: forecasts[1],
                h7: forecasts[2],
            },
            risk,
            trend,
            vol_7: latest.vol_7,
            insight: insight::generate(trend, risk),
        })
    }

    /// Predict every configured symbol; the first failure aborts the batch
    pub fn predict_all(&self) -> Result<Vec<PredictionResult>> {
        self.config
            .symbol_names()
            .iter()
            .map(|symbol| self.predict(symbol))
            .collect()
    }
}
