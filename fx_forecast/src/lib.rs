//! # FX Forecast
//!
//! Daily forecasting pipeline for exchange rates, precious metals and crypto
//! pairs.
//!
//! ## Pipeline
//!
//! - **Acquisition**: daily OHLCV bars per symbol, trying fallback tickers in order
//! - **Features**: log returns, 14 lags, SMA/EMA, RSI, ATR, rolling volatility,
//!   calendar fields and forward 1/3/7-session labels, split by date into
//!   train/val/test
//! - **Training**: one gradient boosted tree ensemble per (symbol, horizon),
//!   MAE/RMSE on val and test, volatility quantiles for risk bands
//! - **Prediction**: forecasts for the latest row plus a risk band, a trend
//!   label and a short insight sentence
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use fx_forecast::acquisition::YahooChartSource;
//! use fx_forecast::{AppConfig, Assistant};
//!
//! # fn main() -> fx_forecast::Result<()> {
//! let source = Arc::new(YahooChartSource::new()?);
//! let assistant = Assistant::new(AppConfig::default(), source)?;
//!
//! assistant.download_all();
//! assistant.train_all()?;
//!
//! for prediction in assistant.predict(None)?.into_vec() {
//!     println!("{} {:?} {}", prediction.symbol, prediction.forecast, prediction.insight);
//! }
//! # Ok(())
//! # }
//! ```

pub mod acquisition;
pub mod config;
pub mod data;
pub mod error;
pub mod features;
pub mod insight;
pub mod metrics;
pub mod models;
pub mod predictor;
pub mod refresh;
pub mod service;
pub mod signals;
pub mod trainer;
pub mod utils;

pub use config::{AppConfig, SymbolConfig};
pub use error::{ForecastError, Result};
pub use features::{FeatureBuilder, FeatureTable, Horizon, Split, FEATURE_COLUMNS};
pub use predictor::{Forecast, PredictionResult, Predictor};
pub use refresh::RefreshGate;
pub use service::{Assistant, BatchOutcome, PredictionOutput};
pub use signals::{RiskLevel, RiskThresholds, Trend};
pub use trainer::Trainer;
