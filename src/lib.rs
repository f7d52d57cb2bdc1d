//! # FX Assistant
//!
//! Umbrella crate over the workspace members:
//!
//! - [`trade_math`]: streaming indicators (SMA, EMA, RSI, ATR, rolling
//!   standard deviation) and quantiles
//! - [`fx_forecast`]: acquisition, feature tables, model training, prediction
//!   and the insight text
//!
//! The `fx` binary in `fx_cli` is the command line and HTTP front end.
//!
//! ## Example
//!
//! ```
//! use fx_assistant_workspace::fx_forecast::insight;
//! use fx_assistant_workspace::fx_forecast::{RiskLevel, Trend};
//!
//! let text = insight::generate(Trend::Up, RiskLevel::High);
//! assert!(text.starts_with("Trend looks upward; there is high volatility."));
//! ```

pub use fx_forecast;
pub use trade_math;

pub use fx_forecast::{AppConfig, Assistant, ForecastError, Horizon, PredictionResult, RiskLevel, Trend};
