//! Risk and trend labels for the latest feature row

use crate::error::Result;
use crate::features::FeatureRow;
use crate::utils::{load_json, save_json};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use trade_math::statistics::quantile;

/// Quantiles of training `vol_7` that separate the risk bands
pub const LOW_QUANTILE: f64 = 0.33;
pub const HIGH_QUANTILE: f64 = 0.66;

/// Volatility band of the latest session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    #[default]
    Med,
    High,
}

impl RiskLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Med => "MED",
            RiskLevel::High => "HIGH",
        }
    }

    /// Lenient parse; anything unrecognised is `MED`
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_uppercase().as_str() {
            "LOW" => RiskLevel::Low,
            "HIGH" => RiskLevel::High,
            _ => RiskLevel::Med,
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction agreed on by the EMA pair, the MA pair and the last return
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Trend {
    Up,
    Down,
    #[default]
    Flat,
}

impl Trend {
    /// `UP` when `ema_12 > ema_26`, `ma_7 > ma_21` and `log_return > 0`;
    /// `DOWN` when all three are strictly reversed; otherwise `FLAT`.
    pub fn from_indicators(ema_12: f64, ema_26: f64, ma_7: f64, ma_21: f64, log_return: f64) -> Self {
        if ema_12 > ema_26 && ma_7 > ma_21 && log_return > 0.0 {
            Trend::Up
        } else if ema_12 < ema_26 && ma_7 < ma_21 && log_return < 0.0 {
            Trend::Down
        } else {
            Trend::Flat
        }
    }

    pub fn classify(row: &FeatureRow) -> Self {
        Self::from_indicators(row.ema_12, row.ema_26, row.ma_7, row.ma_21, row.log_return)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Trend::Up => "UP",
            Trend::Down => "DOWN",
            Trend::Flat => "FLAT",
        }
    }

    /// Lenient parse; anything unrecognised is `FLAT`
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_uppercase().as_str() {
            "UP" => Trend::Up,
            "DOWN" => Trend::Down,
            _ => Trend::Flat,
        }
    }
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-symbol `vol_7` cut-offs, persisted as `{"low": .., "high": ..}`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskThresholds {
    pub low: f64,
    pub high: f64,
}

impl RiskThresholds {
    /// 33rd and 66th percentile of the training partition's `vol_7`
    pub fn from_training_volatility(vol_7: &[f64]) -> Result<Self> {
        Ok(Self {
            low: quantile(vol_7, LOW_QUANTILE)?,
            high: quantile(vol_7, HIGH_QUANTILE)?,
        })
    }

    pub fn classify(&self, vol_7: f64) -> RiskLevel {
        if vol_7 >= self.high {
            RiskLevel::High
        } else if vol_7 >= self.low {
            RiskLevel::Med
        } else {
            RiskLevel::Low
        }
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        save_json(path, self)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        load_json(path)
    }
}
