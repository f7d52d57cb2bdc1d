#![allow(dead_code)]

use chrono::{Duration, NaiveDate};
use fx_forecast::data::{RawBar, RawTable};
use fx_forecast::models::GradientBoostingParams;
use fx_forecast::{AppConfig, SymbolConfig};
use std::path::Path;

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Deterministic wavy price path, one bar per calendar day
pub fn synthetic_bars(start: NaiveDate, days: usize, phase: f64) -> Vec<RawBar> {
    (0..days)
        .map(|i| {
            let t = i as f64;
            let close = 30.0
                * (0.0004 * t + 0.02 * (0.31 * t + phase).sin() + 0.004 * (2.3 * t).sin()).exp();
            let spread = close * (0.004 + 0.002 * (1.7 * t).cos().abs());
            RawBar {
                date: start + Duration::days(i as i64),
                open: Some(close * 0.999),
                high: close + spread,
                low: close - spread,
                close,
                adj_close: Some(close),
                volume: Some(0.0),
            }
        })
        .collect()
}

/// Configuration rooted in a temporary directory, with a light model
pub fn test_config(root: &Path, symbols: &[&str]) -> AppConfig {
    AppConfig {
        data_dir: root.join("data"),
        models_dir: root.join("models"),
        reports_dir: root.join("reports"),
        model: GradientBoostingParams {
            n_estimators: 15,
            ..GradientBoostingParams::default()
        },
        symbols: symbols
            .iter()
            .map(|s| SymbolConfig::new(s, &format!("{}=X", s)))
            .collect(),
        ..AppConfig::default()
    }
}

/// Write a raw table where the downloader would have put it
pub fn write_raw(config: &AppConfig, symbol: &str, bars: Vec<RawBar>) {
    let table = RawTable::from_bars(symbol, bars);
    table.write_csv(config.paths().raw_table(symbol)).unwrap();
}
