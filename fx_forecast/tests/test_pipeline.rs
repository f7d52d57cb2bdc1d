mod common;

use common::{date, synthetic_bars, test_config, write_raw};
use fx_forecast::acquisition::InMemorySource;
use fx_forecast::models::{GradientBoostingModel, GradientBoostingRegressor, Regressor};
use fx_forecast::{AppConfig, Assistant, ForecastError, Horizon, PredictionOutput, Predictor, RiskLevel, Trainer};
use pretty_assertions::assert_eq;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::tempdir;

/// Boosting regressor whose fits start failing after `succeed` calls
#[derive(Debug)]
struct FailingAfter {
    inner: GradientBoostingRegressor,
    succeed: usize,
    calls: AtomicUsize,
}

impl Regressor for FailingAfter {
    type Model = GradientBoostingModel;

    fn fit(&self, features: &[Vec<f64>], targets: &[f64]) -> fx_forecast::Result<GradientBoostingModel> {
        if self.calls.fetch_add(1, Ordering::SeqCst) >= self.succeed {
            return Err(ForecastError::ModelError("fit diverged".to_string()));
        }
        self.inner.fit(features, targets)
    }

    fn name(&self) -> &str {
        "failing_after"
    }
}

fn prepared(root: &Path, symbols: &[&str]) -> Arc<AppConfig> {
    let config = test_config(root, symbols);
    for (i, symbol) in symbols.iter().enumerate() {
        write_raw(&config, symbol, synthetic_bars(date(2023, 6, 1), 700, i as f64));
    }
    Arc::new(config)
}

#[test]
fn test_predict_before_training_reports_missing_model() {
    let dir = tempdir().unwrap();
    let config = prepared(dir.path(), &["USDTRY"]);
    let predictor: Predictor = Predictor::new(Arc::clone(&config));

    let err = predictor.predict("USDTRY").unwrap_err();
    assert!(matches!(err, ForecastError::MissingArtifact { .. }), "{err}");
    assert!(err.is_not_ready());
    // the feature table is built on the way
    assert!(config.paths().processed_table("USDTRY").exists());
}

#[test]
fn test_train_then_predict() {
    let dir = tempdir().unwrap();
    let config = prepared(dir.path(), &["USDTRY"]);
    let paths = config.paths();

    let metrics = Trainer::from_config(Arc::clone(&config)).train("usdtry").unwrap();
    assert_eq!(metrics.len(), 3);
    for horizon in Horizon::ALL {
        assert!(paths.model("USDTRY", horizon).exists());
        let test = &metrics[&horizon].test;
        assert!(test.mae.unwrap() >= 0.0);
        assert!(test.rmse.unwrap() >= test.mae.unwrap());
    }
    assert!(paths.risk_thresholds("USDTRY").exists());

    let predictor: Predictor = Predictor::new(config);
    let result = predictor.predict("USDTRY").unwrap();
    assert_eq!(result.symbol, "USDTRY");
    assert_eq!(result.date, date(2023, 6, 1) + chrono::Duration::days(700 - 8));
    assert!(result.forecast.h1.is_finite() && result.forecast.h7.is_finite());
    assert!(result.insight.starts_with("Trend looks"));

    let json = serde_json::to_value(&result).unwrap();
    let mut keys: Vec<&str> = json.as_object().unwrap().keys().map(String::as_str).collect();
    keys.sort_unstable();
    assert_eq!(keys, vec!["date", "forecast", "insight", "risk", "symbol"]);
    assert_eq!(json["date"], result.date.format("%Y-%m-%d").to_string());
    assert!(["LOW", "MED", "HIGH"].contains(&json["risk"].as_str().unwrap()));
}

#[test]
fn test_training_is_deterministic() {
    let forecasts: Vec<_> = (0..2)
        .map(|_| {
            let dir = tempdir().unwrap();
            let config = prepared(dir.path(), &["EURTRY"]);
            Trainer::from_config(Arc::clone(&config)).train("EURTRY").unwrap();
            let predictor: Predictor = Predictor::new(config);
            predictor.predict("EURTRY").unwrap().forecast
        })
        .collect();

    assert_eq!(forecasts[0], forecasts[1]);
}

#[test]
fn test_train_all_continues_past_missing_symbol() {
    let dir = tempdir().unwrap();
    let config = test_config(dir.path(), &["USDTRY", "GBPTRY"]);
    write_raw(&config, "USDTRY", synthetic_bars(date(2023, 6, 1), 700, 0.0));
    let config = Arc::new(config);

    let outcome = Trainer::from_config(Arc::clone(&config)).train_all().unwrap();
    assert!(!outcome.is_complete());
    assert_eq!(outcome.failed_symbols(), vec!["GBPTRY"]);
    assert!(matches!(outcome.failed[0].1, ForecastError::MissingInput { .. }));
    assert_eq!(outcome.succeeded.len(), 1);

    let report: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(config.paths().metrics_report()).unwrap()).unwrap();
    let symbols: Vec<&str> = report.as_object().unwrap().keys().map(String::as_str).collect();
    assert_eq!(symbols, vec!["USDTRY"]);
    assert!(report["USDTRY"]["h7"]["val"]["mae"].is_number());
}

#[test]
fn test_history_without_training_rows_is_no_data() {
    let dir = tempdir().unwrap();
    let config = test_config(dir.path(), &["BTCUSD"]);
    write_raw(&config, "BTCUSD", synthetic_bars(date(2024, 3, 1), 200, 0.0));

    let err = Trainer::from_config(Arc::new(config)).train("BTCUSD").unwrap_err();
    assert!(matches!(err, ForecastError::NoData { .. }), "{err}");
}

#[test]
fn test_inverted_bar_does_not_block_training() {
    let dir = tempdir().unwrap();
    let config = test_config(dir.path(), &["USDTRY"]);
    let mut bars = synthetic_bars(date(2023, 6, 1), 700, 0.0);
    let glitched = &mut bars[100];
    std::mem::swap(&mut glitched.high, &mut glitched.low);
    let glitched_date = glitched.date;

    // written by hand so the inverted bar reaches the file as a provider would send it
    let mut csv = String::from("Date,High,Low,Close\n");
    for bar in &bars {
        csv.push_str(&format!("{},{},{},{}\n", bar.date, bar.high, bar.low, bar.close));
    }
    fs::create_dir_all(&config.data_dir).unwrap();
    fs::write(config.paths().raw_table("USDTRY"), csv).unwrap();
    let config = Arc::new(config);

    Trainer::from_config(Arc::clone(&config)).train("USDTRY").unwrap();
    let predictor: Predictor = Predictor::new(Arc::clone(&config));
    predictor.predict("USDTRY").unwrap();

    let raw = fx_forecast::data::RawTable::read_csv("USDTRY", config.paths().raw_table("USDTRY")).unwrap();
    assert_eq!(raw.len(), 699);
    assert!(raw.bars().iter().all(|bar| bar.date != glitched_date));
}

#[test]
fn test_predict_on_short_history_is_no_data() {
    let dir = tempdir().unwrap();
    let config = test_config(dir.path(), &["ETHUSD"]);
    write_raw(&config, "ETHUSD", synthetic_bars(date(2024, 5, 1), 20, 0.0));
    let config = Arc::new(config);
    let predictor: Predictor = Predictor::new(Arc::clone(&config));

    // built in memory, then reloaded from the persisted empty table
    for _ in 0..2 {
        let err = predictor.predict("ETHUSD").unwrap_err();
        assert!(matches!(err, ForecastError::NoData { .. }), "{err}");
    }
    assert!(config.paths().processed_table("ETHUSD").exists());
}

#[test]
fn test_failed_horizon_fit_writes_no_artifacts() {
    let dir = tempdir().unwrap();
    let config = prepared(dir.path(), &["GBPTRY"]);
    let paths = config.paths();
    let regressor = FailingAfter {
        inner: GradientBoostingRegressor::new(config.model.clone(), config.seed),
        succeed: 2,
        calls: AtomicUsize::new(0),
    };

    let err = Trainer::new(Arc::clone(&config), regressor).train("GBPTRY").unwrap_err();
    assert!(matches!(err, ForecastError::ModelError(_)), "{err}");
    for horizon in Horizon::ALL {
        assert!(!paths.model("GBPTRY", horizon).exists(), "{horizon} artifact written");
    }
    assert!(!paths.risk_thresholds("GBPTRY").exists());
}

#[test]
fn test_unknown_symbol_is_rejected() {
    let dir = tempdir().unwrap();
    let config = prepared(dir.path(), &["USDTRY"]);
    let predictor: Predictor = Predictor::new(config);

    match predictor.predict("usdjpy").unwrap_err() {
        ForecastError::UnknownSymbol { symbol, .. } => assert_eq!(symbol, "USDJPY"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_artifact_with_other_feature_layout_is_rejected() {
    let dir = tempdir().unwrap();
    let config = prepared(dir.path(), &["USDTRY"]);
    Trainer::from_config(Arc::clone(&config)).train("USDTRY").unwrap();

    let path = config.paths().model("USDTRY", Horizon::H3);
    let mut artifact: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    artifact["feature_columns"].as_array_mut().unwrap().pop();
    fs::write(&path, serde_json::to_string(&artifact).unwrap()).unwrap();

    let predictor: Predictor = Predictor::new(config);
    let err = predictor.predict("USDTRY").unwrap_err();
    assert!(matches!(err, ForecastError::ArtifactMismatch { .. }), "{err}");
}

#[test]
fn test_assistant_download_train_predict() {
    let dir = tempdir().unwrap();
    let mut config = test_config(dir.path(), &["USDTRY", "XAUUSD"]);
    config.symbols[1] = config.symbols[1].clone().with_fallbacks(&["GC=F"]);

    // only the XAUUSD fallback ticker is known to the source
    let source = InMemorySource::new()
        .with_ticker("USDTRY=X", synthetic_bars(date(2023, 6, 1), 700, 0.0))
        .with_ticker("GC=F", synthetic_bars(date(2023, 6, 1), 700, 2.0));
    let assistant = Assistant::new(config, Arc::new(source)).unwrap();

    assert_eq!(assistant.list_symbols(), vec!["USDTRY", "XAUUSD"]);
    let summary = assistant.refresh().unwrap();
    assert!(summary.downloads.is_complete());
    assert!(summary.training.is_complete());

    match assistant.predict(Some(" xauusd ")).unwrap() {
        PredictionOutput::One(result) => assert_eq!(result.symbol, "XAUUSD"),
        other => panic!("expected one prediction, got {other:?}"),
    }
    let all = assistant.predict(None).unwrap().into_vec();
    assert_eq!(all.len(), 2);
    assert!(all.iter().all(|r| matches!(r.risk, RiskLevel::Low | RiskLevel::Med | RiskLevel::High)));

    let json = serde_json::to_value(assistant.predict(Some("")).unwrap()).unwrap();
    assert!(json.is_array());
}

#[test]
fn test_download_failure_names_every_ticker() {
    let dir = tempdir().unwrap();
    let mut config = test_config(dir.path(), &["XAGUSD"]);
    config.symbols[0] = config.symbols[0].clone().with_fallbacks(&["SI=F"]);
    let assistant = Assistant::new(config, Arc::new(InMemorySource::new())).unwrap();

    let outcome = assistant.download_all();
    match &outcome.failed[..] {
        [(symbol, ForecastError::Acquisition { tried, .. })] => {
            assert_eq!(symbol, "XAGUSD");
            assert_eq!(tried, &vec!["SI=F".to_string(), "XAGUSD=X".to_string()]);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}
