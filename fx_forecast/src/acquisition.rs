//! Daily bar acquisition from a market data provider

use crate::config::AppConfig;
use crate::data::{RawBar, RawTable};
use crate::error::{ForecastError, Result};
use crate::service::BatchOutcome;
use crate::utils::ArtifactPaths;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::blocking::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt::Debug;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Source of daily OHLCV bars for a provider ticker
pub trait DailyBarSource: Debug + Send + Sync {
    /// All daily bars from `start` up to today. An unknown ticker may come
    /// back as an empty list rather than an error.
    fn fetch_daily(&self, ticker: &str, start: NaiveDate) -> Result<Vec<RawBar>>;

    fn name(&self) -> &str;
}

/// Yahoo Finance v8 chart API response
#[derive(Debug, Deserialize)]
struct YahooChartResponse {
    chart: YahooChart,
}

#[derive(Debug, Deserialize)]
struct YahooChart {
    result: Option<Vec<YahooResult>>,
    error: Option<YahooError>,
}

#[derive(Debug, Deserialize)]
struct YahooError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct YahooResult {
    meta: Option<YahooMeta>,
    timestamp: Option<Vec<i64>>,
    indicators: YahooIndicators,
}

#[derive(Debug, Deserialize)]
struct YahooMeta {
    /// Exchange offset from UTC in seconds; bars are stamped at exchange
    /// midnight, so the offset recovers the trading date
    gmtoffset: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct YahooIndicators {
    quote: Vec<YahooQuote>,
    #[serde(rename = "adjclose")]
    adj_close: Option<Vec<YahooAdjClose>>,
}

#[derive(Debug, Deserialize)]
struct YahooQuote {
    open: Option<Vec<Option<f64>>>,
    high: Option<Vec<Option<f64>>>,
    low: Option<Vec<Option<f64>>>,
    close: Option<Vec<Option<f64>>>,
    volume: Option<Vec<Option<f64>>>,
}

#[derive(Debug, Deserialize)]
struct YahooAdjClose {
    #[serde(rename = "adjclose")]
    adj_close: Option<Vec<Option<f64>>>,
}

/// Convert a chart API payload into raw bars. Sessions without a high, low
/// or close are left out.
pub fn parse_yahoo_chart(body: &str) -> Result<Vec<RawBar>> {
    let response: YahooChartResponse = serde_json::from_str(body)?;

    if let Some(err) = response.chart.error {
        return Err(ForecastError::ProviderError(format!(
            "{}: {}",
            err.code, err.description
        )));
    }

    let Some(result) = response.chart.result.and_then(|r| r.into_iter().next()) else {
        return Ok(Vec::new());
    };
    let offset = result.meta.and_then(|m| m.gmtoffset).unwrap_or(0);
    let timestamps = result.timestamp.unwrap_or_default();
    let Some(quote) = result.indicators.quote.into_iter().next() else {
        return Ok(Vec::new());
    };
    let adj_close = result
        .indicators
        .adj_close
        .and_then(|a| a.into_iter().next())
        .and_then(|a| a.adj_close)
        .unwrap_or_default();

    let open = quote.open.unwrap_or_default();
    let high = quote.high.unwrap_or_default();
    let low = quote.low.unwrap_or_default();
    let close = quote.close.unwrap_or_default();
    let volume = quote.volume.unwrap_or_default();
    let at = |values: &[Option<f64>], i: usize| values.get(i).copied().flatten();

    let bars = timestamps
        .iter()
        .enumerate()
        .filter_map(|(i, &ts)| {
            let date = DateTime::<Utc>::from_timestamp(ts + offset, 0)?.date_naive();
            Some(RawBar {
                date,
                open: at(&open, i),
                high: at(&high, i)?,
                low: at(&low, i)?,
                close: at(&close, i)?,
                adj_close: at(&adj_close, i),
                volume: at(&volume, i),
            })
        })
        .collect();

    Ok(bars)
}

/// Daily bars from the Yahoo Finance chart API
#[derive(Debug, Clone)]
pub struct YahooChartSource {
    client: Client,
    base_url: String,
}

impl YahooChartSource {
    pub const DEFAULT_BASE_URL: &'static str = "https://query1.finance.yahoo.com";

    pub fn new() -> Result<Self> {
        Self::with_base_url(Self::DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("fx_forecast/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

impl DailyBarSource for YahooChartSource {
    fn fetch_daily(&self, ticker: &str, start: NaiveDate) -> Result<Vec<RawBar>> {
        let period1 = start
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc().timestamp())
            .unwrap_or(0);
        let period2 = Utc::now().timestamp();
        let url = format!("{}/v8/finance/chart/{}", self.base_url, ticker);
        debug!(ticker, %url, "Requesting daily chart");

        let response = self
            .client
            .get(&url)
            .query(&[
                ("period1", period1.to_string()),
                ("period2", period2.to_string()),
                ("interval", "1d".to_string()),
                ("events", "history".to_string()),
            ])
            .send()?;
        let status = response.status();
        let body = response.text()?;

        if !status.is_success() {
            // unknown tickers answer 404 with a chart.error payload
            return match parse_yahoo_chart(&body) {
                Err(ForecastError::ProviderError(msg)) => {
                    Err(ForecastError::ProviderError(format!("{} ({})", msg, status)))
                }
                _ => Err(ForecastError::ProviderError(format!(
                    "{} answered {}",
                    ticker, status
                ))),
            };
        }

        parse_yahoo_chart(&body)
    }

    fn name(&self) -> &str {
        "yahoo"
    }
}

/// Bars served from memory, keyed by ticker. Unknown tickers return no bars.
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    bars: HashMap<String, Vec<RawBar>>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ticker(mut self, ticker: &str, bars: Vec<RawBar>) -> Self {
        self.bars.insert(ticker.to_string(), bars);
        self
    }
}

impl DailyBarSource for InMemorySource {
    fn fetch_daily(&self, ticker: &str, start: NaiveDate) -> Result<Vec<RawBar>> {
        Ok(self
            .bars
            .get(ticker)
            .map(|bars| bars.iter().filter(|b| b.date >= start).cloned().collect())
            .unwrap_or_default())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// Writes raw tables for configured symbols, trying each symbol's candidate
/// tickers in order
#[derive(Debug, Clone)]
pub struct Downloader {
    config: Arc<AppConfig>,
    paths: ArtifactPaths,
    source: Arc<dyn DailyBarSource>,
}

impl Downloader {
    pub fn new(config: Arc<AppConfig>, source: Arc<dyn DailyBarSource>) -> Self {
        let paths = config.paths();
        Self {
            config,
            paths,
            source,
        }
    }

    /// Download one symbol and overwrite its raw table.
    ///
    /// The processed table derived from the previous raw table is removed so
    /// the next train or predict rebuilds it.
    pub fn download_symbol(&self, symbol: &str) -> Result<PathBuf> {
        let entry = self.config.resolve_symbol(symbol)?;
        let mut tried = Vec::new();

        for ticker in entry.candidates() {
            tried.push(ticker.clone());
            let bars = match self.source.fetch_daily(&ticker, self.config.start_date) {
                Ok(bars) => bars,
                Err(e) => {
                    warn!(symbol = %entry.name, %ticker, source = self.source.name(), error = %e, "Fetch failed; trying next ticker");
                    continue;
                }
            };

            let table = RawTable::from_bars(&entry.name, bars);
            if table.is_empty() {
                warn!(symbol = %entry.name, %ticker, "No rows returned; trying next ticker");
                continue;
            }

            let path = self.paths.raw_table(&entry.name);
            table.write_csv(&path)?;
            let processed = self.paths.processed_table(&entry.name);
            if processed.exists() {
                fs::remove_file(&processed)?;
            }
            info!(
                symbol = %entry.name,
                %ticker,
                rows = table.len(),
                first = ?table.first_date(),
                last = ?table.last_date(),
                path = %path.display(),
                "Saved raw table"
            );
            return Ok(path);
        }

        Err(ForecastError::Acquisition {
            symbol: entry.name.clone(),
            tried,
        })
    }

    /// Download every configured symbol; failures are collected, not fatal
    pub fn download_all(&self) -> BatchOutcome<PathBuf> {
        let mut outcome = BatchOutcome::default();
        for symbol in self.config.symbol_names() {
            match self.download_symbol(&symbol) {
                Ok(path) => outcome.succeeded.push((symbol, path)),
                Err(e) => {
                    error!(symbol = %symbol, error = %e, "Download failed");
                    outcome.failed.push((symbol, e));
                }
            }
        }
        outcome
    }
}
