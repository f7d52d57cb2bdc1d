//! Raw daily bars and provider column resolution

use crate::error::{ForecastError, Result};
use crate::utils::ensure_parent;
use chrono::NaiveDate;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

/// One trading day of one symbol as delivered by the market data provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawBar {
    #[serde(rename = "Date")]
    pub date: NaiveDate,
    #[serde(rename = "Open")]
    pub open: Option<f64>,
    #[serde(rename = "High")]
    pub high: f64,
    #[serde(rename = "Low")]
    pub low: f64,
    #[serde(rename = "Close")]
    pub close: f64,
    #[serde(rename = "Adj_Close")]
    pub adj_close: Option<f64>,
    #[serde(rename = "Volume")]
    pub volume: Option<f64>,
}

impl RawBar {
    /// Bar with only the columns the feature pipeline needs
    pub fn new(date: NaiveDate, high: f64, low: f64, close: f64) -> Self {
        Self {
            date,
            open: None,
            high,
            low,
            close,
            adj_close: None,
            volume: None,
        }
    }

    /// Finite prices, a positive close and a low not above the high
    fn is_usable(&self) -> bool {
        self.high.is_finite()
            && self.low.is_finite()
            && self.close.is_finite()
            && self.close > 0.0
            && self.low <= self.high
    }
}

/// Mapping from provider column names to the raw bar fields.
///
/// Providers disagree on naming (`Close`, `close`, `Close_USDTRY=X`, ...), so
/// the mapping is resolved once when a table is ingested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSchema {
    pub date: String,
    pub open: Option<String>,
    pub high: String,
    pub low: String,
    pub close: String,
    pub adj_close: Option<String>,
    pub volume: Option<String>,
}

impl RawSchema {
    /// Resolve the schema from a list of column names
    pub fn resolve<S: AsRef<str>>(columns: &[S]) -> Result<Self> {
        let columns: Vec<&str> = columns.iter().map(|c| c.as_ref()).collect();

        let date = columns
            .iter()
            .find(|c| matches!(c.trim().to_lowercase().as_str(), "date" | "datetime"))
            .map(|c| c.to_string())
            .ok_or_else(|| {
                ForecastError::DataShape(format!("No date column among {:?}", columns))
            })?;

        let required = |base: &str| {
            resolve_column(&columns, base).ok_or_else(|| {
                ForecastError::DataShape(format!(
                    "Column '{}' not found among {:?}",
                    base, columns
                ))
            })
        };

        Ok(Self {
            date,
            open: resolve_column(&columns, "open"),
            high: required("high")?,
            low: required("low")?,
            close: required("close")?,
            adj_close: resolve_adjusted_close(&columns),
            volume: resolve_column(&columns, "volume"),
        })
    }
}

fn is_adjusted_close(column: &str) -> bool {
    let normalized: String = column
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect();
    normalized.starts_with("adjclose") || normalized.starts_with("adjustedclose")
}

/// Exact (case-insensitive) name first, then the earliest `<base>_*` column.
fn resolve_column(columns: &[&str], base: &str) -> Option<String> {
    let allowed = |column: &&str| base != "close" || !is_adjusted_close(column);

    if let Some(exact) = columns
        .iter()
        .copied()
        .filter(allowed)
        .find(|c| c.to_lowercase() == base)
    {
        return Some(exact.to_string());
    }

    let prefix = format!("{}_", base);
    let mut candidates: Vec<&str> = columns
        .iter()
        .copied()
        .filter(allowed)
        .filter(|c| c.to_lowercase().starts_with(&prefix))
        .collect();
    candidates.sort_unstable();
    candidates.first().map(|c| c.to_string())
}

fn resolve_adjusted_close(columns: &[&str]) -> Option<String> {
    let mut candidates: Vec<&str> = columns
        .iter()
        .copied()
        .filter(|c| is_adjusted_close(c))
        .collect();
    candidates.sort_unstable();
    candidates.first().map(|c| c.to_string())
}

/// Parse the calendar date at the start of a provider timestamp
/// (`2024-03-01`, `2024-03-01 00:00:00+03:00`, ...).
pub(crate) fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    let day = value.get(..10).unwrap_or(value);
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

/// Validated daily bars of one symbol, ascending by date with unique dates
#[derive(Debug, Clone, PartialEq)]
pub struct RawTable {
    symbol: String,
    bars: Vec<RawBar>,
}

impl RawTable {
    /// Build a table from bars in any order.
    ///
    /// Bars with a non-finite high, low or close are dropped. When a date
    /// appears twice the later bar wins.
    pub fn from_bars(symbol: &str, bars: Vec<RawBar>) -> Self {
        let total = bars.len();
        let mut bars: Vec<RawBar> = bars.into_iter().filter(RawBar::is_usable).collect();
        let unusable = total - bars.len();

        // stable sort keeps arrival order within a date
        bars.sort_by_key(|bar| bar.date);
        let mut deduped: Vec<RawBar> = Vec::with_capacity(bars.len());
        for bar in bars {
            match deduped.last_mut() {
                Some(last) if last.date == bar.date => *last = bar,
                _ => deduped.push(bar),
            }
        }

        if unusable > 0 {
            warn!(symbol, skipped = unusable, "Dropped raw rows with missing, inverted or non-positive prices");
        }

        Self {
            symbol: symbol.to_uppercase(),
            bars: deduped,
        }
    }

    /// Read a raw table written by the downloader (or any provider export
    /// whose columns [`RawSchema`] can resolve).
    pub fn read_csv<P: AsRef<Path>>(symbol: &str, path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ForecastError::MissingInput {
                symbol: symbol.to_uppercase(),
            });
        }

        let df = CsvReader::from_path(path)?
            .infer_schema(None)
            .has_header(true)
            .finish()?;

        debug!(symbol, path = %path.display(), rows = df.height(), "Read raw table");
        Self::from_dataframe(symbol, &df)
    }

    /// Convert a provider data frame into validated bars
    pub fn from_dataframe(symbol: &str, df: &DataFrame) -> Result<Self> {
        let schema = RawSchema::resolve(&df.get_column_names())?;

        let dates: Vec<Option<NaiveDate>> = {
            let column = df.column(&schema.date)?.cast(&DataType::Utf8)?;
            let values = column.utf8()?;
            values.into_iter().map(|v| v.and_then(parse_date)).collect()
        };
        let high = float_column(df, &schema.high)?;
        let low = float_column(df, &schema.low)?;
        let close = float_column(df, &schema.close)?;
        let open = optional_float_column(df, schema.open.as_deref())?;
        let adj_close = optional_float_column(df, schema.adj_close.as_deref())?;
        let volume = optional_float_column(df, schema.volume.as_deref())?;

        let mut bars = Vec::with_capacity(df.height());
        let mut skipped = 0usize;
        for i in 0..df.height() {
            match (dates[i], high[i], low[i], close[i]) {
                (Some(date), Some(high), Some(low), Some(close)) => bars.push(RawBar {
                    date,
                    open: open.as_ref().and_then(|c| c[i]),
                    high,
                    low,
                    close,
                    adj_close: adj_close.as_ref().and_then(|c| c[i]),
                    volume: volume.as_ref().and_then(|c| c[i]),
                }),
                _ => skipped += 1,
            }
        }

        if skipped > 0 {
            warn!(symbol, skipped, "Skipped raw rows with a bad date or missing prices");
        }

        Ok(Self::from_bars(symbol, bars))
    }

    /// Write the table as `Date,Open,High,Low,Close,Adj_Close,Volume`
    pub fn write_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        ensure_parent(path)?;

        let mut writer = csv::Writer::from_path(path)?;
        if self.bars.is_empty() {
            writer.write_record(["Date", "Open", "High", "Low", "Close", "Adj_Close", "Volume"])?;
        }
        for bar in &self.bars {
            writer.serialize(bar)?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn bars(&self) -> &[RawBar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.bars.first().map(|bar| bar.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.bars.last().map(|bar| bar.date)
    }
}

fn float_column(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let column = df.column(name)?.cast(&DataType::Float64)?;
    Ok(column
        .f64()?
        .into_iter()
        .map(|v| v.filter(|x| x.is_finite()))
        .collect())
}

fn optional_float_column(df: &DataFrame, name: Option<&str>) -> Result<Option<Vec<Option<f64>>>> {
    name.map(|name| float_column(df, name)).transpose()
}
