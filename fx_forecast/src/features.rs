//! Feature engineering for daily bars
//!
//! Turns a [`RawTable`] into a dense [`FeatureTable`]: log returns, their
//! 14 lags, trailing moving averages, EMA, RSI, ATR, rolling volatility,
//! calendar features and the three forward cumulative-return labels. Every
//! indicator only looks backwards; only the labels look forward.

use crate::data::{parse_date, RawTable};
use crate::error::{ForecastError, Result};
use crate::utils::{ensure_parent, ArtifactPaths};
use chrono::{Datelike, NaiveDate};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info, warn};
use trade_math::moving_averages::{ExponentialMovingAverage, SimpleMovingAverage};
use trade_math::oscillators::RelativeStrengthIndex;
use trade_math::volatility::{AverageTrueRange, StandardDeviation};

/// Number of lagged log returns in each feature vector
pub const RETURN_LAGS: usize = 14;

/// Model input columns, in the order of [`FeatureRow::feature_vector`]
pub const FEATURE_COLUMNS: [&str; 25] = [
    "log_return",
    "ret_1",
    "ret_2",
    "ret_3",
    "ret_4",
    "ret_5",
    "ret_6",
    "ret_7",
    "ret_8",
    "ret_9",
    "ret_10",
    "ret_11",
    "ret_12",
    "ret_13",
    "ret_14",
    "ma_7",
    "ma_21",
    "ema_12",
    "ema_26",
    "rsi_14",
    "vol_7",
    "vol_21",
    "atr_14",
    "day_of_week",
    "month",
];

/// Canonical feature columns as owned strings, as stored in model artifacts
pub fn feature_columns() -> Vec<String> {
    FEATURE_COLUMNS.iter().map(|c| c.to_string()).collect()
}

/// Forecast horizon in trading sessions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Horizon {
    H1,
    H3,
    H7,
}

impl Horizon {
    pub const ALL: [Horizon; 3] = [Horizon::H1, Horizon::H3, Horizon::H7];

    /// Sessions summed into the label
    pub fn steps(self) -> usize {
        match self {
            Horizon::H1 => 1,
            Horizon::H3 => 3,
            Horizon::H7 => 7,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Horizon::H1 => "h1",
            Horizon::H3 => "h3",
            Horizon::H7 => "h7",
        }
    }

    /// Name of the label column in the processed table
    pub fn label_column(self) -> &'static str {
        match self {
            Horizon::H1 => "y_h1",
            Horizon::H3 => "y_h3",
            Horizon::H7 => "y_h7",
        }
    }
}

impl fmt::Display for Horizon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Chronological partition of a feature row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    Train,
    Val,
    Test,
}

impl Split {
    pub fn as_str(self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Val => "val",
            Split::Test => "test",
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Split {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "train" => Ok(Split::Train),
            "val" => Ok(Split::Val),
            "test" => Ok(Split::Test),
            other => Err(ForecastError::DataShape(format!(
                "Unknown split label '{}'",
                other
            ))),
        }
    }
}

/// Inclusive cut-off dates for the train and validation partitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitConfig {
    pub train_end: NaiveDate,
    pub val_end: NaiveDate,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            train_end: NaiveDate::from_ymd_opt(2023, 12, 31).unwrap_or(NaiveDate::MIN),
            val_end: NaiveDate::from_ymd_opt(2024, 12, 31).unwrap_or(NaiveDate::MAX),
        }
    }
}

impl SplitConfig {
    pub fn assign(&self, date: NaiveDate) -> Split {
        if date <= self.train_end {
            Split::Train
        } else if date <= self.val_end {
            Split::Val
        } else {
            Split::Test
        }
    }
}

/// One dense row of the feature table
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    pub date: NaiveDate,
    pub log_return: f64,
    /// `lagged_returns[i]` is the log return `i + 1` sessions back
    pub lagged_returns: [f64; RETURN_LAGS],
    pub ma_7: f64,
    pub ma_21: f64,
    pub ema_12: f64,
    pub ema_26: f64,
    pub rsi_14: f64,
    pub vol_7: f64,
    pub vol_21: f64,
    pub atr_14: f64,
    /// 0 = Monday .. 6 = Sunday
    pub day_of_week: u32,
    pub month: u32,
    pub y_h1: f64,
    pub y_h3: f64,
    pub y_h7: f64,
    pub split: Split,
}

impl FeatureRow {
    /// Model input in [`FEATURE_COLUMNS`] order
    pub fn feature_vector(&self) -> Vec<f64> {
        let mut vector = Vec::with_capacity(FEATURE_COLUMNS.len());
        vector.push(self.log_return);
        vector.extend_from_slice(&self.lagged_returns);
        vector.extend_from_slice(&[
            self.ma_7,
            self.ma_21,
            self.ema_12,
            self.ema_26,
            self.rsi_14,
            self.vol_7,
            self.vol_21,
            self.atr_14,
            f64::from(self.day_of_week),
            f64::from(self.month),
        ]);
        vector
    }

    pub fn label(&self, horizon: Horizon) -> f64 {
        match horizon {
            Horizon::H1 => self.y_h1,
            Horizon::H3 => self.y_h3,
            Horizon::H7 => self.y_h7,
        }
    }

    /// Inverse of [`FeatureRow::feature_vector`]
    fn from_parts(
        date: NaiveDate,
        features: &[f64],
        labels: [f64; 3],
        split: Split,
    ) -> Result<Self> {
        if features.len() != FEATURE_COLUMNS.len() {
            return Err(ForecastError::DataShape(format!(
                "Expected {} features, got {}",
                FEATURE_COLUMNS.len(),
                features.len()
            )));
        }

        let mut lagged_returns = [0.0; RETURN_LAGS];
        lagged_returns.copy_from_slice(&features[1..=RETURN_LAGS]);
        let tail = &features[RETURN_LAGS + 1..];

        Ok(Self {
            date,
            log_return: features[0],
            lagged_returns,
            ma_7: tail[0],
            ma_21: tail[1],
            ema_12: tail[2],
            ema_26: tail[3],
            rsi_14: tail[4],
            vol_7: tail[5],
            vol_21: tail[6],
            atr_14: tail[7],
            day_of_week: tail[8] as u32,
            month: tail[9] as u32,
            y_h1: labels[0],
            y_h3: labels[1],
            y_h7: labels[2],
            split,
        })
    }
}

/// Dense, date-ascending feature rows of one symbol
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTable {
    symbol: String,
    rows: Vec<FeatureRow>,
}

impl FeatureTable {
    pub fn new(symbol: &str, rows: Vec<FeatureRow>) -> Self {
        Self {
            symbol: symbol.to_uppercase(),
            rows,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn rows(&self) -> &[FeatureRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Most recent row, the one predictions are made from
    pub fn latest(&self) -> Option<&FeatureRow> {
        self.rows.last()
    }

    pub fn partition(&self, split: Split) -> Vec<&FeatureRow> {
        self.rows.iter().filter(|row| row.split == split).collect()
    }

    /// Columnar view: `Date`, the feature columns, the label columns, `split`
    pub fn to_dataframe(&self) -> Result<DataFrame> {
        let vectors: Vec<Vec<f64>> = self.rows.iter().map(FeatureRow::feature_vector).collect();

        let mut columns = Vec::with_capacity(FEATURE_COLUMNS.len() + 5);
        columns.push(Series::new(
            "Date",
            self.rows
                .iter()
                .map(|row| row.date.format("%Y-%m-%d").to_string())
                .collect::<Vec<_>>(),
        ));
        for (idx, name) in FEATURE_COLUMNS.iter().enumerate() {
            let values = vectors.iter().map(|v| v[idx]);
            let series = match *name {
                "day_of_week" | "month" => Series::new(name, values.map(|v| v as u32).collect::<Vec<_>>()),
                _ => Series::new(name, values.collect::<Vec<_>>()),
            };
            columns.push(series);
        }
        for horizon in Horizon::ALL {
            columns.push(Series::new(
                horizon.label_column(),
                self.rows.iter().map(|row| row.label(horizon)).collect::<Vec<_>>(),
            ));
        }
        columns.push(Series::new(
            "split",
            self.rows.iter().map(|row| row.split.as_str()).collect::<Vec<_>>(),
        ));

        Ok(DataFrame::new(columns)?)
    }

    /// Rebuild a table from its columnar view. Every column must be present
    /// and dense.
    pub fn from_dataframe(symbol: &str, df: &DataFrame) -> Result<Self> {
        let dates: Vec<NaiveDate> = {
            let column = df.column("Date")?.cast(&DataType::Utf8)?;
            let values = column.utf8()?;
            values
                .into_iter()
                .map(|v| {
                    v.and_then(parse_date).ok_or_else(|| {
                        ForecastError::DataShape(format!("Bad date {:?} in feature table", v))
                    })
                })
                .collect::<Result<_>>()?
        };

        let features = FEATURE_COLUMNS
            .iter()
            .map(|name| dense_column(df, name))
            .collect::<Result<Vec<_>>>()?;
        let labels = Horizon::ALL
            .iter()
            .map(|h| dense_column(df, h.label_column()))
            .collect::<Result<Vec<_>>>()?;
        let splits: Vec<Split> = {
            let column = df.column("split")?.cast(&DataType::Utf8)?;
            let values = column.utf8()?;
            values
                .into_iter()
                .map(|v| v.unwrap_or_default().parse())
                .collect::<Result<_>>()?
        };

        let rows = (0..df.height())
            .map(|i| {
                let vector: Vec<f64> = features.iter().map(|column| column[i]).collect();
                FeatureRow::from_parts(
                    dates[i],
                    &vector,
                    [labels[0][i], labels[1][i], labels[2][i]],
                    splits[i],
                )
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self::new(symbol, rows))
    }

    /// Persist as CSV keyed by date
    pub fn write_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        ensure_parent(path)?;

        let mut df = self.to_dataframe()?;
        let mut file = File::create(path)?;
        CsvWriter::new(&mut file).has_header(true).finish(&mut df)?;
        Ok(())
    }

    pub fn read_csv<P: AsRef<Path>>(symbol: &str, path: P) -> Result<Self> {
        let path = path.as_ref();
        let df = CsvReader::from_path(path)?
            .infer_schema(None)
            .has_header(true)
            .finish()?;
        Self::from_dataframe(symbol, &df)
    }
}

fn dense_column(df: &DataFrame, name: &str) -> Result<Vec<f64>> {
    let column = df.column(name)?.cast(&DataType::Float64)?;
    column
        .f64()?
        .into_iter()
        .map(|v| {
            v.filter(|x| x.is_finite()).ok_or_else(|| {
                ForecastError::DataShape(format!("Null or non-finite value in column '{}'", name))
            })
        })
        .collect()
}

/// Per-bar indicator values; `None` while an indicator is warming up
struct IndicatorColumns {
    log_return: Vec<Option<f64>>,
    ma_7: Vec<Option<f64>>,
    ma_21: Vec<Option<f64>>,
    ema_12: Vec<Option<f64>>,
    ema_26: Vec<Option<f64>>,
    rsi_14: Vec<Option<f64>>,
    vol_7: Vec<Option<f64>>,
    vol_21: Vec<Option<f64>>,
    atr_14: Vec<Option<f64>>,
}

/// Builds feature tables from raw tables
#[derive(Debug, Clone)]
pub struct FeatureBuilder {
    split: SplitConfig,
}

impl FeatureBuilder {
    pub fn new(split: SplitConfig) -> Self {
        Self { split }
    }

    /// Compute the dense feature table for a raw table.
    ///
    /// Rows lacking any indicator or label (warm-up at the start, the last
    /// seven sessions at the end, flat RSI windows) are dropped, so a short
    /// history yields an empty table rather than an error.
    pub fn build(&self, raw: &RawTable) -> Result<FeatureTable> {
        let indicators = self.compute_indicators(raw)?;
        let bars = raw.bars();

        let rows: Vec<FeatureRow> = (0..bars.len())
            .filter_map(|i| self.assemble_row(&indicators, bars[i].date, i))
            .collect();

        if rows.is_empty() {
            warn!(
                symbol = raw.symbol(),
                raw_rows = bars.len(),
                "Feature table is empty; history too short"
            );
        } else {
            info!(
                symbol = raw.symbol(),
                raw_rows = bars.len(),
                feature_rows = rows.len(),
                "Built feature table"
            );
        }

        Ok(FeatureTable::new(raw.symbol(), rows))
    }

    fn compute_indicators(&self, raw: &RawTable) -> Result<IndicatorColumns> {
        let bars = raw.bars();
        let n = bars.len();

        let mut sma_7 = SimpleMovingAverage::new(7)?;
        let mut sma_21 = SimpleMovingAverage::new(21)?;
        let mut ema_12 = ExponentialMovingAverage::new(12)?;
        let mut ema_26 = ExponentialMovingAverage::new(26)?;
        let mut rsi = RelativeStrengthIndex::new(14)?;
        let mut atr = AverageTrueRange::new(14)?;
        let mut std_7 = StandardDeviation::new(7)?;
        let mut std_21 = StandardDeviation::new(21)?;

        let mut columns = IndicatorColumns {
            log_return: Vec::with_capacity(n),
            ma_7: Vec::with_capacity(n),
            ma_21: Vec::with_capacity(n),
            ema_12: Vec::with_capacity(n),
            ema_26: Vec::with_capacity(n),
            rsi_14: Vec::with_capacity(n),
            vol_7: Vec::with_capacity(n),
            vol_21: Vec::with_capacity(n),
            atr_14: Vec::with_capacity(n),
        };

        let mut previous_close: Option<f64> = None;
        for bar in bars {
            let log_return = previous_close.map(|prev| bar.close.ln() - prev.ln());
            if let Some(value) = log_return {
                std_7.update(value)?;
                std_21.update(value)?;
            }
            previous_close = Some(bar.close);

            sma_7.update(bar.close)?;
            sma_21.update(bar.close)?;
            ema_12.update(bar.close)?;
            ema_26.update(bar.close)?;
            rsi.update(bar.close)?;
            atr.update(bar.high, bar.low, bar.close).map_err(|e| {
                ForecastError::DataShape(format!("{} on {}: {}", raw.symbol(), bar.date, e))
            })?;

            columns.log_return.push(log_return);
            columns.ma_7.push(sma_7.value().ok());
            columns.ma_21.push(sma_21.value().ok());
            columns.ema_12.push(ema_12.value().ok());
            columns.ema_26.push(ema_26.value().ok());
            columns.rsi_14.push(rsi.value().ok());
            columns.vol_7.push(std_7.value().ok());
            columns.vol_21.push(std_21.value().ok());
            columns.atr_14.push(atr.value().ok());
        }

        debug!(symbol = raw.symbol(), bars = n, "Computed indicators");
        Ok(columns)
    }

    fn assemble_row(&self, c: &IndicatorColumns, date: NaiveDate, i: usize) -> Option<FeatureRow> {
        let mut lagged_returns = [0.0; RETURN_LAGS];
        for (lag, slot) in lagged_returns.iter_mut().enumerate() {
            *slot = c.log_return[i.checked_sub(lag + 1)?]?;
        }

        let forward = |steps: usize| -> Option<f64> {
            (1..=steps)
                .map(|k| c.log_return.get(i + k).copied().flatten())
                .sum()
        };

        Some(FeatureRow {
            date,
            log_return: c.log_return[i]?,
            lagged_returns,
            ma_7: c.ma_7[i]?,
            ma_21: c.ma_21[i]?,
            ema_12: c.ema_12[i]?,
            ema_26: c.ema_26[i]?,
            rsi_14: c.rsi_14[i]?,
            vol_7: c.vol_7[i]?,
            vol_21: c.vol_21[i]?,
            atr_14: c.atr_14[i]?,
            day_of_week: date.weekday().num_days_from_monday(),
            month: date.month(),
            y_h1: forward(Horizon::H1.steps())?,
            y_h3: forward(Horizon::H3.steps())?,
            y_h7: forward(Horizon::H7.steps())?,
            split: self.split.assign(date),
        })
    }
}

/// Processed-table access for the trainer and predictor
#[derive(Debug, Clone)]
pub struct FeatureStore {
    paths: ArtifactPaths,
    builder: FeatureBuilder,
}

impl FeatureStore {
    pub fn new(paths: ArtifactPaths, builder: FeatureBuilder) -> Self {
        Self { paths, builder }
    }

    /// Load the persisted feature table, building it from the raw table when
    /// it does not exist yet. Never downloads and never refreshes an existing
    /// table.
    pub fn load_or_build(&self, symbol: &str) -> Result<FeatureTable> {
        let processed = self.paths.processed_table(symbol);
        if processed.exists() {
            debug!(symbol, path = %processed.display(), "Loading feature table");
            return FeatureTable::read_csv(symbol, &processed);
        }

        info!(symbol, "Feature table missing; building it from the raw table");
        self.rebuild(symbol)
    }

    /// Build the feature table from the raw table and persist it
    pub fn rebuild(&self, symbol: &str) -> Result<FeatureTable> {
        let raw = RawTable::read_csv(symbol, self.paths.raw_table(symbol))?;
        let table = self.builder.build(&raw)?;
        table.write_csv(self.paths.processed_table(symbol))?;
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::RawBar;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_feature_vector_matches_column_order() {
        let row = FeatureRow {
            date: date(2024, 1, 5),
            log_return: 0.5,
            lagged_returns: [1.0; RETURN_LAGS],
            ma_7: 2.0,
            ma_21: 3.0,
            ema_12: 4.0,
            ema_26: 5.0,
            rsi_14: 6.0,
            vol_7: 7.0,
            vol_21: 8.0,
            atr_14: 9.0,
            day_of_week: 4,
            month: 1,
            y_h1: 0.1,
            y_h3: 0.2,
            y_h7: 0.3,
            split: Split::Val,
        };

        let vector = row.feature_vector();
        assert_eq!(vector.len(), FEATURE_COLUMNS.len());
        let rsi_idx = FEATURE_COLUMNS.iter().position(|c| *c == "rsi_14").unwrap();
        assert_eq!(vector[rsi_idx], 6.0);
        assert_eq!(vector[FEATURE_COLUMNS.len() - 2], 4.0);

        let rebuilt =
            FeatureRow::from_parts(row.date, &vector, [0.1, 0.2, 0.3], Split::Val).unwrap();
        assert_eq!(rebuilt, row);
    }

    #[test]
    fn test_split_assignment_is_inclusive() {
        let split = SplitConfig::default();
        assert_eq!(split.assign(date(2023, 12, 31)), Split::Train);
        assert_eq!(split.assign(date(2024, 1, 1)), Split::Val);
        assert_eq!(split.assign(date(2024, 12, 31)), Split::Val);
        assert_eq!(split.assign(date(2025, 1, 1)), Split::Test);
    }

    #[test]
    fn test_short_history_yields_empty_table() {
        let bars = (1..=20)
            .map(|d| RawBar::new(date(2024, 1, d), 1.1 + d as f64 * 0.01, 0.9, 1.0 + d as f64 * 0.01))
            .collect();
        let raw = RawTable::from_bars("USDTRY", bars);

        let table = FeatureBuilder::new(SplitConfig::default()).build(&raw).unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn test_glitched_bar_is_skipped_not_fatal() {
        let mut bars: Vec<RawBar> = (1..=31)
            .map(|d| RawBar::new(date(2024, 1, d), 1.1 + d as f64 * 0.01, 0.9, 1.0 + d as f64 * 0.01))
            .collect();
        // inverted high/low, then a zero close
        bars[10] = RawBar::new(date(2024, 1, 11), 0.9, 1.2, 1.1);
        bars[11].close = 0.0;
        let raw = RawTable::from_bars("USDTRY", bars);
        assert_eq!(raw.len(), 29);

        let table = FeatureBuilder::new(SplitConfig::default()).build(&raw).unwrap();
        assert!(table.rows().iter().all(|row| row.atr_14 > 0.0));
    }

    #[test]
    fn test_horizon_labels() {
        assert_eq!(Horizon::H3.to_string(), "h3");
        assert_eq!(Horizon::H7.label_column(), "y_h7");
        assert_eq!(serde_json::to_string(&Horizon::H1).unwrap(), "\"h1\"");
        assert_eq!("val".parse::<Split>().unwrap(), Split::Val);
        assert!("holdout".parse::<Split>().is_err());
    }
}
