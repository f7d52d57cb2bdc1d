//! Volatility indicator implementations
//!
//! - Average True Range (ATR) as a trailing simple mean of true range
//! - Rolling sample standard deviation

use crate::moving_averages::SimpleMovingAverage;
use crate::{check_period, MathError, Result};
use std::collections::VecDeque;

/// True range of a bar given the previous close.
///
/// Without a previous close the range collapses to `high - low`.
pub fn true_range(high: f64, low: f64, previous_close: Option<f64>) -> f64 {
    let high_low = high - low;
    match previous_close {
        Some(prev_close) => high_low
            .max((high - prev_close).abs())
            .max((low - prev_close).abs()),
        None => high_low,
    }
}

/// Average True Range (ATR)
///
/// Unlike Wilder's ATR this is a plain trailing mean of the last `period`
/// true ranges, so it is fully determined by the window contents.
#[derive(Debug, Clone)]
pub struct AverageTrueRange {
    previous_close: Option<f64>,
    ranges: SimpleMovingAverage,
}

impl AverageTrueRange {
    /// ATR averaging the last `period` true ranges
    pub fn new(period: usize) -> Result<Self> {
        Ok(Self {
            previous_close: None,
            ranges: SimpleMovingAverage::new(period)?,
        })
    }

    /// Push one bar; a low above the high is rejected
    pub fn update(&mut self, high: f64, low: f64, close: f64) -> Result<()> {
        if low > high {
            return Err(MathError::InvalidInput(format!(
                "bar low {} is above its high {}",
                low, high
            )));
        }

        self.ranges
            .update(true_range(high, low, self.previous_close))?;
        self.previous_close = Some(close);

        Ok(())
    }

    /// Get the current ATR value
    pub fn value(&self) -> Result<f64> {
        self.ranges.value()
    }

    /// Get the current period
    pub fn period(&self) -> usize {
        self.ranges.period()
    }
}

/// Rolling sample standard deviation (denominator `n - 1`)
#[derive(Debug, Clone)]
pub struct StandardDeviation {
    period: usize,
    values: VecDeque<f64>,
}

impl StandardDeviation {
    /// Rolling deviation over the last `period` observations.
    ///
    /// The sample estimator needs at least two observations.
    pub fn new(period: usize) -> Result<Self> {
        check_period(period)?;
        if period < 2 {
            return Err(MathError::InvalidInput(
                "Sample standard deviation needs a period of at least 2".to_string(),
            ));
        }

        Ok(Self {
            period,
            values: VecDeque::with_capacity(period + 1),
        })
    }

    /// Push one observation
    pub fn update(&mut self, value: f64) -> Result<()> {
        if !value.is_finite() {
            return Err(MathError::InvalidInput(format!(
                "Standard deviation input must be finite, got {}",
                value
            )));
        }

        self.values.push_back(value);
        if self.values.len() > self.period {
            self.values.pop_front();
        }

        Ok(())
    }

    /// Sample standard deviation of the window
    pub fn value(&self) -> Result<f64> {
        if self.values.len() < self.period {
            return Err(MathError::InsufficientData(format!(
                "std({}) has only {} values",
                self.period,
                self.values.len()
            )));
        }

        let n = self.values.len() as f64;
        let mean = self.values.iter().sum::<f64>() / n;
        let variance = self
            .values
            .iter()
            .map(|&value| (value - mean).powi(2))
            .sum::<f64>()
            / (n - 1.0);

        Ok(variance.sqrt())
    }

    /// Get the current period
    pub fn period(&self) -> usize {
        self.period
    }
}
