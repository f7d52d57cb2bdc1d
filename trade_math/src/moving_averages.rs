//! Moving average calculation implementations
//!
//! - Simple Moving Average (SMA) over a trailing window
//! - Exponential Moving Average (EMA) in recursive smoothing form

use crate::{check_period, MathError, Result};
use std::collections::VecDeque;

/// Simple Moving Average (SMA)
#[derive(Debug, Clone)]
pub struct SimpleMovingAverage {
    period: usize,
    values: VecDeque<f64>,
}

impl SimpleMovingAverage {
    /// SMA over the last `period` values
    pub fn new(period: usize) -> Result<Self> {
        check_period(period)?;

        Ok(Self {
            period,
            values: VecDeque::with_capacity(period + 1),
        })
    }

    /// Push a new observation, evicting the oldest once the window is full
    pub fn update(&mut self, value: f64) -> Result<()> {
        if !value.is_finite() {
            return Err(MathError::InvalidInput(format!(
                "SMA input must be finite, got {}",
                value
            )));
        }

        self.values.push_back(value);
        if self.values.len() > self.period {
            self.values.pop_front();
        }

        Ok(())
    }

    /// Mean of the window; an error until `period` values have arrived
    pub fn value(&self) -> Result<f64> {
        if self.values.len() < self.period {
            return Err(MathError::InsufficientData(format!(
                "SMA({}) has only {} values",
                self.period,
                self.values.len()
            )));
        }

        // summed per call; a running sum drifts over long histories
        Ok(self.values.iter().sum::<f64>() / self.period as f64)
    }

    /// Get the current period
    pub fn period(&self) -> usize {
        self.period
    }
}

/// Exponential Moving Average (EMA)
///
/// Uses the recursive form `ema[t] = α·x[t] + (1 − α)·ema[t−1]` with
/// `α = 2 / (span + 1)`, seeded with the first observation and without any
/// bias adjustment. A value is therefore available from the very first update.
#[derive(Debug, Clone)]
pub struct ExponentialMovingAverage {
    span: usize,
    alpha: f64,
    current_ema: Option<f64>,
}

impl ExponentialMovingAverage {
    /// EMA with smoothing span `span`
    pub fn new(span: usize) -> Result<Self> {
        check_period(span)?;

        Ok(Self {
            span,
            alpha: 2.0 / (span as f64 + 1.0),
            current_ema: None,
        })
    }

    /// Fold one observation into the average
    pub fn update(&mut self, value: f64) -> Result<()> {
        if !value.is_finite() {
            return Err(MathError::InvalidInput(format!(
                "EMA input must be finite, got {}",
                value
            )));
        }

        self.current_ema = Some(match self.current_ema {
            None => value,
            Some(previous) => self.alpha * value + (1.0 - self.alpha) * previous,
        });

        Ok(())
    }

    /// Get the current EMA value
    pub fn value(&self) -> Result<f64> {
        self.current_ema.ok_or_else(|| {
            MathError::InsufficientData("EMA has not received any values".to_string())
        })
    }

    /// Smoothing factor `2 / (span + 1)`
    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Get the configured span
    pub fn span(&self) -> usize {
        self.span
    }
}
