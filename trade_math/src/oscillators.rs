//! Oscillator indicator implementations
//!
//! Relative Strength Index (RSI) computed from plain trailing means of the
//! period gains and losses (no Wilder smoothing).

use crate::{check_period, MathError, Result};
use std::collections::VecDeque;

/// Relative Strength Index (RSI) implementation
///
/// `RSI = 100 − 100 / (1 + RS)` with `RS = mean(gains) / mean(losses)` over the
/// last `period` price changes. The first price only seeds the previous close,
/// so a value needs `period + 1` updates.
#[derive(Debug, Clone)]
pub struct RelativeStrengthIndex {
    period: usize,
    previous_price: Option<f64>,
    gains: VecDeque<f64>,
    losses: VecDeque<f64>,
}

impl RelativeStrengthIndex {
    /// Create a new RSI with the specified period
    pub fn new(period: usize) -> Result<Self> {
        check_period(period)?;

        Ok(Self {
            period,
            previous_price: None,
            gains: VecDeque::with_capacity(period + 1),
            losses: VecDeque::with_capacity(period + 1),
        })
    }

    /// Update the RSI with a new price value
    pub fn update(&mut self, price: f64) -> Result<()> {
        if !price.is_finite() {
            return Err(MathError::InvalidInput(format!(
                "RSI input must be finite, got {}",
                price
            )));
        }

        if let Some(prev_price) = self.previous_price {
            let change = price - prev_price;

            self.gains.push_back(change.max(0.0));
            self.losses.push_back((-change).max(0.0));

            if self.gains.len() > self.period {
                self.gains.pop_front();
                self.losses.pop_front();
            }
        }

        self.previous_price = Some(price);

        Ok(())
    }

    /// Get the current RSI value (0-100)
    ///
    /// Returns [`MathError::CalculationError`] when the window is completely
    /// flat (no gains and no losses), where the ratio is undefined.
    pub fn value(&self) -> Result<f64> {
        if self.gains.len() < self.period {
            return Err(MathError::InsufficientData(format!(
                "Not enough data for RSI calculation. Need {} price changes, have {}.",
                self.period,
                self.gains.len()
            )));
        }

        let avg_gain = self.gains.iter().sum::<f64>() / self.period as f64;
        let avg_loss = self.losses.iter().sum::<f64>() / self.period as f64;

        if avg_loss == 0.0 {
            if avg_gain > 0.0 {
                return Ok(100.0);
            }
            return Err(MathError::CalculationError(
                "RSI undefined: no gains or losses in window".to_string(),
            ));
        }

        let rs = avg_gain / avg_loss;
        Ok(100.0 - (100.0 / (1.0 + rs)))
    }

    /// Get the current period
    pub fn period(&self) -> usize {
        self.period
    }
}
