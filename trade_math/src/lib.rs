//! # Trade Math
//!
//! Streaming technical indicators and small statistics helpers used by the
//! feature pipeline.
//!
//! Every indicator follows the same shape: construct it with a window length,
//! feed observations one at a time with `update`, and read the current value
//! with `value`. `value` returns [`MathError::InsufficientData`] until the
//! trailing window is full, which is how callers detect warm-up rows.
//!
//! ```
//! use trade_math::moving_averages::SimpleMovingAverage;
//!
//! let mut sma = SimpleMovingAverage::new(2).unwrap();
//! sma.update(1.0).unwrap();
//! assert!(sma.value().is_err());
//! sma.update(3.0).unwrap();
//! assert_eq!(sma.value().unwrap(), 2.0);
//! ```

use thiserror::Error;

pub mod moving_averages;
pub mod oscillators;
pub mod statistics;
pub mod volatility;

/// Errors that can occur in trading-related calculations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MathError {
    #[error("Insufficient data for calculation: {0}")]
    InsufficientData(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Calculation error: {0}")]
    CalculationError(String),
}

/// Result type for trading math operations
pub type Result<T> = std::result::Result<T, MathError>;

pub(crate) fn check_period(period: usize) -> Result<()> {
    if period == 0 {
        return Err(MathError::InvalidInput(
            "Period must be greater than zero".to_string(),
        ));
    }
    Ok(())
}
