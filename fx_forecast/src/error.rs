//! Error types for the fx_forecast crate

use polars::prelude::PolarsError;
use std::path::PathBuf;
use thiserror::Error;
use trade_math::MathError;

/// Custom error types for the fx_forecast crate
#[derive(Debug, Error)]
pub enum ForecastError {
    /// Raw or processed table is missing required columns or holds unusable values
    #[error("Data shape error: {0}")]
    DataShape(String),

    /// Raw data is absent when a downstream step needs it
    #[error("Missing raw data for {symbol}. Run download first.")]
    MissingInput { symbol: String },

    /// A model or threshold file is absent when the predictor needs it
    #[error("Missing artifact {}. Run train first.", .path.display())]
    MissingArtifact { path: PathBuf },

    /// A persisted model was fitted against a different feature layout
    #[error("Artifact {} does not match the current feature set: {detail}", .path.display())]
    ArtifactMismatch { path: PathBuf, detail: String },

    /// Every ticker tried for a symbol returned no rows
    #[error("No data downloaded for {symbol}. Tried: {}", .tried.join(", "))]
    Acquisition { symbol: String, tried: Vec<String> },

    /// Caller asked for a symbol that is not configured
    #[error("Unknown symbol: {symbol}. Use one of {known:?}")]
    UnknownSymbol { symbol: String, known: Vec<String> },

    /// The feature table or one of its partitions has no rows to work with
    #[error("No usable data for {symbol}: {detail}")]
    NoData { symbol: String, detail: String },

    /// Regressor fitting or inference failed
    #[error("Model error: {0}")]
    ModelError(String),

    /// Configuration failed validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Market data provider answered with an error payload
    #[error("Provider error: {0}")]
    ProviderError(String),

    /// Error from indicator calculations
    #[error("Math error: {0}")]
    MathError(#[from] MathError),

    /// Error from IO operations
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Error from JSON artifacts
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Error from CSV writing
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    /// Error from the HTTP client
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Error from parsing a TOML configuration file
    #[error("Config parse error: {0}")]
    ConfigParseError(#[from] toml::de::Error),

    /// Error from Polars operations
    #[error("Polars error: {0}")]
    PolarsError(String),
}

impl ForecastError {
    /// Whether the error means "the pipeline has not produced this yet" rather
    /// than a fault, e.g. predicting before download or train ran.
    pub fn is_not_ready(&self) -> bool {
        matches!(
            self,
            ForecastError::MissingInput { .. }
                | ForecastError::MissingArtifact { .. }
                | ForecastError::NoData { .. }
        )
    }
}

/// Result type with our custom error
pub type Result<T> = std::result::Result<T, ForecastError>;

impl From<PolarsError> for ForecastError {
    fn from(err: PolarsError) -> Self {
        ForecastError::PolarsError(err.to_string())
    }
}
