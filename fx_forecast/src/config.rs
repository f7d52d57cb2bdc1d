//! Application configuration
//!
//! A single immutable [`AppConfig`] is built at startup (defaults or a TOML
//! file) and shared by every pipeline component.

use crate::error::{ForecastError, Result};
use crate::features::SplitConfig;
use crate::models::GradientBoostingParams;
use crate::utils::ArtifactPaths;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// A tradable series and the provider tickers that can serve it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolConfig {
    /// Canonical symbol, e.g. `USDTRY`
    pub name: String,
    /// Primary provider ticker, e.g. `USDTRY=X`
    pub ticker: String,
    /// Tickers tried before the primary one
    #[serde(default)]
    pub fallbacks: Vec<String>,
}

impl SymbolConfig {
    pub fn new(name: &str, ticker: &str) -> Self {
        Self {
            name: name.to_string(),
            ticker: ticker.to_string(),
            fallbacks: Vec::new(),
        }
    }

    pub fn with_fallbacks(mut self, fallbacks: &[&str]) -> Self {
        self.fallbacks = fallbacks.iter().map(|t| t.to_string()).collect();
        self
    }

    /// Tickers in the order they should be tried: fallbacks, then the
    /// primary, without duplicates.
    pub fn candidates(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.fallbacks
            .iter()
            .chain(std::iter::once(&self.ticker))
            .filter(|ticker| seen.insert(ticker.as_str()))
            .cloned()
            .collect()
    }
}

/// Configuration shared by the downloader, trainer, predictor and front ends
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub models_dir: PathBuf,
    pub reports_dir: PathBuf,
    /// First date requested from the market data provider
    pub start_date: NaiveDate,
    pub split: SplitConfig,
    /// Seed for every random draw made while fitting models
    pub seed: u64,
    /// Minimum age of the last refresh before the HTTP front end refreshes again
    pub update_interval_hours: u64,
    pub model: GradientBoostingParams,
    pub symbols: Vec<SymbolConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            models_dir: PathBuf::from("models"),
            reports_dir: PathBuf::from("reports"),
            start_date: NaiveDate::from_ymd_opt(2005, 1, 1).unwrap_or(NaiveDate::MIN),
            split: SplitConfig::default(),
            seed: 42,
            update_interval_hours: 6,
            model: GradientBoostingParams::default(),
            symbols: default_symbols(),
        }
    }
}

fn default_symbols() -> Vec<SymbolConfig> {
    vec![
        SymbolConfig::new("USDTRY", "USDTRY=X"),
        SymbolConfig::new("EURTRY", "EURTRY=X"),
        SymbolConfig::new("GBPTRY", "GBPTRY=X"),
        SymbolConfig::new("XAUUSD", "XAUUSD=X").with_fallbacks(&["GC=F", "XAUUSD=X"]),
        SymbolConfig::new("XAGUSD", "XAGUSD=X").with_fallbacks(&["SI=F", "XAGUSD=X"]),
        SymbolConfig::new("BTCUSD", "BTC-USD"),
        SymbolConfig::new("ETHUSD", "ETH-USD"),
    ]
}

impl AppConfig {
    /// Parse and validate a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML configuration file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let source = fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    pub fn validate(&self) -> Result<()> {
        if self.symbols.is_empty() {
            return Err(ForecastError::InvalidConfig(
                "At least one symbol must be configured".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for symbol in &self.symbols {
            let name = symbol.name.trim();
            if name.is_empty() || symbol.ticker.trim().is_empty() {
                return Err(ForecastError::InvalidConfig(format!(
                    "Symbol entries need a name and a ticker, got {:?}",
                    symbol
                )));
            }
            if !names.insert(name.to_uppercase()) {
                return Err(ForecastError::InvalidConfig(format!(
                    "Symbol {} is configured more than once",
                    name
                )));
            }
        }

        if self.split.train_end >= self.split.val_end {
            return Err(ForecastError::InvalidConfig(format!(
                "train_end {} must be before val_end {}",
                self.split.train_end, self.split.val_end
            )));
        }

        if self.update_interval_hours == 0 {
            return Err(ForecastError::InvalidConfig(
                "update_interval_hours must be positive".to_string(),
            ));
        }

        self.model.validate()
    }

    /// Configured symbol names in configuration order
    pub fn symbol_names(&self) -> Vec<String> {
        self.symbols.iter().map(|s| s.name.clone()).collect()
    }

    /// Look a symbol up ignoring case and surrounding whitespace
    pub fn resolve_symbol(&self, symbol: &str) -> Result<&SymbolConfig> {
        let wanted = symbol.trim().to_uppercase();
        self.symbols
            .iter()
            .find(|s| s.name.trim().to_uppercase() == wanted)
            .ok_or_else(|| ForecastError::UnknownSymbol {
                symbol: wanted,
                known: self.symbol_names(),
            })
    }

    pub fn paths(&self) -> ArtifactPaths {
        ArtifactPaths::new(
            self.data_dir.clone(),
            self.models_dir.clone(),
            self.reports_dir.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        config.validate().unwrap();

        assert_eq!(config.seed, 42);
        assert_eq!(config.start_date.to_string(), "2005-01-01");
        assert_eq!(
            config.symbol_names(),
            vec!["USDTRY", "EURTRY", "GBPTRY", "XAUUSD", "XAGUSD", "BTCUSD", "ETHUSD"]
        );
    }

    #[test]
    fn test_shipped_config_matches_defaults() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../config/default.toml");
        assert_eq!(AppConfig::from_toml_file(path).unwrap(), AppConfig::default());
    }

    #[test]
    fn test_candidates_put_fallbacks_first_without_duplicates() {
        let config = AppConfig::default();

        let gold = config.resolve_symbol("XAUUSD").unwrap();
        assert_eq!(gold.candidates(), vec!["GC=F", "XAUUSD=X"]);

        let lira = config.resolve_symbol("USDTRY").unwrap();
        assert_eq!(lira.candidates(), vec!["USDTRY=X"]);
    }

    #[test]
    fn test_resolve_symbol_ignores_case_and_whitespace() {
        let config = AppConfig::default();
        assert_eq!(config.resolve_symbol("  btcusd ").unwrap().ticker, "BTC-USD");

        match config.resolve_symbol("DOGEUSD") {
            Err(ForecastError::UnknownSymbol { symbol, known }) => {
                assert_eq!(symbol, "DOGEUSD");
                assert_eq!(known.len(), 7);
            }
            other => panic!("expected UnknownSymbol, got {:?}", other),
        }
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = AppConfig::from_toml_str(
            r#"
            data_dir = "/tmp/fx/data"
            seed = 7

            [split]
            train_end = "2020-12-31"
            val_end = "2021-12-31"

            [[symbols]]
            name = "USDTRY"
            ticker = "USDTRY=X"
            "#,
        )
        .unwrap();

        assert_eq!(config.data_dir, PathBuf::from("/tmp/fx/data"));
        assert_eq!(config.models_dir, PathBuf::from("models"));
        assert_eq!(config.seed, 7);
        assert_eq!(config.split.train_end.to_string(), "2020-12-31");
        assert_eq!(config.symbols.len(), 1);
        assert_eq!(config.model, GradientBoostingParams::default());
    }

    #[test]
    fn test_validate_rejects_bad_configs() {
        let mut config = AppConfig::default();
        config.symbols.push(SymbolConfig::new("usdtry", "TRY=X"));
        assert!(matches!(config.validate(), Err(ForecastError::InvalidConfig(_))));

        let mut config = AppConfig::default();
        config.split.val_end = config.split.train_end;
        assert!(matches!(config.validate(), Err(ForecastError::InvalidConfig(_))));

        let config = AppConfig {
            symbols: Vec::new(),
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
