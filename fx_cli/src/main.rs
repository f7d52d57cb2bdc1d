//! `fx`: download market data, train models, print predictions or serve them
//! over HTTP.
//!
//! ```bash
//! fx download
//! fx train
//! fx predict --symbol USDTRY
//! fx predict --all
//! fx serve --addr 127.0.0.1:8000
//! ```

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use fx_forecast::acquisition::YahooChartSource;
use fx_forecast::{AppConfig, Assistant, BatchOutcome};
use serde::Serialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

mod api;

#[derive(Parser)]
#[command(name = "fx")]
#[command(about = "Daily FX, metal and crypto forecasting assistant", long_about = None)]
#[command(version)]
struct Cli {
    /// TOML configuration file; built-in defaults when omitted
    #[arg(short, long, global = true, env = "FX_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download daily bars for every configured symbol
    Download,

    /// Train the horizon models of every configured symbol
    Train,

    /// Print predictions as JSON lines
    Predict {
        /// Symbol to predict, e.g. USDTRY
        #[arg(short, long, conflicts_with = "all", required_unless_present = "all")]
        symbol: Option<String>,

        /// Predict every configured symbol
        #[arg(long)]
        all: bool,
    },

    /// List the configured symbols
    Symbols,

    /// Serve the HTTP API
    Serve {
        #[arg(long, default_value = "127.0.0.1:8000")]
        addr: SocketAddr,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fx_forecast=info,fx_cli=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    let source = Arc::new(YahooChartSource::new().context("failed to build the HTTP client")?);
    let assistant = Assistant::new(config, source).context("invalid configuration")?;

    match cli.command {
        Commands::Download => {
            let outcome = assistant.download_all();
            for (symbol, path) in &outcome.succeeded {
                print_json(&serde_json::json!({ "symbol": symbol, "path": path }))?;
            }
            check_batch("download", &outcome)
        }
        Commands::Train => {
            let outcome = assistant.train_all()?;
            for (symbol, metrics) in &outcome.succeeded {
                print_json(&serde_json::json!({ "symbol": symbol, "metrics": metrics }))?;
            }
            check_batch("train", &outcome)
        }
        Commands::Predict { symbol, .. } => {
            for prediction in assistant.predict(symbol.as_deref())?.into_vec() {
                print_json(&prediction)?;
            }
            Ok(())
        }
        Commands::Symbols => {
            for symbol in assistant.list_symbols() {
                println!("{}", symbol);
            }
            Ok(())
        }
        Commands::Serve { addr } => serve(assistant, addr),
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<AppConfig> {
    match path {
        Some(path) => {
            info!(path = %path.display(), "Loading configuration");
            AppConfig::from_toml_file(path)
                .with_context(|| format!("failed to load configuration from {}", path.display()))
        }
        None => Ok(AppConfig::default()),
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

fn check_batch<T>(stage: &str, outcome: &BatchOutcome<T>) -> anyhow::Result<()> {
    if outcome.is_complete() {
        return Ok(());
    }
    for (symbol, e) in &outcome.failed {
        eprintln!("{}: {}", symbol, e);
    }
    bail!(
        "{} failed for {} of {} symbols",
        stage,
        outcome.failed.len(),
        outcome.failed.len() + outcome.succeeded.len()
    )
}

fn serve(assistant: Assistant, addr: SocketAddr) -> anyhow::Result<()> {
    // The blocking HTTP client inside the assistant must not be dropped from
    // async code, so the last handle stays here until the runtime is gone.
    let state = Arc::new(api::ApiState::new(assistant));
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start the async runtime")?;

    let result = runtime.block_on(api::serve(Arc::clone(&state), addr));
    drop(runtime);
    drop(state);
    result
}
