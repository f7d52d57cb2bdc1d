//! Filesystem, JSON and seeding helpers shared by the pipeline stages

use crate::error::Result;
use crate::features::Horizon;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Create a directory and all of its parents if they do not exist yet
pub fn ensure_dir<P: AsRef<Path>>(path: P) -> Result<()> {
    fs::create_dir_all(path)?;
    Ok(())
}

/// Create the parent directory of a file path
pub fn ensure_parent<P: AsRef<Path>>(path: P) -> Result<()> {
    match path.as_ref().parent() {
        Some(parent) if !parent.as_os_str().is_empty() => ensure_dir(parent),
        _ => Ok(()),
    }
}

/// Write a value as pretty-printed JSON, creating parent directories
pub fn save_json<P: AsRef<Path>, T: Serialize + ?Sized>(path: P, value: &T) -> Result<()> {
    let path = path.as_ref();
    ensure_parent(path)?;

    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

/// Read a JSON file into a value
pub fn load_json<P: AsRef<Path>, T: DeserializeOwned>(path: P) -> Result<T> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

/// Locations of every artifact the pipeline reads or writes.
///
/// File names use the lowercase symbol so `USDTRY` and `usdtry` land on the
/// same files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    data_dir: PathBuf,
    models_dir: PathBuf,
    reports_dir: PathBuf,
}

impl ArtifactPaths {
    pub fn new<P: Into<PathBuf>>(data_dir: P, models_dir: P, reports_dir: P) -> Self {
        Self {
            data_dir: data_dir.into(),
            models_dir: models_dir.into(),
            reports_dir: reports_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    pub fn reports_dir(&self) -> &Path {
        &self.reports_dir
    }

    /// `<data_dir>/raw_<symbol>.csv`
    pub fn raw_table(&self, symbol: &str) -> PathBuf {
        self.data_dir
            .join(format!("raw_{}.csv", symbol.to_lowercase()))
    }

    /// `<data_dir>/processed_<symbol>.csv`
    pub fn processed_table(&self, symbol: &str) -> PathBuf {
        self.data_dir
            .join(format!("processed_{}.csv", symbol.to_lowercase()))
    }

    /// `<models_dir>/<symbol>_<horizon>.json`
    pub fn model(&self, symbol: &str, horizon: Horizon) -> PathBuf {
        self.models_dir
            .join(format!("{}_{}.json", symbol.to_lowercase(), horizon))
    }

    /// `<models_dir>/<symbol>_risk_thresholds.json`
    pub fn risk_thresholds(&self, symbol: &str) -> PathBuf {
        self.models_dir
            .join(format!("{}_risk_thresholds.json", symbol.to_lowercase()))
    }

    pub fn metrics_report(&self) -> PathBuf {
        self.reports_dir.join("metrics.json")
    }

    pub fn last_update(&self) -> PathBuf {
        self.reports_dir.join("last_update.json")
    }

    /// Create the three artifact directories
    pub fn ensure_dirs(&self) -> Result<()> {
        ensure_dir(&self.data_dir)?;
        ensure_dir(&self.models_dir)?;
        ensure_dir(&self.reports_dir)
    }
}

/// Deterministic random source for everything that samples during training
pub fn seeded_rng(seed: u64) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(seed)
}
