//! Time-based refresh gate backed by the last-update marker file

use crate::error::Result;
use crate::utils::{load_json, save_json};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::{info, warn};

#[derive(Debug, Serialize, Deserialize)]
struct LastUpdate {
    last_update: DateTime<Utc>,
}

/// Runs a refresh at most once per interval, even under concurrent callers.
///
/// Callers that find the marker stale queue on the lock and re-check the
/// marker once they hold it, so only the first of them refreshes.
#[derive(Debug)]
pub struct RefreshGate {
    marker: PathBuf,
    interval: Duration,
    lock: Mutex<()>,
}

impl RefreshGate {
    pub fn new<P: Into<PathBuf>>(marker: P, interval_hours: u64) -> Self {
        // clamped to a century to stay inside chrono's range
        let hours = interval_hours.min(24 * 365 * 100) as i64;
        Self {
            marker: marker.into(),
            interval: Duration::hours(hours),
            lock: Mutex::new(()),
        }
    }

    pub fn marker(&self) -> &Path {
        &self.marker
    }

    /// Time of the last successful refresh; `None` when the marker is absent
    /// or unreadable.
    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        if !self.marker.exists() {
            return None;
        }
        match load_json::<_, LastUpdate>(&self.marker) {
            Ok(marker) => Some(marker.last_update),
            Err(e) => {
                warn!(path = %self.marker.display(), error = %e, "Ignoring unreadable last-update marker");
                None
            }
        }
    }

    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.last_update()
            .map_or(false, |last| now - last < self.interval)
    }

    /// Record `at` as the time of the last refresh
    pub fn mark(&self, at: DateTime<Utc>) -> Result<()> {
        save_json(&self.marker, &LastUpdate { last_update: at })
    }

    /// Run `refresh` when the marker is missing or older than the interval.
    ///
    /// Returns whether this call ran the refresh. The marker is only written
    /// after `refresh` succeeds.
    pub fn refresh_if_stale<F>(&self, now: DateTime<Utc>, refresh: F) -> Result<bool>
    where
        F: FnOnce() -> Result<()>,
    {
        if self.is_fresh(now) {
            return Ok(false);
        }

        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        if self.is_fresh(now) {
            return Ok(false);
        }

        info!(marker = %self.marker.display(), "Data is stale; refreshing");
        refresh()?;
        self.mark(now)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use tempfile::tempdir;

    #[test]
    fn test_missing_marker_is_stale() {
        let dir = tempdir().unwrap();
        let gate = RefreshGate::new(dir.path().join("last_update.json"), 6);
        assert!(!gate.is_fresh(Utc::now()));
    }

    #[test]
    fn test_marker_expires_after_interval() {
        let dir = tempdir().unwrap();
        let gate = RefreshGate::new(dir.path().join("last_update.json"), 6);
        let start = Utc::now();

        assert!(gate.refresh_if_stale(start, || Ok(())).unwrap());
        assert!(gate.is_fresh(start + Duration::hours(5)));
        assert!(!gate.is_fresh(start + Duration::hours(6)));
        assert!(!gate.refresh_if_stale(start + Duration::hours(1), || Ok(())).unwrap());
    }

    #[test]
    fn test_failed_refresh_leaves_marker_untouched() {
        let dir = tempdir().unwrap();
        let gate = RefreshGate::new(dir.path().join("last_update.json"), 6);

        let result = gate.refresh_if_stale(Utc::now(), || {
            Err(crate::ForecastError::ProviderError("offline".to_string()))
        });
        assert!(result.is_err());
        assert!(gate.last_update().is_none());
    }

    #[test]
    fn test_concurrent_callers_refresh_once() {
        let dir = tempdir().unwrap();
        let gate = Arc::new(RefreshGate::new(dir.path().join("last_update.json"), 6));
        let runs = Arc::new(AtomicUsize::new(0));
        let now = Utc::now();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let gate = Arc::clone(&gate);
                let runs = Arc::clone(&runs);
                thread::spawn(move || {
                    gate.refresh_if_stale(now, || {
                        runs.fetch_add(1, Ordering::SeqCst);
                        thread::sleep(std::time::Duration::from_millis(20));
                        Ok(())
                    })
                    .unwrap()
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_garbage_marker_counts_as_missing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("last_update.json");
        std::fs::write(&path, "not json").unwrap();

        let gate = RefreshGate::new(path, 6);
        assert!(gate.last_update().is_none());
    }
}
