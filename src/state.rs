use std::{
    collections::BTreeMap,
    fs,
    fs::OpenOptions,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::warn;

use crate::signal::SignalType;

/// Last notification sent for one coin. Overwritten by the daily job right
/// after a send attempt; never expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub last_alert_date: NaiveDate,
    pub last_signal_type: SignalType,
}

pub type AlertMap = BTreeMap<String, AlertRecord>;

/// File-backed store for alert records: one JSON blob for the whole
/// watchlist. Reads never fail the caller; writes take an exclusive advisory
/// lock and replace the file atomically so overlapping manual and scheduled
/// runs cannot interleave partial state.
#[derive(Debug, Clone)]
pub struct AlertStore {
    path: PathBuf,
}

impl AlertStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load all records. Missing or corrupt state degrades to an empty map.
    pub fn load(&self) -> AlertMap {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(_) => return AlertMap::new(),
        };
        match serde_json::from_str(&raw) {
            Ok(map) => map,
            Err(e) => {
                warn!(
                    "alert state at {} is corrupt ({}); starting empty",
                    self.path.display(),
                    e
                );
                AlertMap::new()
            }
        }
    }

    /// Persist all records: write to a temp file in the same directory, then
    /// rename over the old state while holding the lock.
    pub fn save(&self, records: &AlertMap) -> Result<()> {
        let dir = self.path.parent().unwrap_or(Path::new("."));
        fs::create_dir_all(dir).ok();

        // Keep the handle alive to hold the lock until the rename lands.
        let lock_path = self.path.with_extension("lock");
        let lock = OpenOptions::new()
            .create(true)
            .truncate(true)
            .read(true)
            .write(true)
            .open(&lock_path)
            .context("open state lock file")?;
        lock.lock_exclusive().context("lock state file")?;

        let mut tmp = NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(tmp.as_file_mut(), records)?;
        tmp.persist(&self.path).context("replace state file")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(date: &str, sig: SignalType) -> AlertRecord {
        AlertRecord {
            last_alert_date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            last_signal_type: sig,
        }
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = AlertStore::new(dir.path().join("alert_state.json"));
        assert!(store.load().is_empty());
    }

    #[test]
    fn corrupt_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alert_state.json");
        fs::write(&path, "{not json").unwrap();
        let store = AlertStore::new(path);
        assert!(store.load().is_empty());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = AlertStore::new(dir.path().join("alert_state.json"));

        let mut map = AlertMap::new();
        map.insert("bitcoin".into(), record("2026-08-07", SignalType::Accumulation));
        map.insert("ethereum".into(), record("2026-08-06", SignalType::ProfitTaking));
        store.save(&map).unwrap();

        assert_eq!(store.load(), map);
    }

    #[test]
    fn save_replaces_previous_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = AlertStore::new(dir.path().join("alert_state.json"));

        let mut first = AlertMap::new();
        first.insert("bitcoin".into(), record("2026-08-01", SignalType::ProfitTaking));
        store.save(&first).unwrap();

        let mut second = AlertMap::new();
        second.insert("bitcoin".into(), record("2026-08-07", SignalType::Accumulation));
        store.save(&second).unwrap();

        assert_eq!(store.load(), second);
    }

    #[test]
    fn signal_type_round_trips_as_enum_string() {
        let json = serde_json::to_string(&record("2026-08-07", SignalType::ProfitTaking)).unwrap();
        assert!(json.contains("\"ProfitTaking\""));
        assert!(json.contains("2026-08-07"));
        let back: AlertRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.last_signal_type, SignalType::ProfitTaking);
    }
}
