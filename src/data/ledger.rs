//! Persisted retry counters for matches still waiting on a result

use super::store::write_atomic;
use crate::Result;
use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptEntry {
    pub attempts: u32,
    pub last_attempt: NaiveDateTime,
}

/// Attempt counters keyed by match id, backed by a JSON file
#[derive(Debug)]
pub struct AttemptLedger {
    path: PathBuf,
    entries: BTreeMap<String, AttemptEntry>,
}

impl AttemptLedger {
    /// Load the ledger, dropping entries whose last attempt is older than `expiry`
    ///
    /// A missing or unparseable file yields an empty ledger.
    pub fn load<P: AsRef<Path>>(path: P, expiry: Duration, now: NaiveDateTime) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries: BTreeMap<String, AttemptEntry> = match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(entries) => entries,
                Err(e) => {
                    log::warn!("Ignoring unreadable ledger {}: {}", path.display(), e);
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        let total = entries.len();
        let entries: BTreeMap<_, _> = entries
            .into_iter()
            .filter(|(_, entry)| now - entry.last_attempt < expiry)
            .collect();
        if entries.len() < total {
            log::debug!("Expired {} stale ledger entries", total - entries.len());
        }

        Ok(AttemptLedger { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn attempts(&self, id: &str) -> u32 {
        self.entries.get(id).map(|e| e.attempts).unwrap_or(0)
    }

    pub fn get(&self, id: &str) -> Option<&AttemptEntry> {
        self.entries.get(id)
    }

    /// Count a failed attempt, returning the new total
    pub fn record_failure(&mut self, id: &str, now: NaiveDateTime) -> u32 {
        let entry = self
            .entries
            .entry(id.to_string())
            .or_insert(AttemptEntry {
                attempts: 0,
                last_attempt: now,
            });
        entry.attempts += 1;
        entry.last_attempt = now;
        entry.attempts
    }

    /// Forget a match once its result is in
    pub fn clear(&mut self, id: &str) -> bool {
        self.entries.remove(id).is_some()
    }

    pub fn entries(&self) -> &BTreeMap<String, AttemptEntry> {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Overwrite the ledger file with the current map
    pub fn save(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.entries)?;
        write_atomic(&self.path, json.as_bytes())
    }

    /// Delete the ledger file; returns whether one existed
    pub fn reset<P: AsRef<Path>>(path: P) -> Result<bool> {
        match std::fs::remove_file(path.as_ref()) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::tempdir;

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let ledger =
            AttemptLedger::load(dir.path().join("attempts.json"), Duration::hours(48), at(12, 21))
                .unwrap();
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_record_clear_and_persist() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("attempts.json");
        let mut ledger = AttemptLedger::load(&path, Duration::hours(48), at(12, 21)).unwrap();
        assert_eq!(ledger.path(), path.as_path());

        assert_eq!(ledger.record_failure("a", at(12, 21)), 1);
        assert_eq!(ledger.record_failure("a", at(12, 22)), 2);
        assert_eq!(ledger.record_failure("b", at(12, 22)), 1);
        assert!(ledger.clear("b"));
        assert!(!ledger.clear("b"));
        ledger.save().unwrap();

        let reloaded = AttemptLedger::load(&path, Duration::hours(48), at(12, 23)).unwrap();
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.attempts("a"), 2);
        assert_eq!(reloaded.get("a").unwrap().last_attempt, at(12, 22));
        assert_eq!(reloaded.attempts("b"), 0);
    }

    #[test]
    fn test_stale_entries_expire_on_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("attempts.json");
        std::fs::write(
            &path,
            r#"{
              "old": {"attempts": 5, "last_attempt": "2024-05-10T20:00:00"},
              "recent": {"attempts": 2, "last_attempt": "2024-05-11T08:30:00.250000"}
            }"#,
        )
        .unwrap();

        let ledger = AttemptLedger::load(&path, Duration::hours(48), at(12, 21)).unwrap();
        assert_eq!(ledger.attempts("old"), 0);
        assert_eq!(ledger.attempts("recent"), 2);
        assert!(ledger.entries().keys().all(|id| id != "old"));
    }

    #[test]
    fn test_corrupt_file_loads_empty_and_reset() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("attempts.json");
        std::fs::write(&path, "not json").unwrap();

        let ledger = AttemptLedger::load(&path, Duration::hours(48), at(12, 21)).unwrap();
        assert!(ledger.is_empty());

        assert!(AttemptLedger::reset(&path).unwrap());
        assert!(!AttemptLedger::reset(&path).unwrap());
    }
}
