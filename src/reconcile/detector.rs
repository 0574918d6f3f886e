//! Finding matches that should have a result by now

use crate::data::{AttemptLedger, MatchStore, PendingGroupKey};
use crate::{Config, MatchRecord};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// A stored match waiting on a result, with where it lives
#[derive(Debug, Clone)]
pub struct PendingMatch {
    pub record: MatchRecord,
    pub path: PathBuf,
    pub key: PendingGroupKey,
    /// Attempt number this pass represents (1-based)
    pub attempt: u32,
}

impl PendingMatch {
    pub fn id(&self) -> &str {
        &self.record.id
    }
}

/// Entry of the today file read by the external scheduler
#[derive(Debug, Clone, Serialize)]
pub struct TodayEntry {
    pub id: String,
    pub team: String,
    pub opponent: String,
    pub date: String,
    pub time: String,
    pub category: String,
    pub side: crate::Side,
    pub competition_folder: String,
    pub category_folder: String,
    pub group_folder: String,
    pub phase_folder: String,
    pub path: String,
}

pub struct DueMatchDetector<'a> {
    store: &'a MatchStore,
    match_duration: Duration,
    max_attempts: u32,
}

impl<'a> DueMatchDetector<'a> {
    pub fn new(store: &'a MatchStore, config: &Config) -> Self {
        DueMatchDetector {
            store,
            match_duration: config.matching.match_duration(),
            max_attempts: config.retry.max_attempts,
        }
    }

    /// Matches whose estimated end has passed without a result and with retries left
    pub fn find_due(&self, ledger: &AttemptLedger, now: NaiveDateTime) -> Vec<PendingMatch> {
        let mut due = Vec::new();
        let mut exhausted = 0;
        let mut files = 0;

        for (path, key, records) in self.scan() {
            files += 1;
            for record in records {
                if record.has_result || record.status.is_terminal() {
                    continue;
                }
                let Some(kickoff) = record.kickoff() else {
                    continue;
                };
                if kickoff + self.match_duration > now {
                    continue;
                }

                let attempts = ledger.attempts(&record.id);
                if attempts >= self.max_attempts {
                    exhausted += 1;
                    continue;
                }

                due.push(PendingMatch {
                    record,
                    path: path.clone(),
                    key: key.clone(),
                    attempt: attempts + 1,
                });
            }
        }

        log::info!("Checked {} team files", files);
        if exhausted > 0 {
            log::info!(
                "  {} match(es) skipped after {} attempts",
                exhausted,
                self.max_attempts
            );
        }
        due
    }

    /// Unplayed matches scheduled for `today`
    pub fn find_today(&self, today: NaiveDate) -> Vec<PendingMatch> {
        let mut matches = Vec::new();
        for (path, key, records) in self.scan() {
            for record in records {
                if record.has_result || record.status.is_terminal() {
                    continue;
                }
                if record.match_date() != Some(today) {
                    continue;
                }
                matches.push(PendingMatch {
                    record,
                    path: path.clone(),
                    key: key.clone(),
                    attempt: 0,
                });
            }
        }
        matches
    }

    /// Readable team files in the group tree, with their records
    fn scan(&self) -> Vec<(PathBuf, PendingGroupKey, Vec<MatchRecord>)> {
        let mut out = Vec::new();
        for path in self.store.team_files() {
            let Some(key) = self.store.group_key(&path) else {
                continue;
            };
            match MatchStore::load(&path) {
                Ok(records) => out.push((path, key, records)),
                Err(e) => log::warn!("Skipping {}: {}", path.display(), e),
            }
        }
        out
    }
}

/// Batch pending matches so each group is scraped once
pub fn group_by_key(pending: Vec<PendingMatch>) -> BTreeMap<PendingGroupKey, Vec<PendingMatch>> {
    let mut groups: BTreeMap<PendingGroupKey, Vec<PendingMatch>> = BTreeMap::new();
    for p in pending {
        groups.entry(p.key.clone()).or_default().push(p);
    }
    groups
}

impl TodayEntry {
    pub fn from_pending(pending: &PendingMatch, store: &MatchStore) -> Self {
        let relative = pending
            .path
            .strip_prefix(store.base_dir())
            .unwrap_or(&pending.path);
        TodayEntry {
            id: pending.record.id.clone(),
            team: pending.record.team.clone(),
            opponent: pending.record.opponent.clone(),
            date: pending.record.date.clone(),
            time: pending.record.time.clone(),
            category: pending.record.category.clone(),
            side: pending.record.side,
            competition_folder: pending.key.competition.clone(),
            category_folder: pending.key.category.clone(),
            group_folder: pending.key.group.clone(),
            phase_folder: pending.key.phase.clone(),
            path: relative.to_string_lossy().into_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(id: &str, date: &str, time: &str, status: &str, scores: Option<(u32, u32)>) -> String {
        let (home, away) = match scores {
            Some((h, a)) => (h.to_string(), a.to_string()),
            None => ("null".to_string(), "null".to_string()),
        };
        format!(
            r#"{{"id": "{id}", "team": "CLUB A", "opponent": "CLUB B", "side": "home",
                "date": "{date}", "time": "{time}", "home_score": {home}, "away_score": {away},
                "has_result": {has}, "status": "{status}"}}"#,
            has = scores.is_some()
        )
    }

    fn at(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, day)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    fn config() -> Config {
        let mut config = Config::default();
        config.team.slug = "club-a".to_string();
        config.matching.match_duration_hours = 2.5;
        config.retry.max_attempts = 3;
        config
    }

    fn setup(records: &[String]) -> (tempfile::TempDir, MatchStore, AttemptLedger) {
        let dir = tempdir().unwrap();
        let group = dir.path().join("data/liga/senior/grupo-a/primera-fase");
        std::fs::create_dir_all(&group).unwrap();
        std::fs::write(group.join("club-a.json"), format!("[{}]", records.join(","))).unwrap();
        std::fs::write(group.join("club-a-broken.json"), "[{").unwrap();
        let store = MatchStore::new(dir.path().join("data"), "club-a");
        let ledger =
            AttemptLedger::load(dir.path().join("attempts.json"), Duration::hours(48), at(12, 21, 0))
                .unwrap();
        (dir, store, ledger)
    }

    #[test]
    fn test_due_after_estimated_end() {
        let (_dir, store, ledger) = setup(&[
            record("played", "12/05/2024", "18:00", "upcoming", None),
            record("late", "12/05/2024", "19:00", "upcoming", None),
            record("noon", "12/05/2024", "", "upcoming", None),
            record("done", "12/05/2024", "10:00", "finished", Some((70, 65))),
            record("bad-date", "32/13/2024", "10:00", "upcoming", None),
            record("postponed", "05/05/2024", "10:00", "postponed", None),
        ]);
        let config = config();
        let detector = DueMatchDetector::new(&store, &config);

        let due = detector.find_due(&ledger, at(12, 21, 0));
        let ids: Vec<&str> = due.iter().map(|p| p.id()).collect();
        assert_eq!(ids, vec!["played", "noon"]);
        assert_eq!(due[0].attempt, 1);
        assert_eq!(due[0].key.phase, "primera-fase");

        // estimated end is inclusive
        let due = detector.find_due(&ledger, at(12, 20, 30));
        assert_eq!(due.iter().map(|p| p.id()).collect::<Vec<_>>(), vec!["played", "noon"]);
        let due = detector.find_due(&ledger, at(12, 20, 29));
        assert_eq!(due.iter().map(|p| p.id()).collect::<Vec<_>>(), vec!["noon"]);
    }

    #[test]
    fn test_exhausted_matches_are_excluded() {
        let (_dir, store, mut ledger) = setup(&[
            record("a", "12/05/2024", "18:00", "upcoming", None),
            record("b", "12/05/2024", "18:00", "upcoming", None),
        ]);
        let config = config();
        for _ in 0..3 {
            ledger.record_failure("a", at(12, 20, 0));
        }
        ledger.record_failure("b", at(12, 20, 0));

        let due = DueMatchDetector::new(&store, &config).find_due(&ledger, at(12, 21, 0));
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id(), "b");
        assert_eq!(due[0].attempt, 2);
        assert!(due.iter().all(|p| ledger.attempts(p.id()) < config.retry.max_attempts));
    }

    #[test]
    fn test_find_today_and_grouping() {
        let (dir, store, _ledger) = setup(&[
            record("today", "12/05/2024", "23:00", "upcoming", None),
            record("yesterday", "11/05/2024", "18:00", "upcoming", None),
        ]);
        let other = dir.path().join("data/copa/senior/unico/final");
        std::fs::create_dir_all(&other).unwrap();
        std::fs::write(
            other.join("club-a.json"),
            format!("[{}]", record("cup", "12/05/2024", "", "upcoming", None)),
        )
        .unwrap();

        let config = config();
        let detector = DueMatchDetector::new(&store, &config);
        let today = detector.find_today(NaiveDate::from_ymd_opt(2024, 5, 12).unwrap());
        assert_eq!(today.len(), 2);

        let entry = TodayEntry::from_pending(&today[0], &store);
        assert_eq!(entry.competition_folder, "copa");
        assert!(entry.path.ends_with("club-a.json"));

        let groups = group_by_key(today);
        assert_eq!(groups.len(), 2);
        assert!(groups.values().all(|g| g.len() == 1));
    }
}
