//! Reconciliation pass
//!
//! Scrapes each group that has due matches exactly once, fills in published results and
//! keeps the attempt ledger up to date. The ledger is written once, at the end of the pass.

use super::classifier::classify;
use super::detector::{group_by_key, DueMatchDetector, PendingMatch};
use super::names::{normalize, NameMatcher};
use crate::data::scrapers::group::GroupScraper;
use crate::data::scrapers::{Jitter, PageDriver};
use crate::data::{AttemptLedger, CompetitionUrls, MatchStore, PendingGroupKey};
use crate::standings::StandingsTable;
use crate::{Config, MatchRecord, Result, Side, Status, WebRow};
use chrono::NaiveDateTime;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Counts reported at the end of a pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub due: usize,
    pub resolved: usize,
    pub postponed: usize,
    pub awaiting_result: usize,
    pub groups_scraped: usize,
    pub groups_failed: usize,
    pub groups_skipped: usize,
}

impl ReconcileSummary {
    /// Due matches that are neither resolved nor given a final status
    pub fn still_pending(&self) -> usize {
        self.due
            .saturating_sub(self.resolved + self.postponed + self.awaiting_result)
    }
}

/// Outcome for one due match in a scraped group
enum Outcome {
    Resolved,
    Unresolved,
}

pub struct Reconciler<'a> {
    config: &'a Config,
    store: MatchStore,
    ledger: AttemptLedger,
    urls: CompetitionUrls,
    matcher: NameMatcher,
    scraper: GroupScraper,
    group_pause: Jitter,
}

impl<'a> Reconciler<'a> {
    pub fn new(
        config: &'a Config,
        store: MatchStore,
        ledger: AttemptLedger,
        urls: CompetitionUrls,
    ) -> Self {
        Reconciler {
            config,
            store,
            ledger,
            urls,
            matcher: NameMatcher::new(config.matching.name_similarity),
            scraper: GroupScraper::new(config),
            group_pause: Jitter::from_millis(config.browser.group_pause_ms),
        }
    }

    pub fn ledger(&self) -> &AttemptLedger {
        &self.ledger
    }

    pub fn due_matches(&self, now: NaiveDateTime) -> Vec<PendingMatch> {
        DueMatchDetector::new(&self.store, self.config).find_due(&self.ledger, now)
    }

    /// Run one pass; `launch` is only called when something is due
    ///
    /// Only a browser launch failure or a ledger write failure is returned as an error.
    pub fn reconcile<D, F>(&mut self, now: NaiveDateTime, launch: F) -> Result<ReconcileSummary>
    where
        D: PageDriver,
        F: FnOnce() -> Result<D>,
    {
        let due = self.due_matches(now);
        let mut summary = ReconcileSummary {
            due: due.len(),
            ..Default::default()
        };

        if due.is_empty() {
            log::info!("No matches waiting on a result");
            return Ok(summary);
        }

        log::info!("{} match(es) waiting on a result:", due.len());
        for p in &due {
            log::info!(
                "  [{}/{}] {} vs {} ({} {}) -- {}",
                p.attempt,
                self.config.retry.max_attempts,
                p.record.team,
                p.record.opponent,
                p.record.date,
                p.record.time,
                p.key.category
            );
        }

        let groups = group_by_key(due);
        log::info!("{} group(s) to scrape", groups.len());

        let mut driver = match launch() {
            Ok(driver) => driver,
            Err(e) => {
                self.ledger.save()?;
                return Err(e);
            }
        };

        for (key, matches) in groups {
            self.process_group(&mut driver, &key, &matches, now, &mut summary);
            self.group_pause.pause();
        }

        self.ledger.save()?;

        log::info!(
            "SUMMARY: {} result(s) found for {} pending match(es), {} still pending",
            summary.resolved,
            summary.due,
            summary.still_pending()
        );
        Ok(summary)
    }

    fn process_group<D: PageDriver>(
        &mut self,
        driver: &mut D,
        key: &PendingGroupKey,
        matches: &[PendingMatch],
        now: NaiveDateTime,
        summary: &mut ReconcileSummary,
    ) {
        let Some(url) = self.urls.get(&key.competition).map(str::to_string) else {
            log::warn!("Competition '{}' has no URL; skipping", key.competition);
            summary.groups_skipped += 1;
            return;
        };

        log::info!("{}", key);
        let rows = match self
            .scraper
            .scrape_group(driver, &url, &key.category, &key.phase, &key.group)
        {
            Ok(rows) => rows,
            Err(e) => {
                log::error!("  Scrape failed: {}", e);
                if let Err(e) = driver.navigate("about:blank") {
                    log::debug!("  Could not reset the page: {}", e);
                }
                self.group_pause.pause();
                Vec::new()
            }
        };

        if rows.is_empty() {
            summary.groups_failed += 1;
            for p in matches {
                self.ledger.record_failure(p.id(), now);
            }
            return;
        }

        summary.groups_scraped += 1;
        let with_result = rows.iter().filter(|r| r.has_result).count();
        log::info!("  Portal: {} matches ({} with result)", rows.len(), with_result);

        self.refresh_standings(key, matches, &rows, now);
        self.apply_rows(matches, &rows, now, summary);
    }

    /// Match due records against the scraped rows and write each touched file once
    fn apply_rows(
        &mut self,
        matches: &[PendingMatch],
        rows: &[WebRow],
        now: NaiveDateTime,
        summary: &mut ReconcileSummary,
    ) {
        let max_attempts = self.config.retry.max_attempts;
        let quorum = self.config.matching.postponed_quorum;

        let mut files: BTreeMap<PathBuf, Vec<MatchRecord>> = BTreeMap::new();
        let mut outcomes: Vec<(&PendingMatch, Outcome)> = Vec::new();

        for p in matches {
            if !files.contains_key(&p.path) {
                match MatchStore::load(&p.path) {
                    Ok(records) => {
                        files.insert(p.path.clone(), records);
                    }
                    Err(e) => {
                        log::error!("  Could not reload {}: {}", p.path.display(), e);
                        self.ledger.record_failure(p.id(), now);
                        continue;
                    }
                }
            }
            let Some(records) = files.get_mut(&p.path) else {
                self.ledger.record_failure(p.id(), now);
                continue;
            };
            let Some(record) = records.iter_mut().find(|r| r.id == p.record.id) else {
                log::warn!("  Match {} vanished from {}", p.id(), p.path.display());
                continue;
            };
            if record.has_result {
                self.ledger.clear(p.id());
                continue;
            }

            if let Some(row) = self.find_result(record, rows) {
                log::info!(
                    "  RESULT: {} {}-{} {}",
                    row.home,
                    row.home_score.unwrap_or_default(),
                    row.away_score.unwrap_or_default(),
                    row.away
                );
                record.apply_result(row);
                outcomes.push((p, Outcome::Resolved));
                continue;
            }

            let attempts = self.ledger.record_failure(p.id(), now);
            if attempts >= max_attempts {
                log::info!(
                    "  GAVE UP ({}/{}): {} vs {}",
                    attempts,
                    max_attempts,
                    record.team,
                    record.opponent
                );
                record.status = classify(record, rows, quorum);
                outcomes.push((p, Outcome::Unresolved));
            } else {
                log::info!(
                    "  No result yet ({}/{}), next try in ~{} min",
                    attempts,
                    max_attempts,
                    self.config.retry.retry_interval_minutes
                );
            }
        }

        let mut failed_writes = Vec::new();
        for (path, records) in &files {
            if !outcomes.iter().any(|(p, _)| &p.path == path) {
                continue;
            }
            match MatchStore::save(path, records) {
                Ok(()) => log::info!(
                    "  Saved {}",
                    path.file_name().unwrap_or_default().to_string_lossy()
                ),
                Err(e) => {
                    log::error!("  Could not write {}: {}", path.display(), e);
                    failed_writes.push(path.clone());
                }
            }
        }

        for (p, outcome) in outcomes {
            let written = !failed_writes.contains(&p.path);
            match outcome {
                Outcome::Resolved if written => {
                    self.ledger.clear(p.id());
                    summary.resolved += 1;
                }
                Outcome::Resolved => {
                    self.ledger.record_failure(p.id(), now);
                }
                Outcome::Unresolved if written => {
                    let status = files
                        .get(&p.path)
                        .and_then(|records| records.iter().find(|r| r.id == p.record.id))
                        .map(|r| r.status);
                    match status {
                        Some(Status::Postponed) => summary.postponed += 1,
                        Some(Status::AwaitingResult) => summary.awaiting_result += 1,
                        _ => {}
                    }
                }
                Outcome::Unresolved => {}
            }
        }
    }

    /// Published result for a stored record, if the portal has one
    ///
    /// Rows naming both teams exactly win over fuzzy matches. A row matching only the team
    /// is accepted on the same round label when no row confirms both names.
    fn find_result<'r>(&self, record: &MatchRecord, rows: &'r [WebRow]) -> Option<&'r WebRow> {
        let candidates: Vec<&WebRow> = rows
            .iter()
            .filter(|r| r.has_result && !r.is_bye() && r.same_date(&record.date))
            .filter(|r| self.matcher.matches(&record.team, own_and_other(record.side, r).0))
            .collect();

        let team = normalize(&record.team);
        let opponent = normalize(&record.opponent);
        if let Some(row) = candidates.iter().copied().find(|r| {
            let (own, other) = own_and_other(record.side, r);
            normalize(own) == team && normalize(other) == opponent
        }) {
            return Some(row);
        }
        if let Some(row) = candidates
            .iter()
            .copied()
            .find(|r| self.matcher.matches(&record.opponent, own_and_other(record.side, r).1))
        {
            return Some(row);
        }

        let round = normalize(&record.round_label);
        if round.is_empty() {
            return None;
        }
        let row = candidates
            .into_iter()
            .find(|r| normalize(&r.round_label) == round)?;
        log::info!(
            "  Matched on round '{}': stored opponent '{}' portal '{}'",
            record.round_label,
            record.opponent,
            own_and_other(record.side, row).1
        );
        Some(row)
    }

    fn refresh_standings(
        &self,
        key: &PendingGroupKey,
        matches: &[PendingMatch],
        rows: &[WebRow],
        now: NaiveDateTime,
    ) {
        let category = matches
            .iter()
            .map(|p| p.record.category.as_str())
            .find(|c| !c.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| key.to_string());
        let mut table = StandingsTable::new(&category, rows, now);
        table.competition = matches.iter().find_map(|p| p.record.competition.clone());

        if let Err(e) = table.save(&self.store.group_dir(key)) {
            log::warn!("  Could not update standings for {}: {}", key, e);
        }
    }
}

/// Names on a row as (the file owner's side, the opponent's side)
fn own_and_other(side: Side, row: &WebRow) -> (&str, &str) {
    match side {
        Side::Home => (row.home.as_str(), row.away.as_str()),
        Side::Away => (row.away.as_str(), row.home.as_str()),
    }
}
