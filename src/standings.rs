//! Group standings computed from calendar rows
//!
//! Federation scoring: 2 points for a win, 1 for a loss. Byes and unplayed fixtures are
//! ignored.

use crate::data::store::write_atomic;
use crate::{Result, WebRow};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

pub const STANDINGS_FILE: &str = "standings.json";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandingsRow {
    pub position: usize,
    pub team: String,
    pub played: u32,
    pub won: u32,
    pub lost: u32,
    pub points_for: u32,
    pub points_against: u32,
    pub difference: i64,
    pub points: u32,
}

impl StandingsRow {
    fn new(team: &str) -> Self {
        StandingsRow {
            team: team.to_string(),
            ..Default::default()
        }
    }

    fn record(&mut self, scored: u32, conceded: u32) {
        self.played += 1;
        self.points_for += scored;
        self.points_against += conceded;
        if scored > conceded {
            self.won += 1;
            self.points += 2;
        } else if scored < conceded {
            self.lost += 1;
            self.points += 1;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandingsTable {
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub competition: Option<String>,
    pub updated_at: NaiveDateTime,
    pub standings: Vec<StandingsRow>,
}

/// Rank every team that has played at least once
pub fn compute(rows: &[WebRow]) -> Vec<StandingsRow> {
    let mut table: HashMap<&str, StandingsRow> = HashMap::new();

    for row in rows.iter().filter(|r| r.has_result && !r.is_bye()) {
        let (Some(home), Some(away)) = (row.home_score, row.away_score) else {
            continue;
        };
        table
            .entry(row.home.as_str())
            .or_insert_with(|| StandingsRow::new(&row.home))
            .record(home, away);
        table
            .entry(row.away.as_str())
            .or_insert_with(|| StandingsRow::new(&row.away))
            .record(away, home);
    }

    let mut standings: Vec<StandingsRow> = table.into_values().collect();
    for team in &mut standings {
        team.difference = team.points_for as i64 - team.points_against as i64;
    }
    standings.sort_by(|a, b| {
        b.points
            .cmp(&a.points)
            .then(b.difference.cmp(&a.difference))
            .then(b.points_for.cmp(&a.points_for))
            .then(a.team.cmp(&b.team))
    });
    for (i, team) in standings.iter_mut().enumerate() {
        team.position = i + 1;
    }
    standings
}

impl StandingsTable {
    pub fn new(category: &str, rows: &[WebRow], now: NaiveDateTime) -> Self {
        StandingsTable {
            category: category.to_string(),
            competition: None,
            updated_at: now,
            standings: compute(rows),
        }
    }

    /// Write the table as `standings.json` in `dir`
    pub fn save(&self, dir: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        write_atomic(&dir.join(STANDINGS_FILE), json.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::scrapers::testing::row;
    use chrono::NaiveDate;

    fn results() -> Vec<WebRow> {
        vec![
            row("CLUB A", "CLUB B", "05/05/2024", Some((70, 65))),
            row("CLUB C", "CLUB A", "12/05/2024", Some((80, 60))),
            row("CLUB B", "CLUB C", "12/05/2024", Some((75, 50))),
            row("CLUB D", "DESCANSA", "12/05/2024", None),
            row("CLUB D", "CLUB A", "19/05/2024", None),
        ]
    }

    #[test]
    fn test_compute_standings() {
        let table = compute(&results());
        assert_eq!(table.len(), 3);

        // everyone is 1-1 (3 points); difference decides
        let order: Vec<&str> = table.iter().map(|t| t.team.as_str()).collect();
        assert_eq!(order, vec!["CLUB B", "CLUB C", "CLUB A"]);

        let b = &table[0];
        assert_eq!(b.position, 1);
        assert_eq!((b.played, b.won, b.lost, b.points), (2, 1, 1, 3));
        assert_eq!(b.points_for, 140);
        assert_eq!(b.difference, 20);

        let a = &table[2];
        assert_eq!(a.difference, -15);
        assert_eq!(a.position, 3);
    }

    #[test]
    fn test_save_table() {
        let dir = tempfile::tempdir().unwrap();
        let now = NaiveDate::from_ymd_opt(2024, 5, 12)
            .unwrap()
            .and_hms_opt(21, 0, 0)
            .unwrap();
        let table = StandingsTable::new("SENIOR - PRIMERA FASE - GRUPO A", &results(), now);
        table.save(dir.path()).unwrap();

        let saved: StandingsTable = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join(STANDINGS_FILE)).unwrap(),
        )
        .unwrap();
        assert_eq!(saved.standings, table.standings);
        assert_eq!(saved.updated_at, now);
    }
}
