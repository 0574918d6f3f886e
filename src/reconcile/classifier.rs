//! Final status for matches that ran out of retries
//!
//! If most fixtures played on the same date already show a result, the round was played
//! and results are out, so a missing one means the match did not take place as scheduled.
//! Otherwise the whole round is still waiting on publication.

use crate::{MatchRecord, Status, WebRow};

pub fn classify(record: &MatchRecord, rows: &[WebRow], quorum: f64) -> Status {
    let (total, with_result) = rows
        .iter()
        .filter(|r| !r.is_bye() && r.same_date(&record.date))
        .fold((0usize, 0usize), |(total, done), r| {
            (total + 1, done + usize::from(r.has_result))
        });

    if total > 0 && with_result as f64 >= total as f64 * quorum {
        log::info!(
            "  POSTPONED: {} vs {} ({}/{} matches that day have a result)",
            record.team,
            record.opponent,
            with_result,
            total
        );
        Status::Postponed
    } else {
        log::info!(
            "  AWAITING RESULT: {} vs {} ({}/{} matches that day have a result)",
            record.team,
            record.opponent,
            with_result,
            total
        );
        Status::AwaitingResult
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::scrapers::testing::row;
    use crate::Side;

    fn pending() -> MatchRecord {
        MatchRecord {
            id: "x".to_string(),
            team: "CLUB A".to_string(),
            opponent: "CLUB B".to_string(),
            side: Side::Home,
            category: String::new(),
            competition: None,
            date: "12/05/2024".to_string(),
            time: "18:00".to_string(),
            venue: String::new(),
            home_score: None,
            away_score: None,
            has_result: false,
            status: Status::Upcoming,
            round_label: String::new(),
            extra: serde_json::Map::new(),
        }
    }

    fn siblings(with_result: usize, total: usize) -> Vec<WebRow> {
        (0..total)
            .map(|i| {
                let scores = (i < with_result).then_some((60, 50));
                row(&format!("HOME {}", i), &format!("AWAY {}", i), "12/05/2024", scores)
            })
            .collect()
    }

    #[test]
    fn test_round_played_means_postponed() {
        assert_eq!(classify(&pending(), &siblings(3, 4), 0.5), Status::Postponed);
        assert_eq!(classify(&pending(), &siblings(2, 4), 0.5), Status::Postponed);
    }

    #[test]
    fn test_round_unpublished_means_awaiting() {
        assert_eq!(classify(&pending(), &siblings(1, 4), 0.5), Status::AwaitingResult);
        assert_eq!(classify(&pending(), &[], 0.5), Status::AwaitingResult);
    }

    #[test]
    fn test_only_same_date_and_real_fixtures_count() {
        let mut rows = siblings(1, 4);
        rows.push(row("HOME 9", "AWAY 9", "19/05/2024", Some((70, 60))));
        rows.push(row("HOME 8", "AWAY 8", "19/05/2024", Some((70, 60))));
        rows.push(row("CLUB C", "DESCANSA", "12/05/2024", None));
        assert_eq!(classify(&pending(), &rows, 0.5), Status::AwaitingResult);
        assert_eq!(classify(&pending(), &rows, 0.25), Status::Postponed);
    }
}
