//! Basketball federation results tracker
//!
//! Keeps per-team match files in sync with a federation's calendar portal by re-checking
//! matches that should have finished and filling in their results.

pub mod data;
pub mod reconcile;
pub mod standings;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;
use thiserror::Error;

/// Marker the portal uses for a team with no opponent on a matchday
pub const BYE_MARKER: &str = "DESCANSA";

/// Which side of the fixture a team file's owner plays on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Home,
    Away,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Home => write!(f, "home"),
            Side::Away => write!(f, "away"),
        }
    }
}

/// Lifecycle state of a stored match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[default]
    Upcoming,
    Finished,
    Postponed,
    AwaitingResult,
}

impl Status {
    /// States after which no automatic retry happens
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Postponed | Status::AwaitingResult)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Upcoming => write!(f, "upcoming"),
            Status::Finished => write!(f, "finished"),
            Status::Postponed => write!(f, "postponed"),
            Status::AwaitingResult => write!(f, "awaiting result"),
        }
    }
}

/// One team's view of a fixture, as stored in its team file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    #[serde(default)]
    pub id: String,
    pub team: String,
    pub opponent: String,
    pub side: Side,
    /// "{category} - {phase} - {group}"
    #[serde(default)]
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub competition: Option<String>,
    /// DD/MM/YYYY
    pub date: String,
    /// HH:MM, empty when the portal has not published a kickoff time
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub venue: String,
    #[serde(default)]
    pub home_score: Option<u32>,
    #[serde(default)]
    pub away_score: Option<u32>,
    #[serde(default)]
    pub has_result: bool,
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub round_label: String,
    /// Keys written by the crawler that this crate does not interpret
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl MatchRecord {
    pub fn home_team(&self) -> &str {
        match self.side {
            Side::Home => &self.team,
            Side::Away => &self.opponent,
        }
    }

    pub fn away_team(&self) -> &str {
        match self.side {
            Side::Home => &self.opponent,
            Side::Away => &self.team,
        }
    }

    /// Calendar date of the fixture, if the stored string is well formed
    pub fn match_date(&self) -> Option<NaiveDate> {
        parse_date(&self.date)
    }

    /// Scheduled start; noon when no usable kickoff time is stored
    pub fn kickoff(&self) -> Option<NaiveDateTime> {
        let date = self.match_date()?;
        let time = NaiveTime::parse_from_str(self.time.trim(), "%H:%M")
            .ok()
            .or_else(|| NaiveTime::from_hms_opt(12, 0, 0))?;
        Some(date.and_time(time))
    }

    /// Check the result invariant: `has_result` iff both scores iff finished
    pub fn validate(&self) -> Result<()> {
        let scores = self.home_score.is_some() && self.away_score.is_some();
        let partial = self.home_score.is_some() != self.away_score.is_some();
        let message = if partial {
            Some("only one score present")
        } else if self.has_result != scores {
            Some("has_result disagrees with scores")
        } else if self.has_result != (self.status == Status::Finished) {
            Some("status disagrees with has_result")
        } else {
            None
        };

        match message {
            Some(message) => Err(BasketError::MalformedRecord {
                id: self.id.clone(),
                message: message.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Fill in the stable id when the crawler left it empty
    pub fn ensure_id(&mut self) {
        if self.id.trim().is_empty() {
            self.id = match_id(&self.date, self.home_team(), self.away_team(), &self.category);
        }
    }

    /// Copy a published result into this record
    pub fn apply_result(&mut self, row: &WebRow) {
        self.home_score = row.home_score;
        self.away_score = row.away_score;
        self.has_result = true;
        self.status = Status::Finished;
        if !row.time.is_empty() {
            self.time = row.time.clone();
        }
        if !row.venue.is_empty() {
            self.venue = row.venue.clone();
        }
    }
}

/// One calendar entry as currently published on the portal
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WebRow {
    pub home: String,
    pub away: String,
    pub home_score: Option<u32>,
    pub away_score: Option<u32>,
    pub date: String,
    pub time: String,
    pub venue: String,
    pub round_label: String,
    pub has_result: bool,
}

impl WebRow {
    /// Rows where one side rests that matchday
    pub fn is_bye(&self) -> bool {
        self.home.to_uppercase().contains(BYE_MARKER) || self.away.to_uppercase().contains(BYE_MARKER)
    }

    /// Whether this row is dated on the same day as `date`
    pub fn same_date(&self, date: &str) -> bool {
        match (parse_date(&self.date), parse_date(date)) {
            (Some(a), Some(b)) => a == b,
            _ => self.date.trim() == date.trim(),
        }
    }
}

/// Parse a portal date (DD/MM/YYYY)
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%d/%m/%Y").ok()
}

static SLUG_STRIP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s-]").expect("slug pattern is valid"));
static SLUG_SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[-\s]+").expect("separator pattern is valid"));

/// ASCII slug used for team file names and match ids
pub fn slugify(text: &str) -> String {
    let folded: String = reconcile::names::fold_accents(text)
        .chars()
        .filter(char::is_ascii)
        .collect();
    let stripped = SLUG_STRIP.replace_all(&folded, "");
    let lower = stripped.trim().to_lowercase();
    SLUG_SEPARATORS.replace_all(&lower, "-").into_owned()
}

/// Stable identity of a fixture across re-scrapes
pub fn match_id(date: &str, home: &str, away: &str, category: &str) -> String {
    slugify(&format!("{}_{}_{}_{}", date, home, away, category))
}

/// Application-wide errors
#[derive(Debug, Error)]
pub enum BasketError {
    #[error("Browser failed to start: {0}")]
    Launch(String),

    #[error("Page driver error: {0}")]
    Driver(String),

    #[error("Malformed match record '{id}': {message}")]
    MalformedRecord { id: String, message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),
}

pub type Result<T> = std::result::Result<T, BasketError>;

/// Application configuration loaded from config.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub team: TeamConfig,
    pub retry: RetryConfig,
    pub matching: MatchingConfig,
    pub paths: PathsConfig,
    pub browser: BrowserConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TeamConfig {
    pub name: String,
    /// Prefix of the team's file names, e.g. "cb-ejemplo"
    pub slug: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    /// How often the external trigger re-runs reconciliation; informational only
    pub retry_interval_minutes: u32,
    pub ledger_expiry_hours: i64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            max_attempts: 5,
            retry_interval_minutes: 10,
            ledger_expiry_hours: 48,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    pub match_duration_hours: f64,
    pub name_similarity: f64,
    pub option_overlap: f64,
    pub postponed_quorum: f64,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        MatchingConfig {
            match_duration_hours: 1.0,
            name_similarity: 0.6,
            option_overlap: 0.5,
            postponed_quorum: 0.5,
        }
    }
}

impl MatchingConfig {
    pub fn match_duration(&self) -> chrono::Duration {
        chrono::Duration::minutes((self.match_duration_hours * 60.0).round() as i64)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub data_dir: String,
    pub ledger_path: String,
    pub url_map_path: String,
    pub today_path: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        PathsConfig {
            data_dir: "data".to_string(),
            ledger_path: "attempts.json".to_string(),
            url_map_path: "competition_urls.json".to_string(),
            today_path: "today.json".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub headless: bool,
    pub page_timeout_secs: u64,
    /// Extra wait when the portal shows a bot-check interstitial
    pub challenge_timeout_secs: u64,
    pub user_agents: Vec<String>,
    /// Pause ranges in milliseconds, `[min, max]`
    pub interaction_pause_ms: [u64; 2],
    pub navigation_pause_ms: [u64; 2],
    pub group_pause_ms: [u64; 2],
}

impl Default for BrowserConfig {
    fn default() -> Self {
        BrowserConfig {
            headless: false,
            page_timeout_secs: 60,
            challenge_timeout_secs: 90,
            user_agents: vec![
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36".to_string(),
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36".to_string(),
            ],
            interaction_pause_ms: [500, 1200],
            navigation_pause_ms: [1500, 3000],
            group_pause_ms: [1000, 2000],
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            BasketError::Config(format!("Failed to read config file {}: {}", path, e))
        })?;
        toml::from_str(&content)
            .map_err(|e| BasketError::Config(format!("Failed to parse config: {}", e)))
    }

    pub fn save(&self, path: &str) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| BasketError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject settings the scan cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.team.slug.trim().is_empty() {
            return Err(BasketError::Config("team.slug must be set".to_string()));
        }
        if self.retry.max_attempts == 0 {
            return Err(BasketError::Config(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.matching.postponed_quorum) {
            return Err(BasketError::Config(
                "matching.postponed_quorum must be between 0 and 1".to_string(),
            ));
        }
        Ok(())
    }
}
