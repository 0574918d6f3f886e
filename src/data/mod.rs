//! Data access and scraping
//!
//! Per-team match files, the attempt ledger, the competition URL map and the portal scrapers.

pub mod ledger;
pub mod scrapers;
pub mod store;
pub mod urls;

pub use ledger::{AttemptEntry, AttemptLedger};
pub use store::{MatchStore, PendingGroupKey};
pub use urls::CompetitionUrls;
