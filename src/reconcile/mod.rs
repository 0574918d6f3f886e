//! Result reconciliation: due-match detection, name matching and the scrape-and-apply pass

pub mod classifier;
pub mod detector;
pub mod engine;
pub mod names;

pub use classifier::classify;
pub use detector::{group_by_key, DueMatchDetector, PendingMatch, TodayEntry};
pub use engine::{ReconcileSummary, Reconciler};
pub use names::{names_match, normalize, NameMatcher};
