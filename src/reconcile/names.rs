//! Team and dropdown name matching
//!
//! Club names on the portal carry sponsor names that change from season to season
//! ("ISAVAL CBA" becomes "NOATUM LOGISTIC CBA"), so stored names are compared with a ladder of
//! increasingly loose rules. Short tokens only count when they are long enough to be
//! distinctive.

use crate::data::scrapers::SelectOption;
use strsim::sorensen_dice;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Minimum length of a shared trailing word to count as the club's core name
const MIN_CORE_WORD: usize = 3;

/// Decompose and drop combining marks: "Alcúdia" -> "Alcudia"
pub fn fold_accents(s: &str) -> String {
    s.nfd().filter(|c| !is_combining_mark(*c)).collect()
}

/// Accent-free, lowercase, single-spaced form of a name
pub fn normalize(name: &str) -> String {
    fold_accents(name)
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Fuzzy team-name comparison
#[derive(Debug, Clone, Copy)]
pub struct NameMatcher {
    similarity: f64,
}

impl Default for NameMatcher {
    fn default() -> Self {
        NameMatcher { similarity: 0.6 }
    }
}

impl NameMatcher {
    pub fn new(similarity: f64) -> Self {
        NameMatcher { similarity }
    }

    /// Whether a stored name and a freshly scraped one denote the same team
    pub fn matches(&self, stored: &str, web: &str) -> bool {
        let a = normalize(stored);
        let b = normalize(web);
        if a.is_empty() || b.is_empty() {
            return false;
        }

        if a == b || a.contains(&b) || b.contains(&a) {
            return true;
        }

        let words_a: Vec<&str> = a.split(' ').collect();
        let words_b: Vec<&str> = b.split(' ').collect();

        let last_a = words_a[words_a.len() - 1];
        if last_a == words_b[words_b.len() - 1] && last_a.chars().count() >= MIN_CORE_WORD {
            return true;
        }

        if words_a.len() >= 2 && words_b.len() >= 2 {
            if words_a[words_a.len() - 2..] == words_b[words_b.len() - 2..] {
                return true;
            }
            if words_a[..2] == words_b[..2] {
                return true;
            }
        }

        sorensen_dice(&a, &b) >= self.similarity
    }
}

/// [`NameMatcher::matches`] with the default similarity threshold
pub fn names_match(stored: &str, web: &str) -> bool {
    NameMatcher::default().matches(stored, web)
}

/// Pick the dropdown option that corresponds to a data folder name
///
/// Exact label first, then accent-insensitive exact, then the substring match with the
/// largest length overlap provided it reaches `min_overlap`.
pub fn option_for_folder<'a>(
    options: &'a [SelectOption],
    folder: &str,
    min_overlap: f64,
) -> Option<&'a SelectOption> {
    let spaced = folder.replace('-', " ");
    let folder_lower = spaced.trim().to_lowercase();
    let folder_ascii = fold_accents(&folder_lower);

    if let Some(opt) = options
        .iter()
        .find(|o| o.label.trim().to_lowercase() == folder_lower)
    {
        return Some(opt);
    }

    let label_ascii = |o: &SelectOption| fold_accents(&o.label.trim().to_lowercase());

    if let Some(opt) = options.iter().find(|o| label_ascii(o) == folder_ascii) {
        return Some(opt);
    }

    let mut best: Option<(&SelectOption, f64)> = None;
    for opt in options {
        let label = label_ascii(opt);
        let (shorter, longer) = if label.contains(&folder_ascii) {
            (folder_ascii.len(), label.len())
        } else if folder_ascii.contains(&label) {
            (label.len(), folder_ascii.len())
        } else {
            continue;
        };
        let score = shorter as f64 / longer.max(1) as f64;
        if best.map_or(true, |(_, s)| score > s) {
            best = Some((opt, score));
        }
    }

    best.filter(|(_, score)| *score >= min_overlap)
        .map(|(opt, _)| opt)
}
