//! Portal scrapers
//!
//! The portal is an ASP.NET site driven through cascading dropdowns, so scraping goes through
//! a browser-like [`PageDriver`]. Everything above the driver is plain Rust and can be tested
//! against canned HTML.

pub mod calendar;
pub mod chrome;
pub mod group;

use crate::Result;
use rand::Rng;
use serde::Deserialize;
use std::time::Duration;

/// One `<option>` of a `<select>`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SelectOption {
    pub value: String,
    pub label: String,
}

impl SelectOption {
    pub fn new(value: &str, label: &str) -> Self {
        SelectOption {
            value: value.to_string(),
            label: label.to_string(),
        }
    }
}

/// Browser capability the scrapers need
pub trait PageDriver {
    fn current_url(&self) -> String;

    fn title(&mut self) -> Result<String>;

    /// Load a URL and wait for the navigation to finish
    fn navigate(&mut self, url: &str) -> Result<()>;

    /// Whether an element matching `selector` shows up within `timeout`
    fn wait_for_selector(&mut self, selector: &str, timeout: Duration) -> bool;

    /// Pick an option and wait for the post-back the change triggers
    fn select_option(&mut self, selector: &str, value: &str) -> Result<()>;

    fn read_options(&mut self, selector: &str) -> Result<Vec<SelectOption>>;

    /// Run a script in the page and return its JSON value
    fn evaluate(&mut self, script: &str) -> Result<serde_json::Value>;

    fn click(&mut self, selector: &str) -> Result<()>;

    /// Attribute of the first element matching `selector`
    fn attribute(&mut self, selector: &str, name: &str) -> Result<Option<String>>;

    /// Current page HTML
    fn content(&mut self) -> Result<String>;
}

/// Randomized pause between interactions
#[derive(Debug, Clone, Copy)]
pub struct Jitter {
    min: Duration,
    max: Duration,
}

impl Jitter {
    pub fn from_millis(range: [u64; 2]) -> Self {
        let (lo, hi) = if range[0] <= range[1] {
            (range[0], range[1])
        } else {
            (range[1], range[0])
        };
        Jitter {
            min: Duration::from_millis(lo),
            max: Duration::from_millis(hi),
        }
    }

    pub fn sample(&self) -> Duration {
        if self.max.is_zero() {
            return Duration::ZERO;
        }
        rand::thread_rng().gen_range(self.min..=self.max)
    }

    pub fn pause(&self) {
        let delay = self.sample();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
    }
}

/// Retry an operation with exponential backoff
pub fn with_retry<T, F>(mut operation: F, max_attempts: u32) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    let mut attempt = 0;
    loop {
        match operation() {
            Ok(result) => return Ok(result),
            Err(e) if attempt + 1 < max_attempts => {
                log::warn!("Attempt {} failed: {}", attempt + 1, e);
                let delay = Duration::from_millis(500 * 2u64.pow(attempt));
                std::thread::sleep(delay);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory driver serving a fixed portal page

    use super::*;
    use crate::{BasketError, WebRow};
    use std::collections::HashMap;

    #[derive(Debug, Default)]
    pub struct FakeDriver {
        pub url: String,
        pub options: HashMap<String, Vec<SelectOption>>,
        pub html: String,
        pub calendar_selected: bool,
        pub fail_content: bool,
        pub page_ready: bool,
        pub navigations: Vec<String>,
        pub selections: Vec<(String, String)>,
        pub clicks: Vec<String>,
    }

    impl FakeDriver {
        /// Portal page with one category, phase and group option
        pub fn portal(category: &str, phase: &str, group: &str, rows: &[WebRow]) -> Self {
            let mut options = HashMap::new();
            options.insert(
                super::group::CATEGORY_SELECT.to_string(),
                vec![SelectOption::new("", "Seleccione"), SelectOption::new("10", category)],
            );
            options.insert(
                super::group::PHASE_SELECT.to_string(),
                vec![SelectOption::new("20", phase)],
            );
            options.insert(
                super::group::GROUP_SELECT.to_string(),
                vec![SelectOption::new("30", group)],
            );
            FakeDriver {
                options,
                html: calendar_html(rows),
                page_ready: true,
                ..Default::default()
            }
        }
    }

    impl PageDriver for FakeDriver {
        fn current_url(&self) -> String {
            self.url.clone()
        }

        fn title(&mut self) -> Result<String> {
            Ok("Competiciones".to_string())
        }

        fn navigate(&mut self, url: &str) -> Result<()> {
            self.url = url.to_string();
            self.navigations.push(url.to_string());
            Ok(())
        }

        fn wait_for_selector(&mut self, _selector: &str, _timeout: Duration) -> bool {
            self.page_ready
        }

        fn select_option(&mut self, selector: &str, value: &str) -> Result<()> {
            self.selections.push((selector.to_string(), value.to_string()));
            Ok(())
        }

        fn read_options(&mut self, selector: &str) -> Result<Vec<SelectOption>> {
            Ok(self.options.get(selector).cloned().unwrap_or_default())
        }

        fn evaluate(&mut self, _script: &str) -> Result<serde_json::Value> {
            Ok(serde_json::Value::Null)
        }

        fn click(&mut self, selector: &str) -> Result<()> {
            self.clicks.push(selector.to_string());
            self.calendar_selected = true;
            Ok(())
        }

        fn attribute(&mut self, _selector: &str, _name: &str) -> Result<Option<String>> {
            Ok(Some(self.calendar_selected.to_string()))
        }

        fn content(&mut self) -> Result<String> {
            if self.fail_content {
                return Err(BasketError::Driver("page crashed".to_string()));
            }
            Ok(self.html.clone())
        }
    }

    /// Render rows the way the portal's calendar tab lays them out, one table per round
    pub fn calendar_html(rows: &[WebRow]) -> String {
        let mut rounds: Vec<(&str, Vec<&WebRow>)> = Vec::new();
        for row in rows {
            match rounds.iter_mut().find(|(label, _)| *label == row.round_label) {
                Some((_, list)) => list.push(row),
                None => rounds.push((row.round_label.as_str(), vec![row])),
            }
        }

        let mut html = String::from("<html><body><div id=\"calendario\">");
        for (label, list) in rounds {
            html.push_str(&format!(
                "<header class=\"nombre_tabla\"><h5>{}</h5></header><div class=\"table-responsive\"><table><tbody>",
                label
            ));
            for row in list {
                let score = |s: Option<u32>| s.map(|v| v.to_string()).unwrap_or_default();
                html.push_str(&format!(
                    "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td><strong>{}<br>{}</strong></td><td>{}</td></tr>",
                    row.home,
                    score(row.home_score),
                    score(row.away_score),
                    row.away,
                    row.date,
                    row.time,
                    row.venue
                ));
            }
            html.push_str("</tbody></table></div>");
        }
        html.push_str("</div></body></html>");
        html
    }

    /// A calendar row; scores make it a result
    pub fn row(home: &str, away: &str, date: &str, scores: Option<(u32, u32)>) -> WebRow {
        WebRow {
            home: home.to_string(),
            away: away.to_string(),
            home_score: scores.map(|s| s.0),
            away_score: scores.map(|s| s.1),
            date: date.to_string(),
            time: "18:00".to_string(),
            venue: "Pabellón Municipal".to_string(),
            round_label: "Jornada 1".to_string(),
            has_result: scores.is_some(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BasketError;

    #[test]
    fn test_jitter_bounds() {
        let jitter = Jitter::from_millis([30, 10]);
        for _ in 0..20 {
            let d = jitter.sample();
            assert!(d >= Duration::from_millis(10) && d <= Duration::from_millis(30));
        }
        assert_eq!(Jitter::from_millis([0, 0]).sample(), Duration::ZERO);
    }

    #[test]
    fn test_with_retry_gives_up() {
        let mut calls = 0;
        let result: Result<()> = with_retry(
            || {
                calls += 1;
                Err(BasketError::Launch("no chrome".to_string()))
            },
            1,
        );
        assert!(result.is_err());
        assert_eq!(calls, 1);

        let mut calls = 0;
        let result = with_retry(
            || {
                calls += 1;
                if calls < 2 {
                    Err(BasketError::Launch("busy".to_string()))
                } else {
                    Ok(calls)
                }
            },
            3,
        );
        assert_eq!(result.unwrap(), 2);
    }
}
