//! Targeted scrape of one competition group
//!
//! Walks the category, phase and group dropdowns of a competition page down to a single
//! calendar and returns its rows.

use super::calendar::parse_calendar;
use super::{Jitter, PageDriver, SelectOption};
use crate::reconcile::names::option_for_folder;
use crate::{Config, Result, WebRow};
use std::time::Duration;

const DROPDOWN_PREFIX: &str = "ctl00$ctl00$contenedor_informacion$contenedor_informacion_con_lateral$";

pub const CATEGORY_SELECT: &str = "select[name='ctl00$ctl00$contenedor_informacion$contenedor_informacion_con_lateral$DDLCategorias']";
pub const PHASE_SELECT: &str = "select[name='ctl00$ctl00$contenedor_informacion$contenedor_informacion_con_lateral$DDLFases']";
pub const GROUP_SELECT: &str = "select[name='ctl00$ctl00$contenedor_informacion$contenedor_informacion_con_lateral$DDLGrupos']";
pub const CALENDAR_TAB: &str = "#calendario-tab";

/// Path segment separating the competition base URL from the selected view
const COMPETITION_SEGMENT: &str = "/delegacion-competicion";

/// Page titles shown while the portal's bot check is running
const CHALLENGE_TITLES: [&str; 3] = ["moment", "momento", "checking"];

/// Scrapes single groups through a [`PageDriver`]
pub struct GroupScraper {
    page_timeout: Duration,
    challenge_timeout: Duration,
    option_overlap: f64,
    interaction_pause: Jitter,
    navigation_pause: Jitter,
}

impl GroupScraper {
    pub fn new(config: &Config) -> Self {
        GroupScraper {
            page_timeout: Duration::from_secs(config.browser.page_timeout_secs),
            challenge_timeout: Duration::from_secs(config.browser.challenge_timeout_secs),
            option_overlap: config.matching.option_overlap,
            interaction_pause: Jitter::from_millis(config.browser.interaction_pause_ms),
            navigation_pause: Jitter::from_millis(config.browser.navigation_pause_ms),
        }
    }

    /// Calendar rows of one category/phase/group of a competition
    ///
    /// Returns an empty list when the page never becomes ready or a dropdown has no
    /// option for the requested folder. Driver failures are returned as errors.
    pub fn scrape_group<D: PageDriver + ?Sized>(
        &self,
        driver: &mut D,
        competition_url: &str,
        category: &str,
        phase: &str,
        group: &str,
    ) -> Result<Vec<WebRow>> {
        if !on_competition_page(&driver.current_url(), competition_url) {
            log::info!("  Navigating to {}", competition_url);
            driver.navigate(competition_url)?;
            if !self.wait_for_page(driver)? {
                log::error!("  Competition page did not load");
                return Ok(Vec::new());
            }
            self.navigation_pause.pause();
        }

        let steps = [
            (CATEGORY_SELECT, category, "Category", false),
            (PHASE_SELECT, phase, "Phase", true),
            (GROUP_SELECT, group, "Group", true),
        ];
        for (selector, folder, label, allow_single) in steps {
            let options: Vec<SelectOption> = driver
                .read_options(selector)?
                .into_iter()
                .filter(|o| !o.value.is_empty())
                .collect();

            let Some(value) = self.choose(&options, folder, allow_single) else {
                log::error!("  {} '{}' not found among {} options", label, folder, options.len());
                return Ok(Vec::new());
            };

            log::info!("  {}: {}", label, folder);
            if !self.select(driver, selector, &value)? {
                log::error!("  Page did not reload after choosing {} '{}'", label, folder);
                return Ok(Vec::new());
            }
        }

        self.show_calendar(driver);

        let rows = parse_calendar(&driver.content()?);
        log::info!("  Extracted {} matches from the group", rows.len());
        Ok(rows)
    }

    fn choose(&self, options: &[SelectOption], folder: &str, allow_single: bool) -> Option<String> {
        if let Some(opt) = option_for_folder(options, folder, self.option_overlap) {
            return Some(opt.value.clone());
        }
        match options {
            [only] if allow_single => Some(only.value.clone()),
            _ => None,
        }
    }

    /// Commit a dropdown value and wait for the post-back to settle
    fn select<D: PageDriver + ?Sized>(&self, driver: &mut D, selector: &str, value: &str) -> Result<bool> {
        if let Err(e) = driver.select_option(selector, value) {
            // The post-back sometimes outlives the navigation wait; the page check decides
            log::warn!("  Navigation after selecting {}: {}", short_name(selector), e);
        }
        let ready = self.wait_for_page(driver)?;
        self.interaction_pause.pause();
        Ok(ready)
    }

    /// Wait for the category dropdown, allowing extra time for a bot-check interstitial
    fn wait_for_page<D: PageDriver + ?Sized>(&self, driver: &mut D) -> Result<bool> {
        if driver.wait_for_selector(CATEGORY_SELECT, self.page_timeout) {
            return Ok(true);
        }
        let title = driver.title()?.to_lowercase();
        if CHALLENGE_TITLES.iter().any(|t| title.contains(t)) {
            log::info!("  Bot check in progress, waiting...");
            return Ok(driver.wait_for_selector(CATEGORY_SELECT, self.challenge_timeout));
        }
        Ok(false)
    }

    /// Switch to the calendar tab unless it is already active
    fn show_calendar<D: PageDriver + ?Sized>(&self, driver: &mut D) {
        match driver.attribute(CALENDAR_TAB, "aria-selected") {
            Ok(Some(selected)) if selected != "true" => match driver.click(CALENDAR_TAB) {
                Ok(()) => self.interaction_pause.pause(),
                Err(e) => log::debug!("  Could not open calendar tab: {}", e),
            },
            Ok(_) => {}
            Err(e) => log::debug!("  Could not inspect calendar tab: {}", e),
        }
    }
}

/// Part of a competition URL shared by every view of that competition
pub fn competition_base(url: &str) -> &str {
    match url.find(COMPETITION_SEGMENT) {
        Some(idx) => &url[..idx],
        None => url,
    }
}

/// Whether the browser already shows `competition_url`, possibly after a post-back
///
/// A post-back may land on the bare competition segment without the competition slug.
/// Any other slug under the same base is a different competition.
pub fn on_competition_page(current: &str, competition_url: &str) -> bool {
    if current.starts_with(competition_url) {
        return true;
    }
    let base = competition_base(competition_url);
    if base == competition_url {
        return false;
    }
    let Some(rest) = current.strip_prefix(base) else {
        return false;
    };
    let path = rest.split(['?', '#']).next().unwrap_or_default();
    let path = path.trim_end_matches('/');
    path == COMPETITION_SEGMENT || path == format!("{}.aspx", COMPETITION_SEGMENT)
}

fn short_name(selector: &str) -> &str {
    selector
        .split(DROPDOWN_PREFIX)
        .nth(1)
        .map(|s| s.trim_end_matches("']"))
        .unwrap_or(selector)
}
