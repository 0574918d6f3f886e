//! Chrome-backed page driver
//!
//! Drives a single Chrome tab through `headless_chrome`. The portal's dropdowns post back
//! on `change`, so selecting an option marks the current document and then waits for a
//! document without the mark.

use super::{PageDriver, SelectOption};
use crate::{BasketError, BrowserConfig, Result};
use headless_chrome::{Browser, LaunchOptions, Tab};
use rand::seq::SliceRandom;
use std::ffi::OsStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

const ACCEPT_LANGUAGE: &str = "es-ES,es;q=0.9";
const POLL_INTERVAL: Duration = Duration::from_millis(250);

pub struct ChromeDriver {
    // Keeps the browser process alive for the lifetime of the tab
    _browser: Browser,
    tab: Arc<Tab>,
    page_timeout: Duration,
}

fn driver_error<E: std::fmt::Display>(e: E) -> BasketError {
    BasketError::Driver(e.to_string())
}

/// JSON string literal usable inside a script
fn js_string(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

impl ChromeDriver {
    /// Start Chrome and open the tab used for the whole run
    pub fn launch(config: &BrowserConfig) -> Result<Self> {
        let user_agent = config
            .user_agents
            .choose(&mut rand::thread_rng())
            .cloned()
            .unwrap_or_default();

        let options = LaunchOptions {
            headless: config.headless,
            sandbox: false,
            window_size: Some((1366, 768)),
            args: vec![
                OsStr::new("--disable-blink-features=AutomationControlled"),
                OsStr::new("--disable-dev-shm-usage"),
                OsStr::new("--lang=es-ES"),
            ],
            idle_browser_timeout: Duration::from_secs(config.page_timeout_secs * 4),
            ..Default::default()
        };

        log::info!(
            "Launching Chrome ({})",
            if config.headless { "headless" } else { "windowed" }
        );
        let browser = Browser::new(options).map_err(|e| BasketError::Launch(e.to_string()))?;
        let tab = browser
            .new_tab()
            .map_err(|e| BasketError::Launch(e.to_string()))?;

        let page_timeout = Duration::from_secs(config.page_timeout_secs);
        tab.set_default_timeout(page_timeout);
        if !user_agent.is_empty() {
            tab.set_user_agent(&user_agent, Some(ACCEPT_LANGUAGE), None)
                .map_err(|e| BasketError::Launch(e.to_string()))?;
        }

        Ok(ChromeDriver {
            _browser: browser,
            tab,
            page_timeout,
        })
    }

    /// Wait until the marked document has been replaced and the new one has loaded
    fn wait_for_postback(&self) -> Result<()> {
        let started = Instant::now();
        loop {
            // Evaluation fails while the document is being swapped; keep polling
            if let Ok(result) = self.tab.evaluate("window.__basketStale === true", false) {
                if result.value != Some(serde_json::Value::Bool(true)) {
                    break;
                }
            }
            if started.elapsed() > self.page_timeout {
                return Err(BasketError::Driver(
                    "timed out waiting for post-back".to_string(),
                ));
            }
            std::thread::sleep(POLL_INTERVAL);
        }
        self.tab.wait_until_navigated().map_err(driver_error)?;
        Ok(())
    }
}

impl PageDriver for ChromeDriver {
    fn current_url(&self) -> String {
        self.tab.get_url()
    }

    fn title(&mut self) -> Result<String> {
        self.tab.get_title().map_err(driver_error)
    }

    fn navigate(&mut self, url: &str) -> Result<()> {
        self.tab
            .navigate_to(url)
            .map_err(driver_error)?
            .wait_until_navigated()
            .map_err(driver_error)?;
        Ok(())
    }

    fn wait_for_selector(&mut self, selector: &str, timeout: Duration) -> bool {
        self.tab
            .wait_for_element_with_custom_timeout(selector, timeout)
            .is_ok()
    }

    fn select_option(&mut self, selector: &str, value: &str) -> Result<()> {
        let script = format!(
            r#"(() => {{
                const el = document.querySelector({selector});
                if (!el) return false;
                window.__cFRLUnblockHandlers = true;
                window.__basketStale = true;
                el.value = {value};
                el.dispatchEvent(new Event('change', {{ bubbles: true }}));
                return true;
            }})()"#,
            selector = js_string(selector),
            value = js_string(value),
        );
        let found = self.evaluate(&script)?;
        if found != serde_json::Value::Bool(true) {
            return Err(BasketError::Driver(format!("no element for {}", selector)));
        }
        self.wait_for_postback()
    }

    fn read_options(&mut self, selector: &str) -> Result<Vec<SelectOption>> {
        let script = format!(
            r#"JSON.stringify(Array.from(document.querySelectorAll({selector})).map(o => ({{
                value: o.value,
                label: o.textContent.trim().replace(/\s+/g, ' ')
            }})))"#,
            selector = js_string(&format!("{} option", selector)),
        );
        match self.evaluate(&script)? {
            serde_json::Value::String(json) => Ok(serde_json::from_str(&json)?),
            other => Err(BasketError::Driver(format!(
                "unexpected options payload: {}",
                other
            ))),
        }
    }

    fn evaluate(&mut self, script: &str) -> Result<serde_json::Value> {
        let result = self.tab.evaluate(script, false).map_err(driver_error)?;
        Ok(result.value.unwrap_or(serde_json::Value::Null))
    }

    fn click(&mut self, selector: &str) -> Result<()> {
        self.tab
            .find_element(selector)
            .map_err(driver_error)?
            .click()
            .map_err(driver_error)?;
        Ok(())
    }

    fn attribute(&mut self, selector: &str, name: &str) -> Result<Option<String>> {
        let script = format!(
            r#"(() => {{
                const el = document.querySelector({selector});
                return el ? el.getAttribute({name}) : null;
            }})()"#,
            selector = js_string(selector),
            name = js_string(name),
        );
        match self.evaluate(&script)? {
            serde_json::Value::String(value) => Ok(Some(value)),
            _ => Ok(None),
        }
    }

    fn content(&mut self) -> Result<String> {
        self.tab.get_content().map_err(driver_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_js_string_escapes_selectors() {
        assert_eq!(
            js_string("select[name='a$b']"),
            r#""select[name='a$b']""#
        );
        assert_eq!(js_string("say \"hi\""), r#""say \"hi\"""#);
    }
}
