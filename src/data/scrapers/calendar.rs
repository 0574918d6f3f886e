//! Calendar tab parser
//!
//! The calendar tab holds one `header.nombre_tabla` per matchday followed by a
//! `.table-responsive` block whose rows read: home, home points, away points, away,
//! `<strong>date<br>time</strong>`, venue.

use crate::WebRow;
use scraper::{ElementRef, Html, Selector};

/// Extract every calendar row from a portal page
pub fn parse_calendar(html: &str) -> Vec<WebRow> {
    let document = Html::parse_document(html);
    let header_selector = Selector::parse("#calendario header.nombre_tabla").unwrap();
    let title_selector = Selector::parse("h5").unwrap();
    let row_selector = Selector::parse("table tbody tr").unwrap();
    let cell_selector = Selector::parse("td").unwrap();
    let strong_selector = Selector::parse("strong").unwrap();

    let mut rows = Vec::new();

    for header in document.select(&header_selector) {
        let round_label = header
            .select(&title_selector)
            .next()
            .map(|h5| collapse_whitespace(&text_of(h5)))
            .unwrap_or_default();

        let Some(block) = header
            .next_siblings()
            .filter_map(ElementRef::wrap)
            .find(|e| e.value().classes().any(|c| c == "table-responsive"))
        else {
            continue;
        };

        for tr in block.select(&row_selector) {
            let cells: Vec<ElementRef> = tr.select(&cell_selector).collect();
            if cells.len() < 6 {
                continue;
            }

            let home = text_of(cells[0]);
            let away = text_of(cells[3]);
            if home.is_empty() || away.is_empty() {
                continue;
            }

            let home_score = parse_points(&text_of(cells[1]));
            let away_score = parse_points(&text_of(cells[2]));

            let (date, time) = match cells[4].select(&strong_selector).next() {
                Some(strong) => {
                    let mut parts = strong
                        .text()
                        .map(|t| t.replace('"', "").trim().to_string())
                        .filter(|t| !t.is_empty());
                    (parts.next().unwrap_or_default(), parts.next().unwrap_or_default())
                }
                None => (String::new(), String::new()),
            };

            rows.push(WebRow {
                home,
                away,
                has_result: home_score.is_some() && away_score.is_some(),
                home_score,
                away_score,
                date,
                time,
                venue: text_of(cells[5]),
                round_label: round_label.clone(),
            });
        }
    }

    log::debug!("Parsed {} calendar rows", rows.len());
    rows
}

fn text_of(element: ElementRef) -> String {
    element.text().collect::<String>().trim().to_string()
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Leading integer of a points cell, like the portal's own `parseInt`
fn parse_points(text: &str) -> Option<u32> {
    let digits: String = text
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}
