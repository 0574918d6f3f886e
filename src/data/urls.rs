//! Competition folder to portal URL map, written by the full crawl

use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, Default)]
pub struct CompetitionUrls {
    urls: HashMap<String, String>,
}

impl CompetitionUrls {
    /// Load the map; a missing or broken file gives an empty map
    pub fn load<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        let urls = match std::fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(urls) => urls,
                Err(e) => {
                    log::warn!("Could not parse {}: {}", path.display(), e);
                    HashMap::new()
                }
            },
            Err(_) => {
                log::warn!(
                    "No competition URL map at {}; run the full crawl first",
                    path.display()
                );
                HashMap::new()
            }
        };
        CompetitionUrls { urls }
    }

    pub fn get(&self, competition_folder: &str) -> Option<&str> {
        self.urls.get(competition_folder).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }
}

impl FromIterator<(String, String)> for CompetitionUrls {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        CompetitionUrls {
            urls: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_load_map() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("competition_urls.json");
        std::fs::write(
            &path,
            r#"{"liga-autonomica": "https://portal.example/competicion/delegacion-competicion/liga"}"#,
        )
        .unwrap();

        let urls = CompetitionUrls::load(&path);
        assert_eq!(urls.len(), 1);
        assert!(urls.get("liga-autonomica").unwrap().starts_with("https://"));
        assert!(urls.get("copa").is_none());
    }

    #[test]
    fn test_missing_or_broken_map_is_empty() {
        let dir = tempdir().unwrap();
        assert!(CompetitionUrls::load(dir.path().join("missing.json")).is_empty());

        let path = dir.path().join("broken.json");
        std::fs::write(&path, "[1, 2").unwrap();
        assert!(CompetitionUrls::load(&path).is_empty());
    }
}
