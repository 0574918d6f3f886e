//! Per-team JSON match files
//!
//! Team files live at `<data_dir>/<competition>/<category>/<group>/<phase>/<team-slug>.json`
//! and hold a JSON array of [`MatchRecord`]s.

use crate::{BasketError, MatchRecord, Result};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Folders identifying one calendar view on the portal
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PendingGroupKey {
    pub competition: String,
    pub category: String,
    pub group: String,
    pub phase: String,
}

impl std::fmt::Display for PendingGroupKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} / {} / {} / {}",
            self.competition, self.category, self.phase, self.group
        )
    }
}

/// Access to one team's match files under a base directory
pub struct MatchStore {
    base_dir: PathBuf,
    team_slug: String,
}

impl MatchStore {
    pub fn new<P: AsRef<Path>>(base_dir: P, team_slug: &str) -> Self {
        MatchStore {
            base_dir: base_dir.as_ref().to_path_buf(),
            team_slug: team_slug.to_lowercase(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// All files matching `<team-slug>*.json` below the base directory, sorted
    pub fn team_files(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = WalkDir::new(&self.base_dir)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    log::warn!("Skipping unreadable entry: {}", e);
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| self.is_team_file(path))
            .collect();
        files.sort();
        files
    }

    fn is_team_file(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        let name = name.to_lowercase();
        name.starts_with(&self.team_slug) && name.ends_with(".json")
    }

    /// Group folders of a team file, or None when it sits too shallow in the tree
    pub fn group_key(&self, path: &Path) -> Option<PendingGroupKey> {
        let relative = path.strip_prefix(&self.base_dir).ok()?;
        let parts: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        if parts.len() < 5 {
            return None;
        }
        Some(PendingGroupKey {
            competition: parts[0].clone(),
            category: parts[1].clone(),
            group: parts[2].clone(),
            phase: parts[3].clone(),
        })
    }

    /// Directory that holds the team files of a group
    pub fn group_dir(&self, key: &PendingGroupKey) -> PathBuf {
        self.base_dir
            .join(&key.competition)
            .join(&key.category)
            .join(&key.group)
            .join(&key.phase)
    }

    /// Load and validate a team file
    ///
    /// Any record breaking the result invariant rejects the whole file, so a file is never
    /// rewritten with entries dropped.
    pub fn load(path: &Path) -> Result<Vec<MatchRecord>> {
        let content = std::fs::read_to_string(path)?;
        let mut records: Vec<MatchRecord> = serde_json::from_str(&content)?;
        for record in &mut records {
            record.validate()?;
            record.ensure_id();
        }
        Ok(records)
    }

    /// Overwrite a team file
    pub fn save(path: &Path, records: &[MatchRecord]) -> Result<()> {
        let json = serde_json::to_string_pretty(records)?;
        write_atomic(path, json.as_bytes())
    }
}

/// Write through a sibling temp file so readers never see a half-written file
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let file_name = path
        .file_name()
        .ok_or_else(|| BasketError::Parse(format!("Not a file path: {}", path.display())))?;
    let mut tmp_name = file_name.to_os_string();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}
