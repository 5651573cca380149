//! Story persistence.
//!
//! A saved story is one flat JSON document holding the sampling parameters
//! the story was played with, the context, memory, transcript and the
//! character sheet. The key names (`top-keks`, `rep-pen`, ...) are kept
//! stable so older saves keep loading.

use crate::character::CharacterSheet;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;

/// Errors from persistence operations.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid save name: {0:?}")]
    InvalidName(String),

    #[error("No save file at {}", .0.display())]
    NotFound(PathBuf),

    #[error("Invalid save format: {0}")]
    InvalidFormat(String),
}

lazy_static::lazy_static! {
    static ref SAVE_NAME: Regex =
        Regex::new(r"^\s*(?:saves\s*[/\\]\s*)?(.*?)\s*(?:\.json)?\s*$").expect("save name pattern");
}

fn default_rep_pen_range() -> u32 {
    512
}

fn default_rep_pen_slope() -> f32 {
    3.33
}

/// A saved story.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedStory {
    pub temp: f32,

    #[serde(rename = "top-p")]
    pub top_p: f32,

    #[serde(rename = "top-keks")]
    pub top_k: u32,

    #[serde(rename = "rep-pen")]
    pub rep_pen: f32,

    #[serde(rename = "rep-pen-range", default = "default_rep_pen_range")]
    pub rep_pen_range: u32,

    #[serde(rename = "rep-pen-slope", default = "default_rep_pen_slope")]
    pub rep_pen_slope: f32,

    pub context: String,
    pub memory: Vec<String>,
    pub actions: Vec<String>,
    pub results: Vec<String>,

    #[serde(default)]
    pub character_sheet: CharacterSheet,

    /// Model the story was played with. Informational only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,

    /// Backend the story was played against. Informational only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ollama_host: Option<String>,
}

impl SavedStory {
    pub fn to_json(&self) -> Result<String, PersistError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(content: &str) -> Result<Self, PersistError> {
        let saved: Self = serde_json::from_str(content)?;
        if saved.actions.len() != saved.results.len() {
            return Err(PersistError::InvalidFormat(format!(
                "{} actions but {} results",
                saved.actions.len(),
                saved.results.len()
            )));
        }
        Ok(saved)
    }

    /// Write to `path`, creating the parent directory if needed.
    pub async fn save_json(&self, path: impl AsRef<Path>) -> Result<(), PersistError> {
        let path = path.as_ref();
        let content = self.to_json()?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        fs::write(path, content).await?;
        Ok(())
    }

    pub async fn load_json(path: impl AsRef<Path>) -> Result<Self, PersistError> {
        let path = path.as_ref();
        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(PersistError::NotFound(path.to_path_buf()));
            }
            Err(e) => return Err(e.into()),
        };
        Self::from_json(&content)
    }
}

/// Clean up a player-supplied save name.
///
/// A leading `saves/` and a trailing `.json` are dropped. Names that are
/// empty or would escape the save directory are rejected.
pub fn sanitize_save_name(name: &str) -> Result<String, PersistError> {
    let cleaned = SAVE_NAME
        .captures(name)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .unwrap_or_default();

    if cleaned.is_empty() || cleaned.contains(['/', '\\']) || cleaned.starts_with('.') {
        return Err(PersistError::InvalidName(name.to_string()));
    }
    Ok(cleaned.to_string())
}

/// Path of the save called `name` inside `dir`.
pub fn save_path(dir: impl AsRef<Path>, name: &str) -> Result<PathBuf, PersistError> {
    let name = sanitize_save_name(name)?;
    Ok(dir.as_ref().join(format!("{name}.json")))
}

/// A save file found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveInfo {
    /// Save name, the file stem.
    pub name: String,

    pub path: PathBuf,

    /// Number of recorded turns.
    pub turns: usize,
}

/// List the saves in `dir`, sorted by name. A missing directory has no
/// saves; files that do not parse as saves are skipped.
pub async fn list_saves(dir: impl AsRef<Path>) -> Result<Vec<SaveInfo>, PersistError> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    // Parse just enough to count the turns
    #[derive(Deserialize)]
    struct Partial {
        actions: Vec<String>,
    }

    let mut saves = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().map(|e| e == "json").unwrap_or(false) {
            let Some(name) = path.file_stem().map(|s| s.to_string_lossy().to_string()) else {
                continue;
            };
            let Ok(content) = fs::read_to_string(&path).await else {
                continue;
            };
            match serde_json::from_str::<Partial>(&content) {
                Ok(partial) => saves.push(SaveInfo {
                    name,
                    path,
                    turns: partial.actions.len(),
                }),
                Err(e) => tracing::debug!(path = %path.display(), error = %e, "Skipping non-save file"),
            }
        }
    }

    saves.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(saves)
}
