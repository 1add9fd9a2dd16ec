//! Versioned JSON save files.

use fable_client::HistoryEntry;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Current save format version. Bump on incompatible shape changes.
pub const SAVE_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed save file: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("unsupported save version {found} (expected {SAVE_VERSION})")]
    VersionMismatch { found: u32 },
}

/// Everything needed to resume a story mid-play.
///
/// Narration audio is deliberately not persisted; a resumed story
/// re-synthesizes on demand.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedStory {
    pub version: u32,
    pub conversation_history: Vec<HistoryEntry>,
    pub paragraph_texts: Vec<String>,
    #[serde(default)]
    pub current_options: Vec<String>,
    #[serde(default)]
    pub current_images: Vec<Option<String>>,
}

impl SavedStory {
    pub fn new(
        conversation_history: Vec<HistoryEntry>,
        paragraph_texts: Vec<String>,
        current_options: Vec<String>,
        current_images: Vec<Option<String>>,
    ) -> Self {
        Self {
            version: SAVE_VERSION,
            conversation_history,
            paragraph_texts,
            current_options,
            current_images,
        }
    }

    /// Serialize to pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, PersistError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse from JSON, rejecting unknown versions.
    pub fn from_json(json: &str) -> Result<Self, PersistError> {
        let saved: Self = serde_json::from_str(json)?;
        if saved.version != SAVE_VERSION {
            return Err(PersistError::VersionMismatch {
                found: saved.version,
            });
        }
        Ok(saved)
    }

    /// Write the save to `path`.
    pub async fn save_to(&self, path: impl AsRef<Path>) -> Result<(), PersistError> {
        tokio::fs::write(path, self.to_json()?).await?;
        Ok(())
    }

    /// Load a save from `path`.
    pub async fn load_from(path: impl AsRef<Path>) -> Result<Self, PersistError> {
        let json = tokio::fs::read_to_string(path).await?;
        Self::from_json(&json)
    }
}
