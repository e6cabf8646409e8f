//! Playable unit of the queue and its lifecycle status.

use std::{path::PathBuf, sync::OnceLock, time::Duration};

use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Title shown until metadata has been resolved.
pub const PENDING_TITLE: &str = "Loading...";

/// Media identifier used when none can be extracted from the source URL.
pub const UNKNOWN_MEDIA_ID: &str = "unknown";

/// Lifecycle of an [`Item`], in normal progression order.
///
/// `Failed` is terminal and reachable from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Queued,
    Downloading,
    Converting,
    Ready,
    Playing,
    Failed,
}

impl ItemStatus {
    /// True for the states owned by the single active pipeline.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            ItemStatus::Downloading | ItemStatus::Converting | ItemStatus::Playing
        )
    }

    pub fn is_terminal(self) -> bool {
        self == ItemStatus::Failed
    }

    pub fn label(self) -> &'static str {
        match self {
            ItemStatus::Queued => "queued",
            ItemStatus::Downloading => "downloading",
            ItemStatus::Converting => "converting",
            ItemStatus::Ready => "ready",
            ItemStatus::Playing => "playing",
            ItemStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// One playable queued media unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: Uuid,
    /// Source reference as submitted (a page URL).
    pub source: String,
    pub media_id: String,
    pub title: String,
    pub artist: Option<String>,
    pub thumbnail: Option<String>,
    pub duration: Option<Duration>,
    /// Local audio artifact once downloaded/converted.
    pub local_path: Option<PathBuf>,
    /// Download/convert progress in `0.0..=1.0`.
    pub progress: f64,
    pub status: ItemStatus,
}

impl Item {
    pub fn new(source: impl Into<String>) -> Self {
        let source = source.into();
        let media_id = extract_media_id(&source).unwrap_or_else(|| UNKNOWN_MEDIA_ID.to_string());
        Self {
            id: Uuid::new_v4(),
            source,
            media_id,
            title: PENDING_TITLE.to_string(),
            artist: None,
            thumbnail: None,
            duration: None,
            local_path: None,
            progress: 0.0,
            status: ItemStatus::Queued,
        }
    }

    /// Sets the progress, clamped into `0.0..=1.0`.
    pub fn set_progress(&mut self, progress: f64) {
        self.progress = if progress.is_nan() {
            0.0
        } else {
            progress.clamp(0.0, 1.0)
        };
    }

    /// "Title - Artist" when the artist is known.
    pub fn display_name(&self) -> String {
        match &self.artist {
            Some(artist) if !artist.is_empty() => format!("{} - {}", self.title, artist),
            _ => self.title.clone(),
        }
    }
}

fn media_id_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"(?:v=|/v/)([A-Za-z0-9_-]{11})",
            r"youtu\.be/([A-Za-z0-9_-]{11})",
            r"embed/([A-Za-z0-9_-]{11})",
            r"shorts/([A-Za-z0-9_-]{11})",
        ]
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
    })
}

/// Extracts the 11-character video identifier from a source URL.
pub fn extract_media_id(source: &str) -> Option<String> {
    media_id_patterns()
        .iter()
        .find_map(|re| re.captures(source))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}
