//! Play history persisted as a JSON file.
//!
//! Newest entry first, one entry per media id, capped in size. Persistence
//! failures are logged and never interrupt playback.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use ytsqueue::{Item, UNKNOWN_MEDIA_ID};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub media_id: String,
    pub source: String,
    pub title: String,
    pub artist: Option<String>,
    pub thumbnail: Option<String>,
    pub played_at: DateTime<Utc>,
}

impl HistoryEntry {
    fn from_item(item: &Item) -> Self {
        Self {
            media_id: item.media_id.clone(),
            source: item.source.clone(),
            title: item.title.clone(),
            artist: item.artist.clone(),
            thumbnail: item.thumbnail.clone(),
            played_at: Utc::now(),
        }
    }

    /// De-duplication key: the media id, or the source when the id is unknown.
    pub fn key(&self) -> &str {
        if self.media_id == UNKNOWN_MEDIA_ID {
            &self.source
        } else {
            &self.media_id
        }
    }
}

#[derive(Debug)]
pub struct History {
    path: PathBuf,
    max_items: usize,
    entries: Vec<HistoryEntry>,
}

impl History {
    /// Loads the history file. A missing or unreadable file gives an empty history.
    pub fn load(path: impl Into<PathBuf>, max_items: usize) -> Self {
        let path = path.into();
        let entries = match std::fs::read(&path) {
            Ok(data) => match serde_json::from_slice::<Vec<HistoryEntry>>(&data) {
                Ok(mut entries) => {
                    entries.truncate(max_items);
                    entries
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Corrupt history file, starting empty");
                    Vec::new()
                }
            },
            Err(_) => Vec::new(),
        };
        debug!(path = %path.display(), entries = entries.len(), "History loaded");

        Self {
            path,
            max_items,
            entries,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    /// Records `item` as just played.
    pub fn add(&mut self, item: &Item) {
        let entry = HistoryEntry::from_item(item);
        self.entries.retain(|e| e.key() != entry.key());
        self.entries.insert(0, entry);
        self.entries.truncate(self.max_items);
        self.save();
    }

    /// Removes the entry with the given [`HistoryEntry::key`].
    pub fn remove(&mut self, key: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.key() != key);
        let removed = self.entries.len() != before;
        if removed {
            self.save();
        }
        removed
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.save();
    }

    fn save(&self) {
        let result = serde_json::to_vec_pretty(&self.entries)
            .map_err(std::io::Error::other)
            .and_then(|json| {
                if let Some(parent) = self.path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(&self.path, json)
            });
        if let Err(e) = result {
            warn!(path = %self.path.display(), error = %e, "Cannot save history");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(url: &str, title: &str) -> Item {
        let mut item = Item::new(url);
        item.title = title.into();
        item
    }

    #[test]
    fn test_newest_first_and_deduplicated() {
        let dir = tempfile::tempdir().unwrap();
        let mut history = History::load(dir.path().join("history.json"), 10);

        history.add(&item("https://youtu.be/aaaaaaaaaaa", "A"));
        history.add(&item("https://youtu.be/bbbbbbbbbbb", "B"));
        history.add(&item("https://www.youtube.com/watch?v=aaaaaaaaaaa", "A again"));

        let titles: Vec<_> = history.entries().iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, ["A again", "B"]);
    }

    #[test]
    fn test_capped_and_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        let mut history = History::load(&path, 2);
        history.add(&item("https://example.com/1", "1"));
        history.add(&item("https://example.com/2", "2"));
        history.add(&item("https://example.com/3", "3"));
        assert_eq!(history.entries().len(), 2);

        let reloaded = History::load(&path, 2);
        assert_eq!(reloaded.entries(), history.entries());
        assert_eq!(reloaded.entries()[0].title, "3");
    }

    #[test]
    fn test_remove_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let mut history = History::load(dir.path().join("h.json"), 10);
        history.add(&item("https://youtu.be/aaaaaaaaaaa", "A"));
        history.add(&item("https://youtu.be/bbbbbbbbbbb", "B"));

        assert!(history.remove("aaaaaaaaaaa"));
        assert!(!history.remove("aaaaaaaaaaa"));
        assert_eq!(history.entries().len(), 1);

        // entries without a media id are keyed by their source
        history.add(&item("https://example.com/x", "X"));
        assert_eq!(history.entries()[0].key(), "https://example.com/x");
        assert!(history.remove("https://example.com/x"));

        history.clear();
        assert!(History::load(dir.path().join("h.json"), 10).entries().is_empty());
    }

    #[test]
    fn test_corrupt_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("h.json");
        std::fs::write(&path, b"{not json").unwrap();
        assert!(History::load(&path, 10).entries().is_empty());
    }
}
