use log::warn;
use serde::{ Deserialize, Serialize };
use std::fs;
use std::path::PathBuf;
use std::sync::{ Arc, Mutex };
use thiserror::Error;

use crate::models::chat::ChatMessage;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("transcript store IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("transcript serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Persisted widget state: the capped conversation (non-system turns only)
/// plus the one-time welcome flag.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StoredTranscript {
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub welcome_shown: bool,
    #[serde(default)]
    pub saved_at: i64,
}

/// Client-local storage boundary. Embedding hosts supply their own backend;
/// a file store and an in-memory store ship with the crate.
pub trait TranscriptStore: Send + Sync {
    /// Best-effort restore. Absent or malformed state surfaces as `None`;
    /// the caller reinitializes rather than failing the session.
    fn load(&self) -> Option<StoredTranscript>;

    fn save(&self, state: &StoredTranscript) -> Result<(), StoreError>;
}

/// Single-blob JSON file store, the desktop analog of the browser's keyed
/// local storage entry.
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl TranscriptStore for FileStore {
    fn load(&self) -> Option<StoredTranscript> {
        let raw = fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str(&raw) {
            Ok(state) => Some(state),
            Err(e) => {
                warn!("Discarding malformed transcript at '{}': {}", self.path.display(), e);
                None
            }
        }
    }

    fn save(&self, state: &StoredTranscript) -> Result<(), StoreError> {
        let json = serde_json::to_string(state)?;
        fs::write(&self.path, json)?;
        Ok(())
    }
}

/// In-memory store for tests and short-lived embeds.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Option<StoredTranscript>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TranscriptStore for MemoryStore {
    fn load(&self) -> Option<StoredTranscript> {
        self.inner.lock().ok()?.clone()
    }

    fn save(&self, state: &StoredTranscript) -> Result<(), StoreError> {
        if let Ok(mut slot) = self.inner.lock() {
            *slot = Some(state.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (FileStore, PathBuf) {
        let mut path = std::env::temp_dir();
        path.push(format!("transcript-{}.json", uuid::Uuid::new_v4()));
        (FileStore::new(path.clone()), path)
    }

    #[test]
    fn file_store_round_trips() {
        let (store, path) = temp_store();
        let state = StoredTranscript {
            messages: vec![ChatMessage::user("价格"), ChatMessage::assistant("¥9800/年起")],
            welcome_shown: true,
            saved_at: 1_700_000_000,
        };
        store.save(&state).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.messages, state.messages);
        assert!(loaded.welcome_shown);
        fs::remove_file(path).ok();
    }

    #[test]
    fn absent_file_loads_as_none() {
        let (store, _path) = temp_store();
        assert!(store.load().is_none());
    }

    #[test]
    fn malformed_file_loads_as_none() {
        let (store, path) = temp_store();
        fs::write(&path, "{{{").unwrap();
        assert!(store.load().is_none());
        fs::remove_file(path).ok();
    }

    #[test]
    fn memory_store_is_shared_across_clones() {
        let store = MemoryStore::new();
        let state = StoredTranscript { welcome_shown: true, ..Default::default() };
        store.clone().save(&state).unwrap();
        assert!(store.load().unwrap().welcome_shown);
    }
}
