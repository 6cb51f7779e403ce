use crate::error::ReaderError;
use crate::vocab::{Vocabulary, canonical_word};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tracing::{debug, warn};

/// Key under which the ordered selection list is stored.
pub const SELECTION_KEY: &str = "selectedVocab";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Minimal key-value persistence used for the reader's word set.
pub trait KeyValueStore: Send + Sync {
    fn read(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn write(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

/// One JSON file per key under `root`.
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let file: String = key
            .chars()
            .map(|ch| {
                if ch.is_ascii_alphanumeric() || ch == '_' || ch == '-' {
                    ch
                } else {
                    '_'
                }
            })
            .collect();
        self.root.join(format!("{file}.json"))
    }
}

impl KeyValueStore for JsonFileStore {
    fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(raw) => Ok(Some(raw)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StoreError> {
        fs::create_dir_all(&self.root)?;
        let path = self.path_for(key);
        let staging = path.with_extension("json.tmp");
        fs::write(&staging, value)?;
        fs::rename(&staging, &path)?;
        Ok(())
    }
}

/// Process-local store. Can be switched offline to exercise failure handling.
#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
    offline: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::Release);
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::Acquire) {
            return Err(StoreError::Unavailable("memory store is offline".to_string()));
        }
        Ok(())
    }
}

impl KeyValueStore for MemoryStore {
    fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.check_online()?;
        Ok(self.values.lock().get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.check_online()?;
        self.values.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionEntry {
    pub word: String,
    #[serde(alias = "definition", default)]
    pub definition_native: String,
    #[serde(alias = "definitionEN", default)]
    pub definition_foreign: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Toggled {
    Added,
    Removed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AddOutcome {
    Added,
    AlreadyPresent,
    /// The word is not part of the active chapter's vocabulary.
    Unknown,
}

pub const EMPTY_SIDEBAR_MESSAGE: &str =
    "Dein Set ist leer. Klicke Wörter im Text an, um sie hinzuzufügen.";

impl AddOutcome {
    /// Feedback for the add affordance; `None` when the add went through.
    pub fn message(&self, word: &str) -> Option<String> {
        match self {
            AddOutcome::Added => None,
            AddOutcome::AlreadyPresent => Some(format!("\"{word}\" ist schon im Set!")),
            AddOutcome::Unknown => Some(format!("\"{word}\" steht nicht im Vokabular dieses Kapitels.")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "message", rename_all = "snake_case")]
pub enum Persistence {
    Saved,
    /// Nothing needed writing.
    Unchanged,
    Failed(String),
}

/// Result of a store operation. The in-memory outcome always stands; a failed write is a
/// warning and is retried with the next mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change<T> {
    pub outcome: T,
    pub persistence: Persistence,
}

impl<T> Change<T> {
    pub fn warning(&self) -> Option<ReaderError> {
        match &self.persistence {
            Persistence::Failed(message) => Some(ReaderError::PersistenceFailure(message.clone())),
            _ => None,
        }
    }
}

/// Ordered word set chosen by the reader, persisted as a whole on every mutation.
pub struct SelectionStore {
    entries: Vec<SelectionEntry>,
    backend: Arc<dyn KeyValueStore>,
    key: String,
    dirty: bool,
}

impl SelectionStore {
    /// Reads the persisted list once. A missing, empty, unreadable or malformed blob
    /// yields an empty set.
    pub fn load(backend: Arc<dyn KeyValueStore>) -> Self {
        Self::load_with_key(backend, SELECTION_KEY)
    }

    pub fn load_with_key(backend: Arc<dyn KeyValueStore>, key: &str) -> Self {
        let entries = match backend.read(key) {
            Ok(Some(raw)) if !raw.trim().is_empty() => {
                match serde_json::from_str::<Vec<SelectionEntry>>(&raw) {
                    Ok(entries) => dedupe(entries),
                    Err(err) => {
                        warn!(error = %err, key, "ignoring malformed selection blob");
                        Vec::new()
                    }
                }
            }
            Ok(_) => Vec::new(),
            Err(err) => {
                warn!(error = %err, key, "failed to read selection, starting empty");
                Vec::new()
            }
        };
        debug!(count = entries.len(), "loaded selection");
        Self {
            entries,
            backend,
            key: key.to_string(),
            dirty: false,
        }
    }

    /// Adds the word if absent, removes it if present.
    pub fn toggle(
        &mut self,
        word: &str,
        definition_native: &str,
        definition_foreign: &str,
    ) -> Change<Toggled> {
        let word = canonical_word(word);
        let outcome = match self.position(&word) {
            Some(index) => {
                self.entries.remove(index);
                Toggled::Removed
            }
            None => {
                self.entries.push(SelectionEntry {
                    word,
                    definition_native: definition_native.to_string(),
                    definition_foreign: definition_foreign.to_string(),
                });
                Toggled::Added
            }
        };
        let persistence = self.persist();
        Change {
            outcome,
            persistence,
        }
    }

    /// Non-toggling add; definitions come from the active vocabulary.
    pub fn add_if_absent(&mut self, word: &str, vocabulary: &Vocabulary) -> Change<AddOutcome> {
        let key = canonical_word(word);
        if self.position(&key).is_some() {
            return Change {
                outcome: AddOutcome::AlreadyPresent,
                persistence: self.retry_pending(),
            };
        }
        let Some(entry) = vocabulary.get(&key) else {
            return Change {
                outcome: AddOutcome::Unknown,
                persistence: self.retry_pending(),
            };
        };
        self.entries.push(SelectionEntry {
            word: key,
            definition_native: entry.definition_native.clone(),
            definition_foreign: entry.definition_foreign.clone(),
        });
        Change {
            outcome: AddOutcome::Added,
            persistence: self.persist(),
        }
    }

    /// Empties the set and returns how many entries were dropped. Callers are expected
    /// to have obtained the reader's confirmation.
    pub fn clear(&mut self) -> Change<usize> {
        let removed = self.entries.len();
        self.entries.clear();
        Change {
            outcome: removed,
            persistence: self.persist(),
        }
    }

    pub fn snapshot(&self) -> &[SelectionEntry] {
        &self.entries
    }

    pub fn contains(&self, word: &str) -> bool {
        self.position(&canonical_word(word)).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True while the last write failed and has not been retried successfully.
    pub fn has_unsaved_changes(&self) -> bool {
        self.dirty
    }

    /// Writes the current list if a previous write failed.
    pub fn retry_pending(&mut self) -> Persistence {
        if self.dirty {
            self.persist()
        } else {
            Persistence::Unchanged
        }
    }

    fn position(&self, canonical: &str) -> Option<usize> {
        self.entries.iter().position(|entry| entry.word == canonical)
    }

    fn persist(&mut self) -> Persistence {
        let result = serde_json::to_string(&self.entries)
            .map_err(StoreError::from)
            .and_then(|blob| self.backend.write(&self.key, &blob));
        match result {
            Ok(()) => {
                self.dirty = false;
                Persistence::Saved
            }
            Err(err) => {
                warn!(error = %err, key = %self.key, "failed to persist selection");
                self.dirty = true;
                Persistence::Failed(err.to_string())
            }
        }
    }
}

fn dedupe(entries: Vec<SelectionEntry>) -> Vec<SelectionEntry> {
    let mut seen = HashSet::new();
    entries
        .into_iter()
        .filter_map(|mut entry| {
            entry.word = canonical_word(&entry.word);
            seen.insert(entry.word.clone()).then_some(entry)
        })
        .collect()
}
