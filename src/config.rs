use crate::chapter::FsChapterSource;
use crate::selection::{JsonFileStore, SelectionStore};
use crate::submission::JsonlSubmissionQueue;
use crate::sync::SyncConfig;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

pub const DEFAULT_MAX_CHAPTER: u32 = 97;

/// Where the reader finds its data and keeps its state.
#[derive(Debug, Clone)]
pub struct ReaderConfig {
    /// Holds `chapters/` and `vocab_data/`.
    pub data_dir: PathBuf,
    /// Holds the persisted selection and the submission queue.
    pub state_dir: PathBuf,
    pub max_chapter: u32,
    pub addr: SocketAddr,
    pub base_url: String,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            state_dir: PathBuf::from("state"),
            max_chapter: DEFAULT_MAX_CHAPTER,
            addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            base_url: "http://127.0.0.1:8080".to_string(),
        }
    }
}

impl ReaderConfig {
    pub fn selection_dir(&self) -> PathBuf {
        self.state_dir.join("selection")
    }

    pub fn submission_queue_path(&self) -> PathBuf {
        self.state_dir.join("submissions.jsonl")
    }

    pub fn chapter_source(&self) -> FsChapterSource {
        FsChapterSource::new(&self.data_dir, self.max_chapter)
    }

    pub fn selection_store(&self) -> SelectionStore {
        SelectionStore::load(Arc::new(JsonFileStore::new(self.selection_dir())))
    }

    pub fn submission_queue(&self) -> JsonlSubmissionQueue {
        JsonlSubmissionQueue::new(self.submission_queue_path())
    }

    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            queue_path: self.submission_queue_path(),
            data_dir: self.data_dir.clone(),
            max_chapter: self.max_chapter,
        }
    }

    pub fn chapters(&self) -> impl Iterator<Item = u32> {
        1..=self.max_chapter
    }
}
