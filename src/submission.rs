use crate::error::ReaderError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{info, warn};

pub const MISSING_FIELDS_MESSAGE: &str = "Bitte Wort, DE Definition, und EN Definition eingeben.";

#[derive(Debug, Error)]
pub enum SubmissionError {
    /// Caught before anything is sent.
    #[error("{0}")]
    Rejected(String),
    /// The queue could not accept the record.
    #[error("submission queue unavailable: {0}")]
    Transport(String),
}

impl From<SubmissionError> for ReaderError {
    fn from(err: SubmissionError) -> Self {
        ReaderError::SubmissionRejected(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

/// Form input as typed by the reader.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionDraft {
    #[serde(default)]
    pub word: String,
    #[serde(default)]
    pub definition_native: String,
    #[serde(default)]
    pub definition_foreign: String,
    #[serde(default)]
    pub chapter: u32,
    #[serde(default)]
    pub context_snippet: Option<String>,
}

/// Record placed on the moderation queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub word: String,
    #[serde(alias = "definition_german")]
    pub definition_native: String,
    #[serde(alias = "definition_english")]
    pub definition_foreign: String,
    pub chapter: u32,
    #[serde(default)]
    pub context_snippet: Option<String>,
    pub submitted_at: DateTime<Utc>,
    #[serde(default)]
    pub status: SubmissionStatus,
}

impl SubmissionDraft {
    /// Trims every field and checks that word and both definitions are present and the
    /// chapter exists.
    pub fn validate(
        &self,
        max_chapter: u32,
        now: DateTime<Utc>,
    ) -> Result<SubmissionRecord, SubmissionError> {
        let word = self.word.trim();
        let native = self.definition_native.trim();
        let foreign = self.definition_foreign.trim();
        if word.is_empty() || native.is_empty() || foreign.is_empty() {
            return Err(SubmissionError::Rejected(MISSING_FIELDS_MESSAGE.to_string()));
        }
        if self.chapter == 0 || self.chapter > max_chapter {
            return Err(SubmissionError::Rejected(format!(
                "Kapitel muss zwischen 1 und {max_chapter} liegen."
            )));
        }
        Ok(SubmissionRecord {
            word: word.to_string(),
            definition_native: native.to_string(),
            definition_foreign: foreign.to_string(),
            chapter: self.chapter,
            context_snippet: self
                .context_snippet
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            submitted_at: now,
            status: SubmissionStatus::Pending,
        })
    }
}

pub fn thank_you_message(word: &str) -> String {
    format!("Vielen Dank! Wort \"{word}\" wurde gesendet.")
}

/// Write side of the moderation queue.
#[async_trait]
pub trait SubmissionQueue: Send + Sync {
    async fn enqueue(&self, record: &SubmissionRecord) -> Result<(), SubmissionError>;
}

/// Append-only JSON lines file; one record per line.
pub struct JsonlSubmissionQueue {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlSubmissionQueue {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SubmissionQueue for JsonlSubmissionQueue {
    async fn enqueue(&self, record: &SubmissionRecord) -> Result<(), SubmissionError> {
        let mut line =
            serde_json::to_vec(record).map_err(|err| SubmissionError::Transport(err.to_string()))?;
        line.push(b'\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| SubmissionError::Transport(err.to_string()))?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|err| SubmissionError::Transport(err.to_string()))?;
        file.write_all(&line)
            .await
            .map_err(|err| SubmissionError::Transport(err.to_string()))?;
        file.flush()
            .await
            .map_err(|err| SubmissionError::Transport(err.to_string()))?;
        info!(word = %record.word, chapter = record.chapter, "submission queued");
        Ok(())
    }
}

/// Reads every record from a queue file. Malformed lines are logged and skipped; a
/// missing file reads as empty.
pub fn read_queue(path: &Path) -> io::Result<Vec<SubmissionRecord>> {
    let file = match fs::File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err),
    };
    let mut records = Vec::new();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<SubmissionRecord>(&line) {
            Ok(record) => records.push(record),
            Err(err) => warn!(line = index + 1, error = %err, "skipping malformed submission"),
        }
    }
    Ok(records)
}
