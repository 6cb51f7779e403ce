//! Offline job that folds approved submissions back into the per-chapter vocabulary
//! files the reader loads.

use crate::chapter::vocabulary_path;
use crate::submission::{SubmissionRecord, SubmissionStatus, read_queue};
use crate::vocab::{VocabularyEntry, merge_vocabulary};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("failed to read submission queue {path}: {source}")]
    Queue {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to serialize chapter {chapter}: {source}")]
    Serialize {
        chapter: u32,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub queue_path: PathBuf,
    /// Root holding `vocab_data/`.
    pub data_dir: PathBuf,
    pub max_chapter: u32,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ChapterSync {
    pub chapter: u32,
    pub written: bool,
    pub merged: usize,
    pub added: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    pub approved: usize,
    pub out_of_range: usize,
    pub chapters: Vec<ChapterSync>,
}

impl SyncReport {
    pub fn written(&self) -> impl Iterator<Item = &ChapterSync> {
        self.chapters.iter().filter(|c| c.written)
    }
}

/// Approved records with an in-range chapter, grouped by chapter in queue order.
fn group_approved(
    records: Vec<SubmissionRecord>,
    max_chapter: u32,
    report: &mut SyncReport,
) -> BTreeMap<u32, Vec<VocabularyEntry>> {
    let mut grouped: BTreeMap<u32, Vec<VocabularyEntry>> = BTreeMap::new();
    for record in records {
        if record.status != SubmissionStatus::Approved {
            continue;
        }
        report.approved += 1;
        if record.chapter == 0 || record.chapter > max_chapter {
            report.out_of_range += 1;
            debug!(chapter = record.chapter, word = %record.word, "approved record outside chapter range");
            continue;
        }
        grouped
            .entry(record.chapter)
            .or_default()
            .push(VocabularyEntry {
                word: record.word.trim().to_lowercase(),
                definition_native: record.definition_native,
                definition_foreign: record.definition_foreign,
                chapter: record.chapter,
                context_snippet: record.context_snippet,
            });
    }
    grouped
}

/// Existing chapter list. Missing file reads as empty; an unreadable one is logged and
/// also treated as empty.
fn read_existing(path: &Path) -> Vec<VocabularyEntry> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Vec::new(),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "failed to read existing vocabulary");
            return Vec::new();
        }
    };
    serde_json::from_str(&raw).unwrap_or_else(|err| {
        warn!(path = %path.display(), error = %err, "existing vocabulary is malformed");
        Vec::new()
    })
}

fn write_atomic(path: &Path, contents: &str) -> Result<(), SyncError> {
    let wrap = |source| SyncError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(wrap)?;
    }
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, contents).map_err(wrap)?;
    fs::rename(&tmp, path).map_err(wrap)
}

pub fn run_sync(config: &SyncConfig) -> Result<SyncReport, SyncError> {
    let records = read_queue(&config.queue_path).map_err(|source| SyncError::Queue {
        path: config.queue_path.clone(),
        source,
    })?;
    let mut report = SyncReport::default();
    let grouped = group_approved(records, config.max_chapter, &mut report);

    for chapter in 1..=config.max_chapter {
        let Some(incoming) = grouped.get(&chapter) else {
            continue;
        };
        let path = vocabulary_path(&config.data_dir, chapter);
        let existing = read_existing(&path);
        let added = incoming.len();
        let mut merged = merge_vocabulary(existing, incoming.clone());
        for entry in &mut merged {
            if entry.chapter == 0 {
                entry.chapter = chapter;
            }
        }

        if merged.is_empty() {
            report.chapters.push(ChapterSync {
                chapter,
                written: false,
                merged: 0,
                added,
            });
            continue;
        }

        let json = serde_json::to_string_pretty(&merged)
            .map_err(|source| SyncError::Serialize { chapter, source })?;
        write_atomic(&path, &json)?;
        info!(
            chapter,
            merged = merged.len(),
            added,
            path = %path.display(),
            "merged approved vocabulary"
        );
        report.chapters.push(ChapterSync {
            chapter,
            written: true,
            merged: merged.len(),
            added,
        });
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::io::Write;

    fn record(word: &str, chapter: u32, status: SubmissionStatus) -> SubmissionRecord {
        SubmissionRecord {
            word: word.to_string(),
            definition_native: format!("{word} (de)"),
            definition_foreign: format!("{word} (en)"),
            chapter,
            context_snippet: None,
            submitted_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            status,
        }
    }

    fn write_queue(path: &Path, records: &[SubmissionRecord]) {
        let mut file = fs::File::create(path).unwrap();
        for r in records {
            writeln!(file, "{}", serde_json::to_string(r).unwrap()).unwrap();
        }
    }

    fn config(dir: &Path) -> SyncConfig {
        SyncConfig {
            queue_path: dir.join("submissions.jsonl"),
            data_dir: dir.join("data"),
            max_chapter: 5,
        }
    }

    #[test]
    fn merges_new_over_existing_and_skips_untouched_chapters() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let existing_path = vocabulary_path(&cfg.data_dir, 1);
        fs::create_dir_all(existing_path.parent().unwrap()).unwrap();
        fs::write(
            &existing_path,
            r#"[{"word":"haus","definition_german":"alt","definition_english":"old","chapter":1},
                {"word":"tür","definition_german":"Tür","definition_english":"door","chapter":1}]"#,
        )
        .unwrap();
        let untouched = vocabulary_path(&cfg.data_dir, 2);
        fs::write(&untouched, "[]").unwrap();

        write_queue(
            &cfg.queue_path,
            &[
                record("Haus", 1, SubmissionStatus::Approved),
                record("Fenster", 1, SubmissionStatus::Approved),
                record("Garten", 1, SubmissionStatus::Pending),
                record("Kontor", 3, SubmissionStatus::Approved),
                record("Zeit", 42, SubmissionStatus::Approved),
            ],
        );

        let report = run_sync(&cfg).unwrap();
        assert_eq!(report.approved, 4);
        assert_eq!(report.out_of_range, 1);
        assert_eq!(
            report.written().map(|c| c.chapter).collect::<Vec<_>>(),
            vec![1, 3]
        );

        let raw = fs::read_to_string(&existing_path).unwrap();
        assert!(raw.contains("\n  {"), "pretty printed with two-space indent");
        let merged: Vec<VocabularyEntry> = serde_json::from_str(&raw).unwrap();
        let words: Vec<_> = merged.iter().map(|e| e.word.as_str()).collect();
        assert_eq!(words, vec!["haus", "tür", "fenster"]);
        assert_eq!(merged[0].definition_native, "Haus (de)");

        assert_eq!(fs::read_to_string(&untouched).unwrap(), "[]");
        assert!(vocabulary_path(&cfg.data_dir, 3).exists());
    }

    #[test]
    fn malformed_existing_file_is_treated_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let path = vocabulary_path(&cfg.data_dir, 4);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "{oops").unwrap();
        write_queue(&cfg.queue_path, &[record("Brief", 4, SubmissionStatus::Approved)]);

        let report = run_sync(&cfg).unwrap();
        assert_eq!(report.chapters[0].merged, 1);
        let merged: Vec<VocabularyEntry> =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(merged[0].word, "brief");
    }

    #[test]
    fn empty_queue_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let report = run_sync(&cfg).unwrap();
        assert!(report.chapters.is_empty());
        assert!(!cfg.data_dir.exists());
    }
}
