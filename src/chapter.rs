use crate::error::ReaderError;
use crate::vocab::{Vocabulary, VocabularyEntry};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Text and vocabulary of one chapter, fetched together.
#[derive(Debug, Clone)]
pub struct ChapterData {
    pub chapter: u32,
    pub text: String,
    pub vocabulary: Vocabulary,
}

/// Supplies chapter text and vocabulary. Either call may fail on its own; both failures
/// surface as [`ReaderError::DataUnavailable`].
#[async_trait]
pub trait ChapterSource: Send + Sync {
    async fn fetch_text(&self, chapter: u32) -> Result<String, ReaderError>;
    async fn fetch_vocabulary(&self, chapter: u32) -> Result<Vocabulary, ReaderError>;
}

/// Fetches both halves concurrently and only succeeds if both do.
pub async fn fetch_chapter(
    source: &dyn ChapterSource,
    chapter: u32,
) -> Result<ChapterData, ReaderError> {
    let (text, vocabulary) = tokio::join!(
        source.fetch_text(chapter),
        source.fetch_vocabulary(chapter)
    );
    Ok(ChapterData {
        chapter,
        text: text?,
        vocabulary: vocabulary?,
    })
}

pub fn chapter_text_path(data_dir: &Path, chapter: u32) -> PathBuf {
    data_dir
        .join("chapters")
        .join(format!("chapter_{chapter}.txt"))
}

pub fn vocabulary_path(data_dir: &Path, chapter: u32) -> PathBuf {
    data_dir
        .join("vocab_data")
        .join(format!("vocab_ch{chapter}.json"))
}

/// Reads `chapters/chapter_<n>.txt` and `vocab_data/vocab_ch<n>.json` under a data
/// directory.
#[derive(Debug, Clone)]
pub struct FsChapterSource {
    data_dir: PathBuf,
    max_chapter: u32,
}

impl FsChapterSource {
    pub fn new(data_dir: impl Into<PathBuf>, max_chapter: u32) -> Self {
        Self {
            data_dir: data_dir.into(),
            max_chapter,
        }
    }

    fn check_range(&self, chapter: u32) -> Result<(), ReaderError> {
        if chapter == 0 || chapter > self.max_chapter {
            return Err(ReaderError::unavailable(
                chapter,
                format!("chapter must be between 1 and {}", self.max_chapter),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl ChapterSource for FsChapterSource {
    async fn fetch_text(&self, chapter: u32) -> Result<String, ReaderError> {
        self.check_range(chapter)?;
        let path = chapter_text_path(&self.data_dir, chapter);
        debug!(path = %path.display(), "reading chapter text");
        tokio::fs::read_to_string(&path)
            .await
            .map_err(|err| ReaderError::unavailable(chapter, format!("{}: {err}", path.display())))
    }

    async fn fetch_vocabulary(&self, chapter: u32) -> Result<Vocabulary, ReaderError> {
        self.check_range(chapter)?;
        let path = vocabulary_path(&self.data_dir, chapter);
        debug!(path = %path.display(), "reading chapter vocabulary");
        let raw = tokio::fs::read_to_string(&path)
            .await
            .map_err(|err| ReaderError::unavailable(chapter, format!("{}: {err}", path.display())))?;
        Vocabulary::from_json(chapter, &raw)
            .map_err(|err| ReaderError::unavailable(chapter, format!("{}: {err}", path.display())))
    }
}

/// Chapters held in memory; handy for embedding and tests.
#[derive(Default)]
pub struct MemoryChapterSource {
    chapters: RwLock<HashMap<u32, (Option<String>, Option<Vec<VocabularyEntry>>)>>,
}

impl MemoryChapterSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_chapter(self, chapter: u32, text: &str, entries: Vec<VocabularyEntry>) -> Self {
        self.insert_text(chapter, text);
        self.insert_vocabulary(chapter, entries);
        self
    }

    pub fn insert_text(&self, chapter: u32, text: &str) {
        self.chapters.write().entry(chapter).or_default().0 = Some(text.to_string());
    }

    pub fn insert_vocabulary(&self, chapter: u32, entries: Vec<VocabularyEntry>) {
        self.chapters.write().entry(chapter).or_default().1 = Some(entries);
    }
}

#[async_trait]
impl ChapterSource for MemoryChapterSource {
    async fn fetch_text(&self, chapter: u32) -> Result<String, ReaderError> {
        self.chapters
            .read()
            .get(&chapter)
            .and_then(|(text, _)| text.clone())
            .ok_or_else(|| ReaderError::unavailable(chapter, "text not found"))
    }

    async fn fetch_vocabulary(&self, chapter: u32) -> Result<Vocabulary, ReaderError> {
        self.chapters
            .read()
            .get(&chapter)
            .and_then(|(_, entries)| entries.clone())
            .map(|entries| Vocabulary::new(chapter, entries))
            .ok_or_else(|| ReaderError::unavailable(chapter, "vocabulary not found"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[tokio::test]
    async fn fs_source_reads_both_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("chapters")).unwrap();
        fs::create_dir_all(dir.path().join("vocab_data")).unwrap();
        fs::write(chapter_text_path(dir.path(), 2), "Der Vater kam.").unwrap();
        fs::write(
            vocabulary_path(dir.path(), 2),
            r#"[{"word":"vater","definition_german":"Papa","definition_english":"father"}]"#,
        )
        .unwrap();

        let source = FsChapterSource::new(dir.path(), 97);
        let data = fetch_chapter(&source, 2).await.expect("chapter loads");
        assert_eq!(data.text, "Der Vater kam.");
        assert_eq!(data.vocabulary.len(), 1);
        assert_eq!(data.vocabulary.entries()[0].chapter, 2);
    }

    #[tokio::test]
    async fn missing_vocabulary_fails_whole_fetch() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("chapters")).unwrap();
        fs::write(chapter_text_path(dir.path(), 1), "Text").unwrap();
        let source = FsChapterSource::new(dir.path(), 97);
        let err = fetch_chapter(&source, 1).await.unwrap_err();
        assert!(matches!(err, ReaderError::DataUnavailable { chapter: 1, .. }));
    }

    #[tokio::test]
    async fn malformed_vocabulary_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("vocab_data")).unwrap();
        fs::write(vocabulary_path(dir.path(), 4), "{not json").unwrap();
        let source = FsChapterSource::new(dir.path(), 97);
        let err = source.fetch_vocabulary(4).await.unwrap_err();
        assert!(matches!(err, ReaderError::DataUnavailable { chapter: 4, .. }));
    }

    #[tokio::test]
    async fn out_of_range_chapter_is_unavailable() {
        let source = FsChapterSource::new("/nonexistent", 97);
        assert!(source.fetch_text(0).await.is_err());
        assert!(source.fetch_text(98).await.is_err());
    }

    #[tokio::test]
    async fn memory_source_fails_each_half_independently() {
        let source = MemoryChapterSource::new();
        source.insert_text(5, "Nur Text");
        assert!(source.fetch_text(5).await.is_ok());
        assert!(source.fetch_vocabulary(5).await.is_err());
        assert!(fetch_chapter(&source, 5).await.is_err());
    }
}
