//! Annotated chapter reader: highlights a chapter's vocabulary in its text, keeps a
//! persistent set of words the reader picked, exports that set as CSV and feeds new
//! words back through a moderated submission queue.

pub mod annotate;
pub mod chapter;
pub mod config;
pub mod error;
pub mod export;
pub mod markup;
pub mod pattern;
pub mod reader;
pub mod selection;
pub mod submission;
pub mod sync;
pub mod vocab;

#[cfg(feature = "web")]
pub mod web;

pub use annotate::{Annotated, Annotator, annotate};
pub use chapter::{ChapterData, ChapterSource, FsChapterSource, MemoryChapterSource};
pub use config::ReaderConfig;
pub use error::{Precondition, ReaderError};
pub use reader::{ChapterView, ReaderSession, ReaderState, RenderedChapter, SwitchOutcome};
pub use selection::{
    AddOutcome, Change, JsonFileStore, KeyValueStore, MemoryStore, Persistence, SelectionEntry,
    SelectionStore, Toggled,
};
pub use submission::{SubmissionDraft, SubmissionQueue, SubmissionRecord, SubmissionStatus};
pub use sync::{SyncConfig, SyncReport, run_sync};
pub use vocab::{Vocabulary, VocabularyEntry};
