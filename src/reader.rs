//! Reader controller: owns the active chapter, its annotated rendering and the word set.
//!
//! Chapter switches are superseded rather than cancelled. Every switch draws a new
//! generation number; a fetch that completes with an older number is dropped on arrival,
//! so a slow chapter N can never overwrite a chapter N+1 that finished first.

use crate::annotate::Annotator;
use crate::chapter::{ChapterData, ChapterSource, fetch_chapter};
use crate::error::{Precondition, ReaderError};
use crate::selection::{AddOutcome, Change, SelectionStore, Toggled};
use crate::vocab::Vocabulary;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Identifies one chapter request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChapterTicket {
    pub chapter: u32,
    generation: u64,
}

impl ChapterTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Debug, Clone)]
pub struct RenderedChapter {
    pub chapter: u32,
    pub html: String,
    pub marker_count: usize,
    pub vocabulary: Vocabulary,
}

#[derive(Debug, Clone)]
pub enum ChapterView {
    Empty,
    Loading { chapter: u32 },
    Ready(Arc<RenderedChapter>),
    Failed { chapter: u32, message: String },
}

impl ChapterView {
    pub fn chapter(&self) -> Option<u32> {
        match self {
            ChapterView::Empty => None,
            ChapterView::Loading { chapter } | ChapterView::Failed { chapter, .. } => Some(*chapter),
            ChapterView::Ready(rendered) => Some(rendered.chapter),
        }
    }
}

#[derive(Debug)]
pub enum SwitchOutcome {
    Rendered(Arc<RenderedChapter>),
    Failed(ReaderError),
    /// A newer switch was issued while this one was in flight; its result was dropped.
    Stale { chapter: u32 },
}

pub struct ReaderState {
    generation: u64,
    view: ChapterView,
    selection: SelectionStore,
}

impl ReaderState {
    pub fn new(selection: SelectionStore) -> Self {
        Self {
            generation: 0,
            view: ChapterView::Empty,
            selection,
        }
    }

    /// Starts a switch and invalidates every ticket issued before.
    pub fn begin_switch(&mut self, chapter: u32) -> ChapterTicket {
        self.generation += 1;
        self.view = ChapterView::Loading { chapter };
        ChapterTicket {
            chapter,
            generation: self.generation,
        }
    }

    pub fn is_current(&self, ticket: &ChapterTicket) -> bool {
        ticket.generation == self.generation
    }

    /// Applies a finished fetch if its ticket is still current.
    pub fn complete(
        &mut self,
        ticket: ChapterTicket,
        fetched: Result<ChapterData, ReaderError>,
    ) -> SwitchOutcome {
        if !self.is_current(&ticket) {
            debug!(
                chapter = ticket.chapter,
                generation = ticket.generation,
                current = self.generation,
                "discarding stale chapter response"
            );
            return SwitchOutcome::Stale {
                chapter: ticket.chapter,
            };
        }
        match fetched.and_then(render_chapter) {
            Ok(rendered) => {
                info!(
                    chapter = rendered.chapter,
                    markers = rendered.marker_count,
                    words = rendered.vocabulary.len(),
                    "chapter rendered"
                );
                let rendered = Arc::new(rendered);
                self.view = ChapterView::Ready(rendered.clone());
                SwitchOutcome::Rendered(rendered)
            }
            Err(err) => {
                warn!(chapter = ticket.chapter, error = %err, "chapter render skipped");
                self.view = ChapterView::Failed {
                    chapter: ticket.chapter,
                    message: err.inline_message(),
                };
                SwitchOutcome::Failed(err)
            }
        }
    }

    pub fn view(&self) -> &ChapterView {
        &self.view
    }

    pub fn active_vocabulary(&self) -> Option<&Vocabulary> {
        match &self.view {
            ChapterView::Ready(rendered) => Some(&rendered.vocabulary),
            _ => None,
        }
    }

    pub fn selection(&self) -> &SelectionStore {
        &self.selection
    }

    /// Click on a marker. Selected words always toggle off; unselected words toggle on
    /// only when the active chapter knows them. Returns `None` for unknown words.
    pub fn toggle_word(&mut self, word: &str) -> Option<Change<Toggled>> {
        if self.selection.contains(word) {
            return Some(self.selection.toggle(word, "", ""));
        }
        let entry = self.active_vocabulary()?.get(word)?.clone();
        Some(
            self.selection
                .toggle(&entry.word, &entry.definition_native, &entry.definition_foreign),
        )
    }

    pub fn add_word(&mut self, word: &str) -> Change<AddOutcome> {
        let empty = Vocabulary::default();
        let vocabulary = match &self.view {
            ChapterView::Ready(rendered) => &rendered.vocabulary,
            _ => &empty,
        };
        self.selection.add_if_absent(word, vocabulary)
    }

    pub fn clear_selection(&mut self) -> Change<usize> {
        self.selection.clear()
    }
}

/// Annotates fetched data. An empty vocabulary or text is a precondition failure.
pub fn render_chapter(data: ChapterData) -> Result<RenderedChapter, ReaderError> {
    if data.vocabulary.is_empty() {
        return Err(ReaderError::PreconditionFailed(Precondition::EmptyVocabulary));
    }
    let annotated = Annotator::from_vocabulary(&data.vocabulary).annotate(&data.text)?;
    Ok(RenderedChapter {
        chapter: data.chapter,
        html: annotated.html,
        marker_count: annotated.marker_count,
        vocabulary: data.vocabulary,
    })
}

/// Shared handle used by the HTTP layer and the CLI.
#[derive(Clone)]
pub struct ReaderSession {
    state: Arc<Mutex<ReaderState>>,
    source: Arc<dyn ChapterSource>,
}

impl ReaderSession {
    pub fn new(source: Arc<dyn ChapterSource>, selection: SelectionStore) -> Self {
        Self {
            state: Arc::new(Mutex::new(ReaderState::new(selection))),
            source,
        }
    }

    /// Fetches and renders `chapter`. The lock is only held before and after the fetch.
    pub async fn switch_chapter(&self, chapter: u32) -> SwitchOutcome {
        let ticket = self.state.lock().begin_switch(chapter);
        let fetched = fetch_chapter(self.source.as_ref(), chapter).await;
        self.state.lock().complete(ticket, fetched)
    }

    pub fn with_state<R>(&self, f: impl FnOnce(&mut ReaderState) -> R) -> R {
        let mut guard = self.state.lock();
        f(&mut guard)
    }

    pub fn view(&self) -> ChapterView {
        self.state.lock().view().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chapter::MemoryChapterSource;
    use crate::selection::MemoryStore;
    use crate::vocab::VocabularyEntry;
    use async_trait::async_trait;
    use tokio::sync::Notify;

    fn selection() -> SelectionStore {
        SelectionStore::load(Arc::new(MemoryStore::new()))
    }

    fn data(chapter: u32, text: &str, words: &[&str]) -> ChapterData {
        ChapterData {
            chapter,
            text: text.to_string(),
            vocabulary: Vocabulary::new(
                chapter,
                words
                    .iter()
                    .map(|w| VocabularyEntry::new(*w, format!("{w}-de"), format!("{w}-en"), chapter)),
            ),
        }
    }

    #[test]
    fn stale_ticket_is_ignored() {
        let mut state = ReaderState::new(selection());
        let slow = state.begin_switch(2);
        let fast = state.begin_switch(3);

        let outcome = state.complete(fast, Ok(data(3, "Die Mutter", &["Mutter"])));
        assert!(matches!(outcome, SwitchOutcome::Rendered(_)));

        let outcome = state.complete(slow, Ok(data(2, "Der Vater", &["Vater"])));
        assert!(matches!(outcome, SwitchOutcome::Stale { chapter: 2 }));
        assert_eq!(state.view().chapter(), Some(3));
        assert!(state.active_vocabulary().unwrap().contains("mutter"));
    }

    #[test]
    fn stale_failure_does_not_replace_current_view() {
        let mut state = ReaderState::new(selection());
        let slow = state.begin_switch(2);
        let fast = state.begin_switch(3);
        state.complete(fast, Ok(data(3, "Die Mutter", &["Mutter"])));
        let outcome = state.complete(slow, Err(ReaderError::unavailable(2, "timeout")));
        assert!(matches!(outcome, SwitchOutcome::Stale { .. }));
        assert!(matches!(state.view(), ChapterView::Ready(_)));
    }

    #[test]
    fn failure_replaces_previous_chapter() {
        let mut state = ReaderState::new(selection());
        let first = state.begin_switch(1);
        state.complete(first, Ok(data(1, "Haus", &["Haus"])));
        let second = state.begin_switch(2);
        let outcome = state.complete(second, Err(ReaderError::unavailable(2, "404")));
        assert!(matches!(outcome, SwitchOutcome::Failed(ReaderError::DataUnavailable { .. })));
        match state.view() {
            ChapterView::Failed { chapter, message } => {
                assert_eq!(*chapter, 2);
                assert!(message.contains("Kapitel 2"));
            }
            other => panic!("unexpected view {other:?}"),
        }
        assert!(state.active_vocabulary().is_none());
    }

    #[test]
    fn empty_vocabulary_skips_rendering() {
        let mut state = ReaderState::new(selection());
        let ticket = state.begin_switch(1);
        let outcome = state.complete(ticket, Ok(data(1, "Text", &[])));
        assert!(matches!(
            outcome,
            SwitchOutcome::Failed(ReaderError::PreconditionFailed(Precondition::EmptyVocabulary))
        ));
    }

    #[test]
    fn toggle_word_uses_active_vocabulary() {
        let mut state = ReaderState::new(selection());
        let ticket = state.begin_switch(1);
        state.complete(ticket, Ok(data(1, "Der Vater", &["Vater"])));

        let change = state.toggle_word("VATER").expect("known word");
        assert_eq!(change.outcome, Toggled::Added);
        assert_eq!(state.selection().snapshot()[0].definition_foreign, "Vater-en");
        assert!(state.toggle_word("Hund").is_none());
        assert_eq!(state.toggle_word("vater").unwrap().outcome, Toggled::Removed);
    }

    #[test]
    fn selected_word_from_older_chapter_can_be_removed() {
        let mut state = ReaderState::new(selection());
        let ticket = state.begin_switch(1);
        state.complete(ticket, Ok(data(1, "Der Vater", &["Vater"])));
        state.toggle_word("vater");
        let ticket = state.begin_switch(2);
        state.complete(ticket, Ok(data(2, "Die Mutter", &["Mutter"])));
        assert_eq!(state.toggle_word("vater").unwrap().outcome, Toggled::Removed);
        assert_eq!(state.add_word("mutter").outcome, AddOutcome::Added);
        assert_eq!(state.clear_selection().outcome, 1);
    }

    /// Holds chapter 2's text until released; everything else answers immediately.
    struct GatedSource {
        inner: MemoryChapterSource,
        gate: Notify,
    }

    #[async_trait]
    impl ChapterSource for GatedSource {
        async fn fetch_text(&self, chapter: u32) -> Result<String, ReaderError> {
            if chapter == 2 {
                self.gate.notified().await;
            }
            self.inner.fetch_text(chapter).await
        }

        async fn fetch_vocabulary(&self, chapter: u32) -> Result<Vocabulary, ReaderError> {
            self.inner.fetch_vocabulary(chapter).await
        }
    }

    #[tokio::test]
    async fn slow_chapter_cannot_clobber_newer_one() {
        let source = Arc::new(GatedSource {
            inner: MemoryChapterSource::new()
                .with_chapter(2, "Der Vater", vec![VocabularyEntry::new("Vater", "", "", 2)])
                .with_chapter(3, "Die Mutter", vec![VocabularyEntry::new("Mutter", "", "", 3)]),
            gate: Notify::new(),
        });
        let session = ReaderSession::new(source.clone(), selection());

        let slow = tokio::spawn({
            let session = session.clone();
            async move { session.switch_chapter(2).await }
        });
        while session.view().chapter() != Some(2) {
            tokio::task::yield_now().await;
        }
        let fast = session.switch_chapter(3).await;
        source.gate.notify_one();
        let slow = slow.await.expect("slow switch task");

        assert!(matches!(fast, SwitchOutcome::Rendered(ref r) if r.chapter == 3));
        assert!(matches!(slow, SwitchOutcome::Stale { chapter: 2 }));
        match session.view() {
            ChapterView::Ready(rendered) => {
                assert_eq!(rendered.chapter, 3);
                assert!(rendered.html.contains(r#"data-word="mutter""#));
            }
            other => panic!("unexpected view {other:?}"),
        }
    }
}
