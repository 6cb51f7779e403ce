use thiserror::Error;

/// Failure taxonomy for the reader. Every variant is converted into user-visible state at
/// the boundary where it occurs; none of them is allowed to stop the server or CLI loop.
#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("chapter {chapter} is unavailable: {reason}")]
    DataUnavailable { chapter: u32, reason: String },

    #[error("cannot annotate: {0}")]
    PreconditionFailed(Precondition),

    #[error("selection could not be saved: {0}")]
    PersistenceFailure(String),

    #[error("submission rejected: {0}")]
    SubmissionRejected(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    EmptyText,
    EmptyVocabulary,
}

impl std::fmt::Display for Precondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Precondition::EmptyText => write!(f, "chapter text is empty"),
            Precondition::EmptyVocabulary => write!(f, "vocabulary list is empty"),
        }
    }
}

impl ReaderError {
    pub fn unavailable(chapter: u32, reason: impl Into<String>) -> Self {
        ReaderError::DataUnavailable {
            chapter,
            reason: reason.into(),
        }
    }

    /// Localized inline message shown in place of the text area.
    pub fn inline_message(&self) -> String {
        match self {
            ReaderError::DataUnavailable { chapter, .. } => {
                format!("Fehler beim Laden von Kapitel {chapter}.")
            }
            ReaderError::PreconditionFailed(Precondition::EmptyText) => {
                "Dieses Kapitel enthält keinen Text.".to_string()
            }
            ReaderError::PreconditionFailed(Precondition::EmptyVocabulary) => {
                "Für dieses Kapitel sind keine Vokabeln vorhanden.".to_string()
            }
            ReaderError::PersistenceFailure(_) => {
                "Dein Set konnte nicht gespeichert werden.".to_string()
            }
            ReaderError::SubmissionRejected(reason) => reason.clone(),
        }
    }
}
