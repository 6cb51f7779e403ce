use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// One vocabulary record as published per chapter.
///
/// Files produced by older tooling name the definitions `definition_german` /
/// `definition_english`; both spellings deserialize into the same fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VocabularyEntry {
    pub word: String,
    #[serde(alias = "definition_german", default)]
    pub definition_native: String,
    #[serde(alias = "definition_english", default)]
    pub definition_foreign: String,
    #[serde(default)]
    pub chapter: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_snippet: Option<String>,
}

impl VocabularyEntry {
    pub fn new(
        word: impl Into<String>,
        definition_native: impl Into<String>,
        definition_foreign: impl Into<String>,
        chapter: u32,
    ) -> Self {
        Self {
            word: word.into(),
            definition_native: definition_native.into(),
            definition_foreign: definition_foreign.into(),
            chapter,
            context_snippet: None,
        }
    }

    /// Lowercase lookup key.
    pub fn canonical(&self) -> String {
        canonical_word(&self.word)
    }
}

pub fn canonical_word(word: &str) -> String {
    word.trim().to_lowercase()
}

/// The active chapter's vocabulary: ordered, at most one entry per canonical word.
#[derive(Debug, Clone, Default)]
pub struct Vocabulary {
    chapter: u32,
    entries: Vec<VocabularyEntry>,
    index: HashMap<String, usize>,
}

impl Vocabulary {
    /// Builds the list in source order. A later record for an already-seen word replaces
    /// the earlier one in place; blank words are dropped.
    pub fn new<I>(chapter: u32, records: I) -> Self
    where
        I: IntoIterator<Item = VocabularyEntry>,
    {
        let mut entries: Vec<VocabularyEntry> = Vec::new();
        let mut index = HashMap::new();
        for mut record in records {
            let key = record.canonical();
            if key.is_empty() {
                debug!(chapter, "skipping vocabulary record with blank word");
                continue;
            }
            if record.chapter == 0 {
                record.chapter = chapter;
            }
            match index.get(&key) {
                Some(&slot) => entries[slot] = record,
                None => {
                    index.insert(key, entries.len());
                    entries.push(record);
                }
            }
        }
        Self {
            chapter,
            entries,
            index,
        }
    }

    pub fn from_json(chapter: u32, raw: &str) -> Result<Self, serde_json::Error> {
        let records: Vec<VocabularyEntry> = serde_json::from_str(raw)?;
        Ok(Self::new(chapter, records))
    }

    pub fn chapter(&self) -> u32 {
        self.chapter
    }

    /// Case-insensitive lookup.
    pub fn get(&self, word: &str) -> Option<&VocabularyEntry> {
        self.index
            .get(&canonical_word(word))
            .map(|&slot| &self.entries[slot])
    }

    pub fn contains(&self, word: &str) -> bool {
        self.get(word).is_some()
    }

    pub fn entries(&self) -> &[VocabularyEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Merges freshly approved records into an existing chapter list. Existing records are
/// laid down first, then incoming ones; a same-word incoming record overrides the
/// existing one but keeps its position.
pub fn merge_vocabulary(
    existing: Vec<VocabularyEntry>,
    incoming: Vec<VocabularyEntry>,
) -> Vec<VocabularyEntry> {
    let mut merged: Vec<VocabularyEntry> = Vec::with_capacity(existing.len() + incoming.len());
    let mut index: HashMap<String, usize> = HashMap::new();
    for record in existing.into_iter().chain(incoming) {
        let key = record.canonical();
        match index.get(&key) {
            Some(&slot) => merged[slot] = record,
            None => {
                index.insert(key, merged.len());
                merged.push(record);
            }
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn later_record_wins_and_keeps_position() {
        let vocab = Vocabulary::new(
            3,
            vec![
                VocabularyEntry::new("Haus", "Gebäude", "house", 3),
                VocabularyEntry::new("Tür", "Eingang", "door", 3),
                VocabularyEntry::new("haus", "Wohnung", "home", 3),
            ],
        );
        assert_eq!(vocab.len(), 2);
        assert_eq!(vocab.entries()[0].definition_foreign, "home");
        assert_eq!(vocab.entries()[1].word, "Tür");
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let vocab = Vocabulary::new(
            1,
            vec![VocabularyEntry::new("Großvater", "Opa", "grandfather", 1)],
        );
        assert!(vocab.contains("GROßVATER"));
        assert_eq!(
            vocab.get("großvater").map(|e| e.definition_foreign.as_str()),
            Some("grandfather")
        );
        assert!(vocab.get("vater").is_none());
    }

    #[test]
    fn parses_legacy_field_names_and_fills_chapter() {
        let raw = r#"[
            {"word": "Mutter", "definition_german": "weiblicher Elternteil", "definition_english": "mother"},
            {"word": "  ", "definition_german": "leer", "definition_english": "blank"}
        ]"#;
        let vocab = Vocabulary::from_json(7, raw).expect("valid json");
        assert_eq!(vocab.len(), 1);
        let entry = &vocab.entries()[0];
        assert_eq!(entry.definition_native, "weiblicher Elternteil");
        assert_eq!(entry.definition_foreign, "mother");
        assert_eq!(entry.chapter, 7);
    }

    #[test]
    fn serializes_neutral_field_names() {
        let entry = VocabularyEntry::new("Vater", "Papa", "father", 2);
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["definition_native"], "Papa");
        assert_eq!(json["definition_foreign"], "father");
        assert!(json.get("context_snippet").is_none());
    }

    #[test]
    fn merge_overrides_same_word_entries() {
        let existing = vec![
            VocabularyEntry::new("haus", "alt", "old", 1),
            VocabularyEntry::new("baum", "Pflanze", "tree", 1),
        ];
        let incoming = vec![
            VocabularyEntry::new("Haus", "neu", "new", 1),
            VocabularyEntry::new("weg", "Pfad", "path", 1),
        ];
        let merged = merge_vocabulary(existing, incoming);
        let words: Vec<_> = merged.iter().map(|e| e.word.as_str()).collect();
        assert_eq!(words, vec!["Haus", "baum", "weg"]);
        assert_eq!(merged[0].definition_native, "neu");
    }
}
