use crate::vocab::{VocabularyEntry, canonical_word};
use regex::{Regex, RegexBuilder};
use std::ops::Range;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum PatternError {
    #[error("vocabulary word is blank")]
    BlankWord,
    #[error("failed to compile matcher for {word:?}: {source}")]
    Regex {
        word: String,
        #[source]
        source: regex::Error,
    },
}

/// Letters block a match from extending into a longer word. Anything else (space,
/// hyphen, punctuation, digits, string edges) is a valid boundary.
pub fn is_word_letter(ch: char) -> bool {
    ch.is_alphabetic()
}

/// A vocabulary word turned into a literal, case-insensitive, letter-bounded matcher.
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    source_word: String,
    canonical: String,
    matcher: Regex,
    priority: usize,
    order: usize,
}

impl CompiledPattern {
    /// Word as written in the vocabulary source (trimmed).
    pub fn source_word(&self) -> &str {
        &self.source_word
    }

    /// Lowercase lookup key carried by every marker this pattern produces.
    pub fn canonical(&self) -> &str {
        &self.canonical
    }

    /// Character length of the word; longer words are applied first.
    pub fn priority(&self) -> usize {
        self.priority
    }

    /// Position of the entry in the vocabulary list, used to break priority ties.
    pub fn order(&self) -> usize {
        self.order
    }

    /// Byte ranges of every bounded occurrence in `haystack`, left to right,
    /// non-overlapping.
    pub fn find_iter<'p, 'h>(&'p self, haystack: &'h str) -> WordMatches<'p, 'h> {
        WordMatches {
            pattern: self,
            haystack,
            pos: 0,
        }
    }
}

pub struct WordMatches<'p, 'h> {
    pattern: &'p CompiledPattern,
    haystack: &'h str,
    pos: usize,
}

impl Iterator for WordMatches<'_, '_> {
    type Item = Range<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.pos <= self.haystack.len() {
            let found = self.pattern.matcher.find_at(self.haystack, self.pos)?;
            if is_bounded(self.haystack, found.start(), found.end()) {
                self.pos = found.end();
                return Some(found.range());
            }
            // Rejected hit: resume one character later so overlapping candidates
            // ("aa" inside "baaa") still get a chance.
            let step = self.haystack[found.start()..]
                .chars()
                .next()
                .map(char::len_utf8)
                .unwrap_or(1);
            self.pos = found.start() + step;
        }
        None
    }
}

fn is_bounded(haystack: &str, start: usize, end: usize) -> bool {
    let before = haystack[..start].chars().next_back();
    let after = haystack[end..].chars().next();
    !before.is_some_and(is_word_letter) && !after.is_some_and(is_word_letter)
}

/// Compiles one entry. Metacharacters in the word are escaped, so the word is always
/// matched literally; inner whitespace runs match any whitespace run so a phrase
/// survives a line wrap.
pub fn compile(entry: &VocabularyEntry, order: usize) -> Result<CompiledPattern, PatternError> {
    let word = entry.word.trim();
    if word.is_empty() {
        return Err(PatternError::BlankWord);
    }
    let literal = word
        .split_whitespace()
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(r"\s+");
    let matcher = RegexBuilder::new(&literal)
        .case_insensitive(true)
        .unicode(true)
        .build()
        .map_err(|source| PatternError::Regex {
            word: word.to_string(),
            source,
        })?;
    Ok(CompiledPattern {
        source_word: word.to_string(),
        canonical: canonical_word(word),
        matcher,
        priority: word.chars().count(),
        order,
    })
}

/// Compiles a whole vocabulary list and returns the patterns longest-first, ties kept in
/// list order. Entries that fail to compile are logged and skipped.
pub fn compile_all<'a, I>(entries: I) -> Vec<CompiledPattern>
where
    I: IntoIterator<Item = &'a VocabularyEntry>,
{
    let mut patterns: Vec<CompiledPattern> = entries
        .into_iter()
        .enumerate()
        .filter_map(|(order, entry)| match compile(entry, order) {
            Ok(pattern) => Some(pattern),
            Err(err) => {
                warn!(error = %err, word = %entry.word, "skipping vocabulary entry");
                None
            }
        })
        .collect();
    patterns.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then_with(|| a.order.cmp(&b.order))
    });
    patterns
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(word: &str) -> CompiledPattern {
        compile(&VocabularyEntry::new(word, "", "", 1), 0).expect("compiles")
    }

    fn hits<'h>(p: &CompiledPattern, text: &'h str) -> Vec<&'h str> {
        p.find_iter(text).map(|r| &text[r]).collect()
    }

    #[test]
    fn rejects_match_inside_longer_word() {
        let mutter = pattern("Mutter");
        assert!(hits(&mutter, "Muttersprache").is_empty());
        assert_eq!(hits(&mutter, "Mutter ist da"), vec!["Mutter"]);
    }

    #[test]
    fn umlaut_and_eszett_count_as_letters() {
        let vater = pattern("Vater");
        assert!(hits(&vater, "Großvater").is_empty());
        assert!(hits(&vater, "Väter und Vaterß").is_empty());
        assert!(hits(&pattern("bar"), "ébar").is_empty());
    }

    #[test]
    fn accepts_hyphen_punctuation_and_edges() {
        let haus = pattern("Haus");
        assert_eq!(hits(&haus, "Haus-Tür, das HAUS. (haus)"), vec!["Haus", "HAUS", "haus"]);
    }

    #[test]
    fn preserves_matched_casing() {
        let p = pattern("straße");
        assert_eq!(hits(&p, "Die STRASSE und die Straße"), vec!["Straße"]);
    }

    #[test]
    fn metacharacters_are_literal() {
        let p = pattern("a.b");
        assert!(hits(&p, "axb").is_empty());
        assert_eq!(hits(&p, "x a.b y"), vec!["a.b"]);
        let star = pattern("(ja)*");
        assert_eq!(hits(&star, "so (ja)* eben"), vec!["(ja)*"]);
    }

    #[test]
    fn retries_after_rejected_candidate() {
        let p = pattern("aa");
        assert_eq!(hits(&p, "baa aa"), vec!["aa"]);
    }

    #[test]
    fn phrase_matches_across_line_break() {
        let p = pattern("zu Hause");
        assert_eq!(hits(&p, "war zu\nHause."), vec!["zu\nHause"]);
    }

    #[test]
    fn blank_word_is_rejected() {
        let err = compile(&VocabularyEntry::new("   ", "", "", 1), 0).unwrap_err();
        assert!(matches!(err, PatternError::BlankWord));
    }

    #[test]
    fn compile_all_orders_longest_first_with_stable_ties() {
        let entries = vec![
            VocabularyEntry::new("Vater", "", "", 1),
            VocabularyEntry::new("Großvater", "", "", 1),
            VocabularyEntry::new("Mutti", "", "", 1),
            VocabularyEntry::new("", "", "", 1),
        ];
        let patterns = compile_all(&entries);
        let order: Vec<_> = patterns.iter().map(|p| p.source_word()).collect();
        assert_eq!(order, vec!["Großvater", "Vater", "Mutti"]);
        assert_eq!(patterns[0].priority(), 9);
        assert_eq!(patterns[0].canonical(), "großvater");
    }
}
