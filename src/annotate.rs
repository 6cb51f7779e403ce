//! Wraps every bounded vocabulary occurrence in an interactive marker.
//!
//! Only Plain segments are scanned. Hits are claimed longest pattern first; a hit whose
//! byte range overlaps an already claimed range in the same segment is dropped, so a
//! shorter word can never split or nest inside a longer one. Text that already sits
//! inside a marker from an earlier pass is passed through untouched, which makes the
//! whole transform idempotent. The bodies of `<script>` and `<style>` elements are
//! never scanned either, as long as the element is actually closed.

use crate::error::{Precondition, ReaderError};
use crate::markup::{self, Segment};
use crate::pattern::{CompiledPattern, compile_all};
use crate::vocab::Vocabulary;
use std::ops::Range;

pub const MARKER_CLASS: &str = "vocab-word";
const MARKER_OPEN_PREFIX: &str = r#"<span class="vocab-word""#;
const SPAN_OPEN_PREFIX: &str = "<span";
const SPAN_CLOSE: &str = "</span>";
const RAW_TEXT_ELEMENTS: [&str; 2] = ["script", "style"];

/// Escapes the five HTML-significant characters for use in content or a quoted
/// attribute.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

/// `<span class="vocab-word" data-word="{canonical}">{display}</span>`, both payloads
/// escaped.
pub fn marker(canonical: &str, display: &str) -> String {
    format!(
        r#"{MARKER_OPEN_PREFIX} data-word="{}">{}{SPAN_CLOSE}"#,
        escape_html(canonical),
        escape_html(display)
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotated {
    pub html: String,
    pub marker_count: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Annotator {
    patterns: Vec<CompiledPattern>,
}

struct Hit {
    range: Range<usize>,
    pattern: usize,
}

impl Annotator {
    /// Patterns are re-sorted longest first (stable on list order) regardless of the
    /// order they arrive in.
    pub fn new(mut patterns: Vec<CompiledPattern>) -> Self {
        patterns.sort_by(|a, b| {
            b.priority()
                .cmp(&a.priority())
                .then_with(|| a.order().cmp(&b.order()))
        });
        Self { patterns }
    }

    pub fn from_vocabulary(vocabulary: &Vocabulary) -> Self {
        Self {
            patterns: compile_all(vocabulary.entries()),
        }
    }

    pub fn patterns(&self) -> &[CompiledPattern] {
        &self.patterns
    }

    /// Tokenizes and annotates a chapter text. Blank text is a precondition failure; an
    /// empty pattern list only tokenizes.
    pub fn annotate(&self, text: &str) -> Result<Annotated, ReaderError> {
        if text.trim().is_empty() {
            return Err(ReaderError::PreconditionFailed(Precondition::EmptyText));
        }
        Ok(self.annotate_segments(&markup::tokenize(text)))
    }

    pub fn annotate_segments(&self, segments: &[Segment]) -> Annotated {
        let mut html = String::new();
        let mut marker_count = 0;
        // Span nesting depth while inside a marker from an earlier pass; 0 = outside.
        let mut marker_depth = 0usize;
        let mut raw_text: Option<&'static str> = None;
        for (index, segment) in segments.iter().enumerate() {
            match segment {
                Segment::Markup(tag) => {
                    if let Some(element) = raw_text {
                        if closes_element(tag, element) {
                            raw_text = None;
                        }
                    } else if let Some(element) = opens_raw_text_element(tag) {
                        // A stray opener with no close tag is treated as ordinary markup.
                        if is_closed_later(&segments[index + 1..], element) {
                            raw_text = Some(element);
                        }
                    } else if marker_depth > 0 {
                        if tag.starts_with(SPAN_OPEN_PREFIX) {
                            marker_depth += 1;
                        } else if tag == SPAN_CLOSE {
                            marker_depth -= 1;
                        }
                    } else if tag.starts_with(MARKER_OPEN_PREFIX) {
                        marker_depth = 1;
                    }
                    html.push_str(tag);
                }
                Segment::Plain(text)
                    if marker_depth > 0 || raw_text.is_some() || self.patterns.is_empty() =>
                {
                    html.push_str(text);
                }
                Segment::Plain(text) => {
                    marker_count += self.annotate_plain(text, &mut html);
                }
            }
        }
        Annotated { html, marker_count }
    }

    fn annotate_plain(&self, text: &str, out: &mut String) -> usize {
        let mut claimed: Vec<Hit> = Vec::new();
        for (index, pattern) in self.patterns.iter().enumerate() {
            for range in pattern.find_iter(text) {
                if claimed.iter().any(|hit| overlaps(&hit.range, &range)) {
                    continue;
                }
                claimed.push(Hit {
                    range,
                    pattern: index,
                });
            }
        }
        claimed.sort_by_key(|hit| hit.range.start);

        let mut cursor = 0;
        for hit in &claimed {
            out.push_str(&text[cursor..hit.range.start]);
            let canonical = self.patterns[hit.pattern].canonical();
            out.push_str(&marker(canonical, &text[hit.range.clone()]));
            cursor = hit.range.end;
        }
        out.push_str(&text[cursor..]);
        claimed.len()
    }
}

fn tag_name(tag: &str) -> String {
    tag.trim_start_matches('<')
        .trim_start_matches('/')
        .chars()
        .take_while(|ch| ch.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase()
}

fn opens_raw_text_element(tag: &str) -> Option<&'static str> {
    if tag.starts_with("</") || tag.ends_with("/>") {
        return None;
    }
    let name = tag_name(tag);
    RAW_TEXT_ELEMENTS
        .iter()
        .copied()
        .find(|element| *element == name)
}

fn closes_element(tag: &str, element: &str) -> bool {
    tag.starts_with("</") && tag_name(tag) == element
}

fn is_closed_later(rest: &[Segment], element: &str) -> bool {
    rest.iter()
        .any(|segment| matches!(segment, Segment::Markup(tag) if closes_element(tag, element)))
}

fn overlaps(a: &Range<usize>, b: &Range<usize>) -> bool {
    a.start < b.end && b.start < a.end
}

/// One-shot helper: compile `vocabulary` and annotate `text`.
pub fn annotate(text: &str, vocabulary: &Vocabulary) -> Result<Annotated, ReaderError> {
    Annotator::from_vocabulary(vocabulary).annotate(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vocab::VocabularyEntry;
    use proptest::prelude::*;

    fn vocab(words: &[&str]) -> Vocabulary {
        Vocabulary::new(
            1,
            words
                .iter()
                .map(|w| VocabularyEntry::new(*w, "de", "en", 1)),
        )
    }

    fn render(text: &str, words: &[&str]) -> Annotated {
        annotate(text, &vocab(words)).expect("non-empty text")
    }

    #[test]
    fn wraps_whole_words_only() {
        let out = render("Muttersprache", &["Mutter"]);
        assert_eq!(out.marker_count, 0);
        assert_eq!(out.html, "<p>Muttersprache</p>");

        let out = render("Mutter ist da", &["Mutter"]);
        assert_eq!(out.marker_count, 1);
        assert_eq!(
            out.html,
            r#"<p><span class="vocab-word" data-word="mutter">Mutter</span> ist da</p>"#
        );
    }

    #[test]
    fn longest_word_wins() {
        let out = render("Mein Großvater kam.", &["Vater", "Großvater"]);
        assert_eq!(out.marker_count, 1);
        assert_eq!(
            out.html,
            r#"<p>Mein <span class="vocab-word" data-word="großvater">Großvater</span> kam.</p>"#
        );
    }

    #[test]
    fn overlapping_shorter_word_is_not_nested() {
        let out = render("Das Haus Tür steht. Ein Haus.", &["Haus", "Haus Tür"]);
        assert_eq!(out.marker_count, 2);
        assert!(out.html.contains(r#"data-word="haus tür">Haus Tür</span>"#));
        assert!(out.html.contains(r#"Ein <span class="vocab-word" data-word="haus">Haus</span>."#));
        assert!(!out.html.contains("<span class=\"vocab-word\" data-word=\"haus tür\"><span"));
    }

    #[test]
    fn display_keeps_source_casing_key_is_canonical() {
        let out = render("VATER und vater", &["Vater"]);
        assert!(out.html.contains(r#"data-word="vater">VATER</span>"#));
        assert!(out.html.contains(r#"data-word="vater">vater</span>"#));
        assert_eq!(out.marker_count, 2);
    }

    #[test]
    fn never_matches_inside_tags() {
        let text = r#"Vorher <script src="script.js">var script;</script> ein script hier"#;
        let out = render(text, &["script"]);
        assert!(out.html.contains(r#"<script src="script.js">var script;</script>"#));
        assert_eq!(out.marker_count, 1);
        assert!(out.html.contains(r#"ein <span class="vocab-word" data-word="script">script</span> hier"#));
        assert!(!out.html.contains(r#"<span class="vocab-word" data-word="script"><script"#));
    }

    #[test]
    fn unclosed_script_does_not_stop_annotation() {
        let out = render("Vater <script> x\n\nDer Vater kam.", &["Vater"]);
        assert_eq!(out.marker_count, 2);
        assert!(out.html.contains(
            r#"<p>Der <span class="vocab-word" data-word="vater">Vater</span> kam.</p>"#
        ));

        let out = render("<style>Vater</style> Vater <STYLE>", &["Vater"]);
        assert_eq!(out.marker_count, 1);
        assert!(out.html.starts_with("<p><style>Vater</style> <span"));
    }

    #[test]
    fn entity_references_stay_intact() {
        let out = render("Ein&nbsp;Haus und AT&amp;T", &["nbsp", "amp", "Haus"]);
        assert_eq!(out.marker_count, 1);
        assert_eq!(
            out.html,
            r#"<p>Ein&nbsp;<span class="vocab-word" data-word="haus">Haus</span> und AT&amp;T</p>"#
        );
    }

    #[test]
    fn payloads_are_escaped() {
        let out = render("x AT&T y and l'eau", &["AT&T", "l'eau"]);
        assert!(out.html.contains(r#"data-word="at&amp;t">AT&amp;T</span>"#));
        assert!(out.html.contains(r#"data-word="l&#39;eau">l&#39;eau</span>"#));
        assert_eq!(escape_html(r#"&<>"'"#), "&amp;&lt;&gt;&quot;&#39;");
    }

    #[test]
    fn annotation_is_idempotent() {
        let words = ["Vater", "Großvater", "Haus", "script", "AT&T", "zu Hause"];
        let texts = [
            "Mein Großvater kam.\n\nDer Vater war zu\nHause im Haus.",
            "Haus-Haus haus HAUS",
            r#"<em>Vater</em> <script>script</script> x AT&T y"#,
            "Kein Treffer hier.",
        ];
        let annotator = Annotator::from_vocabulary(&vocab(&words));
        for text in texts {
            let once = annotator.annotate(text).unwrap();
            let twice = annotator.annotate(&once.html).unwrap();
            assert_eq!(once.html, twice.html, "second pass changed {text:?}");
            assert_eq!(twice.marker_count, 0);
        }
    }

    #[test]
    fn empty_text_is_precondition_failure() {
        let err = annotate("  \n ", &vocab(&["Haus"])).unwrap_err();
        assert!(matches!(
            err,
            ReaderError::PreconditionFailed(Precondition::EmptyText)
        ));
    }

    #[test]
    fn zero_vocabulary_only_tokenizes() {
        let out = render("Eins\n\nZwei", &[]);
        assert_eq!(out.html, "<p>Eins</p><p>Zwei</p>");
        assert_eq!(out.marker_count, 0);
    }

    #[test]
    fn every_occurrence_gets_exactly_one_marker() {
        let out = render("Haus, Haus; Häuser. (Haus)", &["Haus"]);
        assert_eq!(out.marker_count, 3);
        assert_eq!(out.html.matches(MARKER_CLASS).count(), 3);
        assert!(out.html.contains("Häuser"));
    }

    const PROPERTY_WORDS: [&str; 6] = ["Haus", "Großvater", "Vater", "Tür", "zu Hause", "süß"];

    fn chapter_text() -> impl Strategy<Value = String> {
        let piece = prop_oneof![
            Just("Haus".to_string()),
            Just("Großvater".to_string()),
            Just("vater".to_string()),
            Just("TÜR".to_string()),
            Just("zu Hause".to_string()),
            Just("süß".to_string()),
            Just(" ".to_string()),
            Just("\n\n".to_string()),
            Just("&".to_string()),
            Just("&amp;".to_string()),
            Just(">".to_string()),
            Just("<b>".to_string()),
            Just("</b>".to_string()),
            Just(".".to_string()),
            "[a-zäöüß]{1,6}",
        ];
        prop::collection::vec(piece, 1..40).prop_map(|pieces| pieces.concat())
    }

    fn markers_are_bounded(html: &str) -> bool {
        html.match_indices(MARKER_OPEN_PREFIX).all(|(start, _)| {
            let before = html[..start].chars().next_back();
            let after = html[start..]
                .find(SPAN_CLOSE)
                .and_then(|close| html[start + close + SPAN_CLOSE.len()..].chars().next());
            !before.is_some_and(char::is_alphabetic) && !after.is_some_and(char::is_alphabetic)
        })
    }

    proptest! {
        #[test]
        fn second_pass_changes_nothing(text in chapter_text()) {
            prop_assume!(!text.trim().is_empty());
            let annotator = Annotator::from_vocabulary(&vocab(&PROPERTY_WORDS));
            let once = annotator.annotate(&text).unwrap();
            let twice = annotator.annotate(&once.html).unwrap();
            prop_assert_eq!(&twice.html, &once.html);
            prop_assert_eq!(twice.marker_count, 0);
        }

        #[test]
        fn markers_never_touch_letters(text in chapter_text()) {
            prop_assume!(!text.trim().is_empty());
            let out = render(&text, &PROPERTY_WORDS);
            prop_assert_eq!(out.html.matches(MARKER_OPEN_PREFIX).count(), out.marker_count);
            prop_assert!(markers_are_bounded(&out.html), "letter next to a marker: {}", out.html);
        }
    }

    #[test]
    fn new_sorts_patterns_longest_first() {
        use crate::pattern::compile;
        let short = compile(&VocabularyEntry::new("Vater", "", "", 1), 0).unwrap();
        let long = compile(&VocabularyEntry::new("Großvater", "", "", 1), 1).unwrap();
        let annotator = Annotator::new(vec![short, long]);
        assert_eq!(annotator.patterns()[0].source_word(), "Großvater");
    }
}
