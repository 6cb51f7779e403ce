use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::ops::Range;

pub const PARAGRAPH_OPEN: &str = "<p>";
pub const PARAGRAPH_CLOSE: &str = "</p>";

static BLANK_LINE_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n\s*\n").expect("valid paragraph break regex"));
// Tags and character references (`&nbsp;`, `&#39;`) are both opaque to matching.
static TAG_SHAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<[^>]*>|&[A-Za-z0-9#]+;").expect("valid tag regex"));

/// A contiguous run of either markup (a tag or a character reference) or the text
/// between them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Markup(String),
    Plain(String),
}

impl Segment {
    pub fn as_str(&self) -> &str {
        match self {
            Segment::Markup(raw) | Segment::Plain(raw) => raw,
        }
    }

    pub fn is_markup(&self) -> bool {
        matches!(self, Segment::Markup(_))
    }
}

/// Turns blank-line separated prose into `<p>…</p><p>…</p>`. Text that already carries
/// the outer paragraph wrapper only has its inner blank-line runs split, so a second
/// pass over wrapped output returns it unchanged.
pub fn wrap_paragraphs(text: &str) -> String {
    let normalized = text.replace("\r\n", "\n");
    let trimmed = normalized.trim();
    let body = BLANK_LINE_RUN.replace_all(trimmed, |caps: &Captures| match caps.get(0) {
        Some(run) if separates_paragraphs(trimmed, run.range()) => "\n".to_string(),
        _ => format!("{PARAGRAPH_CLOSE}{PARAGRAPH_OPEN}"),
    });
    if is_paragraph_wrapped(trimmed) {
        return body.into_owned();
    }
    format!("{PARAGRAPH_OPEN}{body}{PARAGRAPH_CLOSE}")
}

fn is_paragraph_wrapped(text: &str) -> bool {
    text.starts_with(PARAGRAPH_OPEN) && text.ends_with(PARAGRAPH_CLOSE)
}

// A blank run already sitting between `</p>` and `<p>` needs no new boundary.
fn separates_paragraphs(text: &str, run: Range<usize>) -> bool {
    text[..run.start].ends_with(PARAGRAPH_CLOSE) && text[run.end..].starts_with(PARAGRAPH_OPEN)
}

/// Lexical split on anything shaped like `<...>` or `&name;`. The result always alternates
/// Plain, Markup, Plain, …, starting and ending with a (possibly empty) Plain segment,
/// so concatenating the segments reproduces the input exactly.
pub fn split_markup(input: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut cursor = 0;
    for tag in TAG_SHAPE.find_iter(input) {
        segments.push(Segment::Plain(input[cursor..tag.start()].to_string()));
        segments.push(Segment::Markup(tag.as_str().to_string()));
        cursor = tag.end();
    }
    segments.push(Segment::Plain(input[cursor..].to_string()));
    segments
}

/// Paragraph wrapping followed by the tag split.
pub fn tokenize(text: &str) -> Vec<Segment> {
    split_markup(&wrap_paragraphs(text))
}

pub fn join(segments: &[Segment]) -> String {
    let capacity = segments.iter().map(|s| s.as_str().len()).sum();
    segments
        .iter()
        .fold(String::with_capacity(capacity), |mut out, segment| {
            out.push_str(segment.as_str());
            out
        })
}
