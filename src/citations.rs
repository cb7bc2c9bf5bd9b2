//! Analysis text processing: citation markers, section blocks, word counts.
//!
//! Everything here is a pure function of `(analysis, references)`; there is
//! no separate citation store.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::Reference;

static CITATION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[(\d+)\]").expect("citation regex"));
static SECTION_BREAK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n\n+").expect("section regex"));
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("tag regex"));
static CAPS_HEADING_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[A-Z][A-Z\s]+(?:\s+(?:and|&|\+)\s+[A-Z\s]+)*$").expect("heading regex")
});

/// Section titles the drafting agent uses for its report outline.
pub const KNOWN_SECTION_TITLES: &[&str] = &[
    "Introduction",
    "Current State and Challenges",
    "Key Technologies and Methods",
    "Implementation and Best Practices",
    "Economic and Security Impact",
    "Future Perspectives",
    "Conclusion",
];

// ---------------------------------------------------------------------------
// References
// ---------------------------------------------------------------------------

pub fn reference_is_valid(reference: &Reference) -> bool {
    reference.is_valid()
}

/// The "N sources" figure shown next to an analysis.
pub fn valid_reference_count(references: &[Reference]) -> usize {
    references.iter().filter(|r| reference_is_valid(r)).count()
}

// ---------------------------------------------------------------------------
// Citation markers
// ---------------------------------------------------------------------------

/// A piece of analysis text after citation resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment<'a> {
    /// Literal text, including markers whose index is out of range.
    Text(&'a str),
    /// A `[N]` marker with `1 <= N <= references.len()`; `index` is `N - 1`.
    Citation { marker: &'a str, index: usize },
}

/// Split `analysis` into literal text and in-range citation markers.
///
/// Adjacent literal pieces are merged, so an out-of-range marker ends up
/// inside the surrounding text segment.
pub fn link_citations<'a>(analysis: &'a str, references: &[Reference]) -> Vec<Segment<'a>> {
    let mut segments = Vec::new();
    let mut text_start = 0;

    for caps in CITATION_RE.captures_iter(analysis) {
        let (Some(whole), Some(digits)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let Some(index) = resolve_marker(digits.as_str(), references.len()) else {
            continue;
        };
        if whole.start() > text_start {
            segments.push(Segment::Text(&analysis[text_start..whole.start()]));
        }
        segments.push(Segment::Citation {
            marker: whole.as_str(),
            index,
        });
        text_start = whole.end();
    }

    if text_start < analysis.len() {
        segments.push(Segment::Text(&analysis[text_start..]));
    }
    segments
}

/// Zero-based reference index for the digits of a marker, if in range.
fn resolve_marker(digits: &str, len: usize) -> Option<usize> {
    let n: usize = digits.parse().ok()?;
    if n >= 1 && n <= len {
        Some(n - 1)
    } else {
        None
    }
}

/// Reference indices cited in `analysis`, in order of appearance.
pub fn cited_indices(analysis: &str, references: &[Reference]) -> Vec<usize> {
    link_citations(analysis, references)
        .into_iter()
        .filter_map(|s| match s {
            Segment::Citation { index, .. } => Some(index),
            Segment::Text(_) => None,
        })
        .collect()
}

/// The link a citation opens, or `None` when the reference has no usable url.
pub fn citation_link(references: &[Reference], index: usize) -> Option<&str> {
    references.get(index).and_then(Reference::link)
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block<'a> {
    Heading(&'a str),
    Paragraph(&'a str),
}

/// Split analysis text on blank lines into headings and paragraphs.
pub fn split_sections(text: &str) -> Vec<Block<'_>> {
    SECTION_BREAK_RE
        .split(text)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            if is_heading(s) {
                Block::Heading(s)
            } else {
                Block::Paragraph(s)
            }
        })
        .collect()
}

/// All-caps lines and the drafting agent's outline titles count as headings.
pub fn is_heading(section: &str) -> bool {
    CAPS_HEADING_RE.is_match(section)
        || KNOWN_SECTION_TITLES
            .iter()
            .any(|title| section.starts_with(title))
}

// ---------------------------------------------------------------------------
// Text helpers
// ---------------------------------------------------------------------------

/// Words in `analysis` once markup tags are stripped.
pub fn word_count(analysis: &str) -> usize {
    TAG_RE.replace_all(analysis, "").split_whitespace().count()
}

/// Cut `text` to `max_chars` characters, appending `...` when cut.
pub fn truncate_text(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}...", &text[..byte_idx]),
        None => text.to_string(),
    }
}
