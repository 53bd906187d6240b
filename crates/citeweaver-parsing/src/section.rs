use citeweaver_core::TextModel;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::ParsingError;

/// Keywords that mark a references heading (case-insensitive substring match).
pub const REFERENCE_KEYWORDS: [&str; 3] = ["references", "bibliography", "citations"];

/// A heading found in the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heading {
    pub text: String,
    /// 1 for `#` / `===`, 2 for `##` / `---`, and so on.
    pub rank: u8,
    /// Byte offset of the start of the heading's first line.
    pub offset: usize,
    /// Byte offset just past the heading's last line (the underline for
    /// underline-style headings), where its content starts.
    pub content_start: usize,
}

/// The references section located in a document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocatedSection {
    pub headings: Vec<Heading>,
    /// The chosen references heading, if one was found.
    pub heading: Option<String>,
    /// Text between the chosen heading and the next heading. Empty when no
    /// heading was found.
    pub content: String,
}

static ATX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^ {0,3}(#{1,6})(?:[ \t]+(.*?))?(?:[ \t]+#+)?[ \t]*$").unwrap());
static SETEXT_H1_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^ {0,3}=+[ \t]*$").unwrap());
static SETEXT_H2_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^ {0,3}-+[ \t]*$").unwrap());
static FENCE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^ {0,3}(```|~~~)").unwrap());

/// Split text into lines with their byte ranges; `end` includes the newline.
fn lines_with_offsets(text: &str) -> Vec<(usize, usize, &str)> {
    let mut out = Vec::new();
    let mut start = 0;
    for piece in text.split_inclusive('\n') {
        let end = start + piece.len();
        let line = piece.trim_end_matches(['\n', '\r']);
        out.push((start, end, line));
        start = end;
    }
    out
}

/// Extract `#`-prefixed and underlined headings, sorted by offset.
///
/// Lines inside fenced code blocks are ignored. An underline only counts
/// when the line above it is non-blank text that is not itself a heading.
pub fn find_headings(text: &str) -> Vec<Heading> {
    let lines = lines_with_offsets(text);
    let mut headings = Vec::new();
    let mut in_fence = false;
    let mut prev_is_heading = false;

    for (idx, &(start, end, line)) in lines.iter().enumerate() {
        if FENCE_RE.is_match(line) {
            in_fence = !in_fence;
            prev_is_heading = false;
            continue;
        }
        if in_fence {
            continue;
        }

        if let Some(caps) = ATX_RE.captures(line) {
            let title = caps.get(2).map(|m| m.as_str().trim()).unwrap_or("");
            if !title.is_empty() {
                headings.push(Heading {
                    text: title.to_string(),
                    rank: caps[1].len() as u8,
                    offset: start,
                    content_start: end,
                });
                prev_is_heading = true;
                continue;
            }
        }

        if idx > 0 && !prev_is_heading {
            let (prev_start, _, prev) = lines[idx - 1];
            let rank = if SETEXT_H1_RE.is_match(line) {
                Some(1)
            } else if SETEXT_H2_RE.is_match(line) {
                Some(2)
            } else {
                None
            };
            let prev_text = prev.trim();
            if let Some(rank) = rank
                && !prev_text.is_empty()
                && !SETEXT_H1_RE.is_match(prev)
                && !SETEXT_H2_RE.is_match(prev)
                && !FENCE_RE.is_match(prev)
            {
                headings.push(Heading {
                    text: prev_text.to_string(),
                    rank,
                    offset: prev_start,
                    content_start: end,
                });
                prev_is_heading = true;
                continue;
            }
        }

        prev_is_heading = false;
    }

    headings.sort_by_key(|h| h.offset);
    headings
}

/// The first heading whose text contains a reference keyword.
pub fn match_keyword_heading(headings: &[Heading]) -> Option<&Heading> {
    headings.iter().find(|h| {
        let lower = h.text.to_lowercase();
        REFERENCE_KEYWORDS.iter().any(|k| lower.contains(k))
    })
}

/// Pick the references heading: keyword heuristic first, then the
/// classifier with the full heading list. A classifier failure is an error.
pub async fn choose_references_heading(
    headings: &[Heading],
    model: &dyn TextModel,
) -> Result<Option<String>, ParsingError> {
    if headings.is_empty() {
        return Ok(None);
    }
    if let Some(h) = match_keyword_heading(headings) {
        tracing::debug!(heading = %h.text, "references heading matched by keyword");
        return Ok(Some(h.text.clone()));
    }

    let candidates: Vec<String> = headings.iter().map(|h| h.text.clone()).collect();
    let choice = model
        .choose_heading(&candidates)
        .await
        .map_err(ParsingError::HeadingClassification)?;
    tracing::debug!(heading = %choice.heading, "references heading chosen by classifier");
    Ok(Some(choice.heading.trim().to_string()))
}

/// The text from just after the first heading whose text equals `chosen` to
/// the next heading of any rank, or to the end of the document.
pub fn extract_section<'t>(text: &'t str, headings: &[Heading], chosen: &str) -> &'t str {
    let chosen = chosen.trim();
    let Some(pos) = headings.iter().position(|h| h.text == chosen) else {
        return "";
    };
    let start = headings[pos].content_start.min(text.len());
    let end = headings
        .get(pos + 1)
        .map(|next| next.offset)
        .unwrap_or(text.len())
        .max(start);
    &text[start..end]
}

/// Locate the references section of a document.
pub async fn locate_references(
    text: &str,
    model: &dyn TextModel,
) -> Result<LocatedSection, ParsingError> {
    let headings = find_headings(text);
    let heading = choose_references_heading(&headings, model).await?;

    let content = match heading.as_deref() {
        Some(chosen) => {
            let section = extract_section(text, &headings, chosen);
            if section.is_empty() && !headings.iter().any(|h| h.text == chosen) {
                tracing::warn!(heading = %chosen, "chosen heading is not in the document");
            }
            section.to_string()
        }
        None => {
            tracing::info!("no headings found, references section is empty");
            String::new()
        }
    };

    Ok(LocatedSection {
        headings,
        heading,
        content,
    })
}
