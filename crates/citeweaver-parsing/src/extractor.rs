//! Structured citation extraction: raw citation strings are sent to the
//! model in batches, each batch gets a bounded number of attempts, and every
//! returned item is validated on its own.

use citeweaver_core::identifiers::{arxiv_backup_id, extract_arxiv_id, extract_doi, is_arxiv_id};
use citeweaver_core::{Citation, Config, ProgressEvent, TextModel};
use serde::de::{self, Deserializer};
use serde::Deserialize;
use serde_json::Value;

/// Separator placed between citations of one batch.
pub const BATCH_SEPARATOR: &str = "\n\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractorConfig {
    /// Raw citations per model call.
    pub batch_size: usize,
    /// Attempts per batch, including the first.
    pub max_attempts: usize,
    /// Characters from the start of the document used for its own citation.
    pub document_head_chars: usize,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            batch_size: 1,
            max_attempts: 2,
            document_head_chars: 1000,
        }
    }
}

impl ExtractorConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            batch_size: config.batch_size.max(1),
            document_head_chars: config.document_head_chars,
            ..Self::default()
        }
    }
}

/// One citation as the model reports it, before validation.
///
/// Deserialization is lenient about shapes models commonly get wrong
/// (numeric strings, a single author as a string), but an item without a
/// title is rejected when converted.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CitationExtraction {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "string_or_list")]
    pub authors: Vec<String>,
    #[serde(default, deserialize_with = "lenient_year")]
    pub year: Option<i32>,
    #[serde(default)]
    pub journal: Option<String>,
    #[serde(default)]
    pub venue: Option<String>,
    #[serde(default, deserialize_with = "number_or_string")]
    pub volume: Option<String>,
    #[serde(default, deserialize_with = "number_or_string")]
    pub issue: Option<String>,
    #[serde(default, deserialize_with = "number_or_string")]
    pub pages: Option<String>,
    #[serde(default, rename = "abstract")]
    pub abstract_text: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub doi: Option<String>,
    #[serde(default)]
    pub arxiv_id: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

impl CitationExtraction {
    /// Validate and convert into a reference-level [`Citation`].
    pub fn into_citation(self) -> Result<Citation, String> {
        let title = non_empty(self.title).ok_or("missing title")?;
        let url = non_empty(self.url);

        let doi = non_empty(self.doi)
            .and_then(|d| {
                let found = extract_doi(&d);
                if found.is_none() {
                    tracing::debug!(doi = %d, "dropping doi that is not DOI-shaped");
                }
                found
            })
            .or_else(|| url.as_deref().and_then(extract_doi));

        let backup_id = non_empty(self.arxiv_id)
            .and_then(|id| {
                let bare = id
                    .trim_start_matches("arXiv:")
                    .trim_start_matches("arxiv:")
                    .trim()
                    .to_string();
                is_arxiv_id(&bare).then(|| arxiv_backup_id(&bare))
            })
            .or_else(|| {
                url.as_deref()
                    .and_then(extract_arxiv_id)
                    .map(|id| arxiv_backup_id(&id))
            });

        Ok(Citation {
            title: Some(title),
            authors: self
                .authors
                .into_iter()
                .map(|a| a.trim().to_string())
                .filter(|a| !a.is_empty())
                .collect(),
            year: self.year,
            journal: non_empty(self.journal),
            venue: non_empty(self.venue),
            volume: non_empty(self.volume),
            issue: non_empty(self.issue),
            pages: non_empty(self.pages),
            abstract_text: non_empty(self.abstract_text),
            url,
            doi,
            backup_id,
            ..Citation::default()
        })
    }
}

fn string_or_list<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
    match Option::<Value>::deserialize(d)? {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::String(s)) => Ok(s
            .split(';')
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .collect()),
        Some(Value::Array(items)) => items
            .into_iter()
            .filter(|v| !v.is_null())
            .map(|v| match v {
                Value::String(s) => Ok(s),
                other => Err(de::Error::custom(format!("author is not a string: {other}"))),
            })
            .collect(),
        Some(other) => Err(de::Error::custom(format!("invalid authors: {other}"))),
    }
}

fn lenient_year<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i32>, D::Error> {
    match Option::<Value>::deserialize(d)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => Ok(n.as_i64().and_then(|y| i32::try_from(y).ok())),
        // "2019", "2019a", "(2019)"; anything else such as "n.d." is unknown
        Some(Value::String(s)) => {
            let digits: String = s
                .chars()
                .skip_while(|c| !c.is_ascii_digit())
                .take_while(char::is_ascii_digit)
                .collect();
            Ok((digits.len() == 4).then(|| digits.parse().ok()).flatten())
        }
        Some(other) => Err(de::Error::custom(format!("invalid year: {other}"))),
    }
}

fn number_or_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    match Option::<Value>::deserialize(d)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(de::Error::custom(format!("expected string or number: {other}"))),
    }
}

/// Pull the list of item values out of a parser reply. `None` means the
/// reply does not have the expected shape and the attempt failed.
fn reply_items(reply: Value, batched: bool) -> Option<Vec<Value>> {
    match reply {
        Value::Object(mut map) if batched => match map.remove("citations") {
            Some(Value::Array(items)) => Some(items),
            _ => None,
        },
        Value::Object(map) => match map.get("citations") {
            Some(Value::Array(items)) if !map.contains_key("title") => Some(items.clone()),
            _ => Some(vec![Value::Object(map)]),
        },
        _ => None,
    }
}

/// Send `text` to the parser up to `max_attempts` times, returning the
/// items of the first well-formed reply.
async fn parse_with_retry(
    text: &str,
    batched: bool,
    model: &dyn TextModel,
    max_attempts: usize,
) -> Option<Vec<Value>> {
    for attempt in 1..=max_attempts.max(1) {
        match model.parse_citations(text, batched).await {
            Ok(Some(reply)) => match reply_items(reply, batched) {
                Some(items) => return Some(items),
                None => tracing::warn!(attempt, "parser reply is missing the citations list"),
            },
            Ok(None) => tracing::warn!(attempt, "parser reply could not be read as JSON"),
            Err(e) => tracing::warn!(attempt, error = %e, "parser call failed"),
        }
    }
    None
}

/// Validate and convert each item, dropping the ones that fail.
fn convert_items(items: Vec<Value>) -> Vec<Citation> {
    items
        .into_iter()
        .enumerate()
        .filter_map(|(i, item)| {
            let converted = serde_json::from_value::<CitationExtraction>(item)
                .map_err(|e| e.to_string())
                .and_then(CitationExtraction::into_citation);
            match converted {
                Ok(citation) => Some(citation),
                Err(e) => {
                    tracing::warn!(item = i, error = %e, "dropping citation that failed validation");
                    None
                }
            }
        })
        .collect()
}

/// Parse raw citation strings into structured citations, in order.
///
/// Strings are grouped into consecutive batches of `batch_size` joined by a
/// blank line. A batch whose attempts all fail is skipped and its citations
/// are lost; the remaining batches still run.
pub async fn extract_citations(
    raw: &[String],
    model: &dyn TextModel,
    config: &ExtractorConfig,
    progress: &(dyn Fn(ProgressEvent) + Send + Sync),
) -> Vec<Citation> {
    let batch_size = config.batch_size.max(1);
    let batched = batch_size > 1;
    let total = raw.len().div_ceil(batch_size);
    let mut citations = Vec::new();

    for (index, batch) in raw.chunks(batch_size).enumerate() {
        let text = batch.join(BATCH_SEPARATOR);
        match parse_with_retry(&text, batched, model, config.max_attempts).await {
            Some(items) => {
                let parsed = convert_items(items);
                tracing::debug!(batch = index, citations = parsed.len(), "batch parsed");
                progress(ProgressEvent::BatchParsed {
                    index,
                    total,
                    citations: parsed.len(),
                });
                citations.extend(parsed);
            }
            None => {
                tracing::warn!(
                    batch = index,
                    size = batch.len(),
                    attempts = config.max_attempts,
                    "skipping batch after failed attempts"
                );
                progress(ProgressEvent::BatchSkipped { index, total });
            }
        }
    }

    citations
}

/// The first `max_chars` characters of `text`.
fn head(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

/// Extract the citation of the document itself from its opening text.
///
/// Returns `None` when the head is blank or the parser cannot produce a
/// valid record.
pub async fn extract_document_citation(
    text: &str,
    model: &dyn TextModel,
    config: &ExtractorConfig,
) -> Option<Citation> {
    let head = head(text, config.document_head_chars);
    if head.trim().is_empty() {
        return None;
    }

    let Some(items) = parse_with_retry(head, false, model, config.max_attempts).await else {
        tracing::warn!("could not parse the document's own citation");
        return None;
    };
    let mut citation = convert_items(items).into_iter().next()?;
    citation.is_document_citation = true;
    Some(citation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn convert(v: Value) -> Result<Citation, String> {
        serde_json::from_value::<CitationExtraction>(v)
            .map_err(|e| e.to_string())
            .and_then(CitationExtraction::into_citation)
    }

    #[test]
    fn lenient_fields() {
        let c = convert(json!({
            "title": " Attention Is All You Need ",
            "authors": "Ashish Vaswani; Noam Shazeer",
            "year": "2017a",
            "volume": 30,
            "pages": "5998-6008",
            "arxiv_id": "arXiv:1706.03762"
        }))
        .unwrap();
        assert_eq!(c.title.as_deref(), Some("Attention Is All You Need"));
        assert_eq!(c.authors, vec!["Ashish Vaswani", "Noam Shazeer"]);
        assert_eq!(c.year, Some(2017));
        assert_eq!(c.volume.as_deref(), Some("30"));
        assert_eq!(c.backup_id.as_deref(), Some("arxiv:1706.03762"));
        assert!(!c.is_document_citation);
    }

    #[test]
    fn unknown_year_is_none() {
        let c = convert(json!({"title": "T", "year": "n.d."})).unwrap();
        assert_eq!(c.year, None);
    }

    #[test]
    fn missing_title_fails_validation() {
        assert!(convert(json!({"authors": ["A"]})).is_err());
        assert!(convert(json!({"title": "   "})).is_err());
    }

    #[test]
    fn wrong_types_fail_validation() {
        assert!(convert(json!({"title": "T", "year": {"value": 2020}})).is_err());
        assert!(convert(json!({"title": "T", "authors": [1, 2]})).is_err());
    }

    #[test]
    fn doi_recovered_from_url() {
        let c = convert(json!({
            "title": "T",
            "url": "https://doi.org/10.1145/3442188.3445922"
        }))
        .unwrap();
        assert_eq!(c.doi.as_deref(), Some("10.1145/3442188.3445922"));
    }

    #[test]
    fn placeholder_doi_is_dropped() {
        for placeholder in ["unknown", "N/A", "none", "Not available — n/a"] {
            let c = convert(json!({"title": "A Paper", "doi": placeholder})).unwrap();
            assert_eq!(c.doi, None, "{placeholder}");
            assert!(!c.has_identifier());
        }

        let c = convert(json!({
            "title": "A Paper",
            "doi": "n/a",
            "url": "https://doi.org/10.1000/xyz123"
        }))
        .unwrap();
        assert_eq!(c.doi.as_deref(), Some("10.1000/xyz123"));

        let c = convert(json!({"title": "A Paper", "doi": "DOI: 10.1000/xyz123."})).unwrap();
        assert_eq!(c.doi.as_deref(), Some("10.1000/xyz123"));
    }

    #[test]
    fn batched_reply_needs_citations_list() {
        assert!(reply_items(json!({"title": "T"}), true).is_none());
        assert!(reply_items(json!({"citations": "T"}), true).is_none());
        assert_eq!(reply_items(json!({"citations": []}), true), Some(vec![]));
        assert!(reply_items(json!([1, 2]), false).is_none());
        assert_eq!(reply_items(json!({"title": "T"}), false).map(|v| v.len()), Some(1));
    }

    #[test]
    fn head_respects_char_boundaries() {
        assert_eq!(head("héllo wörld", 5), "héllo");
        assert_eq!(head("short", 100), "short");
    }
}
