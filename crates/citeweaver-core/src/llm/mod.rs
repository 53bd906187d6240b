//! Language-model collaborator used to clean reference blocks, classify
//! headings, and turn citation text into structured fields.

pub mod mock;
pub mod openai;

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use openai::OpenAiCompatible;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("model endpoint returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("model returned an empty response")]
    EmptyResponse,
    #[error("model returned invalid JSON: {0}")]
    InvalidJson(String),
    #[error("language model not configured: {0}")]
    NotConfigured(String),
    #[error("{0}")]
    Other(String),
}

/// The classifier's answer when asked which heading starts the references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadingChoice {
    pub heading: String,
}

/// Boxed future returned by [`TextModel`] methods.
pub type ModelFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, LlmError>> + Send + 'a>>;

pub trait TextModel: Send + Sync {
    fn name(&self) -> &str;

    /// Reformat a references block into exactly one citation per line.
    fn normalize_references<'a>(&'a self, raw: &'a str) -> ModelFuture<'a, String>;

    /// Pick the heading that starts the references section.
    fn choose_heading<'a>(&'a self, candidates: &'a [String]) -> ModelFuture<'a, HeadingChoice>;

    /// Parse citation text into structured JSON.
    ///
    /// With `batched` the expected shape is `{"citations": [...]}`, otherwise
    /// a single citation object. `Ok(None)` means the model answered but no
    /// parseable structure could be recovered from its reply.
    fn parse_citations<'a>(
        &'a self,
        text: &'a str,
        batched: bool,
    ) -> ModelFuture<'a, Option<serde_json::Value>>;
}

/// Recover a JSON value from a model reply that may wrap it in a fenced code
/// block or surround it with prose.
pub fn extract_json(reply: &str) -> Option<serde_json::Value> {
    let trimmed = reply.trim();
    if let Ok(v) = serde_json::from_str(trimmed) {
        return Some(v);
    }

    let unfenced = strip_code_fence(trimmed);
    if let Ok(v) = serde_json::from_str(unfenced) {
        return Some(v);
    }

    let start = unfenced.find(['{', '['])?;
    let end = unfenced.rfind(['}', ']'])?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&unfenced[start..=end]).ok()
}

/// Remove a surrounding ``` fence (with optional language tag).
pub fn strip_code_fence(text: &str) -> &str {
    let t = text.trim();
    let Some(rest) = t.strip_prefix("```") else {
        return t;
    };
    let rest = match rest.find('\n') {
        Some(nl) => &rest[nl + 1..],
        None => rest,
    };
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_plain_json() {
        let v = extract_json(r#"{"title": "X"}"#).unwrap();
        assert_eq!(v["title"], "X");
    }

    #[test]
    fn extract_fenced_json() {
        let v = extract_json("```json\n{\"citations\": []}\n```").unwrap();
        assert!(v["citations"].is_array());
    }

    #[test]
    fn extract_json_with_prose() {
        let v = extract_json("Sure! Here it is: {\"year\": 2020} Hope that helps.").unwrap();
        assert_eq!(v["year"], 2020);
    }

    #[test]
    fn extract_garbage_is_none() {
        assert!(extract_json("I could not parse that citation.").is_none());
        assert!(extract_json("} nope {").is_none());
    }

    #[test]
    fn strip_fence_without_language() {
        assert_eq!(strip_code_fence("```\nline one\nline two\n```"), "line one\nline two");
        assert_eq!(strip_code_fence("no fence"), "no fence");
    }
}
