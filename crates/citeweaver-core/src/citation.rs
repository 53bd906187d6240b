use serde::{Deserialize, Serialize};

use crate::identifiers::{normalize_doi, parse_arxiv_backup_id};
use crate::matching::normalize_title;

/// A bibliographic record for either the processed document itself or one of
/// the works it cites.
///
/// Every content field starts unset and is filled in as extraction and
/// enrichment succeed. Merges only ever fill gaps; see [`Citation::fill_gaps`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Author names in citation order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub journal: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venue: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pages: Option<String>,
    #[serde(rename = "abstract", default, skip_serializing_if = "Option::is_none")]
    pub abstract_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citation_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,
    /// Alternate identifier with an explicit source prefix, e.g. `arxiv:2101.00001`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_id: Option<String>,
    /// Style-rendered string. Written only by the formatter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formatted: Option<String>,
    #[serde(default)]
    pub is_document_citation: bool,
}

fn is_set(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|s| !s.trim().is_empty())
}

/// Copy `patch` into `slot` when `slot` is unset and `patch` is set.
fn fill(slot: &mut Option<String>, patch: &Option<String>) -> bool {
    if !is_set(slot) && is_set(patch) {
        *slot = patch.as_ref().map(|s| s.trim().to_string());
        true
    } else {
        false
    }
}

fn fill_copy<T: Copy>(slot: &mut Option<T>, patch: Option<T>) -> bool {
    if slot.is_none() && patch.is_some() {
        *slot = patch;
        true
    } else {
        false
    }
}

impl Citation {
    /// A record holding just a title, handy for tests and dry runs.
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    pub fn title_str(&self) -> &str {
        self.title.as_deref().map(str::trim).unwrap_or("")
    }

    pub fn doi_str(&self) -> Option<&str> {
        self.doi.as_deref().map(str::trim).filter(|d| !d.is_empty())
    }

    pub fn backup_id_str(&self) -> Option<&str> {
        self.backup_id
            .as_deref()
            .map(str::trim)
            .filter(|b| !b.is_empty())
    }

    /// The arXiv id carried in `backup_id`, if it has the `arxiv:` prefix.
    pub fn arxiv_id(&self) -> Option<&str> {
        self.backup_id_str().and_then(parse_arxiv_backup_id)
    }

    /// True when either `doi` or `backup_id` holds a non-empty string.
    pub fn has_identifier(&self) -> bool {
        self.doi_str().is_some() || self.backup_id_str().is_some()
    }

    /// Names of the bibliographic content fields that are still unset.
    ///
    /// Identifiers are tracked by [`has_identifier`](Self::has_identifier);
    /// `formatted` and `is_document_citation` are output fields and never
    /// count as missing.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if !is_set(&self.title) {
            missing.push("title");
        }
        if self.authors.iter().all(|a| a.trim().is_empty()) {
            missing.push("authors");
        }
        if self.year.is_none() {
            missing.push("year");
        }
        for (name, value) in [
            ("journal", &self.journal),
            ("venue", &self.venue),
            ("volume", &self.volume),
            ("issue", &self.issue),
            ("pages", &self.pages),
            ("abstract", &self.abstract_text),
        ] {
            if !is_set(value) {
                missing.push(name);
            }
        }
        if self.citation_count.is_none() {
            missing.push("citation_count");
        }
        if !is_set(&self.url) {
            missing.push("url");
        }
        missing
    }

    pub fn has_missing_fields(&self) -> bool {
        !self.missing_fields().is_empty()
    }

    /// Fill every unset field of `self` from `patch`. Fields that already hold
    /// a value are never replaced. Returns the names of the fields written.
    pub fn fill_gaps(&mut self, patch: &Citation) -> Vec<&'static str> {
        let mut filled = Vec::new();

        if fill(&mut self.title, &patch.title) {
            filled.push("title");
        }
        let patch_authors: Vec<String> = patch
            .authors
            .iter()
            .map(|a| a.trim())
            .filter(|a| !a.is_empty())
            .map(String::from)
            .collect();
        if self.authors.iter().all(|a| a.trim().is_empty()) && !patch_authors.is_empty() {
            self.authors = patch_authors;
            filled.push("authors");
        }
        if fill_copy(&mut self.year, patch.year) {
            filled.push("year");
        }
        if fill(&mut self.journal, &patch.journal) {
            filled.push("journal");
        }
        if fill(&mut self.venue, &patch.venue) {
            filled.push("venue");
        }
        if fill(&mut self.volume, &patch.volume) {
            filled.push("volume");
        }
        if fill(&mut self.issue, &patch.issue) {
            filled.push("issue");
        }
        if fill(&mut self.pages, &patch.pages) {
            filled.push("pages");
        }
        if fill(&mut self.abstract_text, &patch.abstract_text) {
            filled.push("abstract");
        }
        if fill_copy(&mut self.citation_count, patch.citation_count) {
            filled.push("citation_count");
        }
        if fill(&mut self.url, &patch.url) {
            filled.push("url");
        }
        if fill(&mut self.doi, &patch.doi) {
            filled.push("doi");
        }
        if fill(&mut self.backup_id, &patch.backup_id) {
            filled.push("backup_id");
        }

        filled
    }

    /// The key used to ask a source about this record and to match its
    /// answers back: `doi:<doi>` when a DOI is known, else the raw
    /// `backup_id`, else `title:<normalized title>`.
    pub fn lookup_key(&self) -> Option<String> {
        if let Some(doi) = self.doi_str() {
            return Some(format!("doi:{}", normalize_doi(doi)));
        }
        if let Some(backup) = self.backup_id_str() {
            return Some(backup.to_string());
        }
        let normalized = normalize_title(self.title_str());
        if normalized.is_empty() {
            None
        } else {
            Some(format!("title:{normalized}"))
        }
    }
}
