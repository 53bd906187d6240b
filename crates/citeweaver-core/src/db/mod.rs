//! Lookup sources that enrich citations from external bibliographic services.

pub mod arxiv;
pub mod mock;
pub mod opencitations;
pub mod searxng;
pub mod semantic_scholar;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

pub use crate::rate_limit::LookupError;
use crate::Citation;

pub const SEMANTIC_SCHOLAR: &str = "Semantic Scholar";
pub const OPENCITATIONS: &str = "OpenCitations";
pub const ARXIV: &str = "arXiv";
pub const WEB_SEARCH: &str = "Web Search";

/// What a source is asked about one citation.
///
/// `key` is the citation's [`lookup_key`](Citation::lookup_key); sources echo
/// it back in [`ExternalRecord::matched_key`] so answers are re-associated
/// by key equality, never by position.
#[derive(Debug, Clone, PartialEq)]
pub struct LookupQuery {
    pub key: String,
    pub doi: Option<String>,
    pub backup_id: Option<String>,
    pub title: Option<String>,
    pub authors: Vec<String>,
    pub year: Option<i32>,
}

impl LookupQuery {
    /// Build the query for a citation, or `None` when it has neither an
    /// identifier nor a title to search by.
    pub fn for_citation(citation: &Citation) -> Option<Self> {
        let key = citation.lookup_key()?;
        Some(Self {
            key,
            doi: citation.doi_str().map(String::from),
            backup_id: citation.backup_id_str().map(String::from),
            title: Some(citation.title_str())
                .filter(|t| !t.is_empty())
                .map(String::from),
            authors: citation.authors.clone(),
            year: citation.year,
        })
    }

    pub fn matches_key(&self, key: &str) -> bool {
        self.key.eq_ignore_ascii_case(key.trim())
    }
}

/// One source's answer for one query: the fields it knows, to be merged
/// into the citation whose query carried `matched_key`.
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalRecord {
    pub source: String,
    pub matched_key: String,
    pub patch: Citation,
}

/// A bibliographic service the enrichment cascade can consult.
pub trait LookupSource: Send + Sync {
    /// Canonical source name, also the rate limiter key.
    fn name(&self) -> &str;

    /// Whether this source runs locally or self-hosted (no rate limiting).
    fn is_local(&self) -> bool {
        false
    }

    /// Look up every query in one call. Returns zero or more records, each
    /// tagged with the key of the query it answers.
    fn lookup<'a>(
        &'a self,
        queries: &'a [LookupQuery],
        client: &'a reqwest::Client,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<ExternalRecord>, LookupError>> + Send + 'a>>;
}
