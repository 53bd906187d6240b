//! Web search through a self-hosted SearxNG instance.
//!
//! Used to discover identifiers and landing pages for citations the
//! bibliographic sources could not resolve. Results are only trusted when
//! their title matches the citation's title.

use super::{ExternalRecord, LookupError, LookupQuery, LookupSource, WEB_SEARCH};
use crate::Citation;
use crate::identifiers::{arxiv_backup_id, extract_arxiv_id, extract_doi, strip_arxiv_version};
use crate::matching::titles_match_lenient;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

pub struct Searxng {
    /// Base URL of the SearxNG instance (e.g. "http://localhost:8080").
    pub base_url: String,
}

impl Searxng {
    pub fn new(base_url: String) -> Self {
        Self { base_url }
    }
}

#[derive(Debug, serde::Deserialize)]
pub struct SearxngResponse {
    #[serde(default)]
    pub results: Vec<SearxngResult>,
}

#[derive(Debug, serde::Deserialize)]
pub struct SearxngResult {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub content: String,
}

/// Pull what the search results say about `title`: a DOI if any matching
/// result carries one, otherwise an arXiv id, plus the first matching URL.
pub fn patch_from_results(title: &str, results: &[SearxngResult]) -> Option<Citation> {
    let matching: Vec<&SearxngResult> = results
        .iter()
        .filter(|r| titles_match_lenient(title, &r.title))
        .collect();
    if matching.is_empty() {
        return None;
    }

    let doi = matching
        .iter()
        .find_map(|r| extract_doi(&r.url).or_else(|| extract_doi(&r.content)));

    let backup_id = if doi.is_none() {
        matching.iter().find_map(|r| {
            extract_arxiv_id(&r.url)
                .or_else(|| extract_arxiv_id(&r.content))
                .map(|id| arxiv_backup_id(strip_arxiv_version(&id)))
        })
    } else {
        None
    };

    let url = matching
        .iter()
        .map(|r| r.url.trim())
        .find(|u| u.starts_with("http"))
        .map(String::from);

    Some(Citation {
        doi,
        backup_id,
        url,
        ..Default::default()
    })
}

impl LookupSource for Searxng {
    fn name(&self) -> &str {
        WEB_SEARCH
    }

    fn is_local(&self) -> bool {
        true
    }

    fn lookup<'a>(
        &'a self,
        queries: &'a [LookupQuery],
        client: &'a reqwest::Client,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<ExternalRecord>, LookupError>> + Send + 'a>> {
        Box::pin(async move {
            let mut records = Vec::new();

            for query in queries {
                let Some(title) = query.title.as_deref() else {
                    continue;
                };
                let url = format!(
                    "{}/search?q={}&format=json",
                    self.base_url.trim_end_matches('/'),
                    urlencoding::encode(&format!("\"{}\"", title))
                );

                // An unreachable or misbehaving instance counts as "nothing found"
                let resp = match client.get(&url).timeout(timeout).send().await {
                    Ok(r) if r.status().is_success() => r,
                    Ok(r) => {
                        tracing::debug!(status = %r.status(), "SearxNG returned an error status");
                        continue;
                    }
                    Err(e) => {
                        tracing::debug!(error = %e, "SearxNG not reachable");
                        continue;
                    }
                };
                let data: SearxngResponse = match resp.json().await {
                    Ok(d) => d,
                    Err(e) => {
                        tracing::debug!(error = %e, "unparseable SearxNG response");
                        continue;
                    }
                };

                if let Some(patch) = patch_from_results(title, &data.results) {
                    records.push(ExternalRecord {
                        source: WEB_SEARCH.to_string(),
                        matched_key: query.key.clone(),
                        patch,
                    });
                }
            }

            Ok(records)
        })
    }
}
