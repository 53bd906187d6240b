//! OpenCitations Meta: an identifier-keyed bibliographic registry.

use super::{ExternalRecord, LookupError, LookupQuery, LookupSource, OPENCITATIONS};
use crate::Citation;
use crate::identifiers::normalize_doi;
use crate::rate_limit::check_rate_limit_response;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

const API_BASE: &str = "https://api.opencitations.net/meta/v1";

/// Identifier schemes the Meta API accepts as keys.
const SUPPORTED_SCHEMES: &[&str] = &["doi", "pmid", "pmcid", "isbn", "issn", "omid", "openalex"];

static BRACKETED_IDS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*\[[^\]]*\]").unwrap());

pub struct OpenCitations {
    pub access_token: Option<String>,
    pub base_url: String,
}

impl OpenCitations {
    pub fn new(access_token: Option<String>) -> Self {
        Self {
            access_token,
            base_url: API_BASE.to_string(),
        }
    }
}

/// One row of the `/metadata` response. All fields are strings; multi-valued
/// fields are packed (`id` space-separated, `author` semicolon-separated).
#[derive(Debug, Default, Deserialize)]
pub struct MetaRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub pub_date: String,
    #[serde(default)]
    pub venue: String,
    #[serde(default)]
    pub volume: String,
    #[serde(default)]
    pub issue: String,
    #[serde(default)]
    pub page: String,
    #[serde(default, rename = "type")]
    pub kind: String,
}

impl MetaRecord {
    /// Prefixed identifiers of this record, DOIs normalized, e.g.
    /// `["doi:10.1/x", "omid:br/0601"]`.
    pub fn keys(&self) -> Vec<String> {
        self.id
            .split_whitespace()
            .map(|id| match id.split_once(':') {
                Some((scheme, value)) if scheme.eq_ignore_ascii_case("doi") => {
                    format!("doi:{}", normalize_doi(value))
                }
                _ => id.to_string(),
            })
            .collect()
    }

    pub fn to_citation(&self) -> Citation {
        let text = |s: &str| Some(s.trim()).filter(|s| !s.is_empty()).map(String::from);
        let venue = text(&BRACKETED_IDS_RE.replace_all(&self.venue, ""));
        let is_journal = self.kind.contains("journal");

        Citation {
            title: text(&self.title),
            authors: self
                .author
                .split(';')
                .filter_map(|a| parse_author(a))
                .collect(),
            year: self.pub_date.get(..4).and_then(|y| y.parse().ok()),
            journal: if is_journal { venue.clone() } else { None },
            venue,
            volume: text(&self.volume),
            issue: text(&self.issue),
            pages: text(&self.page),
            doi: self
                .id
                .split_whitespace()
                .find_map(|id| id.strip_prefix("doi:"))
                .map(String::from),
            ..Default::default()
        }
    }
}

/// `"Peroni, Silvio [orcid:0000-0003-0530-4305 omid:ra/0601]"` -> `"Silvio Peroni"`.
fn parse_author(raw: &str) -> Option<String> {
    let name = BRACKETED_IDS_RE.replace_all(raw, "");
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    match name.split_once(',') {
        Some((family, given)) if !given.trim().is_empty() => {
            Some(format!("{} {}", given.trim(), family.trim()))
        }
        Some((family, _)) => Some(family.trim().to_string()),
        None => Some(name.to_string()),
    }
}

fn is_supported(key: &str) -> bool {
    key.split_once(':')
        .is_some_and(|(scheme, value)| {
            !value.is_empty()
                && SUPPORTED_SCHEMES
                    .iter()
                    .any(|s| s.eq_ignore_ascii_case(scheme))
        })
}

/// Re-associate response rows with queries by identifier.
fn match_records(rows: &[MetaRecord], queries: &[&LookupQuery]) -> Vec<ExternalRecord> {
    let mut records = Vec::new();
    for row in rows {
        let keys = row.keys();
        for query in queries {
            if keys.iter().any(|k| query.matches_key(k)) {
                records.push(ExternalRecord {
                    source: OPENCITATIONS.to_string(),
                    matched_key: query.key.clone(),
                    patch: row.to_citation(),
                });
            }
        }
    }
    records
}

impl LookupSource for OpenCitations {
    fn name(&self) -> &str {
        OPENCITATIONS
    }

    fn lookup<'a>(
        &'a self,
        queries: &'a [LookupQuery],
        client: &'a reqwest::Client,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<ExternalRecord>, LookupError>> + Send + 'a>> {
        Box::pin(async move {
            let usable: Vec<&LookupQuery> = queries.iter().filter(|q| is_supported(&q.key)).collect();
            if usable.is_empty() {
                tracing::debug!("no OpenCitations-compatible identifiers to look up");
                return Ok(Vec::new());
            }

            let ids: Vec<&str> = usable.iter().map(|q| q.key.as_str()).collect();
            let url = format!(
                "{}/metadata/{}",
                self.base_url.trim_end_matches('/'),
                ids.join("__")
            );

            let mut req = client
                .get(&url)
                .header("User-Agent", "citeweaver/0.1")
                .timeout(timeout);
            if let Some(ref token) = self.access_token {
                req = req.header("authorization", token);
            }

            let resp = req.send().await?;
            check_rate_limit_response(&resp)?;
            if !resp.status().is_success() {
                return Err(LookupError::Other(format!("HTTP {}", resp.status())));
            }

            let rows: Vec<MetaRecord> = resp
                .json()
                .await
                .map_err(|e| LookupError::Other(format!("invalid Meta response: {e}")))?;

            Ok(match_records(&rows, &usable))
        })
    }
}
