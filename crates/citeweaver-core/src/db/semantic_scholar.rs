use super::{ExternalRecord, LookupError, LookupQuery, LookupSource, SEMANTIC_SCHOLAR};
use crate::Citation;
use crate::identifiers::{arxiv_backup_id, normalize_doi, parse_arxiv_backup_id, strip_arxiv_version};
use crate::matching::titles_match;
use crate::rate_limit::check_rate_limit_response;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

const API_BASE: &str = "https://api.semanticscholar.org/graph/v1";
const FIELDS: &str =
    "title,authors,year,venue,journal,externalIds,abstract,citationCount,url";

/// Semantic Scholar Academic Graph.
///
/// Queries with an identifier go out together in one `paper/batch` request;
/// title-only queries use `paper/search/match`, one request each.
pub struct SemanticScholar {
    pub api_key: Option<String>,
    pub base_url: String,
}

impl SemanticScholar {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            api_key,
            base_url: API_BASE.to_string(),
        }
    }

    fn request(&self, req: reqwest::RequestBuilder, timeout: Duration) -> reqwest::RequestBuilder {
        let req = req
            .header("User-Agent", "citeweaver/0.1")
            .timeout(timeout);
        match self.api_key {
            Some(ref key) => req.header("x-api-key", key),
            None => req,
        }
    }

    async fn batch(
        &self,
        queries: &[&LookupQuery],
        client: &reqwest::Client,
        timeout: Duration,
    ) -> Result<Vec<ExternalRecord>, LookupError> {
        let ids: Vec<String> = queries.iter().filter_map(|q| paper_id(q)).collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/paper/batch?fields={}", self.base_url.trim_end_matches('/'), FIELDS);
        let req = self.request(client.post(&url), timeout);
        let resp = req.json(&serde_json::json!({ "ids": ids })).send().await?;

        check_rate_limit_response(&resp)?;
        if !resp.status().is_success() {
            return Err(LookupError::Other(format!("HTTP {}", resp.status())));
        }

        let data: Value = resp.json().await?;
        Ok(match_batch_response(&data, queries))
    }

    async fn search_match(
        &self,
        query: &LookupQuery,
        client: &reqwest::Client,
        timeout: Duration,
    ) -> Result<Option<ExternalRecord>, LookupError> {
        let Some(title) = query.title.as_deref() else {
            return Ok(None);
        };

        let url = format!(
            "{}/paper/search/match?query={}&fields={}",
            self.base_url.trim_end_matches('/'),
            urlencoding::encode(title),
            FIELDS
        );
        let resp = self.request(client.get(&url), timeout).send().await?;

        check_rate_limit_response(&resp)?;
        // No match is reported as 404
        if resp.status().as_u16() == 404 {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(LookupError::Other(format!("HTTP {}", resp.status())));
        }

        let data: Value = resp.json().await?;
        let best = data["data"]
            .as_array()
            .and_then(|arr| arr.first())
            .filter(|paper| {
                paper["title"]
                    .as_str()
                    .is_some_and(|found| titles_match(title, found))
            });

        Ok(best.map(|paper| ExternalRecord {
            source: SEMANTIC_SCHOLAR.to_string(),
            matched_key: query.key.clone(),
            patch: paper_to_citation(paper),
        }))
    }
}

/// The `paper/batch` id for a query: `DOI:` first, then `ARXIV:`.
fn paper_id(query: &LookupQuery) -> Option<String> {
    if let Some(ref doi) = query.doi {
        return Some(format!("DOI:{}", normalize_doi(doi)));
    }
    query
        .backup_id
        .as_deref()
        .and_then(parse_arxiv_backup_id)
        .map(|id| format!("ARXIV:{}", strip_arxiv_version(id)))
}

fn has_paper_id(query: &LookupQuery) -> bool {
    paper_id(query).is_some()
}

/// Pair each returned paper with the queries whose key it carries.
///
/// The batch endpoint answers positionally with `null` for misses, but the
/// pairing here only trusts the paper's own `externalIds`.
fn match_batch_response(data: &Value, queries: &[&LookupQuery]) -> Vec<ExternalRecord> {
    let mut records = Vec::new();
    let Some(papers) = data.as_array() else {
        return records;
    };

    for paper in papers.iter().filter(|p| p.is_object()) {
        let keys = paper_keys(paper);
        for query in queries {
            if keys.iter().any(|k| query.matches_key(k)) || answers_arxiv(query, &keys) {
                records.push(ExternalRecord {
                    source: SEMANTIC_SCHOLAR.to_string(),
                    matched_key: query.key.clone(),
                    patch: paper_to_citation(paper),
                });
            }
        }
    }
    records
}

/// arXiv keys compare without their version suffix.
fn answers_arxiv(query: &LookupQuery, keys: &[String]) -> bool {
    let Some(id) = query.backup_id.as_deref().and_then(parse_arxiv_backup_id) else {
        return false;
    };
    if query.doi.is_some() {
        return false;
    }
    let wanted = arxiv_backup_id(strip_arxiv_version(id));
    keys.iter().any(|k| k.eq_ignore_ascii_case(&wanted))
}

/// Every lookup key a returned paper can answer for.
fn paper_keys(paper: &Value) -> Vec<String> {
    let ids = &paper["externalIds"];
    let mut keys = Vec::new();
    if let Some(doi) = ids["DOI"].as_str() {
        keys.push(format!("doi:{}", normalize_doi(doi)));
    }
    if let Some(arxiv) = ids["ArXiv"].as_str() {
        keys.push(arxiv_backup_id(strip_arxiv_version(arxiv)));
    }
    keys
}

fn paper_to_citation(paper: &Value) -> Citation {
    let text = |v: &Value| v.as_str().map(str::trim).filter(|s| !s.is_empty()).map(String::from);

    let authors = paper["authors"]
        .as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(|a| a["name"].as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default();

    let journal = &paper["journal"];
    let ids = &paper["externalIds"];

    Citation {
        title: text(&paper["title"]),
        authors,
        year: paper["year"].as_i64().and_then(|y| i32::try_from(y).ok()),
        journal: text(&journal["name"]),
        venue: text(&paper["venue"]),
        volume: text(&journal["volume"]),
        pages: text(&journal["pages"]).map(|p| p.replace(' ', "")),
        abstract_text: text(&paper["abstract"]),
        citation_count: paper["citationCount"].as_u64(),
        url: text(&paper["url"]),
        doi: text(&ids["DOI"]),
        backup_id: text(&ids["ArXiv"]).map(|id| arxiv_backup_id(&id)),
        ..Default::default()
    }
}

impl LookupSource for SemanticScholar {
    fn name(&self) -> &str {
        SEMANTIC_SCHOLAR
    }

    fn lookup<'a>(
        &'a self,
        queries: &'a [LookupQuery],
        client: &'a reqwest::Client,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<ExternalRecord>, LookupError>> + Send + 'a>> {
        Box::pin(async move {
            let (with_id, title_only): (Vec<&LookupQuery>, Vec<&LookupQuery>) =
                queries.iter().partition(|q| has_paper_id(q));

            let mut records = self.batch(&with_id, client, timeout).await?;

            for query in title_only {
                match self.search_match(query, client, timeout).await {
                    Ok(Some(record)) => records.push(record),
                    Ok(None) => {}
                    // Surface rate limiting so the caller can back off
                    Err(e @ LookupError::RateLimited { .. }) => return Err(e),
                    Err(e) => {
                        tracing::debug!(key = %query.key, error = %e, "title match failed");
                    }
                }
            }

            Ok(records)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(key: &str, doi: Option<&str>, backup_id: Option<&str>) -> LookupQuery {
        LookupQuery {
            key: key.into(),
            doi: doi.map(String::from),
            backup_id: backup_id.map(String::from),
            title: None,
            authors: vec![],
            year: None,
        }
    }

    fn sample_paper() -> Value {
        serde_json::json!({
            "title": "Attention Is All You Need",
            "authors": [{"name": "Ashish Vaswani"}, {"name": "Noam Shazeer"}],
            "year": 2017,
            "venue": "Neural Information Processing Systems",
            "journal": {"name": "ArXiv", "volume": "abs/1706.03762", "pages": "5998 - 6008"},
            "externalIds": {"DOI": "10.48550/arXiv.1706.03762", "ArXiv": "1706.03762"},
            "abstract": null,
            "citationCount": 120000,
            "url": "https://www.semanticscholar.org/paper/204e3073"
        })
    }

    #[test]
    fn converts_paper_fields() {
        let c = paper_to_citation(&sample_paper());
        assert_eq!(c.title.as_deref(), Some("Attention Is All You Need"));
        assert_eq!(c.authors, vec!["Ashish Vaswani", "Noam Shazeer"]);
        assert_eq!(c.year, Some(2017));
        assert_eq!(c.journal.as_deref(), Some("ArXiv"));
        assert_eq!(c.pages.as_deref(), Some("5998-6008"));
        assert_eq!(c.citation_count, Some(120000));
        assert_eq!(c.backup_id.as_deref(), Some("arxiv:1706.03762"));
        assert!(c.abstract_text.is_none());
    }

    #[test]
    fn out_of_range_year_is_dropped() {
        let mut paper = sample_paper();
        paper["year"] = serde_json::json!(i64::from(i32::MAX) + 1);
        assert_eq!(paper_to_citation(&paper).year, None);
    }

    #[test]
    fn batch_ids_prefer_doi() {
        let q = query("doi:10.1/x", Some("10.1/X"), Some("arxiv:2101.00001"));
        assert_eq!(paper_id(&q).as_deref(), Some("DOI:10.1/x"));
        let q = query("arxiv:2101.00001v2", None, Some("arxiv:2101.00001v2"));
        assert_eq!(paper_id(&q).as_deref(), Some("ARXIV:2101.00001"));
        let q = query("pmid:1", None, Some("pmid:1"));
        assert!(paper_id(&q).is_none());
    }

    #[test]
    fn batch_matches_by_identifier_not_position() {
        let a = query("doi:10.1/a", Some("10.1/a"), None);
        let b = query("arxiv:1706.03762v5", None, Some("arxiv:1706.03762v5"));
        // Response order differs from request order and carries a miss
        let data = serde_json::json!([
            sample_paper(),
            null,
            {"title": "Paper A", "externalIds": {"DOI": "10.1/A"}}
        ]);
        let records = match_batch_response(&data, &[&a, &b]);
        assert_eq!(records.len(), 2);
        let for_a = records.iter().find(|r| r.matched_key == "doi:10.1/a").unwrap();
        assert_eq!(for_a.patch.title.as_deref(), Some("Paper A"));
        let for_b = records
            .iter()
            .find(|r| r.matched_key == "arxiv:1706.03762v5")
            .unwrap();
        assert_eq!(for_b.patch.title.as_deref(), Some("Attention Is All You Need"));
    }

    #[test]
    fn batch_ignores_unrelated_papers() {
        let a = query("doi:10.1/a", Some("10.1/a"), None);
        let data = serde_json::json!([{"title": "Other", "externalIds": {"DOI": "10.9/zzz"}}]);
        assert!(match_batch_response(&data, &[&a]).is_empty());
    }
}
