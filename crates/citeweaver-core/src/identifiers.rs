//! DOI and arXiv identifier extraction and normalization.

use once_cell::sync::Lazy;
use regex::Regex;

/// Prefix carried by arXiv ids stored in `Citation::backup_id`.
pub const ARXIV_PREFIX: &str = "arxiv:";

static DOI_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)\b(10\.\d{4,9}/[^\s"'<>\]\[{}|\\^`]+)"#).unwrap());

static ARXIV_NEW_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:arxiv(?:\.org/(?:abs|pdf)/|:\s*|\s+))(\d{4}\.\d{4,5}(?:v\d+)?)").unwrap()
});

static ARXIV_OLD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:arxiv(?:\.org/(?:abs|pdf)/|:\s*|\s+))([a-z\-]+(?:\.[A-Z]{2})?/\d{7}(?:v\d+)?)")
        .unwrap()
});

static BARE_ARXIV_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:\d{4}\.\d{4,5}|[a-z\-]+(?:\.[A-Z]{2})?/\d{7})(?:v\d+)?$").unwrap());

static VERSION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"v\d+$").unwrap());

/// Strip trailing punctuation and unbalanced closing brackets picked up from
/// surrounding prose.
fn clean_doi(doi: &str) -> &str {
    let mut doi = doi.trim_end_matches(['.', ',', ';', ':']);
    for (open, close) in [('(', ')'), ('[', ']'), ('{', '}')] {
        while doi.ends_with(close) && doi.matches(close).count() > doi.matches(open).count() {
            doi = doi[..doi.len() - 1].trim_end_matches(['.', ',', ';', ':']);
        }
    }
    doi
}

/// Find the first DOI in free text (bare, `doi:`-prefixed or inside a
/// doi.org URL).
pub fn extract_doi(text: &str) -> Option<String> {
    let decoded = text.replace("%2F", "/").replace("%2f", "/");
    DOI_RE
        .captures(&decoded)
        .map(|caps| clean_doi(&caps[1]).to_string())
        .filter(|d| d.contains('/'))
}

/// `s` without `prefix`, compared ASCII case-insensitively.
fn strip_prefix_ci<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix).then(|| &s[prefix.len()..])
}

/// Canonical lowercase form of a DOI for comparisons: URL and `doi:`
/// prefixes removed.
pub fn normalize_doi(doi: &str) -> String {
    let mut d = doi.trim();
    for prefix in [
        "https://doi.org/",
        "http://doi.org/",
        "https://dx.doi.org/",
        "http://dx.doi.org/",
        "doi.org/",
    ] {
        if let Some(rest) = strip_prefix_ci(d, prefix) {
            d = rest;
            break;
        }
    }
    if let Some(rest) = strip_prefix_ci(d, "doi:") {
        d = rest.trim_start();
    }
    clean_doi(d).to_lowercase()
}

/// Find the first arXiv identifier in free text. Requires an arXiv marker
/// (`arXiv:`, `arxiv.org/abs/`) so that bare numbers are not mistaken for ids.
pub fn extract_arxiv_id(text: &str) -> Option<String> {
    ARXIV_NEW_RE
        .captures(text)
        .or_else(|| ARXIV_OLD_RE.captures(text))
        .map(|caps| caps[1].to_string())
}

/// Drop a trailing version suffix: `2101.00001v3` -> `2101.00001`.
pub fn strip_arxiv_version(id: &str) -> &str {
    match VERSION_RE.find(id) {
        Some(m) => &id[..m.start()],
        None => id,
    }
}

pub fn is_arxiv_id(id: &str) -> bool {
    BARE_ARXIV_RE.is_match(id.trim())
}

/// Build the `backup_id` value for an arXiv id.
pub fn arxiv_backup_id(id: &str) -> String {
    format!("{ARXIV_PREFIX}{}", id.trim())
}

/// The id part of an `arxiv:`-prefixed `backup_id`, if it has that prefix.
pub fn parse_arxiv_backup_id(backup_id: &str) -> Option<&str> {
    strip_prefix_ci(backup_id.trim(), ARXIV_PREFIX)
        .map(str::trim)
        .filter(|id| !id.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_bare_and_url_dois() {
        assert_eq!(
            extract_doi("See doi:10.1145/3297280.3297641.").as_deref(),
            Some("10.1145/3297280.3297641")
        );
        assert_eq!(
            extract_doi("https://doi.org/10.1016/0021-9681(87)90171-8").as_deref(),
            Some("10.1016/0021-9681(87)90171-8")
        );
        assert_eq!(
            extract_doi("(available at 10.1000/xyz123)").as_deref(),
            Some("10.1000/xyz123")
        );
        assert_eq!(
            extract_doi("https://dl.acm.org/doi/10.1145%2F1234.5678").as_deref(),
            Some("10.1145/1234.5678")
        );
        assert!(extract_doi("no identifier here").is_none());
    }

    #[test]
    fn normalizes_doi_forms() {
        assert_eq!(normalize_doi("https://doi.org/10.1234/ABC"), "10.1234/abc");
        assert_eq!(normalize_doi("DOI: 10.1234/abc."), "10.1234/abc");
        assert_eq!(normalize_doi("10.1234/abc"), "10.1234/abc");
    }

    #[test]
    fn extracts_arxiv_ids() {
        assert_eq!(
            extract_arxiv_id("arXiv:1706.03762v5 [cs.CL]").as_deref(),
            Some("1706.03762v5")
        );
        assert_eq!(
            extract_arxiv_id("https://arxiv.org/abs/2101.00001").as_deref(),
            Some("2101.00001")
        );
        assert_eq!(
            extract_arxiv_id("arXiv preprint hep-th/9901001").as_deref(),
            None
        );
        assert_eq!(
            extract_arxiv_id("arxiv.org/abs/hep-th/9901001").as_deref(),
            Some("hep-th/9901001")
        );
        assert!(extract_arxiv_id("volume 2101.00001").is_none());
    }

    #[test]
    fn arxiv_backup_ids() {
        assert_eq!(arxiv_backup_id("2101.00001"), "arxiv:2101.00001");
        assert_eq!(parse_arxiv_backup_id("arXiv:2101.00001"), Some("2101.00001"));
        assert_eq!(parse_arxiv_backup_id("pmid:12345"), None);
        assert_eq!(strip_arxiv_version("2101.00001v3"), "2101.00001");
        assert!(is_arxiv_id("2101.00001v2"));
        assert!(!is_arxiv_id("10.1234/abc"));
        assert_eq!(parse_arxiv_backup_id("arxiv:"), None);
    }

    #[test]
    fn non_ascii_input_does_not_split_characters() {
        assert_eq!(normalize_doi("Not available — n/a"), "not available — n/a");
        assert_eq!(normalize_doi("dö:10.1/x"), "dö:10.1/x");
        assert_eq!(normalize_doi("https://doi.org/10.1/é"), "10.1/é");
        assert_eq!(parse_arxiv_backup_id("arx—iv:1"), None);
        assert_eq!(parse_arxiv_backup_id("ärxiv:2101.00001"), None);
    }
}
