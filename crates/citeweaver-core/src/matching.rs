use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

static HTML_TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"</?[a-zA-Z][^>]*>").unwrap());

/// Normalize a title for comparison: lowercase ASCII alphanumerics only.
///
/// HTML entities and inline tags (Semantic Scholar and Crossref titles carry
/// `<i>` and `&amp;`) are removed first, then the text is NFKD-decomposed so
/// accented letters keep their base letter.
pub fn normalize_title(title: &str) -> String {
    let title = title
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'");
    let title = HTML_TAG_RE.replace_all(&title, "");

    title
        .nfkd()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Strict title comparison used to accept search results from bibliographic
/// sources: exact after normalization, or a fuzzy ratio of at least 0.95.
pub fn titles_match(a: &str, b: &str) -> bool {
    let na = normalize_title(a);
    let nb = normalize_title(b);
    if na.is_empty() || nb.is_empty() {
        return false;
    }
    if na == nb {
        return true;
    }
    rapidfuzz::fuzz::ratio(na.chars(), nb.chars()) >= 0.95
}

/// Lenient comparison for web search hits, whose titles carry site suffixes
/// ("... - OpenReview") or date prefixes.
pub fn titles_match_lenient(reference_title: &str, search_title: &str) -> bool {
    let norm_ref = normalize_title(reference_title);
    let norm_search = normalize_title(search_title);

    if norm_ref.is_empty() || norm_search.is_empty() {
        return false;
    }
    if norm_ref == norm_search {
        return true;
    }
    if rapidfuzz::fuzz::ratio(norm_ref.chars(), norm_search.chars()) >= 0.85 {
        return true;
    }

    (norm_ref.len() >= 15 && norm_search.contains(&norm_ref))
        || (norm_search.len() >= 15 && norm_ref.contains(&norm_search))
}
