//! Rendering of a [`Citation`] in one of the supported styles.
//!
//! Only fields that are present are rendered; a missing year shows as
//! "n.d." in the author-date styles and is left out elsewhere.

use citeweaver_core::Citation;

use crate::Style;

/// Render one citation in `style`.
pub fn format_citation(citation: &Citation, style: Style) -> String {
    match style {
        Style::Ieee => format_ieee(citation),
        Style::Apa => format_apa(citation),
        Style::Mla => format_mla(citation),
        Style::Chicago => format_chicago(citation),
        Style::Harvard => format_harvard(citation),
    }
}

/// Write the rendered string into every citation's `formatted` field.
pub fn apply_style(citations: &mut [Citation], style: Style) {
    for citation in citations.iter_mut() {
        citation.formatted = Some(format_citation(citation, style));
    }
}

fn clean(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn title(c: &Citation) -> &str {
    clean(&c.title)
        .map(|t| t.trim_end_matches('.'))
        .unwrap_or("Untitled")
}

/// Journal, falling back to the venue.
fn container(c: &Citation) -> Option<&str> {
    clean(&c.journal).or_else(|| clean(&c.venue))
}

fn pages(c: &Citation) -> Option<String> {
    clean(&c.pages).map(|p| p.replace("--", "-"))
}

fn is_page_range(pages: &str) -> bool {
    pages.contains(['-', '–', ','])
}

fn doi_link(c: &Citation) -> Option<String> {
    c.doi_str().map(|doi| format!("https://doi.org/{doi}"))
}

/// The DOI link, else the plain URL.
fn link(c: &Citation) -> Option<String> {
    doi_link(c).or_else(|| clean(&c.url).map(String::from))
}

/// `text` followed by `punct`, unless it already ends a sentence.
fn closing(text: &str, punct: char) -> String {
    if text.ends_with(['.', '?', '!']) {
        text.to_string()
    } else {
        format!("{text}{punct}")
    }
}

#[derive(Debug, Clone)]
struct NameParts {
    family: String,
    given_names: Vec<String>,
}

/// Accepts both "Given Family" and "Family, Given".
fn split_name(value: &str) -> Option<NameParts> {
    let cleaned = value.trim();
    if cleaned.is_empty() {
        return None;
    }

    if let Some((family, given)) = cleaned.split_once(',') {
        let family = family.trim();
        if family.is_empty() {
            return None;
        }
        return Some(NameParts {
            family: family.to_string(),
            given_names: given.split_whitespace().map(ToOwned::to_owned).collect(),
        });
    }

    let tokens: Vec<&str> = cleaned.split_whitespace().collect();
    let (family, given) = tokens.split_last()?;
    Some(NameParts {
        family: (*family).to_string(),
        given_names: given.iter().map(|t| (*t).to_string()).collect(),
    })
}

fn initials(parts: &[String]) -> Vec<String> {
    parts
        .iter()
        .filter_map(|part| {
            part.chars()
                .find(|ch| ch.is_alphabetic())
                .map(|ch| format!("{}.", ch.to_uppercase()))
        })
        .collect()
}

fn names(c: &Citation) -> Vec<NameParts> {
    c.authors.iter().filter_map(|a| split_name(a)).collect()
}

/// "A. B. Family"
fn initials_family(n: &NameParts) -> String {
    let init = initials(&n.given_names).join(" ");
    if init.is_empty() {
        n.family.clone()
    } else {
        format!("{init} {}", n.family)
    }
}

/// "Family, A. B."
fn family_initials(n: &NameParts) -> String {
    let init = initials(&n.given_names).join(" ");
    if init.is_empty() {
        n.family.clone()
    } else {
        format!("{}, {init}", n.family)
    }
}

/// "Family, Given"
fn family_given(n: &NameParts) -> String {
    if n.given_names.is_empty() {
        n.family.clone()
    } else {
        format!("{}, {}", n.family, n.given_names.join(" "))
    }
}

/// "Given Family"
fn given_family(n: &NameParts) -> String {
    if n.given_names.is_empty() {
        n.family.clone()
    } else {
        format!("{} {}", n.given_names.join(" "), n.family)
    }
}

/// Join with `sep`, putting `last_sep` before the final name.
fn join_names(names: &[String], sep: &str, last_sep: &str) -> String {
    match names {
        [] => String::new(),
        [only] => only.clone(),
        [rest @ .., last] => format!("{}{last_sep}{last}", rest.join(sep)),
    }
}

fn format_ieee(c: &Citation) -> String {
    let people = names(c);
    let authors = if people.len() > 6 {
        format!("{} et al.", initials_family(&people[0]))
    } else {
        let list: Vec<String> = people.iter().map(initials_family).collect();
        let last_sep = if list.len() == 2 { " and " } else { ", and " };
        join_names(&list, ", ", last_sep)
    };

    let mut tail: Vec<String> = Vec::new();
    if let Some(container) = container(c) {
        tail.push(container.to_string());
    }
    if let Some(v) = clean(&c.volume) {
        tail.push(format!("vol. {v}"));
    }
    if let Some(i) = clean(&c.issue) {
        tail.push(format!("no. {i}"));
    }
    if let Some(p) = pages(c) {
        let label = if is_page_range(&p) { "pp." } else { "p." };
        tail.push(format!("{label} {p}"));
    }
    if let Some(year) = c.year {
        tail.push(year.to_string());
    }
    if let Some(doi) = c.doi_str() {
        tail.push(format!("doi: {doi}"));
    }

    let mut out = String::new();
    if !authors.is_empty() {
        out.push_str(&authors);
        out.push_str(", ");
    }
    if tail.is_empty() {
        out.push_str(&format!("\"{}\"", closing(title(c), '.')));
    } else {
        out.push_str(&format!("\"{},\" {}.", title(c), tail.join(", ")));
    }
    if c.doi_str().is_none()
        && let Some(url) = clean(&c.url)
    {
        out.push_str(&format!(" [Online]. Available: {url}"));
    }
    out
}

fn format_apa(c: &Citation) -> String {
    let people = names(c);
    let list: Vec<String> = people.iter().map(family_initials).collect();
    let authors = if list.len() > 20 {
        format!("{}, ... {}", list[..19].join(", "), list[list.len() - 1])
    } else {
        join_names(&list, ", ", ", & ")
    };
    let year = c
        .year
        .map(|y| y.to_string())
        .unwrap_or_else(|| "n.d.".to_string());

    let mut parts = Vec::new();
    if authors.is_empty() {
        parts.push(closing(title(c), '.'));
        parts.push(format!("({year})."));
    } else {
        parts.push(format!("{authors} ({year})."));
        parts.push(closing(title(c), '.'));
    }

    if let Some(container) = container(c) {
        let mut source = container.to_string();
        if let Some(v) = clean(&c.volume) {
            source.push_str(&format!(", {v}"));
            if let Some(i) = clean(&c.issue) {
                source.push_str(&format!("({i})"));
            }
        }
        if let Some(p) = pages(c) {
            source.push_str(&format!(", {p}"));
        }
        parts.push(format!("{source}."));
    }

    if let Some(link) = link(c) {
        parts.push(link);
    }
    parts.join(" ")
}

fn format_mla(c: &Citation) -> String {
    let people = names(c);
    let authors = match people.as_slice() {
        [] => String::new(),
        [one] => family_given(one),
        [first, second] => format!("{}, and {}", family_given(first), given_family(second)),
        [first, ..] => format!("{}, et al", family_given(first)),
    };

    let mut parts = Vec::new();
    if !authors.is_empty() {
        parts.push(closing(&authors, '.'));
    }
    parts.push(format!("\"{}\"", closing(title(c), '.')));

    let mut source: Vec<String> = Vec::new();
    if let Some(container) = container(c) {
        source.push(container.to_string());
    }
    if let Some(v) = clean(&c.volume) {
        source.push(format!("vol. {v}"));
    }
    if let Some(i) = clean(&c.issue) {
        source.push(format!("no. {i}"));
    }
    if let Some(year) = c.year {
        source.push(year.to_string());
    }
    if let Some(p) = pages(c) {
        let label = if is_page_range(&p) { "pp." } else { "p." };
        source.push(format!("{label} {p}"));
    }
    if !source.is_empty() {
        parts.push(format!("{}.", source.join(", ")));
    }

    if let Some(link) = link(c) {
        parts.push(closing(&link, '.'));
    }
    parts.join(" ")
}

fn format_chicago(c: &Citation) -> String {
    let people = names(c);
    let authors = if people.len() > 10 {
        let mut list = vec![family_given(&people[0])];
        list.extend(people[1..7].iter().map(given_family));
        format!("{}, et al", list.join(", "))
    } else {
        let list: Vec<String> = people
            .iter()
            .enumerate()
            .map(|(i, n)| if i == 0 { family_given(n) } else { given_family(n) })
            .collect();
        let last_sep = if list.len() == 2 { " and " } else { ", and " };
        join_names(&list, ", ", last_sep)
    };

    let mut parts = Vec::new();
    if !authors.is_empty() {
        parts.push(closing(&authors, '.'));
    }
    parts.push(format!("\"{}\"", closing(title(c), '.')));

    match container(c) {
        Some(container) => {
            let mut source = container.to_string();
            if let Some(v) = clean(&c.volume) {
                source.push_str(&format!(" {v}"));
            }
            if let Some(i) = clean(&c.issue) {
                source.push_str(&format!(", no. {i}"));
            }
            if let Some(year) = c.year {
                source.push_str(&format!(" ({year})"));
            }
            if let Some(p) = pages(c) {
                source.push_str(&format!(": {p}"));
            }
            parts.push(format!("{source}."));
        }
        None => {
            if let Some(year) = c.year {
                parts.push(format!("{year}."));
            }
        }
    }

    if let Some(link) = link(c) {
        parts.push(closing(&link, '.'));
    }
    parts.join(" ")
}

fn format_harvard(c: &Citation) -> String {
    let people = names(c);
    let authors = if people.len() > 3 {
        format!("{} et al.", family_initials(&people[0]))
    } else {
        let list: Vec<String> = people.iter().map(family_initials).collect();
        join_names(&list, ", ", " and ")
    };
    let year = c
        .year
        .map(|y| y.to_string())
        .unwrap_or_else(|| "n.d.".to_string());

    let mut out = if authors.is_empty() {
        format!("'{}' ({year})", title(c))
    } else {
        format!("{authors} ({year}) '{}'", title(c))
    };

    if let Some(container) = container(c) {
        out.push_str(&format!(", {container}"));
        if let Some(v) = clean(&c.volume) {
            out.push_str(&format!(", {v}"));
            if let Some(i) = clean(&c.issue) {
                out.push_str(&format!("({i})"));
            }
        }
        if let Some(p) = pages(c) {
            let label = if is_page_range(&p) { "pp." } else { "p." };
            out.push_str(&format!(", {label} {p}"));
        }
    }
    out.push('.');

    if let Some(doi) = c.doi_str() {
        out.push_str(&format!(" doi: {doi}."));
    } else if let Some(url) = clean(&c.url) {
        out.push_str(&format!(" Available at: {url}."));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attention() -> Citation {
        Citation {
            title: Some("Attention is all you need".into()),
            authors: vec![
                "Ashish Vaswani".into(),
                "Noam Shazeer".into(),
                "Niki Parmar".into(),
            ],
            year: Some(2017),
            journal: Some("Advances in Neural Information Processing Systems".into()),
            volume: Some("30".into()),
            pages: Some("5998--6008".into()),
            doi: Some("10.5555/3295222.3295349".into()),
            ..Default::default()
        }
    }

    #[test]
    fn formats_ieee() {
        assert_eq!(
            format_citation(&attention(), Style::Ieee),
            "A. Vaswani, N. Shazeer, and N. Parmar, \"Attention is all you need,\" \
             Advances in Neural Information Processing Systems, vol. 30, pp. 5998-6008, 2017, \
             doi: 10.5555/3295222.3295349."
        );
    }

    #[test]
    fn formats_apa() {
        assert_eq!(
            format_citation(&attention(), Style::Apa),
            "Vaswani, A., Shazeer, N., & Parmar, N. (2017). Attention is all you need. \
             Advances in Neural Information Processing Systems, 30, 5998-6008. \
             https://doi.org/10.5555/3295222.3295349"
        );
    }

    #[test]
    fn formats_mla() {
        assert_eq!(
            format_citation(&attention(), Style::Mla),
            "Vaswani, Ashish, et al. \"Attention is all you need.\" \
             Advances in Neural Information Processing Systems, vol. 30, 2017, pp. 5998-6008. \
             https://doi.org/10.5555/3295222.3295349."
        );
    }

    #[test]
    fn formats_chicago() {
        assert_eq!(
            format_citation(&attention(), Style::Chicago),
            "Vaswani, Ashish, Noam Shazeer, and Niki Parmar. \"Attention is all you need.\" \
             Advances in Neural Information Processing Systems 30 (2017): 5998-6008. \
             https://doi.org/10.5555/3295222.3295349."
        );
    }

    #[test]
    fn formats_harvard() {
        assert_eq!(
            format_citation(&attention(), Style::Harvard),
            "Vaswani, A., Shazeer, N. and Parmar, N. (2017) 'Attention is all you need', \
             Advances in Neural Information Processing Systems, 30, pp. 5998-6008. \
             doi: 10.5555/3295222.3295349."
        );
    }

    #[test]
    fn sparse_record_in_every_style() {
        let c = Citation::titled("Just a Title");
        assert_eq!(format_citation(&c, Style::Ieee), "\"Just a Title.\"");
        assert_eq!(format_citation(&c, Style::Apa), "Just a Title. (n.d.).");
        assert_eq!(format_citation(&c, Style::Mla), "\"Just a Title.\"");
        assert_eq!(format_citation(&c, Style::Chicago), "\"Just a Title.\"");
        assert_eq!(format_citation(&c, Style::Harvard), "'Just a Title' (n.d.).");
    }

    #[test]
    fn family_comma_given_names_and_two_authors() {
        let c = Citation {
            authors: vec!["He, Kaiming".into(), "Zhang, Xiangyu".into()],
            year: Some(2016),
            ..Citation::titled("Deep residual learning")
        };
        assert!(format_citation(&c, Style::Ieee).starts_with("K. He and X. Zhang, "));
        assert!(format_citation(&c, Style::Apa).starts_with("He, K., & Zhang, X. (2016)."));
        assert!(format_citation(&c, Style::Mla).starts_with("He, Kaiming, and Xiangyu Zhang."));
        assert!(format_citation(&c, Style::Chicago).starts_with("He, Kaiming and Xiangyu Zhang."));
        assert!(format_citation(&c, Style::Harvard).starts_with("He, K. and Zhang, X. (2016)"));
    }

    #[test]
    fn long_author_lists_are_abbreviated() {
        let c = Citation {
            authors: (1..=8).map(|i| format!("Given{i} Family{i}")).collect(),
            ..Citation::titled("Big Collaboration")
        };
        assert!(format_citation(&c, Style::Ieee).starts_with("G. Family1 et al., "));
        assert!(format_citation(&c, Style::Harvard).starts_with("Family1, G. et al. (n.d.)"));
        assert!(format_citation(&c, Style::Mla).starts_with("Family1, Given1, et al."));
    }

    #[test]
    fn url_used_without_doi() {
        let c = Citation {
            url: Some("https://example.org/paper".into()),
            ..Citation::titled("Web Paper")
        };
        assert!(format_citation(&c, Style::Apa).ends_with("https://example.org/paper"));
        assert!(format_citation(&c, Style::Ieee).ends_with("[Online]. Available: https://example.org/paper"));
        assert!(format_citation(&c, Style::Harvard).ends_with("Available at: https://example.org/paper."));
    }

    #[test]
    fn apply_style_writes_formatted_only() {
        let mut citations = vec![attention(), Citation::titled("Other")];
        let before = citations.clone();
        apply_style(&mut citations, Style::Apa);
        for (after, before) in citations.iter().zip(&before) {
            assert!(after.formatted.is_some());
            let mut unformatted = after.clone();
            unformatted.formatted = None;
            assert_eq!(&unformatted, before);
        }
    }
}
