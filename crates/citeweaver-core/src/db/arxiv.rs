use super::{ARXIV, ExternalRecord, LookupError, LookupQuery, LookupSource};
use crate::Citation;
use crate::identifiers::{parse_arxiv_backup_id, strip_arxiv_version};
use crate::rate_limit::check_rate_limit_response;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

const API_BASE: &str = "http://export.arxiv.org/api/query";

/// arXiv export API. Only citations whose `backup_id` carries the `arxiv:`
/// prefix are looked up; everything else is ignored without a request.
pub struct Arxiv {
    pub base_url: String,
}

impl Default for Arxiv {
    fn default() -> Self {
        Self {
            base_url: API_BASE.to_string(),
        }
    }
}

/// One `<entry>` of the Atom feed.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ArxivEntry {
    /// Versionless id, e.g. `1706.03762`.
    pub id: String,
    pub title: String,
    pub summary: String,
    pub published: String,
    pub authors: Vec<String>,
    pub abs_url: Option<String>,
    pub doi: Option<String>,
    pub journal_ref: Option<String>,
}

impl ArxivEntry {
    pub fn to_citation(&self) -> Citation {
        let text = |s: &str| {
            let collapsed = s.split_whitespace().collect::<Vec<_>>().join(" ");
            Some(collapsed).filter(|s| !s.is_empty())
        };
        Citation {
            title: text(&self.title),
            authors: self.authors.clone(),
            year: self.published.get(..4).and_then(|y| y.parse().ok()),
            journal: self.journal_ref.as_deref().and_then(text),
            abstract_text: text(&self.summary),
            url: self.abs_url.clone(),
            doi: self.doi.clone(),
            ..Default::default()
        }
    }
}

/// Parse an arXiv Atom feed into entries. Error entries (arXiv reports bad
/// ids as an entry titled "Error") are dropped.
pub fn parse_feed(xml: &str) -> Result<Vec<ArxivEntry>, LookupError> {
    use quick_xml::Reader;
    use quick_xml::events::Event;

    #[derive(PartialEq)]
    enum Field {
        None,
        Id,
        Title,
        Summary,
        Published,
        Name,
        Doi,
        JournalRef,
    }

    let mut reader = Reader::from_str(xml);
    let mut entries = Vec::new();
    let mut current: Option<ArxivEntry> = None;
    let mut field = Field::None;
    let mut raw_id = String::new();
    let mut name = String::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let local = e.local_name();
                match local.as_ref() {
                    b"entry" => {
                        current = Some(ArxivEntry::default());
                        raw_id.clear();
                    }
                    b"id" if current.is_some() => field = Field::Id,
                    b"title" if current.is_some() => field = Field::Title,
                    b"summary" if current.is_some() => field = Field::Summary,
                    b"published" if current.is_some() => field = Field::Published,
                    b"name" if current.is_some() => {
                        field = Field::Name;
                        name.clear();
                    }
                    b"doi" if current.is_some() => field = Field::Doi,
                    b"journal_ref" if current.is_some() => field = Field::JournalRef,
                    _ => {}
                }
            }
            Ok(Event::Empty(ref e)) => {
                if e.local_name().as_ref() == b"link"
                    && let Some(entry) = current.as_mut()
                {
                    let mut href = None;
                    let mut alternate = false;
                    for attr in e.attributes().flatten() {
                        match attr.key.as_ref() {
                            b"href" => href = Some(String::from_utf8_lossy(&attr.value).to_string()),
                            b"rel" => alternate = attr.value.as_ref() == b"alternate",
                            _ => {}
                        }
                    }
                    if alternate && entry.abs_url.is_none() {
                        entry.abs_url = href;
                    }
                }
            }
            Ok(Event::Text(ref e)) => {
                let text = e.unescape().unwrap_or_default();
                if let Some(entry) = current.as_mut() {
                    match field {
                        Field::Id => raw_id.push_str(&text),
                        Field::Title => entry.title.push_str(&text),
                        Field::Summary => entry.summary.push_str(&text),
                        Field::Published => entry.published.push_str(&text),
                        Field::Name => name.push_str(&text),
                        Field::Doi => entry.doi.get_or_insert_with(String::new).push_str(text.trim()),
                        Field::JournalRef => entry
                            .journal_ref
                            .get_or_insert_with(String::new)
                            .push_str(&text),
                        Field::None => {}
                    }
                }
            }
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"entry" => {
                    if let Some(mut entry) = current.take() {
                        entry.id = id_from_url(&raw_id);
                        if !entry.id.is_empty() && entry.title.trim() != "Error" {
                            entries.push(entry);
                        }
                    }
                    field = Field::None;
                }
                b"name" => {
                    if let Some(entry) = current.as_mut()
                        && !name.trim().is_empty()
                    {
                        entry.authors.push(name.trim().to_string());
                    }
                    field = Field::None;
                }
                _ => field = Field::None,
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(LookupError::Other(format!("XML parse error: {}", e))),
            _ => {}
        }
        buf.clear();
    }

    Ok(entries)
}

/// `http://arxiv.org/abs/1706.03762v5` -> `1706.03762`;
/// `http://arxiv.org/abs/hep-th/9901001v1` -> `hep-th/9901001`.
fn id_from_url(url: &str) -> String {
    let url = url.trim();
    let id = url.split_once("/abs/").map(|(_, id)| id).unwrap_or(url);
    strip_arxiv_version(id).to_string()
}

impl LookupSource for Arxiv {
    fn name(&self) -> &str {
        ARXIV
    }

    fn lookup<'a>(
        &'a self,
        queries: &'a [LookupQuery],
        client: &'a reqwest::Client,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<ExternalRecord>, LookupError>> + Send + 'a>> {
        Box::pin(async move {
            let wanted: Vec<(&LookupQuery, &str)> = queries
                .iter()
                .filter_map(|q| {
                    q.backup_id
                        .as_deref()
                        .and_then(parse_arxiv_backup_id)
                        .map(|id| (q, strip_arxiv_version(id)))
                })
                .collect();
            if wanted.is_empty() {
                return Ok(Vec::new());
            }

            let id_list: Vec<&str> = wanted.iter().map(|(_, id)| *id).collect();
            let url = format!(
                "{}?id_list={}&max_results={}",
                self.base_url,
                urlencoding::encode(&id_list.join(",")),
                id_list.len()
            );

            let resp = client.get(&url).timeout(timeout).send().await?;
            check_rate_limit_response(&resp)?;
            if !resp.status().is_success() {
                return Err(LookupError::Other(format!("HTTP {}", resp.status())));
            }
            let body = resp.text().await?;

            let entries = parse_feed(&body)?;
            let mut records = Vec::new();
            for entry in &entries {
                for (query, id) in &wanted {
                    if entry.id.eq_ignore_ascii_case(id) {
                        records.push(ExternalRecord {
                            source: ARXIV.to_string(),
                            matched_key: query.key.clone(),
                            patch: entry.to_citation(),
                        });
                    }
                }
            }
            Ok(records)
        })
    }
}
