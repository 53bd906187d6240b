//! The enrichment cascade: a fixed-order list of lookup steps, each gated on
//! the citation's current state and merged with a fill-only-gaps policy.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::db::arxiv::Arxiv;
use crate::db::opencitations::OpenCitations;
use crate::db::searxng::Searxng;
use crate::db::semantic_scholar::SemanticScholar;
use crate::db::{self, LookupQuery, LookupSource};
use crate::rate_limit::{RateLimiters, lookup_with_rate_limit};
use crate::{Citation, Config, ProgressEvent};

/// The four cascade positions, in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CascadeStep {
    /// Source A: metadata index, searchable by bibliographic fields alone.
    Metadata,
    /// Source B: identifier-keyed registry.
    Registry,
    /// Source C: preprint archive, productive only for `arxiv:` backup ids.
    Archive,
    /// Source D: web search for missing identifiers and URLs.
    Web,
}

impl CascadeStep {
    pub const ORDER: [CascadeStep; 4] = [
        CascadeStep::Metadata,
        CascadeStep::Registry,
        CascadeStep::Archive,
        CascadeStep::Web,
    ];

    /// Whether this step should run for `citation` as it stands right now.
    pub fn should_run(self, citation: &Citation) -> bool {
        match self {
            CascadeStep::Metadata => citation.has_missing_fields(),
            CascadeStep::Registry => citation.has_identifier() && citation.has_missing_fields(),
            CascadeStep::Archive | CascadeStep::Web => {
                !citation.has_identifier() || citation.has_missing_fields()
            }
        }
    }
}

/// The lookup sources available to the cascade. An absent source is
/// disabled and its step is skipped.
#[derive(Clone, Default)]
pub struct Sources {
    pub metadata: Option<Arc<dyn LookupSource>>,
    pub registry: Option<Arc<dyn LookupSource>>,
    pub archive: Option<Arc<dyn LookupSource>>,
    pub web: Option<Arc<dyn LookupSource>>,
}

impl std::fmt::Debug for Sources {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.enabled_names()).finish()
    }
}

impl Sources {
    /// Resolve the enabled sources once from configuration.
    ///
    /// A source listed in `disabled_sources` is left out. Web search also
    /// needs a SearxNG URL; without one it is left out rather than failing.
    pub fn from_config(config: &Config) -> Self {
        let should_include = |name: &str| !config.is_disabled(name);

        let metadata: Option<Arc<dyn LookupSource>> = should_include(db::SEMANTIC_SCHOLAR)
            .then(|| Arc::new(SemanticScholar::new(config.s2_api_key.clone())) as _);
        let registry: Option<Arc<dyn LookupSource>> = should_include(db::OPENCITATIONS)
            .then(|| Arc::new(OpenCitations::new(config.opencitations_token.clone())) as _);
        let archive: Option<Arc<dyn LookupSource>> =
            should_include(db::ARXIV).then(|| Arc::new(Arxiv::default()) as _);

        let web: Option<Arc<dyn LookupSource>> = if !should_include(db::WEB_SEARCH) {
            None
        } else {
            match config.searxng_url.as_deref().map(str::trim) {
                Some(url) if !url.is_empty() => Some(Arc::new(Searxng::new(url.to_string()))),
                _ => {
                    tracing::info!("web search disabled: no SearxNG URL configured");
                    None
                }
            }
        };

        Self {
            metadata,
            registry,
            archive,
            web,
        }
    }

    pub fn get(&self, step: CascadeStep) -> Option<&Arc<dyn LookupSource>> {
        match step {
            CascadeStep::Metadata => self.metadata.as_ref(),
            CascadeStep::Registry => self.registry.as_ref(),
            CascadeStep::Archive => self.archive.as_ref(),
            CascadeStep::Web => self.web.as_ref(),
        }
    }

    pub fn enabled_names(&self) -> Vec<&str> {
        CascadeStep::ORDER
            .iter()
            .filter_map(|step| self.get(*step).map(|s| s.name()))
            .collect()
    }
}

/// Runs the cascade over citations.
pub struct Enricher<'a> {
    sources: &'a Sources,
    client: &'a reqwest::Client,
    timeout: Duration,
    rate_limiters: &'a RateLimiters,
    progress: &'a (dyn Fn(ProgressEvent) + Send + Sync),
}

impl<'a> Enricher<'a> {
    pub fn new(
        sources: &'a Sources,
        client: &'a reqwest::Client,
        config: &'a Config,
        progress: &'a (dyn Fn(ProgressEvent) + Send + Sync),
    ) -> Self {
        Self {
            sources,
            client,
            timeout: config.lookup_timeout(),
            rate_limiters: &config.rate_limiters,
            progress,
        }
    }

    /// Enrich every citation in place.
    ///
    /// Source A runs once as a batch over all citations whose gate is open;
    /// then each citation runs Sources B, C and D in turn. Every gate is
    /// evaluated against the citation as the previous step left it. When
    /// Source D discovers a new identifier, Source B gets one more chance,
    /// and Source C too if the new identifier is an arXiv id.
    pub async fn enrich(&self, citations: &mut [Citation]) {
        let total = citations.len();
        let mut filled: Vec<Vec<&'static str>> = vec![Vec::new(); total];

        let everyone: Vec<usize> = (0..total).collect();
        self.run_step(CascadeStep::Metadata, citations, &everyone, &mut filled)
            .await;

        for i in 0..total {
            self.run_step(CascadeStep::Registry, citations, &[i], &mut filled)
                .await;
            self.run_step(CascadeStep::Archive, citations, &[i], &mut filled)
                .await;

            let had_doi = citations[i].doi_str().is_some();
            let had_backup = citations[i].backup_id_str().is_some();
            self.run_step(CascadeStep::Web, citations, &[i], &mut filled)
                .await;

            let new_doi = !had_doi && citations[i].doi_str().is_some();
            let new_backup = !had_backup && citations[i].backup_id_str().is_some();
            if new_doi || new_backup {
                tracing::debug!(
                    index = i,
                    doi = ?citations[i].doi_str(),
                    backup_id = ?citations[i].backup_id_str(),
                    "web search found a new identifier, re-running registry lookup"
                );
                self.run_step(CascadeStep::Registry, citations, &[i], &mut filled)
                    .await;
                if new_backup && citations[i].arxiv_id().is_some() {
                    self.run_step(CascadeStep::Archive, citations, &[i], &mut filled)
                        .await;
                }
            }

            (self.progress)(ProgressEvent::Enriched {
                index: i,
                total,
                title: citations[i].title_str().to_string(),
                filled: std::mem::take(&mut filled[i]),
            });
        }
    }

    /// Run one step for the citations at `indices` whose gate is open, as a
    /// single call to the step's source, and merge the answers back by key.
    async fn run_step(
        &self,
        step: CascadeStep,
        citations: &mut [Citation],
        indices: &[usize],
        filled: &mut [Vec<&'static str>],
    ) {
        let Some(source) = self.sources.get(step) else {
            return;
        };

        let mut targets: Vec<(usize, String)> = Vec::new();
        let mut queries: Vec<LookupQuery> = Vec::new();
        let mut seen_keys: HashSet<String> = HashSet::new();

        for &i in indices {
            if !step.should_run(&citations[i]) {
                continue;
            }
            let Some(query) = LookupQuery::for_citation(&citations[i]) else {
                tracing::debug!(index = i, ?step, "nothing to look up by");
                continue;
            };
            targets.push((i, query.key.clone()));
            if seen_keys.insert(query.key.to_lowercase()) {
                queries.push(query);
            }
        }

        if queries.is_empty() {
            return;
        }

        let rl = lookup_with_rate_limit(
            source.as_ref(),
            &queries,
            self.client,
            self.timeout,
            self.rate_limiters,
        )
        .await;

        let records = match rl.result {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(source = source.name(), error = %e, "lookup failed, continuing");
                (self.progress)(ProgressEvent::LookupFailed {
                    source: source.name().to_string(),
                    message: e.to_string(),
                });
                return;
            }
        };

        let mut matched = 0;
        for (i, key) in &targets {
            let mut hit = false;
            for record in records
                .iter()
                .filter(|r| r.matched_key.trim().eq_ignore_ascii_case(key))
            {
                hit = true;
                let written = citations[*i].fill_gaps(&record.patch);
                if !written.is_empty() {
                    tracing::debug!(
                        source = source.name(),
                        key = %key,
                        fields = ?written,
                        "merged lookup result"
                    );
                }
                filled[*i].extend(written);
            }
            if hit {
                matched += 1;
            }
        }

        (self.progress)(ProgressEvent::LookupComplete {
            source: source.name().to_string(),
            queried: queries.len(),
            matched,
            elapsed: rl.elapsed,
        });
    }
}
