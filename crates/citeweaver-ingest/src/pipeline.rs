//! The end-to-end pipeline for a single document.

use std::path::PathBuf;
use std::sync::Arc;

use citeweaver_core::llm::OpenAiCompatible;
use citeweaver_core::{
    Citation, Config, CoreError, Enricher, ProgressEvent, Sources, Stage, TextModel,
};
use citeweaver_parsing::{
    ExtractorConfig, extract_citations, extract_document_citation, locate_references,
    normalize_references, split_citations,
};

use crate::{PipelineError, ProcessingContext};

type Progress<'a> = &'a (dyn Fn(ProgressEvent) + Send + Sync);

/// Where the document text comes from.
#[derive(Debug, Clone)]
pub enum DocumentInput {
    Text(String),
    /// A UTF-8 text or markdown file.
    Path(PathBuf),
}

impl DocumentInput {
    async fn load(self) -> Result<String, PipelineError> {
        let text = match self {
            DocumentInput::Text(text) => text,
            DocumentInput::Path(path) => match tokio::fs::read_to_string(&path).await {
                Ok(text) => {
                    tracing::info!(path = %path.display(), bytes = text.len(), "loaded document");
                    text
                }
                Err(source) => return Err(PipelineError::Io { path, source }),
            },
        };
        if text.trim().is_empty() {
            return Err(PipelineError::NoInput);
        }
        Ok(text)
    }
}

/// Extracts and enriches the citations of one document at a time.
pub struct CitationPipeline {
    config: Config,
    model: Arc<dyn TextModel>,
    sources: Sources,
    client: reqwest::Client,
}

impl CitationPipeline {
    /// Build a pipeline with the HTTP language model and the lookup sources
    /// enabled by `config`.
    pub fn new(config: Config) -> Result<Self, CoreError> {
        let model = OpenAiCompatible::from_config(&config.llm)
            .map_err(|e| CoreError::Config(e.to_string()))?;
        let sources = Sources::from_config(&config);
        let client = citeweaver_core::build_http_client()?;
        Ok(Self::with_parts(config, Arc::new(model), sources, client))
    }

    pub fn with_parts(
        config: Config,
        model: Arc<dyn TextModel>,
        sources: Sources,
        client: reqwest::Client,
    ) -> Self {
        tracing::debug!(sources = ?sources, model = model.name(), "pipeline ready");
        Self {
            config,
            model,
            sources,
            client,
        }
    }

    pub fn sources(&self) -> &Sources {
        &self.sources
    }

    /// Run every stage and return the document citation followed by the
    /// references in extraction order.
    ///
    /// The document record is always present, even when its own extraction
    /// failed. Fails on missing input, a heading classification error, or
    /// when neither the document nor any reference could be parsed.
    pub async fn process_document(
        &self,
        input: DocumentInput,
        progress: Progress<'_>,
    ) -> Result<Vec<Citation>, PipelineError> {
        let ctx = ProcessingContext::new(input.load().await?);
        let extractor = ExtractorConfig::from_config(&self.config);

        let ctx = self.document_citation(ctx, &extractor, progress).await;
        let ctx = self.locate_section(ctx, progress).await?;
        let ctx = self.normalize(ctx, progress).await;
        let ctx = self.extract(ctx, &extractor, progress).await;
        let ctx = self.enrich(ctx, progress).await;

        if ctx.found_nothing() {
            return Err(PipelineError::EmptyResult);
        }
        let citations = ctx.into_citations();
        tracing::info!(citations = citations.len(), "document processed");
        Ok(citations)
    }

    async fn document_citation(
        &self,
        mut ctx: ProcessingContext,
        extractor: &ExtractorConfig,
        progress: Progress<'_>,
    ) -> ProcessingContext {
        progress(ProgressEvent::Stage {
            stage: Stage::DocumentCitation,
        });
        let extracted = extract_document_citation(&ctx.text, self.model.as_ref(), extractor).await;
        ctx.document_citation = Some(extracted.unwrap_or_else(|| {
            tracing::warn!("keeping an empty record for the document itself");
            Citation {
                is_document_citation: true,
                ..Citation::default()
            }
        }));
        ctx
    }

    async fn locate_section(
        &self,
        mut ctx: ProcessingContext,
        progress: Progress<'_>,
    ) -> Result<ProcessingContext, PipelineError> {
        progress(ProgressEvent::Stage {
            stage: Stage::LocateSection,
        });
        let located = locate_references(&ctx.text, self.model.as_ref()).await?;
        tracing::info!(
            heading = ?located.heading,
            chars = located.content.len(),
            "references section located"
        );
        progress(ProgressEvent::SectionLocated {
            heading: located.heading.clone(),
            chars: located.content.chars().count(),
        });
        ctx.headings = Some(located.headings.into_iter().map(|h| h.text).collect());
        ctx.references_heading = located.heading;
        ctx.references_block = Some(located.content);
        Ok(ctx)
    }

    async fn normalize(&self, mut ctx: ProcessingContext, progress: Progress<'_>) -> ProcessingContext {
        progress(ProgressEvent::Stage {
            stage: Stage::Normalize,
        });
        let block = ctx.references_block.as_deref().unwrap_or_default();
        let normalized = normalize_references(block, self.model.as_ref()).await;
        ctx.raw_citations = Some(split_citations(&normalized));
        ctx.normalized_block = Some(normalized);
        ctx
    }

    async fn extract(
        &self,
        mut ctx: ProcessingContext,
        extractor: &ExtractorConfig,
        progress: Progress<'_>,
    ) -> ProcessingContext {
        progress(ProgressEvent::Stage {
            stage: Stage::Extract,
        });
        let raw = ctx.raw_citations.as_deref().unwrap_or_default();
        let citations = extract_citations(raw, self.model.as_ref(), extractor, progress).await;
        tracing::info!(raw = raw.len(), parsed = citations.len(), "citations extracted");
        ctx.citations = Some(citations);
        ctx
    }

    async fn enrich(&self, mut ctx: ProcessingContext, progress: Progress<'_>) -> ProcessingContext {
        progress(ProgressEvent::Stage {
            stage: Stage::Enrich,
        });
        let enricher = Enricher::new(&self.sources, &self.client, &self.config, progress);

        if let Some(doc) = ctx.document_citation.as_mut() {
            enricher.enrich(std::slice::from_mut(doc)).await;
        }
        if let Some(citations) = ctx.citations.as_mut() {
            enricher.enrich(citations).await;
        }
        ctx
    }
}
