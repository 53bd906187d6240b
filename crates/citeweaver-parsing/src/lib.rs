use thiserror::Error;

pub mod extractor;
pub mod normalize;
pub mod section;

pub use extractor::{
    CitationExtraction, ExtractorConfig, extract_citations, extract_document_citation,
};
pub use normalize::{normalize_references, split_citations};
pub use section::{Heading, LocatedSection, find_headings, locate_references};
// Re-export domain types from core (canonical definitions live there)
pub use citeweaver_core::{Citation, LlmError, TextModel};

#[derive(Error, Debug)]
pub enum ParsingError {
    #[error("could not classify the references heading: {0}")]
    HeadingClassification(#[source] LlmError),
}
