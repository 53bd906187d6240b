use std::path::PathBuf;

use thiserror::Error;

pub mod context;
pub mod pipeline;

pub use context::ProcessingContext;
pub use pipeline::{CitationPipeline, DocumentInput};
// Re-export domain types for convenience
pub use citeweaver_core::{Citation, ProgressEvent};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("no document text provided")]
    NoInput,
    #[error("could not read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Parsing(#[from] citeweaver_parsing::ParsingError),
    #[error("processing completed but produced no citations")]
    EmptyResult,
}
