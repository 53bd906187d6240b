use thiserror::Error;

pub mod export;
pub mod format;
pub mod style;

pub use export::{ExportFormat, export_citations, write_export};
pub use format::{apply_style, format_citation};
pub use style::Style;

#[derive(Error, Debug)]
pub enum ReportingError {
    #[error("unsupported citation style: {0}")]
    UnknownStyle(String),
    #[error("unsupported export format: {0}")]
    UnknownFormat(String),
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("could not write output: {0}")]
    Io(#[from] std::io::Error),
}
