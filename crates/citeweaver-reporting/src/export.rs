use std::fmt;
use std::io::Write;
use std::path::Path;
use std::str::FromStr;

use citeweaver_core::Citation;

use crate::ReportingError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    #[default]
    Json,
    Text,
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExportFormat::Json => "json",
            ExportFormat::Text => "text",
        })
    }
}

impl FromStr for ExportFormat {
    type Err = ReportingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "text" | "txt" => Ok(ExportFormat::Text),
            _ => Err(ReportingError::UnknownFormat(s.to_string())),
        }
    }
}

/// Render citations in the given format.
pub fn export_citations(
    citations: &[Citation],
    format: ExportFormat,
) -> Result<String, ReportingError> {
    match format {
        ExportFormat::Json => Ok(serde_json::to_string_pretty(citations)?),
        ExportFormat::Text => Ok(export_text(citations)),
    }
}

/// Render and write citations to `path`.
pub fn write_export(
    citations: &[Citation],
    format: ExportFormat,
    path: &Path,
) -> Result<(), ReportingError> {
    let content = export_citations(citations, format)?;
    let mut file = std::fs::File::create(path)?;
    file.write_all(content.as_bytes())?;
    if !content.ends_with('\n') {
        file.write_all(b"\n")?;
    }
    Ok(())
}

/// The rendered string if the citation was styled, else its title.
fn display_line(c: &Citation) -> &str {
    c.formatted
        .as_deref()
        .filter(|f| !f.trim().is_empty())
        .or_else(|| Some(c.title_str()).filter(|t| !t.is_empty()))
        .unwrap_or("Untitled")
}

/// Plain bibliography: the document itself, then numbered references.
fn export_text(citations: &[Citation]) -> String {
    let mut out = String::new();

    for doc in citations.iter().filter(|c| c.is_document_citation) {
        out.push_str("Document:\n");
        out.push_str(&format!("  {}\n\n", display_line(doc)));
    }

    let references: Vec<&Citation> = citations
        .iter()
        .filter(|c| !c.is_document_citation)
        .collect();
    if !references.is_empty() {
        out.push_str(&format!("References ({}):\n", references.len()));
        for (i, c) in references.iter().enumerate() {
            out.push_str(&format!("[{}] {}\n", i + 1, display_line(c)));
        }
    }

    out
}
