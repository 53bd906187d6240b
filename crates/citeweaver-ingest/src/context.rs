use citeweaver_core::Citation;

/// State handed from one pipeline stage to the next.
///
/// Each stage takes the context by value, fills in the fields it owns and
/// hands it on. Fields stay `None` until their stage has run.
#[derive(Debug, Clone, Default)]
pub struct ProcessingContext {
    pub text: String,
    pub headings: Option<Vec<String>>,
    pub references_heading: Option<String>,
    pub references_block: Option<String>,
    pub normalized_block: Option<String>,
    pub raw_citations: Option<Vec<String>>,
    pub document_citation: Option<Citation>,
    /// Reference-level citations: parsed first, then enriched in place.
    pub citations: Option<Vec<Citation>>,
}

impl ProcessingContext {
    pub fn new(text: String) -> Self {
        Self {
            text,
            ..Self::default()
        }
    }

    /// The final list: the document citation first, then the references in
    /// extraction order.
    pub fn into_citations(self) -> Vec<Citation> {
        self.document_citation
            .into_iter()
            .chain(self.citations.unwrap_or_default())
            .collect()
    }

    /// True when no reference was parsed and the document record carries
    /// neither a title nor an identifier.
    pub fn found_nothing(&self) -> bool {
        let no_references = self.citations.as_ref().is_none_or(Vec::is_empty);
        let no_document = self
            .document_citation
            .as_ref()
            .is_none_or(|doc| doc.title_str().is_empty() && !doc.has_identifier());
        no_references && no_document
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_citation_comes_first() {
        let ctx = ProcessingContext {
            document_citation: Some(Citation {
                is_document_citation: true,
                ..Citation::titled("Doc")
            }),
            citations: Some(vec![Citation::titled("R1"), Citation::titled("R2")]),
            ..ProcessingContext::new("text".into())
        };
        let out = ctx.into_citations();
        assert_eq!(out.len(), 3);
        assert!(out[0].is_document_citation);
        assert_eq!(out[2].title_str(), "R2");
    }

    #[test]
    fn unfilled_context_yields_nothing() {
        let ctx = ProcessingContext::new("text".into());
        assert!(ctx.found_nothing());
        assert!(ctx.into_citations().is_empty());
    }

    #[test]
    fn empty_document_record_alone_is_nothing() {
        let empty_doc = Citation {
            is_document_citation: true,
            ..Citation::default()
        };
        let ctx = ProcessingContext {
            document_citation: Some(empty_doc.clone()),
            citations: Some(vec![]),
            ..ProcessingContext::new("text".into())
        };
        assert!(ctx.found_nothing());

        let ctx = ProcessingContext {
            document_citation: Some(empty_doc),
            citations: Some(vec![Citation::titled("R1")]),
            ..ProcessingContext::new("text".into())
        };
        assert!(!ctx.found_nothing());
    }
}
