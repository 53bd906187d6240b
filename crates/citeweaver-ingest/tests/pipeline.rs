use std::sync::{Arc, Mutex};

use citeweaver_core::db::mock::MockSource;
use citeweaver_core::llm::mock::{MockModel, ParseReply};
use citeweaver_core::{Config, ProgressEvent, Sources, Stage};
use citeweaver_ingest::{CitationPipeline, DocumentInput, PipelineError};
use serde_json::json;

const PAPER: &str = "\
# A Study of Things

Jane Doe, University of Somewhere

## Introduction
We cite several works.

## References
Vaswani, A. et al. Attention is all you need. NeurIPS, 2017.
He, K. et al. Deep residual learning for image recognition. CVPR, 2016.
Devlin, J. et al. BERT: Pre-training of deep bidirectional transformers. NAACL, 2019.
";

/// No-op lookups for every cascade step.
fn noop_sources() -> (Sources, Vec<Arc<MockSource>>) {
    let mocks: Vec<Arc<MockSource>> = ["A", "B", "C", "D"]
        .into_iter()
        .map(|n| Arc::new(MockSource::empty(n)))
        .collect();
    let sources = Sources {
        metadata: Some(mocks[0].clone()),
        registry: Some(mocks[1].clone()),
        archive: Some(mocks[2].clone()),
        web: Some(mocks[3].clone()),
    };
    (sources, mocks)
}

fn pipeline(model: MockModel, sources: Sources) -> CitationPipeline {
    CitationPipeline::with_parts(
        Config::default(),
        Arc::new(model),
        sources,
        reqwest::Client::new(),
    )
}

#[tokio::test]
async fn end_to_end_three_references() {
    let (sources, mocks) = noop_sources();
    let model = MockModel::title_echo();
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let progress = move |e: ProgressEvent| sink.lock().unwrap().push(e);

    let citations = pipeline(model, sources)
        .process_document(DocumentInput::Text(PAPER.to_string()), &progress)
        .await
        .unwrap();

    assert_eq!(citations.len(), 4);
    assert!(citations[0].is_document_citation);
    assert!(citations[1..].iter().all(|c| !c.is_document_citation));
    assert!(citations[1].title_str().starts_with("Vaswani"));
    assert!(citations[2].title_str().starts_with("He, K."));
    assert!(citations[3].title_str().starts_with("Devlin"));
    assert!(citations.iter().all(|c| c.formatted.is_none()));

    // Every record was offered to the metadata source
    assert!(mocks[0].call_count() >= 1);

    let stages: Vec<Stage> = events
        .lock()
        .unwrap()
        .iter()
        .filter_map(|e| match e {
            ProgressEvent::Stage { stage } => Some(*stage),
            _ => None,
        })
        .collect();
    assert_eq!(
        stages,
        vec![
            Stage::DocumentCitation,
            Stage::LocateSection,
            Stage::Normalize,
            Stage::Extract,
            Stage::Enrich,
        ]
    );
}

#[tokio::test]
async fn reads_document_from_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("paper.md");
    std::fs::write(&path, PAPER).unwrap();

    let citations = pipeline(MockModel::title_echo(), Sources::default())
        .process_document(DocumentInput::Path(path), &|_| {})
        .await
        .unwrap();
    assert_eq!(citations.len(), 4);
}

#[tokio::test]
async fn missing_file_is_io_error() {
    let err = pipeline(MockModel::title_echo(), Sources::default())
        .process_document(DocumentInput::Path("/nonexistent/paper.md".into()), &|_| {})
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Io { .. }));
}

#[tokio::test]
async fn blank_text_is_no_input() {
    let model = MockModel::title_echo();
    let err = pipeline(model, Sources::default())
        .process_document(DocumentInput::Text("  \n ".into()), &|_| {})
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::NoInput));
}

#[tokio::test]
async fn nothing_extracted_is_empty_result() {
    // Every parse fails and there is no heading to find
    let err = pipeline(MockModel::new(), Sources::default())
        .process_document(DocumentInput::Text("plain prose only".into()), &|_| {})
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::EmptyResult));
}

#[tokio::test]
async fn missing_references_section_still_returns_document_citation() {
    let model = MockModel::new().with_parse_sequence(vec![ParseReply::Value(json!({
        "title": "A Study of Things",
        "authors": ["Jane Doe"]
    }))]);
    let citations = pipeline(model, Sources::default())
        .process_document(
            DocumentInput::Text("A Study of Things\nJane Doe\n\nBody text.".into()),
            &|_| {},
        )
        .await
        .unwrap();
    assert_eq!(citations.len(), 1);
    assert!(citations[0].is_document_citation);
}

#[tokio::test]
async fn classifier_failure_aborts_the_run() {
    let text = "# Intro\nbody\n# Works Cited\nSmith 2010\n";
    let model = MockModel::title_echo().with_heading(Err("endpoint down".into()));
    let err = pipeline(model, Sources::default())
        .process_document(DocumentInput::Text(text.into()), &|_| {})
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Parsing(_)));
}

#[tokio::test]
async fn failed_document_citation_keeps_an_empty_document_record() {
    // Both attempts on the document head fail; the references still parse
    let model = MockModel::title_echo().with_parse_sequence(vec![
        ParseReply::Unparseable,
        ParseReply::Unparseable,
    ]);
    let (sources, mocks) = noop_sources();
    let citations = pipeline(model, sources)
        .process_document(DocumentInput::Text(PAPER.to_string()), &|_| {})
        .await
        .unwrap();

    assert_eq!(citations.len(), 4);
    assert_eq!(
        citations.iter().filter(|c| c.is_document_citation).count(),
        1
    );
    assert!(citations[0].is_document_citation);
    assert!(citations[0].title.is_none());
    assert!(citations[1].title_str().starts_with("Vaswani"));
    assert!(citations[3].title_str().starts_with("Devlin"));
    // The empty document record has nothing to query with, so only the
    // references reach the sources
    assert_eq!(mocks[0].call_count(), 1);
    assert_eq!(mocks[3].call_count(), 3);
}
