use std::sync::{Arc, Mutex};

use citeweaver_core::ProgressEvent;
use citeweaver_core::llm::mock::{MockModel, ParseReply};
use citeweaver_parsing::{ExtractorConfig, extract_citations, extract_document_citation};
use serde_json::json;

fn raw(lines: &[&str]) -> Vec<String> {
    lines.iter().map(|s| s.to_string()).collect()
}

fn config(batch_size: usize) -> ExtractorConfig {
    ExtractorConfig {
        batch_size,
        ..ExtractorConfig::default()
    }
}

fn titles(citations: &[citeweaver_core::Citation]) -> Vec<&str> {
    citations.iter().map(|c| c.title_str()).collect()
}

#[tokio::test]
async fn one_failing_batch_is_isolated() {
    let model = MockModel::title_echo().with_parser(|text, batched| {
        if text.contains("BAD") {
            return ParseReply::Error("model refused".into());
        }
        let citations: Vec<_> = text
            .split("\n\n")
            .map(|t| json!({ "title": t.trim() }))
            .collect();
        assert!(batched);
        ParseReply::Value(json!({ "citations": citations }))
    });
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let progress = move |e: ProgressEvent| sink.lock().unwrap().push(e);

    let lines = raw(&["one", "two", "BAD three", "four", "five", "six"]);
    let out = extract_citations(&lines, &model, &config(2), &progress).await;

    assert_eq!(titles(&out), vec!["one", "two", "five", "six"]);
    // Two attempts for the bad batch, one for each good batch
    assert_eq!(model.parse_calls(), 4);
    assert!(events.lock().unwrap().iter().any(|e| matches!(
        e,
        ProgressEvent::BatchSkipped { index: 1, total: 3 }
    )));
}

#[tokio::test]
async fn batch_is_retried_exactly_once() {
    let model = MockModel::title_echo().with_parse_sequence(vec![
        ParseReply::Error("transient".into()),
        ParseReply::Value(json!({ "title": "Recovered" })),
    ]);
    let out = extract_citations(&raw(&["Recovered"]), &model, &config(1), &|_| {}).await;

    assert_eq!(titles(&out), vec!["Recovered"]);
    assert_eq!(model.parse_calls(), 2);
}

#[tokio::test]
async fn batch_failing_twice_is_dropped() {
    let model = MockModel::title_echo().with_parse_sequence(vec![
        ParseReply::Unparseable,
        ParseReply::Error("still broken".into()),
    ]);
    let lines = raw(&["lost", "kept"]);
    let out = extract_citations(&lines, &model, &config(1), &|_| {}).await;

    assert_eq!(titles(&out), vec!["kept"]);
    assert_eq!(model.parse_calls(), 3);
}

#[tokio::test]
async fn batched_reply_without_citations_list_counts_as_failure() {
    let model = MockModel::title_echo().with_parse_sequence(vec![
        ParseReply::Value(json!({ "title": "not a list" })),
    ]);
    let out = extract_citations(&raw(&["a", "b"]), &model, &config(2), &|_| {}).await;

    assert_eq!(titles(&out), vec!["a", "b"]);
    assert_eq!(model.parse_calls(), 2);
}

#[tokio::test]
async fn invalid_items_are_dropped_siblings_kept() {
    let model = MockModel::new().with_parse_sequence(vec![ParseReply::Value(json!({
        "citations": [
            { "title": "Good One", "year": 2020 },
            { "authors": ["No Title"] },
            { "title": "Good Two", "authors": ["X. Y."] }
        ]
    }))]);
    let out = extract_citations(&raw(&["a", "b", "c"]), &model, &config(3), &|_| {}).await;

    assert_eq!(titles(&out), vec!["Good One", "Good Two"]);
    assert_eq!(out[0].year, Some(2020));
}

#[tokio::test]
async fn batches_are_joined_with_blank_lines_in_order() {
    let model = MockModel::title_echo();
    let lines = raw(&["first", "second", "third"]);
    let out = extract_citations(&lines, &model, &config(2), &|_| {}).await;

    assert_eq!(titles(&out), vec!["first", "second", "third"]);
    let inputs = model.parse_inputs();
    assert_eq!(inputs.len(), 2);
    assert_eq!(inputs[0], ("first\n\nsecond".to_string(), true));
    // The short final batch keeps the batched schema
    assert_eq!(inputs[1], ("third".to_string(), true));
}

#[tokio::test]
async fn single_batches_use_unbatched_schema() {
    let model = MockModel::title_echo();
    extract_citations(&raw(&["only"]), &model, &config(1), &|_| {}).await;
    assert_eq!(model.parse_inputs(), vec![("only".to_string(), false)]);
}

#[tokio::test]
async fn document_citation_uses_document_head() {
    let model = MockModel::new().with_parse_sequence(vec![ParseReply::Value(json!({
        "title": "The Paper Itself",
        "authors": ["Ada Lovelace"],
        "year": 1843
    }))]);
    let text = "The Paper Itself\nAda Lovelace\n\nAbstract. ".repeat(100);
    let cfg = ExtractorConfig {
        document_head_chars: 40,
        ..ExtractorConfig::default()
    };
    let citation = extract_document_citation(&text, &model, &cfg).await.unwrap();

    assert!(citation.is_document_citation);
    assert_eq!(citation.title.as_deref(), Some("The Paper Itself"));
    let inputs = model.parse_inputs();
    assert_eq!(inputs[0].0.chars().count(), 40);
    assert!(!inputs[0].1);
}

#[tokio::test]
async fn document_citation_failure_is_none() {
    let model = MockModel::new();
    assert!(
        extract_document_citation("Some text", &model, &ExtractorConfig::default())
            .await
            .is_none()
    );
    assert_eq!(model.parse_calls(), 2);
}
