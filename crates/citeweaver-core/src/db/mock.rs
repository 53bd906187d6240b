//! Mock lookup source for tests.

use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::{ExternalRecord, LookupError, LookupQuery, LookupSource};
use crate::Citation;

/// A scripted response for [`MockSource`].
#[derive(Clone, Debug)]
pub enum MockResponse {
    /// Answer every query with the same patch.
    Patch(Citation),
    /// Answer only the queries whose key appears here.
    ByKey(Vec<(String, Citation)>),
    /// Answer nothing.
    Empty,
    RateLimited { retry_after: Option<Duration> },
    Error(String),
}

/// A hand-rolled [`LookupSource`] that returns scripted responses, counts
/// calls and records the queries it was given.
pub struct MockSource {
    name: String,
    /// Popped per call; `fallback` is used once it runs dry.
    responses: Mutex<Vec<MockResponse>>,
    fallback: MockResponse,
    call_count: AtomicUsize,
    seen: Mutex<Vec<Vec<LookupQuery>>>,
}

impl MockSource {
    /// A mock that always returns `response`.
    pub fn new(name: impl Into<String>, response: MockResponse) -> Self {
        Self {
            name: name.into(),
            responses: Mutex::new(Vec::new()),
            fallback: response,
            call_count: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// A mock that never finds anything.
    pub fn empty(name: impl Into<String>) -> Self {
        Self::new(name, MockResponse::Empty)
    }

    /// A mock returning `responses` in order, then repeating the last one.
    pub fn with_sequence(name: impl Into<String>, mut responses: Vec<MockResponse>) -> Self {
        let fallback = responses.last().cloned().unwrap_or(MockResponse::Empty);
        responses.reverse();
        Self {
            name: name.into(),
            responses: Mutex::new(responses),
            fallback,
            call_count: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// The query batches received so far, one entry per call.
    pub fn seen_queries(&self) -> Vec<Vec<LookupQuery>> {
        self.seen.lock().map(|s| s.clone()).unwrap_or_default()
    }

    fn next_response(&self) -> MockResponse {
        match self.responses.lock() {
            Ok(mut seq) => seq.pop().unwrap_or_else(|| self.fallback.clone()),
            Err(_) => self.fallback.clone(),
        }
    }

    fn answer(&self, queries: &[LookupQuery], response: MockResponse) -> Result<Vec<ExternalRecord>, LookupError> {
        match response {
            MockResponse::Patch(patch) => Ok(queries
                .iter()
                .map(|q| ExternalRecord {
                    source: self.name.clone(),
                    matched_key: q.key.clone(),
                    patch: patch.clone(),
                })
                .collect()),
            MockResponse::ByKey(entries) => Ok(entries
                .into_iter()
                .filter(|(key, _)| queries.iter().any(|q| q.matches_key(key)))
                .map(|(key, patch)| ExternalRecord {
                    source: self.name.clone(),
                    matched_key: key,
                    patch,
                })
                .collect()),
            MockResponse::Empty => Ok(Vec::new()),
            MockResponse::RateLimited { retry_after } => {
                Err(LookupError::RateLimited { retry_after })
            }
            MockResponse::Error(msg) => Err(LookupError::Other(msg)),
        }
    }
}

impl LookupSource for MockSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookup<'a>(
        &'a self,
        queries: &'a [LookupQuery],
        _client: &'a reqwest::Client,
        _timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<ExternalRecord>, LookupError>> + Send + 'a>> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(queries.to_vec());
        }
        let response = self.next_response();
        let result = self.answer(queries, response);
        Box::pin(async move { result })
    }
}
