//! Scripted language model for tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::Value;

use super::{HeadingChoice, LlmError, ModelFuture, TextModel};

/// A scripted reply to `parse_citations`.
#[derive(Clone, Debug)]
pub enum ParseReply {
    Value(Value),
    /// The model answered but nothing parseable came back.
    Unparseable,
    Error(String),
}

type ParseFn = Box<dyn Fn(&str, bool) -> ParseReply + Send + Sync>;

/// A [`TextModel`] whose answers are fixed up front.
///
/// `normalize_references` echoes its input unless a reply is scripted,
/// `choose_heading` fails unless a heading is scripted, and
/// `parse_citations` pops scripted replies before falling back to the
/// parser function (by default: every input is unparseable).
pub struct MockModel {
    normalize: Mutex<Option<Result<String, String>>>,
    heading: Mutex<Option<Result<String, String>>>,
    parse_sequence: Mutex<Vec<ParseReply>>,
    parser: ParseFn,
    normalize_calls: AtomicUsize,
    heading_calls: AtomicUsize,
    parse_calls: AtomicUsize,
    parse_inputs: Mutex<Vec<(String, bool)>>,
}

impl Default for MockModel {
    fn default() -> Self {
        Self {
            normalize: Mutex::new(None),
            heading: Mutex::new(None),
            parse_sequence: Mutex::new(Vec::new()),
            parser: Box::new(|_, _| ParseReply::Unparseable),
            normalize_calls: AtomicUsize::new(0),
            heading_calls: AtomicUsize::new(0),
            parse_calls: AtomicUsize::new(0),
            parse_inputs: Mutex::new(Vec::new()),
        }
    }
}

impl MockModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// A model that parses each citation by taking its text as the title.
    ///
    /// Batched input is split on blank lines and answered as
    /// `{"citations": [...]}`.
    pub fn title_echo() -> Self {
        Self::default().with_parser(|text, batched| {
            let item = |t: &str| serde_json::json!({ "title": t.trim() });
            if batched {
                let citations: Vec<Value> = text
                    .split("\n\n")
                    .filter(|t| !t.trim().is_empty())
                    .map(item)
                    .collect();
                ParseReply::Value(serde_json::json!({ "citations": citations }))
            } else {
                ParseReply::Value(item(text))
            }
        })
    }

    pub fn with_parser(
        mut self,
        parser: impl Fn(&str, bool) -> ParseReply + Send + Sync + 'static,
    ) -> Self {
        self.parser = Box::new(parser);
        self
    }

    /// Replies consumed in order before the parser function is used.
    pub fn with_parse_sequence(self, mut replies: Vec<ParseReply>) -> Self {
        replies.reverse();
        if let Ok(mut seq) = self.parse_sequence.lock() {
            *seq = replies;
        }
        self
    }

    pub fn with_normalized(self, reply: Result<String, String>) -> Self {
        if let Ok(mut slot) = self.normalize.lock() {
            *slot = Some(reply);
        }
        self
    }

    pub fn with_heading(self, reply: Result<String, String>) -> Self {
        if let Ok(mut slot) = self.heading.lock() {
            *slot = Some(reply);
        }
        self
    }

    pub fn normalize_calls(&self) -> usize {
        self.normalize_calls.load(Ordering::SeqCst)
    }

    pub fn heading_calls(&self) -> usize {
        self.heading_calls.load(Ordering::SeqCst)
    }

    pub fn parse_calls(&self) -> usize {
        self.parse_calls.load(Ordering::SeqCst)
    }

    /// Texts passed to `parse_citations`, with their `batched` flag.
    pub fn parse_inputs(&self) -> Vec<(String, bool)> {
        self.parse_inputs.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

impl TextModel for MockModel {
    fn name(&self) -> &str {
        "mock"
    }

    fn normalize_references<'a>(&'a self, raw: &'a str) -> ModelFuture<'a, String> {
        self.normalize_calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self.normalize.lock().ok().and_then(|s| s.clone());
        Box::pin(async move {
            match scripted {
                Some(Ok(text)) => Ok(text),
                Some(Err(msg)) => Err(LlmError::Other(msg)),
                None => Ok(raw.to_string()),
            }
        })
    }

    fn choose_heading<'a>(&'a self, _candidates: &'a [String]) -> ModelFuture<'a, HeadingChoice> {
        self.heading_calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self.heading.lock().ok().and_then(|s| s.clone());
        Box::pin(async move {
            match scripted {
                Some(Ok(heading)) => Ok(HeadingChoice { heading }),
                Some(Err(msg)) => Err(LlmError::Other(msg)),
                None => Err(LlmError::Other("no heading scripted".into())),
            }
        })
    }

    fn parse_citations<'a>(&'a self, text: &'a str, batched: bool) -> ModelFuture<'a, Option<Value>> {
        self.parse_calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut inputs) = self.parse_inputs.lock() {
            inputs.push((text.to_string(), batched));
        }
        let reply = self
            .parse_sequence
            .lock()
            .ok()
            .and_then(|mut seq| seq.pop())
            .unwrap_or_else(|| (self.parser)(text, batched));
        Box::pin(async move {
            match reply {
                ParseReply::Value(v) => Ok(Some(v)),
                ParseReply::Unparseable => Ok(None),
                ParseReply::Error(msg) => Err(LlmError::Other(msg)),
            }
        })
    }
}
