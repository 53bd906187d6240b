use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub mod citation;
pub mod config_file;
pub mod db;
pub mod identifiers;
pub mod llm;
pub mod matching;
pub mod orchestrator;
pub mod rate_limit;

// Re-export for convenience
pub use citation::Citation;
pub use db::{ExternalRecord, LookupQuery, LookupSource};
pub use llm::{HeadingChoice, LlmError, TextModel};
pub use orchestrator::{CascadeStep, Enricher, Sources};
pub use rate_limit::{LookupError, RateLimitedResult, RateLimiters};

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config file: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("could not serialize config: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

/// Pipeline stages, reported through [`ProgressEvent::Stage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    DocumentCitation,
    LocateSection,
    Normalize,
    Extract,
    Enrich,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::DocumentCitation => "extracting document citation",
            Stage::LocateSection => "locating references section",
            Stage::Normalize => "normalizing references",
            Stage::Extract => "extracting citations",
            Stage::Enrich => "enriching citations",
        };
        f.write_str(s)
    }
}

/// Progress events emitted while a document is processed.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    Stage {
        stage: Stage,
    },
    SectionLocated {
        heading: Option<String>,
        chars: usize,
    },
    BatchParsed {
        index: usize,
        total: usize,
        citations: usize,
    },
    /// Both attempts for a batch failed; its citations are lost.
    BatchSkipped {
        index: usize,
        total: usize,
    },
    LookupComplete {
        source: String,
        queried: usize,
        matched: usize,
        elapsed: Duration,
    },
    LookupFailed {
        source: String,
        message: String,
    },
    Enriched {
        index: usize,
        total: usize,
        title: String,
        filled: Vec<&'static str>,
    },
}

/// Settings for the language-model endpoint.
#[derive(Clone)]
pub struct LlmConfig {
    pub api_base: String,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            timeout_secs: 60,
        }
    }
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("api_base", &self.api_base)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("model", &self.model)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Runtime configuration for extraction and enrichment.
#[derive(Clone)]
pub struct Config {
    pub s2_api_key: Option<String>,
    pub opencitations_token: Option<String>,
    /// SearxNG base URL (e.g. "http://localhost:8080"). Web search stays
    /// disabled without it.
    pub searxng_url: Option<String>,
    /// Source names to leave out of the cascade (case-insensitive).
    pub disabled_sources: Vec<String>,
    pub lookup_timeout_secs: u64,
    /// Raw citations sent to the parser per call.
    pub batch_size: usize,
    /// Characters from the start of the document used to extract the
    /// document's own citation.
    pub document_head_chars: usize,
    pub llm: LlmConfig,
    pub rate_limiters: Arc<RateLimiters>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("s2_api_key", &self.s2_api_key.as_ref().map(|_| "***"))
            .field(
                "opencitations_token",
                &self.opencitations_token.as_ref().map(|_| "***"),
            )
            .field("searxng_url", &self.searxng_url)
            .field("disabled_sources", &self.disabled_sources)
            .field("lookup_timeout_secs", &self.lookup_timeout_secs)
            .field("batch_size", &self.batch_size)
            .field("document_head_chars", &self.document_head_chars)
            .field("llm", &self.llm)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            s2_api_key: None,
            opencitations_token: None,
            searxng_url: None,
            disabled_sources: vec![],
            lookup_timeout_secs: 10,
            batch_size: 1,
            document_head_chars: 1000,
            llm: LlmConfig::default(),
            rate_limiters: Arc::new(RateLimiters::default()),
        }
    }
}

impl Config {
    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_secs(self.lookup_timeout_secs)
    }

    pub fn is_disabled(&self, source_name: &str) -> bool {
        self.disabled_sources
            .iter()
            .any(|d| d.trim().eq_ignore_ascii_case(source_name))
    }
}

/// Build the shared HTTP client used by every lookup source.
pub fn build_http_client() -> Result<reqwest::Client, CoreError> {
    let client = reqwest::Client::builder()
        .user_agent(concat!("citeweaver/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(client)
}
