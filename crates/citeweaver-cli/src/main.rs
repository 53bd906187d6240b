use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use citeweaver_core::config_file::{self, ConfigFile};
use citeweaver_core::{Config, RateLimiters};
use citeweaver_ingest::{CitationPipeline, DocumentInput, ProgressEvent};
use citeweaver_reporting::{ExportFormat, Style, apply_style, export_citations, write_export};
use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod output;

use output::ColorMode;

/// Citation extractor - pull the references out of a document and enrich them
/// from bibliographic sources
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract, enrich and format the citations of a text or markdown document
    Process {
        /// Path to the document
        file_path: PathBuf,

        /// Citation style: ieee, apa, mla, chicago or harvard
        #[arg(long, default_value = "ieee")]
        style: Style,

        /// Output format: json or text
        #[arg(long, default_value = "json")]
        format: ExportFormat,

        /// Raw citations sent to the model per call
        #[arg(long)]
        batch_size: Option<usize>,

        /// Write results to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,

        /// Comma-separated list of lookup sources to disable
        #[arg(long, value_delimiter = ',')]
        disable_sources: Vec<String>,

        /// Semantic Scholar API key
        #[arg(long)]
        s2_api_key: Option<String>,

        /// SearxNG base URL for web search
        #[arg(long)]
        searxng_url: Option<String>,

        /// Language model name
        #[arg(long)]
        llm_model: Option<String>,
    },

    /// Show the headings and raw references of a document without calling
    /// any model or lookup source
    Locate {
        /// Path to the document
        file_path: PathBuf,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,
    },

    /// Write the current settings (without API keys) to a config file
    InitConfig {
        /// Destination; defaults to the platform config directory
        #[arg(long)]
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Flags that override configuration for `process`.
#[derive(Debug, Default)]
struct Overrides {
    batch_size: Option<usize>,
    disable_sources: Vec<String>,
    s2_api_key: Option<String>,
    searxng_url: Option<String>,
    llm_model: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Locate {
            file_path,
            no_color,
        } => locate(&file_path, ColorMode(!no_color)),
        Command::InitConfig { path, force } => init_config(path, force),
        Command::Process {
            file_path,
            style,
            format,
            batch_size,
            output,
            no_color,
            disable_sources,
            s2_api_key,
            searxng_url,
            llm_model,
        } => {
            let overrides = Overrides {
                batch_size,
                disable_sources,
                s2_api_key,
                searxng_url,
                llm_model,
            };
            process(
                file_path,
                style,
                format,
                output,
                ColorMode(!no_color),
                overrides,
            )
            .await
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Resolve configuration: CLI flags > env vars > config files > defaults
fn resolve_config(overrides: Overrides) -> Config {
    let mut config = Config::default();
    config_file::load_config().apply_to(&mut config);

    if let Some(key) = env_var("S2_API_KEY") {
        config.s2_api_key = Some(key);
    }
    if let Some(token) = env_var("OPENCITATIONS_TOKEN") {
        config.opencitations_token = Some(token);
    }
    if let Some(url) = env_var("SEARXNG_URL") {
        config.searxng_url = Some(url);
    }
    if let Some(key) = env_var("LLM_API_KEY") {
        config.llm.api_key = Some(key);
    }
    if let Some(base) = env_var("LLM_API_BASE") {
        config.llm.api_base = base;
    }
    if let Some(model) = env_var("LLM_MODEL") {
        config.llm.model = model;
    }
    if let Some(secs) = env_var("LOOKUP_TIMEOUT").and_then(|v| v.parse().ok()) {
        config.lookup_timeout_secs = secs;
    }

    if let Some(n) = overrides.batch_size {
        config.batch_size = n.max(1);
    }
    if !overrides.disable_sources.is_empty() {
        config.disabled_sources = overrides.disable_sources;
    }
    if overrides.s2_api_key.is_some() {
        config.s2_api_key = overrides.s2_api_key;
    }
    if overrides.searxng_url.is_some() {
        config.searxng_url = overrides.searxng_url;
    }
    if let Some(model) = overrides.llm_model {
        config.llm.model = model;
    }

    config.rate_limiters = Arc::new(RateLimiters::new(config.s2_api_key.is_some()));
    config
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

async fn process(
    file_path: PathBuf,
    style: Style,
    format: ExportFormat,
    output: Option<PathBuf>,
    color: ColorMode,
    overrides: Overrides,
) -> anyhow::Result<()> {
    if !file_path.exists() {
        anyhow::bail!("File not found: {}", file_path.display());
    }

    let config = resolve_config(overrides);
    tracing::debug!(?config, "resolved configuration");

    let pipeline = CitationPipeline::new(config)?;
    tracing::info!(sources = ?pipeline.sources().enabled_names(), "lookup sources enabled");

    let progress = move |event: ProgressEvent| {
        let mut err = std::io::stderr().lock();
        let _ = output::print_progress(&mut err, &event, color);
        let _ = err.flush();
    };

    eprintln!("Processing {}...", file_name(&file_path));
    let mut citations = pipeline
        .process_document(DocumentInput::Path(file_path), &progress)
        .await?;
    apply_style(&mut citations, style);

    match output {
        Some(path) => {
            write_export(&citations, format, &path)?;
            eprintln!("Wrote {} citations to {}", citations.len(), path.display());
        }
        None => {
            let rendered = export_citations(&citations, format)?;
            let mut out = std::io::stdout().lock();
            writeln!(out, "{}", rendered.trim_end())?;
        }
    }
    Ok(())
}

/// Keyword heuristic only: no model or network calls.
fn locate(file_path: &Path, color: ColorMode) -> anyhow::Result<()> {
    if !file_path.exists() {
        anyhow::bail!("File not found: {}", file_path.display());
    }
    let text = std::fs::read_to_string(file_path)?;

    let headings = citeweaver_parsing::find_headings(&text);
    let chosen = citeweaver_parsing::section::match_keyword_heading(&headings)
        .map(|h| h.text.clone());
    let raw_citations = match chosen.as_deref() {
        Some(heading) => citeweaver_parsing::split_citations(
            citeweaver_parsing::section::extract_section(&text, &headings, heading),
        ),
        None => Vec::new(),
    };

    let mut out = std::io::stdout().lock();
    output::print_located(
        &mut out,
        &file_name(file_path),
        &headings,
        chosen.as_deref(),
        &raw_citations,
        color,
    )?;
    Ok(())
}

fn init_config(path: Option<PathBuf>, force: bool) -> anyhow::Result<()> {
    let existing = path.clone().or_else(config_file::config_path);
    if let Some(target) = existing.filter(|p| p.exists())
        && !force
    {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            target.display()
        );
    }

    let file = ConfigFile::from_config(&resolve_config(Overrides::default()));
    let written = match path {
        Some(target) => {
            config_file::save_to_path(&file, &target)?;
            target
        }
        None => config_file::save_config(&file)?,
    };
    eprintln!("Wrote configuration to {}", written.display());
    Ok(())
}
