use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{Config, CoreError, RateLimiters};

/// On-disk TOML configuration.
/// Every field is optional so partial files layer over defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    pub api_keys: Option<ApiKeysConfig>,
    pub sources: Option<SourcesConfig>,
    pub extraction: Option<ExtractionConfig>,
    pub llm: Option<LlmFileConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiKeysConfig {
    pub s2_api_key: Option<String>,
    pub opencitations_token: Option<String>,
    pub llm_api_key: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourcesConfig {
    pub searxng_url: Option<String>,
    pub disabled: Option<Vec<String>>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionConfig {
    pub batch_size: Option<usize>,
    pub document_head_chars: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmFileConfig {
    pub api_base: Option<String>,
    pub model: Option<String>,
    pub timeout_secs: Option<u64>,
}

/// Platform config path: `<config_dir>/citeweaver/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("citeweaver").join("config.toml"))
}

/// Load config by cascading `./.citeweaver.toml` over the platform config.
/// Values from the working directory win.
pub fn load_config() -> ConfigFile {
    let platform = config_path().and_then(|p| load_from_path(&p));
    let cwd = load_from_path(Path::new(".citeweaver.toml"));

    match (platform, cwd) {
        (None, None) => ConfigFile::default(),
        (Some(p), None) => p,
        (None, Some(c)) => c,
        (Some(p), Some(c)) => merge(p, c),
    }
}

/// Load a config file, or `None` if it is missing or unreadable. Parse
/// errors are logged.
pub fn load_from_path(path: &Path) -> Option<ConfigFile> {
    if !path.exists() {
        return None;
    }
    match read_config(path) {
        Ok(config) => Some(config),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable config file");
            None
        }
    }
}

/// Read and parse a config file, reporting why it failed.
pub fn read_config(path: &Path) -> Result<ConfigFile, CoreError> {
    let content = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Take a value from `overlay`'s section if present, else from `base`'s.
fn pick<S, T>(overlay: &Option<S>, base: &Option<S>, field: impl Fn(&S) -> Option<T>) -> Option<T> {
    overlay
        .as_ref()
        .and_then(&field)
        .or_else(|| base.as_ref().and_then(&field))
}

/// Merge two configs: `overlay` values take precedence over `base`.
pub fn merge(base: ConfigFile, overlay: ConfigFile) -> ConfigFile {
    let (bk, ok) = (&base.api_keys, &overlay.api_keys);
    let (bs, os) = (&base.sources, &overlay.sources);
    let (be, oe) = (&base.extraction, &overlay.extraction);
    let (bl, ol) = (&base.llm, &overlay.llm);

    ConfigFile {
        api_keys: Some(ApiKeysConfig {
            s2_api_key: pick(ok, bk, |a| a.s2_api_key.clone()),
            opencitations_token: pick(ok, bk, |a| a.opencitations_token.clone()),
            llm_api_key: pick(ok, bk, |a| a.llm_api_key.clone()),
        }),
        sources: Some(SourcesConfig {
            searxng_url: pick(os, bs, |s| s.searxng_url.clone()),
            disabled: pick(os, bs, |s| s.disabled.clone()),
            timeout_secs: pick(os, bs, |s| s.timeout_secs),
        }),
        extraction: Some(ExtractionConfig {
            batch_size: pick(oe, be, |e| e.batch_size),
            document_head_chars: pick(oe, be, |e| e.document_head_chars),
        }),
        llm: Some(LlmFileConfig {
            api_base: pick(ol, bl, |l| l.api_base.clone()),
            model: pick(ol, bl, |l| l.model.clone()),
            timeout_secs: pick(ol, bl, |l| l.timeout_secs),
        }),
    }
}

impl ConfigFile {
    /// Overlay the values present in this file onto `config`.
    pub fn apply_to(&self, config: &mut Config) {
        if let Some(ref keys) = self.api_keys {
            if keys.s2_api_key.is_some() {
                config.s2_api_key = keys.s2_api_key.clone();
            }
            if keys.opencitations_token.is_some() {
                config.opencitations_token = keys.opencitations_token.clone();
            }
            if keys.llm_api_key.is_some() {
                config.llm.api_key = keys.llm_api_key.clone();
            }
        }
        if let Some(ref sources) = self.sources {
            if sources.searxng_url.is_some() {
                config.searxng_url = sources.searxng_url.clone();
            }
            if let Some(ref disabled) = sources.disabled {
                config.disabled_sources = disabled.clone();
            }
            if let Some(secs) = sources.timeout_secs {
                config.lookup_timeout_secs = secs;
            }
        }
        if let Some(ref extraction) = self.extraction {
            if let Some(n) = extraction.batch_size {
                config.batch_size = n.max(1);
            }
            if let Some(n) = extraction.document_head_chars {
                config.document_head_chars = n;
            }
        }
        if let Some(ref llm) = self.llm {
            if let Some(ref base) = llm.api_base {
                config.llm.api_base = base.clone();
            }
            if let Some(ref model) = llm.model {
                config.llm.model = model.clone();
            }
            if let Some(secs) = llm.timeout_secs {
                config.llm.timeout_secs = secs;
            }
        }
        config.rate_limiters = Arc::new(RateLimiters::new(config.s2_api_key.is_some()));
    }

    /// A file holding every non-secret setting of `config`. API keys are
    /// left out so they stay in the environment.
    pub fn from_config(config: &Config) -> Self {
        ConfigFile {
            api_keys: None,
            sources: Some(SourcesConfig {
                searxng_url: config.searxng_url.clone(),
                disabled: Some(config.disabled_sources.clone()),
                timeout_secs: Some(config.lookup_timeout_secs),
            }),
            extraction: Some(ExtractionConfig {
                batch_size: Some(config.batch_size),
                document_head_chars: Some(config.document_head_chars),
            }),
            llm: Some(LlmFileConfig {
                api_base: Some(config.llm.api_base.clone()),
                model: Some(config.llm.model.clone()),
                timeout_secs: Some(config.llm.timeout_secs),
            }),
        }
    }
}

/// Save the config to the platform config directory.
pub fn save_config(config: &ConfigFile) -> Result<PathBuf, CoreError> {
    let path = config_path()
        .ok_or_else(|| CoreError::Config("could not determine config directory".into()))?;
    save_to_path(config, &path)?;
    Ok(path)
}

pub fn save_to_path(config: &ConfigFile, path: &Path) -> Result<(), CoreError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sources_round_trip_toml() {
        let config = ConfigFile {
            sources: Some(SourcesConfig {
                searxng_url: Some("http://localhost:8080".to_string()),
                disabled: Some(vec!["arXiv".to_string()]),
                ..Default::default()
            }),
            ..Default::default()
        };
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: ConfigFile = toml::from_str(&toml_str).unwrap();
        let sources = parsed.sources.unwrap();
        assert_eq!(sources.searxng_url.as_deref(), Some("http://localhost:8080"));
        assert_eq!(sources.disabled.unwrap(), vec!["arXiv"]);
    }

    #[test]
    fn partial_file_parses() {
        let parsed: ConfigFile = toml::from_str("[extraction]\nbatch_size = 5\n").unwrap();
        assert_eq!(parsed.extraction.unwrap().batch_size, Some(5));
        assert!(parsed.api_keys.is_none());
    }

    #[test]
    fn merge_overlay_wins_and_base_fills() {
        let base = ConfigFile {
            sources: Some(SourcesConfig {
                searxng_url: Some("http://base:8080".into()),
                timeout_secs: Some(20),
                ..Default::default()
            }),
            ..Default::default()
        };
        let overlay = ConfigFile {
            sources: Some(SourcesConfig {
                searxng_url: Some("http://overlay:8080".into()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let merged = merge(base, overlay);
        let sources = merged.sources.unwrap();
        assert_eq!(sources.searxng_url.as_deref(), Some("http://overlay:8080"));
        assert_eq!(sources.timeout_secs, Some(20));
    }

    #[test]
    fn apply_to_overrides_only_present_values() {
        let file: ConfigFile = toml::from_str(
            r#"
[api_keys]
s2_api_key = "key"

[extraction]
batch_size = 0

[llm]
model = "llama3"
"#,
        )
        .unwrap();
        let mut config = Config::default();
        file.apply_to(&mut config);
        assert_eq!(config.s2_api_key.as_deref(), Some("key"));
        assert_eq!(config.batch_size, 1, "batch size is clamped to at least 1");
        assert_eq!(config.llm.model, "llama3");
        assert_eq!(config.document_head_chars, 1000);
        assert!(config.searxng_url.is_none());
    }

    #[test]
    fn read_config_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[sources\nnot toml").unwrap();
        assert!(matches!(read_config(&path), Err(CoreError::TomlParse(_))));
        assert!(load_from_path(&path).is_none());
    }

    #[test]
    fn save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let config = ConfigFile {
            extraction: Some(ExtractionConfig {
                batch_size: Some(4),
                document_head_chars: None,
            }),
            ..Default::default()
        };
        save_to_path(&config, &path).unwrap();
        let loaded = load_from_path(&path).unwrap();
        assert_eq!(loaded.extraction.unwrap().batch_size, Some(4));
    }

    #[test]
    fn written_settings_reload_without_secrets() {
        let mut original = Config::default();
        original.batch_size = 3;
        original.llm.model = "llama3".into();
        original.s2_api_key = Some("secret".into());
        original.disabled_sources = vec!["Web Search".into()];

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        save_to_path(&ConfigFile::from_config(&original), &path).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(!written.contains("secret"));

        let mut reloaded = Config::default();
        read_config(&path).unwrap().apply_to(&mut reloaded);
        assert_eq!(reloaded.batch_size, 3);
        assert_eq!(reloaded.llm.model, "llama3");
        assert_eq!(reloaded.disabled_sources, vec!["Web Search"]);
        assert!(reloaded.s2_api_key.is_none());
    }
}
