//! Assistant configuration.
//!
//! Every setting has a default and can be overridden from the environment
//! (a `.env` file is honoured by the binaries through `dotenvy`).

use crate::retrieval::{ChunkOptions, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const ENV_JOURNAL_PATH: &str = "JOURNAL_PATH";
pub const ENV_DOCUMENT_PATH: &str = "JOURNAL_DOCUMENT";
pub const ENV_INDEX_PATH: &str = "JOURNAL_INDEX_PATH";
pub const ENV_CHART_PATH: &str = "JOURNAL_CHART_PATH";
pub const ENV_OLLAMA_HOST: &str = "OLLAMA_HOST";
pub const ENV_MODEL: &str = "JOURNAL_MODEL";
pub const ENV_EMBED_MODEL: &str = "JOURNAL_EMBED_MODEL";
pub const ENV_TOP_K: &str = "JOURNAL_TOP_K";
pub const ENV_TURN_TIMEOUT: &str = "JOURNAL_TURN_TIMEOUT_SECS";
pub const ENV_WEB_ADDR: &str = "JOURNAL_WEB_ADDR";

/// Errors from loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// Configuration for a journaling session and its frontends.
#[derive(Debug, Clone, PartialEq)]
pub struct AssistantConfig {
    /// Journal store file.
    pub journal_path: PathBuf,

    /// Reference document used for follow-up questions.
    pub document_path: PathBuf,

    /// Cached embedding index for the reference document.
    pub index_path: PathBuf,

    /// Where the mood chart is written.
    pub chart_path: PathBuf,

    pub ollama_host: String,

    /// Chat model.
    pub model: String,

    /// Embedding model.
    pub embed_model: String,

    /// Passages retrieved per follow-up question.
    pub top_k: usize,

    /// Upper bound on a single conversation turn.
    pub turn_timeout: Duration,

    /// Listen address for the web frontend.
    pub web_addr: String,

    pub chunking: ChunkOptions,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            journal_path: PathBuf::from("journal.json"),
            document_path: PathBuf::from("CBT.md"),
            index_path: PathBuf::from("doc_index.json"),
            chart_path: PathBuf::from("mood_plot.svg"),
            ollama_host: ollama::DEFAULT_HOST.to_string(),
            model: "phi".to_string(),
            embed_model: "all-minilm".to_string(),
            top_k: 3,
            turn_timeout: Duration::from_secs(120),
            web_addr: "127.0.0.1:7860".to_string(),
            chunking: ChunkOptions {
                chunk_size: DEFAULT_CHUNK_SIZE,
                overlap: DEFAULT_CHUNK_OVERLAP,
            },
        }
    }
}

impl AssistantConfig {
    /// Load a `.env` file if one exists, then read the environment.
    pub fn load() -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(path) => tracing::debug!(path = %path.display(), "loaded .env"),
            Err(e) if e.not_found() => {}
            Err(e) => tracing::warn!(error = %e, "ignoring unreadable .env file"),
        }
        Self::from_env()
    }

    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup, falling back to defaults for
    /// missing or blank values.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(v) = get(ENV_JOURNAL_PATH) {
            config.journal_path = PathBuf::from(v);
        }
        if let Some(v) = get(ENV_DOCUMENT_PATH) {
            config.document_path = PathBuf::from(v);
        }
        if let Some(v) = get(ENV_INDEX_PATH) {
            config.index_path = PathBuf::from(v);
        }
        if let Some(v) = get(ENV_CHART_PATH) {
            config.chart_path = PathBuf::from(v);
        }
        if let Some(v) = get(ENV_OLLAMA_HOST) {
            config.ollama_host = v;
        }
        if let Some(v) = get(ENV_MODEL) {
            config.model = v;
        }
        if let Some(v) = get(ENV_EMBED_MODEL) {
            config.embed_model = v;
        }
        if let Some(v) = get(ENV_TOP_K) {
            config.top_k = parse_value(ENV_TOP_K, &v)?;
        }
        if let Some(v) = get(ENV_TURN_TIMEOUT) {
            let secs: u64 = parse_value(ENV_TURN_TIMEOUT, &v)?;
            if secs == 0 {
                return Err(ConfigError::Invalid {
                    key: ENV_TURN_TIMEOUT,
                    value: v,
                });
            }
            config.turn_timeout = Duration::from_secs(secs);
        }
        if let Some(v) = get(ENV_WEB_ADDR) {
            config.web_addr = v;
        }

        Ok(config)
    }

    /// Set the journal store path.
    pub fn with_journal_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.journal_path = path.into();
        self
    }

    /// Set the reference document path.
    pub fn with_document_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.document_path = path.into();
        self
    }

    pub fn with_index_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.index_path = path.into();
        self
    }

    pub fn with_chart_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.chart_path = path.into();
        self
    }

    /// Set the chat model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_top_k(mut self, k: usize) -> Self {
        self.top_k = k;
        self
    }

    /// Set the per-turn timeout.
    pub fn with_turn_timeout(mut self, timeout: Duration) -> Self {
        self.turn_timeout = timeout;
        self
    }

    /// Build the Ollama client this configuration describes.
    pub fn ollama(&self) -> ollama::Ollama {
        ollama::Ollama::new(ollama::normalize_host(&self.ollama_host))
            .with_model(&self.model)
            .with_embed_model(&self.embed_model)
    }
}

fn parse_value<T: FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        key,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AssistantConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, AssistantConfig::default());
        assert_eq!(config.journal_path, PathBuf::from("journal.json"));
        assert_eq!(config.model, "phi");
        assert_eq!(config.top_k, 3);
        assert_eq!(config.turn_timeout, Duration::from_secs(120));
        assert_eq!(config.chunking.chunk_size, 500);
        assert_eq!(config.chunking.overlap, 100);
    }

    #[test]
    fn test_overrides() {
        let config = AssistantConfig::from_lookup(lookup(&[
            ("JOURNAL_PATH", "/tmp/mine.json"),
            ("JOURNAL_MODEL", "llama3"),
            ("JOURNAL_TOP_K", " 5 "),
            ("JOURNAL_TURN_TIMEOUT_SECS", "30"),
            ("OLLAMA_HOST", "http://gpu-box:11434"),
        ]))
        .unwrap();

        assert_eq!(config.journal_path, PathBuf::from("/tmp/mine.json"));
        assert_eq!(config.model, "llama3");
        assert_eq!(config.top_k, 5);
        assert_eq!(config.turn_timeout, Duration::from_secs(30));
        assert_eq!(config.ollama().base_url(), "http://gpu-box:11434");
        assert_eq!(config.ollama().model(), "llama3");
    }

    #[test]
    fn test_blank_values_use_defaults() {
        let config = AssistantConfig::from_lookup(lookup(&[("JOURNAL_MODEL", "  ")])).unwrap();
        assert_eq!(config.model, "phi");
    }

    #[test]
    fn test_invalid_numbers() {
        let err = AssistantConfig::from_lookup(lookup(&[("JOURNAL_TOP_K", "three")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "JOURNAL_TOP_K", .. }));

        let err = AssistantConfig::from_lookup(lookup(&[("JOURNAL_TURN_TIMEOUT_SECS", "0")]))
            .unwrap_err();
        assert!(err.to_string().contains("JOURNAL_TURN_TIMEOUT_SECS"));
    }

    #[test]
    fn test_builders() {
        let config = AssistantConfig::default()
            .with_journal_path("a.json")
            .with_top_k(1)
            .with_turn_timeout(Duration::from_secs(5));
        assert_eq!(config.journal_path, PathBuf::from("a.json"));
        assert_eq!(config.top_k, 1);
        assert_eq!(config.turn_timeout, Duration::from_secs(5));
    }
}
