//! Configuration parsing and validation.
//!
//! Loaded from a TOML file (default `config/gtc-qa.toml`). Only `[db]` and
//! `[storage]` are required; every other section has defaults.
//!
//! ```toml
//! [db]
//! path = "./data/gtc.sqlite"
//!
//! [storage]
//! documents_dir = "./data/documents"
//!
//! [server]
//! bind = "127.0.0.1:8000"
//!
//! [catalog]
//! endpoint = "https://gtc.nn.pl/gtc/services/GtcServiceHttpPort"
//!
//! [answer]
//! provider = "extractive"
//! top_k = 5
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable consulted when `server.api_key` is not set.
pub const API_KEY_ENV: &str = "API_KEY";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub answer: AnswerConfig,
    #[serde(default)]
    pub workers: WorkersConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Root for downloaded bodies (`<dir>/<body_id>/<file>`) and their indexes.
    pub documents_dir: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            api_key: None,
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct CatalogConfig {
    #[serde(default = "default_catalog_endpoint")]
    pub endpoint: String,
    /// Target namespace of the catalog's SOAP operations.
    #[serde(default = "default_catalog_namespace")]
    pub namespace: String,
    #[serde(default = "default_catalog_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            endpoint: default_catalog_endpoint(),
            namespace: default_catalog_namespace(),
            timeout_secs: default_catalog_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_catalog_endpoint() -> String {
    "https://gtc.nn.pl/gtc/services/GtcServiceHttpPort".to_string()
}
fn default_catalog_namespace() -> String {
    "http://service.gtc.nn.pl/".to_string()
}
fn default_catalog_timeout_secs() -> u64 {
    60
}
fn default_max_retries() -> u32 {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_max_tokens() -> usize {
    700
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_embedding_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            max_retries: default_embedding_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_embedding_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_embedding_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnswerConfig {
    /// `"extractive"` or `"openai"`.
    #[serde(default = "default_answer_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_hybrid_alpha")]
    pub hybrid_alpha: f64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_answer_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for AnswerConfig {
    fn default() -> Self {
        Self {
            provider: default_answer_provider(),
            model: None,
            top_k: default_top_k(),
            hybrid_alpha: default_hybrid_alpha(),
            max_retries: default_max_retries(),
            timeout_secs: default_answer_timeout_secs(),
        }
    }
}

fn default_answer_provider() -> String {
    "extractive".to_string()
}
fn default_top_k() -> usize {
    5
}
fn default_hybrid_alpha() -> f64 {
    0.6
}
fn default_answer_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct WorkersConfig {
    #[serde(default = "default_worker_count")]
    pub count: usize,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            count: default_worker_count(),
        }
    }
}

fn default_worker_count() -> usize {
    4
}

impl Config {
    /// Check value ranges and cross-field requirements.
    pub fn validate(&self) -> Result<()> {
        if self.chunking.max_tokens == 0 {
            bail!("chunking.max_tokens must be > 0");
        }

        if self.answer.top_k < 1 {
            bail!("answer.top_k must be >= 1");
        }
        if !(0.0..=1.0).contains(&self.answer.hybrid_alpha) {
            bail!("answer.hybrid_alpha must be in [0.0, 1.0]");
        }
        match self.answer.provider.as_str() {
            "extractive" => {}
            "openai" => {
                if self.answer.model.is_none() {
                    bail!("answer.model must be specified when provider is 'openai'");
                }
            }
            other => bail!(
                "Unknown answer provider: '{}'. Must be extractive or openai.",
                other
            ),
        }

        match self.embedding.provider.as_str() {
            "disabled" | "openai" => {}
            other => bail!(
                "Unknown embedding provider: '{}'. Must be disabled or openai.",
                other
            ),
        }
        if self.embedding.is_enabled() {
            if self.embedding.dims.is_none() || self.embedding.dims == Some(0) {
                bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    self.embedding.provider
                );
            }
            if self.embedding.model.is_none() {
                bail!(
                    "embedding.model must be specified when provider is '{}'",
                    self.embedding.provider
                );
            }
            if self.embedding.batch_size == 0 {
                bail!("embedding.batch_size must be > 0");
            }
        }

        if self.workers.count < 1 {
            bail!("workers.count must be >= 1");
        }

        if self.catalog.endpoint.trim().is_empty() {
            bail!("catalog.endpoint must not be empty");
        }

        Ok(())
    }

    /// Shared secret for the `x-api-key` header: `server.api_key`, else the
    /// `API_KEY` environment variable.
    pub fn api_key(&self) -> Result<String> {
        let key = match &self.server.api_key {
            Some(key) => key.clone(),
            None => std::env::var(API_KEY_ENV).with_context(|| {
                format!(
                    "No API key configured: set server.api_key or the {} environment variable",
                    API_KEY_ENV
                )
            })?,
        };
        if key.trim().is_empty() {
            bail!("API key must not be empty");
        }
        Ok(key)
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[db]
path = "/tmp/gtc.sqlite"

[storage]
documents_dir = "/tmp/documents"
"#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: Config = toml::from_str(MINIMAL).unwrap();
        config.validate().unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:8000");
        assert_eq!(config.chunking.max_tokens, 700);
        assert_eq!(config.answer.provider, "extractive");
        assert_eq!(config.answer.top_k, 5);
        assert_eq!(config.workers.count, 4);
        assert!(!config.embedding.is_enabled());
        assert_eq!(config.catalog.namespace, "http://service.gtc.nn.pl/");
    }

    #[test]
    fn test_rejects_out_of_range_values() {
        for extra in [
            "[chunking]\nmax_tokens = 0",
            "[answer]\nhybrid_alpha = 1.5",
            "[answer]\ntop_k = 0",
            "[workers]\ncount = 0",
            "[answer]\nprovider = \"magic\"",
            "[answer]\nprovider = \"openai\"",
            "[embedding]\nprovider = \"openai\"\nmodel = \"m\"",
            "[embedding]\nprovider = \"local\"",
        ] {
            let text = format!("{}\n{}", MINIMAL, extra);
            let config: Config = toml::from_str(&text).unwrap();
            assert!(config.validate().is_err(), "accepted: {}", extra);
        }
    }

    #[test]
    fn test_api_key_from_config() {
        let text = format!("{}\n[server]\napi_key = \"s3cret\"", MINIMAL);
        let config: Config = toml::from_str(&text).unwrap();
        assert_eq!(config.api_key().unwrap(), "s3cret");

        let text = format!("{}\n[server]\napi_key = \"  \"", MINIMAL);
        let config: Config = toml::from_str(&text).unwrap();
        assert!(config.api_key().is_err());
    }

    #[test]
    fn test_load_config_reports_missing_file() {
        let err = load_config(Path::new("/nonexistent/gtc-qa.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
