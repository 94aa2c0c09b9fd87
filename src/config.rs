use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub source: SourceConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// The catalog site to scrape and how to talk to it.
#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    /// Root URL of the catalog site, e.g. "https://catalog.example.edu".
    pub base_url: String,
    /// Department slugs with listing pages, e.g. ["cmpe", "seng"].
    pub departments: Vec<String>,
    /// Semester tags to scrape, e.g. ["Fall 2025", "Spring 2026"].
    pub semesters: Vec<String>,
    /// Sent on every request. The catalog site rejects default HTTP-library
    /// agents, so this defaults to a realistic browser string.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Retries per request after the initial attempt.
    #[serde(default = "default_fetch_retries")]
    pub max_retries: u32,
    /// First retry delay in milliseconds; doubles on each subsequent retry.
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/124.0.0.0 Safari/537.36"
        .to_string()
}
fn default_timeout_secs() -> u64 {
    10
}
fn default_fetch_retries() -> u32 {
    3
}
fn default_base_backoff_ms() -> u64 {
    1500
}

/// Batch orchestration knobs.
#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    /// Maximum number of courses processed concurrently within a batch.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Cosine similarity at or above which a re-scraped course counts as a
    /// duplicate of its stored version.
    #[serde(default = "default_dedup_threshold")]
    pub dedup_threshold: f32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            dedup_threshold: default_dedup_threshold(),
        }
    }
}

fn default_concurrency() -> usize {
    8
}
fn default_dedup_threshold() -> f32 {
    0.86
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// One of: "disabled", "openai", "ollama", "hash", "local".
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL override (Ollama host or an OpenAI-compatible endpoint).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Retries per embedding request after the initial attempt.
    #[serde(default = "default_embed_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embed_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            url: None,
            batch_size: 64,
            max_retries: 1,
            timeout_secs: 30,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_embed_retries() -> u32 {
    1
}
fn default_embed_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate source
    if config.source.base_url.trim().is_empty() {
        anyhow::bail!("source.base_url must not be empty");
    }
    if !config.source.base_url.starts_with("http://")
        && !config.source.base_url.starts_with("https://")
    {
        anyhow::bail!(
            "source.base_url must start with http:// or https://, got '{}'",
            config.source.base_url
        );
    }
    if config.source.departments.is_empty() {
        anyhow::bail!("source.departments must list at least one department");
    }
    if config.source.semesters.is_empty() {
        anyhow::bail!("source.semesters must list at least one semester tag");
    }

    // Validate pipeline
    if config.pipeline.concurrency == 0 {
        anyhow::bail!("pipeline.concurrency must be > 0");
    }
    if !(0.0..=1.0).contains(&config.pipeline.dedup_threshold) {
        anyhow::bail!("pipeline.dedup_threshold must be in [0.0, 1.0]");
    }

    // Validate embedding
    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.as_deref().unwrap_or("").is_empty() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.batch_size == 0 {
            anyhow::bail!("embedding.batch_size must be > 0");
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" | "hash" | "local" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, hash, or local.",
            other
        ),
    }

    Ok(config)
}
