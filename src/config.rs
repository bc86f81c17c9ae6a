use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub archive: ArchiveConfig,
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub confidence: ConfidenceConfig,
    #[serde(default)]
    pub websearch: WebSearchConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ArchiveConfig {
    /// Compressed knowledge-base archive (.zip of txt/md/pdf documents).
    pub path: PathBuf,
    /// Sidecar file holding the hex fingerprint of the last fully
    /// processed archive.
    pub state_path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    #[serde(default = "default_overlap_chars")]
    pub overlap_chars: usize,
}

fn default_max_chars() -> usize {
    1000
}
fn default_overlap_chars() -> usize {
    200
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: default_max_chars(),
            overlap_chars: default_overlap_chars(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// Index backend: `rest` (remote HTTP service) or `memory` (in-process,
    /// volatile; intended for local experiments and tests).
    #[serde(default = "default_index_provider")]
    pub provider: String,
    #[serde(default = "default_index_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_index_name")]
    pub name: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Optional similarity floor; retrieved chunks scoring below it are
    /// dropped before the orchestrator sees them.
    #[serde(default)]
    pub min_score: Option<f32>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            provider: default_index_provider(),
            endpoint: default_index_endpoint(),
            name: default_index_name(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            top_k: default_top_k(),
            min_score: None,
        }
    }
}

fn default_index_provider() -> String {
    "rest".to_string()
}
fn default_index_endpoint() -> String {
    "http://127.0.0.1:5080".to_string()
}
fn default_index_name() -> String {
    "harborlight".to_string()
}
fn default_batch_size() -> usize {
    50
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_top_k() -> usize {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            endpoint: default_embedding_endpoint(),
            model: default_embedding_model(),
            dims: default_dims(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_embedding_endpoint() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_dims() -> usize {
    1536
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_generation_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_generation_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_generation_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            endpoint: default_generation_endpoint(),
            model: default_generation_model(),
            temperature: default_temperature(),
            max_retries: default_max_retries(),
            timeout_secs: default_generation_timeout_secs(),
        }
    }
}

fn default_generation_endpoint() -> String {
    "https://openrouter.ai/api/v1".to_string()
}
fn default_generation_model() -> String {
    "deepseek/deepseek-chat-v3-0324:free".to_string()
}
fn default_temperature() -> f32 {
    0.3
}
fn default_generation_timeout_secs() -> u64 {
    60
}

/// Policy for the confidence gate. The detection rule is a substring
/// heuristic over the generated text; it is configuration, not a contract.
#[derive(Debug, Deserialize, Clone)]
pub struct ConfidenceConfig {
    #[serde(default = "default_uncertainty_markers")]
    pub uncertainty_markers: Vec<String>,
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            uncertainty_markers: default_uncertainty_markers(),
        }
    }
}

fn default_uncertainty_markers() -> Vec<String> {
    vec!["i don't know".to_string(), "no information".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct WebSearchConfig {
    #[serde(default = "default_websearch_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_websearch_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for WebSearchConfig {
    fn default() -> Self {
        Self {
            endpoint: default_websearch_endpoint(),
            timeout_secs: default_websearch_timeout_secs(),
        }
    }
}

fn default_websearch_endpoint() -> String {
    "https://api.duckduckgo.com".to_string()
}
fn default_websearch_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate chunking: the window must advance or chunking never terminates
    if config.chunking.max_chars == 0 {
        anyhow::bail!("chunking.max_chars must be > 0");
    }
    if config.chunking.overlap_chars >= config.chunking.max_chars {
        anyhow::bail!("chunking.overlap_chars must be < chunking.max_chars");
    }

    // Validate index
    match config.index.provider.as_str() {
        "rest" | "memory" => {}
        other => anyhow::bail!("Unknown index provider: '{}'. Must be rest or memory.", other),
    }
    if config.index.top_k == 0 {
        anyhow::bail!("index.top_k must be >= 1");
    }
    if config.index.batch_size == 0 {
        anyhow::bail!("index.batch_size must be > 0");
    }

    // Validate embedding
    if config.embedding.dims == 0 {
        anyhow::bail!("embedding.dims must be > 0");
    }
    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be > 0");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(dir: &tempfile::TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("harborlight.toml");
        std::fs::write(&path, body).unwrap();
        path
    }

    const MINIMAL: &str = r#"
[archive]
path = "kb.zip"
state_path = "data/last_fingerprint"

[chunking]
max_chars = 500
overlap_chars = 100

[server]
bind = "127.0.0.1:7410"
"#;

    #[test]
    fn minimal_config_loads_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, MINIMAL);
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.chunking.max_chars, 500);
        assert_eq!(cfg.index.provider, "rest");
        assert_eq!(cfg.index.top_k, 3);
        assert_eq!(cfg.embedding.dims, 1536);
        assert_eq!(cfg.confidence.uncertainty_markers.len(), 2);
    }

    #[test]
    fn overlap_must_be_smaller_than_window() {
        let dir = tempfile::tempdir().unwrap();
        let body = MINIMAL.replace("overlap_chars = 100", "overlap_chars = 500");
        let path = write_config(&dir, &body);
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn unknown_index_provider_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let body = format!("{}\n[index]\nprovider = \"pinecone\"\n", MINIMAL);
        let path = write_config(&dir, &body);
        assert!(load_config(&path).is_err());
    }
}
