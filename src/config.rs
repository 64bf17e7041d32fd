use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Directory where registered/downloaded files live.
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: default_upload_dir(),
        }
    }
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("./uploads")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_target_words")]
    pub target_words: usize,
    #[serde(default = "default_overlap_words")]
    pub overlap_words: usize,
    #[serde(default = "default_min_words")]
    pub min_words: usize,
    /// Minimum extracted-text length (chars) before a document may be indexed.
    #[serde(default = "default_min_index_chars")]
    pub min_index_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            target_words: default_target_words(),
            overlap_words: default_overlap_words(),
            min_words: default_min_words(),
            min_index_chars: default_min_index_chars(),
        }
    }
}

fn default_target_words() -> usize {
    500
}
fn default_overlap_words() -> usize {
    100
}
fn default_min_words() -> usize {
    50
}
fn default_min_index_chars() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// OpenAI-compatible embeddings endpoint base URL.
    #[serde(default = "default_embedding_base_url")]
    pub base_url: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    /// Fixed vector width for the process lifetime.
    #[serde(default = "default_dims")]
    pub dims: usize,
    /// Environment variable holding the API key, if the endpoint needs one.
    #[serde(default = "default_embedding_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: default_embedding_base_url(),
            model: default_embedding_model(),
            dims: default_dims(),
            api_key_env: default_embedding_key_env(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_embedding_base_url() -> String {
    "http://127.0.0.1:8081/v1".to_string()
}
fn default_embedding_model() -> String {
    "all-MiniLM-L6-v2".to_string()
}
fn default_dims() -> usize {
    384
}
fn default_embedding_key_env() -> String {
    "EMBEDDING_API_KEY".to_string()
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    /// OpenAI-compatible chat-completions endpoint base URL.
    #[serde(default = "default_generation_base_url")]
    pub base_url: String,
    #[serde(default = "default_generation_model")]
    pub model: String,
    #[serde(default = "default_generation_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            base_url: default_generation_base_url(),
            model: default_generation_model(),
            api_key_env: default_generation_key_env(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_generation_base_url() -> String {
    "https://api.groq.com/openai/v1".to_string()
}
fn default_generation_model() -> String {
    "llama-3.1-8b-instant".to_string()
}
fn default_generation_key_env() -> String {
    "GROQ_API_KEY".to_string()
}
fn default_temperature() -> f32 {
    0.3
}
fn default_max_tokens() -> u32 {
    500
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Default result count for free-text search.
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,
    /// Liberal threshold for free-text search (recall-oriented).
    #[serde(default = "default_search_min_similarity")]
    pub search_min_similarity: f64,
    /// Chunks fed to the generator per question.
    #[serde(default = "default_answer_limit")]
    pub answer_limit: usize,
    #[serde(default = "default_answer_min_similarity")]
    pub answer_min_similarity: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            search_limit: default_search_limit(),
            search_min_similarity: default_search_min_similarity(),
            answer_limit: default_answer_limit(),
            answer_min_similarity: default_answer_min_similarity(),
        }
    }
}

fn default_search_limit() -> usize {
    10
}
fn default_search_min_similarity() -> f64 {
    0.2
}
fn default_answer_limit() -> usize {
    5
}
fn default_answer_min_similarity() -> f64 {
    0.3
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:3000".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.chunking.target_words == 0 {
        anyhow::bail!("chunking.target_words must be > 0");
    }
    if config.chunking.min_words == 0 {
        anyhow::bail!("chunking.min_words must be > 0");
    }
    if config.chunking.overlap_words >= config.chunking.target_words {
        anyhow::bail!("chunking.overlap_words must be < chunking.target_words");
    }

    if config.embedding.dims == 0 {
        anyhow::bail!("embedding.dims must be > 0");
    }

    if !(0.0..=1.0).contains(&config.retrieval.search_min_similarity) {
        anyhow::bail!("retrieval.search_min_similarity must be in [0.0, 1.0]");
    }
    if !(0.0..=1.0).contains(&config.retrieval.answer_min_similarity) {
        anyhow::bail!("retrieval.answer_min_similarity must be in [0.0, 1.0]");
    }
    if config.retrieval.answer_limit == 0 || config.retrieval.search_limit == 0 {
        anyhow::bail!("retrieval limits must be >= 1");
    }

    if !(0.0..=2.0).contains(&config.generation.temperature) {
        anyhow::bail!("generation.temperature must be in [0.0, 2.0]");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config(extra: &str) -> Config {
        let toml_src = format!("[db]\npath = \"/tmp/dq.sqlite\"\n{}", extra);
        toml::from_str(&toml_src).unwrap()
    }

    #[test]
    fn defaults_are_valid() {
        let cfg = base_config("");
        assert!(validate(&cfg).is_ok());
        assert_eq!(cfg.chunking.target_words, 500);
        assert_eq!(cfg.embedding.dims, 384);
        assert_eq!(cfg.retrieval.answer_limit, 5);
    }

    #[test]
    fn overlap_must_stay_below_target() {
        let cfg = base_config("[chunking]\ntarget_words = 100\noverlap_words = 100\n");
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn similarity_bounds_are_enforced() {
        let cfg = base_config("[retrieval]\nanswer_min_similarity = 1.5\n");
        assert!(validate(&cfg).is_err());
    }
}
