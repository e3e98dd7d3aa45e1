//! Configuration loading and validation.
//!
//! Settings come from an optional TOML file, overlaid with environment
//! variables. Credentials are only ever read from the environment and are
//! resolved lazily by the commands that need them, so `ragdesk status` works
//! without any keys set.
//!
//! Environment access goes through an injected lookup function; only the
//! binary passes the real process environment.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::PipelineError;
use crate::state::HashAlgorithm;

pub const ENV_DATA_FOLDER: &str = "DATA_FOLDER";
pub const ENV_INDEX_NAME: &str = "PINECONE_INDEX_NAME";
pub const ENV_GEMINI_MODEL: &str = "GEMINI_MODEL";
pub const ENV_PINECONE_API_KEY: &str = "PINECONE_API_KEY";
pub const ENV_GOOGLE_API_KEY: &str = "GOOGLE_API_KEY";
pub const ENV_OPENAI_API_KEY: &str = "OPENAI_API_KEY";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub vector_store: VectorStoreConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(skip)]
    pub secrets: Secrets,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Relative paths resolve against the executable's directory.
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_hash_algorithm")]
    pub hash_algorithm: String,
    #[serde(default = "default_hash_chunk_size")]
    pub hash_chunk_size: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            state_file: default_state_file(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            batch_size: default_batch_size(),
            hash_algorithm: default_hash_algorithm(),
            hash_chunk_size: default_hash_chunk_size(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}
fn default_state_file() -> PathBuf {
    PathBuf::from("state.json")
}
// ~250 words; tuned to the embedding model's input budget.
fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    200
}
// Stays under the vector store's free-tier request limits.
fn default_batch_size() -> usize {
    50
}
fn default_hash_algorithm() -> String {
    "sha256".to_string()
}
fn default_hash_chunk_size() -> usize {
    4096
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "local".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct VectorStoreConfig {
    #[serde(default)]
    pub index_name: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            index_name: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: default_llm_model(),
            temperature: 0.0,
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

fn default_llm_model() -> String {
    "gemini-2.0-flash".to_string()
}
fn default_llm_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    6
}

/// Credentials read from the environment.
#[derive(Clone, Default)]
pub struct Secrets {
    pub pinecone_api_key: Option<String>,
    pub google_api_key: Option<String>,
    pub openai_api_key: Option<String>,
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mask = |v: &Option<String>| if v.is_some() { "<set>" } else { "<unset>" };
        f.debug_struct("Secrets")
            .field("pinecone_api_key", &mask(&self.pinecone_api_key))
            .field("google_api_key", &mask(&self.google_api_key))
            .field("openai_api_key", &mask(&self.openai_api_key))
            .finish()
    }
}

impl Config {
    /// Parse TOML (or start from defaults), overlay `env`, and validate.
    pub fn from_sources<F>(toml_src: Option<&str>, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config: Config = match toml_src {
            Some(src) => toml::from_str(src).with_context(|| "Failed to parse config file")?,
            None => Config::default(),
        };
        config.apply_env(env);
        config.validate()?;
        Ok(config)
    }

    fn apply_env<F>(&mut self, env: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        if let Some(dir) = get(ENV_DATA_FOLDER) {
            self.ingest.data_dir = PathBuf::from(dir);
        }
        if let Some(index) = get(ENV_INDEX_NAME) {
            self.vector_store.index_name = Some(index);
        }
        if let Some(model) = get(ENV_GEMINI_MODEL) {
            self.llm.model = model;
        }
        self.secrets = Secrets {
            pinecone_api_key: get(ENV_PINECONE_API_KEY),
            google_api_key: get(ENV_GOOGLE_API_KEY),
            openai_api_key: get(ENV_OPENAI_API_KEY),
        };
    }

    fn validate(&self) -> Result<()> {
        let ingest = &self.ingest;
        if ingest.chunk_size == 0 {
            bail!("ingest.chunk_size must be > 0");
        }
        if ingest.chunk_overlap >= ingest.chunk_size {
            bail!("ingest.chunk_overlap must be smaller than ingest.chunk_size");
        }
        if ingest.batch_size == 0 {
            bail!("ingest.batch_size must be > 0");
        }
        if ingest.hash_chunk_size == 0 {
            bail!("ingest.hash_chunk_size must be > 0");
        }
        if ingest.hash_algorithm.parse::<HashAlgorithm>().is_err() {
            bail!(
                "Unknown hash algorithm: '{}'. Must be sha224, sha256, sha384, or sha512.",
                ingest.hash_algorithm
            );
        }

        if self.retrieval.top_k < 1 {
            bail!("retrieval.top_k must be >= 1");
        }

        match self.embedding.provider.as_str() {
            "local" | "openai" => {}
            other => bail!(
                "Unknown embedding provider: '{}'. Must be local or openai.",
                other
            ),
        }
        if self.embedding.provider == "openai" && self.embedding.model.is_none() {
            bail!("embedding.model must be specified when provider is 'openai'");
        }
        if self.embedding.dims == Some(0) {
            bail!("embedding.dims must be > 0");
        }

        Ok(())
    }

    /// Absolute location of the state file.
    pub fn state_path(&self) -> PathBuf {
        let configured = &self.ingest.state_file;
        if configured.is_absolute() {
            return configured.clone();
        }
        let base = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."));
        base.join(configured)
    }

    pub fn require_index_name(&self) -> Result<&str, PipelineError> {
        self.vector_store
            .index_name
            .as_deref()
            .ok_or_else(|| PipelineError::MissingConfiguration(ENV_INDEX_NAME.to_string()))
    }

    pub fn require_pinecone_key(&self) -> Result<&str, PipelineError> {
        self.secrets
            .pinecone_api_key
            .as_deref()
            .ok_or_else(|| PipelineError::MissingConfiguration(ENV_PINECONE_API_KEY.to_string()))
    }

    pub fn require_google_key(&self) -> Result<&str, PipelineError> {
        self.secrets
            .google_api_key
            .as_deref()
            .ok_or_else(|| PipelineError::MissingConfiguration(ENV_GOOGLE_API_KEY.to_string()))
    }

    pub fn require_openai_key(&self) -> Result<&str, PipelineError> {
        self.secrets
            .openai_api_key
            .as_deref()
            .ok_or_else(|| PipelineError::MissingConfiguration(ENV_OPENAI_API_KEY.to_string()))
    }

    /// Check everything `ragdesk ingest` / `search` needs before any work starts.
    pub fn require_retrieval(&self) -> Result<(), PipelineError> {
        self.require_index_name()?;
        self.require_pinecone_key()?;
        if self.embedding.provider == "openai" {
            self.require_openai_key()?;
        }
        Ok(())
    }

    /// Everything `ragdesk chat` needs.
    pub fn require_chat(&self) -> Result<(), PipelineError> {
        self.require_google_key()?;
        self.require_retrieval()
    }
}

/// Load the config file if given and overlay the process environment.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let content = match path {
        Some(p) => Some(
            std::fs::read_to_string(p)
                .with_context(|| format!("Failed to read config file: {}", p.display()))?,
        ),
        None => None,
    };
    Config::from_sources(content.as_deref(), |key| std::env::var(key).ok())
}
