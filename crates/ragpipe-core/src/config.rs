//! Pipeline configuration

use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::{Error, GenerationConfig, IndexingConfig, Result};

/// Which embedder turns text into vectors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// Local feature-hashing embedder, no network
    Hash,
    /// OpenAI-compatible `/embeddings` endpoint
    OpenAI,
}

impl FromStr for EmbeddingBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "hash" | "local" => Ok(EmbeddingBackend::Hash),
            "openai" => Ok(EmbeddingBackend::OpenAI),
            other => Err(Error::Configuration(format!(
                "unknown embedding backend '{}' (expected hash or openai)",
                other
            ))),
        }
    }
}

/// Where chunk vectors live
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorBackend {
    /// In-process index, optionally persisted to `index_path`
    Memory,
    /// Qdrant collection at `vector_url`
    Qdrant,
}

impl FromStr for VectorBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "memory" | "local" => Ok(VectorBackend::Memory),
            "qdrant" => Ok(VectorBackend::Qdrant),
            other => Err(Error::Configuration(format!(
                "unknown vector backend '{}' (expected memory or qdrant)",
                other
            ))),
        }
    }
}

/// Configuration for the retrieval pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Directory ingested at startup; `None` serves whatever the index holds
    pub data_dir: Option<PathBuf>,
    /// Number of nearest neighbours requested per query
    pub top_k: usize,
    /// Matches scoring below this are dropped
    pub min_score: Option<f32>,
    /// Metadata key holding the passage text
    pub text_field: String,
    /// Upper bound on the assembled context, in characters
    pub max_context_chars: Option<usize>,
    /// Forward prior chat turns to the model
    pub include_history: bool,
    pub embedding_backend: EmbeddingBackend,
    pub embedding_model: String,
    pub embedding_dim: usize,
    pub vector_backend: VectorBackend,
    pub vector_url: String,
    pub collection: String,
    /// Snapshot file for the in-memory index
    pub index_path: Option<PathBuf>,
    pub llm_model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_dir: Some(PathBuf::from("./data")),
            top_k: 4,
            min_score: None,
            text_field: "text".to_string(),
            max_context_chars: None,
            include_history: false,
            embedding_backend: EmbeddingBackend::Hash,
            embedding_model: "text-embedding-3-small".to_string(),
            embedding_dim: 384,
            vector_backend: VectorBackend::Memory,
            vector_url: "http://localhost:6334".to_string(),
            collection: "knowledge_base".to_string(),
            index_path: None,
            llm_model: "gpt-3.5-turbo".to_string(),
            temperature: 0.7,
            max_tokens: 500,
            timeout_secs: 60,
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

impl PipelineConfig {
    /// Create configuration from environment variables (and `.env`)
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup, starting from defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(dir) = lookup("RAG_DATA_DIR") {
            config.data_dir = if dir.trim().is_empty() {
                None
            } else {
                Some(PathBuf::from(dir))
            };
        }
        if let Some(v) = parse_var(&lookup, "RAG_TOP_K")? {
            config.top_k = v;
        }
        if let Some(v) = parse_var(&lookup, "RAG_MIN_SCORE")? {
            config.min_score = Some(v);
        }
        if let Some(v) = lookup("RAG_TEXT_FIELD") {
            config.text_field = v;
        }
        if let Some(v) = parse_var(&lookup, "RAG_MAX_CONTEXT_CHARS")? {
            config.max_context_chars = Some(v);
        }
        if let Some(v) = parse_var(&lookup, "RAG_INCLUDE_HISTORY")? {
            config.include_history = v;
        }
        if let Some(v) = parse_var(&lookup, "RAG_EMBEDDING_BACKEND")? {
            config.embedding_backend = v;
        }
        if let Some(v) = lookup("RAG_EMBEDDING_MODEL") {
            config.embedding_model = v;
        }
        if let Some(v) = parse_var(&lookup, "RAG_EMBEDDING_DIM")? {
            config.embedding_dim = v;
        }
        if let Some(v) = parse_var(&lookup, "RAG_VECTOR_BACKEND")? {
            config.vector_backend = v;
        }
        if let Some(v) = lookup("RAG_VECTOR_URL") {
            config.vector_url = v;
        }
        if let Some(v) = lookup("RAG_COLLECTION") {
            config.collection = v;
        }
        if let Some(v) = lookup("RAG_INDEX_PATH") {
            config.index_path = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("RAG_LLM_MODEL") {
            config.llm_model = v;
        }
        if let Some(v) = parse_var(&lookup, "RAG_TEMPERATURE")? {
            config.temperature = v;
        }
        if let Some(v) = parse_var(&lookup, "RAG_MAX_TOKENS")? {
            config.max_tokens = v;
        }
        if let Some(v) = parse_var(&lookup, "RAG_TIMEOUT_SECS")? {
            config.timeout_secs = v;
        }
        if let Some(v) = parse_var(&lookup, "RAG_CHUNK_SIZE")? {
            config.chunk_size = v;
        }
        if let Some(v) = parse_var(&lookup, "RAG_CHUNK_OVERLAP")? {
            config.chunk_overlap = v;
        }

        Ok(config)
    }

    /// Check every field once, before any component is built
    pub fn validate(&self) -> Result<()> {
        if self.top_k == 0 {
            return Err(Error::Configuration("top_k must be at least 1".to_string()));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(Error::Configuration(format!(
                "temperature must be within 0.0..=2.0, got {}",
                self.temperature
            )));
        }
        if self.max_tokens == 0 {
            return Err(Error::Configuration("max_tokens must be at least 1".to_string()));
        }
        if self.timeout_secs == 0 {
            return Err(Error::Configuration("timeout_secs must be at least 1".to_string()));
        }
        if self.text_field.trim().is_empty() {
            return Err(Error::Configuration("text_field must not be empty".to_string()));
        }
        if self.embedding_dim == 0 {
            return Err(Error::Configuration("embedding_dim must be at least 1".to_string()));
        }
        if self.chunk_size == 0 || self.chunk_overlap >= self.chunk_size {
            return Err(Error::Configuration(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if let Some(min_score) = self.min_score {
            if !min_score.is_finite() {
                return Err(Error::Configuration("min_score must be finite".to_string()));
            }
        }
        if self.max_context_chars == Some(0) {
            return Err(Error::Configuration(
                "max_context_chars must be at least 1 when set".to_string(),
            ));
        }
        if self.vector_backend == VectorBackend::Qdrant {
            if self.collection.trim().is_empty() {
                return Err(Error::Configuration("collection must not be empty".to_string()));
            }
            url::Url::parse(&self.vector_url).map_err(|e| {
                Error::Configuration(format!("invalid vector_url '{}': {}", self.vector_url, e))
            })?;
        }
        Ok(())
    }

    /// Generation parameters for the responder
    pub fn generation_config(&self) -> GenerationConfig {
        GenerationConfig {
            model_id: self.llm_model.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }

    /// Chunking parameters for the indexer
    pub fn indexing_config(&self) -> IndexingConfig {
        IndexingConfig {
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
            ..Default::default()
        }
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| Error::Configuration(format!("{}='{}': {}", key, raw, e))),
    }
}
