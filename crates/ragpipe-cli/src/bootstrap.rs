//! Builds pipeline collaborators from configuration

use anyhow::{Context, Result};
use serde_json::{Value, json};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use ragpipe_core::{Embedder, EmbeddingBackend, PipelineConfig, VectorBackend, VectorIndex};
use ragpipe_openai::{OpenAIClient, OpenAIConfig};
use ragpipe_rag::{
    DirectoryLoader, HashEmbedder, LocalVectorStore, PipelineComponents, QdrantVectorStore,
    RagPipeline,
};

/// Command-line values that take precedence over the environment
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub top_k: Option<usize>,
    pub model: Option<String>,
    pub data_dir: Option<PathBuf>,
}

impl ConfigOverrides {
    pub fn apply(&self, config: &mut PipelineConfig) {
        if let Some(top_k) = self.top_k {
            config.top_k = top_k;
        }
        if let Some(model) = &self.model {
            config.llm_model = model.clone();
        }
        if let Some(dir) = &self.data_dir {
            config.data_dir = Some(dir.clone());
        }
    }
}

/// Read `RAG_*` settings, apply overrides, then validate
pub fn load_config(overrides: &ConfigOverrides) -> Result<PipelineConfig> {
    let mut config = PipelineConfig::from_env().context("Failed to read pipeline settings")?;
    overrides.apply(&mut config);
    config.validate().context("Invalid pipeline settings")?;
    Ok(config)
}

fn build_index(config: &PipelineConfig) -> Result<Arc<dyn VectorIndex>> {
    let index: Arc<dyn VectorIndex> = match config.vector_backend {
        VectorBackend::Memory => match &config.index_path {
            Some(path) => Arc::new(
                LocalVectorStore::open(path)
                    .with_context(|| format!("Failed to open index {}", path.display()))?,
            ),
            None => Arc::new(LocalVectorStore::new()),
        },
        VectorBackend::Qdrant => Arc::new(
            QdrantVectorStore::new(&config.vector_url, &config.collection, config.embedding_dim)
                .context("Failed to create Qdrant client")?,
        ),
    };
    Ok(index)
}

/// Wire up embedder, index, model client and loader for `config`
pub fn build_components(
    config: &PipelineConfig,
    openai: OpenAIConfig,
) -> Result<PipelineComponents> {
    let client = Arc::new(
        OpenAIClient::new(openai)
            .context("Failed to create model client")?
            .with_model(config.llm_model.clone())
            .with_embedding_model(config.embedding_model.clone())
            .with_timeout(Duration::from_secs(config.timeout_secs)),
    );

    let embedder: Arc<dyn Embedder> = match config.embedding_backend {
        EmbeddingBackend::Hash => Arc::new(HashEmbedder::new(config.embedding_dim)),
        EmbeddingBackend::OpenAI => client.clone(),
    };
    let index = build_index(config)?;

    info!(
        "Using {} embeddings and the {} index",
        Embedder::model_id(embedder.as_ref()),
        index.name()
    );

    Ok(PipelineComponents {
        embedder,
        index,
        llm: client,
        loader: Arc::new(DirectoryLoader::new()),
    })
}

/// Configuration plus components, not yet started
pub fn build_pipeline(config: PipelineConfig, openai: OpenAIConfig) -> Result<RagPipeline> {
    let components = build_components(&config, openai)?;
    Ok(RagPipeline::new(config, components))
}

/// Resolved settings for display, with the API key masked
pub fn redacted_settings(config: &PipelineConfig, openai: &OpenAIConfig) -> Value {
    let api_key = if openai.api_key.is_empty() {
        "(unset)"
    } else {
        "[redacted]"
    };

    json!({
        "pipeline": config,
        "openai": {
            "base_url": openai.base_url,
            "api_key": api_key,
        },
    })
}
