//! The retrieval-augmented generation pipeline

use futures::StreamExt;
use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, error, info};

use ragpipe_core::{
    ChatMessage, DocumentLoader, Embedder, Error, IndexingResult, LLMProvider, Match,
    PipelineConfig, Result, Role, TextStream, VectorIndex,
};

use crate::context::{AssembledContext, ContextAssembler};
use crate::document_indexer::DocumentIndexer;
use crate::responder::{GenerationOverrides, Responder};
use crate::retriever::{Retriever, RetrieverConfig};

/// Collaborators the pipeline is assembled from
#[derive(Clone)]
pub struct PipelineComponents {
    pub embedder: Arc<dyn Embedder>,
    pub index: Arc<dyn VectorIndex>,
    pub llm: Arc<dyn LLMProvider>,
    pub loader: Arc<dyn DocumentLoader>,
}

/// What startup did
#[derive(Debug, Clone, Default, Serialize)]
pub struct StartupReport {
    pub indexing: Option<IndexingResult>,
    pub records: usize,
}

/// A generated answer and the grounding it was given
#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    pub context: AssembledContext,
    pub matches: Vec<Match>,
}

/// Result of [`RagPipeline::pipe`]
pub enum PipeOutput {
    Text(String),
    Stream(TextStream),
}

impl PipeOutput {
    /// Collapse either form into one string
    pub async fn collect(self) -> String {
        match self {
            PipeOutput::Text(text) => text,
            PipeOutput::Stream(mut stream) => {
                let mut out = String::new();
                while let Some(chunk) = stream.next().await {
                    match chunk {
                        Ok(text) => out.push_str(&text),
                        Err(e) => {
                            out.push_str(&e.into_generation().user_message());
                            break;
                        }
                    }
                }
                out
            }
        }
    }
}

/// Retrieval, context assembly and generation behind one entry point.
///
/// Nothing is served until [`RagPipeline::on_startup`] has succeeded; until
/// then every query fails with [`Error::NotReady`].
pub struct RagPipeline {
    config: PipelineConfig,
    components: PipelineComponents,
    retriever: Retriever,
    assembler: ContextAssembler,
    responder: Responder,
    indexer: DocumentIndexer,
    state: OnceCell<StartupReport>,
}

impl RagPipeline {
    pub fn new(config: PipelineConfig, components: PipelineComponents) -> Self {
        let retriever = Retriever::new(
            components.embedder.clone(),
            components.index.clone(),
            RetrieverConfig {
                top_k: config.top_k,
                min_score: config.min_score,
            },
        );
        let assembler = ContextAssembler::new(config.text_field.clone())
            .with_max_chars(config.max_context_chars);
        let responder = Responder::new(components.llm.clone(), config.generation_config())
            .with_history(config.include_history);
        let indexer = DocumentIndexer::new(
            components.embedder.clone(),
            components.index.clone(),
            config.indexing_config(),
            config.text_field.clone(),
        );

        Self {
            config,
            components,
            retriever,
            assembler,
            responder,
            indexer,
            state: OnceCell::new(),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn is_ready(&self) -> bool {
        self.state.initialized()
    }

    /// Connect collaborators and ingest the data directory, once.
    ///
    /// Concurrent callers share a single initialisation. A failed startup
    /// leaves the pipeline not ready and may be retried.
    pub async fn on_startup(&self) -> Result<&StartupReport> {
        self.state
            .get_or_try_init(|| async {
                self.initialize()
                    .await
                    .map_err(Error::into_initialization)
            })
            .await
            .inspect_err(|e| error!("Pipeline startup failed: {}", e))
    }

    async fn initialize(&self) -> Result<StartupReport> {
        info!("Starting pipeline");
        self.config.validate()?;

        self.components.index.connect().await?;
        info!("Vector index ready: {}", self.components.index.name());

        self.components.llm.connect().await?;
        info!("Language model ready: {}", self.components.llm.model_id());

        let indexing = match &self.config.data_dir {
            Some(dir) => Some(self.ingest(dir).await?),
            None => None,
        };

        let records = self.components.index.count().await?;
        if records == 0 {
            return Err(Error::Initialization(
                "vector index is empty after ingestion".to_string(),
            ));
        }

        info!("Pipeline ready with {} indexed chunks", records);
        Ok(StartupReport { indexing, records })
    }

    /// Load, chunk, embed and store every document below `dir`
    pub async fn ingest(&self, dir: &Path) -> Result<IndexingResult> {
        self.components.index.connect().await?;

        let documents = self.components.loader.load(dir).await?;
        info!("Loaded {} documents from {}", documents.len(), dir.display());

        let result = self.indexer.index_documents(&documents).await?;
        self.components.index.flush().await?;
        Ok(result)
    }

    pub async fn on_shutdown(&self) -> Result<()> {
        if self.is_ready() {
            self.components.index.flush().await?;
        }
        info!("Pipeline stopped");
        Ok(())
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(Error::NotReady("startup has not completed".to_string()))
        }
    }

    /// Retrieve and assemble grounding for `query`
    pub async fn retrieve_context(&self, query: &str) -> Result<(Vec<Match>, AssembledContext)> {
        self.ensure_ready()?;

        let matches = self.retriever.retrieve(query).await?;
        let context = self.assembler.assemble_detailed(&matches);
        debug!(
            "Query matched {} passages, {} used, {} skipped",
            matches.len(),
            context.included_ids.len(),
            context.skipped.len()
        );
        Ok((matches, context))
    }

    pub async fn answer(
        &self,
        query: &str,
        history: &[ChatMessage],
        overrides: GenerationOverrides,
    ) -> Result<Answer> {
        let (matches, context) = self.retrieve_context(query).await?;
        let text = self
            .responder
            .respond(query, &context.text, history, overrides)
            .await?;

        Ok(Answer {
            text,
            context,
            matches,
        })
    }

    pub async fn answer_stream(
        &self,
        query: &str,
        history: &[ChatMessage],
        overrides: GenerationOverrides,
    ) -> Result<TextStream> {
        let (_, context) = self.retrieve_context(query).await?;
        Ok(self
            .responder
            .respond_stream(query, &context.text, history, overrides)
            .await)
    }

    /// Answer one chat request. Never fails: errors come back as text.
    pub async fn pipe(
        &self,
        user_message: &str,
        model_id: &str,
        messages: &[ChatMessage],
        body: &Value,
    ) -> PipeOutput {
        let stream = body.get("stream").and_then(Value::as_bool).unwrap_or(false);
        let overrides = GenerationOverrides::from_body(body);
        let history = prior_turns(messages, user_message);
        debug!("pipe: model={} stream={}", model_id, stream);

        if stream {
            match self.answer_stream(user_message, &history, overrides).await {
                Ok(stream) => PipeOutput::Stream(stream),
                Err(e) => {
                    error!("Query failed: {}", e);
                    let message = e.user_message();
                    PipeOutput::Stream(futures::stream::once(async move { Ok(message) }).boxed())
                }
            }
        } else {
            match self.answer(user_message, &history, overrides).await {
                Ok(answer) => PipeOutput::Text(answer.text),
                Err(e) => {
                    error!("Query failed: {}", e);
                    PipeOutput::Text(e.user_message())
                }
            }
        }
    }
}

/// Chat history without the trailing copy of the current user message
fn prior_turns(messages: &[ChatMessage], user_message: &str) -> Vec<ChatMessage> {
    match messages.split_last() {
        Some((last, rest)) if last.role == Role::User && last.content == user_message => {
            rest.to_vec()
        }
        _ => messages.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::HashEmbedder;
    use crate::mocks::{FailingIndex, RecordingLLM, StaticLoader};
    use crate::vector_store::LocalVectorStore;
    use ragpipe_core::Document;

    fn pipeline(loader: Arc<StaticLoader>, index: Arc<dyn VectorIndex>) -> RagPipeline {
        RagPipeline::new(
            PipelineConfig::default(),
            PipelineComponents {
                embedder: Arc::new(HashEmbedder::new(64)),
                index,
                llm: Arc::new(RecordingLLM::replying(&["ok"])),
                loader,
            },
        )
    }

    #[test]
    fn test_prior_turns_drops_current_message() {
        let messages = vec![
            ChatMessage::user("first"),
            ChatMessage::assistant("reply"),
            ChatMessage::user("second"),
        ];
        assert_eq!(prior_turns(&messages, "second").len(), 2);
        assert_eq!(prior_turns(&messages, "other").len(), 3);
        assert!(prior_turns(&[], "x").is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_startup_ingests_once() {
        let loader = Arc::new(StaticLoader::new(vec![Document::new("a.txt", "alpha")]));
        let pipeline = pipeline(loader.clone(), Arc::new(LocalVectorStore::new()));

        let (a, b) = tokio::join!(pipeline.on_startup(), pipeline.on_startup());
        assert_eq!(a.unwrap().records, 1);
        assert_eq!(b.unwrap().records, 1);
        assert_eq!(loader.loads(), 1);
        assert!(pipeline.is_ready());
    }

    #[tokio::test]
    async fn test_empty_index_fails_startup() {
        let loader = Arc::new(StaticLoader::new(vec![]));
        let pipeline = pipeline(loader, Arc::new(LocalVectorStore::new()));

        let err = pipeline.on_startup().await.unwrap_err();
        assert!(matches!(err, Error::Initialization(_)));
        assert!(!pipeline.is_ready());

        let output = pipeline.pipe("q", "rag", &[], &Value::Null).await;
        assert_eq!(output.collect().await, "Error: Index is not available.");
    }

    #[tokio::test]
    async fn test_unreachable_index_fails_startup() {
        let loader = Arc::new(StaticLoader::new(vec![Document::new("a.txt", "alpha")]));
        let pipeline = pipeline(loader, Arc::new(FailingIndex));

        assert!(matches!(
            pipeline.on_startup().await,
            Err(Error::Initialization(_))
        ));
    }

    #[tokio::test]
    async fn test_invalid_config_fails_startup() {
        let loader = Arc::new(StaticLoader::new(vec![Document::new("a.txt", "alpha")]));
        let pipeline = RagPipeline::new(
            PipelineConfig {
                top_k: 0,
                ..Default::default()
            },
            PipelineComponents {
                embedder: Arc::new(HashEmbedder::new(8)),
                index: Arc::new(LocalVectorStore::new()),
                llm: Arc::new(RecordingLLM::replying(&["ok"])),
                loader,
            },
        );

        let err = pipeline.on_startup().await.unwrap_err();
        assert_eq!(err.user_message(), "Error: The pipeline failed to initialize.");
    }
}
