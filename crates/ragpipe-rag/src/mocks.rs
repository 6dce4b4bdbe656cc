//! Hand-written collaborator doubles for tests

use async_trait::async_trait;
use futures::StreamExt;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use ragpipe_core::{
    ChatMessage, Document, DocumentLoader, Embedder, Error, GenerationConfig, GenerationResult,
    IndexRecord, LLMProvider, QueryResponse, Result, TextStream, VectorIndex,
};

/// Returns the same vector for every text
pub struct StaticEmbedder {
    vector: Vec<f32>,
}

impl StaticEmbedder {
    pub fn new(vector: Vec<f32>) -> Self {
        Self { vector }
    }
}

#[async_trait]
impl Embedder for StaticEmbedder {
    fn model_id(&self) -> &str {
        "static"
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Ok(self.vector.clone())
    }
}

pub struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    fn model_id(&self) -> &str {
        "failing"
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(Error::Network("embedding service unreachable".to_string()))
    }
}

/// Answers every query with a fixed payload and remembers the last `k`
pub struct ScriptedIndex {
    response: QueryResponse,
    stored: usize,
    last_k: Mutex<Option<usize>>,
}

impl ScriptedIndex {
    pub fn new(response: QueryResponse) -> Self {
        Self {
            stored: response.ids.len(),
            response,
            last_k: Mutex::new(None),
        }
    }

    /// Report `stored` records from `count`, whatever `query` returns
    pub fn with_count(mut self, stored: usize) -> Self {
        self.stored = stored;
        self
    }

    pub fn last_k(&self) -> Option<usize> {
        *self.last_k.lock().unwrap()
    }
}

#[async_trait]
impl VectorIndex for ScriptedIndex {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn connect(&self) -> Result<()> {
        Ok(())
    }

    async fn upsert(&self, records: Vec<IndexRecord>) -> Result<usize> {
        Ok(records.len())
    }

    async fn query(&self, _vector: &[f32], k: usize) -> Result<QueryResponse> {
        *self.last_k.lock().unwrap() = Some(k);
        Ok(self.response.clone())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.stored)
    }

    async fn clear(&self) -> Result<()> {
        Ok(())
    }
}

pub struct FailingIndex;

#[async_trait]
impl VectorIndex for FailingIndex {
    fn name(&self) -> &str {
        "failing"
    }

    async fn connect(&self) -> Result<()> {
        Err(Error::VectorStore("connection refused".to_string()))
    }

    async fn upsert(&self, _records: Vec<IndexRecord>) -> Result<usize> {
        Err(Error::VectorStore("connection refused".to_string()))
    }

    async fn query(&self, _vector: &[f32], _k: usize) -> Result<QueryResponse> {
        Err(Error::VectorStore("connection refused".to_string()))
    }

    async fn count(&self) -> Result<usize> {
        Err(Error::VectorStore("connection refused".to_string()))
    }

    async fn clear(&self) -> Result<()> {
        Err(Error::VectorStore("connection refused".to_string()))
    }
}

/// How a [`RecordingLLM`] behaves
#[derive(Debug, Clone)]
pub enum LlmScript {
    /// Answer with these fragments (joined for blocking calls)
    Reply(Vec<String>),
    /// Fail before producing anything
    Fail,
    /// Stream these fragments, then fail
    FailMidStream(Vec<String>),
}

/// LLM double that records every prompt it receives
pub struct RecordingLLM {
    script: LlmScript,
    calls: Mutex<Vec<(Vec<ChatMessage>, GenerationConfig)>>,
}

impl RecordingLLM {
    pub fn new(script: LlmScript) -> Self {
        Self {
            script,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn replying(fragments: &[&str]) -> Self {
        Self::new(LlmScript::Reply(
            fragments.iter().map(|s| s.to_string()).collect(),
        ))
    }

    pub fn calls(&self) -> Vec<(Vec<ChatMessage>, GenerationConfig)> {
        self.calls.lock().unwrap().clone()
    }

    /// Content of the last message of the most recent call
    pub fn last_prompt(&self) -> Option<String> {
        self.calls
            .lock()
            .unwrap()
            .last()
            .and_then(|(messages, _)| messages.last())
            .map(|m| m.content.clone())
    }

    fn record(&self, messages: &[ChatMessage], config: &GenerationConfig) {
        self.calls
            .lock()
            .unwrap()
            .push((messages.to_vec(), config.clone()));
    }
}

#[async_trait]
impl LLMProvider for RecordingLLM {
    async fn connect(&self) -> Result<()> {
        Ok(())
    }

    async fn generate(
        &self,
        messages: &[ChatMessage],
        config: &GenerationConfig,
    ) -> Result<GenerationResult> {
        self.record(messages, config);
        match &self.script {
            LlmScript::Reply(fragments) => Ok(GenerationResult {
                text: fragments.concat(),
                model_id: config.model_id.clone(),
                tokens_used: None,
            }),
            LlmScript::Fail | LlmScript::FailMidStream(_) => {
                Err(Error::Authentication("invalid api key".to_string()))
            }
        }
    }

    async fn generate_stream(
        &self,
        messages: &[ChatMessage],
        config: &GenerationConfig,
    ) -> Result<TextStream> {
        self.record(messages, config);
        match &self.script {
            LlmScript::Reply(fragments) => {
                let items: Vec<Result<String>> = fragments.iter().cloned().map(Ok).collect();
                Ok(futures::stream::iter(items).boxed())
            }
            LlmScript::Fail => Err(Error::Authentication("invalid api key".to_string())),
            LlmScript::FailMidStream(fragments) => {
                let mut items: Vec<Result<String>> = fragments.iter().cloned().map(Ok).collect();
                items.push(Err(Error::Network("connection reset".to_string())));
                Ok(futures::stream::iter(items).boxed())
            }
        }
    }

    fn model_id(&self) -> &str {
        "recording"
    }
}

/// Loader returning a fixed set of documents and counting calls
pub struct StaticLoader {
    documents: Vec<Document>,
    loads: AtomicUsize,
}

impl StaticLoader {
    pub fn new(documents: Vec<Document>) -> Self {
        Self {
            documents,
            loads: AtomicUsize::new(0),
        }
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentLoader for StaticLoader {
    async fn load(&self, _dir: &Path) -> Result<Vec<Document>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        Ok(self.documents.clone())
    }
}
