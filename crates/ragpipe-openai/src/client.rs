//! OpenAI-compatible client implementation

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, warn};

use ragpipe_core::{
    ChatMessage, Embedder, Error, GenerationConfig, GenerationResult, LLMProvider, Result,
    TextStream,
};

use crate::config::OpenAIConfig;

/// Client for OpenAI-compatible chat-completion and embedding endpoints
pub struct OpenAIClient {
    config: OpenAIConfig,
    client: Client,
    chat_model: String,
    embedding_model: String,
    request_timeout: Duration,
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    total_tokens: u32,
}

#[derive(Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: Delta,
}

#[derive(Deserialize)]
struct Delta {
    content: Option<String>,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

/// One server-sent event line of a streamed completion
#[derive(Debug, PartialEq)]
pub(crate) enum SseEvent {
    Delta(String),
    Done,
    Skip,
}

/// Reassembles SSE lines from arbitrarily split network chunks
#[derive(Default)]
pub(crate) struct SseBuffer {
    pending: Vec<u8>,
}

impl SseBuffer {
    /// Feed raw bytes, returning every line completed by them
    pub(crate) fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw).trim().to_string();
            if !line.is_empty() {
                lines.push(line);
            }
        }
        lines
    }
}

pub(crate) fn parse_sse_line(line: &str) -> SseEvent {
    let Some(data) = line.strip_prefix("data:") else {
        return SseEvent::Skip;
    };
    let data = data.trim();

    if data.is_empty() {
        return SseEvent::Skip;
    }
    if data == "[DONE]" {
        return SseEvent::Done;
    }

    match serde_json::from_str::<StreamChunk>(data) {
        Ok(chunk) => chunk
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta.content)
            .filter(|content| !content.is_empty())
            .map(SseEvent::Delta)
            .unwrap_or(SseEvent::Skip),
        Err(e) => {
            warn!("Failed to parse stream line: {} - Error: {}", data, e);
            SseEvent::Skip
        }
    }
}

fn map_request_error(err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::Timeout(err.to_string())
    } else if err.is_decode() {
        Error::Serialization(err.to_string())
    } else {
        Error::Network(err.to_string())
    }
}

impl OpenAIClient {
    pub const DEFAULT_CHAT_MODEL: &'static str = "gpt-3.5-turbo";
    pub const DEFAULT_EMBEDDING_MODEL: &'static str = "text-embedding-3-small";
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

    /// Create a new client from configuration
    pub fn new(config: OpenAIConfig) -> Result<Self> {
        config.validate()?;

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::Network(e.to_string()))?;

        Ok(Self {
            config,
            client,
            chat_model: Self::DEFAULT_CHAT_MODEL.to_string(),
            embedding_model: Self::DEFAULT_EMBEDDING_MODEL.to_string(),
            request_timeout: Self::DEFAULT_TIMEOUT,
        })
    }

    /// Create a new client from environment variables
    pub fn from_env() -> Result<Self> {
        let config = OpenAIConfig::from_env()?;
        Self::new(config)
    }

    /// Set the default chat model
    pub fn with_model(mut self, model_id: impl Into<String>) -> Self {
        self.chat_model = model_id.into();
        self
    }

    /// Set the embedding model
    pub fn with_embedding_model(mut self, model_id: impl Into<String>) -> Self {
        self.embedding_model = model_id.into();
        self
    }

    /// Bound every embedding request, including reading its response
    pub fn with_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    fn post(&self, path: &str) -> RequestBuilder {
        let builder = self.client.post(self.config.endpoint(path));
        if self.config.api_key.is_empty() {
            builder
        } else {
            builder.bearer_auth(&self.config.api_key)
        }
    }

    async fn check_status(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(Error::Authentication(format!(
                "OpenAI API rejected credentials ({}): {}",
                status, error_text
            )));
        }

        Err(Error::Network(format!(
            "OpenAI API request failed with status {}: {}",
            status, error_text
        )))
    }

    /// Perform the actual completion request
    async fn perform_generation(
        &self,
        messages: &[ChatMessage],
        config: &GenerationConfig,
    ) -> Result<GenerationResult> {
        let request = ChatCompletionRequest {
            model: &config.model_id,
            messages,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            stream: false,
        };

        let response = self
            .post("chat/completions")
            .json(&request)
            .send()
            .await
            .map_err(map_request_error)?;
        let response = Self::check_status(response).await?;

        let body: ChatCompletionResponse = response.json().await.map_err(map_request_error)?;

        let text = body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(Error::Generation(
                "Empty response from chat completion API".to_string(),
            ));
        }

        Ok(GenerationResult {
            text,
            model_id: config.model_id.clone(),
            tokens_used: body.usage.map(|u| u.total_tokens),
        })
    }
}

#[async_trait]
impl LLMProvider for OpenAIClient {
    async fn connect(&self) -> Result<()> {
        let builder = self.client.get(self.config.endpoint("models"));
        let builder = if self.config.api_key.is_empty() {
            builder
        } else {
            builder.bearer_auth(&self.config.api_key)
        };

        let response = builder
            .timeout(Duration::from_secs(15))
            .send()
            .await
            .map_err(map_request_error)?;
        Self::check_status(response).await?;

        debug!("Connected to {}", self.config.base_url);
        Ok(())
    }

    async fn generate(
        &self,
        messages: &[ChatMessage],
        config: &GenerationConfig,
    ) -> Result<GenerationResult> {
        let generation_future = self.perform_generation(messages, config);

        match timeout(config.timeout, generation_future).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout("Request timed out".to_string())),
        }
    }

    async fn generate_stream(
        &self,
        messages: &[ChatMessage],
        config: &GenerationConfig,
    ) -> Result<TextStream> {
        let request = ChatCompletionRequest {
            model: &config.model_id,
            messages,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            stream: true,
        };

        let open_future = async {
            let response = self
                .post("chat/completions")
                .json(&request)
                .send()
                .await
                .map_err(map_request_error)?;
            Self::check_status(response).await
        };
        let response = match timeout(config.timeout, open_future).await {
            Ok(result) => result?,
            Err(_) => return Err(Error::Timeout("Request timed out".to_string())),
        };

        let (tx, rx) = mpsc::channel::<Result<String>>(32);
        let mut bytes = response.bytes_stream();
        let idle_limit = config.timeout;

        tokio::spawn(async move {
            let mut buffer = SseBuffer::default();
            loop {
                let item = match timeout(idle_limit, bytes.next()).await {
                    Ok(Some(item)) => item,
                    Ok(None) => return,
                    Err(_) => {
                        let _ = tx
                            .send(Err(Error::Timeout(format!(
                                "no data from stream for {}s",
                                idle_limit.as_secs_f32()
                            ))))
                            .await;
                        return;
                    }
                };
                match item {
                    Ok(chunk) => {
                        for line in buffer.push(&chunk) {
                            match parse_sse_line(&line) {
                                SseEvent::Delta(text) => {
                                    if tx.send(Ok(text)).await.is_err() {
                                        return;
                                    }
                                }
                                SseEvent::Done => return,
                                SseEvent::Skip => {}
                            }
                        }
                    }
                    Err(e) => {
                        let _ = tx
                            .send(Err(Error::Generation(format!("stream interrupted: {}", e))))
                            .await;
                        return;
                    }
                }
            }
        });

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });
        Ok(stream.boxed())
    }

    fn model_id(&self) -> &str {
        &self.chat_model
    }
}

#[async_trait]
impl Embedder for OpenAIClient {
    fn model_id(&self) -> &str {
        &self.embedding_model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| Error::Embedding("embedding API returned no vectors".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = EmbeddingRequest {
            model: &self.embedding_model,
            input: texts,
        };

        let request_future = async {
            let response = self
                .post("embeddings")
                .json(&request)
                .send()
                .await
                .map_err(|e| Error::Embedding(map_request_error(e).to_string()))?;
            let response = Self::check_status(response)
                .await
                .map_err(|e| Error::Embedding(e.to_string()))?;

            response
                .json::<EmbeddingResponse>()
                .await
                .map_err(|e| Error::Embedding(format!("malformed embedding response: {}", e)))
        };

        let mut body = match timeout(self.request_timeout, request_future).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(Error::Embedding(format!(
                    "embedding request timed out after {}s",
                    self.request_timeout.as_secs_f32()
                )));
            }
        };

        if body.data.len() != texts.len() {
            return Err(Error::Embedding(format!(
                "embedding API returned {} vectors for {} inputs",
                body.data.len(),
                texts.len()
            )));
        }

        body.data.sort_by_key(|d| d.index);
        Ok(body.data.into_iter().map(|d| d.embedding).collect())
    }
}
