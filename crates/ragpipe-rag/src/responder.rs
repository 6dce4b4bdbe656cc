//! Prompt formatting and answer generation

use futures::StreamExt;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error};

use ragpipe_core::{ChatMessage, Error, GenerationConfig, LLMProvider, Result, TextStream};

/// Instruction prepended to every final user message
pub const INSTRUCTION: &str = "Answer based on the context below. If unsure, say so.";

/// Per-request generation parameters taken from a request body
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GenerationOverrides {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl GenerationOverrides {
    /// Read `temperature` and `max_tokens` from a JSON body, ignoring
    /// anything missing or of the wrong type
    pub fn from_body(body: &Value) -> Self {
        Self {
            temperature: body
                .get("temperature")
                .and_then(Value::as_f64)
                .map(|t| t as f32),
            max_tokens: body
                .get("max_tokens")
                .and_then(Value::as_u64)
                .and_then(|n| u32::try_from(n).ok()),
        }
    }

    pub fn apply(&self, base: &GenerationConfig) -> GenerationConfig {
        let mut config = base.clone();
        if let Some(temperature) = self.temperature {
            config.temperature = temperature;
        }
        if let Some(max_tokens) = self.max_tokens {
            config.max_tokens = max_tokens;
        }
        config
    }
}

/// Build the final user prompt for a query and its context
pub fn build_prompt(query: &str, context: &str) -> String {
    let inner = if context.is_empty() {
        query.to_string()
    } else {
        format!("Context:\n{}\n\nQuery: {}", context, query)
    };
    format!("{}\n\n{}", INSTRUCTION, inner)
}

/// Formats prompts and calls the model, blocking or streamed
pub struct Responder {
    llm: Arc<dyn LLMProvider>,
    generation: GenerationConfig,
    include_history: bool,
}

impl Responder {
    pub fn new(llm: Arc<dyn LLMProvider>, generation: GenerationConfig) -> Self {
        Self {
            llm,
            generation,
            include_history: false,
        }
    }

    pub fn with_history(mut self, include_history: bool) -> Self {
        self.include_history = include_history;
        self
    }

    pub fn generation_config(&self) -> &GenerationConfig {
        &self.generation
    }

    /// Messages sent to the model: optional history, then the prompt
    pub fn build_messages(
        &self,
        query: &str,
        context: &str,
        history: &[ChatMessage],
    ) -> Vec<ChatMessage> {
        let mut messages = Vec::new();
        if self.include_history {
            messages.extend(history.iter().cloned());
        }
        messages.push(ChatMessage::user(build_prompt(query, context)));
        messages
    }

    pub async fn respond(
        &self,
        query: &str,
        context: &str,
        history: &[ChatMessage],
        overrides: GenerationOverrides,
    ) -> Result<String> {
        let messages = self.build_messages(query, context, history);
        let config = overrides.apply(&self.generation);

        let result = self
            .llm
            .generate(&messages, &config)
            .await
            .map_err(Error::into_generation)?;

        debug!(
            "Generated {} chars with {} (tokens: {:?})",
            result.text.len(),
            result.model_id,
            result.tokens_used
        );
        Ok(result.text)
    }

    /// Stream an answer. Failures arrive as the uniform failure text, so the
    /// returned stream never yields an `Err`.
    pub async fn respond_stream(
        &self,
        query: &str,
        context: &str,
        history: &[ChatMessage],
        overrides: GenerationOverrides,
    ) -> TextStream {
        let messages = self.build_messages(query, context, history);
        let config = overrides.apply(&self.generation);

        let stream = match self.llm.generate_stream(&messages, &config).await {
            Ok(stream) => stream,
            Err(e) => {
                let e = e.into_generation();
                error!("Streaming generation failed: {}", e);
                return futures::stream::once(async move { Ok(e.user_message()) }).boxed();
            }
        };

        stream
            .scan(false, |failed, item| {
                let next = if *failed {
                    None
                } else {
                    match item {
                        Ok(text) => Some(Ok(text)),
                        Err(e) => {
                            *failed = true;
                            let e = e.into_generation();
                            error!("Streaming generation failed mid-stream: {}", e);
                            Some(Ok(e.user_message()))
                        }
                    }
                };
                futures::future::ready(next)
            })
            .boxed()
    }
}

/// Drain a stream into one string, stopping at the first error
pub async fn collect_stream(mut stream: TextStream) -> Result<String> {
    let mut out = String::new();
    while let Some(chunk) = stream.next().await {
        out.push_str(&chunk?);
    }
    Ok(out)
}
