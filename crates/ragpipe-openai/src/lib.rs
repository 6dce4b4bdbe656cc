//! OpenAI-compatible provider for ragpipe
//!
//! This crate provides the chat-completion implementation of the `LLMProvider` trait
//! and an `Embedder` backed by the `/embeddings` endpoint. Any server speaking the
//! OpenAI wire format (OpenAI, Ollama, LM Studio, vLLM) can be targeted.

mod client;
mod config;

#[cfg(test)]
mod stub_server;

pub use client::OpenAIClient;
pub use config::{DEFAULT_BASE_URL, OpenAIConfig};

// Re-export core types for convenience
pub use ragpipe_core::{
    ChatMessage, Embedder, Error, GenerationConfig, GenerationResult, LLMProvider, Result,
    TextStream,
};
