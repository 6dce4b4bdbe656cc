//! Core traits and types for ragpipe
//!
//! This crate defines the fundamental traits and types used across the ragpipe system.
//! It provides capability-facing interfaces for embedders, vector indexes, LLM providers
//! and document loaders, so the retrieval pipeline can be exercised against test doubles.

pub mod config;
pub mod document_loader;
pub mod embedder;
pub mod error;
pub mod llm;
pub mod types;
pub mod vector_store;


pub use config::{EmbeddingBackend, PipelineConfig, VectorBackend};
pub use document_loader::{DocumentLoader, IndexingConfig, IndexingResult};
pub use embedder::Embedder;
pub use error::{Error, Result};
pub use llm::{GenerationConfig, GenerationResult, LLMProvider, TextStream};
pub use types::*;
pub use vector_store::{IndexRecord, QueryResponse, VectorIndex};
