//! Retrieval-augmented generation for ragpipe
//!
//! This crate provides the retriever, context assembler and responder, the
//! pipeline that ties them together, and local implementations of the core
//! collaborator traits (vector indexes, a hashing embedder, a directory loader).

mod context;
mod document_indexer;
mod document_loader;
mod embedder;
mod pipeline;
mod responder;
mod retriever;
mod vector_store;

#[cfg(test)]
mod mocks;

pub use context::{AssembledContext, ContextAssembler, PASSAGE_SEPARATOR};
pub use document_indexer::DocumentIndexer;
pub use document_loader::{DirectoryLoader, SourceFormat};
pub use embedder::HashEmbedder;
pub use pipeline::{Answer, PipeOutput, PipelineComponents, RagPipeline, StartupReport};
pub use responder::{GenerationOverrides, INSTRUCTION, Responder, build_prompt, collect_stream};
pub use retriever::{Retriever, RetrieverConfig};
pub use vector_store::{LocalVectorStore, QdrantVectorStore};

// Re-export core types for convenience
pub use ragpipe_core::{
    ChatMessage, Document, Error, IndexingConfig, IndexingResult, Match, PipelineConfig, Result,
    TextStream,
};
