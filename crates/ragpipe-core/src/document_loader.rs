//! Document loader trait and indexing types

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::{Document, Result};

/// Result of an indexing operation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexingResult {
    pub documents_indexed: usize,
    pub chunks_indexed: usize,
    pub chunks_failed: usize,
    pub errors: Vec<String>,
}

impl IndexingResult {
    pub fn merge(&mut self, other: IndexingResult) {
        self.documents_indexed += other.documents_indexed;
        self.chunks_indexed += other.chunks_indexed;
        self.chunks_failed += other.chunks_failed;
        self.errors.extend(other.errors);
    }
}

/// Configuration for chunking and batching during indexing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub batch_size: usize,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            batch_size: 32,
        }
    }
}

/// Trait for turning a directory into documents
#[async_trait]
pub trait DocumentLoader: Send + Sync {
    /// Load every supported document below `dir`
    async fn load(&self, dir: &Path) -> Result<Vec<Document>>;
}
