//! Vector index trait and types

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{Metadata, Result};

/// A chunk stored in the vector index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRecord {
    pub id: String,
    pub embedding: Vec<f32>,
    pub metadata: Metadata,
}

/// Raw nearest-neighbour payload as returned by an index.
///
/// Column oriented: row `i` is `(ids[i], scores[i], metadatas[i])`. Indexes are
/// expected to return rows by descending relevance; callers validate the
/// shape before trusting it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub ids: Vec<String>,
    pub scores: Vec<f32>,
    pub metadatas: Vec<Option<Metadata>>,
}

impl QueryResponse {
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty() && self.scores.is_empty() && self.metadatas.is_empty()
    }

    /// Append one row, keeping the columns aligned
    pub fn push(&mut self, id: impl Into<String>, score: f32, metadata: Option<Metadata>) {
        self.ids.push(id.into());
        self.scores.push(score);
        self.metadatas.push(metadata);
    }
}

/// Trait for vector indexes (in-memory, Qdrant, ...)
///
/// The query path only reads; implementations must allow concurrent
/// `query` calls from many tasks.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Human readable backend name for logs
    fn name(&self) -> &str;

    /// Make sure the index is reachable and its collection exists
    async fn connect(&self) -> Result<()>;

    /// Insert or replace records, returning how many were written
    async fn upsert(&self, records: Vec<IndexRecord>) -> Result<usize>;

    /// Top-`k` nearest neighbours of `vector`
    async fn query(&self, vector: &[f32], k: usize) -> Result<QueryResponse>;

    /// Number of stored records
    async fn count(&self) -> Result<usize>;

    /// Remove every record
    async fn clear(&self) -> Result<()>;

    /// Persist buffered state, if the backend keeps any
    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_response_push_keeps_columns_aligned() {
        let mut response = QueryResponse::default();
        assert!(response.is_empty());

        response.push("a", 0.9, None);
        response.push("b", 0.5, Some(Metadata::new()));

        assert!(!response.is_empty());
        assert_eq!(response.ids.len(), 2);
        assert_eq!(response.scores.len(), 2);
        assert_eq!(response.metadatas.len(), 2);
    }
}
