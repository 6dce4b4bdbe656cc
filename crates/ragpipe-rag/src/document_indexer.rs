//! Chunks documents, embeds the chunks and writes them to a vector index

use std::sync::Arc;
use tracing::{debug, info, warn};

use ragpipe_core::{
    Document, Embedder, IndexRecord, IndexingConfig, IndexingResult, Result, VectorIndex,
};

/// Document indexer writing chunk embeddings into a [`VectorIndex`]
pub struct DocumentIndexer {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    config: IndexingConfig,
    text_field: String,
}

impl DocumentIndexer {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        config: IndexingConfig,
        text_field: impl Into<String>,
    ) -> Self {
        Self {
            embedder,
            index,
            config,
            text_field: text_field.into(),
        }
    }

    /// Split content into overlapping character windows
    pub fn chunk_document(&self, content: &str) -> Vec<String> {
        let chunk_size = self.config.chunk_size.max(1);
        let overlap = self.config.chunk_overlap.min(chunk_size - 1);

        let mut chunks = Vec::new();
        let chars: Vec<char> = content.chars().collect();
        let mut start = 0;

        while start < chars.len() {
            let end = (start + chunk_size).min(chars.len());
            let chunk: String = chars[start..end].iter().collect();
            if !chunk.trim().is_empty() {
                chunks.push(chunk);
            }

            if end >= chars.len() {
                break;
            }

            start = end - overlap;
        }

        chunks
    }

    fn records_for(&self, document: &Document) -> Vec<(String, IndexRecord)> {
        let chunks = self.chunk_document(&document.text);
        let total = chunks.len();

        chunks
            .into_iter()
            .enumerate()
            .map(|(i, chunk)| {
                let mut metadata = document.metadata.clone();
                metadata.insert(self.text_field.clone(), chunk.clone());
                metadata.insert("document_id".to_string(), document.id.clone());
                metadata.insert("chunk_index".to_string(), i.to_string());
                metadata.insert("total_chunks".to_string(), total.to_string());

                let record = IndexRecord {
                    id: format!("{}#{}", document.id, i),
                    embedding: Vec::new(),
                    metadata,
                };
                (chunk, record)
            })
            .collect()
    }

    /// Index a single document
    pub async fn index_document(&self, document: &Document) -> Result<IndexingResult> {
        let records = self.records_for(document);
        let mut result = IndexingResult::default();

        if records.is_empty() {
            warn!("Document {} produced no chunks", document.id);
            return Ok(result);
        }

        for batch in records.chunks(self.config.batch_size.max(1)) {
            let texts: Vec<String> = batch.iter().map(|(text, _)| text.clone()).collect();

            let embeddings = match self.embedder.embed_batch(&texts).await {
                Ok(embeddings) if embeddings.len() == batch.len() => embeddings,
                Ok(embeddings) => {
                    result.chunks_failed += batch.len();
                    result.errors.push(format!(
                        "{}: embedder returned {} vectors for {} chunks",
                        document.id,
                        embeddings.len(),
                        batch.len()
                    ));
                    continue;
                }
                Err(e) => {
                    result.chunks_failed += batch.len();
                    result.errors.push(format!("{}: {}", document.id, e));
                    continue;
                }
            };

            let to_write: Vec<IndexRecord> = batch
                .iter()
                .zip(embeddings)
                .map(|((_, record), embedding)| IndexRecord {
                    embedding,
                    ..record.clone()
                })
                .collect();

            match self.index.upsert(to_write).await {
                Ok(written) => result.chunks_indexed += written,
                Err(e) => {
                    result.chunks_failed += batch.len();
                    result.errors.push(format!("{}: {}", document.id, e));
                }
            }
        }

        if result.chunks_indexed > 0 {
            result.documents_indexed = 1;
        }

        debug!(
            "Indexed {} chunks of {} ({} failed)",
            result.chunks_indexed, document.id, result.chunks_failed
        );
        Ok(result)
    }

    /// Index multiple documents
    pub async fn index_documents(&self, documents: &[Document]) -> Result<IndexingResult> {
        let mut total = IndexingResult::default();

        for document in documents {
            total.merge(self.index_document(document).await?);
        }

        info!(
            "Indexed {} documents ({} chunks) into {}",
            total.documents_indexed,
            total.chunks_indexed,
            self.index.name()
        );
        for error in &total.errors {
            warn!("Indexing error: {}", error);
        }

        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::HashEmbedder;
    use crate::mocks::FailingEmbedder;
    use crate::vector_store::LocalVectorStore;

    fn indexer(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        chunk_size: usize,
        chunk_overlap: usize,
    ) -> DocumentIndexer {
        DocumentIndexer::new(
            embedder,
            index,
            IndexingConfig {
                chunk_size,
                chunk_overlap,
                batch_size: 2,
            },
            "text",
        )
    }

    #[test]
    fn test_chunking_with_overlap() {
        let indexer = indexer(
            Arc::new(HashEmbedder::new(8)),
            Arc::new(LocalVectorStore::new()),
            4,
            1,
        );

        assert_eq!(indexer.chunk_document("abcdefghij"), vec!["abcd", "defg", "ghij"]);
        assert_eq!(indexer.chunk_document("abc"), vec!["abc"]);
        assert!(indexer.chunk_document("").is_empty());
    }

    #[test]
    fn test_chunking_counts_chars_not_bytes() {
        let indexer = indexer(
            Arc::new(HashEmbedder::new(8)),
            Arc::new(LocalVectorStore::new()),
            2,
            0,
        );

        assert_eq!(indexer.chunk_document("héllo"), vec!["hé", "ll", "o"]);
    }

    #[tokio::test]
    async fn test_index_document_writes_chunk_metadata() {
        let store = Arc::new(LocalVectorStore::new());
        let indexer = indexer(Arc::new(HashEmbedder::new(32)), store.clone(), 10, 0);

        let doc = Document::new("notes.txt", "first part second part")
            .with_metadata("source", "notes.txt");
        let result = indexer.index_document(&doc).await.unwrap();

        assert_eq!(result.documents_indexed, 1);
        assert_eq!(result.chunks_indexed, 3);
        assert_eq!(result.chunks_failed, 0);
        assert_eq!(store.count().await.unwrap(), 3);

        let query = HashEmbedder::new(32).embed_text("first part");
        let response = store.query(&query, 3).await.unwrap();
        let metadata = response
            .ids
            .iter()
            .position(|id| id == "notes.txt#0")
            .and_then(|i| response.metadatas[i].clone())
            .unwrap();
        assert_eq!(metadata.get("text").unwrap(), "first part");
        assert_eq!(metadata.get("document_id").unwrap(), "notes.txt");
        assert_eq!(metadata.get("chunk_index").unwrap(), "0");
        assert_eq!(metadata.get("total_chunks").unwrap(), "3");
        assert_eq!(metadata.get("source").unwrap(), "notes.txt");
    }

    #[tokio::test]
    async fn test_embedding_failures_are_counted() {
        let store = Arc::new(LocalVectorStore::new());
        let indexer = indexer(Arc::new(FailingEmbedder), store.clone(), 5, 0);

        let docs = vec![Document::new("a", "0123456789abc")];
        let result = indexer.index_documents(&docs).await.unwrap();

        assert_eq!(result.documents_indexed, 0);
        assert_eq!(result.chunks_indexed, 0);
        assert_eq!(result.chunks_failed, 3);
        assert_eq!(result.errors.len(), 2);
        assert_eq!(store.count().await.unwrap(), 0);
    }
}
