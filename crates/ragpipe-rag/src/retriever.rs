//! Query embedding, nearest-neighbour search and payload validation

use std::sync::Arc;
use tracing::{debug, warn};

use ragpipe_core::{Embedder, Error, Match, QueryResponse, Result, RetrievalDegraded, VectorIndex};

/// Result-count and score policy for retrieval
#[derive(Debug, Clone, PartialEq)]
pub struct RetrieverConfig {
    pub top_k: usize,
    pub min_score: Option<f32>,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            top_k: 4,
            min_score: None,
        }
    }
}

/// Embeds a query and fetches the closest stored passages.
///
/// A misbehaving index never fails a query: the retriever logs why and
/// returns no matches, leaving the caller to answer without grounding.
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    config: RetrieverConfig,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        config: RetrieverConfig,
    ) -> Self {
        Self {
            embedder,
            index,
            config,
        }
    }

    pub fn config(&self) -> &RetrieverConfig {
        &self.config
    }

    /// Retrieve with the configured `top_k`
    pub async fn retrieve(&self, query: &str) -> Result<Vec<Match>> {
        self.retrieve_top_k(query, self.config.top_k).await
    }

    /// Retrieve at most `k` matches, in index order
    pub async fn retrieve_top_k(&self, query: &str, k: usize) -> Result<Vec<Match>> {
        if query.trim().is_empty() {
            debug!("Empty query, skipping retrieval");
            return Ok(Vec::new());
        }
        let k = k.max(1);

        let vector = self
            .embedder
            .embed(query)
            .await
            .map_err(|e| Error::Embedding(e.to_string()))?;
        if vector.is_empty() {
            return Err(Error::Embedding(format!(
                "{} returned an empty vector",
                self.embedder.model_id()
            )));
        }

        let response = match self.index.query(&vector, k).await {
            Ok(response) => response,
            Err(e) => {
                warn!(
                    "Retrieval degraded: {}",
                    RetrievalDegraded::IndexUnavailable(e.to_string())
                );
                return Ok(Vec::new());
            }
        };

        let mut matches = match Self::validate(response) {
            Ok(matches) => matches,
            Err(reason) => {
                warn!("Retrieval degraded: {}", reason);
                return Ok(Vec::new());
            }
        };

        if let Some(min_score) = self.config.min_score {
            matches.retain(|m| m.score >= min_score);
        }
        matches.truncate(k);

        debug!(
            "Retrieved {} matches from {} (k={})",
            matches.len(),
            self.index.name(),
            k
        );
        Ok(matches)
    }

    /// Check the shape of a raw index payload and convert usable rows
    pub fn validate(response: QueryResponse) -> std::result::Result<Vec<Match>, RetrievalDegraded> {
        if response.is_empty() {
            return Err(RetrievalDegraded::EmptyPayload);
        }

        let (ids, scores, metadatas) = (
            response.ids.len(),
            response.scores.len(),
            response.metadatas.len(),
        );
        if ids != scores || ids != metadatas {
            return Err(RetrievalDegraded::MalformedPayload {
                ids,
                scores,
                metadatas,
            });
        }

        let matches = response
            .ids
            .into_iter()
            .zip(response.scores)
            .zip(response.metadatas)
            .filter_map(|((id, score), metadata)| {
                if id.is_empty() || !score.is_finite() {
                    warn!("Dropping unusable match (id={:?}, score={})", id, score);
                    return None;
                }
                Some(Match {
                    id,
                    score,
                    metadata: metadata.unwrap_or_default(),
                })
            })
            .collect();

        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{FailingEmbedder, FailingIndex, ScriptedIndex, StaticEmbedder};
    use ragpipe_core::Metadata;

    fn meta(key: &str, value: &str) -> Option<Metadata> {
        Some(Metadata::from([(key.to_string(), value.to_string())]))
    }

    fn retriever(index: Arc<dyn VectorIndex>, config: RetrieverConfig) -> Retriever {
        Retriever::new(Arc::new(StaticEmbedder::new(vec![1.0, 0.0])), index, config)
    }

    fn three_rows() -> QueryResponse {
        let mut response = QueryResponse::default();
        response.push("a", 0.9, meta("text", "A"));
        response.push("b", 0.5, meta("text", "B"));
        response.push("c", 0.1, None);
        response
    }

    #[tokio::test]
    async fn test_returns_rows_in_index_order() {
        let r = retriever(
            Arc::new(ScriptedIndex::new(three_rows())),
            RetrieverConfig::default(),
        );
        let matches = r.retrieve("query").await.unwrap();

        let ids: Vec<&str> = matches.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert!(matches[2].metadata.is_empty());
    }

    #[tokio::test]
    async fn test_truncates_to_k_and_clamps_zero() {
        let index = Arc::new(ScriptedIndex::new(three_rows()));
        let r = retriever(index.clone(), RetrieverConfig::default());

        assert_eq!(r.retrieve_top_k("query", 2).await.unwrap().len(), 2);
        assert_eq!(r.retrieve_top_k("query", 0).await.unwrap().len(), 1);
        assert_eq!(index.last_k(), Some(1));
    }

    #[tokio::test]
    async fn test_min_score_filter() {
        let r = retriever(
            Arc::new(ScriptedIndex::new(three_rows())),
            RetrieverConfig {
                top_k: 4,
                min_score: Some(0.5),
            },
        );
        let ids: Vec<String> = r
            .retrieve("query")
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_index_error_degrades_to_empty() {
        let r = retriever(Arc::new(FailingIndex), RetrieverConfig::default());
        assert!(r.retrieve("query").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_payload_degrades_to_empty() {
        let r = retriever(
            Arc::new(ScriptedIndex::new(QueryResponse::default())),
            RetrieverConfig::default(),
        );
        assert!(r.retrieve("query").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mismatched_columns_degrade_to_empty() {
        let mut response = three_rows();
        response.scores.pop();
        let r = retriever(
            Arc::new(ScriptedIndex::new(response)),
            RetrieverConfig::default(),
        );
        assert!(r.retrieve("query").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_blank_query_skips_embedder() {
        let r = Retriever::new(
            Arc::new(FailingEmbedder),
            Arc::new(FailingIndex),
            RetrieverConfig::default(),
        );
        assert!(r.retrieve("   ").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_embedder_failure_is_embedding_error() {
        let r = Retriever::new(
            Arc::new(FailingEmbedder),
            Arc::new(ScriptedIndex::new(three_rows())),
            RetrieverConfig::default(),
        );
        assert!(matches!(
            r.retrieve("query").await,
            Err(Error::Embedding(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_vector_is_embedding_error() {
        let r = Retriever::new(
            Arc::new(StaticEmbedder::new(vec![])),
            Arc::new(ScriptedIndex::new(three_rows())),
            RetrieverConfig::default(),
        );
        assert!(matches!(
            r.retrieve("query").await,
            Err(Error::Embedding(_))
        ));
    }

    #[test]
    fn test_validate_drops_unusable_rows() {
        let mut response = QueryResponse::default();
        response.push("", 0.9, meta("text", "no id"));
        response.push("nan", f32::NAN, meta("text", "bad score"));
        response.push("ok", 0.3, meta("text", "fine"));

        let matches = Retriever::validate(response).unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].id, "ok");
    }

    #[test]
    fn test_validate_reports_shape() {
        let response = QueryResponse {
            ids: vec!["a".into(), "b".into()],
            scores: vec![0.1],
            metadatas: vec![None, None],
        };
        assert_eq!(
            Retriever::validate(response),
            Err(RetrievalDegraded::MalformedPayload {
                ids: 2,
                scores: 1,
                metadatas: 2
            })
        );
    }
}
