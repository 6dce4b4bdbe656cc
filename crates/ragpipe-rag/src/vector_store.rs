//! Vector index implementations

use async_trait::async_trait;
use qdrant_client::Qdrant;
use qdrant_client::qdrant::point_id::PointIdOptions;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::{
    CountPointsBuilder, CreateCollectionBuilder, DeleteCollectionBuilder, Distance, PointId,
    PointStruct, SearchPointsBuilder, UpsertPointsBuilder, Value, VectorParamsBuilder,
};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

use ragpipe_core::{Error, IndexRecord, Metadata, QueryResponse, Result, VectorIndex};

/// Local in-memory vector index with an optional JSON snapshot on disk
pub struct LocalVectorStore {
    records: Arc<RwLock<BTreeMap<String, IndexRecord>>>,
    snapshot_path: Option<PathBuf>,
}

impl LocalVectorStore {
    /// Create a new, empty, purely in-memory store
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(BTreeMap::new())),
            snapshot_path: None,
        }
    }

    /// Open a store backed by `path`, loading it if the file already exists
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut records = BTreeMap::new();

        if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            let stored: Vec<IndexRecord> = serde_json::from_str(&raw).map_err(|e| {
                Error::VectorStore(format!("corrupt index snapshot {}: {}", path.display(), e))
            })?;
            for record in stored {
                records.insert(record.id.clone(), record);
            }
            info!("Loaded {} records from {}", records.len(), path.display());
        }

        Ok(Self {
            records: Arc::new(RwLock::new(records)),
            snapshot_path: Some(path),
        })
    }

    /// Simple cosine similarity calculation
    fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() {
            return 0.0;
        }

        let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

        if norm_a == 0.0 || norm_b == 0.0 {
            return 0.0;
        }

        dot_product / (norm_a * norm_b)
    }

    fn lock_error<E: std::fmt::Display>(e: E) -> Error {
        Error::VectorStore(format!("Lock error: {}", e))
    }
}

impl Default for LocalVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorIndex for LocalVectorStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn connect(&self) -> Result<()> {
        let records = self.records.read().map_err(Self::lock_error)?.len();
        debug!("Local index holds {} records", records);
        Ok(())
    }

    async fn upsert(&self, records: Vec<IndexRecord>) -> Result<usize> {
        let mut docs = self.records.write().map_err(Self::lock_error)?;
        let written = records.len();
        for record in records {
            docs.insert(record.id.clone(), record);
        }
        Ok(written)
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<QueryResponse> {
        let docs = self.records.read().map_err(Self::lock_error)?;

        let mut scored: Vec<(&IndexRecord, f32)> = docs
            .values()
            .filter(|record| record.embedding.len() == vector.len())
            .map(|record| (record, Self::cosine_similarity(vector, &record.embedding)))
            .collect();

        // Stable sort keeps id order among equal scores
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);

        let mut response = QueryResponse::default();
        for (record, score) in scored {
            response.push(record.id.clone(), score, Some(record.metadata.clone()));
        }
        Ok(response)
    }

    async fn count(&self) -> Result<usize> {
        let docs = self.records.read().map_err(Self::lock_error)?;
        Ok(docs.len())
    }

    async fn clear(&self) -> Result<()> {
        let mut docs = self.records.write().map_err(Self::lock_error)?;
        docs.clear();
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };

        let json = {
            let docs = self.records.read().map_err(Self::lock_error)?;
            let stored: Vec<&IndexRecord> = docs.values().collect();
            serde_json::to_string(&stored)?
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, path).await?;
        debug!("Wrote index snapshot to {}", path.display());
        Ok(())
    }
}

/// Payload key carrying the chunk id, since Qdrant point ids must be UUIDs
const CHUNK_ID_KEY: &str = "chunk_id";

/// Qdrant-backed vector index using a cosine collection
pub struct QdrantVectorStore {
    client: Qdrant,
    collection_name: String,
    dimension: u64,
}

impl QdrantVectorStore {
    pub fn new(url: &str, collection_name: &str, dimension: usize) -> Result<Self> {
        let client = Qdrant::from_url(url)
            .build()
            .map_err(|e| Error::VectorStore(e.to_string()))?;

        Ok(Self {
            client,
            collection_name: collection_name.to_string(),
            dimension: dimension as u64,
        })
    }

    /// Stable UUID for a chunk id
    pub fn point_id(chunk_id: &str) -> String {
        Uuid::from_bytes(md5::compute(chunk_id.as_bytes()).0).to_string()
    }

    fn string_value(value: &Value) -> Option<&str> {
        match value {
            Value {
                kind: Some(Kind::StringValue(s)),
            } => Some(s.as_str()),
            _ => None,
        }
    }

    fn format_point_id(id: Option<PointId>) -> String {
        match id.and_then(|p| p.point_id_options) {
            Some(PointIdOptions::Uuid(uuid)) => uuid,
            Some(PointIdOptions::Num(num)) => num.to_string(),
            None => String::new(),
        }
    }
}

#[async_trait]
impl VectorIndex for QdrantVectorStore {
    fn name(&self) -> &str {
        "qdrant"
    }

    async fn connect(&self) -> Result<()> {
        let exists = self
            .client
            .collection_exists(self.collection_name.clone())
            .await
            .map_err(|e| Error::VectorStore(e.to_string()))?;

        if !exists {
            self.client
                .create_collection(
                    CreateCollectionBuilder::new(self.collection_name.clone()).vectors_config(
                        VectorParamsBuilder::new(self.dimension, Distance::Cosine),
                    ),
                )
                .await
                .map_err(|e| Error::VectorStore(e.to_string()))?;
            info!("Created Qdrant collection: {}", self.collection_name);
        }

        Ok(())
    }

    async fn upsert(&self, records: Vec<IndexRecord>) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let points: Vec<PointStruct> = records
            .into_iter()
            .map(|record| {
                let mut payload: HashMap<String, Value> = record
                    .metadata
                    .into_iter()
                    .map(|(key, value)| (key, Value::from(value)))
                    .collect();
                payload.insert(CHUNK_ID_KEY.to_string(), Value::from(record.id.clone()));

                PointStruct::new(Self::point_id(&record.id), record.embedding, payload)
            })
            .collect();

        let written = points.len();
        let request = UpsertPointsBuilder::new(self.collection_name.clone(), points).wait(true);
        self.client
            .upsert_points(request)
            .await
            .map_err(|e| Error::VectorStore(e.to_string()))?;

        Ok(written)
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<QueryResponse> {
        let search_result = self
            .client
            .search_points(
                SearchPointsBuilder::new(self.collection_name.clone(), vector.to_vec(), k as u64)
                    .with_payload(true),
            )
            .await
            .map_err(|e| Error::VectorStore(e.to_string()))?;

        let mut response = QueryResponse::default();
        for scored_point in search_result.result {
            let id = scored_point
                .payload
                .get(CHUNK_ID_KEY)
                .and_then(Self::string_value)
                .map(str::to_string)
                .unwrap_or_else(|| Self::format_point_id(scored_point.id.clone()));

            let metadata: Metadata = scored_point
                .payload
                .iter()
                .filter(|(key, _)| key.as_str() != CHUNK_ID_KEY)
                .filter_map(|(key, value)| {
                    Self::string_value(value).map(|s| (key.clone(), s.to_string()))
                })
                .collect();

            response.push(id, scored_point.score, Some(metadata));
        }

        Ok(response)
    }

    async fn count(&self) -> Result<usize> {
        let response = self
            .client
            .count(CountPointsBuilder::new(self.collection_name.clone()).exact(true))
            .await
            .map_err(|e| Error::VectorStore(e.to_string()))?;

        Ok(response.result.map(|r| r.count as usize).unwrap_or(0))
    }

    async fn clear(&self) -> Result<()> {
        self.client
            .delete_collection(DeleteCollectionBuilder::new(self.collection_name.clone()))
            .await
            .map_err(|e| Error::VectorStore(e.to_string()))?;
        self.connect().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, embedding: Vec<f32>, text: &str) -> IndexRecord {
        let mut metadata = Metadata::new();
        metadata.insert("text".to_string(), text.to_string());
        IndexRecord {
            id: id.to_string(),
            embedding,
            metadata,
        }
    }

    #[tokio::test]
    async fn test_local_vector_store() {
        let store = LocalVectorStore::new();
        store.connect().await.unwrap();
        assert!(store.is_connected());

        let written = store
            .upsert(vec![record("test1", vec![1.0, 0.0], "Rust is a language")])
            .await
            .unwrap();
        assert_eq!(written, 1);
        assert_eq!(store.count().await.unwrap(), 1);

        store.clear().await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_query_orders_by_cosine() {
        let store = LocalVectorStore::new();
        store
            .upsert(vec![
                record("far", vec![0.0, 1.0], "far"),
                record("near", vec![1.0, 0.1], "near"),
                record("mid", vec![1.0, 1.0], "mid"),
                record("wrong_dim", vec![1.0, 0.0, 0.0], "ignored"),
            ])
            .await
            .unwrap();

        let response = store.query(&[1.0, 0.0], 3).await.unwrap();
        assert_eq!(response.ids, vec!["near", "mid", "far"]);
        assert!(response.scores[0] > response.scores[1]);
        assert_eq!(response.metadatas.len(), 3);

        let top1 = store.query(&[1.0, 0.0], 1).await.unwrap();
        assert_eq!(top1.ids, vec!["near"]);
    }

    #[tokio::test]
    async fn test_ties_break_by_id() {
        let store = LocalVectorStore::new();
        store
            .upsert(vec![
                record("b", vec![1.0, 0.0], "b"),
                record("a", vec![1.0, 0.0], "a"),
            ])
            .await
            .unwrap();

        let response = store.query(&[1.0, 0.0], 2).await.unwrap();
        assert_eq!(response.ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_snapshot_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index").join("store.json");

        let store = LocalVectorStore::open(&path).unwrap();
        store
            .upsert(vec![record("doc#0", vec![0.6, 0.8], "persisted passage")])
            .await
            .unwrap();
        store.flush().await.unwrap();

        let reopened = LocalVectorStore::open(&path).unwrap();
        assert_eq!(reopened.count().await.unwrap(), 1);
        let response = reopened.query(&[0.6, 0.8], 1).await.unwrap();
        assert_eq!(response.ids, vec!["doc#0"]);
        assert_eq!(
            response.metadatas[0].as_ref().unwrap().get("text").unwrap(),
            "persisted passage"
        );
    }

    #[test]
    fn test_corrupt_snapshot_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, "{not json").unwrap();

        assert!(matches!(
            LocalVectorStore::open(&path),
            Err(Error::VectorStore(_))
        ));
    }

    #[test]
    fn test_point_id_is_stable_uuid() {
        let a = QdrantVectorStore::point_id("notes.md#0");
        let b = QdrantVectorStore::point_id("notes.md#0");
        let c = QdrantVectorStore::point_id("notes.md#1");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(Uuid::parse_str(&a).is_ok());
    }
}
