//! Vector index lifecycle: creation, batched upsert, retrieval.
//!
//! The [`VectorIndex`] trait abstracts the index service boundary so the
//! pipeline can run against either backend:
//! - **[`RestIndex`]** — remote HTTP index service (JSON REST), with retry
//!   and exponential backoff for transient failures.
//! - **[`MemoryIndex`]** — brute-force cosine similarity over an in-process
//!   map; used for local experiments and throughout the tests.
//!
//! [`IndexManager`] composes an index backend with an [`Embedder`] and owns
//! the operations the rest of the system calls: `ensure_index`,
//! `upsert_chunks`, and `retrieve`.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::config::{Config, IndexConfig};
use crate::embedding::{self, cosine_similarity, Embedder};
use crate::models::{Chunk, IndexRecord, RetrievedChunk};

/// Index-boundary failure. Transient remote errors are retried before this
/// is surfaced; exhausting retries never silently drops data.
#[derive(Debug)]
pub enum IndexError {
    /// The index service (or the embedding service feeding it) could not be
    /// reached after bounded retries.
    Unavailable(String),
    /// The service answered with a payload we could not interpret.
    InvalidResponse(String),
}

impl std::fmt::Display for IndexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexError::Unavailable(e) => write!(f, "index unavailable: {}", e),
            IndexError::InvalidResponse(e) => write!(f, "invalid index response: {}", e),
        }
    }
}

impl std::error::Error for IndexError {}

/// Remote vector index service boundary.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Create the index with the given dimensionality if absent; no-op when
    /// it already exists. Concurrent creation attempts must not error.
    async fn ensure_index(&self, dims: usize) -> Result<(), IndexError>;

    /// Write records keyed by their stable IDs; an existing ID is
    /// overwritten, never duplicated.
    async fn upsert(&self, records: &[IndexRecord]) -> Result<(), IndexError>;

    /// Return the top-`k` records most similar to `vector`, best first.
    /// An empty index yields an empty list, not an error.
    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<RetrievedChunk>, IndexError>;
}

// ============ REST backend ============

/// HTTP client for a remote vector index service.
///
/// Endpoints: `GET/POST {endpoint}/indexes`,
/// `POST {endpoint}/indexes/{name}/vectors/upsert`,
/// `POST {endpoint}/indexes/{name}/query`.
pub struct RestIndex {
    config: IndexConfig,
    api_key: String,
    client: reqwest::Client,
}

impl RestIndex {
    pub fn new(config: IndexConfig, api_key: String) -> Result<Self, IndexError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| IndexError::Unavailable(e.to_string()))?;
        Ok(Self {
            config,
            api_key,
            client,
        })
    }

    /// Send a request with bounded retry and exponential backoff.
    ///
    /// 429 and 5xx responses and network errors are retried; any other
    /// response (success or not) is returned to the caller for inspection.
    async fn send_with_retry(
        &self,
        build: impl Fn() -> reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, IndexError> {
        let mut last_err = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = build()
                .header("Api-Key", &self.api_key)
                .header("Content-Type", "application/json")
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();
                    if status.as_u16() == 429 || status.is_server_error() {
                        let body = response.text().await.unwrap_or_default();
                        last_err = Some(format!("index API error {}: {}", status, body));
                        continue;
                    }
                    return Ok(response);
                }
                Err(e) => {
                    last_err = Some(e.to_string());
                    continue;
                }
            }
        }

        Err(IndexError::Unavailable(
            last_err.unwrap_or_else(|| "index request failed after retries".to_string()),
        ))
    }

    fn index_url(&self, suffix: &str) -> String {
        format!(
            "{}/indexes/{}{}",
            self.config.endpoint.trim_end_matches('/'),
            self.config.name,
            suffix
        )
    }
}

#[async_trait]
impl VectorIndex for RestIndex {
    async fn ensure_index(&self, dims: usize) -> Result<(), IndexError> {
        let describe = self
            .send_with_retry(|| self.client.get(self.index_url("")))
            .await?;

        if describe.status().is_success() {
            debug!(index = %self.config.name, "index already exists");
            return Ok(());
        }
        if describe.status().as_u16() != 404 {
            return Err(IndexError::Unavailable(format!(
                "describe index failed: {}",
                describe.status()
            )));
        }

        info!(index = %self.config.name, dims, "creating index");
        let url = format!("{}/indexes", self.config.endpoint.trim_end_matches('/'));
        let body = serde_json::json!({
            "name": self.config.name,
            "dimension": dims,
            "metric": "cosine",
        });
        let created = self
            .send_with_retry(|| self.client.post(&url).json(&body))
            .await?;

        // A concurrent caller may have created it between describe and
        // create; "already exists" counts as success.
        if created.status().is_success() || created.status().as_u16() == 409 {
            return Ok(());
        }
        Err(IndexError::Unavailable(format!(
            "create index failed: {}",
            created.status()
        )))
    }

    async fn upsert(&self, records: &[IndexRecord]) -> Result<(), IndexError> {
        let vectors: Vec<serde_json::Value> = records
            .iter()
            .map(|r| {
                let mut metadata = r.metadata.clone();
                if let Some(obj) = metadata.as_object_mut() {
                    obj.insert("text".to_string(), serde_json::json!(r.text));
                }
                serde_json::json!({
                    "id": r.id,
                    "values": r.values,
                    "metadata": metadata,
                })
            })
            .collect();

        let url = self.index_url("/vectors/upsert");
        let body = serde_json::json!({ "vectors": vectors });
        let resp = self
            .send_with_retry(|| self.client.post(&url).json(&body))
            .await?;

        if resp.status().is_success() {
            return Ok(());
        }
        Err(IndexError::Unavailable(format!(
            "upsert failed: {}",
            resp.status()
        )))
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<RetrievedChunk>, IndexError> {
        let url = self.index_url("/query");
        let body = serde_json::json!({
            "vector": vector,
            "topK": k,
            "includeMetadata": true,
        });
        let resp = self
            .send_with_retry(|| self.client.post(&url).json(&body))
            .await?;

        if !resp.status().is_success() {
            return Err(IndexError::Unavailable(format!(
                "query failed: {}",
                resp.status()
            )));
        }

        let json: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| IndexError::InvalidResponse(e.to_string()))?;
        parse_query_matches(&json)
    }
}

/// Parse a query response's `matches` array into retrieved chunks.
fn parse_query_matches(json: &serde_json::Value) -> Result<Vec<RetrievedChunk>, IndexError> {
    let matches = json
        .get("matches")
        .and_then(|m| m.as_array())
        .ok_or_else(|| IndexError::InvalidResponse("missing matches array".to_string()))?;

    let mut results = Vec::with_capacity(matches.len());
    for m in matches {
        let id = m
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| IndexError::InvalidResponse("match missing id".to_string()))?
            .to_string();
        let score = m.get("score").and_then(|v| v.as_f64()).unwrap_or(0.0) as f32;
        let metadata = m.get("metadata").cloned().unwrap_or(serde_json::json!({}));
        let text = metadata
            .get("text")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        results.push(RetrievedChunk {
            id,
            text,
            score,
            metadata,
        });
    }
    Ok(results)
}

// ============ In-memory backend ============

/// In-memory index for local runs and tests.
///
/// Records live in a `RwLock<HashMap>` keyed by ID; queries are brute-force
/// cosine similarity over everything stored.
pub struct MemoryIndex {
    records: RwLock<HashMap<String, IndexRecord>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn ensure_index(&self, _dims: usize) -> Result<(), IndexError> {
        Ok(())
    }

    async fn upsert(&self, records: &[IndexRecord]) -> Result<(), IndexError> {
        let mut stored = self.records.write().unwrap();
        for r in records {
            stored.insert(r.id.clone(), r.clone());
        }
        Ok(())
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<RetrievedChunk>, IndexError> {
        let stored = self.records.read().unwrap();
        let mut results: Vec<RetrievedChunk> = stored
            .values()
            .map(|r| RetrievedChunk {
                id: r.id.clone(),
                text: r.text.clone(),
                score: cosine_similarity(vector, &r.values),
                metadata: r.metadata.clone(),
            })
            .collect();

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.id.cmp(&b.id))
        });
        results.truncate(k);
        Ok(results)
    }
}

// ============ Manager ============

/// Owns the index lifecycle: embeds chunks, writes them in bounded batches,
/// and serves retrieval for the answer pipeline.
pub struct IndexManager {
    index: Box<dyn VectorIndex>,
    embedder: Box<dyn Embedder>,
    config: IndexConfig,
}

impl IndexManager {
    pub fn new(index: Box<dyn VectorIndex>, embedder: Box<dyn Embedder>, config: IndexConfig) -> Self {
        Self {
            index,
            embedder,
            config,
        }
    }

    /// Build a manager from configuration: `rest` or `memory` backend plus
    /// the remote embedder.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let index: Box<dyn VectorIndex> = match config.index.provider.as_str() {
            "memory" => Box::new(MemoryIndex::new()),
            "rest" => {
                let api_key = std::env::var("VECTOR_INDEX_API_KEY")
                    .map_err(|_| anyhow::anyhow!("VECTOR_INDEX_API_KEY not set"))?;
                Box::new(RestIndex::new(config.index.clone(), api_key)?)
            }
            other => anyhow::bail!("Unknown index provider: {}", other),
        };
        let embedder = embedding::create_embedder(&config.embedding)?;
        Ok(Self::new(index, embedder, config.index.clone()))
    }

    /// Idempotent index creation with the embedder's dimensionality.
    pub async fn ensure_index(&self) -> Result<(), IndexError> {
        self.index.ensure_index(self.embedder.dims()).await
    }

    /// Embed and upsert chunks in bounded batches.
    ///
    /// Each batch is written independently: a failing batch aborts the run
    /// with [`IndexError`], but batches committed before it stay committed.
    /// Returns the number of records written.
    pub async fn upsert_chunks(&self, chunks: &[Chunk]) -> Result<u64, IndexError> {
        let mut written = 0u64;
        let total = chunks.len();

        for batch in chunks.chunks(self.config.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = self
                .embedder
                .embed(&texts)
                .await
                .map_err(|e| IndexError::Unavailable(format!("embedding service: {}", e)))?;
            if vectors.len() != batch.len() {
                return Err(IndexError::InvalidResponse(format!(
                    "embedded {} texts, got {} vectors",
                    batch.len(),
                    vectors.len()
                )));
            }

            let indexed_at = chrono::Utc::now().to_rfc3339();
            let records: Vec<IndexRecord> = batch
                .iter()
                .zip(vectors)
                .map(|(chunk, values)| IndexRecord {
                    id: chunk.id.clone(),
                    values,
                    text: chunk.text.clone(),
                    metadata: serde_json::json!({
                        "document": chunk.document_path,
                        "kind": chunk.kind.as_str(),
                        "chunk_index": chunk.index,
                        "indexed_at": indexed_at,
                    }),
                })
                .collect();

            self.index.upsert(&records).await?;
            written += records.len() as u64;
            info!(written, total, "upserted batch");
        }

        Ok(written)
    }

    /// Embed the query and return up to `k` similar chunks, filtered by the
    /// configured similarity floor. Empty results are not an error.
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RetrievedChunk>, IndexError> {
        let vector = embedding::embed_query(self.embedder.as_ref(), query)
            .await
            .map_err(|e| IndexError::Unavailable(format!("embedding service: {}", e)))?;

        let mut results = self.index.query(&vector, k).await?;
        if let Some(floor) = self.config.min_score {
            results.retain(|r| r.score >= floor);
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::chunk_text;
    use crate::models::SourceKind;
    use anyhow::Result as AnyResult;
    use httpmock::prelude::*;

    /// Deterministic stand-in embedder: a fixed unit vector per known word.
    struct StubEmbedder;

    fn stub_vector(text: &str) -> Vec<f32> {
        if text.contains("alpha") {
            vec![1.0, 0.0, 0.0]
        } else if text.contains("beta") {
            vec![0.0, 1.0, 0.0]
        } else {
            vec![0.0, 0.0, 1.0]
        }
    }

    #[async_trait]
    impl Embedder for StubEmbedder {
        async fn embed(&self, texts: &[String]) -> AnyResult<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|t| stub_vector(t)).collect())
        }
        fn dims(&self) -> usize {
            3
        }
    }

    fn memory_manager(min_score: Option<f32>) -> (IndexManager, std::sync::Arc<MemoryIndex>) {
        // Manager owns a Box; tests need to inspect the index afterwards,
        // so share it through Arc and a forwarding wrapper.
        let shared = std::sync::Arc::new(MemoryIndex::new());

        struct Forward(std::sync::Arc<MemoryIndex>);
        #[async_trait]
        impl VectorIndex for Forward {
            async fn ensure_index(&self, dims: usize) -> Result<(), IndexError> {
                self.0.ensure_index(dims).await
            }
            async fn upsert(&self, records: &[IndexRecord]) -> Result<(), IndexError> {
                self.0.upsert(records).await
            }
            async fn query(
                &self,
                vector: &[f32],
                k: usize,
            ) -> Result<Vec<RetrievedChunk>, IndexError> {
                self.0.query(vector, k).await
            }
        }

        let config = IndexConfig {
            provider: "memory".to_string(),
            batch_size: 2,
            min_score,
            ..IndexConfig::default()
        };
        (
            IndexManager::new(Box::new(Forward(shared.clone())), Box::new(StubEmbedder), config),
            shared,
        )
    }

    #[tokio::test]
    async fn reupserting_identical_chunks_does_not_duplicate() {
        let (manager, index) = memory_manager(None);
        let chunks = chunk_text("docs/a.txt", SourceKind::PlainText, "alpha content", 500, 100);

        let first = manager.upsert_chunks(&chunks).await.unwrap();
        let second = manager.upsert_chunks(&chunks).await.unwrap();
        assert_eq!(first, 1);
        assert_eq!(second, 1);
        assert_eq!(index.len(), 1, "overwrite, not duplicate");
    }

    #[tokio::test]
    async fn retrieve_ranks_by_similarity() {
        let (manager, _index) = memory_manager(None);
        let mut chunks = chunk_text("docs/a.txt", SourceKind::PlainText, "alpha topic", 500, 100);
        chunks.extend(chunk_text("docs/b.txt", SourceKind::PlainText, "beta topic", 500, 100));
        chunks.extend(chunk_text("docs/c.txt", SourceKind::PlainText, "gamma topic", 500, 100));
        manager.upsert_chunks(&chunks).await.unwrap();

        let results = manager.retrieve("tell me about beta", 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].text.contains("beta"));
        assert!(results[0].score > results[1].score);
    }

    #[tokio::test]
    async fn min_score_floor_filters_weak_matches() {
        let (manager, _index) = memory_manager(Some(0.9));
        let mut chunks = chunk_text("docs/a.txt", SourceKind::PlainText, "alpha topic", 500, 100);
        chunks.extend(chunk_text("docs/b.txt", SourceKind::PlainText, "beta topic", 500, 100));
        manager.upsert_chunks(&chunks).await.unwrap();

        let results = manager.retrieve("about alpha", 5).await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].text.contains("alpha"));
    }

    #[tokio::test]
    async fn empty_index_returns_empty_not_error() {
        let (manager, _index) = memory_manager(None);
        let results = manager.retrieve("anything", 3).await.unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn parse_query_matches_extracts_text_and_score() {
        let json = serde_json::json!({
            "matches": [
                { "id": "c-0", "score": 0.92,
                  "metadata": { "text": "chunk text", "document": "a.txt" } },
                { "id": "c-1", "score": 0.15, "metadata": {} }
            ]
        });
        let results = parse_query_matches(&json).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].text, "chunk text");
        assert!((results[0].score - 0.92).abs() < 1e-6);
        assert_eq!(results[1].text, "");
    }

    #[test]
    fn parse_query_matches_rejects_bad_payload() {
        let json = serde_json::json!({ "unexpected": true });
        assert!(matches!(
            parse_query_matches(&json),
            Err(IndexError::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn ensure_index_treats_conflict_as_success() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/indexes/harborlight");
                then.status(404);
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/indexes");
                then.status(409).body("already exists");
            })
            .await;

        let config = IndexConfig {
            endpoint: server.base_url(),
            max_retries: 0,
            ..IndexConfig::default()
        };
        let index = RestIndex::new(config, "test-key".to_string()).unwrap();
        index.ensure_index(3).await.unwrap();
    }

    #[tokio::test]
    async fn ensure_index_noop_when_present() {
        let server = MockServer::start_async().await;
        let describe = server
            .mock_async(|when, then| {
                when.method(GET).path("/indexes/harborlight");
                then.status(200).json_body(serde_json::json!({ "name": "harborlight" }));
            })
            .await;

        let config = IndexConfig {
            endpoint: server.base_url(),
            max_retries: 0,
            ..IndexConfig::default()
        };
        let index = RestIndex::new(config, "test-key".to_string()).unwrap();
        index.ensure_index(3).await.unwrap();
        describe.assert_hits_async(1).await;
    }
}
