//! Vector index backends.
//!
//! [`VectorStore`] is the seam between ingestion/retrieval and wherever the
//! vectors live. [`PineconeStore`] talks to a hosted Pinecone index over its
//! REST data plane; [`InMemoryStore`] keeps everything in process and is what
//! the tests run against.
//!
//! Every stored vector carries `{text, source, page}` metadata, which is all
//! retrieval and citation rendering need to reconstruct a passage.

use std::sync::RwLock;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::OnceCell;

use crate::embedding::cosine_similarity;
use crate::models::{Chunk, RetrievedPassage};

const PINECONE_CONTROL_PLANE: &str = "https://api.pinecone.io";
const PINECONE_API_VERSION: &str = "2024-07";

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or overwrite one vector per chunk, keyed by chunk ID.
    async fn upsert(&self, chunks: &[Chunk], vectors: &[Vec<f32>]) -> Result<()>;

    /// The `top_k` nearest passages, most similar first.
    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<RetrievedPassage>>;
}

fn chunk_metadata(chunk: &Chunk) -> Value {
    json!({
        "text": chunk.text,
        "source": chunk.source,
        "page": chunk.page,
    })
}

fn check_lengths(chunks: &[Chunk], vectors: &[Vec<f32>]) -> Result<()> {
    if chunks.len() != vectors.len() {
        bail!(
            "{} vectors supplied for {} chunks",
            vectors.len(),
            chunks.len()
        );
    }
    Ok(())
}

// ============ Pinecone ============

#[derive(Serialize)]
struct UpsertRequest<'a> {
    vectors: Vec<UpsertVector<'a>>,
}

#[derive(Serialize)]
struct UpsertVector<'a> {
    id: &'a str,
    values: &'a [f32],
    metadata: Value,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Deserialize)]
struct QueryMatch {
    #[serde(default)]
    score: Option<f32>,
    #[serde(default)]
    metadata: Option<Value>,
}

#[derive(Deserialize)]
struct IndexDescription {
    host: String,
}

/// A hosted Pinecone index, addressed by name.
///
/// The data-plane host is looked up once on first use and cached.
pub struct PineconeStore {
    index_name: String,
    api_key: String,
    client: reqwest::Client,
    host: OnceCell<String>,
}

impl PineconeStore {
    pub fn new(index_name: &str, api_key: &str, timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            index_name: index_name.to_string(),
            api_key: api_key.to_string(),
            client,
            host: OnceCell::new(),
        })
    }

    async fn host(&self) -> Result<&str> {
        let host = self
            .host
            .get_or_try_init(|| async {
                let url = format!("{}/indexes/{}", PINECONE_CONTROL_PLANE, self.index_name);
                let response = self
                    .client
                    .get(&url)
                    .header("Api-Key", &self.api_key)
                    .header("X-Pinecone-API-Version", PINECONE_API_VERSION)
                    .send()
                    .await
                    .with_context(|| format!("Failed to describe index '{}'", self.index_name))?;

                let status = response.status();
                if !status.is_success() {
                    let body = response.text().await.unwrap_or_default();
                    bail!(
                        "Pinecone index '{}' lookup failed ({}): {}",
                        self.index_name,
                        status,
                        body
                    );
                }
                let description: IndexDescription = response.json().await?;
                tracing::debug!(index = %self.index_name, host = %description.host, "resolved index host");
                Ok::<_, anyhow::Error>(normalize_host(&description.host))
            })
            .await?;
        Ok(host.as_str())
    }

    async fn post(&self, path: &str, body: &impl Serialize) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.host().await?, path);
        let response = self
            .client
            .post(&url)
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", PINECONE_API_VERSION)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("Pinecone API error {}: {}", status, body_text);
        }
        Ok(response)
    }
}

fn normalize_host(host: &str) -> String {
    let trimmed = host.trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    }
}

#[async_trait]
impl VectorStore for PineconeStore {
    async fn upsert(&self, chunks: &[Chunk], vectors: &[Vec<f32>]) -> Result<()> {
        check_lengths(chunks, vectors)?;
        if chunks.is_empty() {
            return Ok(());
        }
        let request = UpsertRequest {
            vectors: chunks
                .iter()
                .zip(vectors)
                .map(|(chunk, values)| UpsertVector {
                    id: &chunk.id,
                    values,
                    metadata: chunk_metadata(chunk),
                })
                .collect(),
        };
        self.post("/vectors/upsert", &request).await?;
        Ok(())
    }

    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<RetrievedPassage>> {
        let request = QueryRequest {
            vector,
            top_k,
            include_metadata: true,
        };
        let response: QueryResponse = self.post("/query", &request).await?.json().await?;
        Ok(parse_matches(response))
    }
}

fn parse_matches(response: QueryResponse) -> Vec<RetrievedPassage> {
    let empty = Value::Object(Default::default());
    response
        .matches
        .into_iter()
        .map(|m| RetrievedPassage::from_metadata(m.metadata.as_ref().unwrap_or(&empty), m.score))
        .collect()
}

// ============ In-memory ============

struct StoredVector {
    id: String,
    vector: Vec<f32>,
    metadata: Value,
}

/// Brute-force cosine-similarity store held in process memory.
#[derive(Default)]
pub struct InMemoryStore {
    vectors: RwLock<Vec<StoredVector>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.vectors.read().map(|v| v.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn upsert(&self, chunks: &[Chunk], vectors: &[Vec<f32>]) -> Result<()> {
        check_lengths(chunks, vectors)?;
        let mut stored = self
            .vectors
            .write()
            .map_err(|_| anyhow::anyhow!("in-memory store lock poisoned"))?;
        for (chunk, vector) in chunks.iter().zip(vectors) {
            stored.retain(|sv| sv.id != chunk.id);
            stored.push(StoredVector {
                id: chunk.id.clone(),
                vector: vector.clone(),
                metadata: chunk_metadata(chunk),
            });
        }
        Ok(())
    }

    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<RetrievedPassage>> {
        let stored = self
            .vectors
            .read()
            .map_err(|_| anyhow::anyhow!("in-memory store lock poisoned"))?;
        let mut scored: Vec<(f32, &StoredVector)> = stored
            .iter()
            .map(|sv| (cosine_similarity(vector, &sv.vector), sv))
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);

        Ok(scored
            .into_iter()
            .map(|(score, sv)| RetrievedPassage::from_metadata(&sv.metadata, Some(score)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PageNumber;

    fn chunk(id: &str, source: &str, page: u64, text: &str) -> Chunk {
        Chunk {
            id: id.to_string(),
            source: source.to_string(),
            page,
            chunk_index: 0,
            text: text.to_string(),
            hash: String::new(),
        }
    }

    #[tokio::test]
    async fn in_memory_ranks_by_similarity() {
        let store = InMemoryStore::new();
        store
            .upsert(
                &[
                    chunk("a", "a.pdf", 0, "alpha"),
                    chunk("b", "b.pdf", 3, "beta"),
                    chunk("c", "c.pdf", 1, "gamma"),
                ],
                &[vec![1.0, 0.0], vec![0.0, 1.0], vec![0.7, 0.7]],
            )
            .await
            .unwrap();

        let hits = store.query(&[0.0, 1.0], 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].content, "beta");
        assert_eq!(hits[0].source.as_deref(), Some("b.pdf"));
        assert_eq!(hits[0].page, PageNumber::Known(3));
        assert_eq!(hits[1].content, "gamma");
        assert!(hits[0].score.unwrap() > hits[1].score.unwrap());
    }

    #[tokio::test]
    async fn in_memory_upsert_overwrites_same_id() {
        let store = InMemoryStore::new();
        store
            .upsert(&[chunk("x", "a.pdf", 0, "old")], &[vec![1.0]])
            .await
            .unwrap();
        store
            .upsert(&[chunk("x", "a.pdf", 0, "new")], &[vec![1.0]])
            .await
            .unwrap();

        assert_eq!(store.len(), 1);
        let hits = store.query(&[1.0], 5).await.unwrap();
        assert_eq!(hits[0].content, "new");
    }

    #[tokio::test]
    async fn mismatched_vectors_rejected() {
        let store = InMemoryStore::new();
        let err = store
            .upsert(&[chunk("x", "a.pdf", 0, "t")], &[])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("0 vectors"));
        assert!(store.is_empty());
    }

    #[test]
    fn pinecone_matches_become_passages() {
        let response: QueryResponse = serde_json::from_value(json!({
            "matches": [
                {"id": "1", "score": 0.9, "metadata": {"text": "t1", "source": "data\\a.pdf", "page": 2.0}},
                {"id": "2", "score": 0.5}
            ]
        }))
        .unwrap();

        let passages = parse_matches(response);
        assert_eq!(passages.len(), 2);
        assert_eq!(passages[0].source.as_deref(), Some("data/a.pdf"));
        assert_eq!(passages[0].page, PageNumber::Known(2));
        assert_eq!(passages[0].score, Some(0.9));
        assert_eq!(passages[1].source, None);
        assert_eq!(passages[1].page, PageNumber::Unknown);
        assert_eq!(passages[1].content, "");
    }

    #[test]
    fn query_request_uses_camel_case() {
        let body = serde_json::to_value(QueryRequest {
            vector: &[0.5],
            top_k: 6,
            include_metadata: true,
        })
        .unwrap();
        assert_eq!(body["topK"], 6);
        assert_eq!(body["includeMetadata"], true);
    }

    #[test]
    fn host_gets_scheme() {
        assert_eq!(
            normalize_host("idx-abc.svc.pinecone.io"),
            "https://idx-abc.svc.pinecone.io"
        );
        assert_eq!(normalize_host("http://localhost:5080/"), "http://localhost:5080");
    }
}
