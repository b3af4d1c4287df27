//! Embedder abstraction and implementations.
//!
//! Defines the [`Embedder`] trait and two concrete implementations:
//! - **[`HashEmbedder`]** — deterministic signed feature-hash projection.
//!   No network, no model download; same text always yields the same
//!   vector. This is the default, and intentionally structural rather than
//!   semantic: retrieval quality improves over the product's life by
//!   swapping this one component.
//! - **[`OllamaEmbedder`]** — calls a local Ollama instance's `/api/embed`
//!   endpoint with timeout, retry, and exponential backoff.
//!
//! Every vector is tagged with the embedder version from configuration.
//! Mixed-version comparison is forbidden at the index; the retriever
//! handles the mismatch by lazily re-embedding the affected tenant.
//!
//! Also provides vector utilities:
//! - [`cosine_similarity`] — similarity between two vectors in [-1, 1]
//! - [`vec_to_blob`] / [`blob_to_vec`] — little-endian f32 encoding for
//!   SQLite BLOB storage

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};

/// Text-to-vector function, pluggable and versioned.
///
/// Implementations must be deterministic per version: the same text and the
/// same version always yield the same vector. That property is what makes
/// caching and test reproducibility possible.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Version identifier stamped on every vector this embedder produces.
    fn version(&self) -> &str;
    /// Vector dimensionality.
    fn dims(&self) -> usize;
    /// Embed a batch of texts, one vector per input, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Embed a single query text.
///
/// Convenience wrapper around [`Embedder::embed_batch`] for the
/// one-question-at-a-time retrieval path. The result is never persisted.
pub async fn embed_query(embedder: &dyn Embedder, text: &str) -> Result<Vec<f32>> {
    let vectors = embedder.embed_batch(&[text.to_string()]).await?;
    vectors
        .into_iter()
        .next()
        .ok_or_else(|| Error::ExternalService("empty embedding response".to_string()))
}

/// Create the appropriate [`Embedder`] from configuration.
///
/// | Config value | Implementation |
/// |--------------|----------------|
/// | `"hash"` | [`HashEmbedder`] |
/// | `"ollama"` | [`OllamaEmbedder`] |
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Box<dyn Embedder>> {
    match config.provider.as_str() {
        "hash" => Ok(Box::new(HashEmbedder::new(
            config.version.clone(),
            config.dims,
        ))),
        "ollama" => Ok(Box::new(OllamaEmbedder::new(config)?)),
        other => Err(Error::InvalidConfiguration(format!(
            "unknown embedding provider: {}",
            other
        ))),
    }
}

// ============ Hash projection embedder ============

/// Deterministic signed feature-hash projection.
///
/// Tokenizes on non-alphanumeric boundaries, lowercases, and hashes each
/// unigram and adjacent bigram into a bucket of the output vector with a
/// hash-derived sign, then L2-normalizes. Cosine similarity over these
/// vectors approximates weighted token overlap, which is enough for the
/// confidence gate and topic grouping to behave sensibly on doc corpora.
pub struct HashEmbedder {
    version: String,
    dims: usize,
}

impl HashEmbedder {
    pub fn new(version: String, dims: usize) -> Self {
        Self { version, dims }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dims];

        let tokens: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(|t| t.to_lowercase())
            .collect();

        for token in &tokens {
            self.add_feature(&mut v, token, 1.0);
        }
        // Bigrams capture a little word order without an actual model.
        for pair in tokens.windows(2) {
            self.add_feature(&mut v, &format!("{} {}", pair[0], pair[1]), 0.5);
        }

        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for x in &mut v {
                *x /= norm;
            }
        }
        v
    }

    fn add_feature(&self, v: &mut [f32], feature: &str, weight: f32) {
        let mut hasher = Sha256::new();
        hasher.update(self.version.as_bytes());
        hasher.update(b"\0");
        hasher.update(feature.as_bytes());
        let digest = hasher.finalize();

        let h = u64::from_le_bytes([
            digest[0], digest[1], digest[2], digest[3], digest[4], digest[5], digest[6], digest[7],
        ]);
        let bucket = (h % self.dims as u64) as usize;
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        v[bucket] += sign * weight;
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn version(&self) -> &str {
        &self.version
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

// ============ Ollama embedder ============

/// Embedding via a local Ollama instance.
///
/// Calls `POST /api/embed` on the configured URL (default
/// `http://localhost:11434`). Requires an embedding model to be pulled
/// (e.g. `ollama pull nomic-embed-text`).
///
/// Retry strategy: HTTP 429 and 5xx retry with exponential backoff
/// (1s, 2s, 4s, ... capped at 2^5); other 4xx fail immediately; network
/// errors retry.
pub struct OllamaEmbedder {
    version: String,
    model: String,
    dims: usize,
    url: String,
    timeout: Duration,
    max_retries: u32,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config.model.clone().ok_or_else(|| {
            Error::InvalidConfiguration(
                "embedding.model required for the ollama provider".to_string(),
            )
        })?;

        Ok(Self {
            version: config.version.clone(),
            model,
            dims: config.dims,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| "http://localhost:11434".to_string()),
            timeout: Duration::from_secs(config.timeout_secs),
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn version(&self) -> &str {
        &self.version
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| Error::ExternalService(e.to_string()))?;

        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = client
                .post(format!("{}/api/embed", self.url))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response
                            .json()
                            .await
                            .map_err(|e| Error::ExternalService(e.to_string()))?;
                        return parse_ollama_response(&json);
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let text = response.text().await.unwrap_or_default();
                        last_err = Some(Error::ExternalService(format!(
                            "Ollama API error {}: {}",
                            status, text
                        )));
                        continue;
                    }

                    let text = response.text().await.unwrap_or_default();
                    return Err(Error::ExternalService(format!(
                        "Ollama API error {}: {}",
                        status, text
                    )));
                }
                Err(e) if e.is_timeout() => {
                    last_err = Some(Error::ExternalServiceTimeout(format!(
                        "Ollama embed at {}",
                        self.url
                    )));
                    continue;
                }
                Err(e) => {
                    last_err = Some(Error::ExternalService(format!(
                        "Ollama connection error (is Ollama running at {}?): {}",
                        self.url, e
                    )));
                    continue;
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| Error::ExternalService("embedding failed after retries".into())))
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| {
            Error::ExternalService("invalid Ollama response: missing embeddings array".to_string())
        })?;

    let mut result = Vec::with_capacity(embeddings.len());

    for embedding in embeddings {
        let vec: Vec<f32> = embedding
            .as_array()
            .ok_or_else(|| {
                Error::ExternalService(
                    "invalid Ollama response: embedding is not an array".to_string(),
                )
            })?
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        result.push(vec);
    }

    Ok(result)
}

// ============ Vector utilities ============

/// Encode a float vector as a BLOB (little-endian f32 bytes).
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Compute cosine similarity between two vectors.
///
/// Returns a value in `[-1.0, 1.0]`; `0.0` for empty vectors, vectors of
/// different lengths, or a zero-magnitude operand.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash_embedder() -> HashEmbedder {
        HashEmbedder::new("hash-v1".to_string(), 384)
    }

    #[tokio::test]
    async fn test_hash_embedding_deterministic() {
        let e = hash_embedder();
        let a = embed_query(&e, "how long is the unbonding period?")
            .await
            .unwrap();
        let b = embed_query(&e, "how long is the unbonding period?")
            .await
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 384);
    }

    #[tokio::test]
    async fn test_hash_embedding_unit_norm() {
        let e = hash_embedder();
        let v = embed_query(&e, "staking rewards accrue daily").await.unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[tokio::test]
    async fn test_hash_embedding_empty_text_is_zero_vector() {
        let e = hash_embedder();
        let v = embed_query(&e, "").await.unwrap();
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[tokio::test]
    async fn test_version_changes_vectors() {
        let v1 = HashEmbedder::new("hash-v1".to_string(), 64);
        let v2 = HashEmbedder::new("hash-v2".to_string(), 64);
        let a = embed_query(&v1, "unbonding period").await.unwrap();
        let b = embed_query(&v2, "unbonding period").await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_overlapping_text_scores_higher_than_unrelated() {
        let e = hash_embedder();
        let doc = embed_query(&e, "the unbonding period is 7 days")
            .await
            .unwrap();
        let close = embed_query(&e, "how long is the unbonding period")
            .await
            .unwrap();
        let far = embed_query(&e, "what color is the logo").await.unwrap();
        assert!(cosine_similarity(&doc, &close) > cosine_similarity(&doc, &far));
    }

    #[test]
    fn test_vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        let blob = vec_to_blob(&vec);
        assert_eq!(blob.len(), 20);
        assert_eq!(blob_to_vec(&blob), vec);
    }

    #[test]
    fn test_cosine_identical_and_opposite() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
        let a = vec![1.0, 0.0];
        let b = vec![-1.0, 0.0];
        assert!((cosine_similarity(&a, &b) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_create_embedder_unknown_provider() {
        let mut cfg = crate::config::EmbeddingConfig::default();
        cfg.provider = "word2vec".to_string();
        assert!(create_embedder(&cfg).is_err());
    }
}
