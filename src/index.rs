//! In-memory per-tenant vector index.
//!
//! Logically one independent collection per tenant. Physically a single map
//! keyed by tenant id, where each value is an immutable shard behind an
//! `Arc`. All mutation is copy-on-write: callers build a complete
//! replacement shard off-lock (from the store, via `ingest::rebuild_tenant`)
//! and swap it in with one assignment, so a concurrent search observes
//! either the fully-old or fully-new chunk set, never a partially-updated
//! one.
//!
//! Tenant isolation is enforced here at the API, not left to callers:
//! `replace_tenant` rejects shards containing foreign chunks, `search`
//! scopes itself to the requested tenant's shard and additionally verifies
//! the tenant id on every returned chunk, reporting
//! [`Error::TenantIsolationViolation`] if either check ever fails.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::embedding::cosine_similarity;
use crate::error::{Error, Result};
use crate::models::ScoredChunk;

/// One chunk plus its embedding, resident in a tenant shard.
#[derive(Debug, Clone)]
pub struct IndexedChunk {
    pub chunk_id: String,
    pub document_id: String,
    /// Content hash; stable chunk identity for topic fingerprints.
    pub hash: String,
    pub text: String,
    pub source: String,
    pub tenant_id: String,
    pub vector: Vec<f32>,
    /// Monotone ingest sequence, used to break score ties in favor of the
    /// most recently ingested content.
    pub seq: u64,
}

/// Immutable snapshot of one tenant's chunks. Replaced wholesale on every
/// mutation.
#[derive(Debug)]
pub struct TenantShard {
    pub embedder_version: String,
    pub chunks: Vec<IndexedChunk>,
}

/// Process-wide index shared by all gateways.
pub struct TenantIndex {
    shards: RwLock<HashMap<String, Arc<TenantShard>>>,
    seq: AtomicU64,
}

impl TenantIndex {
    pub fn new() -> Self {
        Self {
            shards: RwLock::new(HashMap::new()),
            seq: AtomicU64::new(0),
        }
    }

    /// Next ingest sequence number. Callers stamp chunks with this before
    /// handing them to `replace_tenant`.
    pub fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }

    fn shard(&self, tenant_id: &str) -> Option<Arc<TenantShard>> {
        self.shards
            .read()
            .expect("tenant index lock poisoned")
            .get(tenant_id)
            .cloned()
    }

    /// Swap in a complete replacement shard for a tenant, creating the
    /// tenant on first use. Every chunk must belong to that tenant; a
    /// foreign chunk fails the whole swap and leaves the old shard in
    /// place.
    pub fn replace_tenant(&self, tenant_id: &str, shard: TenantShard) -> Result<()> {
        for c in &shard.chunks {
            if c.tenant_id != tenant_id {
                return Err(Error::TenantIsolationViolation {
                    expected: tenant_id.to_string(),
                    found: c.tenant_id.clone(),
                });
            }
        }

        self.shards
            .write()
            .expect("tenant index lock poisoned")
            .insert(tenant_id.to_string(), Arc::new(shard));
        Ok(())
    }

    /// Remove all chunks for a tenant. Idempotent on an empty tenant.
    pub fn clear(&self, tenant_id: &str) {
        self.shards
            .write()
            .expect("tenant index lock poisoned")
            .remove(tenant_id);
    }

    /// True when the tenant has no indexed chunks.
    pub fn is_empty(&self, tenant_id: &str) -> bool {
        self.shard(tenant_id).map_or(true, |s| s.chunks.is_empty())
    }

    /// Nearest-neighbor search over one tenant's chunks.
    ///
    /// Returns up to `k` results in descending cosine-similarity order,
    /// ties broken by most-recent-ingestion first. An unknown or empty
    /// tenant yields an empty vec, not an error. A shard built by a
    /// different embedder version yields `IncompatibleEmbeddingVersion`.
    pub fn search(
        &self,
        tenant_id: &str,
        query_vector: &[f32],
        query_version: &str,
        k: usize,
    ) -> Result<Vec<ScoredChunk>> {
        // Snapshot the shard, then score without holding any lock.
        let shard = match self.shard(tenant_id) {
            Some(s) => s,
            None => return Ok(Vec::new()),
        };

        if shard.chunks.is_empty() {
            return Ok(Vec::new());
        }

        if shard.embedder_version != query_version {
            return Err(Error::IncompatibleEmbeddingVersion {
                expected: query_version.to_string(),
                found: shard.embedder_version.clone(),
            });
        }

        let mut scored: Vec<(&IndexedChunk, f32)> = shard
            .chunks
            .iter()
            .map(|c| (c, cosine_similarity(query_vector, &c.vector)))
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.0.seq.cmp(&a.0.seq))
        });
        scored.truncate(k);

        let mut results = Vec::with_capacity(scored.len());
        for (c, score) in scored {
            if c.tenant_id != tenant_id {
                return Err(Error::TenantIsolationViolation {
                    expected: tenant_id.to_string(),
                    found: c.tenant_id.clone(),
                });
            }
            results.push(ScoredChunk {
                chunk_id: c.chunk_id.clone(),
                hash: c.hash.clone(),
                text: c.text.clone(),
                source: c.source.clone(),
                score,
            });
        }

        Ok(results)
    }
}

impl Default for TenantIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(tenant: &str, text: &str, vector: Vec<f32>, seq: u64) -> IndexedChunk {
        IndexedChunk {
            chunk_id: format!("{}-{}", tenant, seq),
            document_id: "doc".to_string(),
            hash: format!("hash-{}", text),
            text: text.to_string(),
            source: "test".to_string(),
            tenant_id: tenant.to_string(),
            vector,
            seq,
        }
    }

    fn shard(chunks: Vec<IndexedChunk>) -> TenantShard {
        TenantShard {
            embedder_version: "hash-v1".to_string(),
            chunks,
        }
    }

    #[test]
    fn test_unknown_tenant_returns_empty() {
        let index = TenantIndex::new();
        let results = index.search("nobody", &[1.0, 0.0], "hash-v1", 3).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_search_is_scoped_to_tenant() {
        let index = TenantIndex::new();
        index
            .replace_tenant(
                "alpha",
                shard(vec![chunk("alpha", "alpha text", vec![1.0, 0.0], 0)]),
            )
            .unwrap();
        index
            .replace_tenant(
                "beta",
                shard(vec![chunk("beta", "beta text", vec![1.0, 0.0], 1)]),
            )
            .unwrap();

        let results = index.search("alpha", &[1.0, 0.0], "hash-v1", 10).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].text, "alpha text");
    }

    #[test]
    fn test_descending_scores_with_recency_tiebreak() {
        let index = TenantIndex::new();
        index
            .replace_tenant(
                "t",
                shard(vec![
                    chunk("t", "old exact", vec![1.0, 0.0], 0),
                    chunk("t", "orthogonal", vec![0.0, 1.0], 1),
                    chunk("t", "new exact", vec![1.0, 0.0], 2),
                ]),
            )
            .unwrap();

        let results = index.search("t", &[1.0, 0.0], "hash-v1", 3).unwrap();
        assert_eq!(results.len(), 3);
        // Two chunks tie at similarity 1.0; the newer ingest wins.
        assert_eq!(results[0].text, "new exact");
        assert_eq!(results[1].text, "old exact");
        assert_eq!(results[2].text, "orthogonal");
    }

    #[test]
    fn test_version_mismatch_is_reported() {
        let index = TenantIndex::new();
        index
            .replace_tenant("t", shard(vec![chunk("t", "text", vec![1.0], 0)]))
            .unwrap();

        let err = index.search("t", &[1.0], "hash-v2", 3).unwrap_err();
        assert!(matches!(err, Error::IncompatibleEmbeddingVersion { .. }));
    }

    #[test]
    fn test_replace_tenant_swaps_wholesale() {
        let index = TenantIndex::new();
        index
            .replace_tenant("t", shard(vec![chunk("t", "first corpus", vec![1.0, 0.0], 0)]))
            .unwrap();
        index
            .replace_tenant("t", shard(vec![chunk("t", "second corpus", vec![1.0, 0.0], 1)]))
            .unwrap();

        let results = index.search("t", &[1.0, 0.0], "hash-v1", 10).unwrap();
        let texts: Vec<&str> = results.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(texts, vec!["second corpus"]);
    }

    #[test]
    fn test_clear_is_idempotent() {
        let index = TenantIndex::new();
        index
            .replace_tenant("t", shard(vec![chunk("t", "x", vec![1.0], 0)]))
            .unwrap();
        index.clear("t");
        index.clear("t");
        assert!(index.is_empty("t"));
        assert!(index.search("t", &[1.0], "hash-v1", 3).unwrap().is_empty());
    }

    #[test]
    fn test_foreign_chunk_rejected_and_old_shard_kept() {
        let index = TenantIndex::new();
        index
            .replace_tenant("alpha", shard(vec![chunk("alpha", "mine", vec![1.0], 0)]))
            .unwrap();

        let err = index
            .replace_tenant(
                "alpha",
                shard(vec![
                    chunk("alpha", "mine v2", vec![1.0], 1),
                    chunk("beta", "sneaky", vec![1.0], 2),
                ]),
            )
            .unwrap_err();
        assert!(matches!(err, Error::TenantIsolationViolation { .. }));

        // The failed swap left the previous shard intact.
        let results = index.search("alpha", &[1.0], "hash-v1", 10).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].text, "mine");
    }

    #[test]
    fn test_concurrent_swaps_never_leak_across_tenants() {
        use std::sync::Arc as StdArc;
        use std::thread;

        let index = StdArc::new(TenantIndex::new());
        let mut handles = Vec::new();

        for t in 0..4 {
            let idx = index.clone();
            handles.push(thread::spawn(move || {
                let tenant = format!("tenant-{}", t);
                for round in 0..50u64 {
                    let seq = idx.next_seq();
                    idx.replace_tenant(
                        &tenant,
                        shard(vec![chunk(
                            &tenant,
                            &format!("{} r{}", tenant, round),
                            vec![1.0, 0.0],
                            seq,
                        )]),
                    )
                    .unwrap();
                }
            }));
        }

        for t in 0..4 {
            let idx = index.clone();
            handles.push(thread::spawn(move || {
                let tenant = format!("tenant-{}", t);
                for _ in 0..200 {
                    let results = idx.search(&tenant, &[1.0, 0.0], "hash-v1", 5).unwrap();
                    for r in results {
                        assert!(r.text.starts_with(&tenant), "leaked chunk: {}", r.text);
                    }
                }
            }));
        }

        for h in handles {
            h.join().unwrap();
        }
    }
}
