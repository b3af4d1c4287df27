//! Ingestion pipeline.
//!
//! Coordinates the document flow: chunk → embed → transactional store
//! replace → copy-on-write index swap. The document source collaborator
//! (admin CLI, HTTP gateway) hands over `(tenant, source, raw text)`; URL
//! fetching and binary extraction happen upstream and are not this crate's
//! concern.
//!
//! Re-ingesting a `(tenant, source)` pair is a full replace, not a diff:
//! the chunker is deterministic, so unchanged content produces identical
//! chunks and stable topic fingerprints either way. A tenant springs into
//! existence on its first ingested document.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use tracing::{debug, info};
use uuid::Uuid;

use crate::chunk::chunk_document;
use crate::config::Config;
use crate::embedding::Embedder;
use crate::index::{IndexedChunk, TenantIndex, TenantShard};
use crate::models::Document;
use crate::store;

/// Outcome of one ingestion, for admin-facing reporting.
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub document_id: String,
    pub chunks_written: usize,
}

/// Ingest one document for a tenant: full replace of any previous document
/// with the same source name.
pub async fn ingest_text(
    config: &Config,
    pool: &SqlitePool,
    index: &TenantIndex,
    embedder: &dyn Embedder,
    tenant_id: &str,
    source: &str,
    text: &str,
) -> Result<IngestReport> {
    let document = Document {
        id: Uuid::new_v4().to_string(),
        tenant_id: tenant_id.to_string(),
        source: source.to_string(),
        body: text.to_string(),
        ingested_at: chrono::Utc::now().timestamp_millis(),
        dedup_hash: dedup_hash(tenant_id, source, text),
    };

    let chunks = chunk_document(
        tenant_id,
        &document.id,
        text,
        config.chunking.chunk_size,
        config.chunking.chunk_overlap,
    )?;

    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let vectors = embedder
        .embed_batch(&texts)
        .await
        .with_context(|| format!("embedding {} chunks for tenant '{}'", texts.len(), tenant_id))?;

    // The store reuses the existing row id for a re-ingested source; the
    // report must carry that effective id, not the candidate one.
    let document_id =
        store::replace_document(pool, &document, &chunks, &vectors, embedder.version())
            .await
            .with_context(|| format!("storing document '{}' for tenant '{}'", source, tenant_id))?;

    // Rebuild the shard from the store so the in-memory view always
    // matches what a restart would load.
    rebuild_tenant(pool, index, embedder, tenant_id).await?;

    info!(
        tenant = tenant_id,
        source,
        chunks = chunks.len(),
        "document ingested"
    );

    Ok(IngestReport {
        document_id,
        chunks_written: chunks.len(),
    })
}

/// Rebuild a tenant's in-memory shard from the store, re-embedding any
/// chunk whose persisted vector is missing or was produced by a different
/// embedder version. Returns the number of chunks re-embedded.
///
/// This is both the startup load path and the lazy recovery path for
/// `IncompatibleEmbeddingVersion`.
pub async fn rebuild_tenant(
    pool: &SqlitePool,
    index: &TenantIndex,
    embedder: &dyn Embedder,
    tenant_id: &str,
) -> Result<usize> {
    let stored = store::load_tenant_chunks(pool, tenant_id)
        .await
        .with_context(|| format!("loading chunks for tenant '{}'", tenant_id))?;

    let version = embedder.version();

    let stale: Vec<usize> = stored
        .iter()
        .enumerate()
        .filter(|(_, s)| s.vector.is_none() || s.embedder_version.as_deref() != Some(version))
        .map(|(i, _)| i)
        .collect();

    let mut fresh_vectors = if stale.is_empty() {
        Vec::new()
    } else {
        debug!(
            tenant = tenant_id,
            stale = stale.len(),
            version,
            "re-embedding stale chunks"
        );
        let texts: Vec<String> = stale.iter().map(|&i| stored[i].chunk.text.clone()).collect();
        embedder
            .embed_batch(&texts)
            .await
            .with_context(|| format!("re-embedding tenant '{}'", tenant_id))?
    };

    // Persist the fresh vectors so the next restart does not repeat the work.
    for (&i, vector) in stale.iter().zip(fresh_vectors.iter()) {
        store::upsert_vector(pool, tenant_id, &stored[i].chunk.id, vector, version).await?;
    }

    let mut chunks = Vec::with_capacity(stored.len());
    for (i, s) in stored.into_iter().enumerate() {
        let vector = if let Some(pos) = stale.iter().position(|&j| j == i) {
            std::mem::take(&mut fresh_vectors[pos])
        } else {
            s.vector.unwrap_or_default()
        };
        chunks.push(IndexedChunk {
            chunk_id: s.chunk.id,
            document_id: s.chunk.document_id,
            hash: s.chunk.hash,
            text: s.chunk.text,
            source: s.source,
            tenant_id: tenant_id.to_string(),
            vector,
            seq: index.next_seq(),
        });
    }

    index.replace_tenant(
        tenant_id,
        TenantShard {
            embedder_version: version.to_string(),
            chunks,
        },
    )?;

    Ok(stale.len())
}

/// Load every tenant's shard from the store. Called once at process start.
pub async fn load_all_tenants(
    pool: &SqlitePool,
    index: &TenantIndex,
    embedder: &dyn Embedder,
) -> Result<usize> {
    let tenants = store::list_tenants(pool).await?;
    for tenant_id in &tenants {
        rebuild_tenant(pool, index, embedder, tenant_id).await?;
    }
    if !tenants.is_empty() {
        info!(tenants = tenants.len(), "tenant shards loaded");
    }
    Ok(tenants.len())
}

/// Wipe a tenant's documents from the store and its shard from the index.
/// Idempotent on an already-empty tenant.
pub async fn clear_tenant(pool: &SqlitePool, index: &TenantIndex, tenant_id: &str) -> Result<()> {
    store::clear_tenant(pool, tenant_id)
        .await
        .with_context(|| format!("clearing tenant '{}'", tenant_id))?;
    index.clear(tenant_id);
    info!(tenant = tenant_id, "tenant cleared");
    Ok(())
}

fn dedup_hash(tenant_id: &str, source: &str, body: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(tenant_id.as_bytes());
    hasher.update(b"\0");
    hasher.update(source.as_bytes());
    hasher.update(b"\0");
    hasher.update(body.as_bytes());
    format!("{:x}", hasher.finalize())
}
