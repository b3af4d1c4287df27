//! SQLite persistence for documents, chunks, and embeddings.
//!
//! The store is the durable side of the tenant index: every row is keyed by
//! tenant, re-ingestion of a `(tenant, source)` document is a transactional
//! full replace, and startup rebuilds each tenant's in-memory shard from
//! here. Escalation and rate-limit state is deliberately not persisted —
//! its decay semantics make restart amnesia indistinguishable from a long
//! decay.
//!
//! Callers here are admin-facing (ingestion, CLI), so errors carry
//! specifics via `anyhow` context rather than the query-time taxonomy.

use anyhow::Result;
use sqlx::{Row, SqlitePool};

use crate::models::{Chunk, Document};

/// A chunk as loaded from the store, with its persisted embedding if one
/// exists for it.
#[derive(Debug, Clone)]
pub struct StoredChunk {
    pub chunk: Chunk,
    pub source: String,
    pub document_ingested_at: i64,
    pub vector: Option<Vec<f32>>,
    pub embedder_version: Option<String>,
}

/// Per-tenant corpus counters for `docbot stats`.
#[derive(Debug, Clone)]
pub struct TenantStats {
    pub tenant_id: String,
    pub documents: i64,
    pub chunks: i64,
    pub embedded_chunks: i64,
}

/// Transactionally replace one `(tenant, source)` document: upsert the
/// document row, drop its old chunks and vectors, insert the new ones.
/// A reader on another connection sees the old or the new set, never a mix.
///
/// Returns the effective document id: the existing row's id when the
/// `(tenant, source)` pair was already present, `document.id` otherwise.
pub async fn replace_document(
    pool: &SqlitePool,
    document: &Document,
    chunks: &[Chunk],
    vectors: &[Vec<f32>],
    embedder_version: &str,
) -> Result<String> {
    anyhow::ensure!(
        chunks.len() == vectors.len(),
        "chunk/vector count mismatch: {} chunks, {} vectors",
        chunks.len(),
        vectors.len()
    );

    let mut tx = pool.begin().await?;

    // Reuse the existing document id for this (tenant, source) if present,
    // so chunk foreign keys stay consistent across re-ingestion.
    let existing_id: Option<String> =
        sqlx::query_scalar("SELECT id FROM documents WHERE tenant_id = ? AND source = ?")
            .bind(&document.tenant_id)
            .bind(&document.source)
            .fetch_optional(&mut *tx)
            .await?;

    let doc_id = existing_id.unwrap_or_else(|| document.id.clone());

    sqlx::query(
        r#"
        INSERT INTO documents (id, tenant_id, source, body, ingested_at, dedup_hash)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(tenant_id, source) DO UPDATE SET
            body = excluded.body,
            ingested_at = excluded.ingested_at,
            dedup_hash = excluded.dedup_hash
        "#,
    )
    .bind(&doc_id)
    .bind(&document.tenant_id)
    .bind(&document.source)
    .bind(&document.body)
    .bind(document.ingested_at)
    .bind(&document.dedup_hash)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        "DELETE FROM chunk_vectors WHERE chunk_id IN (SELECT id FROM chunks WHERE document_id = ?)",
    )
    .bind(&doc_id)
    .execute(&mut *tx)
    .await?;
    sqlx::query("DELETE FROM chunks WHERE document_id = ?")
        .bind(&doc_id)
        .execute(&mut *tx)
        .await?;

    for (chunk, vector) in chunks.iter().zip(vectors.iter()) {
        sqlx::query(
            "INSERT INTO chunks (id, tenant_id, document_id, chunk_index, text, hash) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&chunk.id)
        .bind(&chunk.tenant_id)
        .bind(&doc_id)
        .bind(chunk.chunk_index)
        .bind(&chunk.text)
        .bind(&chunk.hash)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO chunk_vectors (chunk_id, tenant_id, embedding, embedder_version) VALUES (?, ?, ?, ?)",
        )
        .bind(&chunk.id)
        .bind(&chunk.tenant_id)
        .bind(crate::embedding::vec_to_blob(vector))
        .bind(embedder_version)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(doc_id)
}

/// Remove all documents, chunks, and vectors for a tenant. Idempotent.
pub async fn clear_tenant(pool: &SqlitePool, tenant_id: &str) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM chunk_vectors WHERE tenant_id = ?")
        .bind(tenant_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM chunks WHERE tenant_id = ?")
        .bind(tenant_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM documents WHERE tenant_id = ?")
        .bind(tenant_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

/// Load all of a tenant's chunks in ingestion order (oldest document first,
/// row insertion order breaking same-timestamp ties, then chunk index),
/// with whatever embeddings are persisted for them.
pub async fn load_tenant_chunks(pool: &SqlitePool, tenant_id: &str) -> Result<Vec<StoredChunk>> {
    let rows = sqlx::query(
        r#"
        SELECT c.id, c.tenant_id, c.document_id, c.chunk_index, c.text, c.hash,
               d.source, d.ingested_at,
               cv.embedding, cv.embedder_version
        FROM chunks c
        JOIN documents d ON d.id = c.document_id
        LEFT JOIN chunk_vectors cv ON cv.chunk_id = c.id
        WHERE c.tenant_id = ?
        ORDER BY d.ingested_at ASC, d.rowid ASC, c.chunk_index ASC
        "#,
    )
    .bind(tenant_id)
    .fetch_all(pool)
    .await?;

    let stored = rows
        .iter()
        .map(|row| {
            let blob: Option<Vec<u8>> = row.get("embedding");
            StoredChunk {
                chunk: Chunk {
                    id: row.get("id"),
                    tenant_id: row.get("tenant_id"),
                    document_id: row.get("document_id"),
                    chunk_index: row.get("chunk_index"),
                    text: row.get("text"),
                    hash: row.get("hash"),
                },
                source: row.get("source"),
                document_ingested_at: row.get("ingested_at"),
                vector: blob.map(|b| crate::embedding::blob_to_vec(&b)),
                embedder_version: row.get("embedder_version"),
            }
        })
        .collect();

    Ok(stored)
}

/// All tenant ids present in the store.
pub async fn list_tenants(pool: &SqlitePool) -> Result<Vec<String>> {
    let tenants: Vec<String> =
        sqlx::query_scalar("SELECT DISTINCT tenant_id FROM documents ORDER BY tenant_id")
            .fetch_all(pool)
            .await?;
    Ok(tenants)
}

/// Persist a freshly computed embedding for one chunk (lazy re-embed path).
pub async fn upsert_vector(
    pool: &SqlitePool,
    tenant_id: &str,
    chunk_id: &str,
    vector: &[f32],
    embedder_version: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO chunk_vectors (chunk_id, tenant_id, embedding, embedder_version)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(chunk_id) DO UPDATE SET
            embedding = excluded.embedding,
            embedder_version = excluded.embedder_version
        "#,
    )
    .bind(chunk_id)
    .bind(tenant_id)
    .bind(crate::embedding::vec_to_blob(vector))
    .bind(embedder_version)
    .execute(pool)
    .await?;
    Ok(())
}

/// Corpus counters per tenant.
pub async fn stats(pool: &SqlitePool) -> Result<Vec<TenantStats>> {
    let rows = sqlx::query(
        r#"
        SELECT d.tenant_id,
               COUNT(DISTINCT d.id) AS documents,
               COUNT(c.id) AS chunks,
               COUNT(cv.chunk_id) AS embedded_chunks
        FROM documents d
        LEFT JOIN chunks c ON c.document_id = d.id
        LEFT JOIN chunk_vectors cv ON cv.chunk_id = c.id
        GROUP BY d.tenant_id
        ORDER BY d.tenant_id
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| TenantStats {
            tenant_id: row.get("tenant_id"),
            documents: row.get("documents"),
            chunks: row.get("chunks"),
            embedded_chunks: row.get("embedded_chunks"),
        })
        .collect())
}
