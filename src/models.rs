//! Core data models used throughout docbot.
//!
//! These types represent the documents, chunks, and replies that flow
//! through the ingestion and question-answering pipeline.

use serde::Serialize;

/// Normalized document stored in SQLite. Owned by exactly one tenant.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: String,
    pub tenant_id: String,
    /// Where the text came from: a file name, URL, or "pasted-text".
    pub source: String,
    pub body: String,
    /// Unix epoch milliseconds; drives oldest-first load order and the
    /// most-recent-ingestion tie-break in search.
    pub ingested_at: i64,
    pub dedup_hash: String,
}

/// A chunk of a document's body text.
///
/// `hash` is the SHA-256 hex of the text. Besides staleness detection it
/// serves as the chunk's stable identity for topic fingerprints, so the
/// fingerprint survives re-ingestion of unchanged content (row ids do not).
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub tenant_id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub text: String,
    pub hash: String,
}

/// A chunk scored against a query by the tenant index.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk_id: String,
    /// Stable chunk identity (content hash), used for topic fingerprints.
    pub hash: String,
    pub text: String,
    pub source: String,
    /// Cosine similarity in [-1, 1].
    pub score: f32,
}

/// Output of the retriever for one question.
#[derive(Debug, Clone)]
pub struct RetrievalResult {
    /// Top-k chunks, best first. Empty for a tenant with no documents.
    pub top_chunks: Vec<ScoredChunk>,
    /// Score of the best chunk, 0.0 when `top_chunks` is empty.
    pub top_score: f32,
    /// True when `top_score` is under the confidence threshold; the
    /// orchestrator must not call the LLM in that case.
    pub below_threshold: bool,
}

/// How the engine disposed of a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyMode {
    /// Grounded answer produced from retrieved context.
    Answered,
    /// Corpus empty or best match under the confidence threshold.
    DontKnow,
    /// Silenced by escalation; no text is emitted.
    Suppressed,
    /// Same user asked again inside the cooldown window.
    RateLimited,
    /// External failure mapped to a generic apology.
    Error,
}

/// Response handed back to the calling gateway, with enough metadata for
/// it to render or drop the message.
#[derive(Debug, Clone, Serialize)]
pub struct Reply {
    pub mode: ReplyMode,
    /// None exactly when the reply carries no text (`Suppressed`).
    pub text: Option<String>,
    /// Top retrieval score for this question, 0.0 when retrieval did not run.
    pub confidence: f32,
    /// Repeat count for the question's topic, 0 when escalation did not run.
    pub escalation_level: u32,
}

impl Reply {
    pub fn suppressed(level: u32) -> Self {
        Reply {
            mode: ReplyMode::Suppressed,
            text: None,
            confidence: 0.0,
            escalation_level: level,
        }
    }
}
