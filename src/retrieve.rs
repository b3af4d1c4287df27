//! Question retrieval and topic fingerprinting.
//!
//! Embeds an incoming question, searches the asking tenant's index, and
//! applies the confidence gate: when the best similarity is under the
//! configured threshold, the result is flagged `below_threshold` and the
//! orchestrator answers "don't know" instead of calling the LLM on context
//! it judged irrelevant.
//!
//! Also derives topic fingerprints. When retrieval found a confident match
//! the fingerprint is the top chunk's content hash, so paraphrases that
//! land on the same chunk count as the same topic. When it did not, the
//! fallback is a coarse hash of the normalized question text.

use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use tracing::warn;

use crate::config::Config;
use crate::embedding::{embed_query, Embedder};
use crate::error::{Error, Result};
use crate::index::TenantIndex;
use crate::ingest::rebuild_tenant;
use crate::models::RetrievalResult;

/// Retrieve grounding context for a question from one tenant's corpus.
///
/// Returns an empty result (not an error) for a tenant with no documents.
/// An embedder-version mismatch against the tenant's shard triggers one
/// lazy re-embed of that tenant, then a single retry.
pub async fn retrieve(
    config: &Config,
    pool: &SqlitePool,
    index: &TenantIndex,
    embedder: &dyn Embedder,
    tenant_id: &str,
    question: &str,
) -> Result<RetrievalResult> {
    let query_vector = embed_query(embedder, question).await?;
    let k = config.retrieval.top_k;

    let top_chunks = match index.search(tenant_id, &query_vector, embedder.version(), k) {
        Ok(chunks) => chunks,
        Err(Error::IncompatibleEmbeddingVersion { expected, found }) => {
            warn!(
                tenant = tenant_id,
                expected, found, "embedder version drift, re-embedding tenant"
            );
            rebuild_tenant(pool, index, embedder, tenant_id)
                .await
                .map_err(|e| Error::ExternalService(format!("re-embed failed: {:#}", e)))?;
            index.search(tenant_id, &query_vector, embedder.version(), k)?
        }
        Err(e) => return Err(e),
    };

    let top_score = top_chunks.first().map(|c| c.score).unwrap_or(0.0);
    let below_threshold =
        top_chunks.is_empty() || top_score < config.retrieval.confidence_threshold;

    Ok(RetrievalResult {
        top_chunks,
        top_score,
        below_threshold,
    })
}

/// Authoritative topic fingerprint for an occurrence, derived from the
/// retrieval result.
pub fn topic_fingerprint(result: &RetrievalResult, question: &str) -> String {
    if !result.below_threshold {
        if let Some(top) = result.top_chunks.first() {
            return format!("c:{}", &top.hash[..top.hash.len().min(16)]);
        }
    }
    question_fingerprint(question)
}

/// Provisional fingerprint, available before retrieval runs: a coarse hash
/// of the normalized question text.
pub fn question_fingerprint(question: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_question(question).as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    format!("q:{}", &digest[..16])
}

/// Normalize a question for fingerprinting: lowercase, strip punctuation,
/// drop filler words, collapse whitespace.
pub fn normalize_question(text: &str) -> String {
    const FILLERS: &[&str] = &[
        "please", "pls", "can", "you", "could", "hey", "hi", "hello", "yo", "the", "a", "an",
    ];

    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty() && !FILLERS.contains(w))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ScoredChunk;

    fn result(chunks: Vec<ScoredChunk>, below: bool) -> RetrievalResult {
        let top_score = chunks.first().map(|c| c.score).unwrap_or(0.0);
        RetrievalResult {
            top_chunks: chunks,
            top_score,
            below_threshold: below,
        }
    }

    fn scored(hash: &str, score: f32) -> ScoredChunk {
        ScoredChunk {
            chunk_id: "id".to_string(),
            hash: hash.to_string(),
            text: "text".to_string(),
            source: "src".to_string(),
            score,
        }
    }

    #[test]
    fn test_normalize_strips_fillers_and_punctuation() {
        assert_eq!(
            normalize_question("Hey, can you PLEASE tell me the unbonding period?!"),
            "tell me unbonding period"
        );
    }

    #[test]
    fn test_question_fingerprint_stable_under_phrasing_noise() {
        let a = question_fingerprint("can you please explain staking?");
        let b = question_fingerprint("Explain   staking!!!");
        assert_eq!(a, b);
    }

    #[test]
    fn test_question_fingerprint_differs_for_different_questions() {
        assert_ne!(
            question_fingerprint("when is the airdrop"),
            question_fingerprint("how do I stake")
        );
    }

    #[test]
    fn test_confident_match_uses_chunk_identity() {
        let r = result(
            vec![scored("abcdef0123456789deadbeef", 0.8)],
            false,
        );
        let fp1 = topic_fingerprint(&r, "how long to unstake");
        let fp2 = topic_fingerprint(&r, "what is the unbonding period");
        assert_eq!(fp1, "c:abcdef0123456789");
        // Paraphrases hitting the same chunk share a topic.
        assert_eq!(fp1, fp2);
    }

    #[test]
    fn test_low_confidence_falls_back_to_question_hash() {
        let r = result(vec![scored("abcdef0123456789", 0.1)], true);
        let fp = topic_fingerprint(&r, "what is the token price");
        assert!(fp.starts_with("q:"));
        assert_eq!(fp, question_fingerprint("what is the token price"));
    }

    #[test]
    fn test_empty_retrieval_falls_back_to_question_hash() {
        let r = result(Vec::new(), true);
        assert!(topic_fingerprint(&r, "anything").starts_with("q:"));
    }
}
