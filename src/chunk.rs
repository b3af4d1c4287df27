//! Fixed-window text chunker with overlap.
//!
//! Splits document body text into overlapping windows of `chunk_size`
//! characters, stepping `chunk_size - chunk_overlap` each time. Windows are
//! cut on char boundaries only, so any UTF-8 input is safe.
//!
//! The chunker is deliberately exact: no trimming, no boundary snapping.
//! Concatenating the chunks with each chunk's leading overlap removed
//! reproduces the source text byte-for-byte, which keeps "re-ingest is a
//! full replace" semantics honest — identical input and parameters always
//! produce identical chunks.
//!
//! Each chunk receives a UUID row id plus a SHA-256 hash of its text; the
//! hash is the chunk's stable identity across re-ingestion.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::Chunk;

/// Split text into overlapping fixed-size chunks.
///
/// `size` and `overlap` are measured in chars, with `overlap < size` and
/// `size > 0`; violating either fails with `InvalidConfiguration`.
/// Empty input yields an empty sequence, not an error.
pub fn chunk_text(text: &str, size: usize, overlap: usize) -> Result<Vec<String>> {
    if size == 0 {
        return Err(Error::InvalidConfiguration(
            "chunking.chunk_size must be > 0".to_string(),
        ));
    }
    if overlap >= size {
        return Err(Error::InvalidConfiguration(format!(
            "chunking.chunk_overlap ({}) must be < chunk_size ({})",
            overlap, size
        )));
    }

    if text.is_empty() {
        return Ok(Vec::new());
    }

    // Byte offset of every char boundary, plus the end of the text.
    let mut boundaries: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
    boundaries.push(text.len());
    let char_len = boundaries.len() - 1;

    let step = size - overlap;
    let mut chunks = Vec::new();
    let mut start = 0usize;

    loop {
        let end = (start + size).min(char_len);
        chunks.push(text[boundaries[start]..boundaries[end]].to_string());
        if end == char_len {
            break;
        }
        start += step;
    }

    Ok(chunks)
}

/// Chunk a document's body and attach tenant/document metadata.
/// Indices are contiguous starting at 0.
pub fn chunk_document(
    tenant_id: &str,
    document_id: &str,
    text: &str,
    size: usize,
    overlap: usize,
) -> Result<Vec<Chunk>> {
    let pieces = chunk_text(text, size, overlap)?;

    Ok(pieces
        .into_iter()
        .enumerate()
        .map(|(i, piece)| make_chunk(tenant_id, document_id, i as i64, piece))
        .collect())
}

fn make_chunk(tenant_id: &str, document_id: &str, index: i64, text: String) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: Uuid::new_v4().to_string(),
        tenant_id: tenant_id.to_string(),
        document_id: document_id.to_string(),
        chunk_index: index,
        text,
        hash,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Rebuild the source from chunks by dropping each chunk's leading
    /// overlap chars.
    fn reconstruct(chunks: &[String], overlap: usize) -> String {
        let mut out = String::new();
        for (i, chunk) in chunks.iter().enumerate() {
            if i == 0 {
                out.push_str(chunk);
            } else {
                let skip: usize = chunk.chars().take(overlap).map(|c| c.len_utf8()).sum();
                out.push_str(&chunk[skip..]);
            }
        }
        out
    }

    #[test]
    fn test_empty_input_yields_no_chunks() {
        assert!(chunk_text("", 100, 10).unwrap().is_empty());
    }

    #[test]
    fn test_short_text_single_chunk() {
        let chunks = chunk_text("hello world", 100, 10).unwrap();
        assert_eq!(chunks, vec!["hello world".to_string()]);
    }

    #[test]
    fn test_invalid_overlap_rejected() {
        assert!(matches!(
            chunk_text("abc", 10, 10),
            Err(Error::InvalidConfiguration(_))
        ));
        assert!(matches!(
            chunk_text("abc", 10, 11),
            Err(Error::InvalidConfiguration(_))
        ));
        assert!(matches!(
            chunk_text("abc", 0, 0),
            Err(Error::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_windows_overlap_by_configured_amount() {
        let text = "abcdefghijklmnopqrstuvwxyz";
        let chunks = chunk_text(text, 10, 4).unwrap();
        assert_eq!(chunks[0], "abcdefghij");
        assert_eq!(chunks[1], "ghijklmnop");
        // Each chunk starts with the last 4 chars of its predecessor.
        for pair in chunks.windows(2) {
            let tail: String = pair[0].chars().rev().take(4).collect::<Vec<_>>().iter().rev().collect();
            let head: String = pair[1].chars().take(4).collect();
            assert_eq!(tail, head);
        }
    }

    #[test]
    fn test_reconstruction_invariant() {
        let text = "The unbonding period is 7 days. Staking rewards accrue daily. \
                    Minimum stake is 100 tokens and there is no maximum."
            .repeat(5);
        for (size, overlap) in [(50, 10), (500, 50), (7, 3), (120, 0)] {
            let chunks = chunk_text(&text, size, overlap).unwrap();
            assert_eq!(
                reconstruct(&chunks, overlap),
                text,
                "size={} overlap={}",
                size,
                overlap
            );
        }
    }

    #[test]
    fn test_reconstruction_with_multibyte_chars() {
        let text = "días de desvinculación: 7 — ¡sí! ünïcödé everywhere 🚀🚀🚀 end".repeat(3);
        let chunks = chunk_text(&text, 11, 4).unwrap();
        assert_eq!(reconstruct(&chunks, 4), text);
    }

    #[test]
    fn test_deterministic() {
        let text = "alpha beta gamma delta epsilon".repeat(20);
        let a = chunk_text(&text, 40, 8).unwrap();
        let b = chunk_text(&text, 40, 8).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_document_chunks_contiguous_indices_and_stable_hashes() {
        let text = "one two three four five six seven eight nine ten".repeat(10);
        let a = chunk_document("t1", "d1", &text, 60, 12).unwrap();
        let b = chunk_document("t1", "d2", &text, 60, 12).unwrap();
        for (i, c) in a.iter().enumerate() {
            assert_eq!(c.chunk_index, i as i64);
            assert_eq!(c.tenant_id, "t1");
        }
        // Same text and parameters => same hashes, regardless of row ids.
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.hash, y.hash);
            assert_ne!(x.id, y.id);
        }
    }
}
