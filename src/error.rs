//! Engine error taxonomy.
//!
//! The variants here are the failure modes the engine distinguishes
//! internally. None of them is ever shown verbatim to an end user: the
//! orchestrator maps query-time failures to fixed user-safe replies and
//! keeps the detail in logs. Ingestion and startup paths use `anyhow`
//! with context instead, since those callers are admin-facing.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Bad startup parameters (e.g. chunk overlap >= chunk size).
    /// Fatal at process start, never produced at query time.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A query vector and a tenant shard were produced by different
    /// embedder versions. Recoverable: the retriever re-embeds the
    /// tenant and retries once.
    #[error("incompatible embedding version: index has '{found}', query has '{expected}'")]
    IncompatibleEmbeddingVersion { expected: String, found: String },

    /// An external call (LLM, remote embedder) exceeded its deadline.
    #[error("external service timed out: {0}")]
    ExternalServiceTimeout(String),

    /// An external call failed for any other reason.
    #[error("external service error: {0}")]
    ExternalService(String),

    /// A search returned a chunk owned by a different tenant. This is the
    /// core safety invariant of the product; if it ever fires, something
    /// is badly wrong and the caller must treat it as fatal.
    #[error("tenant isolation violation: query for '{expected}' matched chunk of '{found}'")]
    TenantIsolationViolation { expected: String, found: String },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// True for errors that can be retried or absorbed without operator
    /// attention. `TenantIsolationViolation` and `InvalidConfiguration`
    /// are deliberately not recoverable.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::IncompatibleEmbeddingVersion { .. }
                | Error::ExternalServiceTimeout(_)
                | Error::ExternalService(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_classification() {
        assert!(Error::ExternalServiceTimeout("llm".into()).is_recoverable());
        assert!(Error::IncompatibleEmbeddingVersion {
            expected: "hash-v2".into(),
            found: "hash-v1".into(),
        }
        .is_recoverable());
        assert!(!Error::InvalidConfiguration("overlap".into()).is_recoverable());
        assert!(!Error::TenantIsolationViolation {
            expected: "a".into(),
            found: "b".into(),
        }
        .is_recoverable());
    }

    #[test]
    fn test_display_names_versions() {
        let e = Error::IncompatibleEmbeddingVersion {
            expected: "hash-v2".into(),
            found: "hash-v1".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("hash-v1"));
        assert!(msg.contains("hash-v2"));
    }
}
