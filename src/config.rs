//! TOML configuration.
//!
//! All tunables are read once at process start and treated as immutable for
//! the lifetime of the instance. Validation happens at load time so that a
//! bad chunk/overlap pair or unknown provider fails the process instead of
//! surfacing mid-query.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Error;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub escalation: EscalationConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    500
}
fn default_chunk_overlap() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            confidence_threshold: default_confidence_threshold(),
        }
    }
}

fn default_top_k() -> usize {
    3
}
fn default_confidence_threshold() -> f32 {
    0.3
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// "hash" (deterministic projection, no I/O) or "ollama" (local model).
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    /// Version tag stamped on every vector. Bump it when the embedding
    /// scheme changes; mismatched tenants are lazily re-embedded.
    #[serde(default = "default_embedding_version")]
    pub version: String,
    #[serde(default = "default_dims")]
    pub dims: usize,
    /// Ollama endpoint, only used by the "ollama" provider.
    #[serde(default)]
    pub url: Option<String>,
    /// Model name, only used by the "ollama" provider.
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            version: default_embedding_version(),
            dims: default_dims(),
            url: None,
            model: None,
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_embedding_provider() -> String {
    "hash".to_string()
}
fn default_embedding_version() -> String {
    "hash-v1".to_string()
}
fn default_dims() -> usize {
    384
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct EscalationConfig {
    /// Inactivity on a topic after which its repeat counter decays to zero.
    #[serde(default = "default_decay_window_secs")]
    pub decay_window_secs: u64,
    /// Repeat count at which the full answer is replaced by a short
    /// acknowledgment (no LLM call).
    #[serde(default = "default_acknowledge_from")]
    pub acknowledge_from: u32,
    /// Repeat count that gets the "stop asking" filler.
    #[serde(default = "default_filler_at")]
    pub filler_at: u32,
    /// Repeat count from which the bot stays silent until decay.
    #[serde(default = "default_silence_from")]
    pub silence_from: u32,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            decay_window_secs: default_decay_window_secs(),
            acknowledge_from: default_acknowledge_from(),
            filler_at: default_filler_at(),
            silence_from: default_silence_from(),
        }
    }
}

fn default_decay_window_secs() -> u64 {
    600
}
fn default_acknowledge_from() -> u32 {
    2
}
fn default_filler_at() -> u32 {
    5
}
fn default_silence_from() -> u32 {
    6
}

impl EscalationConfig {
    pub fn decay_window(&self) -> Duration {
        Duration::from_secs(self.decay_window_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RateLimitConfig {
    /// Minimum spacing between answered questions per (tenant, user).
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: default_cooldown_secs(),
        }
    }
}

fn default_cooldown_secs() -> u64 {
    15
}

impl RateLimitConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    /// "disabled" or "openai" (any OpenAI-compatible chat endpoint,
    /// including Groq).
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    /// Base URL; defaults to the OpenAI API when unset.
    #[serde(default)]
    pub url: Option<String>,
    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Answer tone: "casual", "neutral", or "professional".
    #[serde(default = "default_tone")]
    pub tone: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: None,
            url: None,
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            tone: default_tone(),
        }
    }
}

fn default_llm_provider() -> String {
    "disabled".to_string()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_max_tokens() -> u32 {
    500
}
fn default_temperature() -> f32 {
    0.3
}
fn default_tone() -> String {
    "neutral".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7431".to_string()
}

impl Config {
    /// Check cross-field invariants. Called by [`load_config`] and by the
    /// engine constructor, so programmatically built configs get the same
    /// checks as file-loaded ones.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.chunking.chunk_size == 0 {
            return Err(Error::InvalidConfiguration(
                "chunking.chunk_size must be > 0".to_string(),
            ));
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return Err(Error::InvalidConfiguration(format!(
                "chunking.chunk_overlap ({}) must be < chunk_size ({})",
                self.chunking.chunk_overlap, self.chunking.chunk_size
            )));
        }
        if self.retrieval.top_k == 0 {
            return Err(Error::InvalidConfiguration(
                "retrieval.top_k must be >= 1".to_string(),
            ));
        }
        if !(-1.0..=1.0).contains(&self.retrieval.confidence_threshold) {
            return Err(Error::InvalidConfiguration(
                "retrieval.confidence_threshold must be in [-1.0, 1.0]".to_string(),
            ));
        }
        if self.embedding.dims == 0 {
            return Err(Error::InvalidConfiguration(
                "embedding.dims must be > 0".to_string(),
            ));
        }
        match self.embedding.provider.as_str() {
            "hash" | "ollama" => {}
            other => {
                return Err(Error::InvalidConfiguration(format!(
                    "unknown embedding provider '{}': must be hash or ollama",
                    other
                )));
            }
        }
        match self.llm.provider.as_str() {
            "disabled" | "openai" => {}
            other => {
                return Err(Error::InvalidConfiguration(format!(
                    "unknown llm provider '{}': must be disabled or openai",
                    other
                )));
            }
        }
        match self.llm.tone.as_str() {
            "casual" | "neutral" | "professional" => {}
            other => {
                return Err(Error::InvalidConfiguration(format!(
                    "unknown tone '{}': must be casual, neutral, or professional",
                    other
                )));
            }
        }
        let esc = &self.escalation;
        if !(2 <= esc.acknowledge_from
            && esc.acknowledge_from <= esc.filler_at
            && esc.filler_at < esc.silence_from)
        {
            return Err(Error::InvalidConfiguration(
                "escalation thresholds must satisfy 2 <= acknowledge_from <= filler_at < silence_from"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> Config {
        toml::from_str("[db]\npath = \"/tmp/docbot.sqlite\"\n").unwrap()
    }

    #[test]
    fn test_defaults() {
        let c = minimal();
        assert_eq!(c.chunking.chunk_size, 500);
        assert_eq!(c.chunking.chunk_overlap, 50);
        assert_eq!(c.retrieval.top_k, 3);
        assert!((c.retrieval.confidence_threshold - 0.3).abs() < f32::EPSILON);
        assert_eq!(c.escalation.decay_window_secs, 600);
        assert_eq!(c.escalation.silence_from, 6);
        assert_eq!(c.rate_limit.cooldown_secs, 15);
        assert_eq!(c.embedding.provider, "hash");
        assert_eq!(c.llm.provider, "disabled");
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_overlap_must_be_under_size() {
        let mut c = minimal();
        c.chunking.chunk_overlap = c.chunking.chunk_size;
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_unknown_providers_rejected() {
        let mut c = minimal();
        c.embedding.provider = "word2vec".to_string();
        assert!(c.validate().is_err());

        let mut c = minimal();
        c.llm.provider = "claude".to_string();
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_escalation_threshold_ordering() {
        let mut c = minimal();
        c.escalation.silence_from = c.escalation.filler_at;
        assert!(c.validate().is_err());
    }
}
