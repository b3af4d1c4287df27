//! LLM completion client abstraction.
//!
//! The LLM is an opaque, possibly slow, possibly failing collaborator: one
//! capability method, [`LlmClient::complete`], that takes the question, the
//! retrieved grounding chunks, and a tone directive, and returns answer
//! text. Provider selection is a configuration value.
//!
//! - **[`OpenAiCompatClient`]** — any OpenAI-compatible chat completions
//!   endpoint (OpenAI itself, Groq, and the like). Bounded latency: one
//!   request timeout and at most one automatic retry.
//! - **[`DisabledLlm`]** — always errors; used when no provider is
//!   configured so every other code path stays exercisable.
//!
//! The prompt instructs the model to answer only from the supplied context.
//! Refusing to guess is the orchestrator's job (the confidence gate runs
//! before any call lands here); the prompt is the second line of defense.

use async_trait::async_trait;
use std::time::Duration;

use crate::config::LlmConfig;
use crate::error::{Error, Result};
use crate::models::ScoredChunk;

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Generate an answer to `question` grounded in `chunks`, styled per
    /// the tone directive.
    async fn complete(&self, question: &str, chunks: &[ScoredChunk], tone: &str)
        -> Result<String>;

    /// Model identifier for diagnostics.
    fn model_name(&self) -> &str;
}

/// Create the configured [`LlmClient`].
pub fn create_llm(config: &LlmConfig) -> Result<Box<dyn LlmClient>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledLlm)),
        "openai" => Ok(Box::new(OpenAiCompatClient::new(config)?)),
        other => Err(Error::InvalidConfiguration(format!(
            "unknown llm provider: {}",
            other
        ))),
    }
}

// ============ Prompt construction ============

const SYSTEM_PROMPT: &str = "You answer questions about the project using ONLY the context \
provided below.\n\
Rules:\n\
- If the context contains a specific date, timeframe, number, or fact, include it.\n\
- Scan the entire context for relevant facts before answering.\n\
- Keep answers short: one to three sentences.\n\
- If the context truly contains nothing relevant, say the docs do not cover it. \
Never invent facts that are not in the context.\n";

fn tone_directive(tone: &str) -> &'static str {
    match tone {
        "casual" => "Tone: casual and friendly, at most one emoji, no corporate speak.",
        "professional" => "Tone: formal support tone, no emojis, clear and precise language.",
        _ => "Tone: friendly but clean, no slang, no emojis.",
    }
}

/// Format the retrieved chunks as the grounding context block.
pub fn format_context(chunks: &[ScoredChunk]) -> String {
    if chunks.is_empty() {
        return "No relevant documentation found.".to_string();
    }
    chunks
        .iter()
        .map(|c| format!("[Source: {}]\n{}", c.source, c.text))
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}

fn build_system_prompt(chunks: &[ScoredChunk], tone: &str) -> String {
    format!(
        "{}\n{}\n\nContext from docs:\n{}",
        SYSTEM_PROMPT,
        tone_directive(tone),
        format_context(chunks)
    )
}

// ============ Disabled client ============

/// No-op client used when `llm.provider = "disabled"`. The orchestrator
/// maps its error to the generic "temporarily unable to answer" reply.
pub struct DisabledLlm;

#[async_trait]
impl LlmClient for DisabledLlm {
    async fn complete(&self, _q: &str, _chunks: &[ScoredChunk], _tone: &str) -> Result<String> {
        Err(Error::ExternalService("llm provider is disabled".to_string()))
    }

    fn model_name(&self) -> &str {
        "disabled"
    }
}

// ============ OpenAI-compatible client ============

/// Chat completions against an OpenAI-compatible endpoint.
///
/// The base URL is configurable, which covers both the OpenAI API and
/// compatible services such as Groq. The API key is read from the
/// environment variable named in config.
pub struct OpenAiCompatClient {
    model: String,
    url: String,
    api_key_env: String,
    timeout: Duration,
    max_tokens: u32,
    temperature: f32,
}

impl OpenAiCompatClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let model = config.model.clone().ok_or_else(|| {
            Error::InvalidConfiguration("llm.model required for the openai provider".to_string())
        })?;

        if std::env::var(&config.api_key_env).is_err() {
            return Err(Error::InvalidConfiguration(format!(
                "{} environment variable not set",
                config.api_key_env
            )));
        }

        Ok(Self {
            model,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            api_key_env: config.api_key_env.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }

    async fn request_once(&self, body: &serde_json::Value) -> Result<String> {
        let api_key = std::env::var(&self.api_key_env)
            .map_err(|_| Error::ExternalService(format!("{} not set", self.api_key_env)))?;

        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| Error::ExternalService(e.to_string()))?;

        let resp = client
            .post(format!("{}/chat/completions", self.url))
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::ExternalServiceTimeout(format!("llm call to {}", self.url))
                } else {
                    Error::ExternalService(format!("llm request failed: {}", e))
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(Error::ExternalService(format!(
                "llm API error {}: {}",
                status, text
            )));
        }

        let json: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| Error::ExternalService(e.to_string()))?;

        json.get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .map(|s| s.trim().to_string())
            .ok_or_else(|| {
                Error::ExternalService("invalid llm response: missing message content".to_string())
            })
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatClient {
    async fn complete(&self, question: &str, chunks: &[ScoredChunk], tone: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": build_system_prompt(chunks, tone) },
                { "role": "user", "content": question }
            ],
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
        });

        // At most one automatic retry: retrying more trades bounded
        // latency for marginal success odds, and the orchestrator already
        // degrades gracefully.
        match self.request_once(&body).await {
            Ok(answer) => Ok(answer),
            Err(first) if first.is_recoverable() => self.request_once(&body).await.map_err(|_| first),
            Err(e) => Err(e),
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(source: &str, text: &str) -> ScoredChunk {
        ScoredChunk {
            chunk_id: "c1".to_string(),
            hash: "h1".to_string(),
            text: text.to_string(),
            source: source.to_string(),
            score: 0.9,
        }
    }

    #[test]
    fn test_context_formatting() {
        let ctx = format_context(&[
            chunk("staking.md", "Unbonding period is 7 days."),
            chunk("faq.md", "Minimum stake is 100 tokens."),
        ]);
        assert!(ctx.contains("[Source: staking.md]"));
        assert!(ctx.contains("Unbonding period is 7 days."));
        assert!(ctx.contains("\n\n---\n\n"));
    }

    #[test]
    fn test_empty_context_has_placeholder() {
        assert_eq!(format_context(&[]), "No relevant documentation found.");
    }

    #[test]
    fn test_system_prompt_carries_tone_and_context() {
        let p = build_system_prompt(&[chunk("a.md", "fact")], "professional");
        assert!(p.contains("ONLY the context"));
        assert!(p.contains("formal support tone"));
        assert!(p.contains("fact"));
    }

    #[tokio::test]
    async fn test_disabled_client_errors() {
        let c = DisabledLlm;
        let err = c.complete("q", &[], "neutral").await.unwrap_err();
        assert!(matches!(err, Error::ExternalService(_)));
    }
}
