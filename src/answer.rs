//! Answer orchestration.
//!
//! [`Engine`] wires the shared state (tenant index, escalation tracker,
//! rate limiter, store) together and implements the per-question
//! sequencing: rate-limit check, provisional silence check, retrieval,
//! authoritative escalation transition, then one of grounded answer,
//! don't-know, acknowledgment, filler, or silence.
//!
//! The cheap checks run first so a suppressed repeat costs neither an
//! embedding nor an LLM call. The LLM is invoked in exactly one place, and
//! only when the confidence gate passed and the escalation state calls for
//! a full answer. Any LLM failure maps to a generic apology; it never
//! surfaces verbatim and never silently disappears.

use anyhow::{Context, Result};
use rand::seq::IndexedRandom;
use sqlx::SqlitePool;
use std::time::Instant;
use tracing::{debug, error, warn};

use crate::config::Config;
use crate::db;
use crate::embedding::{create_embedder, Embedder};
use crate::error::Error;
use crate::escalate::EscalationTracker;
use crate::index::TenantIndex;
use crate::ingest::{self, IngestReport};
use crate::llm::{create_llm, LlmClient};
use crate::migrate;
use crate::models::{Reply, ReplyMode};
use crate::ratelimit::RateLimiter;
use crate::retrieve::{self, normalize_question};
use crate::store::{self, TenantStats};

// ============ Response templates ============

const UNSURE_RESPONSES: &[&str] = &[
    "I'm not sure about that based on the docs I have. A team member might know better.",
    "That's not really covered in the docs loaded here, sorry.",
    "I couldn't find anything on that in the documentation. Worth asking the team directly.",
];

const NO_DOCS_RESPONSES: &[&str] = &[
    "I don't have any documentation loaded for this community yet. An admin needs to add some first.",
    "No docs are loaded here yet. Once an admin adds some, I can help answer questions.",
];

const ACK_RESPONSES: &[&str] = &[
    "Just answered {topic} a moment ago, scroll up a bit.",
    "The answer on {topic} hasn't changed, check the earlier reply.",
    "Already covered {topic} above, nothing new since then.",
];

const FILLER_RESPONSES: &[&str] = &[
    "Still the same answer on {topic}. I'll stop repeating myself on this one for a while.",
    "Nothing new on {topic} yet, this is the last reminder before I go quiet on it.",
];

const APOLOGY_RESPONSE: &str =
    "I'm temporarily unable to answer, please try again in a moment.";

fn pick(pool: &[&str]) -> String {
    let mut rng = rand::rng();
    pool.choose(&mut rng)
        .copied()
        .unwrap_or(APOLOGY_RESPONSE)
        .to_string()
}

/// A short human-readable topic for acknowledgment texts: the first couple
/// of content words of the normalized question.
fn extract_topic(question: &str) -> String {
    const QUESTION_WORDS: &[&str] = &[
        "what", "when", "where", "how", "why", "is", "are", "do", "does", "will", "wen", "long",
        "much", "many", "i", "we", "it", "to", "of", "in", "on", "for", "my",
    ];
    let words: Vec<String> = normalize_question(question)
        .split_whitespace()
        .filter(|w| !QUESTION_WORDS.contains(w) && w.len() > 2)
        .take(2)
        .map(|w| w.to_string())
        .collect();
    if words.is_empty() {
        "that".to_string()
    } else {
        words.join(" ")
    }
}

// ============ Engine ============

/// The process-wide answering engine. One instance is shared by every
/// gateway; all methods take `&self` and are safe to call concurrently.
pub struct Engine {
    config: Config,
    pool: SqlitePool,
    index: TenantIndex,
    escalation: EscalationTracker,
    cooldowns: RateLimiter,
    embedder: Box<dyn Embedder>,
    llm: Box<dyn LlmClient>,
}

impl Engine {
    /// Build an engine from configuration: connect and migrate the store,
    /// instantiate the configured embedder and LLM client, and load every
    /// tenant's shard.
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let pool = db::connect(&config.db).await?;
        migrate::run_migrations(&pool).await?;
        let embedder = create_embedder(&config.embedding)?;
        let llm = create_llm(&config.llm)?;
        Self::with_parts(config, pool, embedder, llm).await
    }

    /// Build an engine with explicit embedder and LLM implementations.
    /// This is the seam tests use to plug in a stub LLM.
    pub async fn with_parts(
        config: Config,
        pool: SqlitePool,
        embedder: Box<dyn Embedder>,
        llm: Box<dyn LlmClient>,
    ) -> Result<Self> {
        config.validate()?;
        migrate::run_migrations(&pool).await?;

        let index = TenantIndex::new();
        ingest::load_all_tenants(&pool, &index, embedder.as_ref())
            .await
            .context("loading tenant shards at startup")?;

        let escalation = EscalationTracker::new(
            config.escalation.decay_window(),
            config.escalation.silence_from,
        );
        let cooldowns = RateLimiter::new(config.rate_limit.cooldown());

        Ok(Self {
            config,
            pool,
            index,
            escalation,
            cooldowns,
            embedder,
            llm,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Ingest a document for a tenant. Admin-facing; errors carry specifics.
    pub async fn ingest_text(
        &self,
        tenant_id: &str,
        source: &str,
        text: &str,
    ) -> Result<IngestReport> {
        ingest::ingest_text(
            &self.config,
            &self.pool,
            &self.index,
            self.embedder.as_ref(),
            tenant_id,
            source,
            text,
        )
        .await
    }

    /// Remove a tenant's corpus and its in-memory state. Idempotent.
    pub async fn clear_tenant(&self, tenant_id: &str) -> Result<()> {
        ingest::clear_tenant(&self.pool, &self.index, tenant_id).await?;
        self.escalation.clear_tenant(tenant_id);
        self.cooldowns.clear_tenant(tenant_id);
        Ok(())
    }

    pub async fn stats(&self) -> Result<Vec<TenantStats>> {
        store::stats(&self.pool).await
    }

    /// Answer one question from a chat gateway.
    pub async fn ask(&self, tenant_id: &str, user_id: &str, question: &str) -> Reply {
        self.ask_at(tenant_id, user_id, question, Instant::now()).await
    }

    /// Like [`ask`](Engine::ask), with an explicit clock for tests.
    pub async fn ask_at(
        &self,
        tenant_id: &str,
        user_id: &str,
        question: &str,
        now: Instant,
    ) -> Reply {
        // 1. Cooldown. A rejected attempt mutates nothing.
        if let Some(remaining) = self.cooldowns.check(tenant_id, user_id, now) {
            return Reply {
                mode: ReplyMode::RateLimited,
                text: Some(format!(
                    "Please wait {}s before asking another question.",
                    remaining.as_secs().max(1)
                )),
                confidence: 0.0,
                escalation_level: 0,
            };
        }

        // 2. Provisional silence check, before any retrieval cost.
        let provisional = retrieve::question_fingerprint(question);
        if let Some(count) = self
            .escalation
            .note_if_silenced(tenant_id, user_id, &provisional, now)
        {
            debug!(tenant = tenant_id, user = user_id, count, "suppressed repeat");
            return Reply::suppressed(count);
        }

        // 3. Retrieval.
        let result = match retrieve::retrieve(
            &self.config,
            &self.pool,
            &self.index,
            self.embedder.as_ref(),
            tenant_id,
            question,
        )
        .await
        {
            Ok(result) => result,
            Err(e @ Error::TenantIsolationViolation { .. }) => {
                // Core safety invariant breach: loud, and no answer.
                error!(tenant = tenant_id, error = %e, "tenant isolation violated");
                return self.error_reply(0);
            }
            Err(e) => {
                warn!(tenant = tenant_id, error = %e, "retrieval failed");
                return self.error_reply(0);
            }
        };

        // Authoritative escalation transition, keyed by what retrieval found.
        let fingerprint = retrieve::topic_fingerprint(&result, question);
        self.escalation
            .link(tenant_id, user_id, &provisional, &fingerprint);
        let count = self.escalation.observe(tenant_id, user_id, &fingerprint, now);

        let esc = &self.config.escalation;
        if count >= esc.silence_from {
            return Reply::suppressed(count);
        }

        // 4. Don't-know paths: empty corpus or confidence gate. Both are
        // normal interactions for escalation and rate-limit purposes.
        if result.top_chunks.is_empty() {
            self.cooldowns.record(tenant_id, user_id, now);
            return Reply {
                mode: ReplyMode::DontKnow,
                text: Some(pick(NO_DOCS_RESPONSES)),
                confidence: 0.0,
                escalation_level: count,
            };
        }
        if result.below_threshold {
            debug!(
                tenant = tenant_id,
                score = result.top_score,
                threshold = self.config.retrieval.confidence_threshold,
                "below confidence threshold"
            );
            self.cooldowns.record(tenant_id, user_id, now);
            return Reply {
                mode: ReplyMode::DontKnow,
                text: Some(pick(UNSURE_RESPONSES)),
                confidence: result.top_score,
                escalation_level: count,
            };
        }

        // 5. Escalated repeats get canned text, no LLM call.
        if count >= esc.acknowledge_from {
            let topic = extract_topic(question);
            let template = if count >= esc.filler_at {
                pick(FILLER_RESPONSES)
            } else {
                pick(ACK_RESPONSES)
            };
            self.cooldowns.record(tenant_id, user_id, now);
            return Reply {
                mode: ReplyMode::Answered,
                text: Some(template.replace("{topic}", &topic)),
                confidence: result.top_score,
                escalation_level: count,
            };
        }

        // 6. Full grounded answer.
        match self
            .llm
            .complete(question, &result.top_chunks, &self.config.llm.tone)
            .await
        {
            Ok(answer) => {
                self.cooldowns.record(tenant_id, user_id, now);
                Reply {
                    mode: ReplyMode::Answered,
                    text: Some(answer),
                    confidence: result.top_score,
                    escalation_level: count,
                }
            }
            Err(e) => {
                // Escalation state stays committed: the question was asked,
                // whether or not a reply got delivered. The cooldown is not
                // recorded, so the user may retry immediately.
                warn!(tenant = tenant_id, error = %e, "llm call failed");
                self.error_reply(count)
            }
        }
    }

    fn error_reply(&self, level: u32) -> Reply {
        Reply {
            mode: ReplyMode::Error,
            text: Some(APOLOGY_RESPONSE.to_string()),
            confidence: 0.0,
            escalation_level: level,
        }
    }
}
