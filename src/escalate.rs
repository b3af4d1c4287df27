//! Per-tenant, per-user, per-topic escalation tracking.
//!
//! Tracks how many times a user has asked about the same topic inside a
//! decay window, so the orchestrator can move from full answers to short
//! acknowledgments to silence. State is keyed by
//! `(tenant, user, topic fingerprint)` and kept in memory only: after a
//! restart, every topic looks decayed, which is behaviorally identical to
//! a long period of inactivity.
//!
//! Two fingerprints exist for the same occurrence. Before retrieval the
//! orchestrator only has a provisional fingerprint derived from the
//! question text; after retrieval the authoritative one is the top chunk's
//! identity, so paraphrases that hit the same chunk count as one topic.
//! [`EscalationTracker::link`] records the provisional → authoritative
//! mapping so that the cheap pre-retrieval silence check
//! ([`EscalationTracker::note_if_silenced`]) can resolve repeat question
//! texts to an already-silenced topic without running retrieval.
//!
//! Synchronization is a mutex per tenant inside an outer read-mostly map,
//! so the read-increment-write on one key is atomic and unrelated tenants
//! never contend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

/// Escalation state for one topic, derived from its repeat count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationState {
    /// Never seen, or decayed.
    Fresh,
    /// Seen `n` times within the decay window.
    Seen(u32),
    /// Repeat count reached the silence threshold; no response until decay.
    Silenced,
}

#[derive(Debug, Clone, Copy)]
struct TopicState {
    count: u32,
    last_seen: Instant,
}

#[derive(Default)]
struct TenantState {
    /// (user, fingerprint) -> repeat state.
    topics: HashMap<(String, String), TopicState>,
    /// (user, provisional fingerprint) -> authoritative fingerprint.
    aliases: HashMap<(String, String), String>,
}

pub struct EscalationTracker {
    decay_window: Duration,
    silence_from: u32,
    tenants: RwLock<HashMap<String, Arc<Mutex<TenantState>>>>,
}

impl EscalationTracker {
    pub fn new(decay_window: Duration, silence_from: u32) -> Self {
        Self {
            decay_window,
            silence_from,
            tenants: RwLock::new(HashMap::new()),
        }
    }

    fn tenant(&self, tenant_id: &str) -> Arc<Mutex<TenantState>> {
        if let Some(state) = self
            .tenants
            .read()
            .expect("escalation lock poisoned")
            .get(tenant_id)
        {
            return state.clone();
        }
        self.tenants
            .write()
            .expect("escalation lock poisoned")
            .entry(tenant_id.to_string())
            .or_default()
            .clone()
    }

    /// Classify a repeat count against the silence threshold.
    pub fn classify(&self, count: u32) -> EscalationState {
        match count {
            0 => EscalationState::Fresh,
            n if n >= self.silence_from => EscalationState::Silenced,
            n => EscalationState::Seen(n),
        }
    }

    /// Record one occurrence of a topic and return the new repeat count.
    ///
    /// This is the single atomic read-increment-write per key: inside the
    /// decay window the count increments, after it the topic resets to 1.
    /// Last-seen is refreshed unconditionally so the decay clock always
    /// reflects true last activity.
    pub fn observe(&self, tenant_id: &str, user_id: &str, fingerprint: &str, now: Instant) -> u32 {
        let tenant = self.tenant(tenant_id);
        let mut state = tenant.lock().expect("escalation lock poisoned");

        let key = (user_id.to_string(), fingerprint.to_string());
        let entry = state.topics.entry(key).or_insert(TopicState {
            count: 0,
            last_seen: now,
        });

        if now.duration_since(entry.last_seen) > self.decay_window {
            entry.count = 0;
        }
        entry.count = entry.count.saturating_add(1);
        entry.last_seen = now;
        entry.count
    }

    /// Cheap pre-retrieval check: if the topic this provisional fingerprint
    /// resolves to is silenced and not decayed, count the occurrence
    /// (refreshing the decay clock) and return the new repeat count.
    /// Otherwise touch nothing and return `None` — the authoritative
    /// observation happens after retrieval via [`observe`].
    ///
    /// [`observe`]: EscalationTracker::observe
    pub fn note_if_silenced(
        &self,
        tenant_id: &str,
        user_id: &str,
        provisional: &str,
        now: Instant,
    ) -> Option<u32> {
        let tenant = self.tenant(tenant_id);
        let mut state = tenant.lock().expect("escalation lock poisoned");

        let alias_key = (user_id.to_string(), provisional.to_string());
        let fingerprint = state
            .aliases
            .get(&alias_key)
            .cloned()
            .unwrap_or_else(|| provisional.to_string());

        let key = (user_id.to_string(), fingerprint);
        let entry = state.topics.get_mut(&key)?;

        if now.duration_since(entry.last_seen) > self.decay_window {
            return None;
        }
        if entry.count < self.silence_from {
            return None;
        }

        entry.count = entry.count.saturating_add(1);
        entry.last_seen = now;
        Some(entry.count)
    }

    /// Remember that a question text's provisional fingerprint resolved to
    /// this authoritative topic, so later identical questions can be
    /// silenced before retrieval.
    pub fn link(&self, tenant_id: &str, user_id: &str, provisional: &str, authoritative: &str) {
        if provisional == authoritative {
            return;
        }
        let tenant = self.tenant(tenant_id);
        let mut state = tenant.lock().expect("escalation lock poisoned");
        state.aliases.insert(
            (user_id.to_string(), provisional.to_string()),
            authoritative.to_string(),
        );
    }

    /// Drop all escalation state for a tenant (admin clear).
    pub fn clear_tenant(&self, tenant_id: &str) {
        self.tenants
            .write()
            .expect("escalation lock poisoned")
            .remove(tenant_id);
    }
}
