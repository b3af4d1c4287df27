//! Per-user answer cooldown.
//!
//! Tracks the timestamp of the last processed question per
//! `(tenant, user)` and enforces a minimum spacing between them. This is
//! independent of escalation state: a user can be rate limited on a brand
//! new topic. The check itself never mutates anything; callers record the
//! interaction only once it was actually processed, so a rate-limited
//! attempt does not extend the window.
//!
//! Same locking layout as the escalation tracker: one mutex per tenant, no
//! cross-tenant contention. Memory-only by design.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

pub struct RateLimiter {
    cooldown: Duration,
    tenants: RwLock<HashMap<String, Arc<Mutex<HashMap<String, Instant>>>>>,
}

impl RateLimiter {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            tenants: RwLock::new(HashMap::new()),
        }
    }

    fn tenant(&self, tenant_id: &str) -> Arc<Mutex<HashMap<String, Instant>>> {
        if let Some(state) = self
            .tenants
            .read()
            .expect("rate limit lock poisoned")
            .get(tenant_id)
        {
            return state.clone();
        }
        self.tenants
            .write()
            .expect("rate limit lock poisoned")
            .entry(tenant_id.to_string())
            .or_default()
            .clone()
    }

    /// If the user is still cooling down, returns the remaining wait.
    pub fn check(&self, tenant_id: &str, user_id: &str, now: Instant) -> Option<Duration> {
        let tenant = self.tenant(tenant_id);
        let state = tenant.lock().expect("rate limit lock poisoned");

        let last = state.get(user_id)?;
        let elapsed = now.duration_since(*last);
        if elapsed < self.cooldown {
            Some(self.cooldown - elapsed)
        } else {
            None
        }
    }

    /// Record a processed interaction, starting a new cooldown window.
    pub fn record(&self, tenant_id: &str, user_id: &str, now: Instant) {
        let tenant = self.tenant(tenant_id);
        tenant
            .lock()
            .expect("rate limit lock poisoned")
            .insert(user_id.to_string(), now);
    }

    pub fn clear_tenant(&self, tenant_id: &str) {
        self.tenants
            .write()
            .expect("rate limit lock poisoned")
            .remove(tenant_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_question_is_allowed() {
        let rl = RateLimiter::new(Duration::from_secs(15));
        assert!(rl.check("alpha", "u1", Instant::now()).is_none());
    }

    #[test]
    fn test_within_cooldown_is_limited() {
        let rl = RateLimiter::new(Duration::from_secs(15));
        let now = Instant::now();

        rl.record("alpha", "u1", now);
        let remaining = rl.check("alpha", "u1", now + Duration::from_secs(5));
        assert!(remaining.is_some());
        assert!(remaining.unwrap() <= Duration::from_secs(10));
    }

    #[test]
    fn test_after_cooldown_is_allowed() {
        let rl = RateLimiter::new(Duration::from_secs(15));
        let now = Instant::now();

        rl.record("alpha", "u1", now);
        assert!(rl.check("alpha", "u1", now + Duration::from_secs(16)).is_none());
    }

    #[test]
    fn test_check_does_not_extend_window() {
        let rl = RateLimiter::new(Duration::from_secs(15));
        let now = Instant::now();

        rl.record("alpha", "u1", now);
        // A rejected attempt at t+10 must not reset the clock.
        assert!(rl.check("alpha", "u1", now + Duration::from_secs(10)).is_some());
        assert!(rl.check("alpha", "u1", now + Duration::from_secs(16)).is_none());
    }

    #[test]
    fn test_users_and_tenants_are_independent() {
        let rl = RateLimiter::new(Duration::from_secs(15));
        let now = Instant::now();

        rl.record("alpha", "u1", now);
        assert!(rl.check("alpha", "u2", now).is_none());
        assert!(rl.check("beta", "u1", now).is_none());
    }
}
