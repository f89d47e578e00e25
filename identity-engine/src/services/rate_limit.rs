//! Fixed-window rate limiting over an injected counter store.
//!
//! Identifiers are caller-chosen, conventionally `"<surface>:<key>"`
//! (`"login:203.0.113.9"`, `"reset:user@example.com"`). The counter store
//! is an injected dependency: process-local by default, shared in a
//! multi-instance deployment.

use std::sync::Arc;

use chrono::Utc;

use crate::models::{RateLimitDecision, RateLimitPolicy, SecurityEvent, SecurityEventType,
    Severity};
use crate::store::CounterStore;

use super::{SecurityError, SecurityEventLog};

#[derive(Clone)]
pub struct RateLimiter {
    counters: Arc<dyn CounterStore>,
    events: SecurityEventLog,
}

impl RateLimiter {
    pub fn new(counters: Arc<dyn CounterStore>, events: SecurityEventLog) -> Self {
        Self { counters, events }
    }

    /// Check (and count) a request against the policy's fixed window.
    ///
    /// A fresh window starts at 1 and allows; past the cap, requests are
    /// denied with zero remaining and the counter stops moving. Expired
    /// counters are purged opportunistically on every check.
    pub async fn check(
        &self,
        identifier: &str,
        policy: RateLimitPolicy,
    ) -> Result<RateLimitDecision, SecurityError> {
        let now = Utc::now();

        if let Err(e) = self.counters.purge_expired(now).await {
            tracing::warn!(error = %e, "Rate limit counter purge failed");
        }

        let counter = self
            .counters
            .hit(identifier, policy.window, policy.max_requests, now)
            .await?;

        let allowed = counter.count <= policy.max_requests;
        let remaining = policy.max_requests.saturating_sub(counter.count);

        if !allowed && counter.count == policy.max_requests + 1 {
            // First denial in this window.
            self.events
                .log_event(
                    SecurityEvent::new(
                        SecurityEventType::RateLimitExceeded,
                        Severity::Medium,
                        format!("rate limit exceeded for {}", identifier),
                    )
                    .with_metadata(serde_json::json!({
                        "identifier": identifier,
                        "max_requests": policy.max_requests,
                        "window_reset_at": counter.window_reset_at,
                    })),
                )
                .await;
        }

        Ok(RateLimitDecision {
            allowed,
            remaining,
            reset_at: counter.window_reset_at,
        })
    }

    /// Error-form check for call sites guarding an entry point.
    pub async fn require(
        &self,
        identifier: &str,
        policy: RateLimitPolicy,
    ) -> Result<(), SecurityError> {
        let decision = self.check(identifier, policy).await?;
        if decision.allowed {
            Ok(())
        } else {
            Err(SecurityError::RateLimitExceeded {
                retry_after_secs: (decision.reset_at - Utc::now()).num_seconds().max(0),
            })
        }
    }
}
