//! Rate limit types - fixed-window counters and named policies.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// One fixed-window counter. Ephemeral; lives in the counter store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitCounter {
    pub identifier: String,
    pub count: u32,
    pub window_reset_at: DateTime<Utc>,
}

/// A fixed-window policy: at most `max_requests` inside each `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub window: Duration,
    pub max_requests: u32,
}

impl RateLimitPolicy {
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            window,
            max_requests,
        }
    }

    /// Login attempts: 5 per 15 minutes.
    pub fn login() -> Self {
        Self::new(Duration::minutes(15), 5)
    }

    /// Signups: 3 per hour.
    pub fn signup() -> Self {
        Self::new(Duration::hours(1), 3)
    }

    /// Password reset requests: 3 per hour.
    pub fn password_reset() -> Self {
        Self::new(Duration::hours(1), 3)
    }

    /// Generic API traffic: 100 per minute.
    pub fn api() -> Self {
        Self::new(Duration::minutes(1), 100)
    }

    /// Uploads: 10 per minute.
    pub fn upload() -> Self {
        Self::new(Duration::minutes(1), 10)
    }

    /// Second-factor verification: 5 per 5 minutes.
    pub fn two_factor() -> Self {
        Self::new(Duration::minutes(5), 5)
    }
}

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}
