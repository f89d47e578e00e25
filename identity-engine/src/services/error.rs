use chrono::{DateTime, Utc};
use thiserror::Error;

/// Error taxonomy for every component boundary.
///
/// User-facing flows and integration errors alike return
/// `Result<_, SecurityError>`; callers get a single discipline instead of
/// the source's mix of thrown exceptions and `{success, error}` bags.
/// Anti-enumeration flows return `Ok` with identical payloads for hit and
/// miss, and security-event logging never surfaces an error at all.
#[derive(Error, Debug)]
pub enum SecurityError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimitExceeded { retry_after_secs: i64 },

    #[error("account locked until {until}")]
    AccountLocked { until: DateTime<Utc> },

    #[error("{0} expired")]
    Expired(&'static str),

    #[error("configuration error: {0}")]
    Config(anyhow::Error),

    #[error("store error: {0}")]
    Store(#[from] anyhow::Error),

    #[error("internal error: {0}")]
    Internal(anyhow::Error),
}

impl SecurityError {
    /// Whether the error is one a caller should show to the end user, as
    /// opposed to a programmer/integration fault.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            SecurityError::Validation(_)
                | SecurityError::Authentication(_)
                | SecurityError::RateLimitExceeded { .. }
                | SecurityError::AccountLocked { .. }
                | SecurityError::Expired(_)
        )
    }
}
