//! Second-factor code model - one-time 6-digit codes.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One-time second-factor code.
///
/// At most one unused, unexpired code exists per account at a time; issuing
/// a new one removes prior unused codes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwoFactorCode {
    pub code_id: Uuid,
    pub account_id: Uuid,
    pub code: String,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl TwoFactorCode {
    pub fn new(account_id: Uuid, code: String, expiry_minutes: i64) -> Self {
        let now = Utc::now();
        Self {
            code_id: Uuid::new_v4(),
            account_id,
            code,
            expires_at: now + Duration::minutes(expiry_minutes),
            used_at: None,
            created_at: now,
        }
    }

    /// Still redeemable: not expired and not used.
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now && self.used_at.is_none()
    }

    pub fn is_used(&self) -> bool {
        self.used_at.is_some()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}
