//! API key model - long-lived scoped credentials, stored hash-only.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Prefix carried by every issued key, checked before any hashing work.
pub const API_KEY_PREFIX: &str = "ie_";

/// API key entity. Only the SHA-256 of the secret is stored; the plaintext
/// is returned exactly once, at creation or rotation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    pub key_id: Uuid,
    pub account_id: Uuid,
    pub name: String,
    pub key_hash: String,
    pub scopes: Vec<String>,
    pub is_active: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub deactivated_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ApiKey {
    pub fn new(
        account_id: Uuid,
        name: String,
        key_hash: String,
        scopes: Vec<String>,
        expires_in_days: Option<i64>,
    ) -> Self {
        let now = Utc::now();
        Self {
            key_id: Uuid::new_v4(),
            account_id,
            name,
            key_hash,
            scopes,
            is_active: true,
            expires_at: expires_in_days.map(|days| now + Duration::days(days)),
            last_used_at: None,
            deactivated_reason: None,
            created_at: now,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(at) if at <= now)
    }
}

/// Result of key creation or rotation. The `plaintext` field is the only
/// place the secret ever appears.
#[derive(Debug, Clone)]
pub struct IssuedApiKey {
    pub key_id: Uuid,
    pub plaintext: String,
    pub scopes: Vec<String>,
    pub expires_at: Option<DateTime<Utc>>,
}
