//! Account model - per-tenant user accounts and their security state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Embedded password-reset token state.
///
/// Only the SHA-256 of the token is stored; the plaintext goes out through
/// the notification collaborator and is never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetToken {
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
}

impl ResetToken {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Account entity (tenant-scoped).
///
/// Mutated by the credential guard (failed attempts, lock window), the
/// session registry (online/activity state), and the password-reset flow
/// (password hash, reset token).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub account_id: Uuid,
    pub org_id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub failed_login_attempts: u32,
    pub locked_until: Option<DateTime<Utc>>,
    pub two_factor_enabled: bool,
    pub last_active_at: Option<DateTime<Utc>>,
    pub is_online: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub last_password_change: Option<DateTime<Utc>>,
    pub reset_token: Option<ResetToken>,
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Create a new account. Emails are compared case-insensitively, so the
    /// stored form is lowercased up front.
    pub fn new(org_id: Uuid, email: String, password_hash: String) -> Self {
        Self {
            account_id: Uuid::new_v4(),
            org_id,
            email: email.to_lowercase(),
            password_hash,
            failed_login_attempts: 0,
            locked_until: None,
            two_factor_enabled: false,
            last_active_at: None,
            is_online: false,
            last_login_at: None,
            last_password_change: None,
            reset_token: None,
            created_at: Utc::now(),
        }
    }

    /// Whether the account is inside an active lock window.
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        matches!(self.locked_until, Some(until) if until > now)
    }

    /// Whether the lock window exists but has already elapsed.
    pub fn lock_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.locked_until, Some(until) if until <= now)
    }
}
