//! Session model - short-lived opaque session tokens.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Why a session stopped being valid. Terminal; set exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    Expired,
    UserLogout,
    AccountLocked,
    PasswordReset,
    DeviceRemoved,
    SessionLimitExceeded,
    Inactivity,
    AdminAction,
}

impl TerminationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminationReason::Expired => "expired",
            TerminationReason::UserLogout => "user_logout",
            TerminationReason::AccountLocked => "account_locked",
            TerminationReason::PasswordReset => "password_reset",
            TerminationReason::DeviceRemoved => "device_removed",
            TerminationReason::SessionLimitExceeded => "session_limit_exceeded",
            TerminationReason::Inactivity => "inactivity",
            TerminationReason::AdminAction => "admin_action",
        }
    }
}

/// Session entity. Expiry is an absolute deadline compared against
/// wall-clock time, never a countdown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub account_id: Uuid,
    pub device_id: Option<String>,
    pub ip_address: String,
    pub user_agent: String,
    pub expires_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub is_active: bool,
    pub terminated_at: Option<DateTime<Utc>>,
    pub termination_reason: Option<TerminationReason>,
}

impl Session {
    pub fn new(
        token: String,
        account_id: Uuid,
        device_id: Option<String>,
        ip_address: String,
        user_agent: String,
        timeout_minutes: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            token,
            account_id,
            device_id,
            ip_address,
            user_agent,
            expires_at: now + Duration::minutes(timeout_minutes),
            last_active_at: now,
            created_at: now,
            is_active: true,
            terminated_at: None,
            termination_reason: None,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }

    /// Mark the session terminated. Terminal once applied.
    pub fn terminate(&mut self, reason: TerminationReason, now: DateTime<Utc>) {
        self.is_active = false;
        self.terminated_at = Some(now);
        self.termination_reason = Some(reason);
    }
}
