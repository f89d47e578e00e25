//! Security event model - append-only audit ledger entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Security event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityEventType {
    LoginSuccess,
    LoginFailed,
    /// Escalation: repeated failures for one account inside a short window.
    MultipleFailedLogins,
    /// Login from an unexpected address or location.
    SuspiciousLogin,
    AccountLocked,
    AccountUnlocked,
    SessionTimeout,
    SessionTerminated,
    DeviceRegistered,
    DeviceTrusted,
    DeviceRemoved,
    TwoFactorIssued,
    TwoFactorVerified,
    TwoFactorFailed,
    TwoFactorEnabled,
    TwoFactorDisabled,
    ApiKeyCreated,
    ApiKeyUsed,
    ApiKeyRotated,
    ApiKeyDeactivated,
    PasswordResetRequested,
    PasswordResetCompleted,
    PasswordChanged,
    PasswordChangeFailed,
    RateLimitExceeded,
    SsoLogin,
    SsoLoginFailed,
}

impl SecurityEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityEventType::LoginSuccess => "login_success",
            SecurityEventType::LoginFailed => "login_failed",
            SecurityEventType::MultipleFailedLogins => "multiple_failed_logins",
            SecurityEventType::SuspiciousLogin => "suspicious_login",
            SecurityEventType::AccountLocked => "account_locked",
            SecurityEventType::AccountUnlocked => "account_unlocked",
            SecurityEventType::SessionTimeout => "session_timeout",
            SecurityEventType::SessionTerminated => "session_terminated",
            SecurityEventType::DeviceRegistered => "device_registered",
            SecurityEventType::DeviceTrusted => "device_trusted",
            SecurityEventType::DeviceRemoved => "device_removed",
            SecurityEventType::TwoFactorIssued => "two_factor_issued",
            SecurityEventType::TwoFactorVerified => "two_factor_verified",
            SecurityEventType::TwoFactorFailed => "two_factor_failed",
            SecurityEventType::TwoFactorEnabled => "two_factor_enabled",
            SecurityEventType::TwoFactorDisabled => "two_factor_disabled",
            SecurityEventType::ApiKeyCreated => "api_key_created",
            SecurityEventType::ApiKeyUsed => "api_key_used",
            SecurityEventType::ApiKeyRotated => "api_key_rotated",
            SecurityEventType::ApiKeyDeactivated => "api_key_deactivated",
            SecurityEventType::PasswordResetRequested => "password_reset_requested",
            SecurityEventType::PasswordResetCompleted => "password_reset_completed",
            SecurityEventType::PasswordChanged => "password_changed",
            SecurityEventType::PasswordChangeFailed => "password_change_failed",
            SecurityEventType::RateLimitExceeded => "rate_limit_exceeded",
            SecurityEventType::SsoLogin => "sso_login",
            SecurityEventType::SsoLoginFailed => "sso_login_failed",
        }
    }
}

/// Severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

/// Security audit ledger entry. Append-only: resolution is the only
/// permitted mutation after the fact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityEvent {
    pub event_id: Uuid,
    pub account_id: Option<Uuid>,
    pub event_type: SecurityEventType,
    pub severity: Severity,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub description: String,
    pub metadata: serde_json::Value,
    pub is_resolved: bool,
    pub resolved_by: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl SecurityEvent {
    pub fn new(
        event_type: SecurityEventType,
        severity: Severity,
        description: impl Into<String>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            account_id: None,
            event_type,
            severity,
            ip_address: None,
            user_agent: None,
            description: description.into(),
            metadata: serde_json::Value::Null,
            is_resolved: false,
            resolved_by: None,
            resolved_at: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_account(mut self, account_id: Uuid) -> Self {
        self.account_id = Some(account_id);
        self
    }

    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip_address = Some(ip.into());
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}
