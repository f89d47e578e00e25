//! Failed-login tracking and account lockout.

use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::config::SecurityPolicyConfig;
use crate::models::{SecurityEvent, SecurityEventType, Severity, TerminationReason};
use crate::store::SecurityStore;

use super::notify::{send_best_effort, NotificationCategory, Notifier};
use super::{SecurityError, SecurityEventLog};

/// Result of recording a failed login against a known account.
#[derive(Debug, Clone, Copy)]
pub struct FailedLoginOutcome {
    pub attempts: u32,
    pub max_attempts: u32,
    pub locked: bool,
}

#[derive(Clone)]
pub struct CredentialGuard {
    store: Arc<dyn SecurityStore>,
    events: SecurityEventLog,
    notifier: Arc<dyn Notifier>,
    policy: SecurityPolicyConfig,
}

impl CredentialGuard {
    pub fn new(
        store: Arc<dyn SecurityStore>,
        events: SecurityEventLog,
        notifier: Arc<dyn Notifier>,
        policy: SecurityPolicyConfig,
    ) -> Self {
        Self {
            store,
            events,
            notifier,
            policy,
        }
    }

    /// Record a failed login attempt.
    ///
    /// Unknown emails log a medium event and return `None`; the caller
    /// gets no signal distinguishing unknown accounts from wrong passwords.
    /// For known accounts the counter increment is a single atomic store
    /// operation, so parallel failures cannot under-count and slip past the
    /// lockout threshold.
    pub async fn record_failed_login(
        &self,
        email: &str,
        ip: &str,
        user_agent: &str,
        reason: Option<&str>,
    ) -> Result<Option<FailedLoginOutcome>, SecurityError> {
        let Some(account) = self.store.find_account_by_email(email).await? else {
            self.events
                .log_event(
                    SecurityEvent::new(
                        SecurityEventType::LoginFailed,
                        Severity::Medium,
                        "failed login for unknown account",
                    )
                    .with_ip(ip)
                    .with_user_agent(user_agent)
                    .with_metadata(serde_json::json!({ "reason": reason })),
                )
                .await;
            return Ok(None);
        };

        let attempts = self
            .store
            .increment_failed_logins(account.account_id)
            .await?;
        let max_attempts = self.policy.max_failed_logins;

        self.events
            .log_event(
                SecurityEvent::new(
                    SecurityEventType::LoginFailed,
                    Severity::Medium,
                    format!("failed login attempt {}/{}", attempts, max_attempts),
                )
                .with_account(account.account_id)
                .with_ip(ip)
                .with_user_agent(user_agent)
                .with_metadata(serde_json::json!({
                    "attempt": attempts,
                    "max_attempts": max_attempts,
                    "reason": reason,
                })),
            )
            .await;

        let locked = attempts >= max_attempts;
        if locked {
            self.lock_account(
                account.account_id,
                self.policy.lockout_duration_minutes,
                Some(ip),
                Some(user_agent),
            )
            .await?;
        }

        Ok(Some(FailedLoginOutcome {
            attempts,
            max_attempts,
            locked,
        }))
    }

    /// Record a successful login: clears the failure counter, stamps
    /// `last_login_at`, and feeds the event log so origin analysis runs.
    pub async fn record_successful_login(
        &self,
        account_id: Uuid,
        ip: &str,
        user_agent: &str,
    ) -> Result<(), SecurityError> {
        let mut account = self
            .store
            .find_account(account_id)
            .await?
            .ok_or(SecurityError::NotFound("account"))?;

        let now = Utc::now();
        account.failed_login_attempts = 0;
        account.last_login_at = Some(now);
        account.last_active_at = Some(now);
        account.is_online = true;
        self.store.update_account(&account).await?;

        self.events
            .log_event(
                SecurityEvent::new(SecurityEventType::LoginSuccess, Severity::Low, "login")
                    .with_account(account_id)
                    .with_ip(ip)
                    .with_user_agent(user_agent),
            )
            .await;
        Ok(())
    }

    /// Lock the account for `duration_minutes` (default policy duration),
    /// terminate its sessions, and notify the owner best-effort.
    pub async fn lock_account(
        &self,
        account_id: Uuid,
        duration_minutes: i64,
        ip: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<(), SecurityError> {
        let mut account = self
            .store
            .find_account(account_id)
            .await?
            .ok_or(SecurityError::NotFound("account"))?;

        let now = Utc::now();
        let until = now + Duration::minutes(duration_minutes);
        account.locked_until = Some(until);
        account.is_online = false;
        self.store.update_account(&account).await?;

        let terminated = self
            .store
            .terminate_sessions_for_account(account_id, TerminationReason::AccountLocked, now)
            .await?;

        tracing::warn!(
            account_id = %account_id,
            locked_until = %until,
            sessions_terminated = terminated,
            "Account locked"
        );

        let mut event = SecurityEvent::new(
            SecurityEventType::AccountLocked,
            Severity::High,
            format!("account locked until {}", until),
        )
        .with_account(account_id)
        .with_metadata(serde_json::json!({
            "locked_until": until,
            "sessions_terminated": terminated,
        }));
        if let Some(ip) = ip {
            event = event.with_ip(ip);
        }
        if let Some(user_agent) = user_agent {
            event = event.with_user_agent(user_agent);
        }
        self.events.log_event(event).await;

        // The lock must hold even when the notice cannot be delivered.
        send_best_effort(
            self.notifier.as_ref(),
            NotificationCategory::LockoutNotice,
            &account.email,
            serde_json::json!({ "locked_until": until.to_rfc3339() }),
        )
        .await;

        Ok(())
    }

    /// Whether the account is currently locked. A lock whose window has
    /// elapsed is cleared on this call (lazy expiry) and reported unlocked.
    pub async fn is_account_locked(&self, email: &str) -> Result<bool, SecurityError> {
        let Some(mut account) = self.store.find_account_by_email(email).await? else {
            return Ok(false);
        };

        let now = Utc::now();
        if account.is_locked(now) {
            return Ok(true);
        }

        if account.lock_expired(now) {
            account.locked_until = None;
            account.failed_login_attempts = 0;
            self.store.update_account(&account).await?;
            tracing::info!(account_id = %account.account_id, "Lock window elapsed; account auto-unlocked");
        }
        Ok(false)
    }

    /// Administrative unlock with attribution.
    pub async fn unlock_account(
        &self,
        email: &str,
        unlocked_by: Option<&str>,
    ) -> Result<(), SecurityError> {
        let mut account = self
            .store
            .find_account_by_email(email)
            .await?
            .ok_or(SecurityError::NotFound("account"))?;

        account.locked_until = None;
        account.failed_login_attempts = 0;
        self.store.update_account(&account).await?;

        self.events
            .log_event(
                SecurityEvent::new(
                    SecurityEventType::AccountUnlocked,
                    Severity::Low,
                    "account unlocked",
                )
                .with_account(account.account_id)
                .with_metadata(serde_json::json!({ "unlocked_by": unlocked_by })),
            )
            .await;
        Ok(())
    }

    /// Called on successful authentication; no-op when already zero.
    pub async fn reset_failed_attempts(&self, account_id: Uuid) -> Result<(), SecurityError> {
        let mut account = self
            .store
            .find_account(account_id)
            .await?
            .ok_or(SecurityError::NotFound("account"))?;

        if account.failed_login_attempts == 0 {
            return Ok(());
        }
        account.failed_login_attempts = 0;
        self.store.update_account(&account).await?;
        Ok(())
    }

    /// Batch sweep clearing every lock window that has elapsed.
    pub async fn cleanup_expired_lockouts(&self) -> Result<u64, SecurityError> {
        let cleared = self.store.clear_expired_lockouts(Utc::now()).await?;
        if cleared > 0 {
            tracing::info!(cleared, "Expired lockouts cleared");
        }
        Ok(cleared)
    }
}
