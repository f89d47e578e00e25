//! Session issuance, validation, and termination.

use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::config::SecurityPolicyConfig;
use crate::models::{SecurityEvent, SecurityEventType, Session, Severity, TerminationReason};
use crate::store::SecurityStore;
use crate::utils::generate_random_token;

use super::{SecurityError, SecurityEventLog};

/// Connection attributes captured at session creation.
#[derive(Debug, Clone)]
pub struct ClientInfo {
    pub ip_address: String,
    pub user_agent: String,
    pub device_id: Option<String>,
}

#[derive(Clone)]
pub struct SessionRegistry {
    store: Arc<dyn SecurityStore>,
    events: SecurityEventLog,
    policy: SecurityPolicyConfig,
}

impl SessionRegistry {
    pub fn new(
        store: Arc<dyn SecurityStore>,
        events: SecurityEventLog,
        policy: SecurityPolicyConfig,
    ) -> Self {
        Self {
            store,
            events,
            policy,
        }
    }

    /// Issue a new session for the account. Enforces the concurrent-session
    /// limit first, evicting the stalest session when at capacity.
    pub async fn create_session(
        &self,
        account_id: Uuid,
        client: ClientInfo,
        timeout_minutes: Option<i64>,
    ) -> Result<Session, SecurityError> {
        let mut account = self
            .store
            .find_account(account_id)
            .await?
            .ok_or(SecurityError::NotFound("account"))?;

        self.check_session_limits(account_id).await?;

        let timeout = timeout_minutes.unwrap_or(self.policy.session_timeout_minutes);
        let session = Session::new(
            generate_random_token(),
            account_id,
            client.device_id,
            client.ip_address,
            client.user_agent,
            timeout,
        );
        self.store.insert_session(session.clone()).await?;

        account.is_online = true;
        account.last_active_at = Some(Utc::now());
        self.store.update_account(&account).await?;

        tracing::info!(account_id = %account_id, "Session created");
        Ok(session)
    }

    /// Validate a session token.
    ///
    /// A token found past its deadline is terminated on this same call
    /// (lazy expiry) and reported expired. A live token refreshes
    /// `last_active_at` on both the session and the account.
    pub async fn validate_session(&self, token: &str) -> Result<Session, SecurityError> {
        let Some(mut session) = self.store.find_session(token).await? else {
            return Err(SecurityError::NotFound("session"));
        };
        if !session.is_active {
            return Err(SecurityError::NotFound("session"));
        }

        let now = Utc::now();
        if session.is_expired(now) {
            session.terminate(TerminationReason::Expired, now);
            self.store.update_session(&session).await?;
            self.mark_offline_if_sessionless(session.account_id).await?;
            self.events
                .log_event(
                    SecurityEvent::new(
                        SecurityEventType::SessionTimeout,
                        Severity::Low,
                        "session expired",
                    )
                    .with_account(session.account_id)
                    .with_ip(session.ip_address.clone()),
                )
                .await;
            return Err(SecurityError::Expired("session"));
        }

        session.last_active_at = now;
        self.store.update_session(&session).await?;

        if let Some(mut account) = self.store.find_account(session.account_id).await? {
            account.last_active_at = Some(now);
            account.is_online = true;
            self.store.update_account(&account).await?;
        }

        Ok(session)
    }

    /// Push the session deadline forward; used on each authenticated
    /// activity.
    pub async fn extend_session(
        &self,
        token: &str,
        timeout_minutes: Option<i64>,
    ) -> Result<Session, SecurityError> {
        let Some(mut session) = self.store.find_session(token).await? else {
            return Err(SecurityError::NotFound("session"));
        };
        if !session.is_active {
            return Err(SecurityError::NotFound("session"));
        }

        let timeout = timeout_minutes.unwrap_or(self.policy.session_timeout_minutes);
        session.expires_at = Utc::now() + Duration::minutes(timeout);
        self.store.update_session(&session).await?;
        Ok(session)
    }

    /// Terminate one session. Idempotent: a session already terminated is
    /// left untouched.
    pub async fn terminate_session(
        &self,
        token: &str,
        reason: TerminationReason,
    ) -> Result<(), SecurityError> {
        let Some(mut session) = self.store.find_session(token).await? else {
            return Err(SecurityError::NotFound("session"));
        };
        if !session.is_active {
            return Ok(());
        }

        let now = Utc::now();
        session.terminate(reason, now);
        self.store.update_session(&session).await?;
        self.mark_offline_if_sessionless(session.account_id).await?;

        self.events
            .log_event(
                SecurityEvent::new(
                    SecurityEventType::SessionTerminated,
                    Severity::Low,
                    format!("session terminated: {}", reason.as_str()),
                )
                .with_account(session.account_id)
                .with_metadata(serde_json::json!({ "reason": reason.as_str() })),
            )
            .await;
        Ok(())
    }

    /// Bulk-terminate every active session for the account and mark it
    /// offline.
    pub async fn terminate_all_user_sessions(
        &self,
        account_id: Uuid,
        reason: TerminationReason,
    ) -> Result<u64, SecurityError> {
        let terminated = self
            .store
            .terminate_sessions_for_account(account_id, reason, Utc::now())
            .await?;

        if let Some(mut account) = self.store.find_account(account_id).await? {
            account.is_online = false;
            self.store.update_account(&account).await?;
        }

        if terminated > 0 {
            self.events
                .log_event(
                    SecurityEvent::new(
                        SecurityEventType::SessionTerminated,
                        Severity::Low,
                        format!("{} sessions terminated: {}", terminated, reason.as_str()),
                    )
                    .with_account(account_id)
                    .with_metadata(serde_json::json!({
                        "reason": reason.as_str(),
                        "count": terminated,
                    })),
                )
                .await;
        }
        Ok(terminated)
    }

    /// Enforce the concurrent-session cap: while at or above the limit,
    /// evict the session with the oldest `last_active_at` (tie-break:
    /// oldest `created_at`) so the new session has room.
    pub async fn check_session_limits(&self, account_id: Uuid) -> Result<(), SecurityError> {
        let max_sessions = self.policy.max_concurrent_sessions;
        let mut active = self.store.active_sessions_for_account(account_id).await?;
        let now = Utc::now();

        while active.len() >= max_sessions {
            let Some(victim) = active
                .iter()
                .min_by_key(|s| (s.last_active_at, s.created_at))
                .cloned()
            else {
                break;
            };

            let mut evicted = victim.clone();
            evicted.terminate(TerminationReason::SessionLimitExceeded, now);
            self.store.update_session(&evicted).await?;
            active.retain(|s| s.token != victim.token);

            self.events
                .log_event(
                    SecurityEvent::new(
                        SecurityEventType::SessionTerminated,
                        Severity::Low,
                        "session evicted: concurrent session limit reached",
                    )
                    .with_account(account_id)
                    .with_metadata(serde_json::json!({
                        "reason": TerminationReason::SessionLimitExceeded.as_str(),
                        "max_sessions": max_sessions,
                    })),
                )
                .await;
        }
        Ok(())
    }

    async fn mark_offline_if_sessionless(&self, account_id: Uuid) -> Result<(), SecurityError> {
        let remaining = self.store.active_sessions_for_account(account_id).await?;
        if remaining.is_empty() {
            if let Some(mut account) = self.store.find_account(account_id).await? {
                account.is_online = false;
                self.store.update_account(&account).await?;
            }
        }
        Ok(())
    }
}
