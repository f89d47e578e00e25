//! Heartbeats and idle-timeout sweeps over account activity.

use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::config::SecurityPolicyConfig;
use crate::models::{SecurityEvent, SecurityEventType, Severity, TerminationReason};
use crate::store::SecurityStore;

use super::{SecurityError, SecurityEventLog};

#[derive(Clone)]
pub struct ActivityTracker {
    store: Arc<dyn SecurityStore>,
    events: SecurityEventLog,
    policy: SecurityPolicyConfig,
}

impl ActivityTracker {
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

    /// Heartbeat: stamp the account active now.
    pub async fn update_user_activity(&self, account_id: Uuid) -> Result<(), SecurityError> {
        let mut account = self
            .store
            .find_account(account_id)
            .await?
            .ok_or(SecurityError::NotFound("account"))?;

        account.last_active_at = Some(Utc::now());
        account.is_online = true;
        self.store.update_account(&account).await?;
        Ok(())
    }

    /// Whether the account's idle time has passed the organization's idle
    /// timeout. Pure check: mutates nothing.
    pub async fn check_session_expiry(&self, account_id: Uuid) -> Result<bool, SecurityError> {
        let account = self
            .store
            .find_account(account_id)
            .await?
            .ok_or(SecurityError::NotFound("account"))?;

        let Some(last_active) = account.last_active_at else {
            return Ok(false);
        };
        let idle = Utc::now() - last_active;
        Ok(idle > Duration::minutes(self.policy.idle_timeout_minutes))
    }

    /// Terminate every active session for the account and mark it offline.
    pub async fn expire_user_session(
        &self,
        account_id: Uuid,
        reason: TerminationReason,
    ) -> Result<u64, SecurityError> {
        let now = Utc::now();
        let terminated = self
            .store
            .terminate_sessions_for_account(account_id, reason, now)
            .await?;

        let mut account = self
            .store
            .find_account(account_id)
            .await?
            .ok_or(SecurityError::NotFound("account"))?;
        account.is_online = false;
        self.store.update_account(&account).await?;

        self.events
            .log_event(
                SecurityEvent::new(
                    SecurityEventType::SessionTimeout,
                    Severity::Low,
                    format!("sessions expired: {}", reason.as_str()),
                )
                .with_account(account_id)
                .with_metadata(serde_json::json!({
                    "reason": reason.as_str(),
                    "count": terminated,
                })),
            )
            .await;
        Ok(terminated)
    }

    /// Periodic sweep: force-expire every online account idle past the
    /// inactivity cutoff. One account failing must not abort the sweep.
    pub async fn cleanup_inactive_sessions(&self) -> Result<u64, SecurityError> {
        let cutoff = Utc::now() - Duration::minutes(self.policy.inactivity_cutoff_minutes);
        let idle_accounts = self.store.online_accounts_idle_since(cutoff).await?;

        let mut expired = 0;
        for account in idle_accounts {
            match self
                .expire_user_session(account.account_id, TerminationReason::Inactivity)
                .await
            {
                Ok(_) => expired += 1,
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        account_id = %account.account_id,
                        "Failed to expire idle account; continuing sweep"
                    );
                }
            }
        }

        if expired > 0 {
            tracing::info!(expired, "Inactivity sweep expired idle accounts");
        }
        Ok(expired)
    }
}
