//! Second-factor code issuance and verification.

use std::sync::Arc;

use chrono::Utc;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::config::SecurityPolicyConfig;
use crate::models::{SecurityEvent, SecurityEventType, Severity, TwoFactorCode};
use crate::store::SecurityStore;
use crate::utils::generate_numeric_code;

use super::notify::{NotificationCategory, Notifier};
use super::{SecurityError, SecurityEventLog};

#[derive(Clone)]
pub struct SecondFactorIssuer {
    store: Arc<dyn SecurityStore>,
    events: SecurityEventLog,
    notifier: Arc<dyn Notifier>,
    policy: SecurityPolicyConfig,
}

impl SecondFactorIssuer {
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

    /// Issue a fresh 6-digit code and dispatch it.
    ///
    /// Any prior unused code is invalidated first, keeping the at-most-one
    /// outstanding-code invariant. Dispatch failure fails the operation:
    /// its sole purpose is delivery.
    pub async fn generate_and_send_code(&self, account_id: Uuid) -> Result<(), SecurityError> {
        let account = self
            .store
            .find_account(account_id)
            .await?
            .ok_or(SecurityError::NotFound("account"))?;

        self.store
            .delete_unused_codes_for_account(account_id)
            .await?;

        let code = generate_numeric_code();
        let expiry_minutes = self.policy.two_factor_code_expiry_minutes;
        let record = TwoFactorCode::new(account_id, code.clone(), expiry_minutes);
        self.store.insert_two_factor_code(record).await?;

        self.events
            .log_event(
                SecurityEvent::new(
                    SecurityEventType::TwoFactorIssued,
                    Severity::Low,
                    "second-factor code issued",
                )
                .with_account(account_id),
            )
            .await;

        self.notifier
            .send(
                NotificationCategory::SecondFactorCode,
                &account.email,
                serde_json::json!({
                    "code": code,
                    "expires_in_minutes": expiry_minutes,
                }),
            )
            .await
            .map_err(SecurityError::Internal)?;

        Ok(())
    }

    /// Verify a submitted code. Succeeds only against a matching, unused,
    /// unexpired code, which is consumed: a second call with the same code
    /// fails.
    pub async fn verify_code(&self, account_id: Uuid, code: &str) -> Result<(), SecurityError> {
        let now = Utc::now();
        let matched = self
            .store
            .unused_codes_for_account(account_id)
            .await?
            .into_iter()
            .find(|c| c.is_valid(now) && bool::from(c.code.as_bytes().ct_eq(code.as_bytes())));

        match matched {
            Some(mut record) => {
                record.used_at = Some(now);
                self.store.update_two_factor_code(&record).await?;
                self.events
                    .log_event(
                        SecurityEvent::new(
                            SecurityEventType::TwoFactorVerified,
                            Severity::Low,
                            "second-factor code verified",
                        )
                        .with_account(account_id),
                    )
                    .await;
                Ok(())
            }
            None => {
                self.events
                    .log_event(
                        SecurityEvent::new(
                            SecurityEventType::TwoFactorFailed,
                            Severity::Medium,
                            "second-factor verification failed",
                        )
                        .with_account(account_id),
                    )
                    .await;
                Err(SecurityError::Authentication(
                    "invalid or expired second-factor code".to_string(),
                ))
            }
        }
    }

    pub async fn enable(&self, account_id: Uuid) -> Result<(), SecurityError> {
        let mut account = self
            .store
            .find_account(account_id)
            .await?
            .ok_or(SecurityError::NotFound("account"))?;

        account.two_factor_enabled = true;
        self.store.update_account(&account).await?;

        self.events
            .log_event(
                SecurityEvent::new(
                    SecurityEventType::TwoFactorEnabled,
                    Severity::Low,
                    "two-factor authentication enabled",
                )
                .with_account(account_id),
            )
            .await;
        Ok(())
    }

    /// Disable 2FA; every outstanding code is invalidated with it.
    pub async fn disable(&self, account_id: Uuid) -> Result<(), SecurityError> {
        let mut account = self
            .store
            .find_account(account_id)
            .await?
            .ok_or(SecurityError::NotFound("account"))?;

        account.two_factor_enabled = false;
        self.store.update_account(&account).await?;
        self.store
            .delete_unused_codes_for_account(account_id)
            .await?;

        self.events
            .log_event(
                SecurityEvent::new(
                    SecurityEventType::TwoFactorDisabled,
                    Severity::Low,
                    "two-factor authentication disabled",
                )
                .with_account(account_id),
            )
            .await;
        Ok(())
    }

    /// Whether the organization requires a second factor. Policy-driven,
    /// independent of the account's own toggle.
    pub fn is_required(&self, account_id: Uuid) -> bool {
        let required = self.policy.two_factor_required;
        tracing::debug!(account_id = %account_id, required, "Second-factor requirement check");
        required
    }

    /// Sweep: drop expired codes.
    pub async fn cleanup_expired_codes(&self) -> Result<u64, SecurityError> {
        Ok(self.store.delete_expired_codes(Utc::now()).await?)
    }
}
