//! Password reset and authenticated password change.

use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::config::{PasswordPolicyConfig, SecurityPolicyConfig};
use crate::models::{
    ResetToken, SecurityEvent, SecurityEventType, Severity, TerminationReason,
};
use crate::store::SecurityStore;
use crate::utils::{generate_random_token, hash_password, sha256_hex, verify_password, Password,
    PasswordHashString};

use super::notify::{send_best_effort, NotificationCategory, Notifier};
use super::policy::PasswordPolicy;
use super::{SecurityError, SecurityEventLog};

/// The one response `initiate_reset` ever produces, for registered and
/// unknown emails alike.
pub const GENERIC_RESET_MESSAGE: &str =
    "If that email is registered, a password reset link is on its way.";

/// Anti-enumeration outcome of a reset request.
#[derive(Debug, Clone, Copy)]
pub struct ResetRequested {
    pub message: &'static str,
}

#[derive(Clone)]
pub struct PasswordResetFlow {
    store: Arc<dyn SecurityStore>,
    events: SecurityEventLog,
    notifier: Arc<dyn Notifier>,
    security: SecurityPolicyConfig,
    passwords: PasswordPolicyConfig,
}

impl PasswordResetFlow {
    pub fn new(
        store: Arc<dyn SecurityStore>,
        events: SecurityEventLog,
        notifier: Arc<dyn Notifier>,
        security: SecurityPolicyConfig,
        passwords: PasswordPolicyConfig,
    ) -> Self {
        Self {
            store,
            events,
            notifier,
            security,
            passwords,
        }
    }

    /// Start a reset. The response is identical whether or not the email
    /// matches an account; only the internal event log records the
    /// difference. A registered account gets a 1-hour token dispatched
    /// through the notifier, best-effort.
    pub async fn initiate_reset(&self, email: &str) -> Result<ResetRequested, SecurityError> {
        match self.store.find_account_by_email(email).await? {
            Some(mut account) => {
                let token = generate_random_token();
                let expiry_minutes = self.security.reset_token_expiry_minutes;
                account.reset_token = Some(ResetToken {
                    token_hash: sha256_hex(token.as_bytes()),
                    expires_at: Utc::now() + Duration::minutes(expiry_minutes),
                });
                self.store.update_account(&account).await?;

                self.events
                    .log_event(
                        SecurityEvent::new(
                            SecurityEventType::PasswordResetRequested,
                            Severity::Low,
                            "password reset requested",
                        )
                        .with_account(account.account_id),
                    )
                    .await;

                send_best_effort(
                    self.notifier.as_ref(),
                    NotificationCategory::PasswordReset,
                    &account.email,
                    serde_json::json!({
                        "reset_token": token,
                        "expires_in_minutes": expiry_minutes,
                    }),
                )
                .await;
            }
            None => {
                // Internal record only; the caller sees the same response.
                tracing::info!("Password reset requested for unknown email");
            }
        }

        Ok(ResetRequested {
            message: GENERIC_RESET_MESSAGE,
        })
    }

    /// Redeem a reset token. On success the account comes out fully
    /// recovered: new password, no lockout, no failure count, and every
    /// session terminated.
    pub async fn reset_password(
        &self,
        token: &str,
        new_password: &str,
    ) -> Result<(), SecurityError> {
        let token_hash = sha256_hex(token.as_bytes());
        let Some(mut account) = self.store.find_account_by_reset_hash(&token_hash).await? else {
            return Err(SecurityError::Authentication(
                "invalid or unknown reset token".to_string(),
            ));
        };
        let Some(reset) = account.reset_token.clone() else {
            return Err(SecurityError::Authentication(
                "invalid or unknown reset token".to_string(),
            ));
        };

        let now = Utc::now();
        if reset.is_expired(now) {
            return Err(SecurityError::Expired("reset token"));
        }

        PasswordPolicy::validate(new_password, &self.passwords)
            .map_err(|e| SecurityError::Validation(e.to_string()))?;

        let password_hash = hash_password(&Password::new(new_password.to_string()))
            .map_err(SecurityError::Internal)?;

        account.password_hash = password_hash.into_string();
        account.last_password_change = Some(now);
        account.reset_token = None;
        account.locked_until = None;
        account.failed_login_attempts = 0;
        account.is_online = false;
        self.store.update_account(&account).await?;

        let terminated = self
            .store
            .terminate_sessions_for_account(
                account.account_id,
                TerminationReason::PasswordReset,
                now,
            )
            .await?;

        self.events
            .log_event(
                SecurityEvent::new(
                    SecurityEventType::PasswordResetCompleted,
                    Severity::Low,
                    "password reset completed",
                )
                .with_account(account.account_id)
                .with_metadata(serde_json::json!({ "sessions_terminated": terminated })),
            )
            .await;

        tracing::info!(account_id = %account.account_id, "Password reset successful");
        Ok(())
    }

    /// Authenticated password change: requires the current password, and
    /// the new one must differ and satisfy policy.
    pub async fn change_password(
        &self,
        account_id: Uuid,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), SecurityError> {
        let mut account = self
            .store
            .find_account(account_id)
            .await?
            .ok_or(SecurityError::NotFound("account"))?;

        if verify_password(
            &Password::new(current_password.to_string()),
            &PasswordHashString::new(account.password_hash.clone()),
        )
        .is_err()
        {
            self.events
                .log_event(
                    SecurityEvent::new(
                        SecurityEventType::PasswordChangeFailed,
                        Severity::Medium,
                        "password change rejected: wrong current password",
                    )
                    .with_account(account_id),
                )
                .await;
            return Err(SecurityError::Authentication(
                "current password is incorrect".to_string(),
            ));
        }

        if current_password == new_password {
            return Err(SecurityError::Validation(
                "new password must differ from the current password".to_string(),
            ));
        }

        PasswordPolicy::validate(new_password, &self.passwords)
            .map_err(|e| SecurityError::Validation(e.to_string()))?;

        let password_hash = hash_password(&Password::new(new_password.to_string()))
            .map_err(SecurityError::Internal)?;
        account.password_hash = password_hash.into_string();
        account.last_password_change = Some(Utc::now());
        self.store.update_account(&account).await?;

        self.events
            .log_event(
                SecurityEvent::new(
                    SecurityEventType::PasswordChanged,
                    Severity::Low,
                    "password changed",
                )
                .with_account(account_id),
            )
            .await;
        Ok(())
    }

    /// Sweep: drop reset tokens past their deadline.
    pub async fn cleanup_expired_tokens(&self) -> Result<u64, SecurityError> {
        Ok(self.store.clear_expired_reset_tokens(Utc::now()).await?)
    }
}
