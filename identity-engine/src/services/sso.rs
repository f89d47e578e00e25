//! Federated login correlation.
//!
//! The identity-provider protocol itself is an external collaborator; this
//! component maps provider outcomes onto the security event log, enforces
//! the organization's email-domain restriction, and stamps login times.

use std::sync::Arc;

use chrono::Utc;

use crate::config::SecurityPolicyConfig;
use crate::models::{Account, SecurityEvent, SecurityEventType, Severity};
use crate::store::SecurityStore;

use super::{SecurityError, SecurityEventLog};

/// Outcome payload handed over by the identity-provider collaborator.
#[derive(Debug, Clone)]
pub struct SsoIdentity {
    pub email: String,
    pub provider: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Clone)]
pub struct SsoCorrelator {
    store: Arc<dyn SecurityStore>,
    events: SecurityEventLog,
    policy: SecurityPolicyConfig,
}

impl SsoCorrelator {
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

    /// Enforce the configured email-domain restriction, when one is set.
    pub fn validate_email_domain(&self, email: &str) -> Result<(), SecurityError> {
        let Some(required) = &self.policy.sso_allowed_domain else {
            return Ok(());
        };
        match email.rsplit_once('@') {
            Some((_, domain)) if domain.eq_ignore_ascii_case(required) => Ok(()),
            _ => Err(SecurityError::Validation(
                "email domain is not permitted for single sign-on".to_string(),
            )),
        }
    }

    /// A provider-side success. Returns the matched account, if any; the
    /// engine does not provision accounts for unmatched identities.
    pub async fn handle_login_success(
        &self,
        identity: &SsoIdentity,
    ) -> Result<Option<Account>, SecurityError> {
        self.validate_email_domain(&identity.email)?;

        match self.store.find_account_by_email(&identity.email).await? {
            Some(mut account) => {
                account.last_login_at = Some(Utc::now());
                self.store.update_account(&account).await?;

                let mut sso_event = SecurityEvent::new(
                    SecurityEventType::SsoLogin,
                    Severity::Low,
                    format!("federated login via {}", identity.provider),
                )
                .with_account(account.account_id)
                .with_metadata(serde_json::json!({ "provider": identity.provider }));
                if let Some(ip) = &identity.ip_address {
                    sso_event = sso_event.with_ip(ip.clone());
                }
                self.events.log_event(sso_event).await;

                // Also feed the ordinary login stream so origin analysis
                // sees federated logins alongside password logins.
                let mut login_event =
                    SecurityEvent::new(SecurityEventType::LoginSuccess, Severity::Low, "login")
                        .with_account(account.account_id)
                        .with_metadata(serde_json::json!({ "provider": identity.provider }));
                if let Some(ip) = &identity.ip_address {
                    login_event = login_event.with_ip(ip.clone());
                }
                if let Some(user_agent) = &identity.user_agent {
                    login_event = login_event.with_user_agent(user_agent.clone());
                }
                self.events.log_event(login_event).await;

                Ok(Some(account))
            }
            None => {
                let mut event = SecurityEvent::new(
                    SecurityEventType::SsoLoginFailed,
                    Severity::Medium,
                    format!(
                        "federated login via {} matched no account",
                        identity.provider
                    ),
                )
                .with_metadata(serde_json::json!({
                    "provider": identity.provider,
                    "reason": "no_matching_account",
                }));
                if let Some(ip) = &identity.ip_address {
                    event = event.with_ip(ip.clone());
                }
                self.events.log_event(event).await;
                Ok(None)
            }
        }
    }

    /// A provider-side failure, recorded with the provider's reason.
    pub async fn handle_login_failure(
        &self,
        identity: &SsoIdentity,
        reason: &str,
    ) -> Result<(), SecurityError> {
        let account = self.store.find_account_by_email(&identity.email).await?;

        let mut event = SecurityEvent::new(
            SecurityEventType::SsoLoginFailed,
            Severity::Medium,
            format!("federated login via {} failed: {}", identity.provider, reason),
        )
        .with_metadata(serde_json::json!({
            "provider": identity.provider,
            "reason": reason,
        }));
        if let Some(account) = account {
            event = event.with_account(account.account_id);
        }
        if let Some(ip) = &identity.ip_address {
            event = event.with_ip(ip.clone());
        }
        self.events.log_event(event).await;
        Ok(())
    }
}
