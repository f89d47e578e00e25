//! Read-only aggregate queries for the administrative surface.

use std::sync::Arc;

use chrono::{Duration, Utc};

use crate::models::{SecurityEventType, Severity};
use crate::store::{EventFilter, SecurityStore};

use super::SecurityError;

#[derive(Debug, Clone, Copy)]
pub struct LockoutStats {
    pub currently_locked: u64,
    pub lockouts_in_window: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct TwoFactorAdoption {
    pub total_accounts: u64,
    pub enabled_accounts: u64,
    pub adoption_rate: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct ApiKeyUsageStats {
    pub active_keys: u64,
    pub keys_used_in_window: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct SsoStats {
    pub successes: u64,
    pub failures: u64,
    pub success_rate: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct ResetFlowStats {
    pub requested: u64,
    pub completed: u64,
    pub completion_rate: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct SeverityBreakdown {
    pub low: u64,
    pub medium: u64,
    pub high: u64,
    pub critical: u64,
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

#[derive(Clone)]
pub struct SecurityStats {
    store: Arc<dyn SecurityStore>,
}

impl SecurityStats {
    pub fn new(store: Arc<dyn SecurityStore>) -> Self {
        Self { store }
    }

    pub async fn lockouts(&self, window: Duration) -> Result<LockoutStats, SecurityError> {
        let now = Utc::now();
        let currently_locked = self.store.count_locked_accounts(now).await?;
        let lockouts_in_window = self
            .store
            .count_events(
                &EventFilter::of_type(SecurityEventType::AccountLocked).since(now - window),
            )
            .await?;
        Ok(LockoutStats {
            currently_locked,
            lockouts_in_window,
        })
    }

    pub async fn two_factor_adoption(&self) -> Result<TwoFactorAdoption, SecurityError> {
        let total_accounts = self.store.count_accounts().await?;
        let enabled_accounts = self.store.count_two_factor_accounts().await?;
        Ok(TwoFactorAdoption {
            total_accounts,
            enabled_accounts,
            adoption_rate: ratio(enabled_accounts, total_accounts),
        })
    }

    pub async fn api_key_usage(&self, window: Duration) -> Result<ApiKeyUsageStats, SecurityError> {
        let active_keys = self.store.count_active_api_keys().await?;
        let keys_used_in_window = self
            .store
            .count_api_keys_used_since(Utc::now() - window)
            .await?;
        Ok(ApiKeyUsageStats {
            active_keys,
            keys_used_in_window,
        })
    }

    pub async fn sso_success_rate(&self, window: Duration) -> Result<SsoStats, SecurityError> {
        let since = Utc::now() - window;
        let successes = self
            .store
            .count_events(&EventFilter::of_type(SecurityEventType::SsoLogin).since(since))
            .await?;
        let failures = self
            .store
            .count_events(&EventFilter::of_type(SecurityEventType::SsoLoginFailed).since(since))
            .await?;
        Ok(SsoStats {
            successes,
            failures,
            success_rate: ratio(successes, successes + failures),
        })
    }

    pub async fn reset_completion_rate(
        &self,
        window: Duration,
    ) -> Result<ResetFlowStats, SecurityError> {
        let since = Utc::now() - window;
        let requested = self
            .store
            .count_events(
                &EventFilter::of_type(SecurityEventType::PasswordResetRequested).since(since),
            )
            .await?;
        let completed = self
            .store
            .count_events(
                &EventFilter::of_type(SecurityEventType::PasswordResetCompleted).since(since),
            )
            .await?;
        Ok(ResetFlowStats {
            requested,
            completed,
            completion_rate: ratio(completed, requested),
        })
    }

    pub async fn events_by_severity(
        &self,
        window: Duration,
    ) -> Result<SeverityBreakdown, SecurityError> {
        let since = Utc::now() - window;
        let count_for = |severity: Severity| EventFilter {
            severity: Some(severity),
            since: Some(since),
            ..EventFilter::default()
        };

        Ok(SeverityBreakdown {
            low: self.store.count_events(&count_for(Severity::Low)).await?,
            medium: self
                .store
                .count_events(&count_for(Severity::Medium))
                .await?,
            high: self.store.count_events(&count_for(Severity::High)).await?,
            critical: self
                .store
                .count_events(&count_for(Severity::Critical))
                .await?,
        })
    }
}
