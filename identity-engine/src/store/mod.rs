//! Store contracts for the engine's external collaborators.
//!
//! The persistent data store itself lives outside the engine; what the
//! engine owns is the contract. `SecurityStore` covers the durable entities
//! (accounts, sessions, devices, codes, keys, events) and `CounterStore`
//! covers the ephemeral rate-limit counters, which a multi-instance
//! deployment must back with a shared, atomically-updatable store to keep
//! the limiting guarantee. The in-memory implementations in [`memory`] are
//! the single-instance reference.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::models::{
    Account, ApiKey, Device, RateLimitCounter, SecurityEvent, SecurityEventType, Session, Severity,
    TerminationReason, TwoFactorCode,
};

mod memory;

pub use memory::{InMemoryCounters, InMemoryStore};

/// Filter for event counts and time-range queries.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub account_id: Option<Uuid>,
    pub event_type: Option<SecurityEventType>,
    pub severity: Option<Severity>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub unresolved_only: bool,
}

impl EventFilter {
    pub fn of_type(event_type: SecurityEventType) -> Self {
        Self {
            event_type: Some(event_type),
            ..Self::default()
        }
    }

    pub fn for_account(mut self, account_id: Uuid) -> Self {
        self.account_id = Some(account_id);
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn matches(&self, event: &SecurityEvent) -> bool {
        if let Some(account_id) = self.account_id {
            if event.account_id != Some(account_id) {
                return false;
            }
        }
        if let Some(event_type) = self.event_type {
            if event.event_type != event_type {
                return false;
            }
        }
        if let Some(severity) = self.severity {
            if event.severity != severity {
                return false;
            }
        }
        if let Some(since) = self.since {
            if event.created_at < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if event.created_at >= until {
                return false;
            }
        }
        if self.unresolved_only && event.is_resolved {
            return false;
        }
        true
    }
}

/// Contract for the durable security entities.
///
/// Mutations to the failed-login counter go through
/// [`increment_failed_logins`](SecurityStore::increment_failed_logins),
/// which the implementation must make atomic/serializable against
/// concurrent attempts on the same account: a read-modify-write race here
/// would under-count and silently bypass lockout. Everything else is
/// per-entity, where last-write-wins on activity stamps is acceptable.
#[async_trait]
pub trait SecurityStore: Send + Sync {
    // --- accounts ---

    async fn insert_account(&self, account: Account) -> Result<(), anyhow::Error>;
    async fn find_account(&self, account_id: Uuid) -> Result<Option<Account>, anyhow::Error>;
    async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>, anyhow::Error>;
    async fn find_account_by_reset_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<Account>, anyhow::Error>;
    async fn update_account(&self, account: &Account) -> Result<(), anyhow::Error>;

    /// Atomic increment of the failed-login counter; returns the new count.
    async fn increment_failed_logins(&self, account_id: Uuid) -> Result<u32, anyhow::Error>;

    /// Clear lock state on every account whose window has elapsed.
    async fn clear_expired_lockouts(&self, now: DateTime<Utc>) -> Result<u64, anyhow::Error>;

    /// Drop reset tokens past their deadline.
    async fn clear_expired_reset_tokens(&self, now: DateTime<Utc>) -> Result<u64, anyhow::Error>;

    /// Online accounts whose last activity predates `cutoff`.
    async fn online_accounts_idle_since(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Account>, anyhow::Error>;

    async fn count_accounts(&self) -> Result<u64, anyhow::Error>;
    async fn count_two_factor_accounts(&self) -> Result<u64, anyhow::Error>;
    async fn count_locked_accounts(&self, now: DateTime<Utc>) -> Result<u64, anyhow::Error>;

    // --- sessions ---

    async fn insert_session(&self, session: Session) -> Result<(), anyhow::Error>;
    async fn find_session(&self, token: &str) -> Result<Option<Session>, anyhow::Error>;
    async fn update_session(&self, session: &Session) -> Result<(), anyhow::Error>;
    async fn active_sessions_for_account(
        &self,
        account_id: Uuid,
    ) -> Result<Vec<Session>, anyhow::Error>;

    /// Bulk-terminate every active session for the account; returns how many.
    async fn terminate_sessions_for_account(
        &self,
        account_id: Uuid,
        reason: TerminationReason,
        now: DateTime<Utc>,
    ) -> Result<u64, anyhow::Error>;

    /// Bulk-terminate every active session bound to the device.
    async fn terminate_sessions_for_device(
        &self,
        device_id: &str,
        reason: TerminationReason,
        now: DateTime<Utc>,
    ) -> Result<u64, anyhow::Error>;

    // --- devices ---

    async fn insert_device(&self, device: Device) -> Result<(), anyhow::Error>;
    async fn find_device(&self, device_id: &str) -> Result<Option<Device>, anyhow::Error>;
    async fn update_device(&self, device: &Device) -> Result<(), anyhow::Error>;
    async fn delete_device(&self, device_id: &str) -> Result<bool, anyhow::Error>;
    async fn devices_for_account(&self, account_id: Uuid) -> Result<Vec<Device>, anyhow::Error>;
    async fn active_devices_unseen_since(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Device>, anyhow::Error>;

    // --- second-factor codes ---

    async fn insert_two_factor_code(&self, code: TwoFactorCode) -> Result<(), anyhow::Error>;
    async fn unused_codes_for_account(
        &self,
        account_id: Uuid,
    ) -> Result<Vec<TwoFactorCode>, anyhow::Error>;
    async fn update_two_factor_code(&self, code: &TwoFactorCode) -> Result<(), anyhow::Error>;
    async fn delete_unused_codes_for_account(&self, account_id: Uuid)
        -> Result<u64, anyhow::Error>;
    async fn delete_expired_codes(&self, now: DateTime<Utc>) -> Result<u64, anyhow::Error>;

    // --- api keys ---

    async fn insert_api_key(&self, key: ApiKey) -> Result<(), anyhow::Error>;
    async fn find_api_key(&self, key_id: Uuid) -> Result<Option<ApiKey>, anyhow::Error>;
    async fn find_api_key_by_hash(&self, key_hash: &str)
        -> Result<Option<ApiKey>, anyhow::Error>;
    async fn update_api_key(&self, key: &ApiKey) -> Result<(), anyhow::Error>;
    async fn expired_active_api_keys(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<ApiKey>, anyhow::Error>;
    async fn count_active_api_keys(&self) -> Result<u64, anyhow::Error>;
    async fn count_api_keys_used_since(&self, cutoff: DateTime<Utc>)
        -> Result<u64, anyhow::Error>;

    // --- security events ---

    async fn append_event(&self, event: SecurityEvent) -> Result<(), anyhow::Error>;
    async fn find_event(&self, event_id: Uuid) -> Result<Option<SecurityEvent>, anyhow::Error>;
    async fn update_event(&self, event: &SecurityEvent) -> Result<(), anyhow::Error>;
    async fn count_events(&self, filter: &EventFilter) -> Result<u64, anyhow::Error>;

    /// Newest-first events of one type for an account.
    async fn recent_events(
        &self,
        account_id: Uuid,
        event_type: SecurityEventType,
        limit: usize,
    ) -> Result<Vec<SecurityEvent>, anyhow::Error>;
}

/// Contract for the rate-limit counter store.
///
/// Process-local by default; a deployment with more than one instance must
/// substitute an implementation over a shared store, otherwise each instance
/// enforces an independent, weaker limit.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Atomically hit the identifier's fixed-window counter.
    ///
    /// Opens a fresh window (`count = 1`) when none exists or the previous
    /// one has elapsed. Once `count` has passed `max_requests` the counter
    /// stops incrementing; the saturated counter is returned unchanged so
    /// the decision layer reports zero remaining.
    async fn hit(
        &self,
        identifier: &str,
        window: Duration,
        max_requests: u32,
        now: DateTime<Utc>,
    ) -> Result<RateLimitCounter, anyhow::Error>;

    /// Drop counters whose window has elapsed; returns how many.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, anyhow::Error>;
}
