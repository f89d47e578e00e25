//! Identity and session security engine.
//!
//! Decides, for every authentication-adjacent action, whether an actor may
//! proceed; tracks the risk state of accounts and devices; and issues and
//! validates the short-lived secrets (session tokens, second-factor codes,
//! reset tokens, API keys) that gate access. The persistent store,
//! notification delivery, and identity-provider protocol are external
//! collaborators injected behind traits.

pub mod config;
pub mod models;
pub mod observability;
pub mod services;
pub mod store;
pub mod sweeper;
pub mod utils;

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::services::{
    ActivityTracker, ApiKeyRegistry, CredentialGuard, DeviceRegistry, LogNotifier, Notifier,
    PasswordResetFlow, RateLimiter, SecondFactorIssuer, SecurityEventLog, SecurityStats,
    SessionRegistry, SsoCorrelator,
};
use crate::store::{CounterStore, InMemoryCounters, InMemoryStore, SecurityStore};
use crate::sweeper::MaintenanceSweeper;

/// The assembled engine: every component wired over the shared store,
/// event log, and notifier seams.
#[derive(Clone)]
pub struct SecurityEngine {
    pub config: EngineConfig,
    pub events: SecurityEventLog,
    pub rate_limiter: RateLimiter,
    pub credential_guard: CredentialGuard,
    pub sessions: SessionRegistry,
    pub activity: ActivityTracker,
    pub devices: DeviceRegistry,
    pub two_factor: SecondFactorIssuer,
    pub api_keys: ApiKeyRegistry,
    pub password_reset: PasswordResetFlow,
    pub sso: SsoCorrelator,
    pub stats: SecurityStats,
    store: Arc<dyn SecurityStore>,
    counters: Arc<dyn CounterStore>,
}

impl SecurityEngine {
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn SecurityStore>,
        counters: Arc<dyn CounterStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let events = SecurityEventLog::new(store.clone());
        let security = config.security.clone();
        let passwords = config.password_policy.clone();

        Self {
            events: events.clone(),
            rate_limiter: RateLimiter::new(counters.clone(), events.clone()),
            credential_guard: CredentialGuard::new(
                store.clone(),
                events.clone(),
                notifier.clone(),
                security.clone(),
            ),
            sessions: SessionRegistry::new(store.clone(), events.clone(), security.clone()),
            activity: ActivityTracker::new(store.clone(), events.clone(), security.clone()),
            devices: DeviceRegistry::new(store.clone(), events.clone(), security.clone()),
            two_factor: SecondFactorIssuer::new(
                store.clone(),
                events.clone(),
                notifier.clone(),
                security.clone(),
            ),
            api_keys: ApiKeyRegistry::new(store.clone(), events.clone()),
            password_reset: PasswordResetFlow::new(
                store.clone(),
                events.clone(),
                notifier,
                security,
                passwords,
            ),
            sso: SsoCorrelator::new(store.clone(), events, config.security.clone()),
            stats: SecurityStats::new(store.clone()),
            store,
            counters,
            config,
        }
    }

    /// Engine over the in-memory stores and a logging notifier: the
    /// single-instance wiring.
    pub fn in_memory(config: EngineConfig) -> Self {
        Self::new(
            config,
            Arc::new(InMemoryStore::new()),
            Arc::new(InMemoryCounters::new()),
            Arc::new(LogNotifier),
        )
    }

    /// The injected persistent store, for callers that own entity CRUD.
    pub fn store(&self) -> &Arc<dyn SecurityStore> {
        &self.store
    }

    /// Build the recurring maintenance task for this engine.
    pub fn sweeper(&self) -> MaintenanceSweeper {
        MaintenanceSweeper::new(
            self.activity.clone(),
            self.credential_guard.clone(),
            self.two_factor.clone(),
            self.password_reset.clone(),
            self.api_keys.clone(),
            self.devices.clone(),
            self.counters.clone(),
            std::time::Duration::from_secs(self.config.sweep_interval_seconds),
        )
    }
}
