//! Recurring maintenance task owning every cleanup sweep.
//!
//! Lazy expiry at read time is the correctness backstop; this task bounds
//! how long stale records linger. It has an explicit lifecycle
//! (`start`/`stop`), refuses to overlap itself, and exposes `run_once` so
//! tests can drive sweeps deterministically instead of waiting on timers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use crate::services::{
    ActivityTracker, ApiKeyRegistry, CredentialGuard, DeviceRegistry, PasswordResetFlow,
    SecondFactorIssuer,
};
use crate::store::CounterStore;

/// What one sweep accomplished.
#[derive(Debug, Clone, Copy, Default)]
pub struct SweepReport {
    pub idle_accounts_expired: u64,
    pub lockouts_cleared: u64,
    pub reset_tokens_cleared: u64,
    pub expired_codes_removed: u64,
    pub api_keys_deactivated: u64,
    pub devices_deactivated: u64,
    pub counters_purged: u64,
}

struct SweeperInner {
    activity: ActivityTracker,
    credential_guard: CredentialGuard,
    two_factor: SecondFactorIssuer,
    password_reset: PasswordResetFlow,
    api_keys: ApiKeyRegistry,
    devices: DeviceRegistry,
    counters: Arc<dyn CounterStore>,
    interval: std::time::Duration,
    busy: AtomicBool,
    task: Mutex<Option<(watch::Sender<bool>, JoinHandle<()>)>>,
}

#[derive(Clone)]
pub struct MaintenanceSweeper {
    inner: Arc<SweeperInner>,
}

impl MaintenanceSweeper {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        activity: ActivityTracker,
        credential_guard: CredentialGuard,
        two_factor: SecondFactorIssuer,
        password_reset: PasswordResetFlow,
        api_keys: ApiKeyRegistry,
        devices: DeviceRegistry,
        counters: Arc<dyn CounterStore>,
        interval: std::time::Duration,
    ) -> Self {
        Self {
            inner: Arc::new(SweeperInner {
                activity,
                credential_guard,
                two_factor,
                password_reset,
                api_keys,
                devices,
                counters,
                interval,
                busy: AtomicBool::new(false),
                task: Mutex::new(None),
            }),
        }
    }

    /// Run one sweep now. Returns an empty report when a sweep is already
    /// in flight.
    pub async fn run_once(&self) -> SweepReport {
        if self.inner.busy.swap(true, Ordering::SeqCst) {
            tracing::warn!("Maintenance sweep already in progress; skipping");
            return SweepReport::default();
        }
        let report = self.sweep().await;
        self.inner.busy.store(false, Ordering::SeqCst);
        report
    }

    /// Each step fails independently: one broken sweep must not starve the
    /// others.
    async fn sweep(&self) -> SweepReport {
        let mut report = SweepReport::default();

        match self.inner.activity.cleanup_inactive_sessions().await {
            Ok(n) => report.idle_accounts_expired = n,
            Err(e) => tracing::error!(error = %e, "Inactive session sweep failed"),
        }
        match self.inner.credential_guard.cleanup_expired_lockouts().await {
            Ok(n) => report.lockouts_cleared = n,
            Err(e) => tracing::error!(error = %e, "Lockout sweep failed"),
        }
        match self.inner.password_reset.cleanup_expired_tokens().await {
            Ok(n) => report.reset_tokens_cleared = n,
            Err(e) => tracing::error!(error = %e, "Reset token sweep failed"),
        }
        match self.inner.two_factor.cleanup_expired_codes().await {
            Ok(n) => report.expired_codes_removed = n,
            Err(e) => tracing::error!(error = %e, "Second-factor code sweep failed"),
        }
        match self.inner.api_keys.cleanup_expired_keys().await {
            Ok(n) => report.api_keys_deactivated = n,
            Err(e) => tracing::error!(error = %e, "API key sweep failed"),
        }
        match self.inner.devices.cleanup_inactive_devices(None).await {
            Ok(n) => report.devices_deactivated = n,
            Err(e) => tracing::error!(error = %e, "Device sweep failed"),
        }
        match self.inner.counters.purge_expired(Utc::now()).await {
            Ok(n) => report.counters_purged = n,
            Err(e) => tracing::error!(error = %e, "Rate counter purge failed"),
        }

        report
    }

    /// Start the recurring sweep. A second call while running is a no-op.
    pub async fn start(&self) {
        let mut guard = self.inner.task.lock().await;
        if guard.is_some() {
            tracing::warn!("Maintenance sweeper already running");
            return;
        }

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let sweeper = self.clone();
        let interval = self.inner.interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately; consume it so sweeps
            // start one full interval after start().
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    _ = ticker.tick() => {
                        let report = sweeper.run_once().await;
                        tracing::debug!(?report, "Maintenance sweep completed");
                    }
                }
            }
        });

        *guard = Some((shutdown_tx, handle));
        tracing::info!(interval_secs = interval.as_secs(), "Maintenance sweeper started");
    }

    /// Stop the recurring sweep and wait for the task to wind down.
    pub async fn stop(&self) {
        let Some((shutdown_tx, handle)) = self.inner.task.lock().await.take() else {
            return;
        };
        let _ = shutdown_tx.send(true);
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "Maintenance sweeper task panicked");
        }
        tracing::info!("Maintenance sweeper stopped");
    }

    /// Whether a sweep is executing right now.
    pub fn is_running(&self) -> bool {
        self.inner.busy.load(Ordering::SeqCst)
    }
}
