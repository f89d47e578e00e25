//! In-memory reference implementations of the store contracts.
//!
//! Backed by `DashMap`, whose per-entry locking supplies the per-key
//! atomicity the contracts require. Suitable for single-instance
//! deployments and tests; a clustered deployment swaps in implementations
//! over a shared database.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use super::{CounterStore, EventFilter, SecurityStore};
use crate::models::{
    Account, ApiKey, Device, RateLimitCounter, SecurityEvent, SecurityEventType, Session,
    TerminationReason, TwoFactorCode,
};

/// In-memory `SecurityStore`.
#[derive(Default)]
pub struct InMemoryStore {
    accounts: DashMap<Uuid, Account>,
    accounts_by_email: DashMap<String, Uuid>,
    sessions: DashMap<String, Session>,
    devices: DashMap<String, Device>,
    codes: DashMap<Uuid, TwoFactorCode>,
    api_keys: DashMap<Uuid, ApiKey>,
    api_keys_by_hash: DashMap<String, Uuid>,
    // Append-only ledger; a Vec keeps arrival order for "prior event" queries.
    events: Mutex<Vec<SecurityEvent>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn events_locked(&self) -> std::sync::MutexGuard<'_, Vec<SecurityEvent>> {
        // A poisoned mutex means a writer panicked mid-append; the ledger
        // itself is still usable.
        self.events.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl SecurityStore for InMemoryStore {
    async fn insert_account(&self, account: Account) -> Result<(), anyhow::Error> {
        if self.accounts_by_email.contains_key(&account.email) {
            return Err(anyhow::anyhow!("email already registered"));
        }
        self.accounts_by_email
            .insert(account.email.clone(), account.account_id);
        self.accounts.insert(account.account_id, account);
        Ok(())
    }

    async fn find_account(&self, account_id: Uuid) -> Result<Option<Account>, anyhow::Error> {
        Ok(self.accounts.get(&account_id).map(|a| a.clone()))
    }

    async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>, anyhow::Error> {
        let email = email.to_lowercase();
        let Some(id) = self.accounts_by_email.get(&email).map(|e| *e) else {
            return Ok(None);
        };
        Ok(self.accounts.get(&id).map(|a| a.clone()))
    }

    async fn find_account_by_reset_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<Account>, anyhow::Error> {
        Ok(self
            .accounts
            .iter()
            .find(|a| {
                a.reset_token
                    .as_ref()
                    .is_some_and(|t| t.token_hash == token_hash)
            })
            .map(|a| a.clone()))
    }

    async fn update_account(&self, account: &Account) -> Result<(), anyhow::Error> {
        match self.accounts.get_mut(&account.account_id) {
            Some(mut entry) => {
                *entry = account.clone();
                Ok(())
            }
            None => Err(anyhow::anyhow!("account {} not found", account.account_id)),
        }
    }

    async fn increment_failed_logins(&self, account_id: Uuid) -> Result<u32, anyhow::Error> {
        // get_mut holds the shard lock for the duration of the update, so
        // concurrent increments serialize instead of racing.
        match self.accounts.get_mut(&account_id) {
            Some(mut entry) => {
                entry.failed_login_attempts += 1;
                Ok(entry.failed_login_attempts)
            }
            None => Err(anyhow::anyhow!("account {} not found", account_id)),
        }
    }

    async fn clear_expired_lockouts(&self, now: DateTime<Utc>) -> Result<u64, anyhow::Error> {
        let mut cleared = 0;
        for mut account in self.accounts.iter_mut() {
            if account.lock_expired(now) {
                account.locked_until = None;
                account.failed_login_attempts = 0;
                cleared += 1;
            }
        }
        Ok(cleared)
    }

    async fn clear_expired_reset_tokens(&self, now: DateTime<Utc>) -> Result<u64, anyhow::Error> {
        let mut cleared = 0;
        for mut account in self.accounts.iter_mut() {
            if account
                .reset_token
                .as_ref()
                .is_some_and(|t| t.is_expired(now))
            {
                account.reset_token = None;
                cleared += 1;
            }
        }
        Ok(cleared)
    }

    async fn online_accounts_idle_since(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Account>, anyhow::Error> {
        Ok(self
            .accounts
            .iter()
            .filter(|a| a.is_online && a.last_active_at.is_some_and(|at| at < cutoff))
            .map(|a| a.clone())
            .collect())
    }

    async fn count_accounts(&self) -> Result<u64, anyhow::Error> {
        Ok(self.accounts.len() as u64)
    }

    async fn count_two_factor_accounts(&self) -> Result<u64, anyhow::Error> {
        Ok(self.accounts.iter().filter(|a| a.two_factor_enabled).count() as u64)
    }

    async fn count_locked_accounts(&self, now: DateTime<Utc>) -> Result<u64, anyhow::Error> {
        Ok(self.accounts.iter().filter(|a| a.is_locked(now)).count() as u64)
    }

    async fn insert_session(&self, session: Session) -> Result<(), anyhow::Error> {
        if self.sessions.contains_key(&session.token) {
            return Err(anyhow::anyhow!("session token collision"));
        }
        self.sessions.insert(session.token.clone(), session);
        Ok(())
    }

    async fn find_session(&self, token: &str) -> Result<Option<Session>, anyhow::Error> {
        Ok(self.sessions.get(token).map(|s| s.clone()))
    }

    async fn update_session(&self, session: &Session) -> Result<(), anyhow::Error> {
        match self.sessions.get_mut(&session.token) {
            Some(mut entry) => {
                *entry = session.clone();
                Ok(())
            }
            None => Err(anyhow::anyhow!("session not found")),
        }
    }

    async fn active_sessions_for_account(
        &self,
        account_id: Uuid,
    ) -> Result<Vec<Session>, anyhow::Error> {
        Ok(self
            .sessions
            .iter()
            .filter(|s| s.account_id == account_id && s.is_active)
            .map(|s| s.clone())
            .collect())
    }

    async fn terminate_sessions_for_account(
        &self,
        account_id: Uuid,
        reason: TerminationReason,
        now: DateTime<Utc>,
    ) -> Result<u64, anyhow::Error> {
        let mut terminated = 0;
        for mut session in self.sessions.iter_mut() {
            if session.account_id == account_id && session.is_active {
                session.terminate(reason, now);
                terminated += 1;
            }
        }
        Ok(terminated)
    }

    async fn terminate_sessions_for_device(
        &self,
        device_id: &str,
        reason: TerminationReason,
        now: DateTime<Utc>,
    ) -> Result<u64, anyhow::Error> {
        let mut terminated = 0;
        for mut session in self.sessions.iter_mut() {
            if session.device_id.as_deref() == Some(device_id) && session.is_active {
                session.terminate(reason, now);
                terminated += 1;
            }
        }
        Ok(terminated)
    }

    async fn insert_device(&self, device: Device) -> Result<(), anyhow::Error> {
        self.devices.insert(device.device_id.clone(), device);
        Ok(())
    }

    async fn find_device(&self, device_id: &str) -> Result<Option<Device>, anyhow::Error> {
        Ok(self.devices.get(device_id).map(|d| d.clone()))
    }

    async fn update_device(&self, device: &Device) -> Result<(), anyhow::Error> {
        match self.devices.get_mut(&device.device_id) {
            Some(mut entry) => {
                *entry = device.clone();
                Ok(())
            }
            None => Err(anyhow::anyhow!("device not found")),
        }
    }

    async fn delete_device(&self, device_id: &str) -> Result<bool, anyhow::Error> {
        Ok(self.devices.remove(device_id).is_some())
    }

    async fn devices_for_account(&self, account_id: Uuid) -> Result<Vec<Device>, anyhow::Error> {
        Ok(self
            .devices
            .iter()
            .filter(|d| d.account_id == account_id)
            .map(|d| d.clone())
            .collect())
    }

    async fn active_devices_unseen_since(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Device>, anyhow::Error> {
        Ok(self
            .devices
            .iter()
            .filter(|d| d.is_active && d.last_active_at < cutoff)
            .map(|d| d.clone())
            .collect())
    }

    async fn insert_two_factor_code(&self, code: TwoFactorCode) -> Result<(), anyhow::Error> {
        self.codes.insert(code.code_id, code);
        Ok(())
    }

    async fn unused_codes_for_account(
        &self,
        account_id: Uuid,
    ) -> Result<Vec<TwoFactorCode>, anyhow::Error> {
        Ok(self
            .codes
            .iter()
            .filter(|c| c.account_id == account_id && !c.is_used())
            .map(|c| c.clone())
            .collect())
    }

    async fn update_two_factor_code(&self, code: &TwoFactorCode) -> Result<(), anyhow::Error> {
        match self.codes.get_mut(&code.code_id) {
            Some(mut entry) => {
                *entry = code.clone();
                Ok(())
            }
            None => Err(anyhow::anyhow!("second-factor code not found")),
        }
    }

    async fn delete_unused_codes_for_account(
        &self,
        account_id: Uuid,
    ) -> Result<u64, anyhow::Error> {
        let before = self.codes.len();
        self.codes
            .retain(|_, c| !(c.account_id == account_id && !c.is_used()));
        Ok(before.saturating_sub(self.codes.len()) as u64)
    }

    async fn delete_expired_codes(&self, now: DateTime<Utc>) -> Result<u64, anyhow::Error> {
        let before = self.codes.len();
        self.codes.retain(|_, c| !c.is_expired(now));
        Ok(before.saturating_sub(self.codes.len()) as u64)
    }

    async fn insert_api_key(&self, key: ApiKey) -> Result<(), anyhow::Error> {
        if self.api_keys_by_hash.contains_key(&key.key_hash) {
            return Err(anyhow::anyhow!("api key hash collision"));
        }
        self.api_keys_by_hash.insert(key.key_hash.clone(), key.key_id);
        self.api_keys.insert(key.key_id, key);
        Ok(())
    }

    async fn find_api_key(&self, key_id: Uuid) -> Result<Option<ApiKey>, anyhow::Error> {
        Ok(self.api_keys.get(&key_id).map(|k| k.clone()))
    }

    async fn find_api_key_by_hash(
        &self,
        key_hash: &str,
    ) -> Result<Option<ApiKey>, anyhow::Error> {
        let Some(id) = self.api_keys_by_hash.get(key_hash).map(|e| *e) else {
            return Ok(None);
        };
        Ok(self.api_keys.get(&id).map(|k| k.clone()))
    }

    async fn update_api_key(&self, key: &ApiKey) -> Result<(), anyhow::Error> {
        match self.api_keys.get_mut(&key.key_id) {
            Some(mut entry) => {
                if entry.key_hash != key.key_hash {
                    // Rotation: reindex the hash lookup.
                    self.api_keys_by_hash.remove(&entry.key_hash);
                    self.api_keys_by_hash
                        .insert(key.key_hash.clone(), key.key_id);
                }
                *entry = key.clone();
                Ok(())
            }
            None => Err(anyhow::anyhow!("api key {} not found", key.key_id)),
        }
    }

    async fn expired_active_api_keys(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<ApiKey>, anyhow::Error> {
        Ok(self
            .api_keys
            .iter()
            .filter(|k| k.is_active && k.is_expired(now))
            .map(|k| k.clone())
            .collect())
    }

    async fn count_active_api_keys(&self) -> Result<u64, anyhow::Error> {
        Ok(self.api_keys.iter().filter(|k| k.is_active).count() as u64)
    }

    async fn count_api_keys_used_since(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, anyhow::Error> {
        Ok(self
            .api_keys
            .iter()
            .filter(|k| k.last_used_at.is_some_and(|at| at >= cutoff))
            .count() as u64)
    }

    async fn append_event(&self, event: SecurityEvent) -> Result<(), anyhow::Error> {
        self.events_locked().push(event);
        Ok(())
    }

    async fn find_event(&self, event_id: Uuid) -> Result<Option<SecurityEvent>, anyhow::Error> {
        Ok(self
            .events_locked()
            .iter()
            .find(|e| e.event_id == event_id)
            .cloned())
    }

    async fn update_event(&self, event: &SecurityEvent) -> Result<(), anyhow::Error> {
        let mut events = self.events_locked();
        match events.iter_mut().find(|e| e.event_id == event.event_id) {
            Some(entry) => {
                *entry = event.clone();
                Ok(())
            }
            None => Err(anyhow::anyhow!("event {} not found", event.event_id)),
        }
    }

    async fn count_events(&self, filter: &EventFilter) -> Result<u64, anyhow::Error> {
        Ok(self
            .events_locked()
            .iter()
            .filter(|e| filter.matches(e))
            .count() as u64)
    }

    async fn recent_events(
        &self,
        account_id: Uuid,
        event_type: SecurityEventType,
        limit: usize,
    ) -> Result<Vec<SecurityEvent>, anyhow::Error> {
        Ok(self
            .events_locked()
            .iter()
            .rev()
            .filter(|e| e.account_id == Some(account_id) && e.event_type == event_type)
            .take(limit)
            .cloned()
            .collect())
    }
}

/// In-memory `CounterStore`.
#[derive(Default)]
pub struct InMemoryCounters {
    counters: DashMap<String, RateLimitCounter>,
}

impl InMemoryCounters {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CounterStore for InMemoryCounters {
    async fn hit(
        &self,
        identifier: &str,
        window: Duration,
        max_requests: u32,
        now: DateTime<Utc>,
    ) -> Result<RateLimitCounter, anyhow::Error> {
        // The entry API holds the shard lock across the whole
        // read-modify-write, so parallel hits on one identifier serialize.
        let mut entry = self
            .counters
            .entry(identifier.to_string())
            .or_insert_with(|| RateLimitCounter {
                identifier: identifier.to_string(),
                count: 0,
                window_reset_at: now + window,
            });

        if now >= entry.window_reset_at {
            entry.count = 1;
            entry.window_reset_at = now + window;
        } else if entry.count <= max_requests {
            entry.count += 1;
        }
        // Past max_requests the counter is saturated and stops moving.

        Ok(entry.clone())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, anyhow::Error> {
        let before = self.counters.len();
        self.counters.retain(|_, c| c.window_reset_at > now);
        Ok(before.saturating_sub(self.counters.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_increment_failed_logins_is_per_account() {
        let store = InMemoryStore::new();
        let account = Account::new(Uuid::new_v4(), "a@b.c".into(), "h".into());
        let id = account.account_id;
        store.insert_account(account).await.unwrap();

        assert_eq!(store.increment_failed_logins(id).await.unwrap(), 1);
        assert_eq!(store.increment_failed_logins(id).await.unwrap(), 2);
        assert!(store
            .increment_failed_logins(Uuid::new_v4())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_concurrent_failed_login_increments_do_not_lose_updates() {
        let store = std::sync::Arc::new(InMemoryStore::new());
        let account = Account::new(Uuid::new_v4(), "race@b.c".into(), "h".into());
        let id = account.account_id;
        store.insert_account(account).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..50 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.increment_failed_logins(id).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let account = store.find_account(id).await.unwrap().unwrap();
        assert_eq!(account.failed_login_attempts, 50);
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let store = InMemoryStore::new();
        let org = Uuid::new_v4();
        store
            .insert_account(Account::new(org, "dup@b.c".into(), "h".into()))
            .await
            .unwrap();
        assert!(store
            .insert_account(Account::new(org, "dup@b.c".into(), "h".into()))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_counter_window_reset() {
        let counters = InMemoryCounters::new();
        let now = Utc::now();
        let window = Duration::milliseconds(100);

        let c = counters.hit("login:1.2.3.4", window, 3, now).await.unwrap();
        assert_eq!(c.count, 1);

        let later = now + Duration::milliseconds(150);
        let c = counters
            .hit("login:1.2.3.4", window, 3, later)
            .await
            .unwrap();
        assert_eq!(c.count, 1, "elapsed window must reset wholesale");
    }

    #[tokio::test]
    async fn test_counter_saturates_past_max() {
        let counters = InMemoryCounters::new();
        let now = Utc::now();
        let window = Duration::minutes(1);

        for _ in 0..10 {
            counters.hit("api:k", window, 3, now).await.unwrap();
        }
        let c = counters.hit("api:k", window, 3, now).await.unwrap();
        assert_eq!(c.count, 4, "counter stops incrementing once past max");
    }

    #[tokio::test]
    async fn test_rotation_reindexes_hash_lookup() {
        let store = InMemoryStore::new();
        let mut key = ApiKey::new(Uuid::new_v4(), "ci".into(), "old-hash".into(), vec![], None);
        store.insert_api_key(key.clone()).await.unwrap();

        key.key_hash = "new-hash".into();
        store.update_api_key(&key).await.unwrap();

        assert!(store
            .find_api_key_by_hash("old-hash")
            .await
            .unwrap()
            .is_none());
        assert!(store
            .find_api_key_by_hash("new-hash")
            .await
            .unwrap()
            .is_some());
    }
}
