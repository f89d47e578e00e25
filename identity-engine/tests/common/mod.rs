//! Test helper module for identity-engine integration tests.
//!
//! Builds the engine over the in-memory stores and a capturing notifier.

#![allow(dead_code)]

use std::sync::Arc;

use identity_engine::config::EngineConfig;
use identity_engine::models::Account;
use identity_engine::services::{ClientInfo, MockNotifier};
use identity_engine::store::{InMemoryCounters, InMemoryStore, SecurityStore};
use identity_engine::utils::{hash_password, Password};
use identity_engine::SecurityEngine;
use uuid::Uuid;

/// Password every test account starts with.
pub const TEST_PASSWORD: &str = "CorrectHorse9!";

pub const TEST_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

/// Assembled engine plus direct handles on its seams for assertions.
pub struct TestEngine {
    pub engine: SecurityEngine,
    pub store: Arc<InMemoryStore>,
    pub notifier: Arc<MockNotifier>,
}

impl TestEngine {
    pub fn spawn() -> Self {
        dotenvy::dotenv().ok();
        let mut config = EngineConfig::default();
        config.log_level = "error".to_string();
        Self::with_config(config)
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let notifier = Arc::new(MockNotifier::new());
        let counters = Arc::new(InMemoryCounters::new());
        let engine = SecurityEngine::new(config, store.clone(), counters, notifier.clone());
        Self {
            engine,
            store,
            notifier,
        }
    }

    /// Insert an account with the standard test password.
    pub async fn create_account(&self, email: &str) -> Account {
        let hash = hash_password(&Password::new(TEST_PASSWORD.to_string()))
            .expect("Failed to hash test password");
        let account = Account::new(Uuid::new_v4(), email.to_string(), hash.into_string());
        self.store
            .insert_account(account.clone())
            .await
            .expect("Failed to insert test account");
        account
    }

    /// Fetch the current state of an account.
    pub async fn account(&self, account_id: Uuid) -> Account {
        self.store
            .find_account(account_id)
            .await
            .expect("store error")
            .expect("account missing")
    }
}

pub fn client_from(ip: &str) -> ClientInfo {
    ClientInfo {
        ip_address: ip.to_string(),
        user_agent: TEST_USER_AGENT.to_string(),
        device_id: None,
    }
}
