mod common;

use chrono::{Duration, Utc};
use common::TestEngine;
use identity_engine::services::{ApiKeyRegistry, SecurityError};
use identity_engine::store::SecurityStore;
use uuid::Uuid;

fn scopes(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn test_generate_and_validate_key() {
    let t = TestEngine::spawn();
    let account = t.create_account("keys@example.com").await;

    let issued = t
        .engine
        .api_keys
        .generate_key(account.account_id, "ci-pipeline", scopes(&["session:read"]), None)
        .await
        .unwrap();
    assert!(issued.plaintext.starts_with("ie_"));

    // Only the hash is persisted.
    let stored = t.store.find_api_key(issued.key_id).await.unwrap().unwrap();
    assert_ne!(stored.key_hash, issued.plaintext);
    assert!(stored.last_used_at.is_none());

    let validated = t.engine.api_keys.validate_key(&issued.plaintext).await.unwrap();
    assert_eq!(validated.key_id, issued.key_id);
    assert_eq!(validated.account_id, account.account_id);
    assert!(validated.last_used_at.is_some());
}

#[tokio::test]
async fn test_malformed_and_unknown_keys_rejected() {
    let t = TestEngine::spawn();

    let result = t.engine.api_keys.validate_key("sk_wrong_prefix").await;
    assert!(matches!(result, Err(SecurityError::Authentication(_))));

    let result = t.engine.api_keys.validate_key("ie_never_issued").await;
    assert!(matches!(result, Err(SecurityError::Authentication(_))));
}

#[tokio::test]
async fn test_expired_key_deactivated_lazily() {
    let t = TestEngine::spawn();
    let account = t.create_account("expiring@example.com").await;

    let issued = t
        .engine
        .api_keys
        .generate_key(account.account_id, "short-lived", scopes(&["*"]), Some(30))
        .await
        .unwrap();

    let mut stored = t.store.find_api_key(issued.key_id).await.unwrap().unwrap();
    stored.expires_at = Some(Utc::now() - Duration::days(1));
    t.store.update_api_key(&stored).await.unwrap();

    let result = t.engine.api_keys.validate_key(&issued.plaintext).await;
    assert!(matches!(result, Err(SecurityError::Expired("api key"))));

    let stored = t.store.find_api_key(issued.key_id).await.unwrap().unwrap();
    assert!(!stored.is_active);
    assert_eq!(stored.deactivated_reason.as_deref(), Some("expired"));

    // Once deactivated, the failure mode shifts.
    let result = t.engine.api_keys.validate_key(&issued.plaintext).await;
    assert!(matches!(result, Err(SecurityError::Authentication(_))));
}

#[tokio::test]
async fn test_rotation_swaps_secret_under_same_record() {
    let t = TestEngine::spawn();
    let account = t.create_account("rotator@example.com").await;

    let issued = t
        .engine
        .api_keys
        .generate_key(account.account_id, "rotated", scopes(&["device:*"]), None)
        .await
        .unwrap();
    t.engine.api_keys.validate_key(&issued.plaintext).await.unwrap();

    let rotated = t.engine.api_keys.rotate_key(issued.key_id).await.unwrap();
    assert_eq!(rotated.key_id, issued.key_id);
    assert_ne!(rotated.plaintext, issued.plaintext);

    // Old secret dead, new secret live, usage stamp reset.
    let result = t.engine.api_keys.validate_key(&issued.plaintext).await;
    assert!(matches!(result, Err(SecurityError::Authentication(_))));

    let stored = t.store.find_api_key(issued.key_id).await.unwrap().unwrap();
    assert!(stored.last_used_at.is_none());
    t.engine.api_keys.validate_key(&rotated.plaintext).await.unwrap();
}

#[tokio::test]
async fn test_rotate_unknown_key_fails_loudly() {
    let t = TestEngine::spawn();
    let result = t.engine.api_keys.rotate_key(Uuid::new_v4()).await;
    assert!(matches!(result, Err(SecurityError::NotFound("api key"))));
}

#[tokio::test]
async fn test_deactivated_key_rejected() {
    let t = TestEngine::spawn();
    let account = t.create_account("revoked@example.com").await;

    let issued = t
        .engine
        .api_keys
        .generate_key(account.account_id, "doomed", scopes(&["*"]), None)
        .await
        .unwrap();

    t.engine
        .api_keys
        .deactivate_key(issued.key_id, "credential leak drill")
        .await
        .unwrap();

    let result = t.engine.api_keys.validate_key(&issued.plaintext).await;
    assert!(matches!(result, Err(SecurityError::Authentication(_))));
}

#[tokio::test]
async fn test_cleanup_deactivates_expired_keys() {
    let t = TestEngine::spawn();
    let account = t.create_account("sweeper@example.com").await;

    let expired = t
        .engine
        .api_keys
        .generate_key(account.account_id, "old", scopes(&["*"]), Some(1))
        .await
        .unwrap();
    let fresh = t
        .engine
        .api_keys
        .generate_key(account.account_id, "new", scopes(&["*"]), Some(30))
        .await
        .unwrap();

    let mut stored = t.store.find_api_key(expired.key_id).await.unwrap().unwrap();
    stored.expires_at = Some(Utc::now() - Duration::days(1));
    t.store.update_api_key(&stored).await.unwrap();

    let deactivated = t.engine.api_keys.cleanup_expired_keys().await.unwrap();
    assert_eq!(deactivated, 1);

    assert!(!t.store.find_api_key(expired.key_id).await.unwrap().unwrap().is_active);
    assert!(t.store.find_api_key(fresh.key_id).await.unwrap().unwrap().is_active);
}

#[tokio::test]
async fn test_generate_rejects_invalid_scopes() {
    let t = TestEngine::spawn();
    let account = t.create_account("scopes@example.com").await;

    let result = t
        .engine
        .api_keys
        .generate_key(account.account_id, "bad", scopes(&["everything"]), None)
        .await;
    assert!(matches!(result, Err(SecurityError::Validation(_))));

    let result = t
        .engine
        .api_keys
        .generate_key(Uuid::new_v4(), "orphan", scopes(&["*"]), None)
        .await;
    assert!(matches!(result, Err(SecurityError::NotFound("account"))));
}

#[tokio::test]
async fn test_scope_checks() {
    assert!(ApiKeyRegistry::has_scope(&scopes(&["*"]), "session:read"));
    assert!(ApiKeyRegistry::has_scope(
        &scopes(&["session:read", "event:read"]),
        "event:read"
    ));
    assert!(!ApiKeyRegistry::has_scope(
        &scopes(&["session:read"]),
        "session:write"
    ));
}
