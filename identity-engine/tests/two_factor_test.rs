mod common;

use chrono::{Duration, Utc};
use common::TestEngine;
use identity_engine::config::EngineConfig;
use identity_engine::services::{NotificationCategory, SecurityError};
use identity_engine::store::SecurityStore;

/// Pull the last dispatched code out of the capturing notifier.
fn last_code(t: &TestEngine) -> String {
    t.notifier
        .last_payload(NotificationCategory::SecondFactorCode)
        .expect("no second-factor code dispatched")["code"]
        .as_str()
        .expect("code missing from payload")
        .to_string()
}

#[tokio::test]
async fn test_code_verifies_once_and_only_once() {
    let t = TestEngine::spawn();
    let account = t.create_account("2fa@example.com").await;

    t.engine
        .two_factor
        .generate_and_send_code(account.account_id)
        .await
        .unwrap();
    let code = last_code(&t);
    assert_eq!(code.len(), 6);

    t.engine
        .two_factor
        .verify_code(account.account_id, &code)
        .await
        .unwrap();

    // Second redemption of the same code must fail.
    let result = t.engine.two_factor.verify_code(account.account_id, &code).await;
    assert!(matches!(result, Err(SecurityError::Authentication(_))));
}

#[tokio::test]
async fn test_new_code_invalidates_prior_code() {
    let t = TestEngine::spawn();
    let account = t.create_account("reissue@example.com").await;

    t.engine
        .two_factor
        .generate_and_send_code(account.account_id)
        .await
        .unwrap();
    let first = last_code(&t);

    t.engine
        .two_factor
        .generate_and_send_code(account.account_id)
        .await
        .unwrap();
    let second = last_code(&t);

    // At most one outstanding code: only the newest exists.
    let outstanding = t
        .store
        .unused_codes_for_account(account.account_id)
        .await
        .unwrap();
    assert_eq!(outstanding.len(), 1);

    if first != second {
        let result = t.engine.two_factor.verify_code(account.account_id, &first).await;
        assert!(matches!(result, Err(SecurityError::Authentication(_))));
    }
    t.engine
        .two_factor
        .verify_code(account.account_id, &second)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_expired_code_is_rejected() {
    let t = TestEngine::spawn();
    let account = t.create_account("late@example.com").await;

    t.engine
        .two_factor
        .generate_and_send_code(account.account_id)
        .await
        .unwrap();
    let code = last_code(&t);

    let mut records = t
        .store
        .unused_codes_for_account(account.account_id)
        .await
        .unwrap();
    let mut record = records.pop().unwrap();
    record.expires_at = Utc::now() - Duration::seconds(1);
    t.store.update_two_factor_code(&record).await.unwrap();

    let result = t.engine.two_factor.verify_code(account.account_id, &code).await;
    assert!(matches!(result, Err(SecurityError::Authentication(_))));
}

#[tokio::test]
async fn test_wrong_code_is_rejected() {
    let t = TestEngine::spawn();
    let account = t.create_account("guesser@example.com").await;

    t.engine
        .two_factor
        .generate_and_send_code(account.account_id)
        .await
        .unwrap();
    let code = last_code(&t);
    let wrong = if code == "000000" { "000001" } else { "000000" };

    let result = t.engine.two_factor.verify_code(account.account_id, wrong).await;
    assert!(matches!(result, Err(SecurityError::Authentication(_))));
}

#[tokio::test]
async fn test_disable_invalidates_outstanding_codes() {
    let t = TestEngine::spawn();
    let account = t.create_account("toggler@example.com").await;

    t.engine.two_factor.enable(account.account_id).await.unwrap();
    assert!(t.account(account.account_id).await.two_factor_enabled);

    t.engine
        .two_factor
        .generate_and_send_code(account.account_id)
        .await
        .unwrap();
    let code = last_code(&t);

    t.engine.two_factor.disable(account.account_id).await.unwrap();
    assert!(!t.account(account.account_id).await.two_factor_enabled);

    let result = t.engine.two_factor.verify_code(account.account_id, &code).await;
    assert!(matches!(result, Err(SecurityError::Authentication(_))));
}

#[tokio::test]
async fn test_requirement_follows_org_policy_not_account_toggle() {
    let mut config = EngineConfig::default();
    config.security.two_factor_required = true;
    let t = TestEngine::with_config(config);
    let account = t.create_account("policy@example.com").await;

    // Account has the toggle off; policy still requires it.
    assert!(!t.account(account.account_id).await.two_factor_enabled);
    assert!(t.engine.two_factor.is_required(account.account_id));

    let relaxed = TestEngine::spawn();
    let other = relaxed.create_account("relaxed@example.com").await;
    relaxed.engine.two_factor.enable(other.account_id).await.unwrap();
    assert!(!relaxed.engine.two_factor.is_required(other.account_id));
}

#[tokio::test]
async fn test_delivery_failure_fails_issuance() {
    let t = TestEngine::spawn();
    let account = t.create_account("undeliverable@example.com").await;

    t.notifier.fail_next_sends();
    let result = t
        .engine
        .two_factor
        .generate_and_send_code(account.account_id)
        .await;
    assert!(matches!(result, Err(SecurityError::Internal(_))));
}
