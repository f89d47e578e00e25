mod common;

use chrono::Duration;
use common::TestEngine;
use identity_engine::config::EngineConfig;
use identity_engine::models::SecurityEventType;
use identity_engine::services::{SecurityError, SsoIdentity};
use identity_engine::store::{EventFilter, SecurityStore};

fn identity(email: &str) -> SsoIdentity {
    SsoIdentity {
        email: email.to_string(),
        provider: "okta".to_string(),
        ip_address: Some("203.0.113.9".to_string()),
        user_agent: None,
    }
}

fn restricted_engine(domain: &str) -> TestEngine {
    let mut config = EngineConfig::default();
    config.security.sso_allowed_domain = Some(domain.to_string());
    TestEngine::with_config(config)
}

#[tokio::test]
async fn test_success_updates_last_login_and_logs() {
    let t = TestEngine::spawn();
    let account = t.create_account("federated@example.com").await;
    assert!(account.last_login_at.is_none());

    let matched = t
        .engine
        .sso
        .handle_login_success(&identity("federated@example.com"))
        .await
        .unwrap()
        .expect("existing account should match");
    assert_eq!(matched.account_id, account.account_id);

    assert!(t.account(account.account_id).await.last_login_at.is_some());

    for event_type in [SecurityEventType::SsoLogin, SecurityEventType::LoginSuccess] {
        let count = t
            .store
            .count_events(&EventFilter::of_type(event_type).for_account(account.account_id))
            .await
            .unwrap();
        assert_eq!(count, 1, "expected one {:?} event", event_type);
    }
}

#[tokio::test]
async fn test_unmatched_identity_is_recorded_not_provisioned() {
    let t = TestEngine::spawn();

    let matched = t
        .engine
        .sso
        .handle_login_success(&identity("nobody@example.com"))
        .await
        .unwrap();
    assert!(matched.is_none());

    let failures = t
        .store
        .count_events(&EventFilter::of_type(SecurityEventType::SsoLoginFailed))
        .await
        .unwrap();
    assert_eq!(failures, 1);
}

#[tokio::test]
async fn test_domain_restriction_blocks_foreign_identities() {
    let t = restricted_engine("example.com");
    t.create_account("insider@example.com").await;

    assert!(t
        .engine
        .sso
        .handle_login_success(&identity("insider@example.com"))
        .await
        .unwrap()
        .is_some());

    let result = t
        .engine
        .sso
        .handle_login_success(&identity("outsider@rival.io"))
        .await;
    assert!(matches!(result, Err(SecurityError::Validation(_))));
}

#[tokio::test]
async fn test_provider_failure_is_logged_with_reason() {
    let t = TestEngine::spawn();
    let account = t.create_account("denied@example.com").await;

    t.engine
        .sso
        .handle_login_failure(&identity("denied@example.com"), "mfa_declined")
        .await
        .unwrap();

    let failures = t
        .store
        .count_events(
            &EventFilter::of_type(SecurityEventType::SsoLoginFailed)
                .for_account(account.account_id),
        )
        .await
        .unwrap();
    assert_eq!(failures, 1);
}

#[tokio::test]
async fn test_sso_success_rate_statistic() {
    let t = TestEngine::spawn();
    t.create_account("counted@example.com").await;

    for _ in 0..3 {
        t.engine
            .sso
            .handle_login_success(&identity("counted@example.com"))
            .await
            .unwrap();
    }
    t.engine
        .sso
        .handle_login_failure(&identity("counted@example.com"), "expired_assertion")
        .await
        .unwrap();

    let stats = t
        .engine
        .stats
        .sso_success_rate(Duration::hours(1))
        .await
        .unwrap();
    assert_eq!(stats.successes, 3);
    assert_eq!(stats.failures, 1);
    assert!((stats.success_rate - 0.75).abs() < f64::EPSILON);
}
