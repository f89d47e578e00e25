mod common;

use chrono::{Duration, Utc};
use common::{client_from, TestEngine};
use identity_engine::models::{SecurityEventType, Severity, TerminationReason};
use identity_engine::services::NotificationCategory;
use identity_engine::store::{EventFilter, SecurityStore};

#[tokio::test]
async fn test_lockout_after_max_failed_logins() {
    let t = TestEngine::spawn();
    let account = t.create_account("victim@example.com").await;

    // Two live sessions that the lockout must tear down.
    for _ in 0..2 {
        t.engine
            .sessions
            .create_session(account.account_id, client_from("203.0.113.9"), None)
            .await
            .unwrap();
    }

    for attempt in 1..=5u32 {
        let outcome = t
            .engine
            .credential_guard
            .record_failed_login("victim@example.com", "198.51.100.7", "curl/8.0", None)
            .await
            .unwrap()
            .expect("known account must yield an outcome");
        assert_eq!(outcome.attempts, attempt);
        assert_eq!(outcome.locked, attempt == 5);
    }

    assert!(t
        .engine
        .credential_guard
        .is_account_locked("victim@example.com")
        .await
        .unwrap());

    let stored = t.account(account.account_id).await;
    assert!(stored.locked_until.is_some());
    assert!(!stored.is_online);

    // Every session terminated with the lockout reason.
    let sessions = t
        .store
        .active_sessions_for_account(account.account_id)
        .await
        .unwrap();
    assert!(sessions.is_empty());

    // The lockout notice went out.
    assert_eq!(t.notifier.sent_count(NotificationCategory::LockoutNotice), 1);

    // Individual failures and the escalated brute-force event are distinct.
    let failures = t
        .store
        .count_events(
            &EventFilter::of_type(SecurityEventType::LoginFailed).for_account(account.account_id),
        )
        .await
        .unwrap();
    assert_eq!(failures, 5);

    let escalations = t
        .store
        .count_events(&EventFilter {
            account_id: Some(account.account_id),
            event_type: Some(SecurityEventType::MultipleFailedLogins),
            severity: Some(Severity::High),
            ..EventFilter::default()
        })
        .await
        .unwrap();
    assert!(escalations >= 1);

    let lock_events = t
        .store
        .count_events(&EventFilter {
            account_id: Some(account.account_id),
            event_type: Some(SecurityEventType::AccountLocked),
            severity: Some(Severity::High),
            ..EventFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(lock_events, 1);
}

#[tokio::test]
async fn test_lockout_terminates_sessions_with_account_locked_reason() {
    let t = TestEngine::spawn();
    let account = t.create_account("reasons@example.com").await;
    let session = t
        .engine
        .sessions
        .create_session(account.account_id, client_from("203.0.113.9"), None)
        .await
        .unwrap();

    t.engine
        .credential_guard
        .lock_account(account.account_id, 10, Some("203.0.113.9"), None)
        .await
        .unwrap();

    let stored = t.store.find_session(&session.token).await.unwrap().unwrap();
    assert!(!stored.is_active);
    assert_eq!(
        stored.termination_reason,
        Some(TerminationReason::AccountLocked)
    );
}

#[tokio::test]
async fn test_lazy_unlock_after_window_elapsed() {
    let t = TestEngine::spawn();
    let account = t.create_account("expired-lock@example.com").await;

    // Lock, then age the window out behind the guard's back.
    t.engine
        .credential_guard
        .lock_account(account.account_id, 10, None, None)
        .await
        .unwrap();
    let mut stored = t.account(account.account_id).await;
    stored.locked_until = Some(Utc::now() - Duration::seconds(1));
    t.store.update_account(&stored).await.unwrap();

    assert!(!t
        .engine
        .credential_guard
        .is_account_locked("expired-lock@example.com")
        .await
        .unwrap());

    let stored = t.account(account.account_id).await;
    assert!(stored.locked_until.is_none(), "lazy unlock clears the window");
    assert_eq!(stored.failed_login_attempts, 0);

    // Idempotent on repeat.
    assert!(!t
        .engine
        .credential_guard
        .is_account_locked("expired-lock@example.com")
        .await
        .unwrap());
}

#[tokio::test]
async fn test_unknown_email_yields_no_enumeration_signal() {
    let t = TestEngine::spawn();

    let outcome = t
        .engine
        .credential_guard
        .record_failed_login("ghost@example.com", "198.51.100.7", "curl/8.0", None)
        .await
        .unwrap();
    assert!(outcome.is_none());

    // Logged internally all the same.
    let events = t
        .store
        .count_events(&EventFilter {
            event_type: Some(SecurityEventType::LoginFailed),
            severity: Some(Severity::Medium),
            ..EventFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(events, 1);
}

#[tokio::test]
async fn test_unlock_account_clears_state_with_attribution() {
    let t = TestEngine::spawn();
    let account = t.create_account("locked@example.com").await;

    for _ in 0..5 {
        t.engine
            .credential_guard
            .record_failed_login("locked@example.com", "198.51.100.7", "curl/8.0", None)
            .await
            .unwrap();
    }
    assert!(t
        .engine
        .credential_guard
        .is_account_locked("locked@example.com")
        .await
        .unwrap());

    t.engine
        .credential_guard
        .unlock_account("locked@example.com", Some("admin@example.com"))
        .await
        .unwrap();

    let stored = t.account(account.account_id).await;
    assert!(stored.locked_until.is_none());
    assert_eq!(stored.failed_login_attempts, 0);

    let unlock_events = t
        .store
        .count_events(
            &EventFilter::of_type(SecurityEventType::AccountUnlocked)
                .for_account(account.account_id),
        )
        .await
        .unwrap();
    assert_eq!(unlock_events, 1);
}

#[tokio::test]
async fn test_successful_login_resets_counter() {
    let t = TestEngine::spawn();
    let account = t.create_account("recovers@example.com").await;

    for _ in 0..3 {
        t.engine
            .credential_guard
            .record_failed_login("recovers@example.com", "198.51.100.7", "curl/8.0", None)
            .await
            .unwrap();
    }
    assert_eq!(t.account(account.account_id).await.failed_login_attempts, 3);

    t.engine
        .credential_guard
        .record_successful_login(account.account_id, "198.51.100.7", "curl/8.0")
        .await
        .unwrap();

    let stored = t.account(account.account_id).await;
    assert_eq!(stored.failed_login_attempts, 0);
    assert!(stored.last_login_at.is_some());

    // No-op path.
    t.engine
        .credential_guard
        .reset_failed_attempts(account.account_id)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_cleanup_expired_lockouts_sweep() {
    let t = TestEngine::spawn();
    let expired = t.create_account("swept@example.com").await;
    let held = t.create_account("still-locked@example.com").await;

    let mut a = t.account(expired.account_id).await;
    a.locked_until = Some(Utc::now() - Duration::minutes(1));
    a.failed_login_attempts = 5;
    t.store.update_account(&a).await.unwrap();

    let mut b = t.account(held.account_id).await;
    b.locked_until = Some(Utc::now() + Duration::minutes(10));
    t.store.update_account(&b).await.unwrap();

    let cleared = t
        .engine
        .credential_guard
        .cleanup_expired_lockouts()
        .await
        .unwrap();
    assert_eq!(cleared, 1);

    assert!(t.account(expired.account_id).await.locked_until.is_none());
    assert!(t.account(held.account_id).await.locked_until.is_some());
}
