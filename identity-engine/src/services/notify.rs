//! Notification collaborator seam.
//!
//! Delivery (templating, transport, retries) lives outside the engine. The
//! engine only decides *that* something must go out and hands it to this
//! trait. Delivery failure must not fail the originating security
//! operation, except where the operation's sole purpose is delivery.

use async_trait::async_trait;
use std::sync::Mutex;

/// What kind of notification is being dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationCategory {
    SecondFactorCode,
    EmailVerification,
    PasswordReset,
    LockoutNotice,
    SecurityAlert,
}

impl NotificationCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationCategory::SecondFactorCode => "second_factor_code",
            NotificationCategory::EmailVerification => "email_verification",
            NotificationCategory::PasswordReset => "password_reset",
            NotificationCategory::LockoutNotice => "lockout_notice",
            NotificationCategory::SecurityAlert => "security_alert",
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(
        &self,
        category: NotificationCategory,
        recipient: &str,
        payload: serde_json::Value,
    ) -> Result<(), anyhow::Error>;
}

/// Fire the notification, logging and swallowing any delivery failure.
pub async fn send_best_effort(
    notifier: &dyn Notifier,
    category: NotificationCategory,
    recipient: &str,
    payload: serde_json::Value,
) {
    if let Err(e) = notifier.send(category, recipient, payload).await {
        tracing::error!(
            error = %e,
            category = category.as_str(),
            recipient = %recipient,
            "Notification dispatch failed; continuing"
        );
    }
}

/// Notifier that only logs. Default wiring until the platform injects its
/// real delivery client.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(
        &self,
        category: NotificationCategory,
        recipient: &str,
        _payload: serde_json::Value,
    ) -> Result<(), anyhow::Error> {
        tracing::info!(
            category = category.as_str(),
            recipient = %recipient,
            "Notification dispatched"
        );
        Ok(())
    }
}

/// A dispatched notification captured by [`MockNotifier`].
#[derive(Debug, Clone)]
pub struct SentNotification {
    pub category: NotificationCategory,
    pub recipient: String,
    pub payload: serde_json::Value,
}

/// Capturing notifier for tests.
#[derive(Default)]
pub struct MockNotifier {
    pub sent: Mutex<Vec<SentNotification>>,
    pub fail: Mutex<bool>,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent send fail, to exercise best-effort paths.
    pub fn fail_next_sends(&self) {
        *self.fail.lock().unwrap_or_else(|e| e.into_inner()) = true;
    }

    pub fn sent_count(&self, category: NotificationCategory) -> usize {
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|n| n.category == category)
            .count()
    }

    pub fn last_payload(&self, category: NotificationCategory) -> Option<serde_json::Value> {
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .rev()
            .find(|n| n.category == category)
            .map(|n| n.payload.clone())
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn send(
        &self,
        category: NotificationCategory,
        recipient: &str,
        payload: serde_json::Value,
    ) -> Result<(), anyhow::Error> {
        if *self.fail.lock().unwrap_or_else(|e| e.into_inner()) {
            return Err(anyhow::anyhow!("simulated delivery failure"));
        }
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(SentNotification {
                category,
                recipient: recipient.to_string(),
                payload,
            });
        Ok(())
    }
}
