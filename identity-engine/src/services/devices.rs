//! Device fingerprinting, trust, and removal.

use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::config::SecurityPolicyConfig;
use crate::models::{
    Device, DeviceType, SecurityEvent, SecurityEventType, Severity, TerminationReason,
};
use crate::store::SecurityStore;
use crate::utils::{generate_random_encoded_bytes, sha256_hex};

use super::{SecurityError, SecurityEventLog};

/// Connection attributes a device fingerprint derives from.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub user_agent: String,
    pub ip_address: String,
}

#[derive(Clone)]
pub struct DeviceRegistry {
    store: Arc<dyn SecurityStore>,
    events: SecurityEventLog,
    policy: SecurityPolicyConfig,
}

impl DeviceRegistry {
    pub fn new(
        store: Arc<dyn SecurityStore>,
        events: SecurityEventLog,
        policy: SecurityPolicyConfig,
    ) -> Self {
        Self {
            store,
            events,
            policy,
        }
    }

    /// Deterministic fingerprint over stable connection attributes and the
    /// device's persisted salt. No wall-clock input: the same device always
    /// produces the same fingerprint, so re-sightings de-duplicate.
    fn fingerprint(account_id: Uuid, user_agent: &str, ip_address: &str, salt: &str) -> String {
        sha256_hex(format!("{}|{}|{}|{}", account_id, user_agent, ip_address, salt).as_bytes())
    }

    /// Register a sighting of a device. A known fingerprint refreshes its
    /// last-seen stamp; an unknown one creates an untrusted record with a
    /// fresh salt.
    pub async fn register_device(
        &self,
        account_id: Uuid,
        info: ConnectionInfo,
    ) -> Result<Device, SecurityError> {
        let now = Utc::now();

        for mut device in self.store.devices_for_account(account_id).await? {
            let expected =
                Self::fingerprint(account_id, &info.user_agent, &info.ip_address, &device.salt);
            if expected == device.device_id {
                device.last_active_at = now;
                device.is_active = true;
                self.store.update_device(&device).await?;
                return Ok(device);
            }
        }

        let salt = generate_random_encoded_bytes(16);
        let device_id = Self::fingerprint(account_id, &info.user_agent, &info.ip_address, &salt);
        let (device_type, browser, os) = parse_user_agent(&info.user_agent);
        let device = Device::new(device_id, account_id, salt, device_type, browser, os);
        self.store.insert_device(device.clone()).await?;

        self.events
            .log_event(
                SecurityEvent::new(
                    SecurityEventType::DeviceRegistered,
                    Severity::Low,
                    "new device registered",
                )
                .with_account(account_id)
                .with_ip(info.ip_address)
                .with_user_agent(info.user_agent)
                .with_metadata(serde_json::json!({
                    "device_type": device.device_type.as_str(),
                    "browser": device.browser,
                    "os": device.os,
                })),
            )
            .await;
        Ok(device)
    }

    /// Mark a device trusted. One-way upgrade, owner-scoped.
    pub async fn trust_device(
        &self,
        device_id: &str,
        account_id: Uuid,
    ) -> Result<(), SecurityError> {
        let mut device = self.owned_device(device_id, account_id).await?;
        if !device.is_active {
            return Err(SecurityError::Validation(
                "cannot trust an inactive device".to_string(),
            ));
        }

        device.is_trusted = true;
        self.store.update_device(&device).await?;

        self.events
            .log_event(
                SecurityEvent::new(
                    SecurityEventType::DeviceTrusted,
                    Severity::Low,
                    "device marked trusted",
                )
                .with_account(account_id)
                .with_metadata(serde_json::json!({ "device_id": device_id })),
            )
            .await;
        Ok(())
    }

    /// Remove a device and terminate every session bound to it.
    pub async fn remove_device(
        &self,
        device_id: &str,
        account_id: Uuid,
    ) -> Result<(), SecurityError> {
        let device = self.owned_device(device_id, account_id).await?;

        let terminated = self
            .store
            .terminate_sessions_for_device(
                &device.device_id,
                TerminationReason::DeviceRemoved,
                Utc::now(),
            )
            .await?;
        self.store.delete_device(&device.device_id).await?;

        self.events
            .log_event(
                SecurityEvent::new(
                    SecurityEventType::DeviceRemoved,
                    Severity::Low,
                    "device removed",
                )
                .with_account(account_id)
                .with_metadata(serde_json::json!({
                    "device_id": device_id,
                    "sessions_terminated": terminated,
                })),
            )
            .await;
        Ok(())
    }

    /// True only for a device that is both active and trusted.
    pub async fn is_device_trusted(&self, device_id: &str) -> Result<bool, SecurityError> {
        Ok(self
            .store
            .find_device(device_id)
            .await?
            .is_some_and(|d| d.is_active && d.is_trusted))
    }

    /// Deactivate devices unseen for the cutoff window (default from
    /// policy, 90 days).
    pub async fn cleanup_inactive_devices(
        &self,
        days_inactive: Option<i64>,
    ) -> Result<u64, SecurityError> {
        let days = days_inactive.unwrap_or(self.policy.device_inactive_days);
        let cutoff = Utc::now() - Duration::days(days);

        let mut deactivated = 0;
        for mut device in self.store.active_devices_unseen_since(cutoff).await? {
            device.is_active = false;
            match self.store.update_device(&device).await {
                Ok(()) => deactivated += 1,
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        device_id = %device.device_id,
                        "Failed to deactivate stale device; continuing sweep"
                    );
                }
            }
        }
        Ok(deactivated)
    }

    /// Ownership-scoped lookup: a device belonging to another account is
    /// indistinguishable from a missing one.
    async fn owned_device(
        &self,
        device_id: &str,
        account_id: Uuid,
    ) -> Result<Device, SecurityError> {
        let device = self
            .store
            .find_device(device_id)
            .await?
            .ok_or(SecurityError::NotFound("device"))?;
        if device.account_id != account_id {
            return Err(SecurityError::NotFound("device"));
        }
        Ok(device)
    }
}

/// Coarse user-agent classification, substring-based.
fn parse_user_agent(user_agent: &str) -> (DeviceType, String, String) {
    let device_type = if user_agent.contains("iPad") || user_agent.contains("Tablet") {
        DeviceType::Tablet
    } else if user_agent.contains("Mobile")
        || user_agent.contains("Android")
        || user_agent.contains("iPhone")
    {
        DeviceType::Mobile
    } else if user_agent.is_empty() {
        DeviceType::Unknown
    } else {
        DeviceType::Desktop
    };

    let browser = if user_agent.contains("Edg/") {
        "Edge"
    } else if user_agent.contains("Chrome") {
        "Chrome"
    } else if user_agent.contains("Firefox") {
        "Firefox"
    } else if user_agent.contains("Safari") {
        "Safari"
    } else {
        "Unknown"
    };

    let os = if user_agent.contains("Windows") {
        "Windows"
    } else if user_agent.contains("Android") {
        "Android"
    } else if user_agent.contains("iPhone") || user_agent.contains("iPad") {
        "iOS"
    } else if user_agent.contains("Mac OS X") {
        "macOS"
    } else if user_agent.contains("Linux") {
        "Linux"
    } else {
        "Unknown"
    };

    (device_type, browser.to_string(), os.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHROME_WIN: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";
    const SAFARI_IPHONE: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1";

    #[test]
    fn test_parse_user_agent_desktop_chrome() {
        let (device_type, browser, os) = parse_user_agent(CHROME_WIN);
        assert_eq!(device_type, DeviceType::Desktop);
        assert_eq!(browser, "Chrome");
        assert_eq!(os, "Windows");
    }

    #[test]
    fn test_parse_user_agent_mobile_safari() {
        let (device_type, browser, os) = parse_user_agent(SAFARI_IPHONE);
        assert_eq!(device_type, DeviceType::Mobile);
        assert_eq!(browser, "Safari");
        assert_eq!(os, "iOS");
    }

    #[test]
    fn test_fingerprint_is_deterministic() {
        let account_id = Uuid::new_v4();
        let a = DeviceRegistry::fingerprint(account_id, CHROME_WIN, "203.0.113.9", "salt");
        let b = DeviceRegistry::fingerprint(account_id, CHROME_WIN, "203.0.113.9", "salt");
        assert_eq!(a, b);
    }

    #[test]
    fn test_fingerprint_varies_with_inputs() {
        let account_id = Uuid::new_v4();
        let base = DeviceRegistry::fingerprint(account_id, CHROME_WIN, "203.0.113.9", "salt");
        assert_ne!(
            base,
            DeviceRegistry::fingerprint(account_id, CHROME_WIN, "203.0.113.10", "salt")
        );
        assert_ne!(
            base,
            DeviceRegistry::fingerprint(account_id, CHROME_WIN, "203.0.113.9", "other")
        );
        assert_ne!(
            base,
            DeviceRegistry::fingerprint(Uuid::new_v4(), CHROME_WIN, "203.0.113.9", "salt")
        );
    }
}
