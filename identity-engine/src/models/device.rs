//! Device model - fingerprinted client devices.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Coarse device classification parsed from the user agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    Desktop,
    Mobile,
    Tablet,
    Unknown,
}

impl DeviceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::Desktop => "desktop",
            DeviceType::Mobile => "mobile",
            DeviceType::Tablet => "tablet",
            DeviceType::Unknown => "unknown",
        }
    }
}

/// Device entity. `device_id` is the fingerprint: a digest over stable
/// connection attributes and `salt`, which is generated once at first
/// sighting and persisted here. Wall-clock time never enters the digest, so
/// the same device always resolves to the same record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub device_id: String,
    pub account_id: Uuid,
    pub salt: String,
    pub device_type: DeviceType,
    pub browser: String,
    pub os: String,
    pub is_trusted: bool,
    pub is_active: bool,
    pub first_seen_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
}

impl Device {
    pub fn new(
        device_id: String,
        account_id: Uuid,
        salt: String,
        device_type: DeviceType,
        browser: String,
        os: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            device_id,
            account_id,
            salt,
            device_type,
            browser,
            os,
            is_trusted: false,
            is_active: true,
            first_seen_at: now,
            last_active_at: now,
        }
    }
}
