//! Security event ledger with secondary pattern analysis.
//!
//! Every component writes through here. Logging must never fail the
//! primary security decision: store failures are reported to operational
//! logs and swallowed.

use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::models::{SecurityEvent, SecurityEventType, Severity};
use crate::store::{EventFilter, SecurityStore};

use super::SecurityError;

/// Failed logins inside the trailing window that escalate to an alert.
const BRUTE_FORCE_THRESHOLD: u64 = 3;
const BRUTE_FORCE_WINDOW_MINUTES: i64 = 5;
/// Distinct source addresses inside the trailing hour that escalate to
/// critical.
const DISTINCT_IP_THRESHOLD: usize = 3;

#[derive(Clone)]
pub struct SecurityEventLog {
    store: Arc<dyn SecurityStore>,
}

impl SecurityEventLog {
    pub fn new(store: Arc<dyn SecurityStore>) -> Self {
        Self { store }
    }

    /// Append an event, then run alert analysis over the updated ledger.
    ///
    /// Infallible by contract: an audit write that fails is logged to the
    /// operational log and dropped rather than blocking the caller.
    pub async fn log_event(&self, event: SecurityEvent) {
        match event.severity {
            Severity::Low => tracing::info!(
                event_type = event.event_type.as_str(),
                severity = event.severity.as_str(),
                description = %event.description,
                "Security event"
            ),
            _ => tracing::warn!(
                event_type = event.event_type.as_str(),
                severity = event.severity.as_str(),
                description = %event.description,
                "Security event"
            ),
        }

        let snapshot = event.clone();
        if let Err(e) = self.store.append_event(event).await {
            tracing::error!(
                error = %e,
                event_type = snapshot.event_type.as_str(),
                "Failed to write security event"
            );
            return;
        }

        if let Err(e) = self.check_for_alerts(&snapshot).await {
            tracing::error!(error = %e, "Security alert analysis failed");
        }
    }

    /// Secondary analysis over the ledger. Escalated events are appended
    /// directly so they do not themselves re-enter analysis.
    async fn check_for_alerts(&self, event: &SecurityEvent) -> Result<(), anyhow::Error> {
        let Some(account_id) = event.account_id else {
            return Ok(());
        };

        match event.event_type {
            SecurityEventType::LoginFailed => {
                let since = Utc::now() - Duration::minutes(BRUTE_FORCE_WINDOW_MINUTES);
                let failures = self
                    .store
                    .count_events(
                        &EventFilter::of_type(SecurityEventType::LoginFailed)
                            .for_account(account_id)
                            .since(since),
                    )
                    .await?;

                if failures >= BRUTE_FORCE_THRESHOLD {
                    let escalated = SecurityEvent::new(
                        SecurityEventType::MultipleFailedLogins,
                        Severity::High,
                        format!(
                            "{} failed login attempts within {} minutes",
                            failures, BRUTE_FORCE_WINDOW_MINUTES
                        ),
                    )
                    .with_account(account_id)
                    .with_metadata(serde_json::json!({ "failures": failures }));
                    self.store.append_event(escalated).await?;
                }
            }
            SecurityEventType::LoginSuccess => {
                self.analyze_login_origin(account_id, event).await?;
            }
            _ => {}
        }

        Ok(())
    }

    async fn analyze_login_origin(
        &self,
        account_id: Uuid,
        event: &SecurityEvent,
    ) -> Result<(), anyhow::Error> {
        let recent = self
            .store
            .recent_events(account_id, SecurityEventType::LoginSuccess, 50)
            .await?;

        // recent[0] is the event just appended; recent[1] is the prior login.
        if let (Some(current_ip), Some(previous)) = (event.ip_address.as_deref(), recent.get(1)) {
            if let Some(previous_ip) = previous.ip_address.as_deref() {
                if previous_ip != current_ip {
                    let location_changed =
                        resolve_location(previous_ip) != resolve_location(current_ip);
                    let severity = if location_changed {
                        Severity::High
                    } else {
                        Severity::Medium
                    };
                    let alert = SecurityEvent::new(
                        SecurityEventType::SuspiciousLogin,
                        severity,
                        if location_changed {
                            "login from a new location"
                        } else {
                            "login from a new IP address"
                        },
                    )
                    .with_account(account_id)
                    .with_ip(current_ip)
                    .with_metadata(serde_json::json!({
                        "previous_ip": previous_ip,
                        "current_ip": current_ip,
                    }));
                    self.store.append_event(alert).await?;
                }
            }
        }

        let hour_ago = Utc::now() - Duration::hours(1);
        let mut distinct_ips: Vec<&str> = recent
            .iter()
            .filter(|e| e.created_at >= hour_ago)
            .filter_map(|e| e.ip_address.as_deref())
            .collect();
        distinct_ips.sort_unstable();
        distinct_ips.dedup();

        if distinct_ips.len() > DISTINCT_IP_THRESHOLD {
            let alert = SecurityEvent::new(
                SecurityEventType::SuspiciousLogin,
                Severity::Critical,
                format!(
                    "logins from {} distinct addresses within the last hour",
                    distinct_ips.len()
                ),
            )
            .with_account(account_id)
            .with_metadata(serde_json::json!({ "distinct_ips": distinct_ips.len() }));
            self.store.append_event(alert).await?;
        }

        Ok(())
    }

    /// Mark an event resolved. The only permitted mutation of the ledger.
    pub async fn resolve_event(
        &self,
        event_id: Uuid,
        resolved_by: &str,
    ) -> Result<(), SecurityError> {
        let mut event = self
            .store
            .find_event(event_id)
            .await?
            .ok_or(SecurityError::NotFound("security event"))?;

        event.is_resolved = true;
        event.resolved_by = Some(resolved_by.to_string());
        event.resolved_at = Some(Utc::now());
        self.store.update_event(&event).await?;

        tracing::info!(event_id = %event_id, resolved_by = %resolved_by, "Security event resolved");
        Ok(())
    }

    pub async fn count(&self, filter: &EventFilter) -> Result<u64, SecurityError> {
        Ok(self.store.count_events(filter).await?)
    }
}

/// Coarse location key for the geography alert: the /16 prefix for IPv4,
/// the /32 prefix for IPv6. A deployment with a real geo resolver replaces
/// this seam.
pub(crate) fn resolve_location(ip: &str) -> Option<String> {
    match ip.parse::<std::net::IpAddr>().ok()? {
        std::net::IpAddr::V4(v4) => {
            let octets = v4.octets();
            Some(format!("{}.{}.0.0/16", octets[0], octets[1]))
        }
        std::net::IpAddr::V6(v6) => {
            let segments = v6.segments();
            Some(format!("{:x}:{:x}::/32", segments[0], segments[1]))
        }
    }
}
