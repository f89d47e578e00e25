//! API key issuance, validation, scoping, and rotation.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::models::{ApiKey, IssuedApiKey, SecurityEvent, SecurityEventType, Severity,
    API_KEY_PREFIX};
use crate::store::SecurityStore;
use crate::utils::{generate_random_encoded_bytes, sha256_hex};

use super::{SecurityError, SecurityEventLog};

/// Resources and actions a scope may name.
const KNOWN_RESOURCES: &[&str] = &["account", "session", "device", "event", "apikey", "report"];
const KNOWN_ACTIONS: &[&str] = &["read", "write", "delete", "admin"];

#[derive(Clone)]
pub struct ApiKeyRegistry {
    store: Arc<dyn SecurityStore>,
    events: SecurityEventLog,
}

impl ApiKeyRegistry {
    pub fn new(store: Arc<dyn SecurityStore>, events: SecurityEventLog) -> Self {
        Self { store, events }
    }

    /// Create a prefixed random key. Only its hash is stored; the plaintext
    /// in the returned [`IssuedApiKey`] is the one chance to read it.
    pub async fn generate_key(
        &self,
        account_id: Uuid,
        name: &str,
        scopes: Vec<String>,
        expires_in_days: Option<i64>,
    ) -> Result<IssuedApiKey, SecurityError> {
        Self::validate_scopes(&scopes)?;
        self.store
            .find_account(account_id)
            .await?
            .ok_or(SecurityError::NotFound("account"))?;

        let plaintext = format!("{}{}", API_KEY_PREFIX, generate_random_encoded_bytes(32));
        let key = ApiKey::new(
            account_id,
            name.to_string(),
            sha256_hex(plaintext.as_bytes()),
            scopes.clone(),
            expires_in_days,
        );
        self.store.insert_api_key(key.clone()).await?;

        self.events
            .log_event(
                SecurityEvent::new(
                    SecurityEventType::ApiKeyCreated,
                    Severity::Low,
                    format!("API key '{}' created", name),
                )
                .with_account(account_id)
                .with_metadata(serde_json::json!({
                    "key_id": key.key_id,
                    "scopes": scopes,
                })),
            )
            .await;

        Ok(IssuedApiKey {
            key_id: key.key_id,
            plaintext,
            scopes,
            expires_at: key.expires_at,
        })
    }

    /// Validate a presented key. An expired key is deactivated on this same
    /// call (lazy expiry); a live one gets its `last_used_at` stamped.
    pub async fn validate_key(&self, presented: &str) -> Result<ApiKey, SecurityError> {
        if !presented.starts_with(API_KEY_PREFIX) {
            return Err(SecurityError::Authentication(
                "malformed API key".to_string(),
            ));
        }

        let hash = sha256_hex(presented.as_bytes());
        let Some(mut key) = self.store.find_api_key_by_hash(&hash).await? else {
            return Err(SecurityError::Authentication("unknown API key".to_string()));
        };

        if !key.is_active {
            return Err(SecurityError::Authentication(
                "API key is deactivated".to_string(),
            ));
        }

        let now = Utc::now();
        if key.is_expired(now) {
            key.is_active = false;
            key.deactivated_reason = Some("expired".to_string());
            self.store.update_api_key(&key).await?;
            self.events
                .log_event(
                    SecurityEvent::new(
                        SecurityEventType::ApiKeyDeactivated,
                        Severity::Low,
                        "expired API key deactivated on use",
                    )
                    .with_account(key.account_id)
                    .with_metadata(serde_json::json!({ "key_id": key.key_id })),
                )
                .await;
            return Err(SecurityError::Expired("api key"));
        }

        key.last_used_at = Some(now);
        self.store.update_api_key(&key).await?;

        self.events
            .log_event(
                SecurityEvent::new(SecurityEventType::ApiKeyUsed, Severity::Low, "API key used")
                    .with_account(key.account_id)
                    .with_metadata(serde_json::json!({ "key_id": key.key_id })),
            )
            .await;
        Ok(key)
    }

    /// `"*"` grants everything; otherwise only the exact scope counts.
    pub fn has_scope(scopes: &[String], required: &str) -> bool {
        scopes.iter().any(|s| s == "*" || s == required)
    }

    /// Issue a new secret under the same record. Fails loudly on an unknown
    /// id: rotating a key that does not exist is an integration bug.
    pub async fn rotate_key(&self, key_id: Uuid) -> Result<IssuedApiKey, SecurityError> {
        let mut key = self
            .store
            .find_api_key(key_id)
            .await?
            .ok_or(SecurityError::NotFound("api key"))?;

        let plaintext = format!("{}{}", API_KEY_PREFIX, generate_random_encoded_bytes(32));
        key.key_hash = sha256_hex(plaintext.as_bytes());
        key.last_used_at = None;
        self.store.update_api_key(&key).await?;

        self.events
            .log_event(
                SecurityEvent::new(
                    SecurityEventType::ApiKeyRotated,
                    Severity::Low,
                    format!("API key '{}' rotated", key.name),
                )
                .with_account(key.account_id)
                .with_metadata(serde_json::json!({ "key_id": key.key_id })),
            )
            .await;

        Ok(IssuedApiKey {
            key_id: key.key_id,
            plaintext,
            scopes: key.scopes,
            expires_at: key.expires_at,
        })
    }

    pub async fn deactivate_key(&self, key_id: Uuid, reason: &str) -> Result<(), SecurityError> {
        let mut key = self
            .store
            .find_api_key(key_id)
            .await?
            .ok_or(SecurityError::NotFound("api key"))?;

        key.is_active = false;
        key.deactivated_reason = Some(reason.to_string());
        self.store.update_api_key(&key).await?;

        self.events
            .log_event(
                SecurityEvent::new(
                    SecurityEventType::ApiKeyDeactivated,
                    Severity::Low,
                    format!("API key '{}' deactivated: {}", key.name, reason),
                )
                .with_account(key.account_id)
                .with_metadata(serde_json::json!({ "key_id": key.key_id, "reason": reason })),
            )
            .await;
        Ok(())
    }

    /// Sweep: deactivate keys past their deadline.
    pub async fn cleanup_expired_keys(&self) -> Result<u64, SecurityError> {
        let now = Utc::now();
        let mut deactivated = 0;
        for mut key in self.store.expired_active_api_keys(now).await? {
            key.is_active = false;
            key.deactivated_reason = Some("expired".to_string());
            match self.store.update_api_key(&key).await {
                Ok(()) => deactivated += 1,
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        key_id = %key.key_id,
                        "Failed to deactivate expired API key; continuing sweep"
                    );
                }
            }
        }
        Ok(deactivated)
    }

    /// Reject any scope not matching `resource:action`, `resource:*`, or
    /// `*` over the known resource/action vocabulary.
    pub fn validate_scopes(scopes: &[String]) -> Result<(), SecurityError> {
        for scope in scopes {
            if scope == "*" {
                continue;
            }
            let Some((resource, action)) = scope.split_once(':') else {
                return Err(SecurityError::Validation(format!(
                    "malformed scope '{}'",
                    scope
                )));
            };
            if !KNOWN_RESOURCES.contains(&resource) {
                return Err(SecurityError::Validation(format!(
                    "unknown resource in scope '{}'",
                    scope
                )));
            }
            if action != "*" && !KNOWN_ACTIONS.contains(&action) {
                return Err(SecurityError::Validation(format!(
                    "unknown action in scope '{}'",
                    scope
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scopes(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_validate_scopes_accepts_known_forms() {
        assert!(ApiKeyRegistry::validate_scopes(&scopes(&["*"])).is_ok());
        assert!(ApiKeyRegistry::validate_scopes(&scopes(&["session:read"])).is_ok());
        assert!(ApiKeyRegistry::validate_scopes(&scopes(&["device:*", "event:read"])).is_ok());
    }

    #[test]
    fn test_validate_scopes_rejects_malformed() {
        assert!(ApiKeyRegistry::validate_scopes(&scopes(&["sessions"])).is_err());
        assert!(ApiKeyRegistry::validate_scopes(&scopes(&["unknown:read"])).is_err());
        assert!(ApiKeyRegistry::validate_scopes(&scopes(&["session:fly"])).is_err());
        assert!(ApiKeyRegistry::validate_scopes(&scopes(&[""])).is_err());
    }

    #[test]
    fn test_has_scope_wildcard_and_exact() {
        let all = scopes(&["*"]);
        let narrow = scopes(&["session:read", "device:write"]);

        assert!(ApiKeyRegistry::has_scope(&all, "event:delete"));
        assert!(ApiKeyRegistry::has_scope(&narrow, "session:read"));
        assert!(!ApiKeyRegistry::has_scope(&narrow, "session:write"));
        // Only the exact scope string matches; resource wildcards are not
        // expanded here.
        assert!(!ApiKeyRegistry::has_scope(&scopes(&["session:*"]), "session:read"));
    }
}
