use serde::Deserialize;
use std::env;

use crate::services::SecurityError;

/// Engine configuration, loaded from the environment.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    pub environment: Environment,
    pub service_name: String,
    pub log_level: String,
    pub security: SecurityPolicyConfig,
    pub password_policy: PasswordPolicyConfig,
    pub sweep_interval_seconds: u64,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

/// Organization security policy.
#[derive(Debug, Clone, Deserialize)]
pub struct SecurityPolicyConfig {
    /// Consecutive failed logins before lockout.
    pub max_failed_logins: u32,
    pub lockout_duration_minutes: i64,
    /// Session token lifetime.
    pub session_timeout_minutes: i64,
    /// Idle time after which a session counts as expired.
    pub idle_timeout_minutes: i64,
    /// Idle time after which the inactivity sweep force-expires an account.
    pub inactivity_cutoff_minutes: i64,
    pub max_concurrent_sessions: usize,
    pub two_factor_required: bool,
    pub two_factor_code_expiry_minutes: i64,
    pub reset_token_expiry_minutes: i64,
    pub device_inactive_days: i64,
    /// When set, federated logins must carry an email in this domain.
    pub sso_allowed_domain: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PasswordPolicyConfig {
    pub min_length: u8,
    pub require_uppercase: bool,
    pub require_number: bool,
    pub require_special: bool,
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, SecurityError> {
        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| SecurityError::Config(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let config = EngineConfig {
            environment,
            service_name: get_env("SERVICE_NAME", Some("identity-engine"), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            security: SecurityPolicyConfig {
                max_failed_logins: parse_env("MAX_FAILED_LOGINS", "5", is_prod)?,
                lockout_duration_minutes: parse_env("LOCKOUT_DURATION_MINUTES", "10", is_prod)?,
                session_timeout_minutes: parse_env("SESSION_TIMEOUT_MINUTES", "5", is_prod)?,
                idle_timeout_minutes: parse_env("IDLE_TIMEOUT_MINUTES", "5", is_prod)?,
                inactivity_cutoff_minutes: parse_env("INACTIVITY_CUTOFF_MINUTES", "30", is_prod)?,
                max_concurrent_sessions: parse_env("MAX_CONCURRENT_SESSIONS", "5", is_prod)?,
                two_factor_required: parse_env("TWO_FACTOR_REQUIRED", "false", is_prod)?,
                two_factor_code_expiry_minutes: parse_env(
                    "TWO_FACTOR_CODE_EXPIRY_MINUTES",
                    "10",
                    is_prod,
                )?,
                reset_token_expiry_minutes: parse_env("RESET_TOKEN_EXPIRY_MINUTES", "60", is_prod)?,
                device_inactive_days: parse_env("DEVICE_INACTIVE_DAYS", "90", is_prod)?,
                sso_allowed_domain: env::var("SSO_ALLOWED_DOMAIN")
                    .ok()
                    .filter(|d| !d.is_empty()),
            },
            password_policy: PasswordPolicyConfig {
                min_length: parse_env("PASSWORD_MIN_LENGTH", "8", is_prod)?,
                require_uppercase: parse_env("PASSWORD_REQUIRE_UPPERCASE", "true", is_prod)?,
                require_number: parse_env("PASSWORD_REQUIRE_NUMBER", "true", is_prod)?,
                require_special: parse_env("PASSWORD_REQUIRE_SPECIAL", "false", is_prod)?,
            },
            sweep_interval_seconds: parse_env("SWEEP_INTERVAL_SECONDS", "300", is_prod)?,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), SecurityError> {
        if self.security.max_failed_logins == 0 {
            return Err(SecurityError::Config(anyhow::anyhow!(
                "MAX_FAILED_LOGINS must be greater than 0"
            )));
        }
        if self.security.lockout_duration_minutes <= 0 {
            return Err(SecurityError::Config(anyhow::anyhow!(
                "LOCKOUT_DURATION_MINUTES must be positive"
            )));
        }
        if self.security.session_timeout_minutes <= 0 {
            return Err(SecurityError::Config(anyhow::anyhow!(
                "SESSION_TIMEOUT_MINUTES must be positive"
            )));
        }
        if self.security.max_concurrent_sessions == 0 {
            return Err(SecurityError::Config(anyhow::anyhow!(
                "MAX_CONCURRENT_SESSIONS must be greater than 0"
            )));
        }
        if self.sweep_interval_seconds == 0 {
            return Err(SecurityError::Config(anyhow::anyhow!(
                "SWEEP_INTERVAL_SECONDS must be greater than 0"
            )));
        }
        Ok(())
    }
}

impl Default for SecurityPolicyConfig {
    fn default() -> Self {
        Self {
            max_failed_logins: 5,
            lockout_duration_minutes: 10,
            session_timeout_minutes: 5,
            idle_timeout_minutes: 5,
            inactivity_cutoff_minutes: 30,
            max_concurrent_sessions: 5,
            two_factor_required: false,
            two_factor_code_expiry_minutes: 10,
            reset_token_expiry_minutes: 60,
            device_inactive_days: 90,
            sso_allowed_domain: None,
        }
    }
}

impl Default for PasswordPolicyConfig {
    fn default() -> Self {
        Self {
            min_length: 8,
            require_uppercase: true,
            require_number: true,
            require_special: false,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Dev,
            service_name: "identity-engine".to_string(),
            log_level: "info".to_string(),
            security: SecurityPolicyConfig::default(),
            password_policy: PasswordPolicyConfig::default(),
            sweep_interval_seconds: 300,
        }
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, SecurityError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(SecurityError::Config(anyhow::anyhow!(format!(
                    "{} is required in production but not set",
                    key
                ))))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(SecurityError::Config(anyhow::anyhow!(format!(
                    "{} is required but not set",
                    key
                ))))
            }
        }
    }
}

fn parse_env<T>(key: &str, default: &str, is_prod: bool) -> Result<T, SecurityError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_env(key, Some(default), is_prod)?.parse().map_err(|e| {
        SecurityError::Config(anyhow::anyhow!("invalid value for {}: {}", key, e))
    })
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_sane() {
        let config = EngineConfig::default();
        assert_eq!(config.security.max_failed_logins, 5);
        assert_eq!(config.security.lockout_duration_minutes, 10);
        assert_eq!(config.security.session_timeout_minutes, 5);
        assert_eq!(config.security.max_concurrent_sessions, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_max_failed_logins() {
        let mut config = EngineConfig::default();
        config.security.max_failed_logins = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_environment_parses_case_insensitively() {
        assert_eq!("DEV".parse::<Environment>().unwrap(), Environment::Dev);
        assert_eq!("prod".parse::<Environment>().unwrap(), Environment::Prod);
        assert!("staging".parse::<Environment>().is_err());
    }
}
