//! Password policy validation.
//!
//! Validates candidate passwords against the organization's policy.

use crate::config::PasswordPolicyConfig;

/// Errors related to password policy validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyError {
    /// Password is too short.
    PasswordTooShort {
        min_length: u8,
        actual_length: usize,
    },
    /// Password missing uppercase letter.
    PasswordMissingUppercase,
    /// Password missing number.
    PasswordMissingNumber,
    /// Password missing special character.
    PasswordMissingSpecial,
}

impl std::fmt::Display for PolicyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PolicyError::PasswordTooShort {
                min_length,
                actual_length,
            } => {
                write!(
                    f,
                    "Password must be at least {} characters (got {})",
                    min_length, actual_length
                )
            }
            PolicyError::PasswordMissingUppercase => {
                write!(f, "Password must contain at least one uppercase letter")
            }
            PolicyError::PasswordMissingNumber => {
                write!(f, "Password must contain at least one number")
            }
            PolicyError::PasswordMissingSpecial => {
                write!(f, "Password must contain at least one special character")
            }
        }
    }
}

impl std::error::Error for PolicyError {}

fn is_special(c: char) -> bool {
    matches!(
        c,
        '!' | '@'
            | '#'
            | '$'
            | '%'
            | '^'
            | '&'
            | '*'
            | '('
            | ')'
            | '-'
            | '_'
            | '='
            | '+'
            | '['
            | ']'
            | '{'
            | '}'
            | '|'
            | '\\'
            | ';'
            | ':'
            | '\''
            | '"'
            | ','
            | '.'
            | '<'
            | '>'
            | '/'
            | '?'
            | '`'
            | '~'
    )
}

/// Password policy validation service.
#[derive(Debug, Clone)]
pub struct PasswordPolicy;

impl PasswordPolicy {
    /// Validate a password against the policy, returning the first
    /// violation found.
    pub fn validate(password: &str, policy: &PasswordPolicyConfig) -> Result<(), PolicyError> {
        if password.len() < policy.min_length as usize {
            return Err(PolicyError::PasswordTooShort {
                min_length: policy.min_length,
                actual_length: password.len(),
            });
        }

        if policy.require_uppercase && !password.chars().any(|c| c.is_ascii_uppercase()) {
            return Err(PolicyError::PasswordMissingUppercase);
        }

        if policy.require_number && !password.chars().any(|c| c.is_ascii_digit()) {
            return Err(PolicyError::PasswordMissingNumber);
        }

        if policy.require_special && !password.chars().any(is_special) {
            return Err(PolicyError::PasswordMissingSpecial);
        }

        Ok(())
    }

    /// Validate all requirements and return every violation, for callers
    /// that want to show the user the full list at once.
    pub fn validate_all(password: &str, policy: &PasswordPolicyConfig) -> Vec<PolicyError> {
        let mut errors = Vec::new();

        if password.len() < policy.min_length as usize {
            errors.push(PolicyError::PasswordTooShort {
                min_length: policy.min_length,
                actual_length: password.len(),
            });
        }

        if policy.require_uppercase && !password.chars().any(|c| c.is_ascii_uppercase()) {
            errors.push(PolicyError::PasswordMissingUppercase);
        }

        if policy.require_number && !password.chars().any(|c| c.is_ascii_digit()) {
            errors.push(PolicyError::PasswordMissingNumber);
        }

        if policy.require_special && !password.chars().any(is_special) {
            errors.push(PolicyError::PasswordMissingSpecial);
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strict_policy() -> PasswordPolicyConfig {
        PasswordPolicyConfig {
            min_length: 12,
            require_uppercase: true,
            require_number: true,
            require_special: true,
        }
    }

    fn lenient_policy() -> PasswordPolicyConfig {
        PasswordPolicyConfig {
            min_length: 1,
            require_uppercase: false,
            require_number: false,
            require_special: false,
        }
    }

    #[test]
    fn test_password_too_short() {
        let result = PasswordPolicy::validate("Short1!", &strict_policy());
        assert!(matches!(result, Err(PolicyError::PasswordTooShort { .. })));
    }

    #[test]
    fn test_password_missing_uppercase() {
        let result = PasswordPolicy::validate("longenoughpassword1!", &strict_policy());
        assert!(matches!(result, Err(PolicyError::PasswordMissingUppercase)));
    }

    #[test]
    fn test_password_missing_number() {
        let result = PasswordPolicy::validate("LongEnoughPassword!", &strict_policy());
        assert!(matches!(result, Err(PolicyError::PasswordMissingNumber)));
    }

    #[test]
    fn test_password_missing_special() {
        let result = PasswordPolicy::validate("LongEnoughPassword1", &strict_policy());
        assert!(matches!(result, Err(PolicyError::PasswordMissingSpecial)));
    }

    #[test]
    fn test_valid_password_strict() {
        assert!(PasswordPolicy::validate("LongEnoughP@ss1", &strict_policy()).is_ok());
    }

    #[test]
    fn test_valid_password_lenient() {
        assert!(PasswordPolicy::validate("simple", &lenient_policy()).is_ok());
    }

    #[test]
    fn test_validate_all_returns_multiple_errors() {
        let errors = PasswordPolicy::validate_all("short", &strict_policy());
        assert_eq!(errors.len(), 4);
    }
}
