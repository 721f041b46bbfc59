//! Input validation for subscribe requests.

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("invalid Solana address: {0}")]
    InvalidAddress(String),
    #[error("threshold must be a positive number")]
    InvalidThreshold,
    #[error("check interval must be a positive number of seconds")]
    InvalidInterval,
    #[error("invalid phone number format, expected E.164 (e.g. +14155550100)")]
    InvalidPhone,
    #[error("invalid email format")]
    InvalidEmail,
}

/// Structural check for a base58-encoded Solana account address.
/// No cryptographic validation, the balance source rejects addresses
/// that do not exist on chain.
pub fn is_valid_address(address: &str) -> bool {
    const BASE58: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";
    (32..=44).contains(&address.len()) && address.chars().all(|c| BASE58.contains(c))
}

/// E.164 phone number: '+' then 2-15 digits, first digit nonzero.
pub fn is_valid_phone(phone: &str) -> bool {
    let Some(digits) = phone.strip_prefix('+') else {
        return false;
    };
    (2..=15).contains(&digits.len())
        && digits.starts_with(|c: char| ('1'..='9').contains(&c))
        && digits.chars().all(|c| c.is_ascii_digit())
}

/// Structural email check: one '@', non-empty local part, dotted domain.
pub fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let mut parts = email.splitn(2, '@');
    let (Some(local), Some(domain)) = (parts.next(), parts.next()) else {
        return false;
    };
    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return false;
    }
    domain.split('.').count() >= 2 && domain.split('.').all(|label| !label.is_empty())
}

/// Validate the fields of a subscribe request.
pub fn validate_subscription(
    address: &str,
    threshold: f64,
    check_interval_secs: i64,
) -> Result<(), ValidationError> {
    if !is_valid_address(address) {
        return Err(ValidationError::InvalidAddress(address.to_string()));
    }
    if !threshold.is_finite() || threshold <= 0.0 {
        return Err(ValidationError::InvalidThreshold);
    }
    if check_interval_secs <= 0 {
        return Err(ValidationError::InvalidInterval);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_valid_address() {
        assert!(is_valid_address("9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM"));
        assert!(!is_valid_address("short"));
        // 'l' and '0' are not in the base58 alphabet
        assert!(!is_valid_address("l0000000000000000000000000000000000"));
        assert!(!is_valid_address(""));
    }

    #[test]
    fn test_valid_phone() {
        assert!(is_valid_phone("+14155550100"));
        assert!(is_valid_phone("+821012345678"));
        assert!(!is_valid_phone("14155550100"));
        assert!(!is_valid_phone("+0123"));
        assert!(!is_valid_phone("+1 415 555 0100"));
        assert!(!is_valid_phone("+"));
    }

    #[test]
    fn test_valid_email() {
        assert!(is_valid_email("user@example.com"));
        assert!(is_valid_email("a.b+c@mail.example.org"));
        assert!(!is_valid_email("user@nodot"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("user@@example.com"));
        assert!(!is_valid_email("user @example.com"));
    }

    #[test]
    fn test_validate_subscription() {
        let address = "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM";
        assert!(validate_subscription(address, 5.0, 900).is_ok());
        assert_eq!(
            validate_subscription(address, 0.0, 900),
            Err(ValidationError::InvalidThreshold)
        );
        assert_eq!(
            validate_subscription(address, f64::NAN, 900),
            Err(ValidationError::InvalidThreshold)
        );
        assert_eq!(
            validate_subscription(address, 5.0, 0),
            Err(ValidationError::InvalidInterval)
        );
        assert_eq!(
            validate_subscription("nope", 5.0, 900),
            Err(ValidationError::InvalidAddress("nope".to_string()))
        );
    }
}
