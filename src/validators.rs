/// Input validators for signup and login fields
///
/// Every validator trims its input and returns the trimmed value on success.
/// Emails are also lower-cased, so addresses differing only in case name the
/// same account.
/// 1. DoS Protection: Input length limits
/// 2. Phishing Protection: Email validation

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::ValidationError;

const MAX_EMAIL_LENGTH: usize = 254; // RFC 5321
const MIN_EMAIL_LENGTH: usize = 5;
const MIN_NAME_LENGTH: usize = 3;
const MAX_NAME_LENGTH: usize = 256;
const MIN_PASSWORD_LENGTH: usize = 4;
const MAX_PASSWORD_LENGTH: usize = 72; // bcrypt only reads the first 72 bytes

lazy_static! {
    // RFC 5322 simplified email regex (practical validation)
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)+$"
    ).unwrap();
}

/// Validates an email address
pub fn is_valid_email(email: &str) -> Result<String, ValidationError> {
    let trimmed = email.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField("email".to_string()));
    }

    if trimmed.len() < MIN_EMAIL_LENGTH {
        return Err(ValidationError::TooShort("email".to_string(), MIN_EMAIL_LENGTH));
    }

    if trimmed.len() > MAX_EMAIL_LENGTH {
        return Err(ValidationError::TooLong("email".to_string(), MAX_EMAIL_LENGTH));
    }

    if !EMAIL_REGEX.is_match(trimmed) || has_suspicious_email_patterns(trimmed) {
        return Err(ValidationError::InvalidFormat("email".to_string()));
    }

    Ok(trimmed.to_lowercase())
}

/// Validates a display name
pub fn is_valid_name(name: &str) -> Result<String, ValidationError> {
    let trimmed = name.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField("name".to_string()));
    }

    if trimmed.chars().count() < MIN_NAME_LENGTH {
        return Err(ValidationError::TooShort("name".to_string(), MIN_NAME_LENGTH));
    }

    if trimmed.len() > MAX_NAME_LENGTH {
        return Err(ValidationError::TooLong("name".to_string(), MAX_NAME_LENGTH));
    }

    if has_suspicious_name_patterns(trimmed) {
        return Err(ValidationError::SuspiciousContent("name".to_string()));
    }

    Ok(trimmed.to_string())
}

/// Validates a password for signup or login
pub fn is_valid_password(password: &str) -> Result<String, ValidationError> {
    let trimmed = password.trim();

    if trimmed.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(ValidationError::TooShort("Password".to_string(), MIN_PASSWORD_LENGTH));
    }

    if trimmed.len() > MAX_PASSWORD_LENGTH {
        return Err(ValidationError::TooLong("Password".to_string(), MAX_PASSWORD_LENGTH));
    }

    Ok(trimmed.to_string())
}

fn has_suspicious_email_patterns(email: &str) -> bool {
    if let Some(at_pos) = email.find('@') {
        if at_pos > 64 {
            return true;
        }
    }

    email.matches('@').count() != 1 || email.contains('\0')
}

fn has_suspicious_name_patterns(name: &str) -> bool {
    if name.chars().any(|c| c.is_control()) {
        return true;
    }

    let special_char_count = name
        .chars()
        .filter(|c| {
            !c.is_alphanumeric() && !c.is_whitespace() && !matches!(c, '-' | '.' | '_' | '\'')
        })
        .count();

    special_char_count > 5
}
