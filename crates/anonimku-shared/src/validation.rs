//! Input rules enforced at sign-in and when sending messages.

use crate::constants::{MAX_NAME_LEN, MIN_PHONE_LEN};
use crate::error::ValidationError;

/// Validate a phone number and return the form that gets stored.
///
/// Accepts an optional leading `+` followed by at least [`MIN_PHONE_LEN`]
/// characters drawn from digits, spaces, `-`, `(` and `)`.
pub fn validate_phone(raw: &str) -> Result<String, ValidationError> {
    let phone = raw.trim();
    let body = phone.strip_prefix('+').unwrap_or(phone);

    let allowed = |c: char| c.is_ascii_digit() || matches!(c, ' ' | '-' | '(' | ')');
    if body.chars().count() < MIN_PHONE_LEN || !body.chars().all(allowed) {
        return Err(ValidationError::InvalidPhone { min: MIN_PHONE_LEN });
    }

    Ok(phone.to_string())
}

pub fn validate_name(raw: &str) -> Result<String, ValidationError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(ValidationError::EmptyName);
    }
    let len = name.chars().count();
    if len > MAX_NAME_LEN {
        return Err(ValidationError::NameTooLong { len, max: MAX_NAME_LEN });
    }
    Ok(name.to_string())
}

/// Trim message content and check it against `max_len` characters.
pub fn validate_content(raw: &str, max_len: usize) -> Result<String, ValidationError> {
    let content = raw.trim();
    if content.is_empty() {
        return Err(ValidationError::EmptyContent);
    }
    let len = content.chars().count();
    if len > max_len {
        return Err(ValidationError::ContentTooLong { len, max: max_len });
    }
    Ok(content.to_string())
}
