//! Input validation utilities

use regex::Regex;
use std::sync::OnceLock;

/// Maximum accepted password length; bounds the argon2 work per request
pub const MAX_PASSWORD_LENGTH: usize = 128;

/// Minimum accepted password length
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Validate email shape
pub fn validate_email(email: &str) -> Result<(), String> {
    if email.is_empty() {
        return Err("Email is required".to_string());
    }

    if email.len() > 254 {
        return Err("Email must be at most 254 characters long".to_string());
    }

    static EMAIL_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = EMAIL_REGEX.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
            .expect("Failed to compile email regex")
    });

    if !regex.is_match(email) {
        return Err("Invalid email format".to_string());
    }

    Ok(())
}

/// Validate password shape for login
///
/// Only length is checked here. Complexity rules apply when a password is
/// set, not when it is presented; a login must accept whatever was accepted
/// at registration time.
pub fn validate_password(password: &str) -> Result<(), String> {
    if password.is_empty() {
        return Err("Password is required".to_string());
    }

    if password.len() < MIN_PASSWORD_LENGTH {
        return Err(format!(
            "Password must be at least {} characters long",
            MIN_PASSWORD_LENGTH
        ));
    }

    if password.len() > MAX_PASSWORD_LENGTH {
        return Err(format!(
            "Password must be at most {} characters long",
            MAX_PASSWORD_LENGTH
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_email_accepts_common_shapes() {
        assert!(validate_email("agent@deskfront.dev").is_ok());
        assert!(validate_email("first.last+tag@sub.example.co").is_ok());
    }

    #[test]
    fn test_validate_email_rejects_malformed() {
        assert!(validate_email("").is_err());
        assert!(validate_email("no-at-sign").is_err());
        assert!(validate_email("missing@tld").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email(&format!("{}@example.com", "a".repeat(255))).is_err());
    }

    #[test]
    fn test_validate_password_length_bounds() {
        assert!(validate_password("").is_err());
        assert!(validate_password("short").is_err());
        assert!(validate_password("long enough").is_ok());
        assert!(validate_password(&"x".repeat(MAX_PASSWORD_LENGTH)).is_ok());
        assert!(validate_password(&"x".repeat(MAX_PASSWORD_LENGTH + 1)).is_err());
    }
}
