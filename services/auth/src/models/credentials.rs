//! Login credentials value object

use std::fmt;

use crate::validation;

/// Validated, normalized login credentials
///
/// Transient: built per request, dropped after the password check. The
/// plaintext password is never persisted and the manual `Debug` impl keeps
/// it out of logs.
#[derive(Clone)]
pub struct Credentials {
    email: String,
    password: String,
    remember_me: bool,
}

impl Credentials {
    /// Normalize and validate raw login input
    ///
    /// The email is trimmed and lowercased before the shape check, so
    /// `" Agent@Example.com "` and `"agent@example.com"` address the same
    /// account.
    pub fn new(email: &str, password: &str, remember_me: bool) -> Result<Self, String> {
        let email = email.trim().to_lowercase();
        validation::validate_email(&email)?;
        validation::validate_password(password)?;

        Ok(Self {
            email,
            password: password.to_string(),
            remember_me,
        })
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    /// Whether the caller asked for a persistent session
    pub fn remember_me(&self) -> bool {
        self.remember_me
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("remember_me", &self.remember_me)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_is_normalized() {
        let creds = Credentials::new("  Agent@Deskfront.DEV ", "password123", false).unwrap();
        assert_eq!(creds.email(), "agent@deskfront.dev");
    }

    #[test]
    fn test_malformed_input_rejected() {
        assert!(Credentials::new("not-an-email", "password123", false).is_err());
        assert!(Credentials::new("agent@deskfront.dev", "short", false).is_err());
        assert!(Credentials::new("", "password123", false).is_err());
    }

    #[test]
    fn test_debug_redacts_password() {
        let creds = Credentials::new("agent@deskfront.dev", "password123", true).unwrap();
        let debug = format!("{:?}", creds);
        assert!(!debug.contains("password123"));
        assert!(debug.contains("<redacted>"));
    }
}
