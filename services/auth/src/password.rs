//! Password hashing and verification
//!
//! Argon2id with a fixed work factor from configuration. Digests are PHC
//! strings carrying their own salt and parameters, so verification works
//! across work-factor changes. Plaintext passwords only ever live on the
//! stack of these two functions and are never logged.

use anyhow::Result;
use argon2::{
    Algorithm, Argon2, Params, PasswordHash, PasswordVerifier, Version,
    password_hash::SaltString,
};
use argon2::PasswordHasher as _;
use thiserror::Error;

/// Errors from the hashing component
///
/// A wrong password is not an error: `verify` reports it as `Ok(false)`.
#[derive(Error, Debug)]
pub enum PasswordError {
    /// Empty password or digest input
    #[error("Password input must not be empty")]
    EmptyInput,

    /// The stored digest does not parse as a PHC string
    #[error("Malformed password digest: {0}")]
    MalformedDigest(String),

    /// The hashing primitive itself failed; unexpected and fatal
    #[error("Password hashing failed: {0}")]
    Hashing(String),
}

/// Work factor configuration
#[derive(Debug, Clone)]
pub struct PasswordConfig {
    /// Memory cost in KiB
    pub memory_kib: u32,
    /// Number of iterations
    pub iterations: u32,
    /// Degree of parallelism
    pub parallelism: u32,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        // Targets tens of milliseconds per hash on current server hardware.
        Self {
            memory_kib: 19_456,
            iterations: 2,
            parallelism: 1,
        }
    }
}

impl PasswordConfig {
    /// Create a new PasswordConfig from environment variables
    ///
    /// # Environment Variables
    /// - `AUTH_ARGON2_MEMORY_KIB`: Memory cost in KiB (default: 19456)
    /// - `AUTH_ARGON2_ITERATIONS`: Iteration count (default: 2)
    /// - `AUTH_ARGON2_PARALLELISM`: Lanes (default: 1)
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let memory_kib = std::env::var("AUTH_ARGON2_MEMORY_KIB")
            .unwrap_or_else(|_| defaults.memory_kib.to_string())
            .parse()
            .unwrap_or(defaults.memory_kib);

        let iterations = std::env::var("AUTH_ARGON2_ITERATIONS")
            .unwrap_or_else(|_| defaults.iterations.to_string())
            .parse()
            .unwrap_or(defaults.iterations);

        let parallelism = std::env::var("AUTH_ARGON2_PARALLELISM")
            .unwrap_or_else(|_| defaults.parallelism.to_string())
            .parse()
            .unwrap_or(defaults.parallelism);

        Ok(PasswordConfig {
            memory_kib,
            iterations,
            parallelism,
        })
    }
}

/// Password hasher with a fixed work factor
#[derive(Clone)]
pub struct PasswordHasher {
    argon2: Argon2<'static>,
}

impl PasswordHasher {
    /// Create a new hasher from the given work factor
    pub fn new(config: &PasswordConfig) -> Result<Self, PasswordError> {
        let params = Params::new(config.memory_kib, config.iterations, config.parallelism, None)
            .map_err(|e| PasswordError::Hashing(e.to_string()))?;

        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }

    /// Hash a plaintext password into a PHC digest string
    pub fn hash(&self, password: &str) -> Result<String, PasswordError> {
        if password.is_empty() {
            return Err(PasswordError::EmptyInput);
        }

        let salt = SaltString::generate(&mut rand::thread_rng());
        let digest = self
            .argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| PasswordError::Hashing(e.to_string()))?
            .to_string();

        Ok(digest)
    }

    /// Verify a plaintext password against a stored digest
    ///
    /// Returns `Ok(false)` for a well-formed digest that does not match, and
    /// `MalformedDigest` only when the digest itself does not parse.
    pub fn verify(&self, password: &str, digest: &str) -> Result<bool, PasswordError> {
        if password.is_empty() || digest.is_empty() {
            return Err(PasswordError::EmptyInput);
        }

        let parsed = PasswordHash::new(digest)
            .map_err(|e| PasswordError::MalformedDigest(e.to_string()))?;

        match self.argon2.verify_password(password.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(PasswordError::Hashing(e.to_string())),
        }
    }
}
