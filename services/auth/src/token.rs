//! Token issuance and validation
//!
//! Access tokens are short-lived HS256 JWTs signed with a server secret.
//! Refresh tokens are opaque random secrets: the plaintext is handed to the
//! caller exactly once and only its keyed digest (`sha256(salt || secret)`)
//! is ever stored or looked up.

use anyhow::Result;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Role, User};

/// Number of random bytes in a refresh secret (256 bits of entropy)
const REFRESH_SECRET_BYTES: usize = 32;

/// Errors from the token component
#[derive(Error, Debug)]
pub enum TokenError {
    /// Signing primitive failed; unexpected and fatal
    #[error("Token signing failed: {0}")]
    Signing(String),

    /// Entropy source failed while drawing a refresh secret
    #[error("Entropy source failure: {0}")]
    Entropy(String),

    /// Token expiry is in the past
    #[error("Token has expired")]
    Expired,

    /// Signature does not verify against the server secret
    #[error("Token signature is invalid")]
    InvalidSignature,

    /// Token is not a structurally valid JWT
    #[error("Token is malformed")]
    Malformed,
}

/// Token configuration
#[derive(Debug, Clone)]
pub struct TokenConfig {
    /// Server secret for signing access tokens
    pub secret: String,
    /// Server-side salt mixed into stored refresh token digests
    pub refresh_salt: String,
    /// Access token expiration time in seconds (default: 15 minutes)
    pub access_token_expiry: u64,
}

impl TokenConfig {
    /// Create a new TokenConfig from environment variables
    ///
    /// # Environment Variables
    /// - `AUTH_TOKEN_SECRET`: Server secret for signing access tokens
    /// - `AUTH_REFRESH_SALT`: Salt mixed into stored refresh token digests
    /// - `AUTH_ACCESS_TOKEN_EXPIRY`: Access token expiry in seconds (default: 900)
    pub fn from_env() -> Result<Self> {
        let secret = std::env::var("AUTH_TOKEN_SECRET")
            .map_err(|_| anyhow::anyhow!("AUTH_TOKEN_SECRET environment variable not set"))?;

        let refresh_salt = std::env::var("AUTH_REFRESH_SALT")
            .map_err(|_| anyhow::anyhow!("AUTH_REFRESH_SALT environment variable not set"))?;

        let access_token_expiry = std::env::var("AUTH_ACCESS_TOKEN_EXPIRY")
            .unwrap_or_else(|_| "900".to_string()) // 15 minutes
            .parse()
            .unwrap_or(900);

        Ok(TokenConfig {
            secret,
            refresh_salt,
            access_token_expiry,
        })
    }
}

/// Claims carried by an access token; never persisted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// User ID
    pub sub: Uuid,
    /// User email at issuance time
    pub email: String,
    /// User role at issuance time
    pub role: Role,
    /// Issued at time
    pub iat: u64,
    /// Expiration time
    pub exp: u64,
}

/// Token issuer and validator
#[derive(Clone)]
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    config: TokenConfig,
}

impl TokenIssuer {
    /// Initialize a new token issuer
    pub fn new(config: TokenConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());
        let mut validation = Validation::new(jsonwebtoken::Algorithm::HS256);
        validation.validate_exp = true;
        // Expiry is exact; the default 60s leeway would keep dead tokens
        // alive past their horizon.
        validation.leeway = 0;

        Self {
            encoding_key,
            decoding_key,
            validation,
            config,
        }
    }

    /// Issue a signed access token for a user
    pub fn issue_access(&self, user: &User) -> Result<String, TokenError> {
        let now = unix_now()?;
        self.issue_access_at(user, now, now + self.config.access_token_expiry)
    }

    fn issue_access_at(&self, user: &User, iat: u64, exp: u64) -> Result<String, TokenError> {
        let claims = AccessClaims {
            sub: user.id,
            email: user.email.clone(),
            role: user.role,
            iat,
            exp,
        };

        encode(
            &Header::new(jsonwebtoken::Algorithm::HS256),
            &claims,
            &self.encoding_key,
        )
        .map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// Validate an access token and return its claims
    ///
    /// No claims value is returned on any failure path.
    pub fn validate_access(&self, token: &str) -> Result<AccessClaims, TokenError> {
        match decode::<AccessClaims>(token, &self.decoding_key, &self.validation) {
            Ok(data) => Ok(data.claims),
            Err(e) => match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => Err(TokenError::Expired),
                jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                    Err(TokenError::InvalidSignature)
                }
                _ => Err(TokenError::Malformed),
            },
        }
    }

    /// Draw a fresh opaque refresh secret from OS entropy
    pub fn issue_refresh_secret(&self) -> Result<String, TokenError> {
        let mut buffer = [0u8; REFRESH_SECRET_BYTES];
        OsRng
            .try_fill_bytes(&mut buffer)
            .map_err(|e| TokenError::Entropy(e.to_string()))?;
        Ok(hex::encode(buffer))
    }

    /// Compute the storage digest of a refresh secret
    ///
    /// The server-side salt keys the digest, so a leaked table of hashes
    /// cannot be matched against candidate secrets without the salt.
    pub fn refresh_token_hash(&self, secret: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.config.refresh_salt.as_bytes());
        hasher.update(secret.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Get the access token expiry time in seconds
    pub fn access_token_expiry(&self) -> u64 {
        self.config.access_token_expiry
    }
}

fn unix_now() -> Result<u64, TokenError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|e| TokenError::Signing(format!("system clock before epoch: {}", e)))
}
