//! Session lifecycle orchestration
//!
//! Composes the rate limiter, password hasher, token issuer, and the user
//! and refresh token stores into the Login, Refresh, Logout, and Me
//! operations. The security-sensitive error merges live here: whichever
//! sub-step produced the distinguishing detail, the caller sees only the
//! merged kind.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AuthError;
use crate::limiter::RateLimiter;
use crate::models::{Credentials, NewRefreshToken, UserProfile, UserStatus};
use crate::password::{PasswordError, PasswordHasher};
use crate::repositories::{RefreshTokenStore, StoreError, UserLookup};
use crate::token::{TokenError, TokenIssuer};

/// Session policy configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Refresh token lifetime for persistent sessions, in seconds
    pub refresh_token_expiry: u64,
    /// Refresh token lifetime when the caller did not ask to be remembered
    pub refresh_token_expiry_short: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            refresh_token_expiry: 604_800,      // 7 days
            refresh_token_expiry_short: 86_400, // 1 day
        }
    }
}

impl SessionConfig {
    /// Create a new SessionConfig from environment variables
    ///
    /// # Environment Variables
    /// - `AUTH_REFRESH_TOKEN_EXPIRY`: Persistent-session refresh TTL in seconds (default: 604800)
    /// - `AUTH_REFRESH_TOKEN_EXPIRY_SHORT`: Short-session refresh TTL in seconds (default: 86400)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let refresh_token_expiry = std::env::var("AUTH_REFRESH_TOKEN_EXPIRY")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.refresh_token_expiry);

        let refresh_token_expiry_short = std::env::var("AUTH_REFRESH_TOKEN_EXPIRY_SHORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.refresh_token_expiry_short);

        Self {
            refresh_token_expiry,
            refresh_token_expiry_short,
        }
    }
}

/// Tokens returned to a successfully authenticated caller
#[derive(Debug, Clone)]
pub struct SessionTokens {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds
    pub access_expires_in: u64,
    /// Refresh token expiry horizon
    pub refresh_expires_at: DateTime<Utc>,
}

/// Session service
pub struct SessionService {
    users: Arc<dyn UserLookup>,
    tokens: Arc<dyn RefreshTokenStore>,
    hasher: PasswordHasher,
    issuer: TokenIssuer,
    limiter: RateLimiter,
    config: SessionConfig,
}

impl SessionService {
    /// Create a new session service from its collaborators
    pub fn new(
        users: Arc<dyn UserLookup>,
        tokens: Arc<dyn RefreshTokenStore>,
        hasher: PasswordHasher,
        issuer: TokenIssuer,
        limiter: RateLimiter,
        config: SessionConfig,
    ) -> Self {
        Self {
            users,
            tokens,
            hasher,
            issuer,
            limiter,
            config,
        }
    }

    /// Authenticate a user and open a session
    ///
    /// `key` is the caller-supplied rate-limit key (typically derived from
    /// the client IP and the claimed account). The limiter is consulted
    /// before anything else, so a blocked key never reaches the user store.
    /// Unknown-account and wrong-password outcomes are indistinguishable to
    /// the caller and each cost one limiter increment; malformed input is
    /// rejected without counting, since no account lookup occurred.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        remember_me: bool,
        key: &str,
    ) -> Result<SessionTokens, AuthError> {
        if self.limiter.is_blocked(key).await {
            return Err(AuthError::RateLimited);
        }

        if !self.limiter.check_limit(key).await {
            warn!("Rate limit exceeded for key {}", key);
            return Err(AuthError::RateLimited);
        }

        let credentials = Credentials::new(email, password, remember_me)
            .map_err(AuthError::InvalidCredentialsFormat)?;

        let user = self
            .users
            .find_by_email(credentials.email())
            .await
            .map_err(storage_error)?;

        let Some(user) = user else {
            self.count_failure(key).await;
            info!("Login failed for unknown account (key {})", key);
            return Err(AuthError::InvalidCredentials);
        };

        let matches = self
            .hasher
            .verify(credentials.password(), &user.password_hash)
            .map_err(hashing_error)?;

        if !matches {
            self.count_failure(key).await;
            info!("Login failed for user {} (key {})", user.id, key);
            return Err(AuthError::InvalidCredentials);
        }

        if user.status != UserStatus::Active {
            // The caller proved possession of the credential; report the
            // generic failure without feeding the limiter, so a suspension
            // is neither distinguishable from a wrong password nor a lever
            // to lock the owner out further.
            info!("Login refused for suspended user {}", user.id);
            return Err(AuthError::InvalidCredentials);
        }

        let access_token = self.issuer.issue_access(&user).map_err(signing_error)?;
        let refresh_secret = self.issuer.issue_refresh_secret().map_err(signing_error)?;

        let ttl = if credentials.remember_me() {
            self.config.refresh_token_expiry
        } else {
            self.config.refresh_token_expiry_short
        };
        let expires_at = Utc::now() + chrono::Duration::seconds(ttl as i64);

        self.tokens
            .create(&NewRefreshToken {
                user_id: user.id,
                token_hash: self.issuer.refresh_token_hash(&refresh_secret),
                expires_at,
            })
            .await
            .map_err(storage_error)?;

        info!("Session opened for user {}", user.id);

        Ok(SessionTokens {
            access_token,
            refresh_token: refresh_secret,
            access_expires_in: self.issuer.access_token_expiry(),
            refresh_expires_at: expires_at,
        })
    }

    /// Exchange a refresh secret for a new access token, rotating the secret
    ///
    /// Absent, expired, and revoked tokens all fail identically. Claims are
    /// re-read from the user store, never trusted from the old record, so a
    /// role change takes effect at the next refresh. The presented secret is
    /// revoked after its replacement is committed; the secret returned here
    /// keeps the original expiry horizon, so rotation never extends a
    /// session.
    pub async fn refresh(&self, refresh_secret: &str) -> Result<SessionTokens, AuthError> {
        let hash = self.issuer.refresh_token_hash(refresh_secret);

        let record = match self.tokens.find_by_hash(&hash).await {
            Ok(record) => record,
            Err(StoreError::NotFound) => return Err(AuthError::InvalidRefreshToken),
            Err(e) => return Err(storage_error(e)),
        };

        if !record.is_usable(Utc::now()) {
            info!("Refresh refused for user {}: token expired or revoked", record.user_id);
            return Err(AuthError::InvalidRefreshToken);
        }

        let user = self
            .users
            .find_by_id(record.user_id)
            .await
            .map_err(storage_error)?;

        // A vanished or suspended owner invalidates the token; which of the
        // three it was is not leaked.
        let Some(user) = user else {
            return Err(AuthError::InvalidRefreshToken);
        };
        if user.status != UserStatus::Active {
            return Err(AuthError::InvalidRefreshToken);
        }

        let access_token = self.issuer.issue_access(&user).map_err(signing_error)?;
        let new_secret = self.issuer.issue_refresh_secret().map_err(signing_error)?;

        self.tokens
            .create(&NewRefreshToken {
                user_id: user.id,
                token_hash: self.issuer.refresh_token_hash(&new_secret),
                expires_at: record.expires_at,
            })
            .await
            .map_err(storage_error)?;

        // Revoke only after the replacement is committed: a crash between
        // the two statements leaves an extra live token, not a locked-out
        // session.
        match self.tokens.revoke(&hash).await {
            Ok(()) | Err(StoreError::NotFound) => {}
            Err(e) => return Err(storage_error(e)),
        }

        info!("Session refreshed for user {}", user.id);

        Ok(SessionTokens {
            access_token,
            refresh_token: new_secret,
            access_expires_in: self.issuer.access_token_expiry(),
            refresh_expires_at: record.expires_at,
        })
    }

    /// Revoke the session matching a refresh secret
    ///
    /// Idempotent success whether the secret maps to a live row, an
    /// already-revoked row, or nothing at all.
    pub async fn logout(&self, refresh_secret: &str) -> Result<(), AuthError> {
        let hash = self.issuer.refresh_token_hash(refresh_secret);

        match self.tokens.revoke(&hash).await {
            Ok(()) => {
                info!("Session revoked");
                Ok(())
            }
            Err(StoreError::NotFound) => Ok(()),
            Err(e) => Err(storage_error(e)),
        }
    }

    /// Revoke every live session for a user, returning the count
    ///
    /// Used for logout-all and credential-compromise response.
    pub async fn logout_all(&self, user_id: Uuid) -> Result<u64, AuthError> {
        let revoked = self
            .tokens
            .revoke_all_for_user(user_id)
            .await
            .map_err(storage_error)?;

        info!("Revoked {} session(s) for user {}", revoked, user_id);
        Ok(revoked)
    }

    /// Read the public profile of an authenticated user
    ///
    /// `NotFound` here means the account vanished after the access token was
    /// issued; the client must re-authenticate.
    pub async fn me(&self, user_id: Uuid) -> Result<UserProfile, AuthError> {
        let user = self
            .users
            .find_by_id(user_id)
            .await
            .map_err(storage_error)?;

        user.map(UserProfile::from).ok_or(AuthError::NotFound)
    }

    /// Count a failed attempt and escalate to a lockout past the threshold
    async fn count_failure(&self, key: &str) {
        let attempts = self.limiter.increment(key).await;
        let config = self.limiter.config();

        if attempts >= config.lockout_threshold {
            self.limiter
                .block(key, config.lockout_duration, "brute_force")
                .await;
        }
    }
}

fn storage_error(e: StoreError) -> AuthError {
    AuthError::Storage(e.to_string())
}

fn hashing_error(e: PasswordError) -> AuthError {
    AuthError::Hashing(e.to_string())
}

fn signing_error(e: TokenError) -> AuthError {
    AuthError::Signing(e.to_string())
}
