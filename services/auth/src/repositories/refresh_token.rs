//! Refresh token ledger
//!
//! A dumb ledger keyed by token digest. The store records and retrieves
//! rows; whether a token is expired or revoked is judged by the session
//! service, which keeps the security policy in one place.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::StoreError;
use crate::models::{NewRefreshToken, RefreshToken};

/// Durable, hash-indexed refresh token storage
#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    /// Persist a new token row
    ///
    /// Fails with `AlreadyExists` if the digest collides with a stored one;
    /// collisions are astronomically unlikely and treated as a hard error,
    /// not retried.
    async fn create(&self, token: &NewRefreshToken) -> Result<RefreshToken, StoreError>;

    /// Look up a row by token digest; `NotFound` if absent
    async fn find_by_hash(&self, token_hash: &str) -> Result<RefreshToken, StoreError>;

    /// Revoke the row with this digest
    ///
    /// Idempotent: re-revoking keeps the original revocation timestamp and
    /// succeeds. Fails with `NotFound` only for a digest that was never
    /// stored.
    async fn revoke(&self, token_hash: &str) -> Result<(), StoreError>;

    /// Revoke every non-revoked row for a user, returning the count
    ///
    /// Best-effort with respect to a concurrent `create` for the same user:
    /// a token created mid-revocation may come out either revoked or live.
    /// Logout-all is a courtesy sweep, not a hard security boundary, so the
    /// contention cost of making this linearizable is not paid.
    async fn revoke_all_for_user(&self, user_id: Uuid) -> Result<u64, StoreError>;
}

/// Postgres-backed refresh token store
#[derive(Clone)]
pub struct PgRefreshTokenStore {
    pool: PgPool,
}

impl PgRefreshTokenStore {
    /// Create a new refresh token store
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_token(row: sqlx::postgres::PgRow) -> RefreshToken {
        RefreshToken {
            id: row.get("id"),
            user_id: row.get("user_id"),
            token_hash: row.get("token_hash"),
            expires_at: row.get("expires_at"),
            created_at: row.get("created_at"),
            revoked_at: row.get("revoked_at"),
        }
    }
}

#[async_trait]
impl RefreshTokenStore for PgRefreshTokenStore {
    async fn create(&self, token: &NewRefreshToken) -> Result<RefreshToken, StoreError> {
        // Single INSERT: a row is either fully committed and findable by
        // hash, or absent. No half-written rows on cancellation.
        let row = sqlx::query(
            r#"
            INSERT INTO refresh_tokens (user_id, token_hash, expires_at)
            VALUES ($1, $2, $3)
            RETURNING id, user_id, token_hash, expires_at, created_at, revoked_at
            "#,
        )
        .bind(token.user_id)
        .bind(&token.token_hash)
        .bind(token.expires_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(Self::row_to_token(row))
    }

    async fn find_by_hash(&self, token_hash: &str) -> Result<RefreshToken, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, token_hash, expires_at, created_at, revoked_at
            FROM refresh_tokens
            WHERE token_hash = $1
            "#,
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_token).ok_or(StoreError::NotFound)
    }

    async fn revoke(&self, token_hash: &str) -> Result<(), StoreError> {
        // COALESCE keeps the first revocation timestamp, making re-revocation
        // a no-op success.
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked_at = COALESCE(revoked_at, $2)
            WHERE token_hash = $1
            "#,
        )
        .bind(token_hash)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }

        Ok(())
    }

    async fn revoke_all_for_user(&self, user_id: Uuid) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked_at = $2
            WHERE user_id = $1 AND revoked_at IS NULL
            "#,
        )
        .bind(user_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
