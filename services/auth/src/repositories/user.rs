//! User lookups
//!
//! User CRUD belongs to the account service; this service only ever reads
//! users to authenticate them, so the capability is lookup-only.

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::StoreError;
use crate::models::User;

/// Read-only user lookup capability
#[async_trait]
pub trait UserLookup: Send + Sync {
    /// Find a user by normalized email
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    /// Find a user by ID
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;
}

/// Postgres-backed user repository
#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    /// Create a new user repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_user(row: sqlx::postgres::PgRow) -> User {
        User {
            id: row.get("id"),
            email: row.get("email"),
            password_hash: row.get("password_hash"),
            role: row.get("role"),
            status: row.get("status"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }
}

#[async_trait]
impl UserLookup for PgUserRepository {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, email, password_hash, role, status, created_at, updated_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Self::row_to_user))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, email, password_hash, role, status, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Self::row_to_user))
    }
}
