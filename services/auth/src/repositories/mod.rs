//! Repositories for database operations
//!
//! Each store is a capability trait with a Postgres implementation; the
//! session service only sees the traits, so tests swap in in-memory fakes.

pub mod refresh_token;
pub mod user;

pub use refresh_token::{PgRefreshTokenStore, RefreshTokenStore};
pub use user::{PgUserRepository, UserLookup};

use thiserror::Error;

/// Errors from the backing stores
#[derive(Error, Debug)]
pub enum StoreError {
    /// No record matches the lookup
    #[error("Record not found")]
    NotFound,

    /// A uniqueness constraint was violated
    #[error("Record already exists")]
    AlreadyExists,

    /// The store itself failed
    #[error("Storage unavailable: {0}")]
    Unavailable(#[source] sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::AlreadyExists,
            _ => StoreError::Unavailable(e),
        }
    }
}
