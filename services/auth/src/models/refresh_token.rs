//! Refresh token ledger row

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// Refresh token entity
///
/// `token_hash` is the keyed digest of the opaque secret; the plaintext is
/// returned to the caller once at creation and never stored. Rows are
/// revoked, never deleted, so the ledger doubles as an audit trail.
#[derive(Debug, Clone, FromRow)]
pub struct RefreshToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl RefreshToken {
    /// Check if the token has been revoked
    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }

    /// Check if the token is usable for authentication at `now`
    ///
    /// Usable means not revoked and not past its expiry. The store does not
    /// make this judgment; the session service does, here.
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.revoked_at.is_none() && now < self.expires_at
    }
}

/// New refresh token creation payload
#[derive(Debug, Clone)]
pub struct NewRefreshToken {
    pub user_id: Uuid,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn token(expires_in: i64, revoked: bool) -> RefreshToken {
        let now = Utc::now();
        RefreshToken {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            token_hash: "digest".to_string(),
            expires_at: now + Duration::seconds(expires_in),
            created_at: now,
            revoked_at: revoked.then_some(now),
        }
    }

    #[test]
    fn test_live_token_is_usable() {
        assert!(token(3600, false).is_usable(Utc::now()));
    }

    #[test]
    fn test_expired_token_is_not_usable_even_if_unrevoked() {
        let t = token(3600, false);
        // Queried an hour past its one-hour expiry.
        assert!(!t.is_usable(Utc::now() + Duration::hours(2)));
        assert!(!t.is_revoked());
    }

    #[test]
    fn test_revoked_token_is_not_usable_before_expiry() {
        let t = token(3600, true);
        assert!(t.is_revoked());
        assert!(!t.is_usable(Utc::now()));
    }
}
