//! Authentication service routes
//!
//! Thin HTTP shell over the session service: request decoding, the optional
//! CAPTCHA gate, rate-limit key derivation, and status mapping. All session
//! policy lives in `session`.

use axum::{
    Extension, Json, Router,
    extract::{ConnectInfo, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tracing::error;

use crate::{AppState, errors::AuthError, session::SessionTokens, token::AccessClaims};

/// Request for user login
#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub remember_me: bool,
    pub captcha_token: Option<String>,
}

/// Response carrying a fresh token pair
#[derive(Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: u64,
    pub refresh_expires_at: DateTime<Utc>,
}

impl From<SessionTokens> for TokenResponse {
    fn from(tokens: SessionTokens) -> Self {
        Self {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: tokens.access_expires_in,
            refresh_expires_at: tokens.refresh_expires_at,
        }
    }
}

/// Request carrying a refresh token
#[derive(Deserialize)]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

/// Response for logout-all
#[derive(Serialize)]
pub struct LogoutAllResponse {
    pub revoked: u64,
}

/// Create the router for the authentication service
pub fn create_router(state: AppState) -> Router {
    let authenticated = Router::new()
        .route("/auth/me", get(me))
        .route("/auth/logout-all", post(logout_all))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            crate::middleware::auth_middleware,
        ));

    Router::new()
        .route("/health", get(health_check))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/auth/logout", post(logout))
        .merge(authenticated)
        .with_state(state)
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let database_up = common::database::health_check(&state.db_pool)
        .await
        .unwrap_or(false);
    let status = if database_up { "ok" } else { "degraded" };

    Json(serde_json::json!({
        "status": status,
        "service": "auth-service"
    }))
}

/// User login endpoint
pub async fn login(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, AuthError> {
    // CAPTCHA runs before the session core is invoked; the core itself is
    // agnostic to whether the gate was configured. Provider outages fail
    // closed.
    if let Some(captcha) = &state.captcha {
        let token = payload.captcha_token.as_deref().unwrap_or_default();
        let valid = captcha.verify(token).await.unwrap_or_else(|e| {
            error!("CAPTCHA provider error: {}", e);
            false
        });
        if !valid {
            return Err(AuthError::InvalidCredentialsFormat(
                "CAPTCHA verification failed".to_string(),
            ));
        }
    }

    let key = rate_limit_key(addr, &payload.email);
    let session = state
        .session
        .login(&payload.email, &payload.password, payload.remember_me, &key)
        .await?;

    Ok((StatusCode::OK, Json(TokenResponse::from(session))))
}

/// Refresh token endpoint; rotates the refresh secret
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshTokenRequest>,
) -> Result<impl IntoResponse, AuthError> {
    let session = state.session.refresh(&payload.refresh_token).await?;
    Ok((StatusCode::OK, Json(TokenResponse::from(session))))
}

/// Logout endpoint; idempotent
pub async fn logout(
    State(state): State<AppState>,
    Json(payload): Json<RefreshTokenRequest>,
) -> Result<impl IntoResponse, AuthError> {
    state.session.logout(&payload.refresh_token).await?;

    Ok((
        StatusCode::OK,
        Json(serde_json::json!({"message": "Logged out successfully"})),
    ))
}

/// Revoke every session of the authenticated user
pub async fn logout_all(
    State(state): State<AppState>,
    Extension(claims): Extension<AccessClaims>,
) -> Result<impl IntoResponse, AuthError> {
    let revoked = state.session.logout_all(claims.sub).await?;
    Ok((StatusCode::OK, Json(LogoutAllResponse { revoked })))
}

/// Public profile of the authenticated user
pub async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<AccessClaims>,
) -> Result<impl IntoResponse, AuthError> {
    let profile = state.session.me(claims.sub).await?;
    Ok((StatusCode::OK, Json(profile)))
}

/// Derive the abuse key for a login attempt
///
/// Scoped to client IP plus the claimed account, so an attacker sweeping one
/// account from many addresses and one address sweeping many accounts both
/// burn their budget per pairing.
fn rate_limit_key(addr: SocketAddr, email: &str) -> String {
    format!("{}:{}", addr.ip(), email.trim().to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_key_is_stable_across_email_casing() {
        let addr: SocketAddr = "198.51.100.7:52100".parse().unwrap();
        assert_eq!(
            rate_limit_key(addr, " Agent@Deskfront.DEV "),
            rate_limit_key(addr, "agent@deskfront.dev")
        );
    }

    #[test]
    fn test_rate_limit_key_ignores_source_port() {
        let a: SocketAddr = "198.51.100.7:52100".parse().unwrap();
        let b: SocketAddr = "198.51.100.7:61044".parse().unwrap();
        assert_eq!(
            rate_limit_key(a, "agent@deskfront.dev"),
            rate_limit_key(b, "agent@deskfront.dev")
        );
    }
}
