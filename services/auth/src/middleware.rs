//! Middleware for access token validation

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};
use tracing::warn;

use crate::AppState;

/// Validate the bearer access token and expose its claims to handlers
///
/// On success the decoded claims are inserted into the request extensions;
/// every failure collapses to 401 without detail.
pub async fn auth_middleware(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let TypedHeader(Authorization(bearer)) = bearer.ok_or(StatusCode::UNAUTHORIZED)?;

    let claims = state.issuer.validate_access(bearer.token()).map_err(|e| {
        warn!("Access token rejected: {}", e);
        StatusCode::UNAUTHORIZED
    })?;

    req.extensions_mut().insert(claims);

    Ok(next.run(req).await)
}
