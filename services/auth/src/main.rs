use anyhow::Result;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

mod captcha;
mod errors;
mod limiter;
mod middleware;
mod models;
mod password;
mod repositories;
mod routes;
mod session;
mod token;
mod validation;

use sqlx::PgPool;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::captcha::{CaptchaConfig, CaptchaVerifier, HttpCaptchaVerifier};
use crate::limiter::{RateLimiter, RateLimiterConfig};
use crate::password::{PasswordConfig, PasswordHasher};
use crate::repositories::{PgRefreshTokenStore, PgUserRepository};
use crate::session::{SessionConfig, SessionService};
use crate::token::{TokenConfig, TokenIssuer};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub session: Arc<SessionService>,
    pub issuer: TokenIssuer,
    pub captcha: Option<Arc<dyn CaptchaVerifier>>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    info!("Starting authentication service");

    // Initialize database connection pool
    let db_config = common::database::DatabaseConfig::from_env()?;
    let pool = common::database::init_pool(&db_config).await?;

    // Check database connectivity
    if common::database::health_check(&pool).await? {
        info!("Database connection successful");
    } else {
        anyhow::bail!("Failed to connect to database");
    }

    // Every collaborator is constructed here and handed down explicitly.
    let issuer = TokenIssuer::new(TokenConfig::from_env()?);
    let hasher = PasswordHasher::new(&PasswordConfig::from_env()?)?;
    let limiter = RateLimiter::new(RateLimiterConfig::from_env());

    let users = Arc::new(PgUserRepository::new(pool.clone()));
    let tokens = Arc::new(PgRefreshTokenStore::new(pool.clone()));

    let session = Arc::new(SessionService::new(
        users,
        tokens,
        hasher,
        issuer.clone(),
        limiter,
        SessionConfig::from_env(),
    ));

    let captcha: Option<Arc<dyn CaptchaVerifier>> = CaptchaConfig::from_env().map(|config| {
        info!("CAPTCHA verification enabled");
        Arc::new(HttpCaptchaVerifier::new(config)) as Arc<dyn CaptchaVerifier>
    });
    if captcha.is_none() {
        info!("CAPTCHA verification disabled (CAPTCHA_SECRET not set)");
    }

    let app_state = AppState {
        db_pool: pool,
        session,
        issuer,
        captcha,
    };

    // Start the web server
    let app = routes::create_router(app_state);

    let addr = std::env::var("AUTH_LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Authentication service listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
