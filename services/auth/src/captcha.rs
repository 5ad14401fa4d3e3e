//! CAPTCHA verification capability
//!
//! A boolean-returning gate consulted by the route layer before the session
//! service is invoked. The session core is agnostic to whether CAPTCHA ran;
//! deployments without a provider simply construct the state without a
//! verifier.

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

/// CAPTCHA provider configuration
#[derive(Debug, Clone)]
pub struct CaptchaConfig {
    /// Provider verification endpoint
    pub verify_url: String,
    /// Provider-issued site secret
    pub secret: String,
}

impl CaptchaConfig {
    /// Create a new CaptchaConfig from environment variables
    ///
    /// Returns `None` when `CAPTCHA_SECRET` is unset, which disables the
    /// gate entirely.
    ///
    /// # Environment Variables
    /// - `CAPTCHA_SECRET`: Provider site secret
    /// - `CAPTCHA_VERIFY_URL`: Verification endpoint (default: hCaptcha)
    pub fn from_env() -> Option<Self> {
        let secret = std::env::var("CAPTCHA_SECRET").ok()?;
        let verify_url = std::env::var("CAPTCHA_VERIFY_URL")
            .unwrap_or_else(|_| "https://api.hcaptcha.com/siteverify".to_string());

        Some(CaptchaConfig { verify_url, secret })
    }
}

/// Boolean CAPTCHA verification capability
#[async_trait]
pub trait CaptchaVerifier: Send + Sync {
    /// Verify a client-supplied CAPTCHA response token
    async fn verify(&self, token: &str) -> Result<bool>;
}

/// Response shape shared by hCaptcha and Turnstile
#[derive(Debug, Deserialize)]
struct VerifyResponse {
    success: bool,
}

/// HTTP CAPTCHA verifier against a provider endpoint
pub struct HttpCaptchaVerifier {
    client: reqwest::Client,
    config: CaptchaConfig,
}

impl HttpCaptchaVerifier {
    /// Create a new verifier for the configured provider
    pub fn new(config: CaptchaConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl CaptchaVerifier for HttpCaptchaVerifier {
    async fn verify(&self, token: &str) -> Result<bool> {
        let params = [("secret", self.config.secret.as_str()), ("response", token)];

        let response: VerifyResponse = self
            .client
            .post(&self.config.verify_url)
            .form(&params)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if !response.success {
            info!("CAPTCHA verification failed");
        }

        Ok(response.success)
    }
}
