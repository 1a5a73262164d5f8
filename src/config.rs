use std::{str::FromStr, time::Duration};

use anyhow::Context;
use serde::Deserialize;

use crate::auth::password::{PasswordConfig, PasswordDigest};

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum requests allowed per client in one window
    pub max_requests: u32,
    pub window: Duration,
    /// Key clients on the first `X-Forwarded-For` hop instead of the peer
    /// address. Only safe behind a proxy that overwrites the header.
    pub trust_proxy: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 150,
            window: Duration::from_secs(60 * 60),
            trust_proxy: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub password: PasswordConfig,
    pub jwt: JwtConfig,
    pub rate_limit: RateLimitConfig,
    pub body_limit_bytes: usize,
    pub cors_origin: Option<String>,
}

pub const DEFAULT_BODY_LIMIT_BYTES: usize = 15 * 1024;

fn required(key: &str) -> anyhow::Result<String> {
    let value = std::env::var(key).with_context(|| format!("{} must be set", key))?;
    anyhow::ensure!(!value.trim().is_empty(), "{} must not be empty", key);
    Ok(value)
}

fn required_parsed<T>(key: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    required(key)?
        .trim()
        .parse::<T>()
        .with_context(|| format!("{} is not a valid value", key))
}

fn optional_parsed<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

impl AppConfig {
    /// Missing or invalid password settings are fatal.
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = required("DATABASE_URL")?;

        let digest: PasswordDigest = required_parsed("PASSWORD_DIGEST")?;
        let password = PasswordConfig::new(
            required("PASSWORD_PEPPER")?,
            required_parsed("PASSWORD_ITERATION")?,
            required_parsed("PASSWORD_KEYLEN")?,
            digest,
        )
        .context("invalid password hashing configuration")?;

        let jwt = JwtConfig {
            secret: required("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "blog-api".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "blog-api-users".into()),
            ttl_minutes: optional_parsed("JWT_TTL_MINUTES", 60),
            refresh_ttl_minutes: optional_parsed("JWT_REFRESH_TTL_MINUTES", 60 * 24 * 14),
        };

        let defaults = RateLimitConfig::default();
        let rate_limit = RateLimitConfig {
            max_requests: optional_parsed("RATE_LIMIT_MAX", defaults.max_requests),
            window: Duration::from_secs(optional_parsed(
                "RATE_LIMIT_WINDOW_SECS",
                defaults.window.as_secs(),
            )),
            trust_proxy: optional_parsed("TRUST_PROXY", defaults.trust_proxy),
        };

        Ok(Self {
            database_url,
            password,
            jwt,
            rate_limit,
            body_limit_bytes: optional_parsed("BODY_LIMIT_BYTES", DEFAULT_BODY_LIMIT_BYTES),
            cors_origin: std::env::var("CORS_ORIGIN").ok().filter(|v| !v.is_empty()),
        })
    }
}
