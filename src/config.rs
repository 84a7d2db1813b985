// ABOUTME: Environment configuration management for deployment-specific settings
// ABOUTME: Handles environment variables, token lifetimes, lockout limits, and provider credentials
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Stride Fitness

//! Environment-based configuration for the identity core.

use crate::constants::{limits, oauth};
use crate::crypto;
use anyhow::{Context, Result};
use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};
use std::env;
use tracing::warn;

/// Strongly typed log level configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Errors only
    Error,
    /// Warnings and errors
    Warn,
    /// Default operational logging
    #[default]
    Info,
    /// Verbose diagnostics
    Debug,
    /// Everything
    Trace,
}

impl LogLevel {
    /// Convert to a `tracing::Level`
    #[must_use]
    pub const fn to_tracing_level(&self) -> tracing::Level {
        match self {
            Self::Error => tracing::Level::ERROR,
            Self::Warn => tracing::Level::WARN,
            Self::Info => tracing::Level::INFO,
            Self::Debug => tracing::Level::DEBUG,
            Self::Trace => tracing::Level::TRACE,
        }
    }

    /// Parse from string with fallback to `Info`
    #[must_use]
    pub fn from_str_or_default(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "error" => Self::Error,
            "warn" => Self::Warn,
            "debug" => Self::Debug,
            "trace" => Self::Trace,
            _ => Self::Info,
        }
    }
}

/// Top-level configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Log level
    pub log_level: LogLevel,
    /// Database connection settings
    pub database: DatabaseConfig,
    /// Session authority settings
    pub auth: AuthConfig,
    /// OAuth broker settings
    pub oauth: OAuthConfig,
}

/// Database connection and encryption settings
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// SQLite connection string
    pub url: String,
    /// 32-byte AES-256 key sealing provider tokens at rest
    pub encryption_key: Vec<u8>,
}

/// Session authority configuration
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// JWT signing secret for access tokens
    pub jwt_secret: Vec<u8>,
    /// Access token lifetime in minutes
    pub access_token_minutes: i64,
    /// Refresh token lifetime in days
    pub refresh_token_days: i64,
    /// Consecutive failures before lockout
    pub lockout_threshold: i64,
    /// Lockout duration in minutes
    pub lockout_duration_minutes: i64,
    /// Minimum accepted password length
    pub min_password_length: usize,
}

impl AuthConfig {
    /// Construct with library defaults and a given signing secret (tests)
    #[must_use]
    pub const fn with_secret(jwt_secret: Vec<u8>) -> Self {
        Self {
            jwt_secret,
            access_token_minutes: limits::DEFAULT_ACCESS_TOKEN_MINUTES,
            refresh_token_days: limits::DEFAULT_REFRESH_TOKEN_DAYS,
            lockout_threshold: limits::DEFAULT_LOCKOUT_THRESHOLD,
            lockout_duration_minutes: limits::DEFAULT_LOCKOUT_DURATION_MINUTES,
            min_password_length: limits::DEFAULT_MIN_PASSWORD_LENGTH,
        }
    }
}

/// OAuth broker configuration
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    /// CSRF/PKCE state lifetime in minutes
    pub state_ttl_minutes: i64,
    /// Strava provider entry
    pub strava: ProviderEntry,
    /// Garmin provider entry
    pub garmin: ProviderEntry,
}

/// Static catalog entry for one OAuth provider
#[derive(Debug, Clone)]
pub struct ProviderEntry {
    /// Provider name as used in flows and storage
    pub name: String,
    /// OAuth client id
    pub client_id: Option<String>,
    /// OAuth client secret
    pub client_secret: Option<String>,
    /// Authorization endpoint
    pub auth_url: String,
    /// Token endpoint
    pub token_url: String,
    /// Scopes requested on authorization
    pub scope: String,
    /// Whether this provider is registered with the broker
    pub enabled: bool,
}

impl ProviderEntry {
    /// Whether the entry has usable client credentials
    #[must_use]
    pub const fn is_configured(&self) -> bool {
        self.enabled && self.client_id.is_some() && self.client_secret.is_some()
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Reads a `.env` file when present. Missing values fall back to the
    /// defaults in [`crate::constants::limits`]; missing secrets are
    /// generated with a warning, as appropriate only outside production.
    ///
    /// # Errors
    ///
    /// Returns an error if a present environment variable fails to parse
    pub fn from_env() -> Result<Self> {
        if dotenvy::dotenv().is_err() {
            // No .env file; plain environment variables still apply.
        }

        Ok(Self {
            log_level: LogLevel::from_str_or_default(
                &env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            ),
            database: DatabaseConfig {
                url: env::var("DATABASE_URL")
                    .unwrap_or_else(|_| "sqlite:data/stride.db".into()),
                encryption_key: load_encryption_key()?,
            },
            auth: AuthConfig {
                jwt_secret: load_jwt_secret()?,
                access_token_minutes: env_parse(
                    "ACCESS_TOKEN_EXPIRE_MINUTES",
                    limits::DEFAULT_ACCESS_TOKEN_MINUTES,
                )?,
                refresh_token_days: env_parse(
                    "REFRESH_TOKEN_EXPIRE_DAYS",
                    limits::DEFAULT_REFRESH_TOKEN_DAYS,
                )?,
                lockout_threshold: env_parse(
                    "LOCKOUT_THRESHOLD",
                    limits::DEFAULT_LOCKOUT_THRESHOLD,
                )?,
                lockout_duration_minutes: env_parse(
                    "LOCKOUT_DURATION_MINUTES",
                    limits::DEFAULT_LOCKOUT_DURATION_MINUTES,
                )?,
                min_password_length: env_parse(
                    "MIN_PASSWORD_LENGTH",
                    limits::DEFAULT_MIN_PASSWORD_LENGTH,
                )?,
            },
            oauth: OAuthConfig {
                state_ttl_minutes: env_parse(
                    "OAUTH_STATE_TTL_MINUTES",
                    limits::DEFAULT_OAUTH_STATE_TTL_MINUTES,
                )?,
                strava: ProviderEntry {
                    name: oauth::STRAVA.into(),
                    client_id: env::var("STRAVA_CLIENT_ID").ok(),
                    client_secret: env::var("STRAVA_CLIENT_SECRET").ok(),
                    auth_url: env::var("STRAVA_AUTH_URL")
                        .unwrap_or_else(|_| oauth::STRAVA_AUTH_URL.into()),
                    token_url: env::var("STRAVA_TOKEN_URL")
                        .unwrap_or_else(|_| oauth::STRAVA_TOKEN_URL.into()),
                    scope: env::var("STRAVA_SCOPES")
                        .unwrap_or_else(|_| oauth::STRAVA_DEFAULT_SCOPES.into()),
                    enabled: env_parse("STRAVA_ENABLED", true)?,
                },
                garmin: ProviderEntry {
                    name: oauth::GARMIN.into(),
                    client_id: env::var("GARMIN_CLIENT_ID").ok(),
                    client_secret: env::var("GARMIN_CLIENT_SECRET").ok(),
                    auth_url: env::var("GARMIN_AUTH_URL")
                        .unwrap_or_else(|_| oauth::GARMIN_AUTH_URL.into()),
                    token_url: env::var("GARMIN_TOKEN_URL")
                        .unwrap_or_else(|_| oauth::GARMIN_TOKEN_URL.into()),
                    scope: env::var("GARMIN_SCOPES")
                        .unwrap_or_else(|_| oauth::GARMIN_DEFAULT_SCOPES.into()),
                    enabled: env_parse("GARMIN_ENABLED", true)?,
                },
            },
        })
    }
}

/// Parse an environment variable, falling back to a default when unset
fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .parse()
            .with_context(|| format!("invalid value for {name}")),
        Err(_) => Ok(default),
    }
}

/// Load the provider-token encryption key from `TOKEN_ENCRYPTION_KEY`
/// (base64, 32 bytes) or generate a fresh one with a warning
fn load_encryption_key() -> Result<Vec<u8>> {
    match env::var("TOKEN_ENCRYPTION_KEY") {
        Ok(encoded) => {
            let key = general_purpose::STANDARD
                .decode(encoded.trim())
                .context("TOKEN_ENCRYPTION_KEY is not valid base64")?;
            anyhow::ensure!(
                key.len() == 32,
                "TOKEN_ENCRYPTION_KEY must decode to 32 bytes, got {}",
                key.len()
            );
            Ok(key)
        }
        Err(_) => {
            warn!(
                "Generated new token encryption key. Set TOKEN_ENCRYPTION_KEY for production \
                 or stored provider tokens will be unreadable after restart."
            );
            Ok(crypto::generate_encryption_key().to_vec())
        }
    }
}

/// Load the JWT signing secret from `JWT_SECRET_KEY` or generate one
fn load_jwt_secret() -> Result<Vec<u8>> {
    if let Ok(secret) = env::var("JWT_SECRET_KEY") {
        return Ok(secret.into_bytes());
    }
    warn!(
        "Generated new JWT secret. Set JWT_SECRET_KEY for production \
         or sessions will not survive restart."
    );
    let secret = crypto::generate_jwt_secret()
        .map_err(|e| anyhow::anyhow!("cannot generate JWT secret: {e}"))?;
    Ok(secret.to_vec())
}
