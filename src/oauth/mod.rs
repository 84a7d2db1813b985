// ABOUTME: OAuth provider abstraction and registry
// ABOUTME: Providers hide transport details behind one async trait so flows stay testable
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Stride Fitness

//! # OAuth Integration
//!
//! Links athlete accounts to external fitness providers. The
//! [`OAuthProvider`] trait is the seam between flow orchestration
//! ([`manager::OAuthBroker`]) and provider HTTP specifics
//! ([`providers::HttpOAuthProvider`]); tests plug in mock providers here.

pub mod manager;
pub mod providers;

pub use manager::{FlowStart, OAuthBroker};
pub use providers::HttpOAuthProvider;

use crate::config::OAuthConfig;
use crate::errors::{AuthError, AuthResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Decrypted token material for one provider connection.
///
/// Never stored in this form; the broker seals it with AES-256-GCM before
/// it touches the database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenBundle {
    /// Bearer token for provider API calls
    pub access_token: String,
    /// Token used to obtain a fresh access token, when the provider
    /// issues one
    pub refresh_token: Option<String>,
    /// Access token expiry, when the provider reports one
    pub expires_at: Option<DateTime<Utc>>,
    /// Scopes actually granted
    pub scope: Option<String>,
}

/// A single OAuth 2.0 provider integration
#[async_trait]
pub trait OAuthProvider: Send + Sync {
    /// Catalog name, e.g. `strava`
    fn name(&self) -> &str;

    /// Build the authorization URL the user is redirected to
    ///
    /// # Errors
    ///
    /// Returns an error when the provider is not configured
    fn authorize_url(
        &self,
        redirect_uri: &str,
        state: &str,
        code_challenge: &str,
    ) -> AuthResult<String>;

    /// Exchange an authorization code for tokens
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::ProviderExchangeFailed`] when the provider
    /// rejects the code or the exchange cannot complete
    async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
        code_verifier: &str,
    ) -> AuthResult<TokenBundle>;

    /// Obtain fresh tokens from a refresh token
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::ProviderExchangeFailed`] when the refresh fails
    async fn refresh(&self, refresh_token: &str) -> AuthResult<TokenBundle>;
}

/// Registry of enabled providers, looked up by catalog name
#[derive(Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Box<dyn OAuthProvider>>,
}

impl ProviderRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from the provider catalog, skipping entries
    /// without client credentials
    ///
    /// # Errors
    ///
    /// Returns an error if a provider's HTTP client cannot be built
    pub fn from_config(config: &OAuthConfig) -> AuthResult<Self> {
        let mut registry = Self::new();
        for entry in [&config.strava, &config.garmin] {
            if entry.is_configured() {
                registry.register(Box::new(HttpOAuthProvider::new(entry.clone())?));
            } else {
                tracing::debug!(provider = %entry.name, "provider not configured, skipping");
            }
        }
        Ok(registry)
    }

    /// Add a provider under its own name, replacing any previous entry
    pub fn register(&mut self, provider: Box<dyn OAuthProvider>) {
        self.providers.insert(provider.name().to_owned(), provider);
    }

    /// Look up a provider by name
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::UnsupportedProvider`] for unknown names
    pub fn get(&self, name: &str) -> AuthResult<&dyn OAuthProvider> {
        self.providers
            .get(name)
            .map(Box::as_ref)
            .ok_or_else(|| AuthError::UnsupportedProvider(name.to_owned()))
    }

    /// Names of all registered providers
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.providers.keys().map(String::as_str).collect()
    }
}
