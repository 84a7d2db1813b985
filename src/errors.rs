// ABOUTME: Unified error taxonomy for the identity core
// ABOUTME: Defines typed error kinds with HTTP status mapping for the API layer
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Stride Fitness

//! # Unified Error Handling
//!
//! Every fallible operation in this crate returns [`AuthError`]. Outcomes
//! like "not found" or "invalid token" are explicit variants distinguished
//! at the call site, never exceptions-by-another-name. Credential and token
//! verification failures collapse into [`AuthError::Unauthenticated`] so a
//! caller cannot distinguish a wrong password from an unknown email.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Unified error type for authentication and OAuth operations
#[derive(Debug, Error)]
pub enum AuthError {
    /// Malformed input: the caller's fault (4xx-equivalent)
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Duplicate resource, e.g. an email already registered
    #[error("conflict: {0}")]
    Conflict(String),

    /// Bad credentials or an invalid/expired/revoked token. Deliberately
    /// carries no detail that would allow account enumeration.
    #[error("authentication failed")]
    Unauthenticated,

    /// Account temporarily locked after repeated failed logins
    #[error("account locked until {until}")]
    AccountLocked {
        /// When the lock expires and login attempts are accepted again
        until: DateTime<Utc>,
    },

    /// Account exists but its status does not permit login
    #[error("account is not active")]
    AccountInactive,

    /// OAuth state missing, expired, or already consumed
    #[error("invalid or expired OAuth state")]
    InvalidState,

    /// OAuth provider not present in the registry
    #[error("provider not supported: {0}")]
    UnsupportedProvider(String),

    /// Code or refresh exchange with the provider's token endpoint failed
    #[error("provider token exchange failed: {0}")]
    ProviderExchangeFailed(String),

    /// Stored provider token bundle failed authenticated decryption.
    /// Data-integrity failure: must never be reported as "not connected".
    #[error("stored provider token is corrupt or key mismatch")]
    ProviderTokenCorrupt,

    /// Storage layer unavailable or a query failed
    #[error("database error: {0}")]
    Database(String),

    /// Unexpected internal failure
    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// HTTP status the API layer should map this error to
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::InvalidInput(_) | Self::UnsupportedProvider(_) => 400,
            Self::Unauthenticated | Self::InvalidState => 401,
            Self::AccountInactive => 403,
            Self::Conflict(_) => 409,
            Self::AccountLocked { .. } => 423,
            Self::ProviderExchangeFailed(_) => 502,
            Self::ProviderTokenCorrupt | Self::Database(_) | Self::Internal(_) => 500,
        }
    }

    /// Whether a caller may reasonably retry the same request
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::AccountLocked { .. } | Self::ProviderExchangeFailed(_) | Self::Database(_)
        )
    }
}

impl From<sqlx::Error> for AuthError {
    fn from(e: sqlx::Error) -> Self {
        Self::Database(e.to_string())
    }
}

impl From<serde_json::Error> for AuthError {
    fn from(e: serde_json::Error) -> Self {
        Self::Internal(format!("serialization failed: {e}"))
    }
}

/// Result type alias for identity core operations
pub type AuthResult<T> = Result<T, AuthError>;
