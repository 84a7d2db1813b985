// ABOUTME: Main library entry point for the Stride identity core
// ABOUTME: Provides authentication, session management, and OAuth provider brokering
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Stride Fitness

#![deny(unsafe_code)]

//! # Stride Identity Core
//!
//! The authentication and third-party credential subsystem of the Stride
//! multi-tenant fitness platform. The HTTP API, CLI, and data-source pollers
//! are external collaborators; they consume this crate through two services:
//!
//! - [`auth::AuthManager`] — local password authentication, JWT access
//!   tokens, rotating refresh tokens, brute-force lockout, and single-use
//!   password-reset / magic-link tokens.
//! - [`oauth::OAuthBroker`] — authorization-code + PKCE flows against
//!   external fitness providers (Strava, Garmin), with provider tokens
//!   encrypted at rest and silently refreshed.
//!
//! Secrets are never persisted in recoverable form: passwords are hashed
//! with Argon2, refresh/reset/magic-link tokens are stored as SHA-256
//! hashes, and provider token bundles are sealed with AES-256-GCM.
//!
//! ## Example
//!
//! ```rust,no_run
//! use stride_identity::config::ServerConfig;
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = ServerConfig::from_env()?;
//! println!("access tokens live {} minutes", config.auth.access_token_minutes);
//! # Ok(())
//! # }
//! ```

/// Session authority: registration, login, JWT sessions, refresh rotation
pub mod auth;

/// Environment-based configuration
pub mod config;

/// Default limits, lifetimes, and provider catalog constants
pub mod constants;

/// `AES-256-GCM` sealing for provider tokens, password and secret hashing
pub mod crypto;

/// `SQLite` storage for identities, tokens, states, and connections
pub mod database;

/// Unified error taxonomy for the identity core
pub mod errors;

/// Structured logging initialization
pub mod logging;

/// Domain models: users, sessions, provider connections
pub mod models;

/// OAuth broker: PKCE flows, provider registry, encrypted token storage
pub mod oauth;
