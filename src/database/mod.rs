// ABOUTME: Database management for the identity core
// ABOUTME: Owns the SQLite pool, schema migrations, and shared maintenance operations
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Stride Fitness

//! # Database Management
//!
//! Storage for identities, refresh/reset/magic-link tokens, OAuth states,
//! and provider connections. One file per concern, each adding an
//! `impl Database` block.
//!
//! No table here ever holds a raw password, raw refresh token, or raw
//! provider secret: verifiable secrets are stored as SHA-256 hashes,
//! provider tokens as AES-256-GCM ciphertext sealed by the caller.

mod connections;
mod oauth_states;
mod tokens;
mod users;

pub use oauth_states::OAuthStateRecord;
pub use tokens::SingleUseKind;

use crate::errors::{AuthError, AuthResult};
use chrono::Utc;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Sqlite, SqlitePool};

/// Database handle for identity and token storage
#[derive(Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    /// Open a connection pool and run migrations
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or schema migration fails
    pub async fn new(database_url: &str) -> AuthResult<Self> {
        // Ensure SQLite creates the database file if it doesn't exist
        let connection_options = if database_url.starts_with("sqlite:")
            && !database_url.contains(":memory:")
            && !database_url.contains('?')
        {
            format!("{database_url}?mode=rwc")
        } else {
            database_url.to_owned()
        };

        // Every pooled connection to an in-memory SQLite URL gets its own
        // database, so pin those to a single connection
        let pool = if connection_options.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .connect(&connection_options)
                .await
        } else {
            SqlitePool::connect(&connection_options).await
        }
        .map_err(|e| AuthError::Database(format!("connection failed: {e}")))?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Get a reference to the pool for advanced operations
    #[must_use]
    pub const fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Run schema migrations
    ///
    /// # Errors
    ///
    /// Returns an error if any table or index creation fails
    pub async fn migrate(&self) -> AuthResult<()> {
        self.migrate_users().await?;
        self.migrate_tokens().await?;
        self.migrate_oauth_states().await?;
        self.migrate_connections().await?;
        tracing::debug!("identity schema migrations complete");
        Ok(())
    }

    /// Delete expired rows from every token and state table.
    ///
    /// Collaborator-invoked maintenance; the core runs no background loop.
    /// Returns the total number of rows removed.
    ///
    /// # Errors
    ///
    /// Returns an error if any delete fails
    pub async fn cleanup_expired(&self) -> AuthResult<u64> {
        let now = Utc::now();
        let mut removed = 0;

        for table in [
            "refresh_tokens",
            "password_reset_tokens",
            "magic_link_tokens",
            "oauth_states",
        ] {
            let query = format!("DELETE FROM {table} WHERE expires_at < $1");
            let result = sqlx::query(&query).bind(now).execute(&self.pool).await?;
            removed += result.rows_affected();
        }

        tracing::info!(rows = removed, "cleaned up expired tokens and states");
        Ok(removed)
    }
}
