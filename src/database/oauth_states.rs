// ABOUTME: Pending OAuth authorization state storage
// ABOUTME: States are consumed atomically so a callback can only be redeemed once
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Stride Fitness

use super::Database;
use crate::errors::{AuthError, AuthResult};
use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

/// A pending authorization flow reclaimed at callback time
#[derive(Debug, Clone)]
pub struct OAuthStateRecord {
    pub user_id: Uuid,
    pub provider: String,
    pub code_verifier: String,
    pub redirect_uri: String,
}

impl Database {
    pub(super) async fn migrate_oauth_states(&self) -> AuthResult<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS oauth_states (
                state TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                provider TEXT NOT NULL,
                code_verifier TEXT NOT NULL,
                redirect_uri TEXT NOT NULL,
                used BOOLEAN NOT NULL DEFAULT 0,
                created_at TIMESTAMP NOT NULL,
                expires_at TIMESTAMP NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id)
            )
            ",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Record a pending authorization flow under its state nonce
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails
    pub async fn insert_oauth_state(
        &self,
        state: &str,
        record: &OAuthStateRecord,
        expires_at: DateTime<Utc>,
    ) -> AuthResult<()> {
        sqlx::query(
            r"
            INSERT INTO oauth_states (
                state, user_id, provider, code_verifier, redirect_uri,
                used, created_at, expires_at
            )
            VALUES ($1, $2, $3, $4, $5, 0, $6, $7)
            ",
        )
        .bind(state)
        .bind(record.user_id.to_string())
        .bind(&record.provider)
        .bind(&record.code_verifier)
        .bind(&record.redirect_uri)
        .bind(Utc::now())
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Consume a pending state, at most once.
    ///
    /// The provider must match the one the flow was started for. Unknown,
    /// expired, already-used, and provider-mismatched states all return
    /// `None`; two concurrent callbacks with the same state cannot both
    /// succeed.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails
    pub async fn consume_oauth_state(
        &self,
        state: &str,
        provider: &str,
    ) -> AuthResult<Option<OAuthStateRecord>> {
        let row = sqlx::query(
            r"
            UPDATE oauth_states
            SET used = 1
            WHERE state = $1 AND provider = $2 AND used = 0 AND expires_at > $3
            RETURNING user_id, provider, code_verifier, redirect_uri
            ",
        )
        .bind(state)
        .bind(provider)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            let user_id_str: String = row.try_get("user_id")?;
            Ok(OAuthStateRecord {
                user_id: Uuid::parse_str(&user_id_str)
                    .map_err(|e| AuthError::Database(format!("invalid state user id: {e}")))?,
                provider: row.try_get("provider")?,
                code_verifier: row.try_get("code_verifier")?,
                redirect_uri: row.try_get("redirect_uri")?,
            })
        })
        .transpose()
    }
}
