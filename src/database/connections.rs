// ABOUTME: Provider connection storage keyed by (athlete, provider)
// ABOUTME: Token material arrives and leaves as ciphertext; this layer never decrypts
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Stride Fitness

use super::Database;
use crate::errors::{AuthError, AuthResult};
use crate::models::{ConnectionStatus, ProviderConnection};
use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

fn row_to_connection(row: &sqlx::sqlite::SqliteRow) -> AuthResult<ProviderConnection> {
    let id_str: String = row.try_get("id")?;
    let athlete_id_str: String = row.try_get("athlete_id")?;
    let status_str: String = row.try_get("status")?;
    Ok(ProviderConnection {
        id: Uuid::parse_str(&id_str)
            .map_err(|e| AuthError::Database(format!("invalid connection id: {e}")))?,
        athlete_id: Uuid::parse_str(&athlete_id_str)
            .map_err(|e| AuthError::Database(format!("invalid athlete id: {e}")))?,
        provider: row.try_get("provider")?,
        status: status_str.parse()?,
        expires_at: row.try_get("expires_at")?,
        last_sync: row.try_get("last_sync")?,
        sync_frequency_minutes: row.try_get("sync_frequency_minutes")?,
        rate_limit_remaining: row.try_get("rate_limit_remaining")?,
        rate_limit_reset: row.try_get("rate_limit_reset")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

impl Database {
    pub(super) async fn migrate_connections(&self) -> AuthResult<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS provider_connections (
                id TEXT PRIMARY KEY,
                athlete_id TEXT NOT NULL,
                provider TEXT NOT NULL,
                tokens_encrypted TEXT NOT NULL,
                refresh_token_encrypted TEXT,
                status TEXT NOT NULL DEFAULT 'active',
                expires_at TIMESTAMP,
                last_sync TIMESTAMP,
                sync_frequency_minutes INTEGER NOT NULL DEFAULT 1440,
                rate_limit_remaining INTEGER,
                rate_limit_reset TIMESTAMP,
                created_at TIMESTAMP NOT NULL,
                updated_at TIMESTAMP NOT NULL,
                UNIQUE(athlete_id, provider),
                FOREIGN KEY (athlete_id) REFERENCES athletes(id)
            )
            ",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Insert or replace the token material for an (athlete, provider) pair.
    ///
    /// A re-link resets the connection to active and clears the sync
    /// watermark so the next sync starts from scratch.
    ///
    /// # Errors
    ///
    /// Returns an error if the upsert fails
    pub async fn upsert_connection(
        &self,
        athlete_id: Uuid,
        provider: &str,
        tokens_encrypted: &str,
        refresh_token_encrypted: Option<&str>,
        expires_at: Option<DateTime<Utc>>,
        sync_frequency_minutes: i64,
    ) -> AuthResult<()> {
        let now = Utc::now();
        sqlx::query(
            r"
            INSERT INTO provider_connections (
                id, athlete_id, provider, tokens_encrypted, refresh_token_encrypted,
                status, expires_at, sync_frequency_minutes, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, 'active', $6, $7, $8, $8)
            ON CONFLICT(athlete_id, provider) DO UPDATE SET
                tokens_encrypted = excluded.tokens_encrypted,
                refresh_token_encrypted = excluded.refresh_token_encrypted,
                status = 'active',
                expires_at = excluded.expires_at,
                last_sync = NULL,
                updated_at = excluded.updated_at
            ",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(athlete_id.to_string())
        .bind(provider)
        .bind(tokens_encrypted)
        .bind(refresh_token_encrypted)
        .bind(expires_at)
        .bind(sync_frequency_minutes)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Replace only the token material after a refresh, without touching
    /// sync bookkeeping
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails
    pub async fn update_connection_tokens(
        &self,
        athlete_id: Uuid,
        provider: &str,
        tokens_encrypted: &str,
        refresh_token_encrypted: Option<&str>,
        expires_at: Option<DateTime<Utc>>,
    ) -> AuthResult<()> {
        sqlx::query(
            r"
            UPDATE provider_connections
            SET tokens_encrypted = $3,
                refresh_token_encrypted = $4,
                expires_at = $5,
                status = 'active',
                updated_at = $6
            WHERE athlete_id = $1 AND provider = $2
            ",
        )
        .bind(athlete_id.to_string())
        .bind(provider)
        .bind(tokens_encrypted)
        .bind(refresh_token_encrypted)
        .bind(expires_at)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Fetch a connection's metadata without its token material
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails
    pub async fn get_connection(
        &self,
        athlete_id: Uuid,
        provider: &str,
    ) -> AuthResult<Option<ProviderConnection>> {
        let row = sqlx::query(
            r"
            SELECT id, athlete_id, provider, status, expires_at, last_sync,
                   sync_frequency_minutes, rate_limit_remaining, rate_limit_reset,
                   created_at, updated_at
            FROM provider_connections
            WHERE athlete_id = $1 AND provider = $2
            ",
        )
        .bind(athlete_id.to_string())
        .bind(provider)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_connection).transpose()
    }

    /// Fetch the encrypted token material for a connection.
    ///
    /// Returns `(tokens_ciphertext, refresh_ciphertext)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails
    pub async fn get_connection_ciphertext(
        &self,
        athlete_id: Uuid,
        provider: &str,
    ) -> AuthResult<Option<(String, Option<String>)>> {
        let row = sqlx::query(
            r"
            SELECT tokens_encrypted, refresh_token_encrypted
            FROM provider_connections
            WHERE athlete_id = $1 AND provider = $2 AND status != 'revoked'
            ",
        )
        .bind(athlete_id.to_string())
        .bind(provider)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            Ok((
                row.try_get("tokens_encrypted")?,
                row.try_get("refresh_token_encrypted")?,
            ))
        })
        .transpose()
    }

    /// Move a connection to a new status
    ///
    /// Returns `true` if a row was updated.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails
    pub async fn set_connection_status(
        &self,
        athlete_id: Uuid,
        provider: &str,
        status: ConnectionStatus,
    ) -> AuthResult<bool> {
        let result = sqlx::query(
            r"
            UPDATE provider_connections
            SET status = $3, updated_at = $4
            WHERE athlete_id = $1 AND provider = $2
            ",
        )
        .bind(athlete_id.to_string())
        .bind(provider)
        .bind(status.as_str())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// List all connections an athlete holds
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails
    pub async fn list_connections(&self, athlete_id: Uuid) -> AuthResult<Vec<ProviderConnection>> {
        let rows = sqlx::query(
            r"
            SELECT id, athlete_id, provider, status, expires_at, last_sync,
                   sync_frequency_minutes, rate_limit_remaining, rate_limit_reset,
                   created_at, updated_at
            FROM provider_connections
            WHERE athlete_id = $1
            ORDER BY provider
            ",
        )
        .bind(athlete_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_connection).collect()
    }

    /// Stamp the sync watermark after a successful data pull
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails
    pub async fn mark_synced(&self, athlete_id: Uuid, provider: &str) -> AuthResult<()> {
        sqlx::query(
            r"
            UPDATE provider_connections
            SET last_sync = $3, updated_at = $3
            WHERE athlete_id = $1 AND provider = $2
            ",
        )
        .bind(athlete_id.to_string())
        .bind(provider)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Record the provider's reported rate-limit window
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails
    pub async fn update_rate_limit(
        &self,
        athlete_id: Uuid,
        provider: &str,
        remaining: i64,
        reset_at: Option<DateTime<Utc>>,
    ) -> AuthResult<()> {
        sqlx::query(
            r"
            UPDATE provider_connections
            SET rate_limit_remaining = $3, rate_limit_reset = $4, updated_at = $5
            WHERE athlete_id = $1 AND provider = $2
            ",
        )
        .bind(athlete_id.to_string())
        .bind(provider)
        .bind(remaining)
        .bind(reset_at)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
