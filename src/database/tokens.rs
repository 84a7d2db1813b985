// ABOUTME: Refresh session storage plus single-use password-reset and magic-link tokens
// ABOUTME: Only SHA-256 hashes are persisted; consumption is one conditional update
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Stride Fitness

use super::Database;
use crate::errors::{AuthError, AuthResult};
use crate::models::SessionInfo;
use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

/// Which single-use token family a hash belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SingleUseKind {
    PasswordReset,
    MagicLink,
}

impl SingleUseKind {
    const fn table(self) -> &'static str {
        match self {
            Self::PasswordReset => "password_reset_tokens",
            Self::MagicLink => "magic_link_tokens",
        }
    }
}

impl Database {
    pub(super) async fn migrate_tokens(&self) -> AuthResult<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS refresh_tokens (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                token_hash TEXT UNIQUE NOT NULL,
                created_at TIMESTAMP NOT NULL,
                expires_at TIMESTAMP NOT NULL,
                revoked_at TIMESTAMP,
                FOREIGN KEY (user_id) REFERENCES users(id)
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_refresh_tokens_user ON refresh_tokens(user_id)",
        )
        .execute(&self.pool)
        .await?;

        for table in ["password_reset_tokens", "magic_link_tokens"] {
            let query = format!(
                r"
                CREATE TABLE IF NOT EXISTS {table} (
                    id TEXT PRIMARY KEY,
                    user_id TEXT NOT NULL,
                    token_hash TEXT UNIQUE NOT NULL,
                    used BOOLEAN NOT NULL DEFAULT 0,
                    created_at TIMESTAMP NOT NULL,
                    expires_at TIMESTAMP NOT NULL,
                    FOREIGN KEY (user_id) REFERENCES users(id)
                )
                "
            );
            sqlx::query(&query).execute(&self.pool).await?;
        }

        Ok(())
    }

    /// Store the hash of a freshly issued refresh token
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails
    pub async fn insert_refresh_token(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> AuthResult<Uuid> {
        let id = Uuid::new_v4();
        sqlx::query(
            r"
            INSERT INTO refresh_tokens (id, user_id, token_hash, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            ",
        )
        .bind(id.to_string())
        .bind(user_id.to_string())
        .bind(token_hash)
        .bind(Utc::now())
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(id)
    }

    /// Look up a live refresh session by token hash.
    ///
    /// Revoked and expired rows are not returned; the caller maps the
    /// absence to a generic authentication failure.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails
    pub async fn get_refresh_session(
        &self,
        token_hash: &str,
    ) -> AuthResult<Option<SessionInfo>> {
        let row = sqlx::query(
            r"
            SELECT id, user_id, created_at, expires_at
            FROM refresh_tokens
            WHERE token_hash = $1 AND revoked_at IS NULL AND expires_at > $2
            ",
        )
        .bind(token_hash)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            let id_str: String = row.try_get("id")?;
            let user_id_str: String = row.try_get("user_id")?;
            Ok(SessionInfo {
                id: Uuid::parse_str(&id_str)
                    .map_err(|e| AuthError::Database(format!("invalid session id: {e}")))?,
                user_id: Uuid::parse_str(&user_id_str)
                    .map_err(|e| AuthError::Database(format!("invalid session user id: {e}")))?,
                created_at: row.try_get("created_at")?,
                expires_at: row.try_get("expires_at")?,
            })
        })
        .transpose()
    }

    /// Revoke a refresh session by its token hash
    ///
    /// Returns `true` if a live session was revoked.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails
    pub async fn revoke_refresh_token(&self, token_hash: &str) -> AuthResult<bool> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = $2 WHERE token_hash = $1 AND revoked_at IS NULL",
        )
        .bind(token_hash)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Revoke one session by id, scoped to its owner
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails
    pub async fn revoke_session(&self, user_id: Uuid, session_id: Uuid) -> AuthResult<bool> {
        let result = sqlx::query(
            r"
            UPDATE refresh_tokens SET revoked_at = $3
            WHERE id = $1 AND user_id = $2 AND revoked_at IS NULL
            ",
        )
        .bind(session_id.to_string())
        .bind(user_id.to_string())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Revoke every live refresh session a user holds
    ///
    /// Returns the number of sessions revoked.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails
    pub async fn revoke_all_refresh_tokens(&self, user_id: Uuid) -> AuthResult<u64> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = $2 WHERE user_id = $1 AND revoked_at IS NULL",
        )
        .bind(user_id.to_string())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// List a user's live refresh sessions, newest first
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails
    pub async fn list_sessions(&self, user_id: Uuid) -> AuthResult<Vec<SessionInfo>> {
        let rows = sqlx::query(
            r"
            SELECT id, user_id, created_at, expires_at
            FROM refresh_tokens
            WHERE user_id = $1 AND revoked_at IS NULL AND expires_at > $2
            ORDER BY created_at DESC
            ",
        )
        .bind(user_id.to_string())
        .bind(Utc::now())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let id_str: String = row.try_get("id")?;
                let user_id_str: String = row.try_get("user_id")?;
                Ok(SessionInfo {
                    id: Uuid::parse_str(&id_str)
                        .map_err(|e| AuthError::Database(format!("invalid session id: {e}")))?,
                    user_id: Uuid::parse_str(&user_id_str).map_err(|e| {
                        AuthError::Database(format!("invalid session user id: {e}"))
                    })?,
                    created_at: row.try_get("created_at")?,
                    expires_at: row.try_get("expires_at")?,
                })
            })
            .collect()
    }

    /// Store the hash of a single-use token
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails
    pub async fn insert_single_use_token(
        &self,
        kind: SingleUseKind,
        user_id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> AuthResult<()> {
        let query = format!(
            r"
            INSERT INTO {} (id, user_id, token_hash, used, created_at, expires_at)
            VALUES ($1, $2, $3, 0, $4, $5)
            ",
            kind.table()
        );
        sqlx::query(&query)
            .bind(Uuid::new_v4().to_string())
            .bind(user_id.to_string())
            .bind(token_hash)
            .bind(Utc::now())
            .bind(expires_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Consume a single-use token, at most once.
    ///
    /// Marking the row used and checking that it was unused and unexpired
    /// happen in one conditional update, so two concurrent redemptions of
    /// the same secret cannot both succeed.
    ///
    /// Returns the owning user id, or `None` for unknown, already-used, or
    /// expired tokens.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails
    pub async fn consume_single_use_token(
        &self,
        kind: SingleUseKind,
        token_hash: &str,
    ) -> AuthResult<Option<Uuid>> {
        let query = format!(
            r"
            UPDATE {}
            SET used = 1
            WHERE token_hash = $1 AND used = 0 AND expires_at > $2
            RETURNING user_id
            ",
            kind.table()
        );
        let row = sqlx::query(&query)
            .bind(token_hash)
            .bind(Utc::now())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| {
            let user_id_str: String = row.try_get("user_id")?;
            Uuid::parse_str(&user_id_str)
                .map_err(|e| AuthError::Database(format!("invalid token user id: {e}")))
        })
        .transpose()
    }

    /// Burn every outstanding single-use token of one kind a user holds.
    ///
    /// Returns the number of tokens invalidated.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails
    pub async fn revoke_single_use_tokens(
        &self,
        kind: SingleUseKind,
        user_id: Uuid,
    ) -> AuthResult<u64> {
        let query = format!(
            "UPDATE {} SET used = 1 WHERE user_id = $1 AND used = 0",
            kind.table()
        );
        let result = sqlx::query(&query)
            .bind(user_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
