// ABOUTME: User identity storage with lockout bookkeeping and athlete resolution
// ABOUTME: Single-statement conditional updates keep failure counting race-free
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Stride Fitness

use super::Database;
use crate::errors::{AuthError, AuthResult};
use crate::models::{Athlete, User, UserUpdate};
use chrono::{DateTime, Duration, Utc};
use sqlx::Row;
use uuid::Uuid;

fn row_to_user(row: &sqlx::sqlite::SqliteRow) -> AuthResult<User> {
    let id_str: String = row.try_get("id")?;
    let role_str: String = row.try_get("role")?;
    let status_str: String = row.try_get("status")?;
    Ok(User {
        id: Uuid::parse_str(&id_str)
            .map_err(|e| AuthError::Database(format!("invalid user id in row: {e}")))?,
        email: row.try_get("email")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        password_hash: row.try_get("password_hash")?,
        tenant_id: row.try_get("tenant_id")?,
        role: role_str.parse()?,
        status: status_str.parse()?,
        is_active: row.try_get("is_active")?,
        failed_login_attempts: row.try_get("failed_login_attempts")?,
        locked_until: row.try_get("locked_until")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        last_login: row.try_get("last_login")?,
    })
}

impl Database {
    pub(super) async fn migrate_users(&self) -> AuthResult<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT UNIQUE NOT NULL,
                first_name TEXT NOT NULL,
                last_name TEXT NOT NULL,
                password_hash TEXT NOT NULL,
                tenant_id TEXT NOT NULL,
                role TEXT NOT NULL DEFAULT 'user',
                status TEXT NOT NULL DEFAULT 'active',
                is_active BOOLEAN NOT NULL DEFAULT 1,
                failed_login_attempts INTEGER NOT NULL DEFAULT 0,
                locked_until TIMESTAMP,
                created_at TIMESTAMP NOT NULL,
                updated_at TIMESTAMP NOT NULL,
                last_login TIMESTAMP
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_users_email ON users(email)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_users_tenant ON users(tenant_id)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS athletes (
                id TEXT PRIMARY KEY,
                user_id TEXT UNIQUE NOT NULL,
                name TEXT NOT NULL,
                is_active BOOLEAN NOT NULL DEFAULT 1,
                created_at TIMESTAMP NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id)
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert a new user row
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Conflict`] when the email is already registered
    pub async fn insert_user(&self, user: &User) -> AuthResult<()> {
        let result = sqlx::query(
            r"
            INSERT INTO users (
                id, email, first_name, last_name, password_hash, tenant_id,
                role, status, is_active, failed_login_attempts, locked_until,
                created_at, updated_at, last_login
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ",
        )
        .bind(user.id.to_string())
        .bind(&user.email)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.password_hash)
        .bind(&user.tenant_id)
        .bind(user.role.as_str())
        .bind(user.status.as_str())
        .bind(user.is_active)
        .bind(user.failed_login_attempts)
        .bind(user.locked_until)
        .bind(user.created_at)
        .bind(user.updated_at)
        .bind(user.last_login)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(AuthError::Conflict(format!(
                    "user with email {} already exists",
                    user.email
                )))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Look up a user by id
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails
    pub async fn get_user_by_id(&self, user_id: Uuid) -> AuthResult<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE id = $1")
            .bind(user_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_user).transpose()
    }

    /// Look up a user by email (case-insensitive)
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails
    pub async fn get_user_by_email(&self, email: &str) -> AuthResult<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE email = $1")
            .bind(email.trim().to_lowercase())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_user).transpose()
    }

    /// Clear failure bookkeeping and stamp last login after a successful
    /// credential check
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails
    pub async fn record_login_success(&self, user_id: Uuid) -> AuthResult<()> {
        sqlx::query(
            r"
            UPDATE users
            SET failed_login_attempts = 0, locked_until = NULL,
                last_login = $2, updated_at = $2
            WHERE id = $1
            ",
        )
        .bind(user_id.to_string())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Record a failed credential check as a single conditional update.
    ///
    /// The increment and the threshold decision happen inside one statement,
    /// so two concurrent failures each count exactly once and the lock
    /// engages at exactly the configured threshold. A failure after an
    /// expired lock restarts the count at one instead of re-locking from
    /// the stale total. Failures while already locked are expected to be
    /// rejected before calling this.
    ///
    /// Returns the new failure count and the lock expiry if one engaged.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails
    pub async fn record_login_failure(
        &self,
        user_id: Uuid,
        threshold: i64,
        lockout_duration: Duration,
    ) -> AuthResult<(i64, Option<DateTime<Utc>>)> {
        let now = Utc::now();
        let lock_until = now + lockout_duration;

        let row = sqlx::query(
            r"
            UPDATE users
            SET failed_login_attempts = CASE
                    WHEN locked_until IS NOT NULL AND locked_until <= $4 THEN 1
                    ELSE failed_login_attempts + 1
                END,
                locked_until = CASE
                    WHEN locked_until IS NOT NULL AND locked_until <= $4 THEN NULL
                    WHEN failed_login_attempts + 1 >= $2 THEN $3
                    ELSE locked_until
                END,
                updated_at = $4
            WHERE id = $1
            RETURNING failed_login_attempts, locked_until
            ",
        )
        .bind(user_id.to_string())
        .bind(threshold)
        .bind(lock_until)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        let attempts: i64 = row.try_get("failed_login_attempts")?;
        let locked_until: Option<DateTime<Utc>> = row.try_get("locked_until")?;
        Ok((attempts, locked_until))
    }

    /// Apply a partial profile update, leaving unset fields untouched
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails
    pub async fn update_user(&self, user_id: Uuid, update: &UserUpdate) -> AuthResult<()> {
        if update.is_empty() {
            return Ok(());
        }
        sqlx::query(
            r"
            UPDATE users
            SET first_name = COALESCE($2, first_name),
                last_name = COALESCE($3, last_name),
                is_active = COALESCE($4, is_active),
                status = COALESCE($5, status),
                updated_at = $6
            WHERE id = $1
            ",
        )
        .bind(user_id.to_string())
        .bind(update.first_name.as_deref())
        .bind(update.last_name.as_deref())
        .bind(update.is_active)
        .bind(update.status.map(|s| s.as_str()))
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Replace a user's password hash
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails
    pub async fn update_password(&self, user_id: Uuid, password_hash: &str) -> AuthResult<()> {
        sqlx::query(
            "UPDATE users SET password_hash = $2, updated_at = $3 WHERE id = $1",
        )
        .bind(user_id.to_string())
        .bind(password_hash)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Delete a user and everything keyed to them in one transaction
    ///
    /// # Errors
    ///
    /// Returns an error if any delete fails; nothing is removed on failure
    pub async fn delete_user(&self, user_id: Uuid) -> AuthResult<()> {
        let id = user_id.to_string();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r"
            DELETE FROM provider_connections
            WHERE athlete_id IN (SELECT id FROM athletes WHERE user_id = $1)
            ",
        )
        .bind(&id)
        .execute(&mut *tx)
        .await?;

        for table in [
            "refresh_tokens",
            "password_reset_tokens",
            "magic_link_tokens",
            "oauth_states",
            "athletes",
        ] {
            let query = format!("DELETE FROM {table} WHERE user_id = $1");
            sqlx::query(&query).bind(&id).execute(&mut *tx).await?;
        }

        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(&id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Create an athlete profile for a user
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails
    pub async fn create_athlete(&self, user_id: Uuid, name: &str) -> AuthResult<Athlete> {
        let athlete = Athlete {
            id: Uuid::new_v4(),
            user_id,
            name: name.to_owned(),
            is_active: true,
            created_at: Utc::now(),
        };
        sqlx::query(
            r"
            INSERT INTO athletes (id, user_id, name, is_active, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ",
        )
        .bind(athlete.id.to_string())
        .bind(athlete.user_id.to_string())
        .bind(&athlete.name)
        .bind(athlete.is_active)
        .bind(athlete.created_at)
        .execute(&self.pool)
        .await?;
        Ok(athlete)
    }

    /// Find the athlete profile backing a user, if one exists
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails
    pub async fn resolve_athlete(&self, user_id: Uuid) -> AuthResult<Option<Athlete>> {
        let row = sqlx::query(
            "SELECT id, user_id, name, is_active, created_at FROM athletes WHERE user_id = $1",
        )
        .bind(user_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            let id_str: String = row.try_get("id")?;
            let user_id_str: String = row.try_get("user_id")?;
            Ok(Athlete {
                id: Uuid::parse_str(&id_str)
                    .map_err(|e| AuthError::Database(format!("invalid athlete id: {e}")))?,
                user_id: Uuid::parse_str(&user_id_str)
                    .map_err(|e| AuthError::Database(format!("invalid athlete user id: {e}")))?,
                name: row.try_get("name")?,
                is_active: row.try_get("is_active")?,
                created_at: row.try_get("created_at")?,
            })
        })
        .transpose()
    }
}
